use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::glob_entities::{GlobMiner, GLOB_LABEL};
use super::regex_entities::{RegexMiner, EMAIL_LABEL, REGEX_LABEL, URL_LABEL};
use super::{MinerModule, MinerSymbol, ModuleLoader};
use crate::config::default_miners_dir;

/// File name of the compiled-in glob module inside the miners directory
pub const GLOB_MODULE: &str = "glob_entities.so";

/// File name of the compiled-in regex module inside the miners directory
pub const REGEX_MODULE: &str = "regex_entities.so";

/// Module loader backed by modules compiled into the binary.
///
/// Modules are addressed by their exact path, so a miners directory configured
/// as `/opt/miners` exposes `/opt/miners/glob_entities.so` and
/// `/opt/miners/regex_entities.so`. Further modules can be registered at any path.
#[derive(Debug, Clone, Default)]
pub struct BuiltinLoader {
    modules: HashMap<PathBuf, Arc<MinerModule>>,
}

impl BuiltinLoader {
    /// Creates a loader exposing the standard modules under `miners_dir`
    pub fn new(miners_dir: impl AsRef<Path>) -> Self {
        let miners_dir = miners_dir.as_ref();
        let mut loader = Self::empty();
        loader.register(miners_dir.join(GLOB_MODULE), glob_module());
        loader.register(miners_dir.join(REGEX_MODULE), regex_module());
        loader
    }

    /// Creates a loader without any modules
    pub fn empty() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Makes `module` loadable from `path`, replacing any module already there
    pub fn register(&mut self, path: impl Into<PathBuf>, module: MinerModule) {
        let path = path.into();
        debug!("Registering module {} at {}", module.name(), path.display());
        self.modules.insert(path, Arc::new(module));
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, module: MinerModule) -> Self {
        self.register(path, module);
        self
    }

    /// Paths of all loadable modules
    pub fn module_paths(&self) -> impl Iterator<Item = &Path> {
        self.modules.keys().map(PathBuf::as_path)
    }
}

impl ModuleLoader for BuiltinLoader {
    fn open(&self, path: &Path) -> Result<Arc<MinerModule>, String> {
        self.modules
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no miner module available at {}", path.display()))
    }
}

/// Loader used when no explicit one is given: standard modules under the
/// default miners directory
pub fn default_loader() -> BuiltinLoader {
    BuiltinLoader::new(default_miners_dir())
}

fn glob_module() -> MinerModule {
    MinerModule::new("glob_entities").with_symbol(
        "match_glob",
        MinerSymbol::new(["match_glob", GLOB_LABEL], GlobMiner::from_params),
    )
}

fn regex_module() -> MinerModule {
    MinerModule::new("regex_entities")
        .with_symbol(
            "match_regex",
            MinerSymbol::new(["match_regex", REGEX_LABEL], RegexMiner::from_params),
        )
        .with_symbol(
            "match_email",
            MinerSymbol::new(["match_email", EMAIL_LABEL], RegexMiner::email),
        )
        .with_symbol(
            "match_url",
            MinerSymbol::new(["match_url", URL_LABEL], RegexMiner::url),
        )
}
