//! Miner plugin surface.
//!
//! A miner is one matching strategy. Miners live in modules addressed by path, and
//! each module exposes its miners under entry-point symbols. Resolving a
//! `(path, symbol)` pair goes through a [`ModuleLoader`], so the extractor never
//! needs to know whether a module is compiled in or provided some other way.
//!
//! ```rust,ignore
//! let module = MinerModule::new("numbers").with_symbol(
//!     "match_digits",
//!     MinerSymbol::new(["Number"], |_params| Ok(Box::new(DigitMiner) as Box<dyn Miner>)),
//! );
//! loader.register("miners/numbers.so", module);
//! extractor.add_miner_from_module("miners/numbers.so", "match_digits", None)?;
//! ```
pub mod builtin;
pub mod glob_entities;
pub mod regex_entities;
pub mod registry;

pub use builtin::BuiltinLoader;
pub use registry::{MinerDescriptor, MinerHandle, MinerMeta, MinerRegistry};

use std::collections::HashMap;
use std::ffi::CStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A candidate match reported by a miner, relative to the scanned window
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Start of the match in bytes from the start of the window
    pub start: usize,
    /// Length of the match in bytes
    pub len: usize,
    pub label: String,
    pub probability: f64,
}

impl Candidate {
    pub fn new(start: usize, len: usize, label: impl Into<String>, probability: f64) -> Self {
        Self {
            start,
            len,
            label: label.into(),
            probability,
        }
    }
}

/// One matching strategy. Scans are independent and may run concurrently.
pub trait Miner: Send + Sync {
    fn scan(&self, window: &[u8]) -> Vec<Candidate>;
}

/// Initialization entry of a miner: receives the registration params and
/// either builds the miner or explains why the params are unusable
pub type MinerInit = dyn Fn(Option<&CStr>) -> Result<Box<dyn Miner>, String> + Send + Sync;

/// An entry point exported by a miner module
#[derive(Clone)]
pub struct MinerSymbol {
    labels: Vec<String>,
    init: Arc<MinerInit>,
}

impl MinerSymbol {
    pub fn new<I, S, F>(labels: I, init: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Option<&CStr>) -> Result<Box<dyn Miner>, String> + Send + Sync + 'static,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            init: Arc::new(init),
        }
    }

    /// Labels describing what the miner detects
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn init(&self, params: Option<&CStr>) -> Result<Box<dyn Miner>, String> {
        (self.init)(params)
    }
}

impl fmt::Debug for MinerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinerSymbol")
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// A loaded module: a named table of miner entry points
#[derive(Debug, Clone, Default)]
pub struct MinerModule {
    name: String,
    symbols: HashMap<String, MinerSymbol>,
}

impl MinerModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    pub fn with_symbol(mut self, name: impl Into<String>, symbol: MinerSymbol) -> Self {
        self.symbols.insert(name.into(), symbol);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve(&self, symbol: &str) -> Option<&MinerSymbol> {
        self.symbols.get(symbol)
    }
}

/// Resolves module paths to loaded modules
pub trait ModuleLoader: Send + Sync {
    /// Opens the module at `path`, or describes why it cannot be loaded
    fn open(&self, path: &Path) -> Result<Arc<MinerModule>, String>;
}
