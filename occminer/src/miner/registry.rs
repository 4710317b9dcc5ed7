use serde::Serialize;
use std::ffi::CString;
use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::{Miner, MinerModule, ModuleLoader};
use crate::errors::{ExtractError, ExtractResult};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque, non-null token identifying one registered miner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MinerHandle(NonZeroU64);

impl MinerHandle {
    fn next() -> Self {
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// A miner resolved from a module and initialized with its params
pub struct MinerDescriptor {
    path: PathBuf,
    symbol: String,
    meta: Vec<String>,
    params: Option<CString>,
    handle: MinerHandle,
    miner: Arc<dyn Miner>,
    // Keeps the module loaded for as long as the miner exists
    _module: Arc<MinerModule>,
}

impl MinerDescriptor {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn handle(&self) -> MinerHandle {
        self.handle
    }

    pub(crate) fn miner(&self) -> Arc<dyn Miner> {
        Arc::clone(&self.miner)
    }

    pub fn meta(&self) -> MinerMeta {
        MinerMeta {
            path: self.path.clone(),
            symbol: self.symbol.clone(),
            meta: self.meta.clone(),
            params: self.params.as_ref().map(|p| p.as_bytes().to_vec()),
            handle: self.handle,
        }
    }
}

impl fmt::Debug for MinerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinerDescriptor")
            .field("path", &self.path)
            .field("symbol", &self.symbol)
            .field("meta", &self.meta)
            .field("params", &self.params)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Introspection view of a registered miner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinerMeta {
    /// Module path the miner was loaded from
    pub path: PathBuf,
    /// Entry-point symbol
    pub symbol: String,
    /// Symbol name followed by the labels the miner reports
    pub meta: Vec<String>,
    /// Registration params without their terminator
    pub params: Option<Vec<u8>>,
    pub handle: MinerHandle,
}

/// Ordered collection of registered miners
#[derive(Debug, Default)]
pub struct MinerRegistry {
    descriptors: Vec<MinerDescriptor>,
}

impl MinerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `symbol` from the module at `path` and appends it to the registry.
    ///
    /// Params are passed to the miner's initialization entry as a terminated
    /// byte sequence; anything after the first zero byte is ignored. On failure
    /// the registry is left unchanged.
    pub fn add(
        &mut self,
        loader: &dyn ModuleLoader,
        path: &Path,
        symbol: &str,
        params: Option<&[u8]>,
    ) -> ExtractResult<&MinerDescriptor> {
        let module = loader
            .open(path)
            .map_err(|reason| ExtractError::load(path, reason))?;
        let entry = module
            .resolve(symbol)
            .ok_or_else(|| ExtractError::symbol(path, symbol))?;

        let params = params.map(terminated);
        let miner = entry.init(params.as_deref()).map_err(|reason| {
            ExtractError::load(path, format!("miner {} rejected its params: {}", symbol, reason))
        })?;

        let mut meta = Vec::with_capacity(entry.labels().len() + 1);
        if !entry.labels().iter().any(|label| label == symbol) {
            meta.push(symbol.to_string());
        }
        meta.extend(entry.labels().iter().cloned());

        let descriptor = MinerDescriptor {
            path: path.to_path_buf(),
            symbol: symbol.to_string(),
            meta,
            params,
            handle: MinerHandle::next(),
            miner: Arc::from(miner),
            _module: Arc::clone(&module),
        };
        info!(
            "Registered miner {} from {} as #{}",
            symbol,
            path.display(),
            descriptor.handle.get()
        );
        self.descriptors.push(descriptor);
        Ok(&self.descriptors[self.descriptors.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MinerDescriptor> {
        self.descriptors.iter()
    }

    /// Introspection views in registration order
    pub fn list_meta(&self) -> Vec<MinerMeta> {
        self.descriptors.iter().map(MinerDescriptor::meta).collect()
    }

    /// Drops every descriptor, releasing their modules
    pub fn clear(&mut self) {
        debug!("Releasing {} miners", self.descriptors.len());
        self.descriptors.clear();
    }
}

/// Cuts `params` at its terminator, if any, and re-terminates it
fn terminated(params: &[u8]) -> CString {
    let content = params.split(|&b| b == 0).next().unwrap_or_default();
    // No zero byte is left in `content`, so the conversion always succeeds
    CString::new(content).unwrap_or_default()
}
