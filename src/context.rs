//! Execution context threaded through the engine entry points.
//!
//! The context carries the storage handle and the resolved worker count.
//! It is constructed once at initialization and borrowed read-only by the
//! core; there is no process-global state.

use crate::config::Config;
use crate::error::Result;
use crate::storage::ArrayStore;

/// Immutable per-deployment context: storage handle plus CPU budget.
#[derive(Debug, Clone)]
pub struct Context {
    store: ArrayStore,
    nthreads: usize,
}

impl Context {
    /// Create a context from an existing store. `nthreads == 0` auto-detects
    /// the CPU count.
    pub fn new(store: ArrayStore, nthreads: usize) -> Self {
        Self {
            store,
            nthreads: resolve_nthreads(nthreads),
        }
    }

    /// Build the storage backend from configuration and wrap it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = ArrayStore::from_config(&config.storage)?;
        Ok(Self::new(store, config.search.nthreads))
    }

    pub fn store(&self) -> &ArrayStore {
        &self.store
    }

    /// Worker count for the parallel scoring kernels.
    pub fn nthreads(&self) -> usize {
        self.nthreads
    }
}

/// Resolve a configured thread count: `0` means "use all available cores".
pub fn resolve_nthreads(nthreads: usize) -> usize {
    if nthreads > 0 {
        return nthreads;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
