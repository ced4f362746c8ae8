//! Signature cache - classify once, share everywhere
//!
//! Design: Lock-free map from signature to `Arc<Cif>`. Entries are never
//! mutated after insertion, so readers on any thread see a fully built CIF.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

use super::{prep_cif, Cif};
use crate::abi::Abi;
use crate::error::FfiError;
use crate::logging::perf;
use crate::types::TypeRef;

static GLOBAL_CACHE: Lazy<CifCache> =
    Lazy::new(|| CifCache::with_capacity(crate::config::runtime_config().cache_capacity));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignatureKey {
    abi: Abi,
    rtype: TypeRef,
    arg_types: Vec<TypeRef>,
}

/// Concurrent CIF cache
pub struct CifCache {
    entries: DashMap<SignatureKey, Arc<Cif>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CifCache {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Process-wide cache
    pub fn global() -> &'static CifCache {
        &GLOBAL_CACHE
    }

    /// Shared CIF for a signature, classifying it on first use
    ///
    /// Failed classifications are not cached.
    pub fn get_or_prep(
        &self,
        abi: Abi,
        rtype: &TypeRef,
        arg_types: &[TypeRef],
    ) -> Result<Arc<Cif>, FfiError> {
        let key = SignatureKey {
            abi,
            rtype: Arc::clone(rtype),
            arg_types: arg_types.to_vec(),
        };

        if let Some(cif) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(abi = %abi, nargs = arg_types.len(), "cif cache hit");
            return Ok(Arc::clone(cif.value()));
        }

        let _perf = perf::track("cif_cache_miss");
        let cif = Arc::new(prep_cif(abi, Arc::clone(rtype), arg_types.to_vec())?);
        self.misses.fetch_add(1, Ordering::Relaxed);

        // A racing thread may have inserted first; keep whichever landed
        let entry = self.entries.entry(key).or_insert(cif);
        Ok(Arc::clone(entry.value()))
    }

    /// `get_or_prep` under the configured default ABI
    pub fn get_or_prep_default(
        &self,
        rtype: &TypeRef,
        arg_types: &[TypeRef],
    ) -> Result<Arc<Cif>, FfiError> {
        self.get_or_prep(crate::config::runtime_config().default_abi, rtype, arg_types)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry; CIFs still held elsewhere stay valid
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for CifCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}
