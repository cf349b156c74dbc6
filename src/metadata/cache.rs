//! Read-through memoization of [`TableInfo`]s.
//!
//! The map lock is held only long enough to fetch (or create) the per-entity
//! cell; the metadata itself is computed inside that cell's `OnceLock`, so two
//! threads asking for the same entity at the same time compute it once, and
//! threads asking for different entities never wait on each other. Entries are
//! never invalidated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use super::{MetadataError, MetadataResolver, MetadataSource, TableInfo};

type Slot = Arc<OnceLock<Result<Arc<TableInfo>, MetadataError>>>;

#[derive(Debug, Default)]
pub struct TableInfoCache {
    slots: Mutex<HashMap<String, Slot>>,
}

lazy_static::lazy_static! {
    static ref GLOBAL_TABLE_INFO_CACHE: TableInfoCache = TableInfoCache::new();
}

impl TableInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by every resolver built with
    /// [`CachedResolver::with_global_cache`].
    pub fn global() -> &'static TableInfoCache {
        &GLOBAL_TABLE_INFO_CACHE
    }

    fn slot(&self, entity: &str) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.entry(entity.to_string()).or_default().clone()
    }

    pub fn get_or_load(
        &self,
        entity: &str,
        load: impl FnOnce() -> Result<TableInfo, MetadataError>,
    ) -> Result<Arc<TableInfo>, MetadataError> {
        let slot = self.slot(entity);
        slot.get_or_init(|| load().map(Arc::new)).clone()
    }

    pub fn len(&self) -> usize {
        match self.slots.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum CacheRef {
    Owned(TableInfoCache),
    Global,
}

/// [`MetadataResolver`] memoizing a [`MetadataSource`].
pub struct CachedResolver<S: MetadataSource> {
    source: S,
    cache: CacheRef,
}

impl<S: MetadataSource> CachedResolver<S> {
    /// Resolver with its own cache, dropped together with the resolver.
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: CacheRef::Owned(TableInfoCache::new()),
        }
    }

    /// Resolver backed by the process-wide cache.
    pub fn with_global_cache(source: S) -> Self {
        Self {
            source,
            cache: CacheRef::Global,
        }
    }

    fn cache(&self) -> &TableInfoCache {
        match &self.cache {
            CacheRef::Owned(cache) => cache,
            CacheRef::Global => TableInfoCache::global(),
        }
    }
}

impl<S: MetadataSource> MetadataResolver for CachedResolver<S> {
    fn resolve(&self, entity: &str) -> Result<Arc<TableInfo>, MetadataError> {
        self.cache()
            .get_or_load(entity, || self.source.load(entity))
    }
}
