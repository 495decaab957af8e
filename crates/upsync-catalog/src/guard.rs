//! The catalog guard.
//!
//! One reader/writer lock publishes the current snapshot. Readers clone the
//! `Arc` under the read lock and then work against the immutable snapshot
//! for as long as their reply takes to build; a concurrent swap can never
//! expose a partially-updated catalog because snapshots are constructed
//! before they become reachable. Writer starvation is acceptable: swaps are
//! operator-driven and rare.

use std::sync::{Arc, RwLock};

use upsync_core::{Error, MetadataSource, Result};

use crate::snapshot::Catalog;

/// Guards the installed catalog snapshot.
#[derive(Debug, Default)]
pub struct CatalogGuard {
    inner: RwLock<Option<Arc<Catalog>>>,
}

impl CatalogGuard {
    /// Creates a guard with no catalog installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new metadata source, or clears the catalog when `None`.
    ///
    /// The snapshot and every derived index are rebuilt under the write
    /// lock; after return, concurrent readers observe either the full new
    /// state or a later one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be built; the previously
    /// installed catalog stays in place in that case.
    pub fn install(&self, source: Option<Arc<dyn MetadataSource>>) -> Result<()> {
        let mut slot = self
            .inner
            .write()
            .map_err(|_| Error::internal("catalog lock poisoned"))?;
        match source {
            Some(source) => {
                let catalog = Arc::new(Catalog::build(source)?);
                tracing::info!(catalog = ?catalog, "catalog installed");
                *slot = Some(catalog);
            }
            None => {
                tracing::info!("catalog cleared");
                *slot = None;
            }
        }
        Ok(())
    }

    /// Returns the current snapshot for the duration of a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CatalogUnavailable`] when no catalog is installed.
    pub fn read(&self) -> Result<Arc<Catalog>> {
        self.inner
            .read()
            .map_err(|_| Error::internal("catalog lock poisoned"))?
            .clone()
            .ok_or(Error::CatalogUnavailable)
    }

    /// Returns the current snapshot if one is installed.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }
}
