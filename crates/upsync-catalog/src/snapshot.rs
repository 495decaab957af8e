//! Immutable catalog snapshots and their derived indices.
//!
//! A snapshot is built from the metadata source in one pass and never
//! mutated afterwards; readers that hold an `Arc<Catalog>` keep the whole
//! snapshot (indices and metadata stream access included) alive until their
//! reply is fully materialized. Replacement happens by swapping the pointer
//! under the catalog guard.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use uuid::Uuid;

use upsync_core::{Error, MetadataSource, Result, Update, UpdateIdentity};

/// An immutable catalog snapshot with all derived indices.
pub struct Catalog {
    source: Arc<dyn MetadataSource>,
    categories: HashMap<UpdateIdentity, Update>,
    updates: HashMap<UpdateIdentity, Update>,
    roots: Vec<Uuid>,
    non_leaves: Vec<Uuid>,
    revision_index: HashMap<i32, UpdateIdentity>,
    id_to_latest: HashMap<Uuid, UpdateIdentity>,
    id_to_latest_revision: HashMap<Uuid, i32>,
    software_leaf_guids: Vec<Uuid>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("categories", &self.categories.len())
            .field("updates", &self.updates.len())
            .field("revisions", &self.revision_index.len())
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Builds a snapshot from the metadata source.
    ///
    /// Derives the latest-revision maps by inverting the source's revision
    /// index, grouping by logical ID, and keeping the entry with the
    /// largest identity revision; the software leaf list is the leaf
    /// partition filtered (order-preserving) to GUIDs whose latest
    /// identity resolves to a software update.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata source fails to enumerate.
    pub fn build(source: Arc<dyn MetadataSource>) -> Result<Self> {
        let categories = source.categories_index()?;
        let updates = source.updates_index()?;
        let roots = source.root_updates()?;
        let non_leaves = source.non_leaf_updates()?;
        let leaves = source.leaf_updates()?;
        let revision_index = source.revision_index()?;

        let mut latest: HashMap<Uuid, (UpdateIdentity, i32)> = HashMap::new();
        for (&ordinal, &identity) in &revision_index {
            latest
                .entry(identity.id)
                .and_modify(|current| {
                    if identity.revision > current.0.revision {
                        *current = (identity, ordinal);
                    }
                })
                .or_insert((identity, ordinal));
        }
        let id_to_latest = latest
            .iter()
            .map(|(&id, &(identity, _))| (id, identity))
            .collect::<HashMap<_, _>>();
        let id_to_latest_revision = latest
            .iter()
            .map(|(&id, &(_, ordinal))| (id, ordinal))
            .collect();

        let software_leaf_guids = leaves
            .into_iter()
            .filter(|guid| {
                id_to_latest.get(guid).is_some_and(|identity| {
                    updates
                        .get(identity)
                        .is_some_and(|update| update.as_software().is_some())
                })
            })
            .collect();

        Ok(Self {
            source,
            categories,
            updates,
            roots,
            non_leaves,
            revision_index,
            id_to_latest,
            id_to_latest_revision,
            software_leaf_guids,
        })
    }

    /// Root GUIDs in source order.
    #[must_use]
    pub fn roots(&self) -> &[Uuid] {
        &self.roots
    }

    /// Non-leaf GUIDs in source order.
    #[must_use]
    pub fn non_leaves(&self) -> &[Uuid] {
        &self.non_leaves
    }

    /// Leaf GUIDs that resolve to software updates, in source order.
    #[must_use]
    pub fn software_leaf_guids(&self) -> &[Uuid] {
        &self.software_leaf_guids
    }

    /// The latest identity for a logical ID, if the catalog knows it.
    #[must_use]
    pub fn latest_identity(&self, id: Uuid) -> Option<UpdateIdentity> {
        self.id_to_latest.get(&id).copied()
    }

    /// The revision handle offered to clients for a logical ID.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the ID has no revision entry; callers
    /// reach this only through identities obtained from this catalog.
    pub fn latest_revision(&self, id: Uuid) -> Result<i32> {
        self.id_to_latest_revision
            .get(&id)
            .copied()
            .ok_or_else(|| Error::internal(format!("no revision handle for {id}")))
    }

    /// Resolves a client-presented revision handle to an identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRevision`] when the handle is not in the
    /// catalog; the whole request fails.
    pub fn identity_for_revision(&self, revision: i32) -> Result<UpdateIdentity> {
        self.revision_index
            .get(&revision)
            .copied()
            .ok_or(Error::UnknownRevision { revision })
    }

    /// Looks up a category by identity.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the identity is not a category.
    pub fn category(&self, identity: &UpdateIdentity) -> Result<&Update> {
        self.categories
            .get(identity)
            .ok_or_else(|| Error::internal(format!("{identity} is not in the categories index")))
    }

    /// Looks up a software update by identity.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the identity is not in the updates
    /// index.
    pub fn software(&self, identity: &UpdateIdentity) -> Result<&Update> {
        self.updates
            .get(identity)
            .ok_or_else(|| Error::internal(format!("{identity} is not in the updates index")))
    }

    /// Looks up an update in the categories index first, then updates.
    ///
    /// # Errors
    ///
    /// Fails when the identity is absent from both indices; GUIDs missing
    /// from the latest-identity map never reach this point.
    pub fn resolve(&self, identity: &UpdateIdentity) -> Result<&Update> {
        self.categories
            .get(identity)
            .or_else(|| self.updates.get(identity))
            .ok_or_else(|| Error::internal(format!("{identity} is absent from both indices")))
    }

    /// Reads the full metadata XML document for an update revision.
    ///
    /// # Errors
    ///
    /// Stream failures surface as metadata errors so they reach the client
    /// as protocol faults.
    pub fn metadata_xml(&self, identity: &UpdateIdentity) -> Result<String> {
        let mut stream = self.source.update_metadata(identity)?;
        let mut xml = String::new();
        stream.read_to_string(&mut xml).map_err(|e| {
            Error::metadata_with_source(format!("metadata stream for {identity} failed"), e)
        })?;
        Ok(xml)
    }

    /// Iterates over every update file in the catalog, in updates-index
    /// iteration order.
    pub fn all_files(&self) -> impl Iterator<Item = &upsync_core::UpdateFile> {
        self.updates.values().flat_map(Update::files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upsync_core::{MemoryMetadataSource, SoftwareUpdate};

    #[test]
    fn latest_revision_wins_per_logical_id() {
        let id = Uuid::new_v4();
        let mut source = MemoryMetadataSource::new();
        let old = source.insert_software(
            SoftwareUpdate::new(UpdateIdentity::new(id, 100)),
            "<Update/>",
        );
        let new = source.insert_software(
            SoftwareUpdate::new(UpdateIdentity::new(id, 101)),
            "<Update/>",
        );

        let catalog = Catalog::build(Arc::new(source)).unwrap();
        assert_eq!(
            catalog.latest_identity(id).unwrap(),
            UpdateIdentity::new(id, 101)
        );
        assert_eq!(catalog.latest_revision(id).unwrap(), new);
        assert_ne!(catalog.latest_revision(id).unwrap(), old);
    }

    #[test]
    fn unknown_revision_handle_is_a_hard_error() {
        let catalog = Catalog::build(Arc::new(MemoryMetadataSource::new())).unwrap();
        let err = catalog.identity_for_revision(999).unwrap_err();
        assert!(matches!(err, Error::UnknownRevision { revision: 999 }));
    }

    #[test]
    fn rebuilding_from_same_source_yields_same_indices() {
        let id = Uuid::new_v4();
        let mut source = MemoryMetadataSource::new();
        source.insert_software(SoftwareUpdate::new(UpdateIdentity::new(id, 1)), "<U/>");
        let source = Arc::new(source);

        let first = Catalog::build(Arc::clone(&source) as Arc<dyn MetadataSource>).unwrap();
        let second = Catalog::build(source).unwrap();
        assert_eq!(first.software_leaf_guids(), second.software_leaf_guids());
        assert_eq!(first.latest_identity(id), second.latest_identity(id));
        assert_eq!(
            first.latest_revision(id).unwrap(),
            second.latest_revision(id).unwrap()
        );
    }
}
