//! The metadata source seam.
//!
//! The sync engine consumes a read-only view of an update metadata store:
//! the three GUID partitions (root / non-leaf / leaf), the categories and
//! updates indices, the per-catalog revision ordinals, and a byte stream of
//! each update's full metadata XML. `MemoryMetadataSource` is the local
//! implementation backing tests and the development server;
//! `load_metadata_dir` builds one from an on-disk catalog manifest.
//!
//! Partitions are derived at the source, so they are pairwise disjoint by
//! construction: a GUID with no prerequisites is a root; otherwise it is a
//! non-leaf when some other update's prerequisite expression references it,
//! and a leaf when none does.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identity::UpdateIdentity;
use crate::update::{CategoryUpdate, SoftwareUpdate, Update};

/// Read-only interface onto an update metadata store.
pub trait MetadataSource: Send + Sync + 'static {
    /// GUIDs of updates with no prerequisites, in source order.
    fn root_updates(&self) -> Result<Vec<Uuid>>;

    /// GUIDs of updates that other updates depend on, in source order.
    fn non_leaf_updates(&self) -> Result<Vec<Uuid>>;

    /// GUIDs of updates with no dependents, in source order.
    fn leaf_updates(&self) -> Result<Vec<Uuid>>;

    /// Identity → update for categories (detectoids, products, classifications).
    fn categories_index(&self) -> Result<HashMap<UpdateIdentity, Update>>;

    /// Identity → update for software updates.
    fn updates_index(&self) -> Result<HashMap<UpdateIdentity, Update>>;

    /// The per-catalog revision ordinal map.
    fn revision_index(&self) -> Result<HashMap<i32, UpdateIdentity>>;

    /// Opens the full metadata XML stream for one update revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the revision has no stored metadata.
    fn update_metadata(&self, identity: &UpdateIdentity) -> Result<Box<dyn Read + Send>>;
}

enum StoredXml {
    Inline(String),
    File(std::path::PathBuf),
}

/// In-memory metadata source.
///
/// Built once, then frozen behind an `Arc<dyn MetadataSource>`; the trait
/// surface is read-only, so no interior locking is needed.
#[derive(Default)]
pub struct MemoryMetadataSource {
    categories: HashMap<UpdateIdentity, Update>,
    software: HashMap<UpdateIdentity, Update>,
    insertion_order: Vec<Uuid>,
    revisions: HashMap<i32, UpdateIdentity>,
    next_revision: i32,
    xml: HashMap<UpdateIdentity, StoredXml>,
}

impl MemoryMetadataSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_revision: 1,
            ..Self::default()
        }
    }

    /// Inserts a category update with its metadata XML.
    ///
    /// Returns the revision ordinal assigned to it.
    pub fn insert_category(&mut self, category: CategoryUpdate, xml: impl Into<String>) -> i32 {
        self.insert(Update::Category(category), StoredXml::Inline(xml.into()))
    }

    /// Inserts a software update with its metadata XML.
    ///
    /// Returns the revision ordinal assigned to it.
    pub fn insert_software(&mut self, software: SoftwareUpdate, xml: impl Into<String>) -> i32 {
        self.insert(Update::Software(software), StoredXml::Inline(xml.into()))
    }

    fn insert(&mut self, update: Update, xml: StoredXml) -> i32 {
        let identity = update.identity();
        if !self.insertion_order.contains(&identity.id) {
            self.insertion_order.push(identity.id);
        }
        match &update {
            Update::Category(_) => self.categories.insert(identity, update),
            Update::Software(_) => self.software.insert(identity, update),
        };
        self.xml.insert(identity, xml);

        let ordinal = self.next_revision;
        self.next_revision += 1;
        self.revisions.insert(ordinal, identity);
        ordinal
    }

    fn all_updates(&self) -> impl Iterator<Item = &Update> {
        self.categories.values().chain(self.software.values())
    }

    fn latest_revision_of(&self, id: Uuid) -> Option<&Update> {
        self.all_updates()
            .filter(|u| u.identity().id == id)
            .max_by_key(|u| u.identity().revision)
    }

    fn partition(&self) -> (Vec<Uuid>, Vec<Uuid>, Vec<Uuid>) {
        let mut referenced: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
        for update in self.all_updates() {
            for group in &update.common().prerequisites {
                referenced.extend(group.any_of.iter().copied());
            }
        }

        let mut roots = Vec::new();
        let mut non_leaves = Vec::new();
        let mut leaves = Vec::new();
        for &id in &self.insertion_order {
            let Some(latest) = self.latest_revision_of(id) else {
                continue;
            };
            if latest.common().prerequisites.is_empty() {
                roots.push(id);
            } else if referenced.contains(&id) {
                non_leaves.push(id);
            } else {
                leaves.push(id);
            }
        }
        (roots, non_leaves, leaves)
    }
}

impl MetadataSource for MemoryMetadataSource {
    fn root_updates(&self) -> Result<Vec<Uuid>> {
        Ok(self.partition().0)
    }

    fn non_leaf_updates(&self) -> Result<Vec<Uuid>> {
        Ok(self.partition().1)
    }

    fn leaf_updates(&self) -> Result<Vec<Uuid>> {
        Ok(self.partition().2)
    }

    fn categories_index(&self) -> Result<HashMap<UpdateIdentity, Update>> {
        Ok(self.categories.clone())
    }

    fn updates_index(&self) -> Result<HashMap<UpdateIdentity, Update>> {
        Ok(self.software.clone())
    }

    fn revision_index(&self) -> Result<HashMap<i32, UpdateIdentity>> {
        Ok(self.revisions.clone())
    }

    fn update_metadata(&self, identity: &UpdateIdentity) -> Result<Box<dyn Read + Send>> {
        match self.xml.get(identity) {
            Some(StoredXml::Inline(xml)) => Ok(Box::new(Cursor::new(xml.clone().into_bytes()))),
            Some(StoredXml::File(path)) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    Error::metadata_with_source(
                        format!("metadata XML for {identity} unreadable at {}", path.display()),
                        e,
                    )
                })?;
                Ok(Box::new(file))
            }
            None => Err(Error::metadata(format!("no metadata XML for {identity}"))),
        }
    }
}

/// On-disk catalog manifest: `catalog.json` at the metadata directory root.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogManifest {
    #[serde(default)]
    categories: Vec<CategoryUpdate>,
    #[serde(default)]
    software: Vec<SoftwareUpdate>,
}

/// Loads a metadata source from a directory.
///
/// The directory holds `catalog.json` (the update records) and an `xml/`
/// subdirectory with one `{uuid}-{revision}.xml` document per revision.
/// XML documents are opened lazily at request time.
///
/// # Errors
///
/// Returns an error if the manifest is missing or malformed.
pub fn load_metadata_dir(dir: &Path) -> Result<MemoryMetadataSource> {
    let manifest_path = dir.join("catalog.json");
    let manifest = std::fs::read_to_string(&manifest_path).map_err(|e| {
        Error::metadata_with_source(
            format!("cannot read manifest {}", manifest_path.display()),
            e,
        )
    })?;
    let manifest: CatalogManifest = serde_json::from_str(&manifest)
        .map_err(|e| Error::metadata(format!("malformed manifest: {e}")))?;

    let mut source = MemoryMetadataSource::new();
    for category in manifest.categories {
        let identity = category.common.identity;
        source.insert(
            Update::Category(category),
            StoredXml::File(xml_path(dir, &identity)),
        );
    }
    for software in manifest.software {
        let identity = software.common.identity;
        source.insert(
            Update::Software(software),
            StoredXml::File(xml_path(dir, &identity)),
        );
    }
    Ok(source)
}

fn xml_path(dir: &Path, identity: &UpdateIdentity) -> std::path::PathBuf {
    dir.join("xml")
        .join(format!("{}-{}.xml", identity.id, identity.revision))
}
