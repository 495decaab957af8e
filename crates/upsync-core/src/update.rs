//! The update data model.
//!
//! An update is polymorphic over the capability set the protocol cares
//! about: categories (detectoids, products, classifications) carry only the
//! prerequisite expression, software updates additionally carry bundle
//! relationships and payload files. `Update` is the tagged variant over the
//! shared fields; the offering phases work against its accessors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::file::UpdateFile;
use crate::identity::UpdateIdentity;

/// One prerequisite group: satisfied when any of its GUIDs is installed.
///
/// An update's full prerequisite expression is the conjunction of its
/// groups (AND of ORs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrerequisiteGroup {
    /// The alternatives; one present GUID satisfies the group.
    pub any_of: Vec<Uuid>,
}

impl PrerequisiteGroup {
    /// Creates a group from its alternatives.
    #[must_use]
    pub fn new(any_of: Vec<Uuid>) -> Self {
        Self { any_of }
    }

    fn is_satisfied(&self, installed: &HashSet<Uuid>) -> bool {
        self.any_of.iter().any(|id| installed.contains(id))
    }
}

/// Fields shared by every update variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCommon {
    /// The identity of this revision.
    pub identity: UpdateIdentity,
    /// Prerequisite expression, AND over groups. Empty for root updates.
    pub prerequisites: Vec<PrerequisiteGroup>,
    /// Whether a newer update supersedes this one.
    pub is_superseded: bool,
}

impl UpdateCommon {
    /// Creates the shared fields with no prerequisites and not superseded.
    #[must_use]
    pub fn new(identity: UpdateIdentity) -> Self {
        Self {
            identity,
            prerequisites: Vec::new(),
            is_superseded: false,
        }
    }

    /// Evaluates the prerequisite expression against an installed GUID set.
    ///
    /// An update with no prerequisite groups is always applicable.
    #[must_use]
    pub fn is_applicable(&self, installed: &HashSet<Uuid>) -> bool {
        self.prerequisites
            .iter()
            .all(|group| group.is_satisfied(installed))
    }
}

/// The flavor of a category update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    /// A detection condition referenced by prerequisite expressions.
    Detectoid,
    /// A product category.
    Product,
    /// An update classification.
    Classification,
}

/// A non-installable category update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryUpdate {
    /// Shared fields.
    pub common: UpdateCommon,
    /// The category flavor.
    pub kind: CategoryKind,
}

/// An installable software update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareUpdate {
    /// Shared fields.
    pub common: UpdateCommon,
    /// Whether this update aggregates children.
    pub is_bundle: bool,
    /// Whether this update is a child of at least one bundle.
    pub is_bundled: bool,
    /// Identities of the bundles that contain this update.
    pub bundle_parents: Vec<UpdateIdentity>,
    /// Payload files.
    pub files: Vec<UpdateFile>,
}

impl SoftwareUpdate {
    /// Creates a standalone software update with no files.
    #[must_use]
    pub fn new(identity: UpdateIdentity) -> Self {
        Self {
            common: UpdateCommon::new(identity),
            is_bundle: false,
            is_bundled: false,
            bundle_parents: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// An update in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Update {
    /// A detectoid, product category, or classification.
    Category(CategoryUpdate),
    /// A software update.
    Software(SoftwareUpdate),
}

impl Update {
    /// Returns the shared fields.
    #[must_use]
    pub fn common(&self) -> &UpdateCommon {
        match self {
            Self::Category(c) => &c.common,
            Self::Software(s) => &s.common,
        }
    }

    /// Returns the identity of this revision.
    #[must_use]
    pub fn identity(&self) -> UpdateIdentity {
        self.common().identity
    }

    /// Whether a newer update supersedes this one.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.common().is_superseded
    }

    /// Evaluates the prerequisite expression against an installed GUID set.
    #[must_use]
    pub fn is_applicable(&self, installed: &HashSet<Uuid>) -> bool {
        self.common().is_applicable(installed)
    }

    /// Returns the software variant, if this is one.
    #[must_use]
    pub fn as_software(&self) -> Option<&SoftwareUpdate> {
        match self {
            Self::Software(s) => Some(s),
            Self::Category(_) => None,
        }
    }

    /// Returns the payload files; empty for categories.
    #[must_use]
    pub fn files(&self) -> &[UpdateFile] {
        self.as_software().map_or(&[], |s| s.files.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> UpdateIdentity {
        UpdateIdentity::new(Uuid::new_v4(), 100)
    }

    fn installed(ids: &[Uuid]) -> HashSet<Uuid> {
        ids.iter().copied().collect()
    }

    #[test]
    fn no_prerequisites_is_always_applicable() {
        let update = Update::Software(SoftwareUpdate::new(identity()));
        assert!(update.is_applicable(&installed(&[])));
    }

    #[test]
    fn group_is_or_across_alternatives() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut software = SoftwareUpdate::new(identity());
        software.common.prerequisites = vec![PrerequisiteGroup::new(vec![a, b])];
        let update = Update::Software(software);

        assert!(update.is_applicable(&installed(&[b])));
        assert!(!update.is_applicable(&installed(&[Uuid::new_v4()])));
    }

    #[test]
    fn expression_is_and_across_groups() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut software = SoftwareUpdate::new(identity());
        software.common.prerequisites = vec![
            PrerequisiteGroup::new(vec![a]),
            PrerequisiteGroup::new(vec![b]),
        ];
        let update = Update::Software(software);

        assert!(update.is_applicable(&installed(&[a, b])));
        assert!(!update.is_applicable(&installed(&[a])));
    }

    #[test]
    fn category_has_no_files() {
        let update = Update::Category(CategoryUpdate {
            common: UpdateCommon::new(identity()),
            kind: CategoryKind::Product,
        });
        assert!(update.files().is_empty());
        assert!(update.as_software().is_none());
    }
}
