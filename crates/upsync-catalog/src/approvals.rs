//! Approval sets.
//!
//! Two mutable sets of approved identities, one for software updates and
//! one for drivers. Approval is per-revision: membership is tested by the
//! full `(ID, Revision)` identity. The sets are internally thread-safe
//! because the management surface mutates them while sync requests read
//! them; per-operation atomicity is required, global snapshot consistency
//! is not. Approvals live across catalog swaps.

use std::collections::HashSet;
use std::sync::RwLock;

use upsync_core::{SoftwareUpdate, UpdateIdentity};

/// A concurrent set of approved update identities.
#[derive(Debug, Default)]
pub struct ApprovalSet {
    inner: RwLock<HashSet<UpdateIdentity>>,
}

impl ApprovalSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Approves a single identity.
    pub fn add(&self, identity: UpdateIdentity) {
        if let Ok(mut set) = self.inner.write() {
            set.insert(identity);
        }
    }

    /// Approves many identities in one operation.
    pub fn add_many(&self, identities: impl IntoIterator<Item = UpdateIdentity>) {
        if let Ok(mut set) = self.inner.write() {
            set.extend(identities);
        }
    }

    /// Revokes a single identity.
    pub fn remove(&self, identity: &UpdateIdentity) {
        if let Ok(mut set) = self.inner.write() {
            set.remove(identity);
        }
    }

    /// Revokes everything.
    pub fn clear(&self) {
        if let Ok(mut set) = self.inner.write() {
            set.clear();
        }
    }

    /// Whether the identity is approved.
    #[must_use]
    pub fn contains(&self, identity: &UpdateIdentity) -> bool {
        self.inner
            .read()
            .is_ok_and(|set| set.contains(identity))
    }

    /// Returns the approved identities.
    #[must_use]
    pub fn list(&self) -> Vec<UpdateIdentity> {
        self.inner
            .read()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// The two approval sets the server maintains.
#[derive(Debug, Default)]
pub struct Approvals {
    /// Approved software update identities.
    pub software: ApprovalSet,
    /// Approved driver update identities.
    pub drivers: ApprovalSet,
}

impl Approvals {
    /// Creates empty approval sets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a software update counts as approved for offering.
    ///
    /// True when its own identity is approved, or when it is bundled and
    /// any of its bundle parents is approved.
    #[must_use]
    pub fn software_is_offerable(&self, update: &SoftwareUpdate) -> bool {
        if self.software.contains(&update.common.identity) {
            return true;
        }
        update.is_bundled
            && update
                .bundle_parents
                .iter()
                .any(|parent| self.software.contains(parent))
    }
}
