//! Update identities.
//!
//! Every revision of every update is addressed by an `(ID, Revision)` pair.
//! Two updates with the same ID and different revisions are two revisions of
//! the same logical update; approvals and index lookups are per-revision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The identity of a single update revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpdateIdentity {
    /// The logical update ID, shared by all revisions.
    pub id: Uuid,
    /// The revision number within the logical update.
    pub revision: i32,
}

impl UpdateIdentity {
    /// Creates an identity from its parts.
    #[must_use]
    pub const fn new(id: Uuid, revision: i32) -> Self {
        Self { id, revision }
    }
}

impl fmt::Display for UpdateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.revision)
    }
}

impl FromStr for UpdateIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id, revision) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidInput(format!("identity '{s}' is not '<uuid>/<rev>'")))?;
        let id = Uuid::parse_str(id)
            .map_err(|e| Error::InvalidInput(format!("identity '{s}': bad uuid: {e}")))?;
        let revision = revision
            .parse::<i32>()
            .map_err(|e| Error::InvalidInput(format!("identity '{s}': bad revision: {e}")))?;
        Ok(Self { id, revision })
    }
}
