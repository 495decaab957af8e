//! # upsync-catalog
//!
//! Catalog indexing and the update-offering engine:
//!
//! - **Snapshots**: immutable catalog views with all derived indices
//! - **Guard**: atomic publication of snapshot swaps under concurrent reads
//! - **Approvals**: per-revision software/driver approval sets
//! - **Engine**: the four-phase offering algorithm and extended-info replies
//! - **Fragments**: core / extended / localized metadata slices
//!
//! The engine is transport-agnostic; the server crate renders its replies
//! into protocol envelopes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod approvals;
pub mod engine;
pub mod fragments;
pub mod guard;
pub mod reply;
pub mod snapshot;

pub use approvals::{ApprovalSet, Approvals};
pub use engine::SyncEngine;
pub use fragments::{core_fragment, extended_fragment, localized_properties};
pub use guard::CatalogGuard;
pub use reply::{
    Cookie, Deployment, DeploymentAction, ExtendedInfo, FileLocation, FragmentType,
    MAX_UPDATES_IN_RESPONSE, OfferedUpdate, SyncReply, SyncRequest, UpdateData,
};
pub use snapshot::Catalog;
