//! # upsync-core
//!
//! Shared primitives for the upsync update server:
//!
//! - **Identities**: `(ID, Revision)` pairs addressing update revisions
//! - **Update Model**: category/software variants with prerequisite evaluation
//! - **Files**: content digests and the content-addressed URL scheme
//! - **Source Seams**: read-only metadata and content store interfaces
//! - **Errors**: the shared error type every component maps onto
//!
//! All cross-crate interaction goes through the types defined here; the
//! catalog and server crates never talk to a store except via the seams.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod content;
pub mod error;
pub mod file;
pub mod identity;
pub mod observability;
pub mod source;
pub mod update;

pub use content::{ContentSource, ContentStream, FsContentSource, MemoryContentSource};
pub use error::{Error, Result};
pub use file::{FileDigest, FileUrl, UpdateFile};
pub use identity::UpdateIdentity;
pub use observability::{LogFormat, init_logging};
pub use source::{MemoryMetadataSource, MetadataSource, load_metadata_dir};
pub use update::{
    CategoryKind, CategoryUpdate, PrerequisiteGroup, SoftwareUpdate, Update, UpdateCommon,
};
