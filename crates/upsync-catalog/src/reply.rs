//! Protocol request/reply shapes and the observable constants.
//!
//! Deployment IDs, the deployment change date, the response cap, and the
//! cookie shape are all observed by the Windows client's state machine;
//! none of them are tunable.

use chrono::{DateTime, Duration, Utc};

/// Maximum updates sent in one sync response.
pub const MAX_UPDATES_IN_RESPONSE: usize = 50;

/// Deployment ID for category evaluation offers.
pub const DEPLOYMENT_ID_EVALUATE: u32 = 15_000;

/// Deployment ID for bundle container offers.
pub const DEPLOYMENT_ID_BUNDLE: u32 = 20_000;

/// Deployment ID for bundled child offers.
pub const DEPLOYMENT_ID_BUNDLED: u32 = 20_001;

/// Deployment ID for standalone software offers.
pub const DEPLOYMENT_ID_STANDALONE: u32 = 20_002;

/// The deployment change date stamped on every offer.
pub const DEPLOYMENT_LAST_CHANGE_TIME: &str = "2019-08-06";

/// Cookie validity window.
pub const COOKIE_LIFETIME_DAYS: i64 = 5;

/// Length of the opaque cookie payload.
pub const COOKIE_DATA_LEN: usize = 12;

/// A client sync request after envelope decoding.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Revision handles of non-leaf updates the client evaluated as installed.
    pub installed_non_leaf_revisions: Vec<i32>,
    /// Revision handles of other updates the client already has cached.
    pub other_cached_revisions: Vec<i32>,
    /// When set, the client only wants a driver sync answer.
    pub skip_software_sync: bool,
}

/// A synthesized client cookie.
///
/// Cookies are opaque to this server: every call gets a fresh expiration
/// and a zeroed payload, and any presented cookie is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// When the cookie expires.
    pub expiration: DateTime<Utc>,
    /// Opaque payload; always zeroed.
    pub encrypted_data: Vec<u8>,
}

impl Cookie {
    /// Synthesizes a fresh cookie.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            expiration: Utc::now() + Duration::days(COOKIE_LIFETIME_DAYS),
            encrypted_data: vec![0; COOKIE_DATA_LEN],
        }
    }
}

/// The action a deployment instructs the client to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentAction {
    /// Evaluate a category against the device.
    Evaluate,
    /// Install the update.
    Install,
    /// Install as part of a bundle.
    Bundle,
}

impl DeploymentAction {
    /// The protocol string for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evaluate => "Evaluate",
            Self::Install => "Install",
            Self::Bundle => "Bundle",
        }
    }
}

/// The deployment record attached to every offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Deployment action.
    pub action: DeploymentAction,
    /// Deployment ID; one of the fixed protocol constants.
    pub id: u32,
    /// Auto-download flag, always `"0"`.
    pub auto_download: &'static str,
    /// Auto-select flag, always `"0"`.
    pub auto_select: &'static str,
    /// Supersedence behavior, always `"0"`.
    pub supersedence_behavior: &'static str,
    /// Whether the deployment is assigned; always true.
    pub is_assigned: bool,
    /// Deployment change date literal.
    pub last_change_time: &'static str,
}

impl Deployment {
    /// Creates a deployment with the fixed field values.
    #[must_use]
    pub const fn new(action: DeploymentAction, id: u32) -> Self {
        Self {
            action,
            id,
            auto_download: "0",
            auto_select: "0",
            supersedence_behavior: "0",
            is_assigned: true,
            last_change_time: DEPLOYMENT_LAST_CHANGE_TIME,
        }
    }
}

/// One offered update in a sync reply.
#[derive(Debug, Clone)]
pub struct OfferedUpdate {
    /// The revision handle the client echoes back in later requests.
    pub id: i32,
    /// Whether this is a leaf (installable) offer.
    pub is_leaf: bool,
    /// Shared flag; always false.
    pub is_shared: bool,
    /// Verification blob; never produced.
    pub verification: Option<String>,
    /// The core metadata fragment.
    pub xml: String,
    /// The deployment record.
    pub deployment: Deployment,
}

/// The reply to a sync request.
#[derive(Debug, Clone)]
pub struct SyncReply {
    /// A fresh cookie for the client's next call.
    pub new_cookie: Cookie,
    /// Offered updates; at most [`MAX_UPDATES_IN_RESPONSE`].
    pub new_updates: Vec<OfferedUpdate>,
    /// Whether more updates remain beyond this batch.
    pub truncated: bool,
    /// Driver sync advertisement; always `"false"`.
    pub driver_sync_not_needed: &'static str,
}

impl SyncReply {
    /// The canned empty reply (skip-software-sync and exhausted catalogs).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            new_cookie: Cookie::fresh(),
            new_updates: Vec::new(),
            truncated: false,
            driver_sync_not_needed: "false",
        }
    }
}

/// Metadata fragment kinds a client can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentType {
    /// Supplementary metadata used after selection.
    Extended,
    /// Per-language title and description properties.
    LocalizedProperties,
}

impl FragmentType {
    /// Parses the protocol string; unknown kinds are ignored by callers.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Extended" => Some(Self::Extended),
            "LocalizedProperties" => Some(Self::LocalizedProperties),
            _ => None,
        }
    }
}

/// One metadata fragment in an extended-info reply.
#[derive(Debug, Clone)]
pub struct UpdateData {
    /// The revision handle the fragment belongs to.
    pub id: i32,
    /// The fragment text.
    pub xml: String,
}

/// One downloadable file location in an extended-info reply.
#[derive(Debug, Clone)]
pub struct FileLocation {
    /// Digest bytes identifying the file.
    pub digest: Vec<u8>,
    /// Where the client should fetch it.
    pub url: String,
}

/// The reply to an extended-info request.
#[derive(Debug, Clone, Default)]
pub struct ExtendedInfo {
    /// Requested fragments, in request order per fragment kind.
    pub updates: Vec<UpdateData>,
    /// File locations for every file of the requested updates.
    pub file_locations: Vec<FileLocation>,
}
