//! The update-offering engine.
//!
//! Converts a client's installed/cached state into the next batch of
//! offers. The four phases run strictly in order (roots, non-leaf
//! categories, approved bundles, approved leaf software) and the first
//! phase that yields at least one candidate produces the whole reply. The
//! layering matches the Windows client's own walk of the category tree:
//! until the client has cached the upper layers, offering leaves is wasted
//! work.
//!
//! Candidate order is the iteration order of the source partitions; the
//! engine never reorders within a phase. Phases gather one update past the
//! response cap purely to detect truncation; the encoder always caps the
//! reply at [`MAX_UPDATES_IN_RESPONSE`].

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::broadcast;
use uuid::Uuid;

use upsync_core::{Error, Result, UpdateIdentity};

use crate::approvals::Approvals;
use crate::fragments::{core_fragment, extended_fragment, localized_properties};
use crate::guard::CatalogGuard;
use crate::reply::{
    Cookie, Deployment, DeploymentAction, ExtendedInfo, FileLocation, FragmentType,
    MAX_UPDATES_IN_RESPONSE, OfferedUpdate, SyncReply, SyncRequest, UpdateData,
    DEPLOYMENT_ID_BUNDLE, DEPLOYMENT_ID_BUNDLED, DEPLOYMENT_ID_EVALUATE,
    DEPLOYMENT_ID_STANDALONE,
};
use crate::snapshot::Catalog;

/// Capacity of the unapproved-updates notification channel. Dispatch is
/// best effort; lagging subscribers lose batches.
const UNAPPROVED_CHANNEL_CAPACITY: usize = 16;

/// The sync decision engine.
pub struct SyncEngine {
    guard: Arc<CatalogGuard>,
    approvals: Arc<Approvals>,
    content_root: Option<String>,
    unapproved_tx: broadcast::Sender<Vec<UpdateIdentity>>,
}

impl SyncEngine {
    /// Creates an engine over the given guard and approval sets.
    ///
    /// `content_root` is the base URL for content-addressed file locations;
    /// when absent, extended-info replies carry upstream URLs instead.
    #[must_use]
    pub fn new(
        guard: Arc<CatalogGuard>,
        approvals: Arc<Approvals>,
        content_root: Option<String>,
    ) -> Self {
        let (unapproved_tx, _) = broadcast::channel(UNAPPROVED_CHANNEL_CAPACITY);
        Self {
            guard,
            approvals,
            content_root,
            unapproved_tx,
        }
    }

    /// Subscribes to batches of applicable-but-unapproved update identities.
    #[must_use]
    pub fn subscribe_unapproved(&self) -> broadcast::Receiver<Vec<UpdateIdentity>> {
        self.unapproved_tx.subscribe()
    }

    /// Answers a client sync request.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::CatalogUnavailable`] when no catalog is
    /// installed, and with [`Error::UnknownRevision`] when the client
    /// presents a revision handle the catalog does not know.
    pub fn sync_updates(&self, request: &SyncRequest) -> Result<SyncReply> {
        if request.skip_software_sync {
            return Ok(SyncReply::empty());
        }

        let catalog = self.guard.read()?;

        let installed = resolve_guids(&catalog, &request.installed_non_leaf_revisions)?;
        let cached = resolve_guids(&catalog, &request.other_cached_revisions)?;
        let excluded: HashSet<Uuid> = installed.iter().chain(cached.iter()).copied().collect();

        let roots = self.root_candidates(&catalog, &excluded)?;
        if !roots.is_empty() {
            tracing::debug!(count = roots.len(), "offering root categories");
            return self.encode_non_leaf(&catalog, &roots);
        }

        let non_leaves = self.non_leaf_candidates(&catalog, &excluded, &installed)?;
        if !non_leaves.is_empty() {
            tracing::debug!(count = non_leaves.len(), "offering non-leaf categories");
            return self.encode_non_leaf(&catalog, &non_leaves);
        }

        let bundles = self.bundle_candidates(&catalog, &excluded, &installed)?;
        if !bundles.is_empty() {
            tracing::debug!(count = bundles.len(), "offering approved bundles");
            return self.encode_software(&catalog, &bundles, true);
        }

        let leaves = self.leaf_candidates(&catalog, &excluded, &installed)?;
        if !leaves.is_empty() {
            let truncated = leaves.len() > MAX_UPDATES_IN_RESPONSE;
            tracing::debug!(count = leaves.len(), truncated, "offering leaf software");
            return self.encode_software(&catalog, &leaves, truncated);
        }

        tracing::debug!("client is in sync, empty reply");
        Ok(SyncReply::empty())
    }

    /// Phase A: root categories the client has not yet cached.
    fn root_candidates(
        &self,
        catalog: &Catalog,
        excluded: &HashSet<Uuid>,
    ) -> Result<Vec<UpdateIdentity>> {
        let mut candidates = Vec::new();
        for &guid in catalog.roots() {
            if excluded.contains(&guid) {
                continue;
            }
            let Some(identity) = catalog.latest_identity(guid) else {
                continue;
            };
            if catalog.category(&identity)?.is_superseded() {
                continue;
            }
            candidates.push(identity);
            if candidates.len() > MAX_UPDATES_IN_RESPONSE {
                break;
            }
        }
        Ok(candidates)
    }

    /// Phase B: applicable non-leaf updates.
    fn non_leaf_candidates(
        &self,
        catalog: &Catalog,
        excluded: &HashSet<Uuid>,
        installed: &HashSet<Uuid>,
    ) -> Result<Vec<UpdateIdentity>> {
        let mut candidates = Vec::new();
        for &guid in catalog.non_leaves() {
            if excluded.contains(&guid) {
                continue;
            }
            let Some(identity) = catalog.latest_identity(guid) else {
                continue;
            };
            let update = catalog.resolve(&identity)?;
            if update.is_superseded() || !update.is_applicable(installed) {
                continue;
            }
            candidates.push(identity);
            if candidates.len() > MAX_UPDATES_IN_RESPONSE {
                break;
            }
        }
        Ok(candidates)
    }

    /// Phase C: approved, applicable bundle containers.
    fn bundle_candidates(
        &self,
        catalog: &Catalog,
        excluded: &HashSet<Uuid>,
        installed: &HashSet<Uuid>,
    ) -> Result<Vec<UpdateIdentity>> {
        let mut approved = Vec::new();
        let mut unapproved = Vec::new();
        for &guid in catalog.software_leaf_guids() {
            if excluded.contains(&guid) {
                continue;
            }
            let Some(identity) = catalog.latest_identity(guid) else {
                continue;
            };
            let update = catalog.software(&identity)?;
            let Some(software) = update.as_software() else {
                continue;
            };
            if software.common.is_superseded
                || !software.common.is_applicable(installed)
                || !software.is_bundle
            {
                continue;
            }
            if self.approvals.software.contains(&identity) {
                if approved.len() <= MAX_UPDATES_IN_RESPONSE {
                    approved.push(identity);
                }
            } else {
                unapproved.push(identity);
            }
        }
        self.notify_unapproved(unapproved);
        Ok(approved)
    }

    /// Phase D: approved, applicable leaf software (bundle children and
    /// standalone updates). Collects everything; truncation is decided by
    /// the caller from the collected count.
    fn leaf_candidates(
        &self,
        catalog: &Catalog,
        excluded: &HashSet<Uuid>,
        installed: &HashSet<Uuid>,
    ) -> Result<Vec<UpdateIdentity>> {
        let mut approved = Vec::new();
        let mut unapproved = Vec::new();
        for &guid in catalog.software_leaf_guids() {
            if excluded.contains(&guid) {
                continue;
            }
            let Some(identity) = catalog.latest_identity(guid) else {
                continue;
            };
            let update = catalog.software(&identity)?;
            let Some(software) = update.as_software() else {
                continue;
            };
            if software.common.is_superseded
                || !software.common.is_applicable(installed)
                || software.is_bundle
            {
                continue;
            }
            if self.approvals.software_is_offerable(software) {
                approved.push(identity);
            } else {
                unapproved.push(identity);
            }
        }
        self.notify_unapproved(unapproved);
        Ok(approved)
    }

    fn notify_unapproved(&self, identities: Vec<UpdateIdentity>) {
        if identities.is_empty() {
            return;
        }
        tracing::debug!(count = identities.len(), "applicable updates lack approval");
        let _ = self.unapproved_tx.send(identities);
    }

    /// Encodes phase A/B candidates as evaluation offers.
    fn encode_non_leaf(
        &self,
        catalog: &Catalog,
        candidates: &[UpdateIdentity],
    ) -> Result<SyncReply> {
        let mut offers = Vec::new();
        for identity in candidates.iter().take(MAX_UPDATES_IN_RESPONSE) {
            offers.push(OfferedUpdate {
                id: catalog.latest_revision(identity.id)?,
                is_leaf: false,
                is_shared: false,
                verification: None,
                xml: core_fragment(&catalog.metadata_xml(identity)?),
                deployment: Deployment::new(DeploymentAction::Evaluate, DEPLOYMENT_ID_EVALUATE),
            });
        }
        Ok(SyncReply {
            new_cookie: Cookie::fresh(),
            new_updates: offers,
            truncated: true,
            driver_sync_not_needed: "false",
        })
    }

    /// Encodes phase C/D candidates as install offers.
    fn encode_software(
        &self,
        catalog: &Catalog,
        candidates: &[UpdateIdentity],
        truncated: bool,
    ) -> Result<SyncReply> {
        let mut offers = Vec::new();
        for identity in candidates.iter().take(MAX_UPDATES_IN_RESPONSE) {
            let software = catalog
                .software(identity)?
                .as_software()
                .ok_or_else(|| Error::internal(format!("{identity} is not software")))?;

            let action = if software.is_bundled && !software.is_bundle {
                DeploymentAction::Bundle
            } else {
                DeploymentAction::Install
            };
            let deployment_id = if software.is_bundle {
                DEPLOYMENT_ID_BUNDLE
            } else if software.is_bundled {
                DEPLOYMENT_ID_BUNDLED
            } else {
                DEPLOYMENT_ID_STANDALONE
            };

            offers.push(OfferedUpdate {
                id: catalog.latest_revision(identity.id)?,
                is_leaf: true,
                is_shared: false,
                verification: None,
                xml: core_fragment(&catalog.metadata_xml(identity)?),
                deployment: Deployment::new(action, deployment_id),
            });
        }
        Ok(SyncReply {
            new_cookie: Cookie::fresh(),
            new_updates: offers,
            truncated,
            driver_sync_not_needed: "false",
        })
    }

    /// Answers an extended-info request.
    ///
    /// # Errors
    ///
    /// Fails when no catalog is installed or any revision handle is
    /// unknown; the whole request fails, never a single entry.
    pub fn extended_update_info(
        &self,
        revisions: &[i32],
        fragments: &[FragmentType],
        languages: &[String],
    ) -> Result<ExtendedInfo> {
        let catalog = self.guard.read()?;

        let mut resolved = Vec::with_capacity(revisions.len());
        for &revision in revisions {
            let identity = catalog.identity_for_revision(revision)?;
            catalog.resolve(&identity)?;
            resolved.push((revision, identity));
        }

        let mut updates = Vec::new();
        if fragments.contains(&FragmentType::Extended) {
            for (revision, identity) in &resolved {
                updates.push(UpdateData {
                    id: *revision,
                    xml: extended_fragment(&catalog.metadata_xml(identity)?),
                });
            }
        }
        if fragments.contains(&FragmentType::LocalizedProperties) {
            for (revision, identity) in &resolved {
                let xml = localized_properties(&catalog.metadata_xml(identity)?, languages);
                if !xml.is_empty() {
                    updates.push(UpdateData { id: *revision, xml });
                }
            }
        }

        let mut seen = HashSet::new();
        let mut file_locations = Vec::new();
        for (_, identity) in &resolved {
            if !seen.insert(*identity) {
                continue;
            }
            for file in catalog.resolve(identity)?.files() {
                let Some(url) = file.urls.first() else {
                    continue;
                };
                let digest = BASE64.decode(&url.digest_base64).map_err(|e| {
                    Error::InvalidInput(format!(
                        "bad digest on file {}: {e}",
                        file.name
                    ))
                })?;
                let location = match (&self.content_root, file.content_directory()) {
                    (Some(root), Some(directory)) => {
                        let name = file.content_name().unwrap_or_default();
                        format!("{root}/Content/{directory}/{name}")
                    }
                    _ => url.url.clone(),
                };
                file_locations.push(FileLocation {
                    digest,
                    url: location,
                });
            }
        }

        Ok(ExtendedInfo {
            updates,
            file_locations,
        })
    }
}

fn resolve_guids(catalog: &Catalog, revisions: &[i32]) -> Result<HashSet<Uuid>> {
    revisions
        .iter()
        .map(|&revision| {
            catalog
                .identity_for_revision(revision)
                .map(|identity| identity.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use upsync_core::{
        CategoryKind, CategoryUpdate, MemoryMetadataSource, MetadataSource, PrerequisiteGroup,
        SoftwareUpdate, UpdateCommon,
    };

    fn engine_with_empty_catalog() -> SyncEngine {
        let guard = Arc::new(CatalogGuard::new());
        guard
            .install(Some(
                Arc::new(MemoryMetadataSource::new()) as Arc<dyn MetadataSource>
            ))
            .unwrap();
        SyncEngine::new(guard, Arc::new(Approvals::new()), None)
    }

    #[test]
    fn skip_software_sync_is_canned_and_needs_no_catalog() {
        let engine = SyncEngine::new(
            Arc::new(CatalogGuard::new()),
            Arc::new(Approvals::new()),
            None,
        );
        let reply = engine
            .sync_updates(&SyncRequest {
                skip_software_sync: true,
                ..SyncRequest::default()
            })
            .unwrap();
        assert!(reply.new_updates.is_empty());
        assert!(!reply.truncated);
        assert_eq!(reply.driver_sync_not_needed, "false");
    }

    #[test]
    fn sync_without_catalog_fails() {
        let engine = SyncEngine::new(
            Arc::new(CatalogGuard::new()),
            Arc::new(Approvals::new()),
            None,
        );
        let err = engine.sync_updates(&SyncRequest::default()).unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable));
    }

    #[test]
    fn unknown_client_revision_fails_the_request() {
        let engine = engine_with_empty_catalog();
        let err = engine
            .sync_updates(&SyncRequest {
                installed_non_leaf_revisions: vec![404],
                ..SyncRequest::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRevision { revision: 404 }));
    }

    #[test]
    fn empty_catalog_yields_empty_reply() {
        let engine = engine_with_empty_catalog();
        let reply = engine.sync_updates(&SyncRequest::default()).unwrap();
        assert!(reply.new_updates.is_empty());
        assert!(!reply.truncated);
    }

    #[tokio::test]
    async fn unapproved_software_is_broadcast() {
        let mut source = MemoryMetadataSource::new();
        let root = Uuid::new_v4();
        let root_revision = source.insert_category(
            CategoryUpdate {
                common: UpdateCommon::new(UpdateIdentity::new(root, 1)),
                kind: CategoryKind::Product,
            },
            "<Update/>",
        );

        let identity = UpdateIdentity::new(Uuid::new_v4(), 1);
        let mut software = SoftwareUpdate::new(identity);
        software.common.prerequisites = vec![PrerequisiteGroup::new(vec![root])];
        source.insert_software(software, "<Update/>");

        let guard = Arc::new(CatalogGuard::new());
        guard
            .install(Some(Arc::new(source) as Arc<dyn MetadataSource>))
            .unwrap();
        let engine = SyncEngine::new(guard, Arc::new(Approvals::new()), None);
        let mut events = engine.subscribe_unapproved();

        let reply = engine
            .sync_updates(&SyncRequest {
                installed_non_leaf_revisions: vec![root_revision],
                ..SyncRequest::default()
            })
            .unwrap();
        assert!(reply.new_updates.is_empty());

        let batch = events.try_recv().unwrap();
        assert_eq!(batch, vec![identity]);
    }
}
