//! End-to-end offering behavior over seeded in-memory catalogs.
//!
//! These tests drive the engine the way a Windows client walks the catalog:
//! first the root categories, then the non-leaf layer, then approved
//! bundles, then approved leaf software, until the client is in sync.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use upsync_catalog::{
    Approvals, CatalogGuard, DeploymentAction, FragmentType, MAX_UPDATES_IN_RESPONSE, SyncEngine,
    SyncRequest,
};
use upsync_core::{
    CategoryKind, CategoryUpdate, FileDigest, FileUrl, MemoryMetadataSource, MetadataSource,
    PrerequisiteGroup, SoftwareUpdate, UpdateCommon, UpdateFile, UpdateIdentity,
};

struct Fixture {
    source: MemoryMetadataSource,
    revisions: HashMap<Uuid, i32>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            source: MemoryMetadataSource::new(),
            revisions: HashMap::new(),
        }
    }

    fn root(&mut self) -> Uuid {
        self.root_with(|_| {})
    }

    fn root_with(&mut self, tweak: impl FnOnce(&mut CategoryUpdate)) -> Uuid {
        let id = Uuid::new_v4();
        let mut category = CategoryUpdate {
            common: UpdateCommon::new(UpdateIdentity::new(id, 1)),
            kind: CategoryKind::Product,
        };
        tweak(&mut category);
        let revision = self.source.insert_category(category, metadata_xml(id));
        self.revisions.insert(id, revision);
        id
    }

    fn category_under(&mut self, parent: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let mut category = CategoryUpdate {
            common: UpdateCommon::new(UpdateIdentity::new(id, 1)),
            kind: CategoryKind::Product,
        };
        category.common.prerequisites = vec![PrerequisiteGroup::new(vec![parent])];
        let revision = self.source.insert_category(category, metadata_xml(id));
        self.revisions.insert(id, revision);
        id
    }

    fn software_under(
        &mut self,
        parent: Uuid,
        tweak: impl FnOnce(&mut SoftwareUpdate),
    ) -> UpdateIdentity {
        let identity = UpdateIdentity::new(Uuid::new_v4(), 100);
        let mut software = SoftwareUpdate::new(identity);
        software.common.prerequisites = vec![PrerequisiteGroup::new(vec![parent])];
        tweak(&mut software);
        let revision = self.source.insert_software(software, metadata_xml(identity.id));
        self.revisions.insert(identity.id, revision);
        identity
    }

    fn rev(&self, id: Uuid) -> i32 {
        self.revisions[&id]
    }

    fn revs(&self, ids: &[Uuid]) -> Vec<i32> {
        ids.iter().map(|id| self.rev(*id)).collect()
    }

    fn engine(self, content_root: Option<&str>) -> (SyncEngine, Arc<Approvals>) {
        let guard = Arc::new(CatalogGuard::new());
        guard
            .install(Some(Arc::new(self.source) as Arc<dyn MetadataSource>))
            .unwrap();
        let approvals = Arc::new(Approvals::new());
        let engine = SyncEngine::new(
            guard,
            Arc::clone(&approvals),
            content_root.map(str::to_string),
        );
        (engine, approvals)
    }
}

fn metadata_xml(id: Uuid) -> String {
    format!(
        "<Update><UpdateIdentity UpdateID=\"{id}\"/><Properties UpdateType=\"Software\"/>\
         <LocalizedPropertiesCollection>\
         <LocalizedProperties><Language>en</Language><Title>Update {id}</Title></LocalizedProperties>\
         </LocalizedPropertiesCollection>\
         <Files><File FileName=\"{id}.cab\"/></Files></Update>"
    )
}

fn request(installed: Vec<i32>, cached: Vec<i32>) -> SyncRequest {
    SyncRequest {
        installed_non_leaf_revisions: installed,
        other_cached_revisions: cached,
        skip_software_sync: false,
    }
}

#[test]
fn empty_client_is_offered_the_root_categories() {
    let mut fixture = Fixture::new();
    let roots = [fixture.root(), fixture.root(), fixture.root()];
    // A leaf so the catalog is not category-only.
    fixture.software_under(roots[0], |_| {});
    let (engine, _) = fixture.engine(None);

    let reply = engine.sync_updates(&request(vec![], vec![])).unwrap();

    assert_eq!(reply.new_updates.len(), 3);
    assert!(reply.truncated);
    for offer in &reply.new_updates {
        assert!(!offer.is_leaf);
        assert!(!offer.is_shared);
        assert!(offer.verification.is_none());
        assert_eq!(offer.deployment.action, DeploymentAction::Evaluate);
        assert_eq!(offer.deployment.id, 15_000);
        assert_eq!(offer.deployment.last_change_time, "2019-08-06");
        assert!(offer.xml.contains("<UpdateIdentity "));
    }
}

#[test]
fn client_with_roots_is_offered_the_non_leaf_layer() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let n1 = fixture.category_under(root);
    let n2 = fixture.category_under(root);
    fixture.software_under(n1, |_| {});
    fixture.software_under(n2, |_| {});
    let installed = fixture.revs(&[root]);
    let (engine, _) = fixture.engine(None);

    let reply = engine.sync_updates(&request(installed, vec![])).unwrap();

    assert_eq!(reply.new_updates.len(), 2);
    assert!(reply.truncated);
    for offer in &reply.new_updates {
        assert!(!offer.is_leaf);
        assert_eq!(offer.deployment.action, DeploymentAction::Evaluate);
        assert_eq!(offer.deployment.id, 15_000);
    }
}

#[test]
fn approved_bundle_is_offered_before_its_children() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);

    let bundle = fixture.software_under(category, |s| s.is_bundle = true);
    let children: Vec<UpdateIdentity> = (0..5)
        .map(|_| {
            fixture.software_under(category, |s| {
                s.is_bundled = true;
                s.bundle_parents = vec![bundle];
            })
        })
        .collect();
    let installed = fixture.revs(&[root, category]);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(bundle);
    approvals.software.add_many(children);

    let reply = engine.sync_updates(&request(installed, vec![])).unwrap();

    assert_eq!(reply.new_updates.len(), 1);
    assert!(reply.truncated);
    let offer = &reply.new_updates[0];
    assert!(offer.is_leaf);
    assert_eq!(offer.deployment.action, DeploymentAction::Install);
    assert_eq!(offer.deployment.id, 20_000);
}

#[test]
fn bundled_children_ride_on_parent_approval() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);

    let bundle = fixture.software_under(category, |s| s.is_bundle = true);
    for _ in 0..5 {
        fixture.software_under(category, |s| {
            s.is_bundled = true;
            s.bundle_parents = vec![bundle];
        });
    }
    let installed = fixture.revs(&[root, category]);
    let cached = fixture.revs(&[bundle.id]);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(bundle);

    let reply = engine.sync_updates(&request(installed, cached)).unwrap();

    assert_eq!(reply.new_updates.len(), 5);
    assert!(!reply.truncated);
    for offer in &reply.new_updates {
        assert!(offer.is_leaf);
        assert_eq!(offer.deployment.action, DeploymentAction::Bundle);
        assert_eq!(offer.deployment.id, 20_001);
    }
}

#[test]
fn standalone_backlog_is_capped_at_fifty_and_truncated() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let standalones: Vec<UpdateIdentity> = (0..60)
        .map(|_| fixture.software_under(category, |_| {}))
        .collect();
    let installed = fixture.revs(&[root, category]);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add_many(standalones);

    let reply = engine.sync_updates(&request(installed, vec![])).unwrap();

    assert_eq!(reply.new_updates.len(), MAX_UPDATES_IN_RESPONSE);
    assert!(reply.truncated);
    for offer in &reply.new_updates {
        assert_eq!(offer.deployment.action, DeploymentAction::Install);
        assert_eq!(offer.deployment.id, 20_002);
    }
}

#[test]
fn exactly_fifty_leaves_is_not_truncated_but_fifty_one_is() {
    for (count, expect_truncated) in [(50usize, false), (51, true)] {
        let mut fixture = Fixture::new();
        let root = fixture.root();
        let category = fixture.category_under(root);
        let standalones: Vec<UpdateIdentity> = (0..count)
            .map(|_| fixture.software_under(category, |_| {}))
            .collect();
        let installed = fixture.revs(&[root, category]);
        let (engine, approvals) = fixture.engine(None);
        approvals.software.add_many(standalones);

        let reply = engine.sync_updates(&request(installed, vec![])).unwrap();
        assert_eq!(reply.new_updates.len(), MAX_UPDATES_IN_RESPONSE);
        assert_eq!(reply.truncated, expect_truncated, "count {count}");
    }
}

#[test]
fn superseded_root_is_never_offered() {
    let mut fixture = Fixture::new();
    let live = fixture.root();
    fixture.root_with(|c| c.common.is_superseded = true);
    let live_rev = fixture.rev(live);
    let (engine, _) = fixture.engine(None);

    let reply = engine.sync_updates(&request(vec![], vec![])).unwrap();
    assert_eq!(reply.new_updates.len(), 1);
    assert_eq!(reply.new_updates[0].id, live_rev);
}

#[test]
fn superseded_leaf_is_withheld_even_when_approved() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let dead = fixture.software_under(category, |s| s.common.is_superseded = true);
    let installed = fixture.revs(&[root, category]);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(dead);

    let reply = engine.sync_updates(&request(installed, vec![])).unwrap();
    assert!(reply.new_updates.is_empty());
    assert!(!reply.truncated);
}

#[test]
fn non_applicable_software_is_not_offered() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let reachable = fixture.category_under(root);
    let unreachable = fixture.category_under(root);
    let offered = fixture.software_under(reachable, |_| {});
    let withheld = fixture.software_under(unreachable, |_| {});
    // The client evaluated only the reachable branch; the other category
    // is merely cached, so software under it stays non-applicable.
    let installed = fixture.revs(&[root, reachable]);
    let cached = fixture.revs(&[unreachable]);
    let offered_rev = fixture.rev(offered.id);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(offered);
    approvals.software.add(withheld);

    let reply = engine.sync_updates(&request(installed, cached)).unwrap();

    assert_eq!(reply.new_updates.len(), 1);
    assert_eq!(reply.new_updates[0].id, offered_rev);
}

#[test]
fn offers_never_repeat_what_the_client_presented() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let first = fixture.software_under(category, |_| {});
    let second = fixture.software_under(category, |_| {});
    let installed = fixture.revs(&[root, category]);
    let cached = fixture.revs(&[first.id]);
    let first_rev = fixture.rev(first.id);
    let second_rev = fixture.rev(second.id);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(first);
    approvals.software.add(second);

    let reply = engine.sync_updates(&request(installed, cached)).unwrap();

    assert_eq!(reply.new_updates.len(), 1);
    let offered = reply.new_updates[0].id;
    assert_ne!(offered, first_rev);
    assert_eq!(offered, second_rev);
}

#[test]
fn phases_are_strictly_layered() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let leaf = fixture.software_under(category, |_| {});
    let root_rev = fixture.rev(root);
    let category_rev = fixture.rev(category);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(leaf);

    // Even with an approved applicable leaf pending, the root layer wins.
    let reply = engine.sync_updates(&request(vec![], vec![])).unwrap();
    assert_eq!(reply.new_updates.len(), 1);
    assert_eq!(reply.new_updates[0].id, root_rev);

    // Caching the roots exposes the next layer, never the leaf yet.
    let reply = engine.sync_updates(&request(vec![root_rev], vec![])).unwrap();
    assert_eq!(reply.new_updates.len(), 1);
    assert_eq!(reply.new_updates[0].id, category_rev);

    // With both layers presented, the leaf finally surfaces.
    let reply = engine
        .sync_updates(&request(vec![root_rev, category_rev], vec![]))
        .unwrap();
    assert_eq!(reply.new_updates.len(), 1);
    assert!(reply.new_updates[0].is_leaf);

    // Presenting everything back ends the walk.
    let leaf_rev = reply.new_updates[0].id;
    let reply = engine
        .sync_updates(&request(vec![root_rev, category_rev], vec![leaf_rev]))
        .unwrap();
    assert!(reply.new_updates.is_empty());
    assert!(!reply.truncated);
}

#[test]
fn unapproved_leaves_trigger_the_event_but_are_withheld() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let approved = fixture.software_under(category, |_| {});
    let unapproved = fixture.software_under(category, |_| {});
    let installed = fixture.revs(&[root, category]);
    let (engine, approvals) = fixture.engine(None);
    approvals.software.add(approved);
    let mut events = engine.subscribe_unapproved();

    let reply = engine.sync_updates(&request(installed, vec![])).unwrap();

    assert_eq!(reply.new_updates.len(), 1);
    let batch = events.try_recv().unwrap();
    assert_eq!(batch, vec![unapproved]);
}

#[test]
fn extended_info_preserves_request_order_and_filters_locales() {
    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let first = fixture.software_under(category, |_| {});
    let second = fixture.software_under(category, |_| {});
    let revisions = vec![fixture.rev(second.id), fixture.rev(first.id)];
    let (engine, _) = fixture.engine(None);

    let info = engine
        .extended_update_info(
            &revisions,
            &[FragmentType::Extended, FragmentType::LocalizedProperties],
            &["en".to_string()],
        )
        .unwrap();

    // Extended fragments first, in request order, then localized ones.
    assert_eq!(info.updates.len(), 4);
    assert_eq!(info.updates[0].id, revisions[0]);
    assert_eq!(info.updates[1].id, revisions[1]);
    assert!(info.updates[2].xml.contains("<Language>en</Language>"));

    let french = vec!["fr".to_string()];
    let none = engine
        .extended_update_info(&revisions, &[FragmentType::LocalizedProperties], &french)
        .unwrap();
    assert!(none.updates.is_empty());
}

#[test]
fn extended_info_rejects_unknown_revisions() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.engine(None);
    let err = engine
        .extended_update_info(&[12345], &[FragmentType::Extended], &[])
        .unwrap_err();
    assert!(matches!(
        err,
        upsync_core::Error::UnknownRevision { revision: 12345 }
    ));
}

#[test]
fn file_locations_use_the_content_root_when_configured() {
    let digest = FileDigest::new("SHA256", vec![0xAB, 0x17, 0xCD]);
    let file = UpdateFile {
        name: "payload.cab".to_string(),
        urls: vec![FileUrl {
            url: "http://upstream.example/payload.cab".to_string(),
            digest_base64: digest.to_base64(),
        }],
        digests: vec![digest.clone()],
    };

    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let software = fixture.software_under(category, |s| s.files = vec![file.clone()]);
    let revision = fixture.rev(software.id);

    let (engine, _) = fixture.engine(Some("http://srv:32150"));
    let info = engine
        .extended_update_info(&[revision], &[], &[])
        .unwrap();

    assert_eq!(info.file_locations.len(), 1);
    assert_eq!(
        info.file_locations[0].url,
        "http://srv:32150/Content/CD/ab17cd"
    );
    assert_eq!(info.file_locations[0].digest, digest.bytes);
}

#[test]
fn file_locations_fall_back_to_upstream_urls() {
    let digest = FileDigest::new("SHA256", vec![0x01, 0x02]);
    let file = UpdateFile {
        name: "payload.cab".to_string(),
        urls: vec![FileUrl {
            url: "http://upstream.example/payload.cab".to_string(),
            digest_base64: digest.to_base64(),
        }],
        digests: vec![digest],
    };

    let mut fixture = Fixture::new();
    let root = fixture.root();
    let category = fixture.category_under(root);
    let software = fixture.software_under(category, |s| s.files = vec![file]);
    let revision = fixture.rev(software.id);

    let (engine, _) = fixture.engine(None);
    let info = engine
        .extended_update_info(&[revision], &[], &[])
        .unwrap();

    assert_eq!(
        info.file_locations[0].url,
        "http://upstream.example/payload.cab"
    );
}
