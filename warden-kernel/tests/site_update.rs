use serde_json::json;
use warden_devkit::{SnapshotBuilder, TestHarness};
use warden_kernel::{DocumentStore, SiteKind, WardenError};

#[test]
fn test_acme_first_snapshot() {
    let harness = TestHarness::new();
    let site = harness.register("https://acme.test/").unwrap();
    assert_eq!(site.url, "https://acme.test");

    let outcome = harness
        .service
        .process_update(&site.id, &warden_devkit::snapshot_builder::acme())
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.warnings.is_empty());

    let site = harness.site(&site.id).unwrap();
    assert_eq!(site.name, "Acme");
    assert_eq!(site.core_version, "7.50");
    assert_eq!(site.modules.len(), 1);
    assert_eq!(site.modules[0].installed_version, "3.1");
    assert_eq!(site.js_libraries[0].name, "jquery");
    assert!(site.last_changed.is_some());

    let views = harness.module("views").unwrap();
    assert!(views.using_sites.contains(&site.id));
    assert_eq!(views.latest_release_version.as_deref(), Some("3.1"));

    harness
        .assert_signals(&["site-update", "dashboard-update"])
        .unwrap();
}

#[test]
fn test_same_snapshot_twice_changes_nothing() {
    let harness = TestHarness::new();
    let snapshot = SnapshotBuilder::new("Blog", "8.9.1")
        .module("views", "3.1")
        .security_module("token", "1.7")
        .library("jquery", "3.5.1")
        .build();

    let (first, _) = harness.register_with("https://blog.test", &snapshot).unwrap();
    let modules_after_first = harness.modules.list().unwrap();

    let outcome = harness.service.process_update(&first.id, &snapshot).unwrap();
    assert!(outcome.success);

    assert_eq!(harness.site(&first.id).unwrap(), first);
    assert_eq!(harness.modules.list().unwrap(), modules_after_first);
}

#[test]
fn test_modules_and_libraries_are_replaced() {
    let harness = TestHarness::new();
    let before = SnapshotBuilder::new("Acme", "7.50")
        .module("views", "3.1")
        .module("ctools", "1.2")
        .library("jquery", "1.4.4")
        .build();
    let (site, _) = harness.register_with("https://acme.test", &before).unwrap();

    let after = SnapshotBuilder::new("Acme Corp", "7.51")
        .module("views", "3.2")
        .build();
    harness.service.process_update(&site.id, &after).unwrap();

    let site = harness.site(&site.id).unwrap();
    assert_eq!(site.name, "Acme Corp");
    assert_eq!(site.core_version, "7.51");
    let names: Vec<&str> = site.module_names().collect();
    assert_eq!(names, vec!["views"]);
    assert!(site.js_libraries.is_empty());

    // dropped module keeps its entry, without this site
    assert!(harness.users_of("ctools").is_empty());
    assert!(harness.module("ctools").is_some());
    assert_eq!(harness.users_of("views"), vec![site.id.clone()]);
    assert_eq!(
        harness.module("views").unwrap().latest_release_version.as_deref(),
        Some("3.2")
    );
}

#[test]
fn test_missing_module_only_costs_a_warning() {
    let harness = TestHarness::with_known_modules(&["views", "ctools"]);
    let snapshot = SnapshotBuilder::new("Acme", "7.50")
        .module("views", "3.1")
        .module("panels", "3.5")
        .module("ctools", "1.2")
        .build();

    let (site, outcome) = harness.register_with("https://acme.test", &snapshot).unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("panels"));

    assert_eq!(site.modules.len(), 3);
    assert_eq!(harness.users_of("views"), vec![site.id.clone()]);
    assert_eq!(harness.users_of("ctools"), vec![site.id.clone()]);
    assert!(harness.module("panels").is_none());
    harness
        .assert_signals(&["site-update", "dashboard-update"])
        .unwrap();
}

#[test]
fn test_malformed_snapshot_is_rejected_without_side_effects() {
    let harness = TestHarness::new();
    let (site, _) = harness
        .register_with("https://acme.test", &warden_devkit::snapshot_builder::acme())
        .unwrap();
    harness.reset_signals();

    let bad = json!({
        "site_name": "Acme",
        "core": { "platform": {} },
        "contrib": [],
        "js_library": []
    });
    let err = harness.service.process_update(&site.id, &bad).unwrap_err();

    assert!(matches!(err, WardenError::MalformedSnapshot(_)));
    assert_eq!(harness.site(&site.id).unwrap(), site);
    assert_eq!(harness.users_of("views"), vec![site.id.clone()]);
    harness.assert_signals(&[]).unwrap();
}

#[test]
fn test_unknown_site_is_not_found() {
    let harness = TestHarness::new();
    let err = harness
        .service
        .process_update("nope", &warden_devkit::snapshot_builder::acme())
        .unwrap_err();
    assert!(matches!(err, WardenError::SiteNotFound(id) if id == "nope"));
}

#[test]
fn test_other_site_kinds_are_ignored() {
    let harness = TestHarness::new();
    let mut site = harness.register("https://wp.test").unwrap();
    site.kind = SiteKind::Other;
    harness.sites.save(&site).unwrap();

    let outcome = harness
        .service
        .process_update(&site.id, &warden_devkit::snapshot_builder::acme())
        .unwrap();

    assert!(outcome.success);
    assert!(harness.site(&site.id).unwrap().modules.is_empty());
    assert!(harness.module("views").is_none());
    harness.assert_signals(&[]).unwrap();
}

#[test]
fn test_shared_module_tracks_every_site() {
    let harness = TestHarness::new();
    let (a, _) = harness
        .register_with(
            "https://a.test",
            &SnapshotBuilder::new("A", "7.50").module("views", "3.1").build(),
        )
        .unwrap();
    let (b, _) = harness
        .register_with(
            "https://b.test",
            &SnapshotBuilder::new("B", "7.50").module("views", "3.10").build(),
        )
        .unwrap();

    let views = harness.module("views").unwrap();
    assert_eq!(views.using_sites.len(), 2);
    assert!(views.using_sites.contains(&a.id) && views.using_sites.contains(&b.id));
    assert_eq!(views.latest_release_version.as_deref(), Some("3.10"));
}

#[test]
fn test_store_failure_propagates_and_leaves_site_untouched() {
    use std::sync::Arc;
    use warden_devkit::{FlakyStore, MockBroker, StubConnection};
    use warden_kernel::{Dispatcher, MemoryStore, ModuleEntry, SiteRecord, SiteService, StoreError};

    let sites: Arc<MemoryStore<SiteRecord>> = Arc::new(MemoryStore::new());
    let modules: Arc<FlakyStore<ModuleEntry>> = Arc::new(FlakyStore::new());
    let broker = Arc::new(MockBroker::new());
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.subscribe_all(broker.clone());
    let service = SiteService::new(sites.clone(), modules.clone(), dispatcher, Arc::new(StubConnection::new()));

    let site = service.register_site("https://acme.test").unwrap();
    service
        .process_update(&site.id, &warden_devkit::snapshot_builder::acme())
        .unwrap();
    let before = sites.get(&site.id).unwrap().unwrap();
    broker.clear();

    modules.set_failing(true);
    let next = SnapshotBuilder::new("Acme", "7.51")
        .module("views", "3.1")
        .module("ctools", "1.2")
        .build();
    let err = service.process_update(&site.id, &next).unwrap_err();

    assert!(matches!(err, WardenError::Store(StoreError::Backend(_))));
    assert_eq!(sites.get(&site.id).unwrap().unwrap(), before);
    assert!(modules.get("ctools").unwrap().is_none());
    assert_eq!(broker.signal_names(), vec!["site-update"]);

    modules.set_failing(false);
    service.process_update(&site.id, &next).unwrap();
    let ctools = modules.get("ctools").unwrap().unwrap();
    assert!(ctools.using_sites.contains(&site.id));
    assert_eq!(sites.get(&site.id).unwrap().unwrap().core_version, "7.51");
}

#[test]
fn test_failed_site_write_leaves_no_catalog_links() {
    use std::sync::Arc;
    use warden_devkit::{FlakyStore, MockBroker, StubConnection};
    use warden_kernel::{Dispatcher, MemoryStore, ModuleEntry, SiteRecord, SiteService, StoreError};

    let sites: Arc<FlakyStore<SiteRecord>> = Arc::new(FlakyStore::new());
    let modules: Arc<MemoryStore<ModuleEntry>> = Arc::new(MemoryStore::new());
    let broker = Arc::new(MockBroker::new());
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.subscribe_all(broker.clone());
    let service = SiteService::new(sites.clone(), modules.clone(), dispatcher, Arc::new(StubConnection::new()));

    let site = service.register_site("https://acme.test").unwrap();
    service
        .process_update(&site.id, &warden_devkit::snapshot_builder::acme())
        .unwrap();
    let before = sites.get(&site.id).unwrap().unwrap();
    broker.clear();

    sites.set_failing(true);
    let with_ctools = SnapshotBuilder::new("Acme", "7.50")
        .module("views", "3.1")
        .module("ctools", "1.2")
        .build();
    let err = service.process_update(&site.id, &with_ctools).unwrap_err();

    assert!(matches!(err, WardenError::Store(StoreError::Backend(_))));
    assert_eq!(sites.get(&site.id).unwrap().unwrap(), before);
    assert!(modules.get("ctools").unwrap().is_none());
    assert_eq!(broker.signal_names(), vec!["site-update"]);

    // the next good report must not inherit links from the failed one
    sites.set_failing(false);
    let views_only = SnapshotBuilder::new("Acme", "7.50").module("views", "3.1").build();
    service.process_update(&site.id, &views_only).unwrap();

    let users = modules
        .get("ctools")
        .unwrap()
        .map(|m| m.using_sites)
        .unwrap_or_default();
    assert!(!users.contains(&site.id));
    assert!(modules.get("views").unwrap().unwrap().using_sites.contains(&site.id));
    let names: Vec<String> = sites
        .get(&site.id)
        .unwrap()
        .unwrap()
        .module_names()
        .map(str::to_string)
        .collect();
    assert_eq!(names, vec!["views"]);
}
