use strata_lib::{NodeKind, RepositoryConfig, StoreError, VersionSpec};

use crate::common::assertions::set;
use crate::common::{p, RepoHarness};

const HEAD: VersionSpec = VersionSpec::Head;

/// `base:/www` holds a small site, `site:/www` layers onto it.
fn layered_site() -> RepoHarness {
    let h = RepoHarness::new(&["base", "site"]);
    h.mkdir("base:/www");
    h.write("base:/www/index.html", "<h1>base</h1>");
    h.mkdir("base:/www/css");
    h.write("base:/www/css/style.css", "body {}");
    h.repo
        .create_layered_directory("base:/www", &p("site:/"), "www")
        .unwrap();
    h
}

#[test]
fn test_layered_directory_lists_target_entries() {
    let h = layered_site();
    assert_eq!(h.names(HEAD, "site:/www").unwrap(), set(&["css", "index.html"]));
    assert!(h
        .repo
        .get_directory_listing_direct(HEAD, &p("site:/www"))
        .unwrap()
        .is_empty());
    assert_eq!(h.read(HEAD, "site:/www/css/style.css").unwrap(), "body {}");
}

#[test]
fn test_layering_info_reports_native_store() {
    let h = layered_site();
    let info = h
        .repo
        .get_layering_info(HEAD, &p("site:/www/index.html"))
        .unwrap();
    assert!(info.background);
    assert_eq!(info.path_store, "site");
    assert_eq!(info.native_store, "base");

    let info = h.repo.get_layering_info(HEAD, &p("site:/www")).unwrap();
    assert!(!info.background);
    assert_eq!(info.native_store, "site");
}

#[test]
fn test_writing_through_a_layer_overrides_locally() {
    let h = layered_site();
    h.write("site:/www/index.html", "<h1>site</h1>");

    assert_eq!(h.read(HEAD, "site:/www/index.html").unwrap(), "<h1>site</h1>");
    assert_eq!(h.read(HEAD, "base:/www/index.html").unwrap(), "<h1>base</h1>");

    let local = h
        .repo
        .get_directory_listing_direct(HEAD, &p("site:/www"))
        .unwrap();
    assert_eq!(local.keys().cloned().collect::<Vec<_>>(), vec!["index.html"]);

    let base = h.repo.lookup(HEAD, &p("base:/www/index.html")).unwrap();
    assert_eq!(local["index.html"].predecessor, Some(base.id));
}

#[test]
fn test_override_directory_keeps_merging() {
    let h = layered_site();
    h.write("site:/www/css/print.css", "@media print {}");

    let css = h.repo.lookup(HEAD, &p("site:/www/css")).unwrap();
    assert_eq!(css.kind, NodeKind::LayeredDirectory);
    assert!(!css.primary_indirection);
    assert_eq!(css.indirection.as_deref(), Some("base:/www/css"));
    assert_eq!(
        h.names(HEAD, "site:/www/css").unwrap(),
        set(&["print.css", "style.css"])
    );
    assert_eq!(h.names(HEAD, "base:/www/css").unwrap(), set(&["style.css"]));
}

#[test]
fn test_new_directory_in_layer_derives_its_target() {
    let h = layered_site();
    h.mkdir("site:/www/img");
    assert_eq!(
        h.repo
            .get_indirection_path(HEAD, &p("site:/www/img"))
            .unwrap(),
        "base:/www/img"
    );
    // Nothing there yet, so the merge is empty.
    assert!(h.names(HEAD, "site:/www/img").unwrap().is_empty());

    h.mkdir("base:/www/img");
    h.write("base:/www/img/logo.svg", "<svg/>");
    assert_eq!(h.names(HEAD, "site:/www/img").unwrap(), set(&["logo.svg"]));
}

#[test]
fn test_remove_whites_out_and_uncover_restores() {
    let h = layered_site();
    h.repo.remove_node(&p("site:/www"), "index.html").unwrap();

    assert_eq!(h.names(HEAD, "site:/www").unwrap(), set(&["css"]));
    assert_eq!(
        h.repo.get_deleted(HEAD, &p("site:/www")).unwrap(),
        vec!["index.html".to_string()]
    );
    assert!(h
        .repo
        .lookup(HEAD, &p("site:/www/index.html"))
        .unwrap_err()
        .is_not_found());
    assert!(h.repo.lookup(HEAD, &p("base:/www/index.html")).is_ok());

    // Removing it again finds nothing.
    assert!(h
        .repo
        .remove_node(&p("site:/www"), "index.html")
        .unwrap_err()
        .is_not_found());

    h.repo.uncover(&p("site:/www"), "index.html").unwrap();
    assert_eq!(h.read(HEAD, "site:/www/index.html").unwrap(), "<h1>base</h1>");
    assert!(h.repo.get_deleted(HEAD, &p("site:/www")).unwrap().is_empty());
}

#[test]
fn test_uncover_twice_is_a_no_op() {
    let h = layered_site();
    let before = h.names(HEAD, "site:/www").unwrap();
    h.repo.uncover(&p("site:/www"), "index.html").unwrap();
    h.repo.uncover(&p("site:/www"), "index.html").unwrap();
    assert_eq!(h.names(HEAD, "site:/www").unwrap(), before);
}

#[test]
fn test_opaque_layer_remove_and_uncover() {
    let h = layered_site();
    h.repo.set_opacity(&p("site:/www"), true).unwrap();
    assert!(h.repo.lookup(HEAD, &p("site:/www")).unwrap().opaque);

    h.repo.remove_node(&p("site:/www"), "index.html").unwrap();
    assert!(!h.names(HEAD, "site:/www").unwrap().contains("index.html"));

    h.repo.uncover(&p("site:/www"), "index.html").unwrap();
    assert_eq!(h.read(HEAD, "site:/www/index.html").unwrap(), "<h1>base</h1>");
}

#[test]
fn test_opaque_parent_passes_no_target_down() {
    let h = layered_site();
    h.mkdir("site:/www/img");
    h.repo.set_opacity(&p("site:/www"), true).unwrap();

    let img = h.repo.lookup(HEAD, &p("site:/www/img")).unwrap();
    assert!(img.indirection.is_none());
    assert!(matches!(
        h.repo.get_indirection_path(HEAD, &p("site:/www/img")),
        Err(StoreError::InvalidArgument(_))
    ));
}

#[test]
fn test_local_entry_wins_over_whiteout() {
    let h = layered_site();
    h.repo.remove_node(&p("site:/www"), "index.html").unwrap();
    h.write("site:/www/index.html", "replacement");

    assert_eq!(h.read(HEAD, "site:/www/index.html").unwrap(), "replacement");
    assert!(h.names(HEAD, "site:/www").unwrap().contains("index.html"));
}

#[test]
fn test_make_primary_survives_retarget() {
    let h = layered_site();
    h.write("site:/www/css/print.css", "");
    h.repo.make_primary(&p("site:/www/css")).unwrap();
    assert!(h.repo.lookup(HEAD, &p("site:/www/css")).unwrap().primary_indirection);

    h.mkdir("base:/other");
    h.repo
        .retarget_layered_directory(&p("site:/www"), "base:/other")
        .unwrap();
    assert!(h.names(HEAD, "site:/www").unwrap().contains("css"));
    assert!(!h.names(HEAD, "site:/www").unwrap().contains("index.html"));
    assert_eq!(
        h.repo
            .get_indirection_path(HEAD, &p("site:/www/css"))
            .unwrap(),
        "base:/www/css"
    );
}

#[test]
fn test_layered_file_reads_its_target() {
    let h = layered_site();
    h.repo
        .create_layered_file("base:/www/index.html", &p("site:/"), "home.html")
        .unwrap();
    assert_eq!(h.read(HEAD, "site:/home.html").unwrap(), "<h1>base</h1>");

    h.write("base:/www/index.html", "<h1>changed</h1>");
    assert_eq!(h.read(HEAD, "site:/home.html").unwrap(), "<h1>changed</h1>");
}

#[test]
fn test_committed_layer_keeps_its_snapshot_view() {
    let h = layered_site();
    let at_snapshot = h.names(HEAD, "site:/www").unwrap();
    let v = h.snapshot("site");
    let committed = VersionSpec::Version(v);
    assert_eq!(h.names(committed, "site:/www").unwrap(), at_snapshot);

    h.write("base:/www/late.html", "late");
    h.write("base:/www/index.html", "<h1>changed</h1>");
    h.snapshot("base");
    h.write("base:/www/later.html", "later");
    h.snapshot("base");

    assert!(h.names(HEAD, "site:/www").unwrap().contains("later.html"));
    assert_eq!(h.names(committed, "site:/www").unwrap(), at_snapshot);
    assert_eq!(h.read(committed, "site:/www/index.html").unwrap(), "<h1>base</h1>");
}

#[test]
fn test_snapshot_pins_changed_target_store_only() {
    let h = layered_site();
    assert_eq!(h.repo.get_next_version_id("base").unwrap(), 1);

    h.snapshot("site");
    assert_eq!(h.repo.get_next_version_id("base").unwrap(), 2);

    // Nothing changed in base, so its latest version is reused.
    h.repo.create_file(&p("site:/"), "extra").unwrap();
    h.snapshot("site");
    assert_eq!(h.repo.get_next_version_id("base").unwrap(), 2);

    h.write("base:/www/new.html", "new");
    let v = h.snapshot("site");
    assert_eq!(h.repo.get_next_version_id("base").unwrap(), 3);
    assert!(h
        .names(VersionSpec::Version(v), "site:/www")
        .unwrap()
        .contains("new.html"));
}

#[test]
fn test_stores_layered_onto_each_other_snapshot_once() {
    let h = layered_site();
    h.mkdir("site:/pub");
    h.write("site:/pub/feed.xml", "<feed/>");
    h.repo
        .create_layered_directory("site:/pub", &p("base:/"), "shared")
        .unwrap();

    let v = h.snapshot("site");
    assert_eq!(v, 1);
    assert_eq!(h.repo.get_next_version_id("site").unwrap(), 2);
    assert_eq!(h.repo.get_next_version_id("base").unwrap(), 2);

    h.write("site:/pub/late.xml", "late");
    assert_eq!(
        h.names(VersionSpec::Version(1), "base:/shared").unwrap(),
        set(&["feed.xml"])
    );
    assert_eq!(
        h.names(VersionSpec::Version(v), "site:/www").unwrap(),
        set(&["css", "index.html"])
    );
}

#[test]
fn test_purged_pinned_version_leaves_layer_dangling() {
    let h = layered_site();
    let v = h.snapshot("site");
    h.snapshot("base");

    h.repo.purge_version("base", 1).unwrap();
    assert!(h.names(VersionSpec::Version(v), "site:/www").unwrap().is_empty());
    assert_eq!(h.names(HEAD, "site:/www").unwrap(), set(&["css", "index.html"]));
}

#[test]
fn test_rolled_back_snapshot_leaves_target_store_alone() {
    let h = layered_site();
    let result = h.repo.transaction(|txn| {
        txn.create_snapshot("site", None, None)?;
        txn.create_directory(&p("site:/"), "www")
    });
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    assert_eq!(h.repo.get_next_version_id("base").unwrap(), 1);
    assert_eq!(h.repo.get_next_version_id("site").unwrap(), 1);
}

#[test]
fn test_pinned_target_version() {
    let h = RepoHarness::new(&["base", "site"]);
    h.mkdir("base:/www");
    h.write("base:/www/a", "1");
    let v = h.snapshot("base");
    h.write("base:/www/b", "2");

    h.repo
        .create_layered_directory(&format!("base@{}:/www", v), &p("site:/"), "www")
        .unwrap();
    assert_eq!(h.names(HEAD, "site:/www").unwrap(), set(&["a"]));
}

#[test]
fn test_dangling_target_is_empty() {
    let h = RepoHarness::new(&["site"]);
    h.repo
        .create_layered_directory("gone:/www", &p("site:/"), "www")
        .unwrap();
    assert!(h.names(HEAD, "site:/www").unwrap().is_empty());
    assert!(h
        .repo
        .lookup(HEAD, &p("site:/www/anything"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_mutual_layers_report_a_cycle() {
    let h = RepoHarness::new(&["main"]);
    h.repo
        .create_layered_directory("/b", &p("main:/"), "a")
        .unwrap();
    h.repo
        .create_layered_directory("/a", &p("main:/"), "b")
        .unwrap();

    assert!(matches!(
        h.repo.lookup(HEAD, &p("main:/a/x")),
        Err(StoreError::LayeringCycle(_))
    ));
    assert!(matches!(
        h.repo.get_directory_listing(HEAD, &p("main:/b")),
        Err(StoreError::LayeringCycle(_))
    ));
}

#[test]
fn test_retarget_into_a_cycle() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/t");
    h.repo
        .create_layered_directory("/t", &p("main:/"), "a")
        .unwrap();
    h.repo
        .create_layered_directory("/a", &p("main:/"), "b")
        .unwrap();
    assert!(h.names(HEAD, "main:/b").unwrap().is_empty());

    h.repo
        .retarget_layered_directory(&p("main:/a"), "/b")
        .unwrap();
    assert!(matches!(
        h.repo.lookup(HEAD, &p("main:/b/x")),
        Err(StoreError::LayeringCycle(_))
    ));
}

#[test]
fn test_long_chains_hit_the_depth_limit() {
    let config = RepositoryConfig::default().with_max_indirection_depth(3);
    let h = RepoHarness::with_config(config, &["main"]);
    h.mkdir("main:/end");
    h.write("main:/end/x", "x");
    for (name, target) in [("l1", "/l2"), ("l2", "/l3"), ("l3", "/l4"), ("l4", "/end")] {
        h.repo
            .create_layered_directory(target, &p("main:/"), name)
            .unwrap();
    }

    assert_eq!(h.read(HEAD, "main:/l3/x").unwrap(), "x");
    assert!(matches!(
        h.repo.lookup(HEAD, &p("main:/l1/x")),
        Err(StoreError::IndirectionTooDeep { limit: 3, .. })
    ));
}
