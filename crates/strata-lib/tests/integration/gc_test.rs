use std::fs;

use more_asserts::assert_gt;
use strata_lib::VersionSpec;

use crate::common::{p, RepoHarness};

fn blob_count(h: &RepoHarness) -> usize {
    fs::read_dir(h.dir().join("content")).unwrap().count()
}

#[test]
fn test_purged_version_releases_its_blobs() {
    let h = RepoHarness::on_disk(&["main"]);
    h.write("main:/big", "only in version 1");
    h.snapshot("main");
    h.repo.remove_node(&p("main:/"), "big").unwrap();
    h.snapshot("main");
    assert_eq!(blob_count(&h), 1);

    let stats = h.repo.purge_version("main", 1).unwrap();
    assert_gt!(stats.collected, 0);
    assert_eq!(stats.released_content.len(), 1);
    assert_eq!(blob_count(&h), 0);
    assert!(h
        .repo
        .lookup(VersionSpec::Version(1), &p("main:/big"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_shared_blobs_are_kept() {
    let h = RepoHarness::on_disk(&["main"]);
    h.write("main:/f", "shared");
    h.snapshot("main");
    h.repo
        .set_mime_type(&p("main:/f"), "text/plain")
        .unwrap();
    h.snapshot("main");

    // Versions 1 and 2 hold different nodes with the same content.
    let stats = h.repo.purge_version("main", 1).unwrap();
    assert!(stats.released_content.is_empty());
    assert_eq!(blob_count(&h), 1);
    assert_eq!(h.read(VersionSpec::Head, "main:/f").unwrap(), "shared");
}

#[test]
fn test_dry_run_matches_collection() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/d");
    h.write("main:/d/f", "x");
    h.repo.remove_node(&p("main:/"), "d").unwrap();

    let preview = h.repo.gc_dry_run();
    let stats = h.repo.collect_garbage().unwrap();
    assert_eq!(preview.collected, stats.collected);
    assert_eq!(stats.collected, 2);
    assert!(!h.repo.gc_dry_run().did_collect());
}

#[test]
fn test_purging_a_store_leaves_layers_dangling() {
    let h = RepoHarness::new(&["base", "site"]);
    h.mkdir("base:/www");
    h.write("base:/www/a", "a");
    h.repo
        .create_layered_directory("base:/www", &p("site:/"), "www")
        .unwrap();
    assert_eq!(h.names(VersionSpec::Head, "site:/www").unwrap().len(), 1);

    h.repo.purge_store("base").unwrap();
    assert!(h.names(VersionSpec::Head, "site:/www").unwrap().is_empty());
}
