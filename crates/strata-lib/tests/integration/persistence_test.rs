use std::fs;

use strata_lib::{PropertyValue, QName, StoreError, StrataProject, VersionSpec};

use crate::common::assertions::set;
use crate::common::{p, RepoHarness};

#[test]
fn test_repository_survives_reopen() {
    let mut h = RepoHarness::on_disk(&["base", "site"]);
    h.mkdir("base:/www");
    h.write("base:/www/index.html", "hello");
    h.repo
        .create_layered_directory("base:/www", &p("site:/"), "www")
        .unwrap();
    h.repo
        .set_store_property("site", QName::new("cm", "title"), PropertyValue::Text("Site".into()))
        .unwrap();
    let v = h.snapshot("site");
    h.repo.remove_node(&p("site:/www"), "index.html").unwrap();

    h.reopen();

    assert_eq!(h.repo.get_next_version_id("site").unwrap(), v + 1);
    assert!(h.names(VersionSpec::Head, "site:/www").unwrap().is_empty());
    assert_eq!(
        h.names(VersionSpec::Version(v), "site:/www").unwrap(),
        set(&["index.html"])
    );
    assert_eq!(h.read(VersionSpec::Head, "base:/www/index.html").unwrap(), "hello");
    assert_eq!(
        h.repo
            .get_store_property("site", &QName::new("cm", "title"))
            .unwrap(),
        Some(PropertyValue::Text("Site".into()))
    );
}

#[test]
fn test_new_ids_continue_after_reopen() {
    let mut h = RepoHarness::on_disk(&["main"]);
    h.write("main:/a", "a");
    let a = h.repo.lookup(VersionSpec::Head, &p("main:/a")).unwrap();

    h.reopen();
    h.write("main:/b", "b");
    let b = h.repo.lookup(VersionSpec::Head, &p("main:/b")).unwrap();
    assert!(b.id > a.id);
}

#[test]
fn test_failed_operation_leaves_disk_state_alone() {
    let mut h = RepoHarness::on_disk(&["main"]);
    h.mkdir("main:/d");
    let state_path = h.dir().join("state.json");
    let before = fs::read_to_string(&state_path).unwrap();

    assert!(matches!(
        h.repo.create_directory(&p("main:/"), "d"),
        Err(StoreError::AlreadyExists(_))
    ));
    assert_eq!(fs::read_to_string(&state_path).unwrap(), before);

    h.reopen();
    assert_eq!(h.names(VersionSpec::Head, "main:/").unwrap(), set(&["d"]));
}

#[test]
fn test_corrupt_state_is_reported() {
    let h = RepoHarness::on_disk(&[]);
    fs::write(h.dir().join("state.json"), "{ not json").unwrap();
    let project = StrataProject::open(h.dir()).unwrap();
    assert!(matches!(project.repository(), Err(StoreError::Json(_))));
}
