use more_asserts::{assert_ge, assert_gt};
use proptest::prelude::*;
use strata_lib::{StoreError, VersionSpec};

use crate::common::assertions::set;
use crate::common::{p, RepoHarness};

#[test]
fn test_site_history_is_frozen_per_version() {
    let h = RepoHarness::new(&["site1"]);
    assert_eq!(h.repo.get_next_version_id("site1").unwrap(), 1);

    h.mkdir("site1:/www");
    assert_eq!(h.snapshot("site1"), 1);
    h.repo.create_file(&p("site1:/www"), "index.html").unwrap();
    assert_eq!(h.snapshot("site1"), 2);

    assert_eq!(
        h.names(VersionSpec::Version(2), "site1:/www").unwrap(),
        set(&["index.html"])
    );
    assert!(h.names(VersionSpec::Version(1), "site1:/www").unwrap().is_empty());
    assert!(h.names(VersionSpec::Version(0), "site1:/").unwrap().is_empty());
}

#[test]
fn test_head_edits_never_reach_a_snapshot() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/docs");
    h.write("main:/docs/a.txt", "first");
    let v = h.snapshot("main");

    h.write("main:/docs/a.txt", "second");
    h.write("main:/docs/b.txt", "new");
    h.repo.remove_node(&p("main:/"), "docs").unwrap();
    h.mkdir("main:/docs");

    assert_eq!(h.read(VersionSpec::Version(v), "main:/docs/a.txt").unwrap(), "first");
    assert_eq!(
        h.names(VersionSpec::Version(v), "main:/docs").unwrap(),
        set(&["a.txt"])
    );
    assert!(h.names(VersionSpec::Head, "main:/docs").unwrap().is_empty());
}

#[test]
fn test_snapshot_shares_until_written() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/f", "x");
    let v = h.snapshot("main");

    let frozen = h.repo.lookup(VersionSpec::Version(v), &p("main:/f")).unwrap();
    let head = h.repo.lookup(VersionSpec::Head, &p("main:/f")).unwrap();
    assert_eq!(frozen.id, head.id);
    assert!(!head.mutable);

    h.write("main:/f", "y");
    let head = h.repo.lookup(VersionSpec::Head, &p("main:/f")).unwrap();
    assert_ne!(frozen.id, head.id);
    assert_eq!(head.predecessor, Some(frozen.id));
    assert!(head.mutable);
}

#[test]
fn test_committed_versions_reject_writes() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/d");
    let v = h.snapshot("main");
    let at_v = p(&format!("main@{}:/d", v));
    assert!(matches!(
        h.repo.create_file(&at_v, "f"),
        Err(StoreError::ImmutableVersion(_))
    ));
    assert!(matches!(
        h.repo.set_opacity(&at_v, true),
        Err(StoreError::ImmutableVersion(_))
    ));
}

#[test]
fn test_version_in_path_and_argument_must_agree() {
    let h = RepoHarness::new(&["main"]);
    h.snapshot("main");
    assert!(h.repo.lookup(VersionSpec::Version(1), &p("main@1:/")).is_ok());
    assert!(h.repo.lookup(VersionSpec::Head, &p("main@1:/")).is_ok());
    assert!(matches!(
        h.repo.lookup(VersionSpec::Version(0), &p("main@1:/")),
        Err(StoreError::InvalidArgument(_))
    ));
}

#[test]
fn test_purged_version_ids_are_not_reused() {
    let h = RepoHarness::new(&["main"]);
    h.snapshot("main");
    h.snapshot("main");
    h.repo.purge_version("main", 1).unwrap();

    let ids: Vec<u32> = h
        .repo
        .get_store_versions("main")
        .unwrap()
        .iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(ids, vec![0, 2]);
    assert_eq!(h.snapshot("main"), 3);
    assert_eq!(h.repo.get_latest_snapshot_id("main").unwrap(), Some(3));
}

#[test]
fn test_only_version_cannot_be_purged() {
    let h = RepoHarness::new(&["main"]);
    let err = h.repo.purge_version("main", 0).unwrap_err();
    assert!(matches!(
        err,
        StoreError::PurgeActiveVersion { version: 0, .. }
    ));
}

#[test]
fn test_versions_between_filters_by_time() {
    let h = RepoHarness::new(&["main"]);
    h.snapshot("main");
    let all = h.repo.get_store_versions("main").unwrap();
    let first = all[0].created;
    let last = all[all.len() - 1].created;

    let since_last = h
        .repo
        .get_store_versions_between("main", Some(last), None)
        .unwrap();
    assert!(since_last.iter().all(|v| v.created >= last));
    let until_first = h
        .repo
        .get_store_versions_between("main", None, Some(first))
        .unwrap();
    assert_ge!(until_first.len(), 1);
    assert!(until_first.iter().all(|v| v.created <= first));
}

#[derive(Debug, Clone)]
enum VersionOp {
    Snapshot,
    Write(u8),
    Purge(u32),
}

fn version_op() -> impl Strategy<Value = VersionOp> {
    prop_oneof![
        Just(VersionOp::Snapshot),
        (0u8..4).prop_map(VersionOp::Write),
        (0u32..8).prop_map(VersionOp::Purge),
    ]
}

proptest! {
    #[test]
    fn prop_next_version_id_only_grows_by_snapshot(ops in prop::collection::vec(version_op(), 1..24)) {
        let h = RepoHarness::new(&["main"]);
        let mut expected = 1u32;

        for op in ops {
            let before = h.repo.get_next_version_id("main").unwrap();
            match op {
                VersionOp::Snapshot => {
                    let id = h.repo.create_snapshot("main", None, None).unwrap();
                    prop_assert_eq!(id, before);
                    expected += 1;
                }
                VersionOp::Write(n) => {
                    h.write(&format!("main:/f{}", n), "data");
                }
                VersionOp::Purge(v) => {
                    let _ = h.repo.purge_version("main", v);
                }
            }
            let after = h.repo.get_next_version_id("main").unwrap();
            prop_assert_eq!(after, expected);
            assert_ge!(after, before);
            for v in h.repo.get_store_versions("main").unwrap() {
                assert_gt!(after, v.id);
            }
            prop_assert!(h.repo.get_latest_snapshot_id("main").unwrap().is_some());
        }
    }
}
