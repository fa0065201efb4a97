use strata_lib::{StoreError, VersionSpec};

use crate::common::assertions::set;
use crate::common::{p, RepoHarness};

#[test]
fn test_failed_closure_rolls_back_every_step() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/keep");
    let v = h.snapshot("main");

    let result = h.repo.transaction(|txn| {
        txn.create_directory(&p("main:/"), "new")?;
        txn.create_file(&p("main:/keep"), "f")?;
        txn.create_snapshot("main", None, None)?;
        txn.create_store("other")?;
        txn.create_directory(&p("main:/"), "keep")
    });
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));

    assert_eq!(h.names(VersionSpec::Head, "main:/").unwrap(), set(&["keep"]));
    assert!(h.names(VersionSpec::Head, "main:/keep").unwrap().is_empty());
    assert_eq!(h.repo.get_next_version_id("main").unwrap(), v + 1);
    assert!(h.repo.get_store("other").unwrap_err().is_not_found());
}

#[test]
fn test_rolled_back_promotion_keeps_head_shared() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/d");
    h.snapshot("main");
    let root_before = h.repo.get_store_root(VersionSpec::Head, "main").unwrap();

    let mut txn = h.repo.begin();
    txn.create_file(&p("main:/d"), "f").unwrap();
    txn.rollback();

    let root_after = h.repo.get_store_root(VersionSpec::Head, "main").unwrap();
    assert_eq!(root_before.id, root_after.id);
    assert!(!root_after.mutable);
}

#[test]
fn test_explicit_commit_keeps_changes() {
    let h = RepoHarness::new(&["main"]);
    let mut txn = h.repo.begin();
    txn.create_directory(&p("main:/"), "a").unwrap();
    txn.create_directory(&p("main:/a"), "b").unwrap();
    assert!(txn
        .reader()
        .lookup(VersionSpec::Head, &p("main:/a/b"))
        .is_ok());
    txn.commit().unwrap();

    assert!(h.repo.lookup(VersionSpec::Head, &p("main:/a/b")).is_ok());
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let h = RepoHarness::new(&["main"]);
    {
        let mut txn = h.repo.begin();
        txn.create_directory(&p("main:/"), "gone").unwrap();
    }
    assert!(h
        .repo
        .lookup(VersionSpec::Head, &p("main:/gone"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_concurrent_readers_see_committed_state() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/f", "v1");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                assert_eq!(h.read(VersionSpec::Head, "main:/f").unwrap(), "v1");
            });
        }
    });
}
