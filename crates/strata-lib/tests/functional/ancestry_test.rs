use strata_lib::{NodeId, VersionSpec};

use crate::common::{p, RepoHarness};

#[test]
fn test_branch_shares_ancestor_with_source() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/a");
    h.write("main:/a/b", "content");
    h.mkdir("main:/c");
    let v = h.snapshot("main");

    h.repo
        .create_branch(VersionSpec::Version(v), &p("main:/a/b"), &p("main:/c"), "d")
        .unwrap();

    let source = h.repo.lookup(VersionSpec::Version(v), &p("main:/a/b")).unwrap();
    let branch = h.repo.lookup(VersionSpec::Head, &p("main:/c/d")).unwrap();
    assert_ne!(source.id, branch.id);
    assert_eq!(branch.predecessor, Some(source.id));

    let ancestor = h
        .repo
        .get_common_ancestor(source.id, branch.id)
        .unwrap()
        .unwrap();
    assert_eq!(ancestor.id, source.id);
    assert_eq!(h.read(VersionSpec::Head, "main:/c/d").unwrap(), "content");
}

#[test]
fn test_branch_into_another_store() {
    let h = RepoHarness::new(&["main", "work"]);
    h.mkdir("main:/src");
    h.write("main:/src/lib.rs", "fn main() {}");

    h.repo
        .create_branch(VersionSpec::Head, &p("main:/src"), &p("work:/"), "src")
        .unwrap();
    h.write("work:/src/lib.rs", "fn changed() {}");

    assert_eq!(h.read(VersionSpec::Head, "main:/src/lib.rs").unwrap(), "fn main() {}");
    assert_eq!(
        h.read(VersionSpec::Head, "work:/src/lib.rs").unwrap(),
        "fn changed() {}"
    );

    let left = h.repo.lookup(VersionSpec::Head, &p("main:/src/lib.rs")).unwrap();
    let right = h.repo.lookup(VersionSpec::Head, &p("work:/src/lib.rs")).unwrap();
    let ancestor = h.repo.get_common_ancestor(left.id, right.id).unwrap();
    assert_eq!(ancestor.map(|d| d.id), Some(left.id));
}

#[test]
fn test_unrelated_nodes_have_no_ancestor() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/x", "x");
    h.write("main:/y", "y");
    let x = h.repo.lookup(VersionSpec::Head, &p("main:/x")).unwrap();
    let y = h.repo.lookup(VersionSpec::Head, &p("main:/y")).unwrap();
    assert!(h.repo.get_common_ancestor(x.id, y.id).unwrap().is_none());
}

#[test]
fn test_history_follows_snapshots() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/f", "1");
    h.snapshot("main");
    h.write("main:/f", "2");
    h.snapshot("main");
    h.write("main:/f", "3");

    let head = h.repo.lookup(VersionSpec::Head, &p("main:/f")).unwrap();
    let history = h.repo.get_history(head.id, 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].id,
        h.repo.lookup(VersionSpec::Version(2), &p("main:/f")).unwrap().id
    );
    assert_eq!(
        history[1].id,
        h.repo.lookup(VersionSpec::Version(1), &p("main:/f")).unwrap().id
    );
    assert_eq!(h.repo.get_history(head.id, 1).unwrap().len(), 1);
}

#[test]
fn test_revert_restores_old_content() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/f", "good");
    let v = h.snapshot("main");
    h.write("main:/f", "bad");

    let old = h.repo.lookup(VersionSpec::Version(v), &p("main:/f")).unwrap();
    let replaced = h.repo.lookup(VersionSpec::Head, &p("main:/f")).unwrap();
    let reverted = h.repo.revert(&p("main:/f"), old.id).unwrap();

    assert_eq!(h.read(VersionSpec::Head, "main:/f").unwrap(), "good");
    assert_eq!(reverted.predecessor, Some(replaced.id));
}

#[test]
fn test_a_path_finds_head_then_versions() {
    let h = RepoHarness::new(&["main"]);
    h.mkdir("main:/d");
    h.write("main:/d/f", "x");
    let f = h.repo.lookup(VersionSpec::Head, &p("main:/d/f")).unwrap();

    let (version, path) = h.repo.get_a_path(f.id).unwrap().unwrap();
    assert_eq!(version, VersionSpec::Head);
    assert_eq!(path.to_string(), "main:/d/f");

    let v = h.snapshot("main");
    h.repo.remove_node(&p("main:/d"), "f").unwrap();
    let (version, path) = h.repo.get_a_path(f.id).unwrap().unwrap();
    assert_eq!(version, VersionSpec::Version(v));
    assert_eq!(path, p(&format!("main@{}:/d/f", v)));

    assert!(h.repo.get_node(NodeId(u64::MAX)).unwrap_err().is_not_found());
}
