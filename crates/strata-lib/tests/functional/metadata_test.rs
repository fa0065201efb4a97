use strata_lib::{
    AspectDictionary, PropertyValue, QName, Repository, RepositoryConfig, StoreError, VersionSpec,
};

use crate::common::{p, RepoHarness};

fn q(local: &str) -> QName {
    QName::new("cm", local)
}

#[test]
fn test_properties_are_versioned() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/doc", "text");
    h.repo
        .set_node_property(&p("main:/doc"), q("title"), PropertyValue::Text("Draft".into()))
        .unwrap();
    let v = h.snapshot("main");
    h.repo
        .set_node_property(&p("main:/doc"), q("title"), PropertyValue::Text("Final".into()))
        .unwrap();

    assert_eq!(
        h.repo
            .get_node_property(VersionSpec::Version(v), &p("main:/doc"), &q("title"))
            .unwrap(),
        Some(PropertyValue::Text("Draft".into()))
    );
    assert_eq!(
        h.repo
            .get_node_property(VersionSpec::Head, &p("main:/doc"), &q("title"))
            .unwrap(),
        Some(PropertyValue::Text("Final".into()))
    );
}

#[test]
fn test_property_edit_through_layer_overrides() {
    let h = RepoHarness::new(&["base", "site"]);
    h.mkdir("base:/www");
    h.write("base:/www/page", "p");
    h.repo
        .create_layered_directory("base:/www", &p("site:/"), "www")
        .unwrap();

    h.repo
        .set_node_property(&p("site:/www/page"), q("owner"), PropertyValue::Text("site".into()))
        .unwrap();
    assert!(h
        .repo
        .get_node_properties(VersionSpec::Head, &p("base:/www/page"))
        .unwrap()
        .is_empty());
    assert_eq!(h.read(VersionSpec::Head, "site:/www/page").unwrap(), "p");
}

#[test]
fn test_validator_rejects_unknown_aspect() {
    let dictionary = AspectDictionary::new().with_aspect(q("titled"), vec![q("title")]);
    let repo = Repository::with_validator(RepositoryConfig::default(), Box::new(dictionary));
    repo.create_store("main").unwrap();
    repo.create_file(&p("main:/"), "f").unwrap();

    assert!(matches!(
        repo.add_aspect(&p("main:/f"), q("unknown")),
        Err(StoreError::Validation(_))
    ));
    repo.add_aspect(&p("main:/f"), q("titled")).unwrap();
    assert!(repo
        .has_aspect(VersionSpec::Head, &p("main:/f"), &q("titled"))
        .unwrap());
}

#[test]
fn test_mime_type_and_encoding() {
    let h = RepoHarness::new(&["main"]);
    h.write("main:/page.html", "<p/>");
    h.repo.set_mime_type(&p("main:/page.html"), "text/html").unwrap();
    h.repo.set_encoding(&p("main:/page.html"), "utf-8").unwrap();

    let desc = h.repo.lookup(VersionSpec::Head, &p("main:/page.html")).unwrap();
    assert_eq!(desc.mime_type.as_deref(), Some("text/html"));
    assert_eq!(desc.encoding.as_deref(), Some("utf-8"));
    assert!(h.repo.set_mime_type(&p("main:/"), "text/plain").is_err());
}

#[test]
fn test_store_properties_match_like_patterns() {
    let h = RepoHarness::new(&["a", "b"]);
    h.repo
        .set_store_property("a", q("site.title"), PropertyValue::Text("A".into()))
        .unwrap();
    h.repo
        .set_store_property("b", q("site.owner"), PropertyValue::Text("B".into()))
        .unwrap();
    h.repo
        .set_store_property("b", q("build"), PropertyValue::Int(7))
        .unwrap();

    let found = h.repo.query_stores_property_key("{cm}site.%");
    assert_eq!(found.len(), 2);
    assert_eq!(found["b"].len(), 1);

    h.repo.delete_store_property("b", &q("build")).unwrap();
    assert!(h
        .repo
        .delete_store_property("b", &q("build"))
        .unwrap_err()
        .is_not_found());
}
