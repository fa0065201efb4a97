//! Common test utilities and harnesses for Strata
//!
//! [`RepoHarness`] wraps a [`Repository`] together with whatever temporary
//! directory backs it, and offers short helpers for paths and listings.

use std::collections::BTreeSet;
use std::path::Path;

use strata_lib::{
    QualifiedPath, Repository, RepositoryConfig, StoreError, StrataProject, VersionSpec,
};
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, StoreError>;

/// Parse a qualified path, panicking on malformed test input.
pub fn p(raw: &str) -> QualifiedPath {
    QualifiedPath::parse(raw).unwrap_or_else(|e| panic!("bad test path {}: {}", raw, e))
}

pub struct RepoHarness {
    pub repo: Repository,
    temp: Option<TempDir>,
}

impl RepoHarness {
    /// In-memory repository with the given stores.
    pub fn new(stores: &[&str]) -> Self {
        Self::with_config(RepositoryConfig::default(), stores)
    }

    pub fn with_config(config: RepositoryConfig, stores: &[&str]) -> Self {
        let repo = Repository::with_config(config);
        for store in stores {
            repo.create_store(store).unwrap();
        }
        Self { repo, temp: None }
    }

    /// Repository in a fresh on-disk project directory.
    pub fn on_disk(stores: &[&str]) -> Self {
        let temp = TempDir::new().unwrap();
        let project = StrataProject::init(temp.path(), RepositoryConfig::default()).unwrap();
        let repo = project.repository().unwrap();
        for store in stores {
            repo.create_store(store).unwrap();
        }
        Self {
            repo,
            temp: Some(temp),
        }
    }

    /// Directory backing an on-disk harness.
    pub fn dir(&self) -> &Path {
        self.temp
            .as_ref()
            .map(|t| t.path())
            .expect("harness is in memory")
    }

    /// Drop the open repository and load it again from disk.
    pub fn reopen(&mut self) {
        let repo = StrataProject::open(self.dir())
            .and_then(|project| project.repository())
            .unwrap();
        self.repo = repo;
    }

    pub fn mkdir(&self, path: &str) {
        let path = p(path);
        let (parent, name) = path.split_last().unwrap();
        self.repo.create_directory(&parent, name).unwrap();
    }

    pub fn write(&self, path: &str, data: &str) {
        let path = p(path);
        let (parent, name) = path.split_last().unwrap();
        self.repo.write_file(&parent, name, data.as_bytes()).unwrap();
    }

    pub fn read(&self, version: VersionSpec, path: &str) -> TestResult<String> {
        let bytes = self.repo.read_file(version, &p(path))?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    /// Names in the merged listing of `path`.
    pub fn names(&self, version: VersionSpec, path: &str) -> TestResult<BTreeSet<String>> {
        Ok(self
            .repo
            .get_directory_listing(version, &p(path))?
            .into_keys()
            .collect())
    }

    pub fn snapshot(&self, store: &str) -> u32 {
        self.repo.create_snapshot(store, None, None).unwrap()
    }
}

pub mod assertions {
    use std::collections::BTreeSet;

    /// Build a name set from string literals.
    pub fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }
}
