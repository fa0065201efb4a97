//! On-disk repository directories
//!
//! A repository directory holds everything needed to reopen a repository:
//!
//! ```text
//! <dir>/meta/repository.toml   identity and configuration
//! <dir>/state.json             nodes, stores and versions
//! <dir>/content/               one file per content blob
//! ```

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::RepositoryConfig;
use crate::content::DirContentStore;
use crate::error::{Result, StoreError};
use crate::repository::Repository;

const META_DIR: &str = "meta";
const META_FILE: &str = "repository.toml";
const STATE_FILE: &str = "state.json";
const CONTENT_DIR: &str = "content";

/// A repository directory on disk.
#[derive(Debug, Clone)]
pub struct StrataProject {
    /// Root of the repository directory
    pub project_dir: PathBuf,
    /// Path to the metadata directory
    pub meta_dir: PathBuf,
    uuid: String,
    created: String,
    config: RepositoryConfig,
}

/// Contents of `meta/repository.toml`
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ProjectMetadata {
    pub repository: RepositorySection,
    #[serde(default)]
    pub config: RepositoryConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RepositorySection {
    pub uuid: String,
    pub created: String,
}

impl StrataProject {
    /// Create a new repository directory. Fails if one already exists there.
    pub fn init(project_dir: &Path, config: RepositoryConfig) -> Result<Self> {
        let meta_dir = project_dir.join(META_DIR);
        if meta_dir.join(META_FILE).exists() {
            return Err(StoreError::AlreadyExists(format!(
                "repository at {}",
                project_dir.display()
            )));
        }
        std::fs::create_dir_all(&meta_dir)?;
        std::fs::create_dir_all(project_dir.join(CONTENT_DIR))?;

        let project = Self {
            project_dir: project_dir.to_path_buf(),
            meta_dir,
            uuid: uuid::Uuid::new_v4().to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            config,
        };
        project.write_metadata()?;
        Repository::with_config(project.config.clone()).save(&project.state_path())?;
        info!("Initialized repository {} at {}", project.uuid, project_dir.display());
        Ok(project)
    }

    /// Open an existing repository directory.
    pub fn open(project_dir: &Path) -> Result<Self> {
        let meta_dir = project_dir.join(META_DIR);
        let meta_path = meta_dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(StoreError::not_found(format!(
                "repository at {}",
                project_dir.display()
            )));
        }
        let content = std::fs::read_to_string(&meta_path)?;
        let metadata: ProjectMetadata = toml::from_str(&content)?;

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            meta_dir,
            uuid: metadata.repository.uuid,
            created: metadata.repository.created,
            config: metadata.config,
        })
    }

    fn write_metadata(&self) -> Result<()> {
        let metadata = ProjectMetadata {
            repository: RepositorySection {
                uuid: self.uuid.clone(),
                created: self.created.clone(),
            },
            config: self.config.clone(),
        };
        let meta_toml = toml::to_string_pretty(&metadata)?;
        std::fs::write(self.meta_dir.join(META_FILE), meta_toml)?;
        Ok(())
    }

    /// Load the repository. Every committed transaction is written back to
    /// `state.json`; file bytes live under `content/`.
    pub fn repository(&self) -> Result<Repository> {
        let content = DirContentStore::open(&self.content_dir())?;
        Ok(Repository::load(&self.state_path(), self.config.clone())?
            .with_content_store(Box::new(content))
            .persist_to(self.state_path()))
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn created(&self) -> &str {
        &self.created
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RepositoryConfig) -> Result<()> {
        self.config = config;
        self.write_metadata()
    }

    pub fn state_path(&self) -> PathBuf {
        self.project_dir.join(STATE_FILE)
    }

    pub fn content_dir(&self) -> PathBuf {
        self.project_dir.join(CONTENT_DIR)
    }
}
