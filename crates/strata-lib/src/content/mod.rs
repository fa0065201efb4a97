//! Content collaborators
//!
//! The repository never looks at file bytes. A plain file carries an opaque
//! [`ContentRef`]; turning bytes into a reference and back is the job of a
//! [`ContentStore`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Opaque handle to a blob held by a [`ContentStore`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    /// A fresh, unique reference.
    pub fn generate() -> Self {
        ContentRef(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ContentRef {
    fn from(s: String) -> Self {
        ContentRef(s)
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage engine for file bytes.
pub trait ContentStore: Send + Sync {
    /// Store bytes and hand back a reference to them.
    fn put(&self, data: &[u8]) -> Result<ContentRef>;

    /// Read the bytes behind a reference.
    fn get(&self, content: &ContentRef) -> Result<Vec<u8>>;

    /// Drop the bytes behind a reference.
    fn delete(&self, content: &ContentRef) -> Result<()>;
}

/// Content kept in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<ContentRef, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, data: &[u8]) -> Result<ContentRef> {
        let content = ContentRef::generate();
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(content.clone(), data.to_vec());
        Ok(content)
    }

    fn get(&self, content: &ContentRef) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(content)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("content {}", content)))
    }

    fn delete(&self, content: &ContentRef) -> Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(content);
        Ok(())
    }
}

/// Content kept as one file per reference under a directory.
#[derive(Debug, Clone)]
pub struct DirContentStore {
    root: PathBuf,
}

impl DirContentStore {
    /// Open (creating if needed) a content directory.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, content: &ContentRef) -> Result<PathBuf> {
        let name = content.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StoreError::invalid(format!("bad content reference {:?}", name)));
        }
        Ok(self.root.join(name))
    }
}

impl ContentStore for DirContentStore {
    fn put(&self, data: &[u8]) -> Result<ContentRef> {
        let content = ContentRef::generate();
        let path = self.blob_path(&content)?;
        debug!("DirContentStore::put {} ({} bytes)", content, data.len());
        std::fs::write(path, data)?;
        Ok(content)
    }

    fn get(&self, content: &ContentRef) -> Result<Vec<u8>> {
        let path = self.blob_path(content)?;
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found(format!("content {}", content)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, content: &ContentRef) -> Result<()> {
        let path = self.blob_path(content)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
