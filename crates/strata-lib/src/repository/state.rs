//! Shared repository state
//!
//! Everything a repository knows lives in one `RepoState`: the node arena
//! and the stores. It is serialized as a whole when a repository is saved.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::node::NodeGraph;
use crate::version::{StoreData, StoreId};

/// On-disk format marker.
pub const STATE_FORMAT: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoState {
    pub nodes: NodeGraph,
    pub stores: BTreeMap<StoreId, StoreData>,
    pub names: BTreeMap<String, StoreId>,
    pub next_store_id: u64,
}

#[derive(Serialize)]
struct StateFileRef<'a> {
    format: u32,
    state: &'a RepoState,
}

#[derive(Deserialize)]
struct StateFile {
    format: u32,
    state: RepoState,
}

impl RepoState {
    pub fn store_id(&self, name: &str) -> Result<StoreId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::not_found(format!("store {}", name)))
    }

    pub fn store(&self, id: StoreId) -> Result<&StoreData> {
        self.stores
            .get(&id)
            .ok_or_else(|| StoreError::not_found(format!("{}", id)))
    }

    pub fn store_by_name(&self, name: &str) -> Result<&StoreData> {
        self.store(self.store_id(name)?)
    }

    pub fn allocate_store_id(&mut self) -> StoreId {
        self.next_store_id += 1;
        StoreId(self.next_store_id)
    }

    /// Write the state as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = StateFileRef {
            format: STATE_FORMAT,
            state: self,
        };
        let json = serde_json::to_string(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a state written by [`RepoState::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: StateFile = serde_json::from_str(&content)?;
        if file.format != STATE_FORMAT {
            return Err(StoreError::invalid(format!(
                "unsupported state format {} in {}",
                file.format,
                path.display()
            )));
        }
        Ok(file.state)
    }
}
