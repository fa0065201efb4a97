//! Node properties, aspects and file metadata
//!
//! Every edit here validates its input first, then promotes the path and
//! changes the head-owned node in place.

use std::collections::BTreeMap;

use log::debug;

use super::Transaction;
use crate::content::ContentRef;
use crate::error::{Result, StoreError};
use crate::node::{FileData, NodeBody, NodeId, PropertyValue, QName};
use crate::path::QualifiedPath;
use crate::version::StoreId;

impl Transaction<'_> {
    /// Promote `path` and return the head-owned node at its end.
    fn promoted(&mut self, path: &QualifiedPath) -> Result<(NodeId, StoreId)> {
        let resolved = self.resolve_for_write(path)?;
        let steps = self.promote(&resolved)?;
        Ok((steps[steps.len() - 1].node, resolved.store))
    }

    pub fn set_node_property(
        &mut self,
        path: &QualifiedPath,
        name: QName,
        value: PropertyValue,
    ) -> Result<()> {
        debug!("Transaction::set_node_property path={} name={}", path, name);
        self.validator().validate_property(&name, &value)?;
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        node.properties.insert(name, value);
        node.touch();
        Ok(())
    }

    pub fn set_node_properties(
        &mut self,
        path: &QualifiedPath,
        properties: BTreeMap<QName, PropertyValue>,
    ) -> Result<()> {
        debug!(
            "Transaction::set_node_properties path={} count={}",
            path,
            properties.len()
        );
        for (name, value) in &properties {
            self.validator().validate_property(name, value)?;
        }
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        node.properties.extend(properties);
        node.touch();
        Ok(())
    }

    /// Drop one property. Absent properties are ignored.
    pub fn delete_node_property(&mut self, path: &QualifiedPath, name: &QName) -> Result<()> {
        debug!("Transaction::delete_node_property path={} name={}", path, name);
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        if node.properties.remove(name).is_some() {
            node.touch();
        }
        Ok(())
    }

    pub fn delete_node_properties(&mut self, path: &QualifiedPath) -> Result<()> {
        debug!("Transaction::delete_node_properties path={}", path);
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        node.properties.clear();
        node.touch();
        Ok(())
    }

    pub fn add_aspect(&mut self, path: &QualifiedPath, aspect: QName) -> Result<()> {
        debug!("Transaction::add_aspect path={} aspect={}", path, aspect);
        self.validator().validate_aspect(&aspect)?;
        let resolved = self.resolve_for_write(path)?;
        if self
            .state()
            .nodes
            .get(resolved.last().node)?
            .aspects
            .contains(&aspect)
        {
            return Err(StoreError::AlreadyExists(format!(
                "aspect {} on {}",
                aspect, path
            )));
        }
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        node.aspects.insert(aspect);
        node.touch();
        Ok(())
    }

    /// Remove an aspect together with the properties it implies.
    pub fn remove_aspect(&mut self, path: &QualifiedPath, aspect: &QName) -> Result<()> {
        debug!("Transaction::remove_aspect path={} aspect={}", path, aspect);
        let resolved = self.resolve_for_write(path)?;
        if !self
            .state()
            .nodes
            .get(resolved.last().node)?
            .aspects
            .contains(aspect)
        {
            return Err(StoreError::not_found(format!("aspect {} on {}", aspect, path)));
        }
        let implied = self.validator().aspect_properties(aspect);
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        node.aspects.remove(aspect);
        for name in &implied {
            node.properties.remove(name);
        }
        node.touch();
        Ok(())
    }

    pub fn set_guid(&mut self, path: &QualifiedPath, guid: &str) -> Result<()> {
        debug!("Transaction::set_guid path={} guid={}", path, guid);
        if guid.is_empty() {
            return Err(StoreError::invalid("empty guid"));
        }
        let (id, store) = self.promoted(path)?;
        let node = self.node_mut(id, store)?;
        node.guid = guid.to_string();
        node.touch();
        Ok(())
    }

    pub fn set_mime_type(&mut self, path: &QualifiedPath, mime_type: &str) -> Result<()> {
        debug!("Transaction::set_mime_type path={} mime={}", path, mime_type);
        self.edit_file(path, |data| data.mime_type = Some(mime_type.to_string()))
    }

    pub fn set_encoding(&mut self, path: &QualifiedPath, encoding: &str) -> Result<()> {
        debug!("Transaction::set_encoding path={} encoding={}", path, encoding);
        self.edit_file(path, |data| data.encoding = Some(encoding.to_string()))
    }

    /// Point a file at new content.
    pub fn set_content(&mut self, path: &QualifiedPath, content: ContentRef) -> Result<()> {
        debug!("Transaction::set_content path={} content={}", path, content);
        self.edit_file(path, |data| data.content = Some(content))
    }

    /// Apply `edit` to the payload of the file at `path`. A layered file is
    /// first replaced by a plain copy of what it points at.
    fn edit_file(&mut self, path: &QualifiedPath, edit: impl FnOnce(&mut FileData)) -> Result<()> {
        let resolved = self.resolve_for_write(path)?;
        let step = resolved.last().clone();
        let materialized = match &self.state().nodes.get(step.node)?.body {
            NodeBody::PlainFile(_) => None,
            NodeBody::LayeredFile { .. } => Some(self.resolver().file_data(&step)?),
            _ => return Err(StoreError::invalid(format!("{} is not a file", path))),
        };
        let steps = self.promote(&resolved)?;
        let node = self.node_mut(steps[steps.len() - 1].node, resolved.store)?;
        if let Some(data) = materialized {
            debug!("Transaction::edit_file materializing layered file {}", path);
            node.body = NodeBody::PlainFile(data);
        }
        let data = node
            .file_data_mut()
            .ok_or_else(|| StoreError::invalid(format!("{} is not a file", path)))?;
        edit(data);
        node.touch();
        Ok(())
    }
}
