//! Metadata validation seam
//!
//! Property values and aspect names pass through a [`MetadataValidator`]
//! before the node graph accepts them. The repository itself only enforces
//! the mapping shape; a type dictionary plugs in here.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};
use crate::node::{PropertyValue, QName};

pub trait MetadataValidator: Send + Sync {
    /// Accept or reject a property assignment.
    fn validate_property(&self, name: &QName, value: &PropertyValue) -> Result<()>;

    /// Accept or reject an aspect name.
    fn validate_aspect(&self, aspect: &QName) -> Result<()>;

    /// Properties implied by an aspect. They are dropped together with the
    /// aspect.
    fn aspect_properties(&self, aspect: &QName) -> Vec<QName>;
}

/// Accepts everything; aspects imply no properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveValidator;

impl MetadataValidator for PermissiveValidator {
    fn validate_property(&self, _name: &QName, _value: &PropertyValue) -> Result<()> {
        Ok(())
    }

    fn validate_aspect(&self, _aspect: &QName) -> Result<()> {
        Ok(())
    }

    fn aspect_properties(&self, _aspect: &QName) -> Vec<QName> {
        Vec::new()
    }
}

/// A small fixed dictionary: known aspects with the properties they
/// imply. Unknown aspects are rejected; properties are unconstrained.
#[derive(Debug, Default, Clone)]
pub struct AspectDictionary {
    aspects: BTreeMap<QName, Vec<QName>>,
}

impl AspectDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aspect(mut self, aspect: QName, properties: Vec<QName>) -> Self {
        self.aspects.insert(aspect, properties);
        self
    }
}

impl MetadataValidator for AspectDictionary {
    fn validate_property(&self, _name: &QName, _value: &PropertyValue) -> Result<()> {
        Ok(())
    }

    fn validate_aspect(&self, aspect: &QName) -> Result<()> {
        if self.aspects.contains_key(aspect) {
            Ok(())
        } else {
            Err(StoreError::Validation(format!("unknown aspect {}", aspect)))
        }
    }

    fn aspect_properties(&self, aspect: &QName) -> Vec<QName> {
        self.aspects.get(aspect).cloned().unwrap_or_default()
    }
}
