//! In-memory compose document.
//!
//! The document is kept as a generic YAML node tree rather than a fixed
//! schema. Mappings keep their insertion order, so sections this crate does
//! not understand (networks, volumes, configs, `x-` extensions) survive a
//! load and store unchanged.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// Top-level key holding the service definitions.
pub const SERVICES_KEY: &str = "services";

/// Key of the image reference inside a service definition.
pub const IMAGE_KEY: &str = "image";

/// A parsed deployment manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    root: Value,
}

/// Typed read-only view of one service definition.
///
/// Only used for inspection; patching works on the underlying node so
/// fields not listed here are never dropped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceEntry {
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub hostname: Option<String>,
    /// List or mapping form.
    pub networks: Option<Value>,
    /// List or mapping form.
    pub environment: Option<Value>,
    pub volumes: Option<Value>,
    /// String or list form.
    pub command: Option<Value>,
    pub restart: Option<String>,
}

impl ManifestDocument {
    /// Parse YAML text. The root must be a mapping.
    pub fn parse(text: &str) -> Result<Self, String> {
        let root: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        if !root.is_mapping() {
            return Err("top level is not a mapping".to_string());
        }
        Ok(Self { root })
    }

    /// Serialize back to YAML text.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.root)
    }

    /// The whole node tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// A top-level section such as `networks`, as an opaque node.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.root.get(name)
    }

    /// Service names in document order.
    pub fn service_names(&self) -> Vec<String> {
        self.services()
            .map(|services| {
                services
                    .keys()
                    .filter_map(|key| key.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw node of one service.
    pub fn service_node(&self, name: &str) -> Option<&Value> {
        self.services()?.get(name)
    }

    /// Typed view of one service. `None` if absent or not a mapping.
    pub fn service(&self, name: &str) -> Option<ServiceEntry> {
        let node = self.service_node(name)?;
        if !node.is_mapping() {
            return None;
        }
        serde_yaml::from_value(node.clone()).ok()
    }

    pub(crate) fn services(&self) -> Option<&Mapping> {
        self.root.get(SERVICES_KEY)?.as_mapping()
    }

    pub(crate) fn services_mut(&mut self) -> Option<&mut Mapping> {
        self.root.get_mut(SERVICES_KEY)?.as_mapping_mut()
    }
}
