//! Applied state as seen by assertions.
//!
//! Attributes are flattened to dotted paths with string values, the way the
//! apply engine reports them: `display_name`, `freeform_tags.%`,
//! `freeform_tags.Department`, `rules.#`, `rules.0.port`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One resource or data source instance in state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup; `id` resolves to the instance id.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        if key == "id" {
            return Some(self.id.as_str());
        }
        self.attributes.get(key).map(String::as_str)
    }
}

/// Whole-configuration state keyed by address (`oci_core_cpe.test_cpe`,
/// `data.oci_core_cpes.test_cpes`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl State {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resource(mut self, address: impl Into<String>, resource: ResourceState) -> Self {
        self.resources.insert(address.into(), resource);
        self
    }

    #[must_use]
    pub fn resource(&self, address: &str) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Managed resources only (data sources excluded).
    pub fn managed(&self) -> impl Iterator<Item = (&str, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(address, _)| !address.starts_with("data."))
            .map(|(address, resource)| (address.as_str(), resource))
    }
}
