//! Instance configuration file
//!
//! Instances can be registered from a TOML file:
//!
//! ```toml
//! [instances."acme/palette/dark"]
//! type = "acme/palette"
//! priority = 10
//!
//! [instances."acme/palette/dark".config]
//! colors = ["black", "gray"]
//! ```
//!
//! Entries of one file are defined in id order.

use std::collections::BTreeMap;
use std::path::Path;

use pentype_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "instances.toml";

/// One registered instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceEntry {
    /// Id of the type the instance must be of
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    /// Higher priorities are returned first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Configuration handed to the instance factory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Table>,
}

/// Contents of an instance configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
    /// Registrations by instance id
    pub instances: BTreeMap<String, InstanceEntry>,
}

impl InstancesConfig {
    /// Parse a configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::argument_invalid("config", e.to_string()))
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::operation_invalid(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the configuration to a file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::argument_invalid("config", e.to_string()))?;
        std::fs::write(path, content).map_err(|e| {
            Error::operation_invalid(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    /// The configuration in the `{id: {type, priority, config}}` form
    pub fn to_spec(&self) -> Json {
        let mut spec = Map::new();
        for (id, entry) in &self.instances {
            let mut item = Map::new();
            if let Some(type_id) = &entry.type_id {
                item.insert("type".to_string(), Json::String(type_id.clone()));
            }
            if let Some(priority) = entry.priority {
                item.insert("priority".to_string(), Json::from(priority));
            }
            if let Some(config) = &entry.config {
                item.insert("config".to_string(), toml_to_json(toml::Value::Table(config.clone())));
            }
            spec.insert(id.clone(), Json::Object(item));
        }
        Json::Object(spec)
    }
}

fn toml_to_json(value: toml::Value) -> Json {
    match value {
        toml::Value::String(s) => Json::String(s),
        toml::Value::Integer(i) => Json::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        toml::Value::Boolean(b) => Json::Bool(b),
        toml::Value::Datetime(d) => Json::String(d.to_string()),
        toml::Value::Array(items) => Json::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Json::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
