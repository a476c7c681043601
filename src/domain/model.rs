use crate::utils::error::{DelegateError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One network attachment config as stored remotely. Only `type` is
/// interpreted here; every other field belongs to the child plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkConfigEntry {
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl NetworkConfigEntry {
    pub fn plugin_type(&self) -> Option<&str> {
        self.fields
            .get("type")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }
}

/// Ordered, non-empty list of entries. Index 0 is the authoritative one.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfigList {
    entries: Vec<NetworkConfigEntry>,
}

impl NetworkConfigList {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let entries: Vec<NetworkConfigEntry> =
            serde_json::from_slice(bytes).map_err(|e| DelegateError::ParseError {
                message: format!("Could not unmarshal store value: {}", e),
            })?;

        if entries.is_empty() {
            return Err(DelegateError::ParseError {
                message: "network config list is empty".to_string(),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[NetworkConfigEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Raw ADD output of a child plugin, passed through byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationResult {
    raw: Vec<u8>,
}

impl DelegationResult {
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        serde_json::from_slice::<serde::de::IgnoredAny>(&raw)?;
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.raw)?)
    }
}

/// CNI error object, read from failing plugins and printed on our own failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni_version: Option<String>,
    pub code: u32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CniError {
    pub fn from_error(err: &DelegateError, cni_version: Option<String>) -> Self {
        Self {
            cni_version,
            code: err.cni_code(),
            msg: err.to_string(),
            details: None,
        }
    }
}

/// Runtime context handed to every child plugin invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerContext {
    pub container_id: String,
    pub netns: String,
    pub ifname: String,
    pub args: String,
    pub plugin_path: Vec<PathBuf>,
}

impl ContainerContext {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            ..Default::default()
        }
    }
}
