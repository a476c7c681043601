use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("failed to load libkv config: {message}")]
    ConfigMalformed { message: String },

    #[error("invalid value for {field} ('{value}'): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("invalid CNI environment: {message}")]
    InvalidEnvironment { message: String },

    #[error("unsupported store backend: {backend}")]
    UnsupportedBackend { backend: String },

    #[error("connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    #[error("cannot connect to {backend} store at {endpoint}: {message}")]
    ConnectFailed {
        backend: String,
        endpoint: String,
        message: String,
    },

    #[error("no value at key: {key}")]
    KeyNotFound { key: String },

    #[error("no scratch record for container {container_id}: no matching setup, or already torn down")]
    ScratchNotFound { container_id: String },

    #[error("{backend} store error at key {key}: {message}")]
    StoreError {
        backend: String,
        key: String,
        message: String,
    },

    #[error("could not parse network config list: {message}")]
    ParseError { message: String },

    #[error("subconfig at index {index} has no usable \"type\" field")]
    MissingPluginType { index: usize },

    #[error("delegating {command} to plugin {plugin} failed: {message}")]
    DelegationFailed {
        command: &'static str,
        plugin: String,
        message: String,
    },

    #[error("plugin {plugin} failed: {message}")]
    PluginFailed {
        plugin: String,
        code: Option<u32>,
        message: String,
    },

    #[error("plugin {plugin} not found in {search_path}")]
    PluginNotFound { plugin: String, search_path: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Connect,
    NotFound,
    Store,
    Parse,
    Delegation,
    Io,
}

impl DelegateError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DelegateError::ConfigMalformed { .. }
            | DelegateError::InvalidConfigValue { .. }
            | DelegateError::InvalidEnvironment { .. } => ErrorCategory::Config,
            DelegateError::UnsupportedBackend { .. }
            | DelegateError::ConnectTimeout { .. }
            | DelegateError::ConnectFailed { .. } => ErrorCategory::Connect,
            DelegateError::KeyNotFound { .. } | DelegateError::ScratchNotFound { .. } => {
                ErrorCategory::NotFound
            }
            DelegateError::StoreError { .. } => ErrorCategory::Store,
            DelegateError::ParseError { .. } => ErrorCategory::Parse,
            DelegateError::MissingPluginType { .. }
            | DelegateError::DelegationFailed { .. }
            | DelegateError::PluginFailed { .. }
            | DelegateError::PluginNotFound { .. } => ErrorCategory::Delegation,
            DelegateError::IoError(_) => ErrorCategory::Io,
            DelegateError::SerializationError(_) => ErrorCategory::Parse,
        }
    }

    /// CNI error code reported to the runtime in the error object.
    pub fn cni_code(&self) -> u32 {
        match self {
            DelegateError::ConfigMalformed { .. } | DelegateError::SerializationError(_) => 6,
            DelegateError::InvalidEnvironment { .. } => 4,
            DelegateError::InvalidConfigValue { .. } => 7,
            DelegateError::UnsupportedBackend { .. } => 7,
            DelegateError::ConnectTimeout { .. } | DelegateError::ConnectFailed { .. } => 11,
            DelegateError::IoError(_) => 5,
            DelegateError::ParseError { .. } | DelegateError::MissingPluginType { .. } => 7,
            DelegateError::KeyNotFound { .. } => 100,
            DelegateError::ScratchNotFound { .. } => 101,
            DelegateError::StoreError { .. } => 102,
            DelegateError::DelegationFailed { .. } => 103,
            DelegateError::PluginFailed { code, .. } => code.unwrap_or(999),
            DelegateError::PluginNotFound { .. } => 104,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

pub type Result<T> = std::result::Result<T, DelegateError>;
