use crate::utils::error::{DelegateError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

pub const PLUGIN_TYPE: &str = "libkv";
pub const KEY_SEPARATOR: char = '/';
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

const KNOWN_OPTIONS: &[&str] = &[
    "connectionTimeout",
    "scheme",
    "username",
    "password",
    "token",
    "datacenter",
];

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// The network config handed to this plugin on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibKvConf {
    #[serde(default)]
    pub cni_version: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub plugin_type: String,
    pub store_backend: String,
    pub uri: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub store_config: HashMap<String, String>,
}

/// Normalized, immutable configuration for one invocation.
#[derive(Debug, Clone)]
pub struct DelegatorConfig {
    pub name: String,
    pub cni_version: Option<String>,
    pub backend: String,
    pub endpoint: Url,
    /// Always ends with `KEY_SEPARATOR`.
    pub base_path: String,
    pub options: HashMap<String, String>,
    pub connection_timeout: Duration,
}

impl DelegatorConfig {
    /// Parses the raw stdin payload. Does no network or disk access.
    pub fn load(raw: &[u8]) -> Result<Self> {
        let conf: LibKvConf =
            serde_json::from_slice(raw).map_err(|e| DelegateError::ConfigMalformed {
                message: e.to_string(),
            })?;
        Self::from_conf(conf)
    }

    pub fn from_conf(conf: LibKvConf) -> Result<Self> {
        if conf.store_backend.trim().is_empty() {
            return Err(DelegateError::ConfigMalformed {
                message: "storeBackend is required".to_string(),
            });
        }
        if conf.uri.trim().is_empty() {
            return Err(DelegateError::ConfigMalformed {
                message: "uri is required".to_string(),
            });
        }
        if conf.plugin_type != PLUGIN_TYPE {
            tracing::warn!(
                "Network config type is '{}', expected '{}'",
                conf.plugin_type,
                PLUGIN_TYPE
            );
        }

        let mut options = HashMap::with_capacity(conf.store_config.len());
        for (key, value) in conf.store_config {
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                tracing::warn!("Ignoring unknown storeConfig option '{}'", key);
            }
            let value = substitute_env_vars(&key, &value)?;
            options.insert(key, value);
        }

        let connection_timeout = match options.get("connectionTimeout") {
            Some(raw) => parse_timeout(raw)?,
            None => DEFAULT_CONNECTION_TIMEOUT,
        };

        let scheme = options.get("scheme").map(String::as_str).unwrap_or("http");
        let endpoint = normalize_endpoint(conf.uri.trim(), scheme)?;

        let config = Self {
            name: conf.name,
            cni_version: conf.cni_version,
            backend: conf.store_backend.trim().to_lowercase(),
            endpoint,
            base_path: normalize_base_path(conf.base_path),
            options,
            connection_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Store key holding the network config list of `container_id`.
    pub fn key_for(&self, container_id: &str) -> String {
        format!("{}{}", self.base_path, container_id)
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

impl Validate for DelegatorConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("storeBackend", &self.backend)?;
        validate_url("uri", self.endpoint.as_str())?;
        if self.connection_timeout.is_zero() {
            return Err(DelegateError::InvalidConfigValue {
                field: "storeConfig.connectionTimeout".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

pub fn normalize_base_path(mut base_path: String) -> String {
    if !base_path.ends_with(KEY_SEPARATOR) {
        base_path.push(KEY_SEPARATOR);
    }
    base_path
}

fn normalize_endpoint(uri: &str, scheme: &str) -> Result<Url> {
    if scheme != "http" && scheme != "https" {
        return Err(DelegateError::InvalidConfigValue {
            field: "storeConfig.scheme".to_string(),
            value: scheme.to_string(),
            reason: "Scheme must be http or https".to_string(),
        });
    }
    if uri.contains("://") {
        validate_url("uri", uri)
    } else {
        validate_url("uri", &format!("{}://{}", scheme, uri))
    }
}

/// Accepts humantime (`10s`, `500ms`) or a bare number of seconds.
fn parse_timeout(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| DelegateError::InvalidConfigValue {
        field: "storeConfig.connectionTimeout".to_string(),
        value: raw.to_string(),
        reason: format!("Invalid duration: {}", e),
    })
}

/// Expands `${VAR}` and `${VAR:-default}` from the process environment.
fn substitute_env_vars(option: &str, value: &str) -> Result<String> {
    let mut missing = None;
    let result = ENV_VAR_PATTERN.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match (std::env::var(var_name), caps.get(2)) {
            (Ok(v), _) => v,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(DelegateError::InvalidConfigValue {
            field: format!("storeConfig.{}", option),
            value: value.to_string(),
            reason: format!("environment variable '{}' not set", var_name),
        }),
        None => Ok(result.into_owned()),
    }
}
