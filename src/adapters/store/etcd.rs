//! etcd v2 keys API.

use super::{build_client, endpoint_url, probe};
use crate::config::DelegatorConfig;
use crate::domain::ports::{KvStore, StoreFactory};
use crate::utils::error::{DelegateError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use url::Url;

pub const BACKEND: &str = "etcd";

const ERROR_KEY_NOT_FOUND: u64 = 100;

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: Node,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "errorCode")]
    error_code: u64,
    #[serde(default)]
    message: String,
}

pub struct EtcdFactory;

#[async_trait]
impl StoreFactory for EtcdFactory {
    async fn connect(&self, config: &DelegatorConfig) -> Result<Box<dyn KvStore>> {
        let store = EtcdStore {
            client: build_client(config)?,
            endpoint: config.endpoint.clone(),
            username: config.option("username").map(str::to_string),
            password: config.option("password").map(str::to_string),
        };

        let version_url = endpoint_url(&store.endpoint, &["version"], "").ok_or_else(|| {
            DelegateError::ConnectFailed {
                backend: BACKEND.to_string(),
                endpoint: config.endpoint.to_string(),
                message: "endpoint URL cannot be a base".to_string(),
            }
        })?;
        probe(config, store.authorize(store.client.get(version_url))).await?;

        tracing::debug!("Connected to etcd at {}", config.endpoint);
        Ok(Box::new(store))
    }
}

pub struct EtcdStore {
    client: Client,
    endpoint: Url,
    username: Option<String>,
    password: Option<String>,
}

impl EtcdStore {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    fn store_error(key: &str, message: impl Into<String>) -> DelegateError {
        DelegateError::StoreError {
            backend: BACKEND.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let url = endpoint_url(&self.endpoint, &["v2", "keys"], key)
            .ok_or_else(|| Self::store_error(key, "invalid key URL"))?;

        tracing::debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| Self::store_error(key, e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::store_error(key, e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(err) if err.error_code != ERROR_KEY_NOT_FOUND => Err(Self::store_error(
                    key,
                    format!("etcd error {}: {}", err.error_code, err.message),
                )),
                _ => Err(DelegateError::KeyNotFound {
                    key: key.to_string(),
                }),
            };
        }

        if !status.is_success() {
            let message = match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(err) => format!("etcd error {}: {}", err.error_code, err.message),
                Err(_) => format!("HTTP {}: {}", status, String::from_utf8_lossy(&body)),
            };
            return Err(Self::store_error(key, message));
        }

        let parsed: KeysResponse = serde_json::from_slice(&body)
            .map_err(|e| Self::store_error(key, format!("unexpected response: {}", e)))?;

        if parsed.node.dir {
            return Err(Self::store_error(key, "key is a directory"));
        }
        parsed
            .node
            .value
            .map(String::into_bytes)
            .ok_or_else(|| Self::store_error(key, "node has no value"))
    }
}
