//! Consul KV HTTP API.

use super::{build_client, endpoint_url, probe};
use crate::config::DelegatorConfig;
use crate::domain::ports::{KvStore, StoreFactory};
use crate::utils::error::{DelegateError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use url::Url;

pub const BACKEND: &str = "consul";

const TOKEN_HEADER: &str = "X-Consul-Token";

pub struct ConsulFactory;

#[async_trait]
impl StoreFactory for ConsulFactory {
    async fn connect(&self, config: &DelegatorConfig) -> Result<Box<dyn KvStore>> {
        let store = ConsulStore {
            client: build_client(config)?,
            endpoint: config.endpoint.clone(),
            token: config.option("token").map(str::to_string),
            datacenter: config.option("datacenter").map(str::to_string),
        };

        let leader_url = endpoint_url(&store.endpoint, &["v1", "status", "leader"], "")
            .ok_or_else(|| DelegateError::ConnectFailed {
                backend: BACKEND.to_string(),
                endpoint: config.endpoint.to_string(),
                message: "endpoint URL cannot be a base".to_string(),
            })?;
        probe(config, store.authorize(store.client.get(leader_url))).await?;

        tracing::debug!("Connected to consul at {}", config.endpoint);
        Ok(Box::new(store))
    }
}

pub struct ConsulStore {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulStore {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
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
impl KvStore for ConsulStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut url = endpoint_url(&self.endpoint, &["v1", "kv"], key)
            .ok_or_else(|| Self::store_error(key, "invalid key URL"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_key_only("raw");
            if let Some(dc) = &self.datacenter {
                query.append_pair("dc", dc);
            }
        }

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

        match status {
            StatusCode::NOT_FOUND => Err(DelegateError::KeyNotFound {
                key: key.to_string(),
            }),
            s if s.is_success() => Ok(body.to_vec()),
            s => Err(Self::store_error(
                key,
                format!("HTTP {}: {}", s, String::from_utf8_lossy(&body)),
            )),
        }
    }
}
