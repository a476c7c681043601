pub mod consul;
pub mod etcd;

use crate::config::DelegatorConfig;
use crate::domain::ports::{KvStore, StoreFactory};
use crate::utils::error::{DelegateError, Result};
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use url::Url;

pub use consul::ConsulFactory;
pub use etcd::EtcdFactory;

/// Backend factories keyed by the `storeBackend` tag.
pub struct StoreRegistry {
    factories: HashMap<String, Box<dyn StoreFactory>>,
}

impl StoreRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::empty()
            .with_backend(etcd::BACKEND, EtcdFactory)
            .with_backend(consul::BACKEND, ConsulFactory)
    }

    pub fn with_backend(mut self, tag: &str, factory: impl StoreFactory + 'static) -> Self {
        self.factories
            .insert(tag.to_lowercase(), Box::new(factory));
        self
    }

    pub fn backends(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub async fn connect(&self, config: &DelegatorConfig) -> Result<Box<dyn KvStore>> {
        let factory = self.factories.get(&config.backend).ok_or_else(|| {
            DelegateError::UnsupportedBackend {
                backend: config.backend.clone(),
            }
        })?;

        tracing::debug!(
            "Connecting to {} store at {} (timeout {:?})",
            config.backend,
            config.endpoint,
            config.connection_timeout
        );
        factory.connect(config).await
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

pub(crate) fn build_client(config: &DelegatorConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connection_timeout)
        .build()
        .map_err(|e| DelegateError::ConnectFailed {
            backend: config.backend.clone(),
            endpoint: config.endpoint.to_string(),
            message: e.to_string(),
        })
}

/// Issues the handshake request, bounded by the connection timeout.
pub(crate) async fn probe(config: &DelegatorConfig, request: RequestBuilder) -> Result<()> {
    let response = request
        .timeout(config.connection_timeout)
        .send()
        .await
        .map_err(|e| connect_error(config, e))?;

    if !response.status().is_success() {
        return Err(DelegateError::ConnectFailed {
            backend: config.backend.clone(),
            endpoint: config.endpoint.to_string(),
            message: format!("handshake returned HTTP {}", response.status()),
        });
    }
    Ok(())
}

fn connect_error(config: &DelegatorConfig, e: reqwest::Error) -> DelegateError {
    if e.is_timeout() {
        DelegateError::ConnectTimeout {
            endpoint: config.endpoint.to_string(),
            timeout: config.connection_timeout,
        }
    } else {
        DelegateError::ConnectFailed {
            backend: config.backend.clone(),
            endpoint: config.endpoint.to_string(),
            message: e.to_string(),
        }
    }
}

/// Appends `prefix` and the `/`-separated `key` to the endpoint path.
/// Leading separators are dropped from the key, as the backends do.
pub(crate) fn endpoint_url(base: &Url, prefix: &[&str], key: &str) -> Option<Url> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty().extend(prefix);
        let key = key.trim_start_matches('/');
        if !key.is_empty() {
            segments.extend(key.split('/'));
        }
    }
    Some(url)
}
