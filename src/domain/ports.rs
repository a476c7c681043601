use crate::config::DelegatorConfig;
use crate::domain::model::{ContainerContext, DelegationResult};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Durable per-container record of the config list used at setup.
pub trait ScratchStore: Send + Sync {
    fn put(
        &self,
        container_id: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Reads and removes the record. Later calls for the same id fail with
    /// `ScratchNotFound`.
    fn take_and_erase(
        &self,
        container_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

/// A connected key/value backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    fn backend(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Opens a connection for one backend tag.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn connect(&self, config: &DelegatorConfig) -> Result<Box<dyn KvStore>>;
}

/// Child plugin invocation.
#[async_trait]
pub trait Delegator: Send + Sync {
    async fn attach(
        &self,
        plugin: &str,
        config: &[u8],
        context: &ContainerContext,
    ) -> Result<DelegationResult>;

    async fn detach(&self, plugin: &str, config: &[u8], context: &ContainerContext) -> Result<()>;
}
