use crate::adapters::store::StoreRegistry;
use crate::config::DelegatorConfig;
use crate::domain::model::{
    ContainerContext, DelegationResult, NetworkConfigEntry, NetworkConfigList,
};
use crate::domain::ports::{Delegator, ScratchStore};
use crate::utils::error::{DelegateError, Result};
use crate::utils::validation::validate_container_id;

/// Fetches a container's config list from the remote store and replays it
/// through the child plugins, one entry at a time and in list order.
///
/// Setup persists the fetched list before delegating anything, so teardown
/// only ever reads the scratch record and never depends on the store.
/// Already delegated entries are not rolled back when a later one fails.
pub struct DelegationEngine<S: ScratchStore, D: Delegator> {
    registry: StoreRegistry,
    scratch: S,
    delegator: D,
}

impl<S: ScratchStore, D: Delegator> DelegationEngine<S, D> {
    pub fn new(registry: StoreRegistry, scratch: S, delegator: D) -> Self {
        Self {
            registry,
            scratch,
            delegator,
        }
    }

    pub fn scratch(&self) -> &S {
        &self.scratch
    }

    pub fn delegator(&self) -> &D {
        &self.delegator
    }

    /// Setup path. Returns the ADD result of the first entry.
    pub async fn on_attach(
        &self,
        context: &ContainerContext,
        raw_config: &[u8],
    ) -> Result<DelegationResult> {
        validate_container_id(&context.container_id)?;
        let config = DelegatorConfig::load(raw_config)?;
        let key = config.key_for(&context.container_id);

        tracing::info!(
            "Loading network configs for {} from {} at {} (key {})",
            context.container_id,
            config.backend,
            config.endpoint,
            key
        );

        let store = self.registry.connect(&config).await?;
        let value = store.get(&key).await?;
        tracing::debug!("Fetched {} bytes from {}", value.len(), store.backend());

        let list = NetworkConfigList::parse(&value)?;

        self.scratch
            .put(&context.container_id, &value)
            .await
            .inspect_err(|e| tracing::error!("Could not save scratch record: {}", e))?;

        let (first, rest) = list
            .entries()
            .split_first()
            .ok_or_else(|| DelegateError::ParseError {
                message: "network config list is empty".to_string(),
            })?;

        let result = self.attach_entry(0, first, context).await?;
        tracing::debug!("Captured result of subconfig 0");

        for (offset, entry) in rest.iter().enumerate() {
            self.attach_entry(offset + 1, entry, context).await?;
        }

        tracing::info!(
            "Delegated {} network configs for {}",
            list.len(),
            context.container_id
        );
        Ok(result)
    }

    /// Teardown path. Consumes the scratch record written by setup; a second
    /// call for the same container fails with `ScratchNotFound`.
    pub async fn on_detach(&self, context: &ContainerContext) -> Result<()> {
        validate_container_id(&context.container_id)?;

        let raw = self.scratch.take_and_erase(&context.container_id).await?;
        let list = NetworkConfigList::parse(&raw)?;

        tracing::info!(
            "Releasing {} network configs for {}",
            list.len(),
            context.container_id
        );

        for (index, entry) in list.entries().iter().enumerate() {
            let plugin = plugin_for(index, entry)?;
            let config = entry.to_bytes()?;

            tracing::info!("Delegating DEL of subconfig {} to {}", index, plugin);
            self.delegator
                .detach(plugin, &config, context)
                .await
                .inspect_err(|e| {
                    tracing::error!("DEL of subconfig {} ({}) failed: {}", index, plugin, e)
                })?;
        }

        Ok(())
    }

    async fn attach_entry(
        &self,
        index: usize,
        entry: &NetworkConfigEntry,
        context: &ContainerContext,
    ) -> Result<DelegationResult> {
        let plugin = plugin_for(index, entry)?;
        let config = entry.to_bytes()?;

        tracing::info!("Delegating ADD of subconfig {} to {}", index, plugin);
        self.delegator
            .attach(plugin, &config, context)
            .await
            .inspect_err(|e| tracing::error!("ADD of subconfig {} ({}) failed: {}", index, plugin, e))
    }
}

fn plugin_for(index: usize, entry: &NetworkConfigEntry) -> Result<&str> {
    entry
        .plugin_type()
        .ok_or(DelegateError::MissingPluginType { index })
}
