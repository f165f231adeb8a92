//! Executors bound to the currently discovered instance.

use std::sync::Arc;

use async_trait::async_trait;
use mccontrol_core::{
    ConsoleConnector, ControllerConfig, Executor, Platform, ProcessTarget, Result, TransportType,
};
use mccontrol_discovery::DiscoveryCache;
use mccontrol_executor::{ExecutorFactory, TransportSettings};
use mccontrol_session::ExecutorProvider;
use tokio_util::sync::CancellationToken;

/// Builds the standard transport chain for whatever instance the discovery
/// cache currently resolves to.
pub struct IdentityExecutorProvider {
    platform: Arc<dyn Platform>,
    connector: Arc<dyn ConsoleConnector>,
    discovery: Arc<DiscoveryCache>,
    container: String,
    settings: TransportSettings,
    cancel: CancellationToken,
}

impl IdentityExecutorProvider {
    pub(crate) fn new(
        platform: Arc<dyn Platform>,
        connector: Arc<dyn ConsoleConnector>,
        discovery: Arc<DiscoveryCache>,
        config: &ControllerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            platform,
            connector,
            discovery,
            container: config.container_name.clone(),
            settings: TransportSettings {
                console_port: config.console_port(),
                console_password: config.console_password.clone(),
                command_timeout: config.command_timeout(),
                ..TransportSettings::default()
            },
            cancel,
        }
    }
}

#[async_trait]
impl ExecutorProvider for IdentityExecutorProvider {
    async fn provide(&self, transport: TransportType) -> Result<Arc<dyn Executor>> {
        let identity = self.discovery.current().await?;
        let target = ProcessTarget::new(
            self.discovery.namespace(),
            &identity.instance_name,
            &self.container,
        );
        let factory = ExecutorFactory::standard(
            &self.platform,
            &self.connector,
            &identity,
            &target,
            &self.settings,
            &self.cancel,
        );
        let executor = factory.create(transport).await?;
        tracing::debug!(
            instance = %identity.instance_name,
            requested = %transport,
            selected = %executor.transport(),
            "Executor connected"
        );
        Ok(executor)
    }
}
