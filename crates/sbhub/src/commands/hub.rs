//! Building the lifecycle controller from configuration.

use anyhow::Context;
use sbhub_sandbox::{DockerBackend, HubConfig, LifecycleController};
use std::path::Path;
use std::sync::Arc;

async fn load_config(path: Option<&Path>) -> anyhow::Result<HubConfig> {
    let (config, _sources) = HubConfig::load(path).await?;
    Ok(config)
}

/// Load configuration and connect to a reachable Docker daemon.
pub async fn connect(config: Option<&Path>) -> anyhow::Result<LifecycleController> {
    let config = load_config(config).await?;
    let backend = DockerBackend::connect().context("Is Docker running?")?;
    let controller = LifecycleController::connect(config, Arc::new(backend))
        .await
        .context("Is Docker running?")?;
    Ok(controller)
}

/// Controller for commands that only touch storage.
///
/// No request is sent to the daemon until a container operation runs.
pub async fn offline(config: Option<&Path>) -> anyhow::Result<LifecycleController> {
    let config = load_config(config).await?;
    let backend = DockerBackend::connect().context("Is Docker running?")?;
    Ok(LifecycleController::new(config, Arc::new(backend)))
}
