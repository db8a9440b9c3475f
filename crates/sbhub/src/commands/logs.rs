//! Log streaming and interactive shells.

use anyhow::Context;
use futures::StreamExt;
use sbhub_sandbox::LifecycleController;
use tracing::debug;

pub async fn handle_logs(
    controller: &LifecycleController,
    name: &str,
    follow: bool,
    tail: usize,
) -> anyhow::Result<()> {
    sbhub_sandbox::names::validate_name(name)?;
    // Fail with "not found" before opening the stream.
    controller.registry().inspect(name).await?;

    let mut lines = controller.registry().logs(name, follow, tail);
    while let Some(line) = lines.next().await {
        println!("{}", line?);
    }
    Ok(())
}

/// Run `/bin/sh` inside a running sandbox, attached to this terminal.
pub async fn handle_console(controller: &LifecycleController, name: &str) -> anyhow::Result<()> {
    controller.ensure_running(name).await?;

    debug!(name = %name, "Opening shell");
    let status = tokio::process::Command::new("docker")
        .args(["exec", "-it", name, "/bin/sh"])
        .status()
        .await
        .context("failed to run the docker CLI")?;

    debug!(name = %name, status = %status, "Shell exited");
    Ok(())
}
