//! Sandbox lifecycle command handlers.
//!
//! Handles create, attach, detach, renew, remove and save.

use super::{hub, ConflictArg};
use sbhub_sandbox::{
    CreateOutcome, CreateRequest, LifecycleController, SandboxHandle, WipeChoice,
};
use std::path::Path;
use std::time::Duration;

/// Map the remove flags to a wipe choice.
pub fn wipe_choice(force_all: bool, vol_only: bool) -> WipeChoice {
    match (force_all, vol_only) {
        (true, _) => WipeChoice::All,
        (false, true) => WipeChoice::VolumeOnly,
        (false, false) => WipeChoice::Keep,
    }
}

fn print_started(action: &str, sandbox: &SandboxHandle) {
    println!(
        "{} '{}' ({}, {}, expires in {})",
        action,
        sandbox.name,
        sandbox.short_id(),
        sandbox.size,
        humantime::format_duration(sandbox.ttl)
    );
    match &sandbox.data_path {
        Some(path) => println!("  Data: {}", path.display()),
        None => println!("  Data: none (stateless)"),
    }
    if let Some(port) = sandbox.host_port {
        println!("  Port: localhost:{}", port);
    }
}

pub async fn handle_create(
    controller: &LifecycleController,
    request: CreateRequest,
    on_conflict: ConflictArg,
) -> anyhow::Result<()> {
    let resolver = on_conflict.resolver();
    match controller.create(request, resolver.as_ref()).await? {
        CreateOutcome::Created(sandbox) => print_started("Started", &sandbox),
        CreateOutcome::Cancelled => println!("Cancelled; nothing was changed."),
    }
    Ok(())
}

pub async fn handle_attach(
    controller: &LifecycleController,
    name: &str,
    folder: &str,
) -> anyhow::Result<()> {
    let sandbox = controller.attach(name, folder).await?;
    print_started("Attached", &sandbox);
    Ok(())
}

pub async fn handle_detach(controller: &LifecycleController, name: &str) -> anyhow::Result<()> {
    let sandbox = controller.detach(name).await?;
    print_started("Detached", &sandbox);
    Ok(())
}

pub async fn handle_renew(
    controller: &LifecycleController,
    name: &str,
    ttl: Duration,
) -> anyhow::Result<()> {
    let sandbox = controller.renew(name, ttl).await?;
    print_started("Renewed", &sandbox);
    Ok(())
}

/// Volume-only removal and snapshot names never reach the daemon, so they
/// work while Docker is down.
pub async fn handle_remove(
    config: Option<&Path>,
    name: &str,
    wipe: WipeChoice,
) -> anyhow::Result<()> {
    let controller = if wipe == WipeChoice::VolumeOnly || sbhub_sandbox::names::is_snapshot(name)
    {
        hub::offline(config).await?
    } else {
        hub::connect(config).await?
    };

    let outcome = controller.remove(name, wipe).await?;

    if outcome.container_removed {
        println!("Removed container '{}'", name);
    } else if wipe != WipeChoice::VolumeOnly && !sbhub_sandbox::names::is_snapshot(name) {
        println!("No container named '{}'", name);
    }
    if outcome.data_wiped {
        println!("Deleted data for '{}'", name);
    }
    if let Some(path) = outcome.data_kept {
        println!("Data kept at {}", path.display());
    }
    Ok(())
}

pub async fn handle_save(config: Option<&Path>, name: &str, tag: &str) -> anyhow::Result<()> {
    let controller = hub::offline(config).await?;
    let path = controller.save(name, tag)?;
    println!("Saved '{}' as '{}' ({})", name, tag, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wipe_choice() {
        assert_eq!(wipe_choice(false, false), WipeChoice::Keep);
        assert_eq!(wipe_choice(true, false), WipeChoice::All);
        assert_eq!(wipe_choice(false, true), WipeChoice::VolumeOnly);
    }
}
