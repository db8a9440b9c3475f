//! Project import.

use super::ConflictArg;
use sbhub_sandbox::{ImportReport, LifecycleController};
use std::path::Path;

pub async fn handle_import(
    controller: &LifecycleController,
    path: &Path,
    on_conflict: ConflictArg,
) -> anyhow::Result<()> {
    let resolver = on_conflict.resolver();
    let report = controller.import(path, resolver.as_ref()).await?;
    print_report(&report);

    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} of {} services failed to start",
            report.failures.len(),
            report.failures.len() + report.created.len()
        );
    }
    Ok(())
}

fn print_report(report: &ImportReport) {
    for sandbox in &report.created {
        match sandbox.host_port {
            Some(port) => println!(
                "Started '{}' ({}) on localhost:{}",
                sandbox.name,
                sandbox.short_id(),
                port
            ),
            None => println!("Started '{}' ({})", sandbox.name, sandbox.short_id()),
        }
    }
    for name in &report.skipped {
        println!("Skipped '{}': no image", name);
    }
    for name in &report.cancelled {
        println!("Cancelled '{}'", name);
    }
    for (name, err) in &report.failures {
        eprintln!("Failed '{}': {}", name, err);
    }
}
