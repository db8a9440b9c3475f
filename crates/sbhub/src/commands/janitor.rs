//! Janitor command handler.

use chrono::Utc;
use sbhub_sandbox::{Janitor, LifecycleController};

pub async fn handle_janitor(controller: &LifecycleController, once: bool) -> anyhow::Result<()> {
    let janitor = Janitor::from_controller(controller);

    if once {
        let report = janitor.sweep(Utc::now()).await?;
        for (name, path) in &report.archived {
            println!("Archived '{}' to {}", name, path.display());
        }
        println!("Removed {} expired sandbox(es)", report.removed.len());
        if !report.is_clean() {
            for (name, err) in &report.failures {
                eprintln!("Failed '{}': {}", name, err);
            }
            anyhow::bail!("{} sandbox(es) could not be cleaned up", report.failures.len());
        }
        return Ok(());
    }

    println!(
        "Janitor running every {} (Ctrl-C to stop)",
        humantime::format_duration(controller.config().janitor_interval)
    );
    janitor.run(false).await?;
    Ok(())
}
