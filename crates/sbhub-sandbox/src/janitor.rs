//! Expiry sweeps.
//!
//! Each pass removes every managed container past its expiry and archives
//! its data directory. One sandbox failing does not stop the pass.

use crate::error::{SandboxError, SandboxResult};
use crate::lifecycle::LifecycleController;
use crate::registry::SandboxRegistry;
use crate::storage::StorageManager;
use chrono::{DateTime, Utc};
use sbhub_util::TimingGuard;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Containers removed
    pub removed: Vec<String>,
    /// Data directories moved aside, with their new location
    pub archived: Vec<(String, PathBuf)>,
    /// Sandboxes where some step failed
    pub failures: Vec<(String, SandboxError)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Janitor {
    storage: StorageManager,
    registry: SandboxRegistry,
    interval: Duration,
}

impl Janitor {
    pub fn new(storage: StorageManager, registry: SandboxRegistry, interval: Duration) -> Self {
        Self {
            storage,
            registry,
            interval,
        }
    }

    /// Janitor sharing the controller's storage root and engine.
    pub fn from_controller(controller: &LifecycleController) -> Self {
        Self::new(
            controller.storage().clone(),
            controller.registry().clone(),
            controller.config().janitor_interval,
        )
    }

    /// Reclaim every sandbox that expired before `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SandboxResult<SweepReport> {
        let _timing = TimingGuard::sweep();
        let expired = self.registry.list_expired(now).await?;
        let mut report = SweepReport::default();

        if expired.is_empty() {
            debug!("No expired sandboxes");
            return Ok(report);
        }

        for view in expired {
            let name = view.name;
            info!(name = %name, "Cleaning up expired sandbox");

            match self.registry.remove(&name, None, false).await {
                Ok(true) => report.removed.push(name.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to remove expired container");
                    report.failures.push((name, e));
                    continue;
                }
            }

            match self.storage.archive(&name) {
                Ok(Some(path)) => report.archived.push((name, path)),
                Ok(None) => {}
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to archive sandbox data");
                    report.failures.push((name, e));
                }
            }
        }

        info!(
            removed = report.removed.len(),
            archived = report.archived.len(),
            failed = report.failures.len(),
            "Sweep finished"
        );
        Ok(report)
    }

    /// Sweep once, or repeatedly until Ctrl-C.
    pub async fn run(&self, once: bool) -> SandboxResult<()> {
        self.run_until(once, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Sweep once, or repeatedly until `shutdown` completes.
    pub async fn run_until<F>(&self, once: bool, shutdown: F) -> SandboxResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(interval = %humantime::format_duration(self.interval), once, "Janitor started");

        loop {
            match self.sweep(Utc::now()).await {
                Ok(_) => {}
                Err(e) if once => return Err(e),
                Err(e) => warn!(error = %e, "Sweep failed"),
            }

            if once {
                return Ok(());
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Janitor stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
