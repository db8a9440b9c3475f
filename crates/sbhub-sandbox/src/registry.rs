//! Sandbox registry: the domain view of the container engine.
//!
//! Holds no state of its own. Every query goes to the backend, and labels
//! are the only metadata it writes.

use crate::config::HubConfig;
use crate::container::{ContainerDetail, ContainerSpec};
use crate::error::{SandboxError, SandboxResult};
use crate::labels::{SandboxLabels, MANAGED_LABEL};
use crate::runtime::ContainerBackend;
use crate::storage;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sbhub_util::TimingGuard;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A container as the lifecycle engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerView {
    pub id: String,
    pub name: String,
    pub state: String,
    pub image: String,
    pub labels: SandboxLabels,
    /// Something is mounted at the data mount
    pub data_mounted: bool,
}

impl ContainerView {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Queries and mutations of sandbox containers.
#[derive(Clone)]
pub struct SandboxRegistry {
    backend: Arc<dyn ContainerBackend>,
    network: String,
    data_mount: String,
    pull_timeout: Duration,
    build_timeout: Duration,
    stop_grace: Duration,
    sudo_fallback: bool,
}

impl SandboxRegistry {
    pub fn new(backend: Arc<dyn ContainerBackend>, config: &HubConfig) -> Self {
        Self {
            backend,
            network: config.network.clone(),
            data_mount: config.data_mount.clone(),
            pull_timeout: config.pull_timeout,
            build_timeout: config.build_timeout,
            stop_grace: config.stop_grace,
            sudo_fallback: config.sudo_fallback,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ContainerBackend> {
        &self.backend
    }

    /// Name of the shared bridge network.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Every container, running or stopped, keyed by name.
    pub async fn list_active(&self) -> SandboxResult<HashMap<String, ContainerView>> {
        let containers = self.backend.list_containers().await?;
        Ok(containers
            .into_iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| {
                let view = ContainerView {
                    labels: SandboxLabels::parse(&c.labels),
                    data_mounted: c.mounts.iter().any(|m| *m == self.data_mount),
                    id: c.id,
                    name: c.name.clone(),
                    state: c.state,
                    image: c.image,
                };
                (c.name, view)
            })
            .collect())
    }

    /// Every published host port, as decimal strings.
    pub async fn list_used_ports(&self) -> SandboxResult<HashSet<String>> {
        let containers = self.backend.list_containers().await?;
        Ok(containers
            .iter()
            .flat_map(|c| c.ports.iter())
            .filter_map(|p| p.public_port)
            .filter(|port| *port != 0)
            .map(|port| port.to_string())
            .collect())
    }

    /// Managed containers whose expiry is strictly before `now`.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> SandboxResult<Vec<ContainerView>> {
        let mut expired: Vec<ContainerView> = self
            .list_active()
            .await?
            .into_values()
            .filter(|view| view.labels.is_expired(now))
            .collect();
        expired.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(expired)
    }

    pub async fn inspect(&self, name: &str) -> SandboxResult<ContainerDetail> {
        self.backend.inspect_container(name).await
    }

    /// Label, create and start a sandbox container.
    ///
    /// A container that was created but failed to start is left in place
    /// and reported as [`SandboxError::StartFailed`].
    pub async fn create(
        &self,
        name: &str,
        ttl: Duration,
        size: &str,
        mut spec: ContainerSpec,
    ) -> SandboxResult<String> {
        if ttl.is_zero() {
            return Err(SandboxError::invalid_input("TTL must be greater than zero"));
        }

        SandboxLabels::new(Utc::now(), ttl, size)
            .with_host_port(spec.host_port())
            .apply(&mut spec.labels);

        let id = self.backend.create_container(name, &spec).await?;

        if let Err(e) = self.backend.start_container(&id).await {
            warn!(container = %name, id = %id, error = %e, "Container created but not started");
            return Err(SandboxError::StartFailed {
                id,
                message: e.to_string(),
            });
        }

        info!(
            container = %name,
            id = %id,
            size = %size,
            ttl = %humantime::format_duration(ttl),
            "Sandbox started"
        );
        Ok(id)
    }

    /// Stop and force-remove a container, optionally deleting its data.
    ///
    /// A missing container is not an error. Returns whether a container
    /// was removed.
    pub async fn remove(
        &self,
        name: &str,
        storage_path: Option<&Path>,
        wipe: bool,
    ) -> SandboxResult<bool> {
        match self.backend.stop_container(name, self.stop_grace).await {
            Ok(()) => debug!(container = %name, "Container stopped"),
            Err(e) if e.is_not_found() => debug!(container = %name, "Container already gone"),
            Err(e) => warn!(container = %name, error = %e, "Error stopping container"),
        }

        let removed = match self.backend.remove_container(name).await {
            Ok(()) => {
                info!(container = %name, "Container removed");
                true
            }
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        if let (true, Some(path)) = (wipe, storage_path) {
            if let Err(e) = storage::remove_tree(path, self.sudo_fallback) {
                return Err(if removed {
                    SandboxError::PartialFailure(format!(
                        "container '{}' removed but its data was not: {}",
                        name, e
                    ))
                } else {
                    e
                });
            }
            info!(path = %path.display(), "Sandbox data wiped");
        }

        Ok(removed)
    }

    /// Pull `image` unless it is already present.
    pub async fn ensure_image(&self, image: &str) -> SandboxResult<()> {
        if self.backend.image_exists(image).await? {
            debug!(image = %image, "Image already exists locally");
            return Ok(());
        }

        info!(image = %image, "Pulling image...");
        let _timing = TimingGuard::pull(image);
        tokio::time::timeout(self.pull_timeout, self.backend.pull_image(image))
            .await
            .map_err(|_| SandboxError::timeout(format!("pulling {}", image), self.pull_timeout))?
    }

    /// Create the shared bridge network if it does not exist.
    pub async fn ensure_network(&self) -> SandboxResult<()> {
        if self.backend.network_exists(&self.network).await? {
            return Ok(());
        }

        info!(network = %self.network, "Creating network");
        let labels = HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]);
        match self.backend.create_network(&self.network, labels).await {
            // Lost a race with a concurrent invocation.
            Err(SandboxError::AlreadyExists(_)) => Ok(()),
            other => other,
        }
    }

    /// Build the directory `context_dir` (with its `Dockerfile`) into `tag`.
    pub async fn build_image(&self, context_dir: &Path, tag: &str) -> SandboxResult<()> {
        let _timing = TimingGuard::build(tag);
        let dir = context_dir.to_path_buf();
        let context = tokio::task::spawn_blocking(move || archive_context(&dir))
            .await
            .map_err(|e| SandboxError::Backend(e.to_string()))??;

        info!(tag = %tag, context = %context_dir.display(), bytes = context.len(), "Building image");
        tokio::time::timeout(
            self.build_timeout,
            self.backend.build_image(context, "Dockerfile", tag),
        )
        .await
        .map_err(|_| SandboxError::timeout(format!("building {}", tag), self.build_timeout))?
    }

    /// Stream log lines of a sandbox.
    pub fn logs(
        &self,
        name: &str,
        follow: bool,
        tail: usize,
    ) -> BoxStream<'static, SandboxResult<String>> {
        self.backend.logs(name, follow, tail)
    }
}

/// Tar a build context directory.
fn archive_context(dir: &Path) -> SandboxResult<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir).map_err(|e| SandboxError::BuildFailed {
        tag: dir.display().to_string(),
        message: format!("failed to archive build context: {}", e),
    })?;
    Ok(builder.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_archive_context_contains_dockerfile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.sh"), "echo hi\n").unwrap();

        let bytes = archive_context(dir.path()).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut found = HashMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            if entry.header().entry_type().is_file() {
                entry.read_to_string(&mut content).unwrap();
                found.insert(path.trim_start_matches("./").to_string(), content);
            }
        }

        assert_eq!(found.get("Dockerfile").map(String::as_str), Some("FROM alpine\n"));
        assert!(found.contains_key("src/app.sh"));
    }

    #[test]
    fn test_view_is_running() {
        let view = ContainerView {
            id: "1".into(),
            name: "web".into(),
            state: "running".into(),
            image: "alpine".into(),
            labels: SandboxLabels::default(),
            data_mounted: false,
        };
        assert!(view.is_running());
        assert!(!ContainerView {
            state: "exited".into(),
            ..view
        }
        .is_running());
    }
}
