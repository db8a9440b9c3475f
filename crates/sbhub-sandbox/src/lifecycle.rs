//! Lifecycle controller: create, attach, detach, renew, remove, save, list
//! and import.
//!
//! Per sandbox name the states are `Absent -> Active(bound | stateless) ->
//! Removed(archived | wiped)`, and `Active` is reachable again from archived
//! data through attach or restore. Transitions that change a running
//! container (attach, detach, renew) destroy it and create a replacement
//! from the inspected spec; there is no atomic swap.
//!
//! Concurrent invocations on the same name are not coordinated, and a host
//! port chosen by the allocator can be taken before the container starts.

use crate::catalog;
use crate::config::HubConfig;
use crate::container::{ContainerSpec, Mutation};
use crate::error::{SandboxError, SandboxResult};
use crate::labels::SandboxLabels;
use crate::names;
use crate::port::{find_free_port, NO_PORT};
use crate::project::{self, ProjectSource};
use crate::registry::SandboxRegistry;
use crate::runtime::ContainerBackend;
use crate::storage::{ConflictChoice, ConflictResolution, StorageManager};
use chrono::{DateTime, Utc};
use sbhub_util::Operation;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Decides what happens when data already exists for a new sandbox.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, name: &str, path: &Path) -> ConflictChoice;
}

impl<F> ConflictResolver for F
where
    F: Fn(&str, &Path) -> ConflictChoice + Send + Sync,
{
    fn resolve(&self, name: &str, path: &Path) -> ConflictChoice {
        self(name, path)
    }
}

/// Always answers with the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub ConflictChoice);

impl ConflictResolver for FixedChoice {
    fn resolve(&self, _name: &str, _path: &Path) -> ConflictChoice {
        self.0
    }
}

/// Parameters of a new sandbox.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Generated when absent
    pub name: Option<String>,
    /// Configured default tier when absent
    pub size: Option<String>,
    /// Tier image when absent
    pub image: Option<String>,
    /// Tier TTL when absent
    pub ttl: Option<Duration>,
    /// Snapshot to restore into the data directory
    pub restore_tag: Option<String>,
    /// Container port to publish on a free host port
    pub expose: Option<u16>,
    pub env: Vec<String>,
}

impl CreateRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn restore(mut self, tag: impl Into<String>) -> Self {
        self.restore_tag = Some(tag.into());
        self
    }

    pub fn expose(mut self, port: u16) -> Self {
        self.expose = Some(port);
        self
    }

    pub fn env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }
}

/// A started sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxHandle {
    pub id: String,
    pub name: String,
    pub size: String,
    pub ttl: Duration,
    pub host_port: Option<u16>,
    /// `None` for stateless sandboxes
    pub data_path: Option<PathBuf>,
}

impl SandboxHandle {
    /// Short container id for display.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(SandboxHandle),
    /// The conflict resolver chose to cancel; nothing was changed
    Cancelled,
}

/// What `remove` does with the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeChoice {
    /// Remove the container, keep the data on disk
    Keep,
    /// Remove the container and delete the data
    All,
    /// Delete the data only
    VolumeOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub container_removed: bool,
    pub data_wiped: bool,
    /// Data left on disk, if any
    pub data_kept: Option<PathBuf>,
}

/// Kind of row in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxKind {
    /// Container with a data directory
    Active,
    /// Managed container without a data directory
    Stateless,
    /// Data directory without a container
    Archived,
    /// `<name>_snap_<tag>` directory
    Snapshot,
}

impl SandboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Stateless => "Stateless",
            Self::Archived => "Archived",
            Self::Snapshot => "Snapshot",
        }
    }
}

/// One row of `list`.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxListing {
    pub name: String,
    pub kind: SandboxKind,
    pub size: Option<String>,
    pub status: String,
    pub image: Option<String>,
    pub host_port: Option<u16>,
    /// Time left; zero once expired, `None` without an expiry
    pub remaining: Option<Duration>,
    pub storage_path: Option<PathBuf>,
}

impl SandboxListing {
    pub fn is_expired(&self) -> bool {
        self.remaining == Some(Duration::ZERO)
    }
}

/// Result of importing a project.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub created: Vec<SandboxHandle>,
    /// Services skipped because they have no image
    pub skipped: Vec<String>,
    /// Sandboxes not created because the resolver cancelled
    pub cancelled: Vec<String>,
    pub failures: Vec<(String, SandboxError)>,
}

/// Sequences catalog, ports, storage and registry for each command.
pub struct LifecycleController {
    config: HubConfig,
    storage: StorageManager,
    registry: SandboxRegistry,
}

impl LifecycleController {
    /// Build a controller without contacting the engine.
    pub fn new(config: HubConfig, backend: Arc<dyn ContainerBackend>) -> Self {
        let storage = StorageManager::new(config.storage_root.clone(), config.sudo_fallback);
        let registry = SandboxRegistry::new(backend, &config);
        Self {
            config,
            storage,
            registry,
        }
    }

    /// Build a controller and check the engine is reachable.
    pub async fn connect(
        config: HubConfig,
        backend: Arc<dyn ContainerBackend>,
    ) -> SandboxResult<Self> {
        backend.ping().await?;
        Ok(Self::new(config, backend))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn registry(&self) -> &SandboxRegistry {
        &self.registry
    }

    /// Provision a new sandbox.
    pub async fn create(
        &self,
        request: CreateRequest,
        resolver: &dyn ConflictResolver,
    ) -> SandboxResult<CreateOutcome> {
        let name = match request.name {
            Some(name) => name,
            None => {
                let name = names::random_name();
                info!(name = %name, "No name provided, generated one");
                name
            }
        };
        names::validate_sandbox_name(&name)?;

        let size = request.size.as_deref().unwrap_or(&self.config.default_size);
        let (tier, spec) = catalog::lookup(size)?;
        let ttl = request.ttl.unwrap_or(spec.default_ttl);
        if ttl.is_zero() {
            return Err(SandboxError::invalid_input("TTL must be greater than zero"));
        }
        if let Some(tag) = &request.restore_tag {
            names::validate_tag(tag)?;
        }
        if request.expose == Some(0) {
            return Err(SandboxError::invalid_input("exposed port must be greater than zero"));
        }

        match self.registry.inspect(&name).await {
            Ok(_) => return Err(SandboxError::AlreadyExists(name)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let data_path = match &request.restore_tag {
            Some(tag) => self.storage.restore(&name, tag)?,
            None if self.storage.detect_conflict(&name)? => {
                let path = self.storage.resolve_path(&name)?;
                let choice = resolver.resolve(&name, &path);
                match self.storage.resolve_conflict(&name, choice)? {
                    ConflictResolution::Attached(path) => path,
                    ConflictResolution::Renamed { path, .. } => path,
                    ConflictResolution::Cancelled => {
                        info!(name = %name, "Create cancelled");
                        return Ok(CreateOutcome::Cancelled);
                    }
                }
            }
            None => self.storage.create_fresh(&name)?,
        };

        let image = request.image.as_deref().unwrap_or(spec.image);
        let mut container = ContainerSpec::new(image)
            .with_limits(&spec)
            .with_bind(&data_path, &self.config.data_mount)
            .with_env(request.env);

        let host_port = match request.expose {
            Some(container_port) => {
                let host_port = self.allocate_port().await?;
                container = container
                    .with_network(self.registry.network())
                    .with_port(container_port, host_port);
                Some(host_port)
            }
            None => None,
        };

        self.registry.ensure_image(image).await?;

        let id = sbhub_util::time_operation!(Operation::Create, name.clone(), {
            self.registry
                .create(&name, ttl, tier.as_str(), container)
                .await?
        });

        Ok(CreateOutcome::Created(SandboxHandle {
            id,
            name,
            size: tier.as_str().to_string(),
            ttl,
            host_port,
            data_path: Some(data_path),
        }))
    }

    /// Ensure the shared network and pick a free host port.
    async fn allocate_port(&self) -> SandboxResult<u16> {
        self.registry.ensure_network().await?;
        let used = self.registry.list_used_ports().await?;
        let range = self.config.port_range;
        match find_free_port(range.start, range.end, &used) {
            NO_PORT => Err(SandboxError::NoFreePort {
                start: range.start,
                end: range.end,
            }),
            port => Ok(port),
        }
    }

    /// Rebind a sandbox's data mount to `<root>/<folder>`, creating the
    /// folder when missing.
    pub async fn attach(&self, name: &str, folder: &str) -> SandboxResult<SandboxHandle> {
        names::validate_name(name)?;
        names::validate_sandbox_name(folder)?;
        let path = self.storage.resolve_path(folder)?;
        let detail = self.registry.inspect(name).await?;
        self.storage.create_fresh(folder)?;

        info!(name = %name, folder = %folder, "Attaching sandbox to folder");
        let spec = detail.spec.apply(&Mutation::Rebind(path), &self.config.data_mount);
        let size = self.size_label(detail.labels());
        self.recreate(name, spec, self.config.rebind_window, size).await
    }

    /// Recreate a sandbox without its data mount.
    pub async fn detach(&self, name: &str) -> SandboxResult<SandboxHandle> {
        names::validate_name(name)?;
        let detail = self.registry.inspect(name).await?;

        info!(name = %name, "Detaching sandbox from its data");
        let spec = detail.spec.apply(&Mutation::Unbind, &self.config.data_mount);
        let size = self.size_label(detail.labels());
        self.recreate(name, spec, self.config.rebind_window, size).await
    }

    /// Recreate a sandbox with a fresh TTL of `extension` from now.
    pub async fn renew(&self, name: &str, extension: Duration) -> SandboxResult<SandboxHandle> {
        names::validate_name(name)?;
        if extension.is_zero() {
            return Err(SandboxError::invalid_input("TTL must be greater than zero"));
        }
        let detail = self.registry.inspect(name).await?;

        info!(
            name = %name,
            extension = %humantime::format_duration(extension),
            "Renewing sandbox"
        );
        let spec = detail.spec.apply(&Mutation::Keep, &self.config.data_mount);
        let size = self.size_label(detail.labels());
        self.recreate(name, spec, extension, size).await
    }

    fn size_label(&self, labels: &HashMap<String, String>) -> String {
        SandboxLabels::parse(labels)
            .size
            .unwrap_or_else(|| self.config.default_size.clone())
    }

    async fn recreate(
        &self,
        name: &str,
        spec: ContainerSpec,
        ttl: Duration,
        size: String,
    ) -> SandboxResult<SandboxHandle> {
        // Reject before the old container is removed.
        if ttl.is_zero() {
            return Err(SandboxError::invalid_input("TTL must be greater than zero"));
        }
        self.registry.remove(name, None, false).await?;

        let host_port = spec.host_port();
        let data_path = spec.data_dir(&self.config.data_mount);
        let id = self.registry.create(name, ttl, &size, spec).await?;

        Ok(SandboxHandle {
            id,
            name: name.to_string(),
            size,
            ttl,
            host_port,
            data_path,
        })
    }

    /// Remove a sandbox. Snapshot names always wipe the directory only.
    pub async fn remove(&self, name: &str, wipe: WipeChoice) -> SandboxResult<RemoveOutcome> {
        let path = self.storage.resolve_path(name)?;
        let wipe = if names::is_snapshot(name) {
            WipeChoice::VolumeOnly
        } else {
            wipe
        };

        match wipe {
            WipeChoice::VolumeOnly => {
                self.storage.wipe(name)?;
                info!(path = %path.display(), "Volume data removed");
                Ok(RemoveOutcome {
                    container_removed: false,
                    data_wiped: true,
                    data_kept: None,
                })
            }
            WipeChoice::All => {
                let removed = self.registry.remove(name, Some(&path), true).await?;
                Ok(RemoveOutcome {
                    container_removed: removed,
                    data_wiped: true,
                    data_kept: None,
                })
            }
            WipeChoice::Keep => {
                let removed = self.registry.remove(name, None, false).await?;
                Ok(RemoveOutcome {
                    container_removed: removed,
                    data_wiped: false,
                    data_kept: path.is_dir().then_some(path),
                })
            }
        }
    }

    /// Snapshot the data of `name` as `tag`.
    pub fn save(&self, name: &str, tag: &str) -> SandboxResult<PathBuf> {
        self.storage.snapshot(name, tag)
    }

    /// Every storage directory plus managed containers without one.
    pub async fn list(&self, now: DateTime<Utc>) -> SandboxResult<Vec<SandboxListing>> {
        let mut active = self.registry.list_active().await?;
        let mut rows = Vec::new();

        for entry in self.storage.list_entries()? {
            if entry.is_snapshot() {
                rows.push(SandboxListing {
                    name: entry.name,
                    kind: SandboxKind::Snapshot,
                    size: None,
                    status: "Data Only".to_string(),
                    image: None,
                    host_port: None,
                    remaining: None,
                    storage_path: Some(entry.path),
                });
                continue;
            }

            let row = match active.remove(&entry.name) {
                Some(view) => SandboxListing {
                    kind: if view.data_mounted {
                        SandboxKind::Active
                    } else {
                        SandboxKind::Stateless
                    },
                    size: view.labels.size.clone(),
                    status: view.state.clone(),
                    image: Some(view.image.clone()),
                    host_port: view.labels.host_port,
                    remaining: view.labels.remaining(now),
                    name: entry.name,
                    storage_path: Some(entry.path),
                },
                None => SandboxListing {
                    kind: SandboxKind::Archived,
                    size: None,
                    status: "Data Only".to_string(),
                    image: None,
                    host_port: None,
                    remaining: None,
                    name: entry.name,
                    storage_path: Some(entry.path),
                },
            };
            rows.push(row);
        }

        let mut stateless: Vec<_> = active
            .into_values()
            .filter(|view| view.labels.managed)
            .map(|view| SandboxListing {
                kind: SandboxKind::Stateless,
                size: view.labels.size.clone(),
                status: view.state,
                image: Some(view.image),
                host_port: view.labels.host_port,
                remaining: view.labels.remaining(now),
                name: view.name,
                storage_path: None,
            })
            .collect();
        stateless.sort_by(|a, b| a.name.cmp(&b.name));
        rows.extend(stateless);

        Ok(rows)
    }

    /// Fail unless the sandbox is running, before attaching a terminal.
    pub async fn ensure_running(&self, name: &str) -> SandboxResult<()> {
        names::validate_name(name)?;
        let detail = self.registry.inspect(name).await?;
        if !detail.running {
            return Err(SandboxError::NotRunning(name.to_string()));
        }
        Ok(())
    }

    /// Turn a project directory into sandboxes.
    ///
    /// A `Dockerfile` is built as `sb-local-<project>` and started as
    /// `<project>`. Otherwise each compose service with an image becomes
    /// `<project>-<service>`; a failing service does not stop the others.
    pub async fn import(
        &self,
        dir: &Path,
        resolver: &dyn ConflictResolver,
    ) -> SandboxResult<ImportReport> {
        let dir = tokio::fs::canonicalize(dir).await.map_err(|e| {
            SandboxError::invalid_input(format!("cannot open '{}': {}", dir.display(), e))
        })?;
        let project = project::project_name(&dir)?;
        let mut report = ImportReport::default();

        match project::detect(&dir).await? {
            ProjectSource::Dockerfile { dir } => {
                let tag = project::image_tag(&project);
                self.registry.build_image(&dir, &tag).await?;

                info!(project = %project, image = %tag, "Launching custom sandbox");
                match self
                    .create(CreateRequest::named(&project).image(tag), resolver)
                    .await?
                {
                    CreateOutcome::Created(handle) => report.created.push(handle),
                    CreateOutcome::Cancelled => report.cancelled.push(project),
                }
            }
            ProjectSource::Compose { path, project: compose } => {
                info!(project = %project, file = %path.display(), "Parsing compose project");
                self.registry.ensure_network().await?;

                for (service, config) in &compose.services {
                    let name = format!("{}-{}", project, service);
                    let Some(image) = &config.image else {
                        warn!(service = %service, "Service has no image, skipping");
                        report.skipped.push(name);
                        continue;
                    };
                    if !config.volumes.is_empty() {
                        warn!(
                            service = %service,
                            "Compose volumes are not mounted; data lives under the storage root"
                        );
                    }

                    let mut request = CreateRequest::named(&name)
                        .image(image.clone())
                        .env(config.env());
                    if let Some(port) = config.first_container_port() {
                        request = request.expose(port);
                    }

                    info!(sandbox = %name, "Provisioning service");
                    match self.create(request, resolver).await {
                        Ok(CreateOutcome::Created(handle)) => report.created.push(handle),
                        Ok(CreateOutcome::Cancelled) => report.cancelled.push(name),
                        Err(e) => {
                            warn!(sandbox = %name, error = %e, "Failed to provision service");
                            report.failures.push((name, e));
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}
