//! In-memory container backend.
//!
//! Keeps containers, images and networks in shared state, records every
//! call, and can be told to fail specific operations. Clones share state,
//! so a test can hand one clone to the controller and inspect another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use sbhub_sandbox::{
    ContainerBackend, ContainerDetail, ContainerSpec, ContainerSummary, PortSummary,
    SandboxError, SandboxLabels, SandboxResult,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Ping,
    List,
    Inspect(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    ImageExists(String),
    Pull(String),
    Build { tag: String, dockerfile: String },
    NetworkExists(String),
    CreateNetwork(String),
    Logs(String),
}

impl BackendCall {
    /// Whether this call changes engine state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create(_)
                | Self::Start(_)
                | Self::Stop(_)
                | Self::Remove(_)
                | Self::Pull(_)
                | Self::Build { .. }
                | Self::CreateNetwork(_)
        )
    }
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    Create,
    Start,
    Stop,
    Remove,
    Pull,
    Build,
}

/// A container held by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub spec: ContainerSpec,
    pub running: bool,
    /// Ports reported by the list call in addition to `spec.ports`
    pub extra_ports: Vec<PortSummary>,
}

impl MockContainer {
    pub fn labels(&self) -> SandboxLabels {
        SandboxLabels::parse(&self.spec.labels)
    }

    fn state(&self) -> &'static str {
        if self.running {
            "running"
        } else {
            "exited"
        }
    }
}

#[derive(Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    images: HashSet<String>,
    networks: HashMap<String, HashMap<String, String>>,
    logs: HashMap<String, Vec<String>>,
    calls: Vec<BackendCall>,
    failures: HashSet<(FailOp, String)>,
    pull_delay: Option<Duration>,
    unreachable: bool,
    next_id: u64,
    built_contexts: HashMap<String, Vec<u8>>,
}

impl MockState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:064x}", self.next_id)
    }

    fn should_fail(&self, op: FailOp, target: &str) -> bool {
        self.failures.contains(&(op, target.to_string()))
    }

    fn find_mut(&mut self, name_or_id: &str) -> Option<&mut MockContainer> {
        self.containers
            .values_mut()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
    }
}

fn injected(op: FailOp, target: &str) -> SandboxError {
    SandboxError::Backend(format!("injected {:?} failure for {}", op, target))
}

/// Mock implementation of [`ContainerBackend`].
///
/// # Example
///
/// ```rust,ignore
/// use sbhub_test_utils::MockBackend;
///
/// let backend = MockBackend::new()
///     .with_image("alpine:latest")
///     .with_expired_sandbox("old", None);
/// let controller = hub.controller(&backend);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` and `list_containers` fail as if the daemon were down.
    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().unreachable = true;
        self
    }

    /// Mark an image as already present.
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.state.lock().unwrap().images.insert(image.into());
        self
    }

    /// Add a container with the given spec.
    pub fn with_container(self, name: &str, spec: ContainerSpec, running: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.images.insert(spec.image.clone());
            let id = state.next_id();
            state.containers.insert(
                name.to_string(),
                MockContainer {
                    id,
                    name: name.to_string(),
                    spec,
                    running,
                    extra_ports: Vec::new(),
                },
            );
        }
        self
    }

    /// Add a running managed sandbox expiring at `expires`, optionally
    /// bound to `data` at `/data`.
    pub fn with_sandbox(self, name: &str, expires: DateTime<Utc>, data: Option<&Path>) -> Self {
        let mut spec = ContainerSpec::new(sbhub_sandbox::DEFAULT_IMAGE);
        if let Some(path) = data {
            spec = spec.with_bind(path, "/data");
        }
        let labels = SandboxLabels {
            managed: true,
            expires: Some(expires),
            size: Some("small".to_string()),
            host_port: None,
        };
        labels.apply(&mut spec.labels);
        self.with_container(name, spec, true)
    }

    /// Add a sandbox that expired an hour ago.
    pub fn with_expired_sandbox(self, name: &str, data: Option<&Path>) -> Self {
        self.with_sandbox(name, Utc::now() - chrono::Duration::hours(1), data)
    }

    /// Add a sandbox that expires in an hour.
    pub fn with_live_sandbox(self, name: &str, data: Option<&Path>) -> Self {
        self.with_sandbox(name, Utc::now() + chrono::Duration::hours(1), data)
    }

    /// Report an extra port on a container in list results.
    pub fn with_listed_port(self, name: &str, private_port: u16, public_port: Option<u16>) -> Self {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.extra_ports.push(PortSummary {
                private_port,
                public_port,
            });
        }
        self
    }

    /// Set the raw labels of an existing container.
    pub fn with_labels(self, name: &str, labels: HashMap<String, String>) -> Self {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.spec.labels = labels;
        }
        self
    }

    pub fn with_network(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .networks
            .insert(name.to_string(), HashMap::new());
        self
    }

    pub fn with_logs(self, name: &str, lines: &[&str]) -> Self {
        self.state.lock().unwrap().logs.insert(
            name.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    /// Make `op` fail for `target` (a container name, image or tag).
    pub fn failing(self, op: FailOp, target: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, target.to_string()));
        self
    }

    /// Delay every pull by `delay`.
    pub fn with_pull_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().pull_delay = Some(delay);
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change engine state.
    pub fn mutations(&self) -> Vec<BackendCall> {
        self.calls().into_iter().filter(BackendCall::is_mutation).collect()
    }

    pub fn was_called(&self, call: &BackendCall) -> bool {
        self.state.lock().unwrap().calls.contains(call)
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.state.lock().unwrap().images.contains(image)
    }

    pub fn network_labels(&self, name: &str) -> Option<HashMap<String, String>> {
        self.state.lock().unwrap().networks.get(name).cloned()
    }

    /// Size of the build context sent for `tag`.
    pub fn built_context_len(&self, tag: &str) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .built_contexts
            .get(tag)
            .map(Vec::len)
    }

    fn record(&self, call: BackendCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerBackend for MockBackend {
    async fn ping(&self) -> SandboxResult<()> {
        self.record(BackendCall::Ping);
        if self.state.lock().unwrap().unreachable {
            return Err(SandboxError::connection_failed("mock daemon is down"));
        }
        Ok(())
    }

    async fn list_containers(&self) -> SandboxResult<Vec<ContainerSummary>> {
        self.record(BackendCall::List);
        let state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(SandboxError::connection_failed("mock daemon is down"));
        }
        Ok(state
            .containers
            .values()
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                state: c.state().to_string(),
                image: c.spec.image.clone(),
                labels: c.spec.labels.clone(),
                ports: c
                    .spec
                    .ports
                    .iter()
                    .map(|p| PortSummary {
                        private_port: p.container_port,
                        public_port: Some(p.host_port),
                    })
                    .chain(c.extra_ports.iter().copied())
                    .collect(),
                mounts: c.spec.mount_targets(),
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> SandboxResult<ContainerDetail> {
        self.record(BackendCall::Inspect(name.to_string()));
        let mut state = self.state.lock().unwrap();
        let c = state
            .find_mut(name)
            .ok_or_else(|| SandboxError::ContainerNotFound(name.to_string()))?;
        Ok(ContainerDetail {
            id: c.id.clone(),
            name: c.name.clone(),
            running: c.running,
            status: c.state().to_string(),
            spec: c.spec.clone(),
        })
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> SandboxResult<String> {
        self.record(BackendCall::Create(name.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.should_fail(FailOp::Create, name) {
            return Err(injected(FailOp::Create, name));
        }
        if state.containers.contains_key(name) {
            return Err(SandboxError::AlreadyExists(name.to_string()));
        }
        if !state.images.contains(&spec.image) {
            return Err(SandboxError::CreateFailed(format!(
                "No such image: {}",
                spec.image
            )));
        }

        let id = state.next_id();
        state.containers.insert(
            name.to_string(),
            MockContainer {
                id: id.clone(),
                name: name.to_string(),
                spec: spec.clone(),
                running: false,
                extra_ports: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> SandboxResult<()> {
        self.record(BackendCall::Start(id.to_string()));
        let mut state = self.state.lock().unwrap();
        let name = state
            .find_mut(id)
            .map(|c| c.name.clone())
            .ok_or_else(|| SandboxError::ContainerNotFound(id.to_string()))?;
        if state.should_fail(FailOp::Start, &name) {
            return Err(injected(FailOp::Start, &name));
        }
        if let Some(c) = state.find_mut(id) {
            c.running = true;
        }
        Ok(())
    }

    async fn stop_container(&self, name: &str, _grace: Duration) -> SandboxResult<()> {
        self.record(BackendCall::Stop(name.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.should_fail(FailOp::Stop, name) {
            return Err(injected(FailOp::Stop, name));
        }
        let c = state
            .find_mut(name)
            .ok_or_else(|| SandboxError::ContainerNotFound(name.to_string()))?;
        c.running = false;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> SandboxResult<()> {
        self.record(BackendCall::Remove(name.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.should_fail(FailOp::Remove, name) {
            return Err(injected(FailOp::Remove, name));
        }
        let key = state
            .find_mut(name)
            .map(|c| c.name.clone())
            .ok_or_else(|| SandboxError::ContainerNotFound(name.to_string()))?;
        state.containers.remove(&key);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> SandboxResult<bool> {
        self.record(BackendCall::ImageExists(image.to_string()));
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> SandboxResult<()> {
        self.record(BackendCall::Pull(image.to_string()));
        let delay = self.state.lock().unwrap().pull_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.should_fail(FailOp::Pull, image) {
            return Err(SandboxError::image_pull_failed(image, "injected failure"));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn build_image(
        &self,
        context: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> SandboxResult<()> {
        self.record(BackendCall::Build {
            tag: tag.to_string(),
            dockerfile: dockerfile.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        if state.should_fail(FailOp::Build, tag) {
            return Err(SandboxError::BuildFailed {
                tag: tag.to_string(),
                message: "injected failure".to_string(),
            });
        }
        state.built_contexts.insert(tag.to_string(), context);
        state.images.insert(tag.to_string());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> SandboxResult<bool> {
        self.record(BackendCall::NetworkExists(name.to_string()));
        Ok(self.state.lock().unwrap().networks.contains_key(name))
    }

    async fn create_network(
        &self,
        name: &str,
        labels: HashMap<String, String>,
    ) -> SandboxResult<()> {
        self.record(BackendCall::CreateNetwork(name.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.networks.contains_key(name) {
            return Err(SandboxError::AlreadyExists(name.to_string()));
        }
        state.networks.insert(name.to_string(), labels);
        Ok(())
    }

    fn logs(
        &self,
        name: &str,
        _follow: bool,
        tail: usize,
    ) -> BoxStream<'static, SandboxResult<String>> {
        self.record(BackendCall::Logs(name.to_string()));
        let state = self.state.lock().unwrap();
        let lines: Vec<SandboxResult<String>> = match state.logs.get(name) {
            Some(lines) => {
                let skip = lines.len().saturating_sub(tail);
                lines[skip..].iter().cloned().map(Ok).collect()
            }
            None if state.containers.contains_key(name) => Vec::new(),
            None => vec![Err(SandboxError::ContainerNotFound(name.to_string()))],
        };
        stream::iter(lines).boxed()
    }
}
