//! Container engine backends.
//!
//! The rest of the crate talks to the engine only through
//! [`ContainerBackend`]. `docker` is the production implementation; tests
//! use the in-memory mock from `sbhub-test-utils`.

pub mod docker;

use crate::container::{ContainerDetail, ContainerSpec, ContainerSummary};
use crate::error::SandboxResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::time::Duration;

pub use docker::DockerBackend;

/// Narrow view of a container engine.
///
/// Not-found conditions are reported as errors whose
/// [`kind`](crate::SandboxError::kind) is `NotFound`; callers decide whether
/// that is fatal.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Check that the engine is reachable.
    async fn ping(&self) -> SandboxResult<()>;

    /// All containers, running or stopped.
    async fn list_containers(&self) -> SandboxResult<Vec<ContainerSummary>>;

    /// Inspect one container by name or id.
    async fn inspect_container(&self, name: &str) -> SandboxResult<ContainerDetail>;

    /// Create a container and return its id. Does not start it.
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> SandboxResult<String>;

    async fn start_container(&self, id: &str) -> SandboxResult<()>;

    /// Stop, waiting up to `grace` before the engine kills the process.
    async fn stop_container(&self, name: &str, grace: Duration) -> SandboxResult<()>;

    /// Force-remove a container.
    async fn remove_container(&self, name: &str) -> SandboxResult<()>;

    async fn image_exists(&self, image: &str) -> SandboxResult<bool>;

    /// Pull an image, reporting progress through tracing.
    async fn pull_image(&self, image: &str) -> SandboxResult<()>;

    /// Build `context` (a tar archive) into an image tagged `tag`.
    async fn build_image(&self, context: Vec<u8>, dockerfile: &str, tag: &str)
        -> SandboxResult<()>;

    async fn network_exists(&self, name: &str) -> SandboxResult<bool>;

    async fn create_network(&self, name: &str, labels: HashMap<String, String>)
        -> SandboxResult<()>;

    /// Log lines of a container, ending when the container stops if `follow`.
    fn logs(&self, name: &str, follow: bool, tail: usize)
        -> BoxStream<'static, SandboxResult<String>>;
}
