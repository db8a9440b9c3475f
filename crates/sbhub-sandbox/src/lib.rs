//! Sandbox lifecycle engine for sbhub.
//!
//! Maps a sandbox name to a container plus a data directory under the
//! storage root, enforces label-encoded expiry, and performs create, attach,
//! detach, renew and remove transitions while tolerating leftover state.
//!
//! - **Catalog**: size tiers and their resource defaults
//! - **Ports**: free host port allocation
//! - **Storage**: data directories, conflicts, snapshots, archives
//! - **Registry**: domain view of the container engine
//! - **Lifecycle**: the controller behind every CLI command
//! - **Janitor**: expiry sweeps
//!
//! The engine is reached only through [`ContainerBackend`]; [`DockerBackend`]
//! is the production implementation.
//!
//! # Example
//!
//! ```rust,no_run
//! use sbhub_sandbox::{
//!     ConflictChoice, CreateOutcome, CreateRequest, DockerBackend, FixedChoice, HubConfig,
//!     LifecycleController,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, _sources) = HubConfig::load(None).await?;
//!     let backend = Arc::new(DockerBackend::connect()?);
//!     let controller = LifecycleController::connect(config, backend).await?;
//!
//!     let request = CreateRequest::named("web")
//!         .size("medium")
//!         .ttl(Duration::from_secs(2 * 60 * 60));
//!     if let CreateOutcome::Created(sandbox) = controller
//!         .create(request, &FixedChoice(ConflictChoice::Attach))
//!         .await?
//!     {
//!         println!("started {} ({})", sandbox.name, sandbox.short_id());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod container;
pub mod error;
pub mod janitor;
pub mod labels;
pub mod lifecycle;
pub mod names;
pub mod port;
pub mod project;
pub mod registry;
pub mod runtime;
pub mod storage;

pub use catalog::{SandboxSpec, SizeTier, DEFAULT_IMAGE};
pub use config::{HubConfig, PortRange};
pub use container::{
    ContainerDetail, ContainerSpec, ContainerSummary, Mutation, PortMapping, PortSummary,
};
pub use error::{ErrorKind, SandboxError, SandboxResult};
pub use janitor::{Janitor, SweepReport};
pub use labels::SandboxLabels;
pub use lifecycle::{
    ConflictResolver, CreateOutcome, CreateRequest, FixedChoice, ImportReport,
    LifecycleController, RemoveOutcome, SandboxHandle, SandboxKind, SandboxListing, WipeChoice,
};
pub use port::find_free_port;
pub use registry::{ContainerView, SandboxRegistry};
pub use runtime::{ContainerBackend, DockerBackend};
pub use storage::{ConflictChoice, ConflictResolution, StorageEntry, StorageManager};
