//! Docker backend over the engine API.
//!
//! Connects through the local socket (or `DOCKER_HOST`) using bollard and
//! translates between engine models and the crate's container records.

use crate::{
    container::{ContainerDetail, ContainerSpec, ContainerSummary, PortMapping, PortSummary},
    error::{SandboxError, SandboxResult},
    runtime::ContainerBackend,
};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogsOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    image::{BuildImageOptions, CreateImageOptions},
    models::{ContainerInspectResponse, HostConfig, PortBinding},
    network::{CreateNetworkOptions, InspectNetworkOptions},
    Docker,
};
use futures::{stream::BoxStream, StreamExt};
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info, warn};

/// Container backend talking to a local Docker daemon.
#[derive(Clone)]
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    /// Connect with the platform defaults. Does not contact the daemon;
    /// call [`ContainerBackend::ping`] for that.
    pub fn connect() -> SandboxResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::connection_failed(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

/// 404 from the engine means the named object is absent.
fn is_missing(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn container_error(name: &str, err: bollard::errors::Error) -> SandboxError {
    if is_missing(&err) {
        SandboxError::ContainerNotFound(name.to_string())
    } else {
        err.into()
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .ports
        .iter()
        .map(|p| (format!("{}/tcp", p.container_port), HashMap::new()))
        .collect();

    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
        .ports
        .iter()
        .map(|p| {
            (
                format!("{}/tcp", p.container_port),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(p.host_port.to_string()),
                }]),
            )
        })
        .collect();

    let host_config = HostConfig {
        binds: Some(spec.binds.clone()).filter(|b| !b.is_empty()),
        nano_cpus: spec.nano_cpus,
        memory: spec.memory_bytes,
        network_mode: spec.network.clone(),
        port_bindings: Some(port_bindings).filter(|p| !p.is_empty()),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        env: Some(spec.env.clone()).filter(|e| !e.is_empty()),
        labels: Some(spec.labels.clone()),
        exposed_ports: Some(exposed_ports).filter(|p| !p.is_empty()),
        tty: Some(spec.tty),
        open_stdin: Some(spec.open_stdin),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn detail_from_inspect(name: &str, info: ContainerInspectResponse) -> ContainerDetail {
    let config = info.config.unwrap_or_default();
    let host = info.host_config.unwrap_or_default();
    let state = info.state.unwrap_or_default();

    let mut ports: Vec<PortMapping> = host
        .port_bindings
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, bindings)| {
            let container_port = key.split('/').next()?.parse().ok()?;
            let host_port = bindings?
                .into_iter()
                .find_map(|b| b.host_port.and_then(|p| p.parse().ok()))?;
            Some(PortMapping {
                container_port,
                host_port,
            })
        })
        .collect();
    ports.sort_by_key(|p| p.container_port);

    let spec = ContainerSpec {
        image: config.image.unwrap_or_default(),
        cmd: config.cmd,
        env: config.env.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        binds: host.binds.unwrap_or_default(),
        nano_cpus: host.nano_cpus.filter(|n| *n > 0),
        memory_bytes: host.memory.filter(|m| *m > 0),
        network: host.network_mode,
        ports,
        tty: config.tty.unwrap_or(false),
        open_stdin: config.open_stdin.unwrap_or(false),
    };

    ContainerDetail {
        id: info.id.unwrap_or_default(),
        name: info
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| name.to_string()),
        running: state.running.unwrap_or(false),
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        spec,
    }
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn ping(&self) -> SandboxResult<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| SandboxError::connection_failed(format!("Docker ping failed: {}", e)))?;
        Ok(())
    }

    async fn list_containers(&self) -> SandboxResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PortSummary {
                        private_port: p.private_port,
                        public_port: p.public_port,
                    })
                    .collect(),
                mounts: c
                    .mounts
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.destination)
                    .collect(),
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> SandboxResult<ContainerDetail> {
        let info = self
            .docker
            .inspect_container(name, None)
            .await
            .map_err(|e| container_error(name, e))?;
        Ok(detail_from_inspect(name, info))
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> SandboxResult<String> {
        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| match SandboxError::from(e) {
                SandboxError::AlreadyExists(_) => SandboxError::AlreadyExists(name.to_string()),
                other => SandboxError::CreateFailed(other.to_string()),
            })?;

        for warning in &response.warnings {
            warn!(container = %name, warning = %warning, "Engine warning on create");
        }
        debug!(container = %name, id = %response.id, "Container created");
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> SandboxResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| container_error(id, e))
    }

    async fn stop_container(&self, name: &str, grace: Duration) -> SandboxResult<()> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        self.docker
            .stop_container(name, Some(options))
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn remove_container(&self, name: &str) -> SandboxResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| container_error(name, e))
    }

    async fn image_exists(&self, image: &str) -> SandboxResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> SandboxResult<()> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        let layer = info.id.unwrap_or_default();
                        if info.progress.is_some() {
                            debug!(image = %image, layer = %layer, status = %status, "Image pull progress");
                        } else {
                            info!(image = %image, layer = %layer, status = %status, "Image pull progress");
                        }
                    }
                }
                Err(e) => {
                    return Err(SandboxError::image_pull_failed(image, e.to_string()));
                }
            }
        }

        info!(image = %image, "Image pulled successfully");
        Ok(())
    }

    async fn build_image(
        &self,
        context: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> SandboxResult<()> {
        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context.into()));

        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| SandboxError::BuildFailed {
                tag: tag.to_string(),
                message: e.to_string(),
            })?;
            if let Some(error) = info.error {
                return Err(SandboxError::BuildFailed {
                    tag: tag.to_string(),
                    message: error,
                });
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    info!(tag = %tag, "{}", line);
                }
            }
        }

        info!(tag = %tag, "Image built successfully");
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> SandboxResult<bool> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_network(
        &self,
        name: &str,
        labels: HashMap<String, String>,
    ) -> SandboxResult<()> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            labels,
            ..Default::default()
        };
        self.docker.create_network(options).await?;
        Ok(())
    }

    fn logs(
        &self,
        name: &str,
        follow: bool,
        tail: usize,
    ) -> BoxStream<'static, SandboxResult<String>> {
        let docker = self.docker.clone();
        let name = name.to_string();

        Box::pin(async_stream::stream! {
            let options = LogsOptions::<String> {
                follow,
                stdout: true,
                stderr: true,
                timestamps: true,
                tail: tail.to_string(),
                ..Default::default()
            };

            let mut stream = docker.logs(&name, Some(options));
            while let Some(item) = stream.next().await {
                yield item
                    .map(|output| output.to_string().trim_end().to_string())
                    .map_err(|e| container_error(&name, e));
            }
        })
    }
}
