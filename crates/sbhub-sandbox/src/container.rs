//! Engine-neutral container records and the recreate mutation.

use crate::catalog::SandboxSpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A published port: container port bound to a host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// Everything needed to (re)create a sandbox container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Bind mounts in `host:container[:opts]` form
    pub binds: Vec<String>,
    pub nano_cpus: Option<i64>,
    pub memory_bytes: Option<i64>,
    pub network: Option<String>,
    pub ports: Vec<PortMapping>,
    pub tty: bool,
    pub open_stdin: bool,
}

impl ContainerSpec {
    /// Interactive container running `image` with no limits or mounts.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cmd: None,
            env: Vec::new(),
            labels: HashMap::new(),
            binds: Vec::new(),
            nano_cpus: None,
            memory_bytes: None,
            network: None,
            ports: Vec::new(),
            tty: true,
            open_stdin: true,
        }
    }

    /// Apply the CPU and memory limits of a catalog entry.
    pub fn with_limits(mut self, spec: &SandboxSpec) -> Self {
        self.nano_cpus = Some(spec.nano_cpus());
        self.memory_bytes = Some(spec.memory_bytes());
        self
    }

    /// Bind `host` at `mount` inside the container.
    pub fn with_bind(mut self, host: &Path, mount: &str) -> Self {
        self.binds.push(format!("{}:{}", host.display(), mount));
        self
    }

    /// Join a user-defined network.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Publish `container_port` on `host_port`.
    pub fn with_port(mut self, container_port: u16, host_port: u16) -> Self {
        self.ports.push(PortMapping {
            container_port,
            host_port,
        });
        self
    }

    pub fn with_env(mut self, env: impl IntoIterator<Item = String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Host port of the first published mapping.
    pub fn host_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.host_port)
    }

    /// Container-side targets of the bind mounts.
    pub fn mount_targets(&self) -> Vec<String> {
        self.binds
            .iter()
            .filter_map(|bind| bind.split(':').nth(1))
            .map(str::to_string)
            .collect()
    }

    /// Host directory bound at `mount`, if any.
    pub fn data_dir(&self, mount: &str) -> Option<PathBuf> {
        self.binds
            .iter()
            .find_map(|bind| bind_host(bind, mount))
            .map(PathBuf::from)
    }

    /// Derive the spec for a recreated container.
    ///
    /// Binds targeting other paths, limits, ports and environment carry over
    /// unchanged. Labels are carried over too; callers replace the sbhub
    /// labels before creating.
    pub fn apply(&self, mutation: &Mutation, mount: &str) -> ContainerSpec {
        let mut next = self.clone();
        match mutation {
            Mutation::Keep => {}
            Mutation::Rebind(path) => {
                next.binds.retain(|bind| bind_host(bind, mount).is_none());
                next.binds.push(format!("{}:{}", path.display(), mount));
            }
            Mutation::Unbind => {
                next.binds.retain(|bind| bind_host(bind, mount).is_none());
            }
        }
        next
    }
}

/// How a recreated container's data mount changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Same mounts (renew)
    Keep,
    /// Bind a different host directory at the data mount (attach)
    Rebind(PathBuf),
    /// Drop the data mount (detach)
    Unbind,
}

fn bind_host<'a>(bind: &'a str, mount: &str) -> Option<&'a str> {
    let rest = bind
        .strip_suffix(":rw")
        .or_else(|| bind.strip_suffix(":ro"))
        .unwrap_or(bind);
    rest.strip_suffix(mount)?.strip_suffix(':')
}

/// A published port as listed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSummary {
    pub private_port: u16,
    pub public_port: Option<u16>,
}

/// One row of the engine's container list.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    /// Primary name without the engine's leading `/`
    pub name: String,
    pub state: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortSummary>,
    /// Container-side paths of its mounts
    pub mounts: Vec<String>,
}

/// Full inspection of one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDetail {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub status: String,
    pub spec: ContainerSpec,
}

impl ContainerDetail {
    pub fn labels(&self) -> &HashMap<String, String> {
        &self.spec.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SizeTier;

    fn bound() -> ContainerSpec {
        ContainerSpec::new("alpine:latest")
            .with_limits(&SizeTier::Medium.spec())
            .with_bind(Path::new("/srv/sb/web"), "/data")
            .with_bind(Path::new("/srv/cache"), "/cache")
            .with_port(80, 8001)
    }

    #[test]
    fn test_new_is_interactive() {
        let spec = ContainerSpec::new("alpine:latest");
        assert!(spec.tty && spec.open_stdin);
        assert!(spec.binds.is_empty());
    }

    #[test]
    fn test_data_dir() {
        let spec = bound();
        assert_eq!(spec.data_dir("/data"), Some(PathBuf::from("/srv/sb/web")));
        assert_eq!(spec.data_dir("/missing"), None);

        let spec = ContainerSpec {
            binds: vec!["/srv/sb/api:/data:rw".into()],
            ..ContainerSpec::new("alpine")
        };
        assert_eq!(spec.data_dir("/data"), Some(PathBuf::from("/srv/sb/api")));
    }

    #[test]
    fn test_mount_targets() {
        let mut targets = bound().mount_targets();
        targets.sort();
        assert_eq!(targets, vec!["/cache".to_string(), "/data".to_string()]);
        assert_eq!(bound().apply(&Mutation::Unbind, "/data").mount_targets(), ["/cache"]);
    }

    #[test]
    fn test_keep_is_identity() {
        let spec = bound();
        assert_eq!(spec.apply(&Mutation::Keep, "/data"), spec);
    }

    #[test]
    fn test_rebind_replaces_only_data_mount() {
        let spec = bound().apply(&Mutation::Rebind(PathBuf::from("/srv/sb/other")), "/data");
        assert_eq!(spec.data_dir("/data"), Some(PathBuf::from("/srv/sb/other")));
        assert_eq!(spec.binds.len(), 2);
        assert!(spec.binds.contains(&"/srv/cache:/cache".to_string()));
        assert_eq!(spec.memory_bytes, bound().memory_bytes);
        assert_eq!(spec.host_port(), Some(8001));
    }

    #[test]
    fn test_rebind_stateless_adds_mount() {
        let spec = ContainerSpec::new("alpine")
            .apply(&Mutation::Rebind(PathBuf::from("/srv/sb/web")), "/data");
        assert_eq!(spec.binds, vec!["/srv/sb/web:/data".to_string()]);
    }

    #[test]
    fn test_unbind() {
        let spec = bound().apply(&Mutation::Unbind, "/data");
        assert_eq!(spec.data_dir("/data"), None);
        assert_eq!(spec.binds, vec!["/srv/cache:/cache".to_string()]);
    }
}
