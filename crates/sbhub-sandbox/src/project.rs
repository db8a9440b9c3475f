//! Project detection and compose parsing for `import`.

use crate::error::{SandboxError, SandboxResult};
use crate::names;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Image tag prefix for locally built projects.
pub const LOCAL_IMAGE_PREFIX: &str = "sb-local-";

const COMPOSE_FILES: [&str; 2] = ["docker-compose.yml", "docker-compose.yaml"];

/// What an import directory contains.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectSource {
    /// A `Dockerfile` to build
    Dockerfile { dir: PathBuf },
    /// A compose file listing services
    Compose { path: PathBuf, project: ComposeProject },
}

/// The subset of a compose file that maps onto sandboxes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComposeProject {
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComposeService {
    pub image: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortEntry>,
    #[serde(default)]
    pub volumes: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub environment: Environment,
}

/// A `ports:` item, in short (`"8080:80"`, `80`) or long form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Number(u32),
    Short(String),
    Long { target: u32 },
}

impl PortEntry {
    /// The container side of the mapping.
    pub fn container_port(&self) -> Option<u16> {
        match self {
            Self::Number(port) | Self::Long { target: port } => u16::try_from(*port).ok(),
            Self::Short(spec) => {
                let last = spec.rsplit(':').next()?;
                let port = last.split('/').next()?;
                // Ranges like "3000-3005" expose their first port.
                port.split('-').next()?.trim().parse().ok()
            }
        }
    }
}

/// `environment:` as a map or a `KEY=value` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    Map(BTreeMap<String, Option<serde_yaml::Value>>),
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl ComposeService {
    /// Environment as `KEY=value` strings. Map entries without a value are
    /// dropped.
    pub fn env(&self) -> Vec<String> {
        match &self.environment {
            Environment::List(items) => items.clone(),
            Environment::Map(map) => map
                .iter()
                .filter_map(|(key, value)| {
                    let value = match value.as_ref()? {
                        serde_yaml::Value::String(s) => s.clone(),
                        serde_yaml::Value::Number(n) => n.to_string(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some(format!("{}={}", key, value))
                })
                .collect(),
        }
    }

    /// First declared container port.
    pub fn first_container_port(&self) -> Option<u16> {
        self.ports.iter().find_map(PortEntry::container_port)
    }
}

impl ComposeProject {
    pub fn parse(path: &Path, content: &str) -> SandboxResult<Self> {
        serde_yaml::from_str(content).map_err(|e| SandboxError::ProjectFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Sandbox name for a project directory: its final path component.
pub fn project_name(dir: &Path) -> SandboxResult<String> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            SandboxError::invalid_input(format!("cannot derive a name from '{}'", dir.display()))
        })?;
    names::validate_name(&name)?;
    Ok(name)
}

/// Image tag for a locally built project. Engine tags must be lowercase.
pub fn image_tag(project: &str) -> String {
    format!("{}{}", LOCAL_IMAGE_PREFIX, project.to_lowercase())
}

/// Inspect `dir` for a `Dockerfile`, then a compose file.
pub async fn detect(dir: &Path) -> SandboxResult<ProjectSource> {
    if !dir.is_dir() {
        return Err(SandboxError::invalid_input(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    if dir.join("Dockerfile").is_file() {
        return Ok(ProjectSource::Dockerfile {
            dir: dir.to_path_buf(),
        });
    }

    for file in COMPOSE_FILES {
        let path = dir.join(file);
        if path.is_file() {
            let content = tokio::fs::read_to_string(&path).await?;
            let project = ComposeProject::parse(&path, &content)?;
            return Ok(ProjectSource::Compose { path, project });
        }
    }

    Err(SandboxError::invalid_input(format!(
        "no Dockerfile or docker-compose.yml found in '{}'",
        dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMPOSE: &str = r#"
services:
  web:
    image: nginx:alpine
    ports:
      - "8080:80"
      - "443"
    volumes:
      - ./html:/usr/share/nginx/html
    environment:
      MODE: dev
      WORKERS: 4
      EMPTY:
  db:
    image: postgres:16
    ports:
      - target: 5432
        published: 5432
    environment:
      - POSTGRES_PASSWORD=secret
  builder:
    build: .
"#;

    #[test]
    fn test_parse_compose() {
        let project = ComposeProject::parse(Path::new("docker-compose.yml"), COMPOSE).unwrap();
        assert_eq!(project.services.len(), 3);

        let web = &project.services["web"];
        assert_eq!(web.image.as_deref(), Some("nginx:alpine"));
        assert_eq!(web.first_container_port(), Some(80));
        assert_eq!(web.env(), vec!["MODE=dev".to_string(), "WORKERS=4".to_string()]);
        assert_eq!(web.volumes.len(), 1);

        let db = &project.services["db"];
        assert_eq!(db.first_container_port(), Some(5432));
        assert_eq!(db.env(), vec!["POSTGRES_PASSWORD=secret".to_string()]);

        assert_eq!(project.services["builder"].image, None);
    }

    #[test]
    fn test_port_entry_forms() {
        assert_eq!(PortEntry::Short("127.0.0.1:8080:80/tcp".into()).container_port(), Some(80));
        assert_eq!(PortEntry::Short("3000-3005".into()).container_port(), Some(3000));
        assert_eq!(PortEntry::Number(9000).container_port(), Some(9000));
        assert_eq!(PortEntry::Number(70000).container_port(), None);
        assert_eq!(PortEntry::Short("abc".into()).container_port(), None);
    }

    #[test]
    fn test_malformed_yaml_is_invalid_input() {
        let err = ComposeProject::parse(Path::new("c.yml"), "services: [unterminated").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_names() {
        assert_eq!(project_name(Path::new("/work/My.App")).unwrap(), "My.App");
        assert!(project_name(Path::new("/")).is_err());
        assert_eq!(image_tag("My.App"), "sb-local-my.app");
    }

    #[tokio::test]
    async fn test_detect_prefers_dockerfile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::write(dir.path().join("docker-compose.yml"), COMPOSE).unwrap();

        let source = detect(dir.path()).await.unwrap();
        assert!(matches!(source, ProjectSource::Dockerfile { .. }));
    }

    #[tokio::test]
    async fn test_detect_compose_yaml_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("docker-compose.yaml"), COMPOSE).unwrap();

        match detect(dir.path()).await.unwrap() {
            ProjectSource::Compose { path, project } => {
                assert!(path.ends_with("docker-compose.yaml"));
                assert_eq!(project.services.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_nothing() {
        let dir = TempDir::new().unwrap();
        let err = detect(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }
}
