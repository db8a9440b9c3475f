//! Test fixtures for reproducible hub environments.
//!
//! [`TestHub`] owns a temporary storage root and a configuration tuned for
//! tests. [`TestProject`] lays out a project directory for import.

use crate::backend::MockBackend;
use sbhub_sandbox::{HubConfig, Janitor, LifecycleController, SandboxRegistry, StorageManager};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A temporary storage root with a matching configuration.
///
/// The root is removed when the `TestHub` is dropped.
///
/// # Example
///
/// ```rust
/// use sbhub_test_utils::fixtures::TestHub;
///
/// let hub = TestHub::new().with_data("web", "notes.txt", "hello");
/// assert!(hub.path("web").join("notes.txt").exists());
/// ```
pub struct TestHub {
    temp_dir: TempDir,
    config: HubConfig,
}

impl TestHub {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("sandboxes");
        fs::create_dir_all(&root).expect("Failed to create storage root");

        let config = HubConfig {
            storage_root: root,
            sudo_fallback: false,
            pull_timeout: Duration::from_secs(5),
            build_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(1),
            janitor_interval: Duration::from_millis(50),
            ..HubConfig::default()
        };

        Self { temp_dir, config }
    }

    /// Adjust the configuration.
    pub fn configure(mut self, f: impl FnOnce(&mut HubConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Create `<root>/<dir>/<file>` with `contents`.
    pub fn with_data(self, dir: &str, file: &str, contents: &str) -> Self {
        let path = self.path(dir).join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create data directory");
        }
        fs::write(&path, contents).expect("Failed to write data file");
        self
    }

    /// Create an empty `<root>/<dir>`.
    pub fn with_dir(self, dir: &str) -> Self {
        fs::create_dir_all(self.path(dir)).expect("Failed to create data directory");
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.storage_root
    }

    /// `<root>/<name>`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// Scratch space outside the storage root.
    pub fn scratch(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Read `<root>/<dir>/<file>`, if present.
    pub fn read(&self, dir: &str, file: &str) -> Option<String> {
        fs::read_to_string(self.path(dir).join(file)).ok()
    }

    /// Names of every entry under the root, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root())
            .map(|rd| {
                rd.filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn storage(&self) -> StorageManager {
        StorageManager::new(self.root(), false)
    }

    pub fn registry(&self, backend: &MockBackend) -> SandboxRegistry {
        SandboxRegistry::new(Arc::new(backend.clone()), &self.config)
    }

    pub fn controller(&self, backend: &MockBackend) -> LifecycleController {
        LifecycleController::new(self.config.clone(), Arc::new(backend.clone()))
    }

    pub fn janitor(&self, backend: &MockBackend) -> Janitor {
        Janitor::new(
            self.storage(),
            self.registry(backend),
            self.config.janitor_interval,
        )
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary project directory for import.
///
/// The project directory is named after the project, since import derives
/// sandbox names from it.
///
/// # Example
///
/// ```rust
/// use sbhub_test_utils::fixtures::TestProject;
///
/// let project = TestProject::named("shop")
///     .with_file("Dockerfile", "FROM alpine\n")
///     .build();
///
/// assert!(project.path().ends_with("shop"));
/// assert!(project.path().join("Dockerfile").exists());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    name: String,
    files: HashMap<PathBuf, String>,
}

impl TestProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            name: name.into(),
            files: HashMap::new(),
        }
    }

    /// Add a file, relative to the project directory.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.files.insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    pub fn with_dockerfile(self, contents: impl Into<String>) -> Self {
        self.with_file("Dockerfile", contents)
    }

    pub fn with_compose(self, contents: impl Into<String>) -> Self {
        self.with_file("docker-compose.yml", contents)
    }

    /// Write all files to disk.
    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path().join(&self.name);
        fs::create_dir_all(&root).expect("Failed to create project directory");

        for (path, contents) in &self.files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!("Failed to create parent directory {:?}: {}", parent, e)
                });
            }
            fs::write(&full, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {:?}: {}", full, e));
        }

        BuiltTestProject {
            _temp_dir: self.temp_dir,
            root,
        }
    }
}

/// A project whose files have been written.
pub struct BuiltTestProject {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl BuiltTestProject {
    pub fn path(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_layout() {
        let hub = TestHub::new()
            .with_data("web", "a.txt", "1")
            .with_dir("web_snap_v1");

        assert_eq!(hub.entries(), vec!["web", "web_snap_v1"]);
        assert_eq!(hub.read("web", "a.txt").as_deref(), Some("1"));
        assert!(!hub.config().sudo_fallback);
        assert!(hub.root().starts_with(hub.scratch()));
    }

    #[test]
    fn test_configure() {
        let hub = TestHub::new().configure(|c| c.default_size = "large".into());
        assert_eq!(hub.config().default_size, "large");
    }

    #[test]
    fn test_project_nested_files() {
        let project = TestProject::named("api")
            .with_compose("services: {}\n")
            .with_file("conf/app.env", "A=1")
            .build();

        assert!(project.path().ends_with("api"));
        assert!(project.path().join("docker-compose.yml").is_file());
        assert!(project.path().join("conf/app.env").is_file());
    }
}
