//! Sandbox data directories under the storage root.
//!
//! Layout:
//!
//! ```text
//! <root>/<name>/                       live data, bind-mounted at /data
//! <root>/<name>_old_<stamp>/           data renamed aside on conflict
//! <root>/<name>_snap_<tag>/            snapshot
//! <root>/<name>_janitor_<stamp>/       archived by the janitor
//! ```
//!
//! Files written from inside containers are often owned by root. When a
//! rename, copy or delete hits a permission error and `sudo_fallback` is
//! enabled, the operation is retried once through `sudo -n`.

use crate::error::{SandboxError, SandboxResult};
use crate::names::{self, ARCHIVE_MARKER, RENAMED_MARKER, SNAPSHOT_MARKER};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Caller's decision when data already exists for a new sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Reuse the existing directory
    Attach,
    /// Move the existing directory aside and start empty
    Rename,
    /// Abort without touching anything
    Cancel,
}

/// What [`StorageManager::resolve_conflict`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResolution {
    Attached(PathBuf),
    Renamed { previous: PathBuf, path: PathBuf },
    Cancelled,
}

/// A directory found under the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub path: PathBuf,
}

impl StorageEntry {
    pub fn is_snapshot(&self) -> bool {
        names::is_snapshot(&self.name)
    }
}

/// Owns path computation and mutation under one storage root.
#[derive(Debug, Clone)]
pub struct StorageManager {
    root: PathBuf,
    sudo_fallback: bool,
}

impl StorageManager {
    pub fn new(root: impl Into<PathBuf>, sudo_fallback: bool) -> Self {
        Self {
            root: root.into(),
            sudo_fallback,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `name`. The name is validated so it can never escape
    /// the root.
    pub fn resolve_path(&self, name: &str) -> SandboxResult<PathBuf> {
        names::validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Whether data already exists for `name`.
    pub fn detect_conflict(&self, name: &str) -> SandboxResult<bool> {
        Ok(self.resolve_path(name)?.exists())
    }

    /// Act on the caller's decision about existing data.
    pub fn resolve_conflict(
        &self,
        name: &str,
        choice: ConflictChoice,
    ) -> SandboxResult<ConflictResolution> {
        let path = self.resolve_path(name)?;
        match choice {
            ConflictChoice::Attach => {
                info!(path = %path.display(), "Attaching existing data");
                Ok(ConflictResolution::Attached(path))
            }
            ConflictChoice::Rename => {
                let previous = unused_suffixed(&path, RENAMED_MARKER, &sbhub_util::stamp());
                self.rename(&path, &previous)?;
                self.create_fresh(name)?;
                info!(previous = %previous.display(), "Renamed existing data aside");
                Ok(ConflictResolution::Renamed { previous, path })
            }
            ConflictChoice::Cancel => Ok(ConflictResolution::Cancelled),
        }
    }

    /// Create the directory for `name` and its parents. Idempotent.
    pub fn create_fresh(&self, name: &str) -> SandboxResult<PathBuf> {
        let path = self.resolve_path(name)?;
        fs::create_dir_all(&path).map_err(|e| SandboxError::storage(&path, e.to_string()))?;
        Ok(path)
    }

    /// Copy the live data of `name` to `<name>_snap_<tag>`, replacing any
    /// snapshot with the same tag.
    pub fn snapshot(&self, name: &str, tag: &str) -> SandboxResult<PathBuf> {
        names::validate_tag(tag)?;
        let source = self.resolve_path(name)?;
        if !source.is_dir() {
            return Err(SandboxError::DataNotFound(name.to_string()));
        }

        let target = self.snapshot_path(name, tag);
        if target.exists() {
            info!(tag = %tag, "Snapshot exists, overwriting");
            remove_tree(&target, self.sudo_fallback)?;
        }

        self.copy(&source, &target)?;
        info!(name = %name, tag = %tag, path = %target.display(), "Snapshot saved");
        Ok(target)
    }

    /// Replace the live data of `name` with a copy of a snapshot.
    ///
    /// The snapshot is looked up as a literal directory `<root>/<tag>`
    /// first, then as `<name>_snap_<tag>`. Existing live data is deleted.
    pub fn restore(&self, name: &str, tag: &str) -> SandboxResult<PathBuf> {
        names::validate_tag(tag)?;
        let live = self.resolve_path(name)?;

        let literal = self.root.join(tag);
        let source = [literal, self.snapshot_path(name, tag)]
            .into_iter()
            .find(|candidate| *candidate != live && candidate.is_dir())
            .ok_or_else(|| SandboxError::SnapshotNotFound {
                name: name.to_string(),
                tag: tag.to_string(),
            })?;

        if live.exists() {
            remove_tree(&live, self.sudo_fallback)?;
        }
        self.copy(&source, &live)?;
        info!(name = %name, from = %source.display(), "Restored snapshot");
        Ok(live)
    }

    /// Move the data of `name` to `<name>_janitor_<stamp>`.
    ///
    /// Returns `None` when there is nothing to archive.
    pub fn archive(&self, name: &str) -> SandboxResult<Option<PathBuf>> {
        let path = self.resolve_path(name)?;
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(name = %name, "No data to archive");
                return Ok(None);
            }
            Err(e) => return Err(SandboxError::storage(&path, e.to_string())),
        };
        if !meta.is_dir() {
            return Err(SandboxError::storage(&path, "not a directory"));
        }

        let target = unused_suffixed(&path, ARCHIVE_MARKER, &sbhub_util::stamp());
        self.rename(&path, &target)?;
        info!(name = %name, path = %target.display(), "Archived data");
        Ok(Some(target))
    }

    /// Delete the data of `name`. Idempotent.
    pub fn wipe(&self, name: &str) -> SandboxResult<()> {
        let path = self.resolve_path(name)?;
        remove_tree(&path, self.sudo_fallback)
    }

    /// Every directory under the root, sorted by name. A missing root is
    /// an empty listing.
    pub fn list_entries(&self) -> SandboxResult<Vec<StorageEntry>> {
        let read = match fs::read_dir(&self.root) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SandboxError::storage(&self.root, e.to_string())),
        };

        let mut entries = Vec::new();
        for entry in read {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            entries.push(StorageEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn snapshot_path(&self, name: &str, tag: &str) -> PathBuf {
        self.root.join(format!("{}{}{}", name, SNAPSHOT_MARKER, tag))
    }

    fn rename(&self, from: &Path, to: &Path) -> SandboxResult<()> {
        match fs::rename(from, to) {
            Err(e) if self.sudo_fallback && e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(path = %from.display(), "Permission denied, retrying rename with sudo");
                run_sudo(&[OsStr::new("mv"), from.as_os_str(), to.as_os_str()])
                    .map_err(|message| SandboxError::storage(from, message))
            }
            other => other.map_err(|e| SandboxError::storage(from, e.to_string())),
        }
    }

    fn copy(&self, from: &Path, to: &Path) -> SandboxResult<()> {
        match copy_tree(from, to) {
            Err(e) if self.sudo_fallback && e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(path = %from.display(), "Permission denied, retrying copy with sudo");
                remove_tree(to, true)?;
                run_sudo(&[OsStr::new("cp"), OsStr::new("-a"), from.as_os_str(), to.as_os_str()])
                    .map_err(|message| SandboxError::storage(from, message))
            }
            other => other.map_err(|e| SandboxError::storage(from, e.to_string())),
        }
    }
}

/// Recursively delete `path`; absent is success.
pub fn remove_tree(path: &Path, sudo_fallback: bool) -> SandboxResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if sudo_fallback && e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(path = %path.display(), "Permission denied, retrying delete with sudo");
            run_sudo(&[OsStr::new("rm"), OsStr::new("-rf"), path.as_os_str()])
                .map_err(|message| SandboxError::storage(path, message))
        }
        Err(e) => Err(SandboxError::storage(path, e.to_string())),
    }
}

fn suffixed(path: &Path, marker: &str, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(marker);
    name.push(suffix);
    PathBuf::from(name)
}

/// Like [`suffixed`], adding `-1`, `-2`, ... while the target exists.
/// Stamps have one-second resolution.
fn unused_suffixed(path: &Path, marker: &str, stamp: &str) -> PathBuf {
    let mut target = suffixed(path, marker, stamp);
    let mut counter = 1;
    while target.exists() {
        target = suffixed(path, marker, &format!("{}-{}", stamp, counter));
        counter += 1;
    }
    target
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> io::Result<()> {
    warn!(path = %from.display(), "Skipping symlink");
    Ok(())
}

fn run_sudo(args: &[&OsStr]) -> Result<(), String> {
    let output = Command::new("sudo")
        .arg("-n")
        .args(args)
        .output()
        .map_err(|e| format!("failed to run sudo: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, StorageManager) {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::new(dir.path(), false);
        (dir, storage)
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_path_rejects_traversal() {
        let (_dir, storage) = manager();
        assert!(storage.resolve_path("../etc").is_err());
        assert!(storage.resolve_path("a/b").is_err());
        assert_eq!(storage.resolve_path("web").unwrap(), storage.root().join("web"));
    }

    #[test]
    fn test_create_fresh_is_idempotent() {
        let (_dir, storage) = manager();
        let path = storage.create_fresh("web").unwrap();
        write(&path.join("keep.txt"), "x");
        storage.create_fresh("web").unwrap();
        assert!(path.join("keep.txt").exists());
        assert!(storage.detect_conflict("web").unwrap());
        assert!(!storage.detect_conflict("api").unwrap());
    }

    #[test]
    fn test_resolve_conflict_rename() {
        let (_dir, storage) = manager();
        let path = storage.create_fresh("web").unwrap();
        write(&path.join("old.txt"), "old");

        let resolution = storage.resolve_conflict("web", ConflictChoice::Rename).unwrap();
        let ConflictResolution::Renamed { previous, path } = resolution else {
            panic!("expected rename");
        };
        assert!(previous.join("old.txt").exists());
        assert!(previous
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("web_old_"));
        assert!(path.is_dir());
        assert_eq!(fs::read_dir(&path).unwrap().count(), 0);
    }

    #[test]
    fn test_resolve_conflict_attach_and_cancel_leave_data() {
        let (_dir, storage) = manager();
        let path = storage.create_fresh("web").unwrap();
        write(&path.join("a.txt"), "a");

        assert_eq!(
            storage.resolve_conflict("web", ConflictChoice::Cancel).unwrap(),
            ConflictResolution::Cancelled
        );
        assert_eq!(
            storage.resolve_conflict("web", ConflictChoice::Attach).unwrap(),
            ConflictResolution::Attached(path.clone())
        );
        assert_eq!(fs::read_to_string(path.join("a.txt")).unwrap(), "a");
        assert_eq!(storage.list_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let (_dir, storage) = manager();
        let live = storage.create_fresh("web").unwrap();
        write(&live.join("app/main.txt"), "v1");

        let snap = storage.snapshot("web", "v1").unwrap();
        assert_eq!(snap, storage.root().join("web_snap_v1"));

        write(&live.join("app/main.txt"), "v2");
        write(&live.join("extra.txt"), "junk");

        storage.restore("web", "v1").unwrap();
        assert_eq!(fs::read_to_string(live.join("app/main.txt")).unwrap(), "v1");
        assert!(!live.join("extra.txt").exists());
    }

    #[test]
    fn test_restore_after_delete() {
        let (_dir, storage) = manager();
        let live = storage.create_fresh("web").unwrap();
        write(&live.join("data.txt"), "saved");
        storage.snapshot("web", "base").unwrap();

        storage.wipe("web").unwrap();
        assert!(!live.exists());

        storage.restore("web", "base").unwrap();
        assert_eq!(fs::read_to_string(live.join("data.txt")).unwrap(), "saved");
    }

    #[test]
    fn test_restore_from_literal_directory() {
        let (_dir, storage) = manager();
        write(&storage.root().join("golden/seed.txt"), "seed");
        storage.restore("web", "golden").unwrap();
        assert_eq!(
            fs::read_to_string(storage.root().join("web/seed.txt")).unwrap(),
            "seed"
        );
    }

    #[test]
    fn test_snapshot_overwrites_same_tag() {
        let (_dir, storage) = manager();
        let live = storage.create_fresh("web").unwrap();
        write(&live.join("a.txt"), "a");
        storage.snapshot("web", "v1").unwrap();

        fs::remove_file(live.join("a.txt")).unwrap();
        write(&live.join("b.txt"), "b");
        let snap = storage.snapshot("web", "v1").unwrap();

        assert!(!snap.join("a.txt").exists());
        assert!(snap.join("b.txt").exists());
    }

    #[test]
    fn test_snapshot_missing_source() {
        let (_dir, storage) = manager();
        let err = storage.snapshot("ghost", "v1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_restore_missing_snapshot() {
        let (_dir, storage) = manager();
        storage.create_fresh("web").unwrap();
        let err = storage.restore("web", "nope").unwrap_err();
        assert!(matches!(err, SandboxError::SnapshotNotFound { .. }));
        assert!(storage.root().join("web").exists());
    }

    #[test]
    fn test_archive() {
        let (_dir, storage) = manager();
        let live = storage.create_fresh("web").unwrap();
        write(&live.join("a.txt"), "a");

        let archived = storage.archive("web").unwrap().unwrap();
        assert!(!live.exists());
        assert!(archived.join("a.txt").exists());
        assert!(archived
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("web_janitor_"));

        assert_eq!(storage.archive("web").unwrap(), None);
    }

    #[test]
    fn test_unused_suffixed_skips_taken_names() {
        let (_dir, storage) = manager();
        let path = storage.create_fresh("web").unwrap();
        let stamp = "20250101120000";

        let first = unused_suffixed(&path, ARCHIVE_MARKER, stamp);
        assert_eq!(first, storage.root().join("web_janitor_20250101120000"));
        fs::create_dir_all(&first).unwrap();

        let second = unused_suffixed(&path, ARCHIVE_MARKER, stamp);
        assert_eq!(second, storage.root().join("web_janitor_20250101120000-1"));
        fs::create_dir_all(&second).unwrap();

        assert_eq!(
            unused_suffixed(&path, ARCHIVE_MARKER, stamp),
            storage.root().join("web_janitor_20250101120000-2")
        );
    }

    #[test]
    fn test_archive_twice_keeps_both() {
        let (_dir, storage) = manager();
        storage.create_fresh("web").unwrap();
        let first = storage.archive("web").unwrap().unwrap();
        storage.create_fresh("web").unwrap();
        let second = storage.archive("web").unwrap().unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
        assert!(!storage.resolve_path("web").unwrap().exists());
    }

    #[test]
    fn test_archive_rejects_non_directory() {
        let (_dir, storage) = manager();
        write(&storage.root().join("web"), "not a dir");
        assert!(storage.archive("web").is_err());
    }

    #[test]
    fn test_wipe_is_idempotent() {
        let (_dir, storage) = manager();
        storage.create_fresh("web").unwrap();
        storage.wipe("web").unwrap();
        storage.wipe("web").unwrap();
        assert!(!storage.detect_conflict("web").unwrap());
    }

    #[test]
    fn test_list_entries_skips_files() {
        let (_dir, storage) = manager();
        storage.create_fresh("b").unwrap();
        storage.create_fresh("a").unwrap();
        write(&storage.root().join("notes.txt"), "x");
        fs::create_dir_all(storage.root().join("a_snap_v1")).unwrap();

        let entries = storage.list_entries().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a_snap_v1", "b"]);
        assert!(entries[1].is_snapshot());
    }

    #[test]
    fn test_list_entries_missing_root() {
        let storage = StorageManager::new("/nonexistent/sbhub-test-root", false);
        assert!(storage.list_entries().unwrap().is_empty());
    }
}
