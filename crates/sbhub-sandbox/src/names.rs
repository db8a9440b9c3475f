//! Sandbox name rules and generated names.

use crate::error::{SandboxError, SandboxResult};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

/// Infix marking a snapshot directory: `<name>_snap_<tag>`.
pub const SNAPSHOT_MARKER: &str = "_snap_";
/// Infix marking conflict data renamed aside: `<name>_old_<stamp>`.
pub const RENAMED_MARKER: &str = "_old_";
/// Infix marking janitor-archived data: `<name>_janitor_<stamp>`.
pub const ARCHIVE_MARKER: &str = "_janitor_";

const ADJECTIVES: &[&str] = &["swift", "brave", "cool", "mighty", "keen"];
const NOUNS: &[&str] = &["whale", "ship", "anchor", "pilot", "wave"];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"))
}

/// Check that `name` is usable both as a container name and as a single
/// path component under the storage root.
pub fn validate_name(name: &str) -> SandboxResult<()> {
    if name.is_empty() {
        return Err(SandboxError::invalid_input("a sandbox name is required"));
    }
    if name.contains("..") {
        return Err(SandboxError::invalid_name(name, "must not contain '..'"));
    }
    if !name_pattern().is_match(name) {
        return Err(SandboxError::invalid_name(
            name,
            "use letters, digits, '_', '.' or '-', starting with a letter or digit",
        ));
    }
    Ok(())
}

/// Validate a name that will back a live container or its data mount.
/// Snapshot names are reserved for saved data.
pub fn validate_sandbox_name(name: &str) -> SandboxResult<()> {
    validate_name(name)?;
    if is_snapshot(name) {
        return Err(SandboxError::invalid_name(
            name,
            format!("'{}' is reserved for snapshots", SNAPSHOT_MARKER),
        ));
    }
    Ok(())
}

/// Validate a snapshot tag; tags become part of a directory name.
pub fn validate_tag(tag: &str) -> SandboxResult<()> {
    validate_name(tag).map_err(|_| {
        SandboxError::invalid_input(format!(
            "invalid snapshot tag '{}': use letters, digits, '_', '.' or '-'",
            tag
        ))
    })
}

/// Whether this directory name is a snapshot rather than live data.
pub fn is_snapshot(name: &str) -> bool {
    name.contains(SNAPSHOT_MARKER)
}

/// Generate a readable name such as `brave-whale-417`.
pub fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("swift");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("whale");
    format!("{}-{}-{}", adjective, noun, rng.gen_range(0..1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["web", "api-1", "my_box.dev", "A9"] {
            assert!(validate_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_traversal_and_separators() {
        for name in ["", "..", "../etc", "a/b", "a\\b", "-lead", ".hidden", "a..b", "sp ace"] {
            let err = validate_name(name).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidInput, "{name}");
        }
    }

    #[test]
    fn test_snapshot_names_reserved() {
        assert!(validate_name("web_snap_v1").is_ok());
        let err = validate_sandbox_name("web_snap_v1").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("reserved"));
        assert!(validate_sandbox_name("web_old_20250101000000").is_ok());
    }

    #[test]
    fn test_random_name_format() {
        let pattern = Regex::new(r"^[a-z]+-[a-z]+-\d{1,3}$").unwrap();
        for _ in 0..20 {
            let name = random_name();
            assert!(pattern.is_match(&name), "{name}");
            assert!(validate_name(&name).is_ok());
        }
    }

    #[test]
    fn test_is_snapshot() {
        assert!(is_snapshot("web_snap_v1"));
        assert!(!is_snapshot("web"));
        assert!(!is_snapshot("web_old_20250101000000"));
    }
}
