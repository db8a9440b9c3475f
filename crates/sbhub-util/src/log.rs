//! Logging setup using tracing.
//!
//! Interactive commands log to stderr so operator-facing output on stdout
//! stays clean. The janitor can log to a file in the platform log directory
//! instead, since it is usually left running unattended.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// `--verbose` raises the default level to debug.
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Self::Debug
        } else {
            Self::Info
        }
    }

    /// Build the default filter directive for the sbhub crates at this level.
    pub fn directive(&self) -> String {
        format!("sb={0},sbhub_sandbox={0},sbhub_util={0}", self.as_str())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level for the sbhub crates. `RUST_LOG` takes precedence.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
    /// Write to a log file under [`get_log_dir`] instead of stderr.
    pub to_file: bool,
}

/// Initialize logging with the given configuration.
///
/// This should be called once at application startup. Returns the log file
/// path when logging to a file.
pub fn init(config: LogConfig) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.directive()));

    let target = if config.to_file { open_log_file() } else { None };

    match target {
        Some((path, file)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(file)
                .init();
            Some(path)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

/// Open `sbhub.log` for appending, warning on stderr if that is not possible.
fn open_log_file() -> Option<(PathBuf, std::fs::File)> {
    let log_dir = get_log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {e}");
        return None;
    }

    let log_file = log_dir.join("sbhub.log");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(file) => Some((log_file, file)),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            None
        }
    }
}

/// Get the log directory path.
pub fn get_log_dir() -> PathBuf {
    // macOS: ~/Library/Logs/sbhub
    // Linux: ~/.local/state/sbhub/logs

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library/Logs/sbhub");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(state_dir) = dirs::state_dir() {
            return state_dir.join("sbhub/logs");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".local/state/sbhub/logs");
        }
    }

    if let Some(local_app) = dirs::data_local_dir() {
        return local_app.join("sbhub/logs");
    }

    // Fallback
    PathBuf::from(".sbhub/logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_verbose() {
        assert_eq!(LogLevel::from_verbose(true), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbose(false), LogLevel::Info);
    }

    #[test]
    fn test_log_level_directive() {
        assert_eq!(
            LogLevel::Debug.directive(),
            "sb=debug,sbhub_sandbox=debug,sbhub_util=debug"
        );
    }

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(!config.to_file);
        assert_eq!(config.level, LogLevel::Info);
    }

    #[test]
    fn test_log_dir_is_namespaced() {
        assert!(get_log_dir().to_string_lossy().contains("sbhub"));
    }
}
