//! Error types for sandbox operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Malformed or missing user input
    #[error("{0}")]
    InvalidInput(String),

    /// Sandbox name that cannot be used as a container name or storage path
    #[error("invalid sandbox name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// No container with this name exists
    #[error("sandbox '{0}' not found")]
    ContainerNotFound(String),

    /// No storage directory for this sandbox
    #[error("no data found for '{0}'")]
    DataNotFound(String),

    /// Snapshot not found
    #[error("snapshot '{tag}' not found for '{name}'")]
    SnapshotNotFound { name: String, tag: String },

    /// The sandbox exists but is not running
    #[error("sandbox '{0}' is not running")]
    NotRunning(String),

    /// A container with this name already exists
    #[error("sandbox '{0}' already exists")]
    AlreadyExists(String),

    /// Failed to connect to the container engine
    #[error("failed to connect to Docker daemon: {0}")]
    ConnectionFailed(String),

    /// Failed to pull container image
    #[error("failed to pull image '{image}': {message}")]
    ImagePullFailed { image: String, message: String },

    /// Failed to build container image
    #[error("failed to build image '{tag}': {message}")]
    BuildFailed { tag: String, message: String },

    /// Failed to create container
    #[error("failed to create container: {0}")]
    CreateFailed(String),

    /// Container was created but did not start; it is left in place
    #[error("container {id} was created but failed to start: {message}")]
    StartFailed { id: String, message: String },

    /// Any other engine error
    #[error("container engine error: {0}")]
    Backend(String),

    /// Every host port in the configured range is taken
    #[error("no free host port in {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    /// Pull or build exceeded its time bound
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Part of the operation succeeded and part failed
    #[error("partial failure: {0}")]
    PartialFailure(String),

    /// Filesystem operation on sandbox storage failed
    #[error("storage error at '{path}': {message}")]
    Storage { path: PathBuf, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Unreadable project file during import
    #[error("failed to parse '{path}': {message}")]
    ProjectFile { path: PathBuf, message: String },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`SandboxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any engine call was made
    InvalidInput,
    /// Sandbox, container, data or snapshot absent
    NotFound,
    /// Name collision with an existing container
    AlreadyExists,
    /// Container engine unreachable
    BackendUnavailable,
    /// Some steps succeeded, others failed
    PartialFailure,
    /// Pull or build exceeded its bound
    Timeout,
    /// Other engine failure
    Backend,
    /// Filesystem or serialization failure
    Io,
}

impl SandboxError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an image pull failed error
    pub fn image_pull_failed(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImagePullFailed {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a storage error
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidName { .. }
            | Self::ConfigError(_)
            | Self::ProjectFile { .. }
            | Self::NotRunning(_) => ErrorKind::InvalidInput,
            Self::ContainerNotFound(_) | Self::DataNotFound(_) | Self::SnapshotNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::ConnectionFailed(_) => ErrorKind::BackendUnavailable,
            Self::PartialFailure(_) => ErrorKind::PartialFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ImagePullFailed { .. }
            | Self::BuildFailed { .. }
            | Self::CreateFailed(_)
            | Self::StartFailed { .. }
            | Self::NoFreePort { .. }
            | Self::Backend(_) => ErrorKind::Backend,
            Self::Storage { .. } | Self::Io(_) | Self::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Check if this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as DockerError;

        match err {
            DockerError::DockerResponseServerError {
                status_code: 404,
                message,
            } => Self::ContainerNotFound(message),
            DockerError::DockerResponseServerError {
                status_code: 409,
                message,
            } => Self::AlreadyExists(message),
            DockerError::SocketNotFoundError(path) => {
                Self::connection_failed(format!("socket not found: {}", path))
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            SandboxError::invalid_input("bad size").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            SandboxError::ContainerNotFound("web".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SandboxError::connection_failed("refused").kind(),
            ErrorKind::BackendUnavailable
        );
        assert!(SandboxError::timeout("pull alpine", Duration::from_secs(120)).is_timeout());
    }

    #[test]
    fn test_docker_status_mapping() {
        let err: SandboxError = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: web".into(),
        }
        .into();
        assert!(err.is_not_found());

        let err: SandboxError = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "Conflict".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err: SandboxError = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn test_display() {
        let err = SandboxError::SnapshotNotFound {
            name: "web".into(),
            tag: "v1".into(),
        };
        assert_eq!(err.to_string(), "snapshot 'v1' not found for 'web'");
    }
}
