//! Sandbox metadata carried as container labels.
//!
//! Labels are the only persistent record of a sandbox besides its data
//! directory. Parsing is tolerant: a missing or malformed `expires` label
//! means the sandbox never expires.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Namespace shared by every sbhub label.
pub const LABEL_PREFIX: &str = "com.sbhub.";
/// Marks containers and networks owned by sbhub.
pub const MANAGED_LABEL: &str = "com.sbhub.managed";
/// Absolute expiry instant, RFC 3339.
pub const EXPIRES_LABEL: &str = "com.sbhub.expires";
/// Size tier the sandbox was created with.
pub const SIZE_LABEL: &str = "com.sbhub.size";
/// Published host port, when networked.
pub const HOST_PORT_LABEL: &str = "com.sbhub.hostport";

/// Typed view of the sbhub labels on a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxLabels {
    pub managed: bool,
    pub expires: Option<DateTime<Utc>>,
    pub size: Option<String>,
    pub host_port: Option<u16>,
}

impl SandboxLabels {
    /// Labels for a sandbox created at `now` that lives for `ttl`.
    pub fn new(now: DateTime<Utc>, ttl: Duration, size: impl Into<String>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            managed: true,
            expires: now.checked_add_signed(ttl),
            size: Some(size.into()),
            host_port: None,
        }
    }

    /// Set the published host port.
    pub fn with_host_port(mut self, port: Option<u16>) -> Self {
        self.host_port = port;
        self
    }

    /// Read the sbhub labels out of a container's label map.
    pub fn parse(labels: &HashMap<String, String>) -> Self {
        Self {
            managed: labels.get(MANAGED_LABEL).is_some_and(|v| v == "true"),
            expires: labels.get(EXPIRES_LABEL).and_then(|v| parse_expiry(v)),
            size: labels.get(SIZE_LABEL).filter(|v| !v.is_empty()).cloned(),
            host_port: labels.get(HOST_PORT_LABEL).and_then(|v| v.parse().ok()),
        }
    }

    /// Write these labels into `labels`, replacing any previous sbhub values.
    pub fn apply(&self, labels: &mut HashMap<String, String>) {
        labels.retain(|key, _| !key.starts_with(LABEL_PREFIX));
        labels.insert(MANAGED_LABEL.to_string(), self.managed.to_string());
        if let Some(expires) = self.expires {
            labels.insert(
                EXPIRES_LABEL.to_string(),
                expires.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        if let Some(size) = &self.size {
            labels.insert(SIZE_LABEL.to_string(), size.clone());
        }
        if let Some(port) = self.host_port {
            labels.insert(HOST_PORT_LABEL.to_string(), port.to_string());
        }
    }

    /// Managed and past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.managed && self.expires.is_some_and(|expires| expires < now)
    }

    /// Time left before expiry; zero once expired, `None` if non-expiring.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires
            .map(|expires| (expires - now).to_std().unwrap_or(Duration::ZERO))
    }
}

fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
