//! Size tiers and their resource defaults.

use crate::error::{SandboxError, SandboxResult};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Image used by every built-in tier unless overridden at create time.
pub const DEFAULT_IMAGE: &str = "alpine:latest";

const HOUR: u64 = 60 * 60;

/// Resource and TTL defaults for one size tier.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    /// CPU allotment in cores (fractional allowed)
    pub cpu_cores: f64,
    /// Memory limit in MiB
    pub memory_mb: u64,
    /// Nominal disk allotment in GiB
    pub disk_gb: u64,
    /// Default image
    pub image: &'static str,
    /// Default time-to-live
    pub default_ttl: Duration,
}

impl SandboxSpec {
    /// CPU limit in nano-CPUs, as the Docker API expects.
    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_cores * 1_000_000_000.0) as i64
    }

    /// Memory limit in bytes.
    pub fn memory_bytes(&self) -> i64 {
        (self.memory_mb * 1024 * 1024) as i64
    }
}

/// A named size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeTier {
    Small,
    Medium,
    Large,
    XLarge,
}

impl SizeTier {
    /// All tiers, smallest first.
    pub const ALL: [SizeTier; 4] = [Self::Small, Self::Medium, Self::Large, Self::XLarge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::XLarge => "xlarge",
        }
    }

    /// Catalog entry for this tier.
    pub fn spec(&self) -> SandboxSpec {
        match self {
            Self::Small => SandboxSpec {
                cpu_cores: 0.5,
                memory_mb: 512,
                disk_gb: 10,
                image: DEFAULT_IMAGE,
                default_ttl: Duration::from_secs(6 * HOUR),
            },
            Self::Medium => SandboxSpec {
                cpu_cores: 2.0,
                memory_mb: 4096,
                disk_gb: 20,
                image: DEFAULT_IMAGE,
                default_ttl: Duration::from_secs(4 * HOUR),
            },
            Self::Large => SandboxSpec {
                cpu_cores: 4.0,
                memory_mb: 8192,
                disk_gb: 40,
                image: DEFAULT_IMAGE,
                default_ttl: Duration::from_secs(2 * HOUR),
            },
            Self::XLarge => SandboxSpec {
                cpu_cores: 8.0,
                memory_mb: 16384,
                disk_gb: 80,
                image: DEFAULT_IMAGE,
                default_ttl: Duration::from_secs(HOUR),
            },
        }
    }
}

impl fmt::Display for SizeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeTier {
    type Err = SandboxError;

    fn from_str(s: &str) -> SandboxResult<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| {
                SandboxError::invalid_input(format!(
                    "'{}' is not a valid size. Use small, medium, large, or xlarge.",
                    s
                ))
            })
    }
}

/// Look up the catalog entry for a tier name.
pub fn lookup(size: &str) -> SandboxResult<(SizeTier, SandboxSpec)> {
    let tier: SizeTier = size.parse()?;
    Ok((tier, tier.spec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tier_is_valid() {
        for tier in SizeTier::ALL {
            let spec = tier.spec();
            assert!(spec.cpu_cores > 0.0, "{tier} cpu");
            assert!(spec.memory_mb > 0, "{tier} memory");
            assert!(spec.disk_gb > 0, "{tier} disk");
            assert!(!spec.image.is_empty(), "{tier} image");
            assert!(spec.default_ttl > Duration::ZERO, "{tier} ttl");
        }
    }

    #[test]
    fn test_resources_increase_and_ttl_decreases() {
        for pair in SizeTier::ALL.windows(2) {
            let (lo, hi) = (pair[0].spec(), pair[1].spec());
            assert!(lo.cpu_cores < hi.cpu_cores);
            assert!(lo.memory_mb < hi.memory_mb);
            assert!(lo.disk_gb < hi.disk_gb);
            assert!(lo.default_ttl > hi.default_ttl);
        }
    }

    #[test]
    fn test_lookup() {
        let (tier, spec) = lookup("large").unwrap();
        assert_eq!(tier, SizeTier::Large);
        assert_eq!(spec.memory_mb, 8192);
        assert_eq!(spec.default_ttl, Duration::from_secs(2 * HOUR));
    }

    #[test]
    fn test_unknown_size_is_invalid_input() {
        let err = lookup("huge").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("huge"));
    }

    #[test]
    fn test_limits_conversion() {
        let spec = SizeTier::Small.spec();
        assert_eq!(spec.nano_cpus(), 500_000_000);
        assert_eq!(spec.memory_bytes(), 512 * 1024 * 1024);
    }
}
