//! Duration logging for engine operations.
//!
//! A [`TimingGuard`] logs how long an operation took when it is dropped.
//! Each [`Operation`] has its own "slow" bound: a sweep taking a minute is
//! worth a warning, an image build taking a minute is not.
//!
//! ```rust,ignore
//! let _timing = TimingGuard::pull(image);
//! backend.pull_image(image).await?;
//! // logged here
//! ```

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Kinds of timed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pull,
    Build,
    Create,
    Sweep,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Build => "build",
            Self::Create => "create",
            Self::Sweep => "sweep",
        }
    }

    /// Above this an operation is logged as a warning.
    pub fn slow_after(&self) -> Duration {
        match self {
            Self::Pull => Duration::from_secs(60),
            Self::Build => Duration::from_secs(5 * 60),
            Self::Create => Duration::from_secs(15),
            Self::Sweep => Duration::from_secs(30),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Below this an operation is only logged at debug level.
const QUIET_BELOW: Duration = Duration::from_secs(1);

/// Logs the elapsed time of an operation when dropped.
pub struct TimingGuard {
    operation: Operation,
    target: String,
    start: Instant,
}

impl TimingGuard {
    pub fn new(operation: Operation, target: impl Into<String>) -> Self {
        let target = target.into();
        debug!(operation = %operation, target = %target, "Starting operation");
        Self {
            operation,
            target,
            start: Instant::now(),
        }
    }

    pub fn pull(image: impl Into<String>) -> Self {
        Self::new(Operation::Pull, image)
    }

    pub fn build(tag: impl Into<String>) -> Self {
        Self::new(Operation::Build, tag)
    }

    pub fn sweep() -> Self {
        Self::new(Operation::Sweep, "expired")
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Milliseconds below a second, whole seconds above, e.g. `350ms` or `1m 2s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < QUIET_BELOW {
        format!("{}ms", elapsed.as_millis())
    } else {
        humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let took = format_elapsed(elapsed);
        let elapsed_ms = elapsed.as_millis() as u64;

        if elapsed >= self.operation.slow_after() {
            warn!(
                operation = %self.operation,
                target = %self.target,
                elapsed_ms,
                took = %took,
                "Slow operation completed"
            );
        } else if elapsed >= QUIET_BELOW {
            info!(
                operation = %self.operation,
                target = %self.target,
                elapsed_ms,
                took = %took,
                "Operation completed"
            );
        } else {
            debug!(
                operation = %self.operation,
                target = %self.target,
                elapsed_ms,
                "Operation completed"
            );
        }
    }
}

/// Time a block and evaluate to its value.
///
/// ```rust,ignore
/// let id = time_operation!(Operation::Create, name.clone(), {
///     registry.create(&name, ttl, size, spec).await?
/// });
/// ```
#[macro_export]
macro_rules! time_operation {
    ($operation:expr, $target:expr, $block:expr) => {{
        let _timing = $crate::timing::TimingGuard::new($operation, $target);
        $block
    }};
}
