//! Settings for the async mirror

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time `close()` waits for queued backing-store work
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Async mirror settings
///
/// Deserializes from a partial document; missing fields keep their defaults.
///
/// ```
/// use mirrordir::MirrorConfig;
/// use std::time::Duration;
///
/// let config = MirrorConfig::default().with_drain_timeout(Duration::from_secs(5));
/// assert_eq!(config.drain_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// How long `close()` waits for the queue to drain, in milliseconds
    pub drain_timeout_ms: u64,
    /// Name of the background worker; derived from the backing store if unset
    pub worker_name: Option<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: u64::try_from(DEFAULT_DRAIN_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            worker_name: None,
        }
    }
}

impl MirrorConfig {
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    pub(crate) fn worker_name_for(&self, backing: &str) -> String {
        self.worker_name
            .clone()
            .unwrap_or_else(|| format!("AsyncMirror[{backing}]"))
    }
}
