//! Engine configuration, assembled by the CLI before any browser work.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Network-idle detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleConfig {
    /// How long the network must stay quiet before the page counts as idle.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// Upper bound on the whole idle wait.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// If no trackable request is seen within this delay, the page is
    /// treated as static and the wait resolves early.
    #[serde(default = "default_static_fallback_ms")]
    pub static_fallback_ms: u64,
    /// Treat an idle-wait timeout as a fatal audit error instead of a
    /// soft warning.
    #[serde(default)]
    pub fail_on_timeout: bool,
}

fn default_quiet_period_ms() -> u64 {
    2_000
}

fn default_max_wait_ms() -> u64 {
    10_000
}

fn default_static_fallback_ms() -> u64 {
    1_000
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            max_wait_ms: default_max_wait_ms(),
            static_fallback_ms: default_static_fallback_ms(),
            fail_on_timeout: false,
        }
    }
}

impl IdleConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn static_fallback(&self) -> Duration {
        Duration::from_millis(self.static_fallback_ms)
    }
}

/// Batch-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Wall-clock budget for one site's full pipeline run.
    #[serde(default = "default_site_timeout_secs")]
    pub site_timeout_secs: u64,
    /// Extra settle delay after the idle wait, before sampling.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Directory screenshots are written to. Created only when the
    /// screenshot check is enabled.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default)]
    pub idle: IdleConfig,
}

fn default_site_timeout_secs() -> u64 {
    60
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            site_timeout_secs: default_site_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            screenshot_dir: default_screenshot_dir(),
            idle: IdleConfig::default(),
        }
    }
}

impl AuditConfig {
    pub fn site_timeout(&self) -> Duration {
        Duration::from_secs(self.site_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.site_timeout(), Duration::from_secs(60));
        assert_eq!(config.idle.quiet_period(), Duration::from_secs(2));
        assert!(!config.idle.fail_on_timeout);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: AuditConfig =
            serde_json::from_str(r#"{"siteTimeoutSecs": 30, "idle": {"maxWaitMs": 5000}}"#)
                .unwrap();
        assert_eq!(config.site_timeout(), Duration::from_secs(30));
        assert_eq!(config.idle.max_wait(), Duration::from_millis(5000));
        assert_eq!(config.idle.quiet_period_ms, 2_000);
    }
}
