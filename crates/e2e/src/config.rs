//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::sim::SimConfig;
use crate::error::{E2eError, E2eResult};

pub const DEFAULT_BASE_URL: &str = "https://kanban-board-two.vercel.app";

/// Top-level configuration, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// URL every scenario navigates against
    pub base_url: String,

    /// Directory scanned for `*.yaml` / `*.yml` scenario specs
    pub specs_dir: PathBuf,

    /// Fixture used for every scenario, overriding each spec's own
    pub fixture: Option<PathBuf>,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Where failure screenshots land
    pub artifact_dir: PathBuf,

    /// Bound on each driver call of an action
    #[serde(with = "millis")]
    pub action_timeout: Duration,

    /// Poll the base URL before launching the browser
    pub preflight: bool,

    #[serde(with = "millis")]
    pub preflight_timeout: Duration,

    pub stability: StabilityConfig,

    pub driver: DriverConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            specs_dir: PathBuf::from("crates/e2e/specs"),
            fixture: None,
            output_dir: PathBuf::from("test-results"),
            artifact_dir: PathBuf::from("test-results/screenshots"),
            action_timeout: Duration::from_secs(10),
            preflight: true,
            preflight_timeout: Duration::from_secs(30),
            stability: StabilityConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_toml(toml: &str) -> E2eResult<Self> {
        toml::from_str(toml).map_err(E2eError::from)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| E2eError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }
}

/// Bounded retry with exponential backoff before each assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    #[serde(with = "millis")]
    pub timeout: Duration,

    #[serde(with = "millis")]
    pub initial_interval: Duration,

    pub multiplier: f64,

    #[serde(with = "millis")]
    pub max_interval: Duration,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(4000),
            initial_interval: Duration::from_millis(50),
            multiplier: 2.0,
            max_interval: Duration::from_millis(500),
        }
    }
}

impl StabilityConfig {
    /// Delay before poll attempt `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let millis = (self.initial_interval.as_millis() as f64 * factor).round();
        let cap = self.max_interval.as_millis() as f64;
        Duration::from_millis(millis.min(cap) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    #[default]
    Chrome,
    Sim,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub kind: DriverKind,

    /// Run in headless mode
    pub headless: bool,

    pub window_width: u32,

    pub window_height: u32,

    /// Attach to a running Chrome instead of launching one
    pub remote_debugging_port: Option<u16>,

    /// Needed when running as root inside containers
    pub no_sandbox: bool,

    /// Seconds the browser may sit idle before headless_chrome drops it
    pub idle_timeout_secs: u64,

    pub sim: SimConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            kind: DriverKind::Chrome,
            headless: true,
            window_width: 1280,
            window_height: 720,
            remote_debugging_port: None,
            no_sandbox: false,
            idle_timeout_secs: 120,
            sim: SimConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.stability.timeout, Duration::from_secs(4));
        assert_eq!(config.driver.kind, DriverKind::Chrome);
        assert!(config.driver.headless);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RunnerConfig::from_toml(
            r#"
base_url = "http://127.0.0.1:3000"
action_timeout = 2500

[stability]
timeout = 1000

[driver]
kind = "sim"

[driver.sim]
render_lag = 3
columns = [
  { id = "todo", title = "To do", background_color = "rgb(255, 255, 255)" },
]
"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://127.0.0.1:3000");
        assert_eq!(config.action_timeout, Duration::from_millis(2500));
        assert_eq!(config.stability.timeout, Duration::from_millis(1000));
        assert_eq!(config.stability.initial_interval, Duration::from_millis(50));
        assert_eq!(config.driver.kind, DriverKind::Sim);
        assert_eq!(config.driver.sim.render_lag, 3);
        assert_eq!(config.driver.sim.columns.len(), 1);
        assert_eq!(config.output_dir, PathBuf::from("test-results"));
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let stability = StabilityConfig::default();
        assert_eq!(stability.backoff(0), Duration::from_millis(50));
        assert_eq!(stability.backoff(1), Duration::from_millis(100));
        assert_eq!(stability.backoff(3), Duration::from_millis(400));
        assert_eq!(stability.backoff(4), Duration::from_millis(500));
        assert_eq!(stability.backoff(30), Duration::from_millis(500));
    }
}
