//! CLI Commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use kanban_e2e::{DriverKind, RunnerConfig, ScenarioSpec};

pub mod list;
pub mod run;
pub mod validate;

/// Browser backend
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DriverArg {
    /// Headless Chrome over the DevTools protocol
    Chrome,
    /// In-process simulated board
    Sim,
}

impl From<DriverArg> for DriverKind {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Chrome => DriverKind::Chrome,
            DriverArg::Sim => DriverKind::Sim,
        }
    }
}

/// Settings shared by every command. Flags win over the config file.
#[derive(Debug, Args)]
pub struct RunnerArgs {
    /// Runner configuration file (TOML)
    #[arg(short, long, env = "KANBAN_E2E_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the board under test
    #[arg(long, env = "KANBAN_E2E_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Path to scenario specs directory
    #[arg(short, long, env = "KANBAN_E2E_SPECS", global = true)]
    pub specs: Option<PathBuf>,

    /// Fixture file used for every scenario
    #[arg(long, env = "KANBAN_E2E_FIXTURE", global = true)]
    pub fixture: Option<PathBuf>,

    /// Output directory for results and screenshots
    #[arg(short, long, env = "KANBAN_E2E_OUTPUT", global = true)]
    pub output: Option<PathBuf>,

    /// Browser backend
    #[arg(long, env = "KANBAN_E2E_DRIVER", global = true)]
    pub driver: Option<DriverArg>,

    /// Show the browser window
    #[arg(long, global = true)]
    pub headed: bool,

    /// Attach to a Chrome already listening on this debugging port
    #[arg(long, env = "KANBAN_E2E_REMOTE_DEBUGGING_PORT", global = true)]
    pub remote_debugging_port: Option<u16>,

    /// Launch Chrome without its sandbox (containers running as root)
    #[arg(long, global = true)]
    pub no_sandbox: bool,

    /// Skip the reachability check before launching the browser
    #[arg(long, global = true)]
    pub no_preflight: bool,

    /// Wait-for-stability timeout in milliseconds
    #[arg(long, env = "KANBAN_E2E_STABILITY_TIMEOUT_MS", global = true)]
    pub stability_timeout_ms: Option<u64>,
}

impl RunnerArgs {
    /// Load the config file (if any) and apply flag overrides on top
    pub fn load(&self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RunnerConfig::default(),
        };

        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(specs) = &self.specs {
            config.specs_dir = specs.clone();
        }
        if let Some(fixture) = &self.fixture {
            config.fixture = Some(fixture.clone());
        }
        if let Some(output) = &self.output {
            config.artifact_dir = output.join("screenshots");
            config.output_dir = output.clone();
        }
        if let Some(driver) = self.driver {
            config.driver.kind = driver.into();
        }
        if self.headed {
            config.driver.headless = false;
        }
        if let Some(port) = self.remote_debugging_port {
            config.driver.remote_debugging_port = Some(port);
        }
        if self.no_sandbox {
            config.driver.no_sandbox = true;
        }
        if self.no_preflight {
            config.preflight = false;
        }
        if let Some(ms) = self.stability_timeout_ms {
            config.stability.timeout = std::time::Duration::from_millis(ms);
        }
        Ok(config)
    }
}

/// Load specs and keep those matching `tag` and `name`
pub fn select_specs(
    config: &RunnerConfig,
    tag: Option<&str>,
    name: Option<&str>,
) -> Result<Vec<ScenarioSpec>> {
    let specs = ScenarioSpec::load_all(&config.specs_dir)
        .with_context(|| format!("Failed to load specs from {}", config.specs_dir.display()))?;

    let selected: Vec<ScenarioSpec> = specs
        .into_iter()
        .filter(|s| tag.map_or(true, |t| s.tags.iter().any(|x| x == t)))
        .filter(|s| name.map_or(true, |n| s.name == n))
        .collect();

    if let Some(name) = name {
        if selected.is_empty() {
            anyhow::bail!("Scenario not found: {}", name);
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        runner: RunnerArgs,
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::parse_from([
            "kanban-e2e",
            "--driver",
            "sim",
            "--base-url",
            "http://localhost:3000",
            "--output",
            "out",
            "--no-preflight",
            "--stability-timeout-ms",
            "250",
        ]);
        let config = cli.runner.load().unwrap();

        assert_eq!(config.driver.kind, DriverKind::Sim);
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.artifact_dir, PathBuf::from("out/screenshots"));
        assert!(!config.preflight);
        assert_eq!(config.stability.timeout.as_millis(), 250);
        assert!(config.driver.headless);
    }

    #[test]
    fn test_select_specs_by_name() {
        let mut config = RunnerConfig::default();
        config.specs_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../e2e/specs");

        let specs = select_specs(&config, None, Some("search-filter")).unwrap();
        assert_eq!(specs.len(), 1);
        assert!(select_specs(&config, None, Some("missing")).is_err());
        assert_eq!(select_specs(&config, Some("tickets"), None).unwrap().len(), 3);
    }
}
