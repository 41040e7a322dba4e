//! Suite runner: loads specs, prepares the driver, runs scenarios in order

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{DriverKind, RunnerConfig};
use crate::driver::{ChromeDriver, Driver, SimDriver};
use crate::error::{E2eError, E2eResult};
use crate::fixture::Fixture;
use crate::preflight::wait_for_reachable;
use crate::report::{ScenarioReport, SuiteReport};
use crate::runner::ScenarioRunner;
use crate::spec::ScenarioSpec;

/// Outcome of planning one spec without running it
#[derive(Debug)]
pub struct Validation {
    pub name: String,
    pub result: E2eResult<usize>,
}

/// Main E2E suite runner
pub struct SuiteRunner {
    config: RunnerConfig,
    driver: Arc<dyn Driver>,
    cancel: CancellationToken,
}

impl SuiteRunner {
    /// Plan every spec against its fixture without touching the browser
    pub fn validate(config: &RunnerConfig, specs: &[ScenarioSpec]) -> Vec<Validation> {
        specs
            .iter()
            .map(|spec| Validation {
                name: spec.name.clone(),
                result: fixture_for(config, spec)
                    .and_then(|fixture| spec.plan(&fixture))
                    .map(|scenario| scenario.len()),
            })
            .collect()
    }

    /// Build the driver the configuration asks for. Chrome runs are preceded
    /// by a reachability check when `preflight` is set.
    pub async fn connect(config: RunnerConfig) -> E2eResult<Self> {
        let driver: Arc<dyn Driver> = match config.driver.kind {
            DriverKind::Sim => {
                info!("Using simulated board");
                Arc::new(SimDriver::new(config.driver.sim.clone()))
            }
            DriverKind::Chrome => {
                if config.preflight {
                    wait_for_reachable(&config.base_url, config.preflight_timeout).await?;
                }
                let driver_config = config.driver.clone();
                let call_timeout = config.action_timeout;
                let chrome = tokio::task::spawn_blocking(move || {
                    ChromeDriver::launch(&driver_config).map(|d| d.with_call_timeout(call_timeout))
                })
                .await
                .map_err(|e| E2eError::Browser(format!("Browser launch task failed: {}", e)))??;
                Arc::new(chrome)
            }
        };
        Ok(Self::with_driver(config, driver))
    }

    /// Use an already constructed driver
    pub fn with_driver(config: RunnerConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            config,
            driver,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the suite between steps when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn load_specs(&self) -> E2eResult<Vec<ScenarioSpec>> {
        ScenarioSpec::load_all(&self.config.specs_dir)
    }

    /// Run all scenarios in the specs directory
    pub async fn run_all(&self) -> E2eResult<SuiteReport> {
        let specs = self.load_specs()?;
        self.run_specs(&specs).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteReport> {
        let specs = self.load_specs()?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<ScenarioReport> {
        let specs = self.load_specs()?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;
        self.run_spec(&spec).await
    }

    /// Run a list of scenario specs. Cancellation skips the scenarios that
    /// have not started.
    pub async fn run_specs(&self, specs: &[ScenarioSpec]) -> E2eResult<SuiteReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(specs.len());

        info!("Running {} scenario(s)...", specs.len());

        for spec in specs {
            results.push(self.run_spec(spec).await?);
        }

        let report = SuiteReport::new(started_at, results, start.elapsed().as_millis() as u64);

        info!("");
        info!(
            "Scenario Results: {} passed, {} failed, {} skipped ({} ms)",
            report.passed, report.failed, report.skipped, report.duration_ms
        );
        Ok(report)
    }

    /// Run a single scenario spec with its fixture
    pub async fn run_spec(&self, spec: &ScenarioSpec) -> E2eResult<ScenarioReport> {
        debug!("Running scenario: {}", spec.name);

        let fixture = match fixture_for(&self.config, spec) {
            Ok(fixture) => fixture,
            Err(e) => {
                error!("✗ {} - {}", spec.name, e);
                return Ok(ScenarioReport::aborted(&spec.name, &e));
            }
        };

        ScenarioRunner::new(self.driver.as_ref(), &self.config)
            .with_cancellation(self.cancel.clone())
            .run_spec(spec, &fixture)
            .await
    }

    /// Write suite results to a JSON file
    pub fn write_results(&self, results: &SuiteReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// The configured override, else the spec's own fixture, else empty
fn fixture_for(config: &RunnerConfig, spec: &ScenarioSpec) -> E2eResult<Fixture> {
    match config.fixture.clone().or_else(|| spec.fixture_path()) {
        Some(path) => Fixture::load(&path),
        None => Ok(Fixture::default()),
    }
}
