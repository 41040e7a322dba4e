//! Scenario runner: executes planned steps in order against a [`Driver`]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::{ActionContext, ActionExecutor, ActionKind};
use crate::assertion::{AssertionEvaluator, Predicate};
use crate::config::{RunnerConfig, StabilityConfig};
use crate::driver::Driver;
use crate::error::{E2eError, E2eResult};
use crate::fixture::Fixture;
use crate::locator::{AliasTable, ElementRef, LocatorResolver, Presence};
use crate::report::{ScenarioReport, StepFailure, StepResult, StepStatus};
use crate::scenario::{Scenario, Step};
use crate::spec::ScenarioSpec;

/// Runs one scenario at a time. Steps execute strictly in order; a hard
/// failure skips the rest of the sub-chain it happened in, a mismatch does not.
pub struct ScenarioRunner<'a> {
    driver: &'a dyn Driver,
    base_url: String,
    stability: StabilityConfig,
    action_timeout: Duration,
    artifact_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(driver: &'a dyn Driver, config: &RunnerConfig) -> Self {
        Self {
            driver,
            base_url: config.base_url.clone(),
            stability: config.stability.clone(),
            action_timeout: config.action_timeout,
            artifact_dir: Some(config.artifact_dir.clone()),
            cancel: CancellationToken::new(),
        }
    }

    /// Checked between steps; once tripped, remaining steps are skipped
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Disable failure screenshots
    pub fn without_artifacts(mut self) -> Self {
        self.artifact_dir = None;
        self
    }

    /// Plan `spec` against `fixture` and run it. Planning failures abort the
    /// scenario before any step executes.
    pub async fn run_spec(&self, spec: &ScenarioSpec, fixture: &Fixture) -> E2eResult<ScenarioReport> {
        match spec.plan(fixture) {
            Ok(scenario) => self.run(&scenario).await,
            Err(e) => {
                error!("✗ {} - {}", spec.name, e);
                Ok(ScenarioReport::aborted(&spec.name, &e))
            }
        }
    }

    /// Execute every step and report each one. Only internal invariant
    /// violations surface as `Err`; step failures land in the report.
    pub async fn run(&self, scenario: &Scenario) -> E2eResult<ScenarioReport> {
        let start = Instant::now();
        let base_url = scenario.base_url.as_deref().unwrap_or(&self.base_url);
        info!("Running scenario: {} ({} steps)", scenario.name, scenario.len());

        let mut aliases = AliasTable::new();
        let mut ctx = ActionContext::new();
        let mut aborted: Vec<&[usize]> = Vec::new();
        let mut screenshot = None;
        let mut results = Vec::with_capacity(scenario.len());

        for (index, planned) in scenario.steps.iter().enumerate() {
            let mut result = StepResult {
                index,
                description: planned.step.describe(),
                selector: planned.step.target().map(ToString::to_string),
                status: StepStatus::Pending,
                failure: None,
                attempts: 0,
                duration_ms: 0,
            };

            let cancelled = self.cancel.is_cancelled();
            if cancelled || aborted.iter().any(|chain| planned.chain.starts_with(chain)) {
                if cancelled {
                    debug!("Step {} skipped: scenario cancelled", index);
                } else {
                    debug!("Step {} skipped: sub-chain aborted", index);
                }
                result.status = result.status.advance(StepStatus::Skipped)?;
                results.push(result);
                continue;
            }

            result.status = result.status.advance(StepStatus::Running)?;
            let step_start = Instant::now();
            let (outcome, attempts) = self
                .execute(&planned.step, base_url, &mut aliases, &mut ctx)
                .await;
            result.attempts = attempts;
            result.duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    debug!("✓ step {}: {}", index, result.description);
                    result.status = result.status.advance(StepStatus::Passed)?;
                }
                Err(e) => {
                    warn!("✗ step {}: {} - {}", index, result.description, e);
                    if e.kind().is_hard() {
                        aborted.push(&planned.chain);
                    }
                    if screenshot.is_none() {
                        screenshot = self.capture_failure(&scenario.name, index).await;
                    }
                    result.failure = Some(StepFailure::from(&e));
                    result.status = result.status.advance(StepStatus::Failed)?;
                }
            }
            results.push(result);
        }

        let mut report = ScenarioReport::new(&scenario.name, results, start.elapsed().as_millis() as u64);
        report.screenshot = screenshot;

        if report.passed() {
            info!("✓ {} ({} ms)", report.name, report.duration_ms);
        } else {
            error!(
                "✗ {} - {} failed, {} skipped",
                report.name,
                report.count(StepStatus::Failed),
                report.count(StepStatus::Skipped)
            );
        }
        Ok(report)
    }

    /// Run one step, returning its outcome and the number of evaluation rounds
    async fn execute(
        &self,
        step: &Step,
        base_url: &str,
        aliases: &mut AliasTable,
        ctx: &mut ActionContext,
    ) -> (E2eResult<()>, u32) {
        match step {
            Step::Visit { url } => {
                let full = join_url(base_url, url);
                info!("Visiting {}", full);
                let outcome = match timeout(self.action_timeout, self.driver.navigate(&full)).await {
                    Ok(result) => result,
                    Err(_) => Err(E2eError::Timeout {
                        what: format!("navigation to {}", full),
                        after_ms: self.action_timeout.as_millis() as u64,
                    }),
                };
                (outcome, 1)
            }
            Step::Alias { name, target } => {
                debug!("Alias @{} = {}", name, target);
                (aliases.bind(name.clone(), target), 0)
            }
            Step::Log { message } => {
                info!("{}", message);
                (Ok(()), 0)
            }
            Step::Action { target, action, each } => {
                (self.act(target, action, *each, aliases, ctx).await, 1)
            }
            Step::Assert { target, expect } => self.wait_for_stability(target, expect, aliases).await,
        }
    }

    /// Actions resolve once, with no stability wait
    async fn act(
        &self,
        target: &ElementRef,
        action: &ActionKind,
        each: bool,
        aliases: &AliasTable,
        ctx: &mut ActionContext,
    ) -> E2eResult<()> {
        let selector = target.to_string();
        let handles = LocatorResolver::new(self.driver)
            .resolve(target, aliases, Presence::Required)
            .await?;

        if !each && handles.len() > 1 {
            return Err(E2eError::interaction(
                selector,
                format!(
                    "{} {} elements; narrow it with :eq(N) or set `each`",
                    action.name(),
                    handles.len()
                ),
            ));
        }

        let executor = ActionExecutor::new(self.driver, self.action_timeout);
        for handle in handles {
            executor.perform(handle, &selector, action, ctx).await?;
        }
        Ok(())
    }

    /// Re-resolve and re-evaluate with exponential backoff until the
    /// predicate holds or the stability timeout elapses. At the deadline the
    /// last outcome is reported as-is.
    async fn wait_for_stability(
        &self,
        target: &ElementRef,
        predicate: &Predicate,
        aliases: &AliasTable,
    ) -> (E2eResult<()>, u32) {
        let deadline = Instant::now() + self.stability.timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let outcome = match timeout(self.action_timeout, self.evaluate(target, predicate, aliases)).await {
                Ok(result) => result,
                Err(_) => Err(E2eError::Timeout {
                    what: format!("{} to evaluate {}", target, predicate),
                    after_ms: self.action_timeout.as_millis() as u64,
                }),
            };

            let err = match outcome {
                Ok(()) => return (Ok(()), attempt),
                Err(e) if !settling(&e) => return (Err(e), attempt),
                Err(e) => e,
            };

            let now = Instant::now();
            if now >= deadline {
                let err = match err {
                    E2eError::InteractionFailed { .. } => E2eError::Timeout {
                        what: format!("{} to settle ({})", target, err),
                        after_ms: self.stability.timeout.as_millis() as u64,
                    },
                    other => other,
                };
                return (Err(err), attempt);
            }

            let delay = self.stability.backoff(attempt - 1).min(deadline - now);
            debug!("Attempt {} on {}: {}; retrying in {:?}", attempt, target, err, delay);
            sleep(delay).await;
        }
    }

    async fn evaluate(&self, target: &ElementRef, predicate: &Predicate, aliases: &AliasTable) -> E2eResult<()> {
        let handles = LocatorResolver::new(self.driver)
            .resolve(target, aliases, predicate.presence())
            .await?;
        AssertionEvaluator::new(self.driver)
            .check(&handles, predicate)
            .await?
            .into_result(&target.to_string())
    }

    /// Save a screenshot for the first failure. Capture errors only log.
    async fn capture_failure(&self, scenario: &str, index: usize) -> Option<String> {
        let dir = self.artifact_dir.as_deref()?;
        match self.driver.screenshot().await {
            Ok(Some(png)) => match save_screenshot(dir, scenario, index, &png) {
                Ok(path) => {
                    info!("Failure screenshot: {}", path.display());
                    Some(path.to_string_lossy().to_string())
                }
                Err(e) => {
                    warn!("Could not save screenshot: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Screenshot capture failed: {}", e);
                None
            }
        }
    }
}

/// Failures that may clear up once the page settles
fn settling(err: &E2eError) -> bool {
    matches!(
        err,
        E2eError::NotFound { .. } | E2eError::AssertionMismatch { .. } | E2eError::InteractionFailed { .. }
    )
}

fn join_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
}

fn save_screenshot(dir: &Path, scenario: &str, index: usize, png: &[u8]) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let hash = hex::encode(Sha256::digest(png));
    let stem: String = scenario
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let path = dir.join(format!("{}-step{}-{}.png", stem, index, &hash[..12]));
    std::fs::write(&path, png)?;
    Ok(path)
}
