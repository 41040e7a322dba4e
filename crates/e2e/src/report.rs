//! Scenario and suite reports

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult, FailureKind};

/// Lifecycle of one step: `Pending -> Running -> {Passed, Failed}`, or
/// `Pending -> Skipped` when it never runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn advance(self, next: StepStatus) -> E2eResult<StepStatus> {
        use StepStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Skipped) | (Running, Passed) | (Running, Failed) => {
                Ok(next)
            }
            _ => Err(E2eError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            }),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl From<&E2eError> for StepFailure {
    fn from(err: &E2eError) -> Self {
        let (handle_index, expected, actual) = match err {
            E2eError::AssertionMismatch {
                handle_index,
                expected,
                actual,
                ..
            } => (Some(*handle_index), Some(expected.clone()), Some(actual.clone())),
            _ => (None, None, None),
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            handle_index,
            expected,
            actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub description: String,
    /// Rendered locator the step used, if it targets elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    /// Resolve/evaluate rounds spent waiting for stability
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Aborted between steps with no failure recorded
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
    /// Failure that prevented the scenario from starting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl ScenarioReport {
    pub fn new(name: impl Into<String>, steps: Vec<StepResult>, duration_ms: u64) -> Self {
        let status = if steps.iter().all(StepResult::passed) {
            ScenarioStatus::Passed
        } else if steps.iter().any(|s| s.status == StepStatus::Failed) {
            ScenarioStatus::Failed
        } else {
            ScenarioStatus::Cancelled
        };
        Self {
            name: name.into(),
            status,
            steps,
            duration_ms,
            error: None,
            screenshot: None,
        }
    }

    /// A scenario that failed before any step ran
    pub fn aborted(name: impl Into<String>, err: &E2eError) -> Self {
        Self {
            name: name.into(),
            status: ScenarioStatus::Failed,
            steps: Vec::new(),
            duration_ms: 0,
            error: Some(StepFailure::from(err)),
            screenshot: None,
        }
    }

    /// True iff every step passed
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn new(started_at: DateTime<Utc>, results: Vec<ScenarioReport>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        let skipped = results
            .iter()
            .filter(|r| r.status == ScenarioStatus::Cancelled)
            .count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.passed == self.total
    }

    /// Process exit status: zero only when every scenario passed
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn step(index: usize, status: StepStatus) -> StepResult {
        StepResult {
            index,
            description: format!("step {}", index),
            selector: None,
            status,
            failure: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    #[test_case(StepStatus::Pending, StepStatus::Running, true)]
    #[test_case(StepStatus::Pending, StepStatus::Skipped, true)]
    #[test_case(StepStatus::Running, StepStatus::Passed, true)]
    #[test_case(StepStatus::Running, StepStatus::Failed, true)]
    #[test_case(StepStatus::Pending, StepStatus::Passed, false)]
    #[test_case(StepStatus::Passed, StepStatus::Failed, false)]
    #[test_case(StepStatus::Skipped, StepStatus::Running, false)]
    fn test_transitions(from: StepStatus, to: StepStatus, allowed: bool) {
        assert_eq!(from.advance(to).is_ok(), allowed);
    }

    #[test_case(&[StepStatus::Passed, StepStatus::Passed], ScenarioStatus::Passed)]
    #[test_case(&[StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped], ScenarioStatus::Failed)]
    #[test_case(&[StepStatus::Passed, StepStatus::Skipped], ScenarioStatus::Cancelled)]
    #[test_case(&[], ScenarioStatus::Passed)]
    fn test_scenario_status(statuses: &[StepStatus], expected: ScenarioStatus) {
        let steps = statuses.iter().enumerate().map(|(i, s)| step(i, *s)).collect();
        let report = ScenarioReport::new("s", steps, 0);
        assert_eq!(report.status, expected);
        assert_eq!(report.passed(), statuses.iter().all(|s| *s == StepStatus::Passed));
    }

    #[test]
    fn test_suite_counts_and_exit_code() {
        let ok = ScenarioReport::new("a", vec![step(0, StepStatus::Passed)], 1);
        let bad = ScenarioReport::new("b", vec![step(0, StepStatus::Failed)], 1);
        let aborted = ScenarioReport::aborted("c", &E2eError::FixtureMalformed("x".into()));

        let suite = SuiteReport::new(Utc::now(), vec![ok.clone()], 1);
        assert_eq!(suite.exit_code(), 0);

        let suite = SuiteReport::new(Utc::now(), vec![ok, bad, aborted], 3);
        assert_eq!((suite.total, suite.passed, suite.failed, suite.skipped), (3, 1, 2, 0));
        assert_eq!(suite.exit_code(), 1);
    }
}
