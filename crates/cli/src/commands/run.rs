//! Run Command

use anyhow::Result;
use clap::Args;
use comfy_table::Color;
use serde::Serialize;
use tracing::warn;

use kanban_e2e::{RunnerConfig, ScenarioReport, ScenarioStatus, StepStatus, SuiteReport, SuiteRunner};

use crate::output::{
    is_human, print_error, print_info, print_item, print_list, print_success, print_warning, OutputFormat,
    TableDisplay,
};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Run only scenarios matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    pub name: Option<String>,
}

/// One row per scenario
#[derive(Serialize)]
pub struct ScenarioRow {
    pub name: String,
    pub status: ScenarioStatus,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl From<&ScenarioReport> for ScenarioRow {
    fn from(report: &ScenarioReport) -> Self {
        Self {
            name: report.name.clone(),
            status: report.status,
            passed: report.count(StepStatus::Passed),
            failed: report.count(StepStatus::Failed),
            skipped: report.count(StepStatus::Skipped),
            duration_ms: report.duration_ms,
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Status", "Passed", "Failed", "Skipped", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::Cancelled => "cancelled",
        };
        vec![
            self.name.clone(),
            status.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.skipped.to_string(),
            format!("{} ms", self.duration_ms),
        ]
    }

    fn colors(&self) -> Vec<Option<Color>> {
        let status = match self.status {
            ScenarioStatus::Passed => Color::Green,
            ScenarioStatus::Failed => Color::Red,
            ScenarioStatus::Cancelled => Color::Yellow,
        };
        vec![None, Some(status)]
    }
}

/// Suite totals
#[derive(Serialize)]
pub struct SummaryRow {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl TableDisplay for SummaryRow {
    fn headers() -> Vec<&'static str> {
        vec!["Total", "Passed", "Failed", "Skipped", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.total.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.skipped.to_string(),
            format!("{} ms", self.duration_ms),
        ]
    }
}

/// Run the selected scenarios and return the process exit code
pub async fn execute(args: RunArgs, config: RunnerConfig, format: OutputFormat) -> Result<i32> {
    let specs = super::select_specs(&config, args.tag.as_deref(), args.name.as_deref())?;

    let suite = SuiteRunner::connect(config).await?;

    let cancel = suite.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; remaining steps will be skipped");
            cancel.cancel();
        }
    });

    let report = suite.run_specs(&specs).await?;
    let path = suite.write_results(&report)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Table | OutputFormat::Plain => print_human(&report, format),
    }

    if is_human(format) {
        print_info(&format!("Results written to {}", path.display()));
    }
    Ok(report.exit_code())
}

fn print_human(report: &SuiteReport, format: OutputFormat) {
    let rows: Vec<ScenarioRow> = report.results.iter().map(ScenarioRow::from).collect();
    print_list(&rows, format);

    for scenario in &report.results {
        if let Some(err) = &scenario.error {
            print_error(&format!("{}: {}", scenario.name, err.message));
        }
        for step in scenario.failures() {
            let message = step
                .failure
                .as_ref()
                .map(|f| f.message.as_str())
                .unwrap_or("failed");
            print_error(&format!(
                "{} step {} ({}): {}",
                scenario.name, step.index, step.description, message
            ));
        }
        if let Some(shot) = &scenario.screenshot {
            print_info(&format!("{}: screenshot {}", scenario.name, shot));
        }
    }

    print_item(
        &SummaryRow {
            total: report.total,
            passed: report.passed,
            failed: report.failed,
            skipped: report.skipped,
            duration_ms: report.duration_ms,
        },
        format,
    );

    if report.success() {
        print_success(&format!("All {} scenario(s) passed", report.total));
    } else if report.skipped > 0 && report.failed == 0 {
        print_warning(&format!("{} scenario(s) cancelled", report.skipped));
    } else {
        print_error(&format!("{} of {} scenario(s) failed", report.failed, report.total));
    }
}
