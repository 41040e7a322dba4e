//! Validate Command

use anyhow::Result;
use clap::Args;
use comfy_table::Color;
use serde::Serialize;

use kanban_e2e::{RunnerConfig, SuiteRunner};

use crate::output::{is_human, print_error, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Validate only scenarios matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Validate only a specific scenario by name
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct ValidationRow {
    pub name: String,
    pub valid: bool,
    pub steps: Option<usize>,
    pub error: Option<String>,
}

impl TableDisplay for ValidationRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Valid", "Planned Steps", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.valid { "yes" } else { "no" }.to_string(),
            self.steps.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            self.error.clone().unwrap_or_default(),
        ]
    }

    fn colors(&self) -> Vec<Option<Color>> {
        vec![None, Some(if self.valid { Color::Green } else { Color::Red })]
    }
}

/// Plan every selected spec against its fixture; exit code 1 if any fails
pub fn execute(args: ValidateArgs, config: RunnerConfig, format: OutputFormat) -> Result<i32> {
    let specs = super::select_specs(&config, args.tag.as_deref(), args.name.as_deref())?;

    let rows: Vec<ValidationRow> = SuiteRunner::validate(&config, &specs)
        .into_iter()
        .map(|v| match v.result {
            Ok(steps) => ValidationRow {
                name: v.name,
                valid: true,
                steps: Some(steps),
                error: None,
            },
            Err(e) => ValidationRow {
                name: v.name,
                valid: false,
                steps: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    print_list(&rows, format);

    let invalid = rows.iter().filter(|r| !r.valid).count();
    if is_human(format) {
        if invalid == 0 {
            print_success(&format!("{} scenario(s) valid", rows.len()));
        } else {
            print_error(&format!("{} of {} scenario(s) invalid", invalid, rows.len()));
        }
    }
    Ok(if invalid == 0 { 0 } else { 1 })
}
