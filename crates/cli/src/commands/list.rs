//! List Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use kanban_e2e::{RunnerConfig, ScenarioSpec};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Show only scenarios matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

/// Scenario spec display wrapper for serialization
#[derive(Serialize)]
pub struct SpecDisplay {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub fixture: Option<String>,
    pub source: Option<String>,
}

impl From<&ScenarioSpec> for SpecDisplay {
    fn from(spec: &ScenarioSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            tags: spec.tags.clone(),
            fixture: spec.fixture_path().map(|p| p.display().to_string()),
            source: spec.source.as_ref().map(|p| p.display().to_string()),
        }
    }
}

impl TableDisplay for SpecDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Tags", "Description", "Source"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tags.join(", "),
            self.description.clone(),
            self.source.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

pub fn execute(args: ListArgs, config: RunnerConfig, format: OutputFormat) -> Result<()> {
    let specs = super::select_specs(&config, args.tag.as_deref(), None)?;
    let displays: Vec<SpecDisplay> = specs.iter().map(SpecDisplay::from).collect();
    print_list(&displays, format);
    Ok(())
}
