//! Bundled scenario specs, run end to end against the simulated board.
//! Run with: cargo test --package kanban-e2e --test scenarios

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use test_case::test_case;

use kanban_e2e::driver::sim::SimConfig;
use kanban_e2e::{
    Fixture, RunnerConfig, ScenarioRunner, ScenarioSpec, SimDriver, StepStatus, SuiteRunner,
};

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

fn fixture() -> Fixture {
    Fixture::load(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/data.json")).unwrap()
}

fn spec(name: &str) -> ScenarioSpec {
    ScenarioSpec::load_all(&specs_dir())
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap()
}

fn config() -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.base_url = "http://board.test".into();
    config.stability.timeout = Duration::from_millis(500);
    config.stability.initial_interval = Duration::from_millis(2);
    config.stability.max_interval = Duration::from_millis(20);
    config
}

#[test]
fn test_bundled_specs_plan() {
    let specs = ScenarioSpec::load_all(&specs_dir()).unwrap();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["drag-drop-rename", "search-filter", "ticket-lifecycle"]);

    let fixture = fixture();
    for spec in &specs {
        let scenario = spec.plan(&fixture).unwrap();
        assert!(!scenario.is_empty(), "{} planned no steps", spec.name);
    }

    // visit + three columns of sixteen steps
    assert_eq!(spec("ticket-lifecycle").plan(&fixture).unwrap().len(), 49);
}

#[test]
fn test_bundled_colors_are_computed_style_values() {
    // getComputedStyle reports colors as rgb(r, g, b), never as hex
    let fixture = fixture();
    assert!(fixture.background_color.iter().all(|c| c.starts_with("rgb(")));

    let columns = SimConfig::default().columns;
    let rendered: Vec<&str> = columns.iter().map(|c| c.background_color.as_str()).collect();
    assert_eq!(rendered, fixture.background_color);
}

#[test_case("ticket-lifecycle", 0 ; "lifecycle")]
#[test_case("ticket-lifecycle", 3 ; "lifecycle with render lag")]
#[test_case("search-filter", 0 ; "search")]
#[test_case("search-filter", 3 ; "search with render lag")]
#[test_case("drag-drop-rename", 0 ; "drag drop")]
#[test_case("drag-drop-rename", 3 ; "drag drop with render lag")]
#[tokio::test]
async fn test_bundled_spec_passes(name: &str, render_lag: u32) {
    let driver = SimDriver::new(SimConfig {
        render_lag,
        ..SimConfig::default()
    });
    let config = config();
    let runner = ScenarioRunner::new(&driver, &config).without_artifacts();

    let report = runner.run_spec(&spec(name), &fixture()).await.unwrap();

    let failed: Vec<String> = report
        .failures()
        .map(|s| format!("{}: {:?}", s.description, s.failure))
        .collect();
    assert!(report.passed(), "{} failed: {:#?}", name, failed);
    assert_eq!(report.count(StepStatus::Skipped), 0);
}

#[tokio::test]
async fn test_lifecycle_leaves_board_empty() {
    let driver = SimDriver::default();
    let config = config();
    ScenarioRunner::new(&driver, &config)
        .without_artifacts()
        .run_spec(&spec("ticket-lifecycle"), &fixture())
        .await
        .unwrap();
    assert!(driver.tickets().is_empty());
}

#[tokio::test]
async fn test_search_leaves_filled_tickets_newest_first() {
    let driver = SimDriver::default();
    let config = config();
    ScenarioRunner::new(&driver, &config)
        .without_artifacts()
        .run_spec(&spec("search-filter"), &fixture())
        .await
        .unwrap();

    let texts: Vec<(String, String)> = driver.tickets();
    assert_eq!(
        texts,
        vec![
            ("todo".to_string(), "Write report".to_string()),
            ("todo".to_string(), "Walk the dog".to_string()),
            ("todo".to_string(), "Buy milk".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_suite_runs_all_and_writes_results() {
    let out = tempfile::tempdir().unwrap();
    let mut config = config();
    config.specs_dir = specs_dir();
    config.output_dir = out.path().to_path_buf();
    config.artifact_dir = out.path().join("screenshots");

    let suite = SuiteRunner::with_driver(config, Arc::new(SimDriver::default()));
    let report = suite.run_all().await.unwrap();
    assert_eq!(report.total, 3);
    assert!(report.success(), "{:#?}", report.results);
    assert_eq!(report.exit_code(), 0);

    let path = suite.write_results(&report).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["passed"], 3);
    assert_eq!(written["results"][0]["status"], "passed");
}

#[tokio::test]
async fn test_suite_filters_by_tag_and_name() {
    let mut config = config();
    config.specs_dir = specs_dir();
    let suite = SuiteRunner::with_driver(config, Arc::new(SimDriver::default()));

    let tagged = suite.run_tagged("search").await.unwrap();
    assert_eq!(tagged.total, 1);
    assert_eq!(tagged.results[0].name, "search-filter");

    let named = suite.run_named("drag-drop-rename").await.unwrap();
    assert!(named.passed());

    assert!(suite.run_named("no-such-scenario").await.is_err());
}
