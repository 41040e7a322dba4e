//! Kanban E2E Scenario Engine
//!
//! This crate drives a kanban board through declarative scenarios:
//! - Resolves symbolic element references (`testid=`, CSS, `@alias`, `:eq(N)`)
//! - Performs clicks, typing and HTML5 drag/drop through a pluggable driver
//! - Waits for the page to settle before every assertion
//! - Expands YAML specs against a JSON fixture and reports per-step results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Kanban E2E Runner (Rust)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteRunner                                                │
//! │    ├── connect(config) -> Driver (Chrome | Sim)             │
//! │    ├── run_spec(spec) -> ScenarioReport                     │
//! │    └── write_results(report) -> test-results.json           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── LocatorResolver   ElementRef -> [ElementHandle]      │
//! │    ├── ActionExecutor    click / type / drag / drop         │
//! │    └── AssertionEvaluator  predicate over every handle      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML) + Fixture (JSON)                       │
//! │    ├── steps: visit | action | assert | alias | log         │
//! │    └── repeat { over: field | times: N, steps }             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod assertion;
pub mod config;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod locator;
pub mod preflight;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod spec;
pub mod suite;

pub use action::{ActionContext, ActionExecutor, ActionKind, TransferArena, TransferToken};
pub use assertion::{AssertionEvaluator, Predicate};
pub use config::{DriverConfig, DriverKind, RunnerConfig, StabilityConfig};
pub use driver::{ChromeDriver, Driver, ElementHandle, SimDriver};
pub use error::{E2eError, E2eResult, FailureKind};
pub use fixture::Fixture;
pub use locator::{AliasTable, ElementRef, LocatorResolver, Presence, Selector};
pub use report::{ScenarioReport, ScenarioStatus, StepResult, StepStatus, SuiteReport};
pub use runner::ScenarioRunner;
pub use scenario::{PlannedStep, Scenario, ScenarioBuilder, Step};
pub use spec::ScenarioSpec;
pub use suite::SuiteRunner;
