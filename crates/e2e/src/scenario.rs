//! Executable steps and the programmatic scenario builder

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::assertion::Predicate;
use crate::locator::ElementRef;

fn default_url() -> String {
    "/".to_string()
}

/// A single declarative step. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Load a page, relative to the base URL unless absolute
    Visit {
        #[serde(default = "default_url")]
        url: String,
    },

    /// Perform an action on the target
    Action {
        target: ElementRef,
        action: ActionKind,
        /// Apply to every match instead of requiring exactly one
        #[serde(default)]
        each: bool,
    },

    /// Check a predicate, waiting for the page to settle first
    Assert {
        target: ElementRef,
        expect: Predicate,
    },

    /// Bind a name usable as `@name` by later steps
    Alias {
        name: String,
        target: ElementRef,
    },

    Log {
        message: String,
    },
}

impl Step {
    pub fn target(&self) -> Option<&ElementRef> {
        match self {
            Step::Action { target, .. } | Step::Assert { target, .. } | Step::Alias { target, .. } => {
                Some(target)
            }
            Step::Visit { .. } | Step::Log { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Step::Visit { url } => format!("visit {}", url),
            Step::Action {
                target,
                action,
                each,
            } => {
                let scope = if *each { " (each)" } else { "" };
                match action {
                    ActionKind::TypeText { text, .. } | ActionKind::DoubleClickThenType { text, .. } => {
                        format!("{} {:?} into {}{}", action.name(), text, target, scope)
                    }
                    _ => format!("{} {}{}", action.name(), target, scope),
                }
            }
            Step::Assert { target, expect } => format!("assert {} {}", target, expect),
            Step::Alias { name, target } => format!("alias @{} = {}", name, target),
            Step::Log { message } => format!("log {}", message),
        }
    }
}

/// A step plus the sub-chain it belongs to. `chain` is the path of repeat
/// iterations enclosing the step; empty at top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub step: Step,
    pub chain: Vec<usize>,
}

/// Flat, fully expanded step list ready to run
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub base_url: Option<String>,
    pub steps: Vec<PlannedStep>,
}

impl Scenario {
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds a [`Scenario`] in code
///
/// ```
/// use kanban_e2e::{ElementRef, Predicate, Scenario};
///
/// let scenario = Scenario::builder("two-tickets")
///     .visit("/")
///     .alias("add", ElementRef::test_id("add-ticket-button").eq(0))
///     .repeat(2, |b, i| {
///         b.click(ElementRef::alias("add")).assert(
///             ElementRef::test_id("column-counter").eq(0),
///             Predicate::TextEquals(format!("({})", i + 1)),
///         )
///     })
///     .build();
/// assert_eq!(scenario.len(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    base_url: Option<String>,
    steps: Vec<PlannedStep>,
    chain: Vec<usize>,
    next_chain: usize,
}

impl ScenarioBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            steps: Vec::new(),
            chain: Vec::new(),
            next_chain: 0,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.push(step);
        self
    }

    pub fn visit(self, url: impl Into<String>) -> Self {
        self.step(Step::Visit { url: url.into() })
    }

    pub fn action(self, target: ElementRef, action: ActionKind) -> Self {
        self.step(Step::Action {
            target,
            action,
            each: false,
        })
    }

    pub fn action_each(self, target: ElementRef, action: ActionKind) -> Self {
        self.step(Step::Action {
            target,
            action,
            each: true,
        })
    }

    pub fn click(self, target: ElementRef) -> Self {
        self.action(target, ActionKind::Click)
    }

    pub fn type_text(self, target: ElementRef, text: impl Into<String>, then_enter: bool) -> Self {
        self.action(
            target,
            ActionKind::TypeText {
                text: text.into(),
                then_enter,
            },
        )
    }

    pub fn assert(self, target: ElementRef, expect: Predicate) -> Self {
        self.step(Step::Assert { target, expect })
    }

    pub fn alias(self, name: impl Into<String>, target: ElementRef) -> Self {
        self.step(Step::Alias {
            name: name.into(),
            target,
        })
    }

    pub fn log(self, message: impl Into<String>) -> Self {
        self.step(Step::Log {
            message: message.into(),
        })
    }

    /// Run `body` `times` times, each iteration as its own sub-chain
    pub fn repeat(mut self, times: usize, mut body: impl FnMut(Self, usize) -> Self) -> Self {
        for i in 0..times {
            self.enter_chain();
            self = body(self, i);
            self.exit_chain();
        }
        self
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.steps.push(PlannedStep {
            step,
            chain: self.chain.clone(),
        });
    }

    pub(crate) fn enter_chain(&mut self) {
        self.chain.push(self.next_chain);
        self.next_chain += 1;
    }

    pub(crate) fn exit_chain(&mut self) {
        self.chain.pop();
    }

    pub(crate) fn set_base_url(&mut self, url: Option<String>) {
        self.base_url = url;
    }

    pub fn build(self) -> Scenario {
        Scenario {
            name: self.name,
            base_url: self.base_url,
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_gives_each_iteration_its_own_chain() {
        let scenario = Scenario::builder("chains")
            .visit("/")
            .repeat(2, |b, _| {
                b.click(ElementRef::test_id("add-ticket-button"))
                    .repeat(1, |b, _| b.log("inner"))
            })
            .log("done")
            .build();

        let chains: Vec<Vec<usize>> = scenario.steps.iter().map(|s| s.chain.clone()).collect();
        assert_eq!(
            chains,
            vec![vec![], vec![0], vec![0, 1], vec![2], vec![2, 3], vec![]]
        );
    }

    #[test]
    fn test_yaml_step_forms() {
        let yaml = r#"
- step: visit
- step: action
  target: 'testid=ticket:eq(0) >> testid=ticket-text'
  action: { type_text: { text: Buy milk, then_enter: true } }
- step: action
  target: testid=delete-ticket-button
  action: click
  each: true
- step: assert
  target: '@ticket'
  expect: { exists: false }
- step: assert
  target: 'testid=column-counter:eq(0)'
  expect: { text_equals: "(1)" }
- step: alias
  name: ticket
  target: testid=ticket
"#;
        let steps: Vec<Step> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(steps[0], Step::Visit { url: "/".into() });
        assert!(matches!(&steps[2], Step::Action { each: true, .. }));
        assert_eq!(
            steps[4].describe(),
            r#"assert testid=column-counter:eq(0) text == "(1)""#
        );
        assert_eq!(steps[5].target().unwrap().to_string(), "testid=ticket");
    }
}
