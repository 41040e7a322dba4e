//! Predicate evaluation over resolved elements

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::driver::{Driver, ElementHandle};
use crate::error::{E2eError, E2eResult};
use crate::locator::Presence;

const ABSENT: &str = "<absent>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    AttributeEquals { name: String, value: String },
    /// Computed CSS property, compared as an opaque string
    CssEquals { name: String, value: String },
    /// `textContent`, compared as an opaque string
    TextEquals(String),
    Exists(bool),
    Count(usize),
}

impl Predicate {
    /// Whether an empty resolution is a legitimate input for this predicate
    pub fn presence(&self) -> Presence {
        match self {
            Predicate::Exists(false) | Predicate::Count(0) => Presence::Optional,
            _ => Presence::Required,
        }
    }

    pub fn expected(&self) -> String {
        match self {
            Predicate::AttributeEquals { value, .. }
            | Predicate::CssEquals { value, .. }
            | Predicate::TextEquals(value) => format!("{:?}", value),
            Predicate::Exists(true) => "present".to_string(),
            Predicate::Exists(false) => "absent".to_string(),
            Predicate::Count(n) => format!("{} element(s)", n),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::AttributeEquals { name, value } => write!(f, "attribute {} == {:?}", name, value),
            Predicate::CssEquals { name, value } => write!(f, "css {} == {:?}", name, value),
            Predicate::TextEquals(value) => write!(f, "text == {:?}", value),
            Predicate::Exists(true) => f.write_str("exists"),
            Predicate::Exists(false) => f.write_str("does not exist"),
            Predicate::Count(n) => write!(f, "count == {}", n),
        }
    }
}

/// Expected vs actual for the first handle that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Index into the resolved handle set; `None` for set-level predicates
    pub handle_index: Option<usize>,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub handles: usize,
    pub mismatch: Option<Mismatch>,
}

impl AssertionResult {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Convert a failed result into an [`E2eError::AssertionMismatch`]
    pub fn into_result(self, selector: &str) -> E2eResult<()> {
        match self.mismatch {
            None => Ok(()),
            Some(m) => Err(E2eError::AssertionMismatch {
                selector: selector.to_string(),
                handle_index: m.handle_index.unwrap_or(0),
                expected: m.expected,
                actual: m.actual,
            }),
        }
    }
}

pub struct AssertionEvaluator<'a> {
    driver: &'a dyn Driver,
}

/// Per-element read behind a value predicate
#[derive(Clone, Copy)]
enum Probe<'p> {
    Attribute(&'p str),
    Css(&'p str),
    Text,
}

impl<'a> AssertionEvaluator<'a> {
    pub fn new(driver: &'a dyn Driver) -> Self {
        Self { driver }
    }

    /// Apply `predicate` to every handle; the set fails if any handle does
    pub async fn check(
        &self,
        handles: &[ElementHandle],
        predicate: &Predicate,
    ) -> E2eResult<AssertionResult> {
        let set_level = |ok: bool, actual: String| AssertionResult {
            handles: handles.len(),
            mismatch: (!ok).then(|| Mismatch {
                handle_index: None,
                expected: predicate.expected(),
                actual,
            }),
        };

        let (probe, expected) = match predicate {
            Predicate::Exists(expected) => {
                let present = !handles.is_empty();
                let actual = if present {
                    format!("{} element(s)", handles.len())
                } else {
                    "absent".to_string()
                };
                return Ok(set_level(present == *expected, actual));
            }
            Predicate::Count(n) => {
                return Ok(set_level(
                    handles.len() == *n,
                    format!("{} element(s)", handles.len()),
                ));
            }
            Predicate::AttributeEquals { name, value } => (Probe::Attribute(name), value),
            Predicate::CssEquals { name, value } => (Probe::Css(name), value),
            Predicate::TextEquals(value) => (Probe::Text, value),
        };

        for (index, handle) in handles.iter().enumerate() {
            let actual = match probe {
                Probe::Attribute(name) => self.driver.attribute(*handle, name).await?,
                Probe::Css(name) => self.driver.css_property(*handle, name).await?,
                Probe::Text => Some(self.driver.text(*handle).await?),
            };

            if actual.as_deref() != Some(expected.as_str()) {
                return Ok(AssertionResult {
                    handles: handles.len(),
                    mismatch: Some(Mismatch {
                        handle_index: Some(index),
                        expected: predicate.expected(),
                        actual: actual
                            .map(|a| format!("{:?}", a))
                            .unwrap_or_else(|| ABSENT.to_string()),
                    }),
                });
            }
        }

        Ok(AssertionResult {
            handles: handles.len(),
            mismatch: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimDriver;
    use crate::locator::Selector;

    async fn board() -> SimDriver {
        let driver = SimDriver::default();
        driver.navigate("/").await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_exists_false_boundary() {
        let driver = board().await;
        let evaluator = AssertionEvaluator::new(&driver);

        let none = evaluator.check(&[], &Predicate::Exists(false)).await.unwrap();
        assert!(none.passed());

        let counters = driver.query(None, &Selector::test_id("column-counter")).await.unwrap();
        let some = evaluator.check(&counters[..1], &Predicate::Exists(false)).await.unwrap();
        assert!(!some.passed());
        assert_eq!(some.mismatch.unwrap().actual, "1 element(s)");
    }

    #[tokio::test]
    async fn test_multi_handle_records_failing_index() {
        let driver = board().await;
        let counters = driver.query(None, &Selector::test_id("column-counter")).await.unwrap();
        let adds = driver.query(None, &Selector::test_id("add-ticket-button")).await.unwrap();
        driver.click(adds[1]).await.unwrap();

        let result = AssertionEvaluator::new(&driver)
            .check(&counters, &Predicate::TextEquals("(0)".into()))
            .await
            .unwrap();
        let mismatch = result.mismatch.unwrap();
        assert_eq!(mismatch.handle_index, Some(1));
        assert_eq!(mismatch.expected, r#""(0)""#);
        assert_eq!(mismatch.actual, r#""(1)""#);
    }

    #[tokio::test]
    async fn test_missing_attribute_reported_absent() {
        let driver = board().await;
        let counters = driver.query(None, &Selector::test_id("column-counter")).await.unwrap();
        let result = AssertionEvaluator::new(&driver)
            .check(
                &counters[..1],
                &Predicate::AttributeEquals {
                    name: "columnid".into(),
                    value: "todo".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.mismatch.unwrap().actual, ABSENT);
    }

    #[test]
    fn test_presence_policy() {
        assert_eq!(Predicate::Exists(false).presence(), Presence::Optional);
        assert_eq!(Predicate::Count(0).presence(), Presence::Optional);
        assert_eq!(Predicate::Count(2).presence(), Presence::Required);
        assert_eq!(Predicate::Exists(true).presence(), Presence::Required);
        assert_eq!(Predicate::TextEquals("(1)".into()).presence(), Presence::Required);
    }

    #[test]
    fn test_into_result_carries_diagnostics() {
        let result = AssertionResult {
            handles: 2,
            mismatch: Some(Mismatch {
                handle_index: Some(1),
                expected: r#""(2)""#.into(),
                actual: r#""(1)""#.into(),
            }),
        };
        let err = result.into_result("@counter").unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Assertion failed on @counter[1]: expected "(2)", got "(1)""#
        );
    }
}
