//! Declarative YAML scenario specifications
//!
//! A spec is a list of steps (see [`Step`]) plus `repeat` blocks. String
//! fields may carry placeholders that planning fills from the fixture:
//!
//! | placeholder      | value                                               |
//! |------------------|-----------------------------------------------------|
//! | `${index}`       | zero-based iteration of the innermost `repeat`      |
//! | `${ordinal}`     | `${index}` + 1                                      |
//! | `${field}`       | `field[index]` for the innermost `repeat`           |
//! | `${field[N]}`    | `field[N]`, anywhere                                |
//!
//! Planning expands everything up front, so a fixture too short for the
//! iterations that use it fails before any step runs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{E2eError, E2eResult};
use crate::fixture::{Fixture, FIELDS};
use crate::scenario::{Scenario, ScenarioBuilder, Step};

/// A complete scenario specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Fixture file, relative to the spec file
    #[serde(default)]
    pub fixture: Option<PathBuf>,

    /// Base URL override for this scenario
    #[serde(default)]
    pub url: Option<String>,

    /// Step templates, expanded by [`ScenarioSpec::plan`]
    pub steps: Vec<Value>,

    /// File the spec was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct Iteration {
    index: usize,
    count: usize,
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\[\s*(\d+)\s*\])?\s*\}")
            .expect("placeholder pattern is valid")
    })
}

impl ScenarioSpec {
    /// Parse a scenario spec from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| E2eError::SpecParse(e.to_string()))
    }

    /// Parse a scenario spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut spec = Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))?;
        spec.source = Some(path.to_path_buf());
        Ok(spec)
    }

    /// Load all scenario specs from a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// The fixture path, resolved against the spec file's directory
    pub fn fixture_path(&self) -> Option<PathBuf> {
        let fixture = self.fixture.as_ref()?;
        if fixture.is_absolute() {
            return Some(fixture.clone());
        }
        let base = self
            .source
            .as_ref()
            .and_then(|s| s.parent())
            .unwrap_or_else(|| Path::new("."));
        Some(base.join(fixture))
    }

    /// Expand repeats and placeholders into a runnable [`Scenario`]
    pub fn plan(&self, fixture: &Fixture) -> E2eResult<Scenario> {
        let mut builder = ScenarioBuilder::new(self.name.clone());
        builder.set_base_url(self.url.clone());
        let mut frames = Vec::new();
        self.expand(&self.steps, fixture, &mut frames, &mut builder, "steps")?;
        Ok(builder.build())
    }

    fn expand(
        &self,
        templates: &[Value],
        fixture: &Fixture,
        frames: &mut Vec<Iteration>,
        builder: &mut ScenarioBuilder,
        path: &str,
    ) -> E2eResult<()> {
        for (pos, template) in templates.iter().enumerate() {
            let here = format!("{}[{}]", path, pos);
            let parse_err = |msg: String| E2eError::SpecParse(format!("{}: {}: {}", self.name, here, msg));

            if template.get("step").and_then(Value::as_str) != Some("repeat") {
                let filled = substitute(template, fixture, frames.last().copied())?;
                let step: Step = serde_yaml::from_value(filled).map_err(|e| parse_err(e.to_string()))?;
                builder.push(step);
                continue;
            }

            let over = template.get("over").and_then(Value::as_str);
            let times = template.get("times").and_then(Value::as_u64);
            let count = match (over, times) {
                (Some(field), None) => fixture
                    .field(field)
                    .ok_or_else(|| parse_err(format!("repeat over unknown fixture field '{}'", field)))?
                    .len(),
                (None, Some(n)) => n as usize,
                _ => return Err(parse_err("repeat needs exactly one of `over` or `times`".into())),
            };
            let body = template
                .get("steps")
                .and_then(Value::as_sequence)
                .ok_or_else(|| parse_err("repeat needs a `steps` list".into()))?;

            for index in 0..count {
                builder.enter_chain();
                frames.push(Iteration { index, count });
                self.expand(body, fixture, frames, builder, &format!("{}.steps", here))?;
                frames.pop();
                builder.exit_chain();
            }
        }
        Ok(())
    }
}

fn substitute(value: &Value, fixture: &Fixture, frame: Option<Iteration>) -> E2eResult<Value> {
    Ok(match value {
        Value::String(s) => Value::String(fill(s, fixture, frame)?),
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|v| substitute(v, fixture, frame))
                .collect::<E2eResult<_>>()?,
        ),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, fixture, frame)?);
            }
            Value::Mapping(out)
        }
        other => other.clone(),
    })
}

fn fill(template: &str, fixture: &Fixture, frame: Option<Iteration>) -> E2eResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder().captures_iter(template) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let name = &caps[1];
        let explicit = caps.get(2).map(|m| m.as_str().parse::<usize>());

        let outside = || E2eError::SpecParse(format!("${{{}}} used outside a repeat block", name));
        let value = match (name, explicit) {
            ("index", None) => frame.ok_or_else(outside)?.index.to_string(),
            ("ordinal", None) => (frame.ok_or_else(outside)?.index + 1).to_string(),
            (field, _) if !FIELDS.contains(&field) => {
                return Err(E2eError::SpecParse(format!(
                    "unknown placeholder ${{{}}} (fixture fields: {})",
                    field,
                    FIELDS.join(", ")
                )))
            }
            (field, Some(Ok(n))) => fixture.value(field, n)?.to_string(),
            (field, Some(Err(_))) => {
                return Err(E2eError::SpecParse(format!("bad index in ${{{}[..]}}", field)))
            }
            (field, None) => {
                let it = frame.ok_or_else(outside)?;
                fixture.require(field, it.count)?[it.index].clone()
            }
        };

        out.push_str(&template[last..whole.start]);
        out.push_str(&value);
        last = whole.end;
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::Predicate;
    use crate::locator::ElementRef;

    fn fixture() -> Fixture {
        Fixture {
            column_id: vec!["todo".into(), "inprogress".into(), "done".into()],
            background_color: vec!["rgb(255, 255, 255)".into(), "rgb(238, 238, 238)".into(), "rgb(221, 221, 221)".into()],
            items: vec!["Buy milk".into(), "Walk the dog".into()],
        }
    }

    #[test]
    fn test_parse_simple_spec() {
        let yaml = r#"
name: smoke
description: Board loads
tags: [smoke]
steps:
  - step: visit
    url: /
  - step: assert
    target: testid=search
    expect: { exists: true }
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "smoke");
        let scenario = spec.plan(&Fixture::default()).unwrap();
        assert_eq!(scenario.len(), 2);
    }

    #[test]
    fn test_repeat_over_fills_placeholders() {
        let yaml = r#"
name: columns
steps:
  - step: repeat
    over: columnId
    steps:
      - step: assert
        target: 'testid=column-counter:eq(${index})'
        expect: { text_equals: "(${ordinal})" }
      - step: assert
        target: testid=ticket
        expect: { css_equals: { name: background-color, value: "${backgroundColor}" } }
"#;
        let scenario = ScenarioSpec::from_yaml(yaml).unwrap().plan(&fixture()).unwrap();
        assert_eq!(scenario.len(), 6);

        let last = &scenario.steps[5];
        assert_eq!(last.chain, vec![2]);
        assert_eq!(
            last.step,
            Step::Assert {
                target: ElementRef::test_id("ticket"),
                expect: Predicate::CssEquals {
                    name: "background-color".into(),
                    value: "rgb(221, 221, 221)".into()
                },
            }
        );
        assert_eq!(
            scenario.steps[2].step.target().unwrap().to_string(),
            "testid=column-counter:eq(1)"
        );
    }

    #[test]
    fn test_short_field_fails_fast() {
        let yaml = r#"
name: too-short
steps:
  - step: repeat
    over: columnId
    steps:
      - step: log
        message: "${items}"
"#;
        let err = ScenarioSpec::from_yaml(yaml).unwrap().plan(&fixture()).unwrap_err();
        assert!(matches!(err, E2eError::FixtureMalformed(msg) if msg.contains("'items'")));
    }

    #[test]
    fn test_explicit_index_out_of_range() {
        let yaml = r#"
name: explicit
steps:
  - step: log
    message: "${items[0]} then ${items[5]}"
"#;
        let err = ScenarioSpec::from_yaml(yaml).unwrap().plan(&fixture()).unwrap_err();
        assert!(matches!(err, E2eError::FixtureMalformed(_)));
    }

    #[test]
    fn test_largest_index_is_malformed() {
        let yaml = r#"
name: huge-index
steps:
  - step: log
    message: "${items[18446744073709551615]}"
"#;
        let err = ScenarioSpec::from_yaml(yaml).unwrap().plan(&fixture()).unwrap_err();
        assert!(matches!(err, E2eError::FixtureMalformed(msg) if msg.contains("index 18446744073709551615")));
    }

    #[test]
    fn test_placeholder_outside_repeat_rejected() {
        let yaml = r#"
name: stray
steps:
  - step: log
    message: "${index}"
"#;
        let err = ScenarioSpec::from_yaml(yaml).unwrap().plan(&fixture()).unwrap_err();
        assert!(matches!(err, E2eError::SpecParse(_)));
    }

    #[test]
    fn test_repeat_times_and_bad_repeat() {
        let ok = r#"
name: times
steps:
  - step: repeat
    times: 3
    steps:
      - step: log
        message: "${items[1]} #${ordinal}"
"#;
        let scenario = ScenarioSpec::from_yaml(ok).unwrap().plan(&fixture()).unwrap();
        assert_eq!(
            scenario.steps[2].step,
            Step::Log {
                message: "Walk the dog #3".into()
            }
        );

        let bad = r#"
name: both
steps:
  - step: repeat
    times: 1
    over: items
    steps: []
"#;
        assert!(ScenarioSpec::from_yaml(bad).unwrap().plan(&fixture()).is_err());
    }

    #[test]
    fn test_fixture_path_relative_to_spec() {
        let mut spec = ScenarioSpec::from_yaml("name: x\nfixture: ../fixtures/data.json\nsteps: []").unwrap();
        spec.source = Some(PathBuf::from("/suite/specs/x.yaml"));
        assert_eq!(
            spec.fixture_path().unwrap(),
            PathBuf::from("/suite/specs/../fixtures/data.json")
        );
    }
}
