//! Locator resolution: symbolic element references to live handles

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::{Driver, ElementHandle};
use crate::error::{E2eError, E2eResult};

const SEGMENT_SEPARATOR: &str = " >> ";
const TEST_ID_PREFIX: &str = "testid=";

/// How a single segment picks elements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// `data-testid` attribute value
    TestId(String),
    /// Raw CSS selector
    Css(String),
}

impl Selector {
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// The selector as CSS, for drivers that only speak CSS
    pub fn to_css(&self) -> String {
        match self {
            Selector::TestId(id) => format!(r#"[data-testid="{}"]"#, id),
            Selector::Css(css) => css.clone(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::TestId(id) => write!(f, "{}{}", TEST_ID_PREFIX, id),
            Selector::Css(css) => f.write_str(css),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Alias(String),
    Selector(Selector),
    /// Alias reference inlined at bind time
    Bound(Box<ElementRef>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    target: Target,
    index: Option<usize>,
}

/// Symbolic handle to zero or more elements.
///
/// Textual form: `segment ( " >> " segment )*`, where a segment is
/// `testid=<id>`, a CSS selector, or (first position only) `@alias`, each
/// optionally suffixed with `:eq(N)`. Never a live reference; every use
/// re-resolves against the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementRef {
    segments: Vec<Segment>,
}

impl ElementRef {
    fn root(target: Target) -> Self {
        Self {
            segments: vec![Segment { target, index: None }],
        }
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::root(Target::Selector(Selector::test_id(id)))
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::root(Target::Selector(Selector::css(selector)))
    }

    pub fn alias(name: impl Into<String>) -> Self {
        Self::root(Target::Alias(name.into()))
    }

    /// Narrow the last segment to its `index`-th match (zero-based)
    pub fn eq(mut self, index: usize) -> Self {
        if let Some(last) = self.segments.last_mut() {
            last.index = Some(index);
        }
        self
    }

    /// Search descendants of the current matches
    pub fn find(mut self, selector: Selector) -> Self {
        self.segments.push(Segment {
            target: Target::Selector(selector),
            index: None,
        });
        self
    }

    pub fn find_css(self, selector: impl Into<String>) -> Self {
        self.find(Selector::css(selector))
    }

    fn parse_segment(input: &str, raw: &str, first: bool) -> E2eResult<Segment> {
        let invalid = |reason: &str| E2eError::InvalidSelector {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let raw = raw.trim();
        let (body, index) = match raw.rfind(":eq(") {
            Some(pos) if raw.ends_with(')') => {
                let digits = &raw[pos + 4..raw.len() - 1];
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("ordinal in :eq() must be a non-negative integer"))?;
                (&raw[..pos], Some(index))
            }
            _ => (raw, None),
        };

        if body.is_empty() {
            return Err(invalid("empty segment"));
        }

        let target = if let Some(name) = body.strip_prefix('@') {
            if !first {
                return Err(invalid("an alias may only start a reference"));
            }
            if name.is_empty() {
                return Err(invalid("empty alias name"));
            }
            Target::Alias(name.to_string())
        } else if let Some(id) = body.strip_prefix(TEST_ID_PREFIX) {
            if id.is_empty() {
                return Err(invalid("empty test id"));
            }
            Target::Selector(Selector::TestId(id.to_string()))
        } else {
            Target::Selector(Selector::Css(body.to_string()))
        };

        Ok(Segment { target, index })
    }
}

impl FromStr for ElementRef {
    type Err = E2eError;

    fn from_str(input: &str) -> E2eResult<Self> {
        let segments = input
            .split(SEGMENT_SEPARATOR)
            .enumerate()
            .map(|(i, raw)| Self::parse_segment(input, raw, i == 0))
            .collect::<E2eResult<Vec<_>>>()?;
        Ok(Self { segments })
    }
}

impl TryFrom<String> for ElementRef {
    type Error = E2eError;

    fn try_from(value: String) -> E2eResult<Self> {
        value.parse()
    }
}

impl From<ElementRef> for String {
    fn from(value: ElementRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(SEGMENT_SEPARATOR)?;
            }
            match &segment.target {
                Target::Alias(name) => write!(f, "@{}", name)?,
                Target::Selector(selector) => write!(f, "{}", selector)?,
                Target::Bound(inner) => write!(f, "({})", inner)?,
            }
            if let Some(index) = segment.index {
                write!(f, ":eq({})", index)?;
            }
        }
        Ok(())
    }
}

/// Alias name to the reference it was last bound to, scoped to one run
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    bindings: HashMap<String, ElementRef>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, inlining any alias the target starts from so that later
    /// rebinding of that alias does not change this one.
    pub fn bind(&mut self, name: impl Into<String>, target: &ElementRef) -> E2eResult<()> {
        let mut inlined = target.clone();
        for segment in &mut inlined.segments {
            if let Target::Alias(alias) = &segment.target {
                let bound = self
                    .bindings
                    .get(alias)
                    .ok_or_else(|| E2eError::UnknownAlias(alias.clone()))?;
                segment.target = Target::Bound(Box::new(bound.clone()));
            }
        }
        self.bindings.insert(name.into(), inlined);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ElementRef> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Whether a resolution may legitimately come back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Maps [`ElementRef`]s to live handles through a [`Driver`]. No caching:
/// every call queries the page as it is now.
pub struct LocatorResolver<'a> {
    driver: &'a dyn Driver,
}

impl<'a> LocatorResolver<'a> {
    pub fn new(driver: &'a dyn Driver) -> Self {
        Self { driver }
    }

    pub async fn resolve(
        &self,
        element: &ElementRef,
        aliases: &AliasTable,
        presence: Presence,
    ) -> E2eResult<Vec<ElementHandle>> {
        let handles = self.resolve_segments(element, aliases).await?;
        debug!("Resolved {} -> {} element(s)", element, handles.len());

        if handles.is_empty() && presence == Presence::Required {
            return Err(E2eError::NotFound {
                selector: element.to_string(),
            });
        }
        Ok(handles)
    }

    async fn resolve_segments(
        &self,
        element: &ElementRef,
        aliases: &AliasTable,
    ) -> E2eResult<Vec<ElementHandle>> {
        let mut ops = Vec::new();
        flatten(element, aliases, &mut ops)?;

        let mut current: Option<Vec<ElementHandle>> = None;
        for op in ops {
            current = Some(match op {
                Op::Query(selector) => match &current {
                    None => self.driver.query(None, selector).await?,
                    Some(scopes) => {
                        let mut found: Vec<ElementHandle> = Vec::new();
                        for scope in scopes {
                            for handle in self.driver.query(Some(*scope), selector).await? {
                                if !found.contains(&handle) {
                                    found.push(handle);
                                }
                            }
                        }
                        found
                    }
                },
                Op::Nth(index) => current
                    .unwrap_or_default()
                    .get(index)
                    .copied()
                    .into_iter()
                    .collect(),
            });
        }

        Ok(current.unwrap_or_default())
    }
}

enum Op<'r> {
    Query(&'r Selector),
    Nth(usize),
}

/// Lower a reference into a flat query program. Aliases can only start a
/// reference, so an inlined alias always runs against the whole document.
fn flatten<'r>(element: &'r ElementRef, aliases: &'r AliasTable, ops: &mut Vec<Op<'r>>) -> E2eResult<()> {
    for segment in &element.segments {
        match &segment.target {
            Target::Alias(name) => {
                let bound = aliases
                    .get(name)
                    .ok_or_else(|| E2eError::UnknownAlias(name.clone()))?;
                flatten(bound, aliases, ops)?;
            }
            Target::Bound(inner) => flatten(inner, aliases, ops)?,
            Target::Selector(selector) => ops.push(Op::Query(selector)),
        }
        if let Some(index) = segment.index {
            ops.push(Op::Nth(index));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("testid=ticket" ; "test id")]
    #[test_case("testid=column-counter:eq(2)" ; "test id with ordinal")]
    #[test_case("@ticket >> span:eq(1)" ; "alias then css")]
    #[test_case("testid=ticket:eq(0) >> textarea" ; "scoped css")]
    #[test_case(r#"div[class="board"] >> testid=add-ticket-button:eq(0)"# ; "css then test id")]
    fn test_display_matches_source(input: &str) {
        let parsed: ElementRef = input.parse().unwrap();
        assert_eq!(parsed.to_string(), input);
    }

    #[test_case("" ; "empty")]
    #[test_case("testid=" ; "empty test id")]
    #[test_case("span >> @ticket" ; "alias not first")]
    #[test_case("span:eq(-1)" ; "negative ordinal")]
    #[test_case("@" ; "empty alias")]
    fn test_rejects_invalid(input: &str) {
        assert!(input.parse::<ElementRef>().is_err());
    }

    #[test]
    fn test_builder_matches_parser() {
        let built = ElementRef::test_id("ticket").eq(0).find_css("span").eq(1);
        let parsed: ElementRef = "testid=ticket:eq(0) >> span:eq(1)".parse().unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let element: ElementRef = serde_yaml::from_str("'@counter:eq(1)'").unwrap();
        assert_eq!(element, ElementRef::alias("counter").eq(1));
        let json = serde_json::to_string(&element).unwrap();
        assert_eq!(json, r#""@counter:eq(1)""#);
    }

    #[test]
    fn test_bind_unknown_alias_fails() {
        let mut table = AliasTable::new();
        let err = table
            .bind("text", &"@ticket >> span".parse().unwrap())
            .unwrap_err();
        assert!(matches!(err, E2eError::UnknownAlias(name) if name == "ticket"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_rebinding_does_not_leak_into_earlier_binding() {
        let mut table = AliasTable::new();
        table.bind("a", &ElementRef::test_id("ticket")).unwrap();
        table.bind("b", &ElementRef::alias("a").find_css("span")).unwrap();
        table.bind("a", &ElementRef::test_id("search")).unwrap();

        let b = table.get("b").unwrap();
        assert_eq!(b.to_string(), "(testid=ticket) >> span");
        assert_eq!(table.len(), 2);
    }
}
