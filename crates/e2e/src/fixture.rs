//! Static scenario data loaded from a JSON fixture file

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Field names as they appear in the fixture file
pub const FIELDS: [&str; 3] = ["columnId", "backgroundColor", "items"];

/// Read-only per-scenario data, indexed positionally by iteration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub column_id: Vec<String>,
    pub background_color: Vec<String>,
    pub items: Vec<String>,
}

impl Fixture {
    pub fn from_json(json: &str) -> E2eResult<Self> {
        serde_json::from_str(json).map_err(|e| E2eError::FixtureMalformed(e.to_string()))
    }

    pub fn load(path: &Path) -> E2eResult<Self> {
        if !path.is_file() {
            return Err(E2eError::FixtureNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let fixture = serde_json::from_str(&content).map_err(|e| {
            E2eError::FixtureMalformed(format!("{}: {}", path.display(), e))
        })?;
        debug!("Loaded fixture {}", path.display());
        Ok(fixture)
    }

    /// Look up a field by its file name
    pub fn field(&self, name: &str) -> Option<&[String]> {
        match name {
            "columnId" => Some(self.column_id.as_slice()),
            "backgroundColor" => Some(self.background_color.as_slice()),
            "items" => Some(self.items.as_slice()),
            _ => None,
        }
    }

    /// The field, checked to cover `count` iterations
    pub fn require(&self, name: &str, count: usize) -> E2eResult<&[String]> {
        let values = self.field(name).ok_or_else(|| {
            E2eError::FixtureMalformed(format!(
                "unknown field '{}' (expected one of {})",
                name,
                FIELDS.join(", ")
            ))
        })?;
        if values.len() < count {
            return Err(E2eError::FixtureMalformed(format!(
                "field '{}' has {} entries but {} iterations need it",
                name,
                values.len(),
                count
            )));
        }
        Ok(values)
    }

    /// One entry, failing fast instead of reading past the end
    pub fn value(&self, name: &str, index: usize) -> E2eResult<&str> {
        let values = self.require(name, 0)?;
        values.get(index).map(String::as_str).ok_or_else(|| {
            E2eError::FixtureMalformed(format!(
                "field '{}' has {} entries, no entry at index {}",
                name,
                values.len(),
                index
            ))
        })
    }
}
