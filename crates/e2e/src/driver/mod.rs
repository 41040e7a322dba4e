//! Browser drivers
//!
//! The engine talks to the page only through [`Driver`]. Two drivers ship with
//! the crate: [`chrome::ChromeDriver`] over the Chrome DevTools Protocol, and
//! [`sim::SimDriver`], an in-process kanban board used by tests and dry runs.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::Selector;

pub mod chrome;
pub mod sim;

pub use chrome::ChromeDriver;
pub use sim::SimDriver;

/// Opaque reference to one live element of the current page.
///
/// Querying the same live element twice yields the same handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Driver-side identifier of an in-flight drag transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub u64);

#[async_trait]
pub trait Driver: Send + Sync {
    /// Load a page, discarding every previously issued handle
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    /// Elements matching `selector` in document order, searched under `scope`
    /// (or the whole document)
    async fn query(
        &self,
        scope: Option<ElementHandle>,
        selector: &Selector,
    ) -> E2eResult<Vec<ElementHandle>>;

    async fn click(&self, handle: ElementHandle) -> E2eResult<()>;

    async fn double_click(&self, handle: ElementHandle) -> E2eResult<()>;

    async fn focus(&self, handle: ElementHandle) -> E2eResult<()>;

    /// Type into whatever element currently has focus
    async fn type_text(&self, text: &str) -> E2eResult<()>;

    async fn press_enter(&self) -> E2eResult<()>;

    async fn clear(&self, handle: ElementHandle) -> E2eResult<()>;

    async fn drag_start(&self, source: ElementHandle) -> E2eResult<TransferId>;

    async fn drop(
        &self,
        source: ElementHandle,
        target: ElementHandle,
        transfer: TransferId,
    ) -> E2eResult<()>;

    async fn attribute(&self, handle: ElementHandle, name: &str) -> E2eResult<Option<String>>;

    /// Computed value of a CSS property
    async fn css_property(&self, handle: ElementHandle, name: &str) -> E2eResult<Option<String>>;

    async fn text(&self, handle: ElementHandle) -> E2eResult<String>;

    /// PNG of the current viewport, when the driver can render one
    async fn screenshot(&self) -> E2eResult<Option<Vec<u8>>> {
        Ok(None)
    }
}
