//! Action execution against resolved elements

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::{Driver, ElementHandle, TransferId};
use crate::error::{E2eError, E2eResult};

static NEXT_ARENA: AtomicU64 = AtomicU64::new(1);

/// A single simulated user action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    /// Focus, type, and optionally submit with Enter
    TypeText {
        text: String,
        #[serde(default)]
        then_enter: bool,
    },
    /// Double-click into edit mode, then type into whatever took focus
    DoubleClickThenType {
        text: String,
        #[serde(default)]
        then_enter: bool,
    },
    /// Empty an input or text field
    Clear,
    /// Begin a drag, binding the transfer under `token`
    DragStart { token: String },
    /// Drop the transfer bound under `token` onto the target
    Drop { token: String },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::TypeText { .. } => "type_text",
            ActionKind::DoubleClickThenType { .. } => "double_click_then_type",
            ActionKind::Clear => "clear",
            ActionKind::DragStart { .. } => "drag_start",
            ActionKind::Drop { .. } => "drop",
        }
    }
}

/// Proof that a drag started from `source`. Consumed by exactly one drop, and
/// only accepted by the arena that issued it.
#[derive(Debug, PartialEq, Eq)]
pub struct TransferToken {
    arena: u64,
    slot: u64,
    source: ElementHandle,
}

impl TransferToken {
    pub fn source(&self) -> ElementHandle {
        self.source
    }
}

/// Issues and redeems transfer tokens for one scenario run
#[derive(Debug)]
pub struct TransferArena {
    id: u64,
    next_slot: u64,
    live: HashMap<u64, TransferId>,
}

impl TransferArena {
    pub fn new() -> Self {
        Self {
            id: NEXT_ARENA.fetch_add(1, Ordering::Relaxed),
            next_slot: 0,
            live: HashMap::new(),
        }
    }

    fn issue(&mut self, source: ElementHandle, transfer: TransferId) -> TransferToken {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.live.insert(slot, transfer);
        TransferToken {
            arena: self.id,
            slot,
            source,
        }
    }

    fn redeem(&mut self, token: &TransferToken, selector: &str) -> E2eResult<TransferId> {
        if token.arena != self.id {
            return Err(E2eError::interaction(
                selector,
                "transfer token belongs to a different drag sequence",
            ));
        }
        self.live
            .remove(&token.slot)
            .ok_or_else(|| E2eError::interaction(selector, "transfer token already used"))
    }

    pub fn outstanding(&self) -> usize {
        self.live.len()
    }
}

impl Default for TransferArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run state the executor threads between actions
#[derive(Debug, Default)]
pub struct ActionContext {
    pub arena: TransferArena,
    tokens: HashMap<String, TransferToken>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    DragStarted { token: String },
    Dropped { token: String },
}

/// Performs actions through a [`Driver`], bounding every driver call
pub struct ActionExecutor<'a> {
    driver: &'a dyn Driver,
    timeout: Duration,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(driver: &'a dyn Driver, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    /// Perform `kind` on `handle`. `selector` only labels diagnostics.
    pub async fn perform(
        &self,
        handle: ElementHandle,
        selector: &str,
        kind: &ActionKind,
        ctx: &mut ActionContext,
    ) -> E2eResult<ActionOutcome> {
        debug!("{} on {} ({})", kind.name(), selector, handle);

        match kind {
            ActionKind::Click => {
                self.click(handle, selector).await?;
            }
            ActionKind::TypeText { text, then_enter } => {
                self.type_text(handle, selector, text, *then_enter).await?;
            }
            ActionKind::DoubleClickThenType { text, then_enter } => {
                self.double_click_then_type(handle, selector, text, *then_enter)
                    .await?;
            }
            ActionKind::Clear => {
                self.bounded(selector, "clear", self.driver.clear(handle)).await?;
            }
            ActionKind::DragStart { token } => {
                let issued = self.drag_start(handle, selector, &mut ctx.arena).await?;
                // Re-binding a name drops the unused earlier token
                ctx.tokens.insert(token.clone(), issued);
                return Ok(ActionOutcome::DragStarted {
                    token: token.clone(),
                });
            }
            ActionKind::Drop { token } => {
                let issued = ctx.tokens.remove(token).ok_or_else(|| {
                    E2eError::interaction(selector, format!("no drag in progress for token '{}'", token))
                })?;
                self.drop(handle, selector, issued, &mut ctx.arena).await?;
                return Ok(ActionOutcome::Dropped {
                    token: token.clone(),
                });
            }
        }
        Ok(ActionOutcome::Completed)
    }

    pub async fn click(&self, handle: ElementHandle, selector: &str) -> E2eResult<()> {
        self.bounded(selector, "click", self.driver.click(handle)).await
    }

    pub async fn type_text(
        &self,
        handle: ElementHandle,
        selector: &str,
        text: &str,
        then_enter: bool,
    ) -> E2eResult<()> {
        self.bounded(selector, "focus", self.driver.focus(handle)).await?;
        self.bounded(selector, "type", self.driver.type_text(text)).await?;
        if then_enter {
            self.bounded(selector, "enter", self.driver.press_enter()).await?;
        }
        Ok(())
    }

    pub async fn double_click_then_type(
        &self,
        handle: ElementHandle,
        selector: &str,
        text: &str,
        then_enter: bool,
    ) -> E2eResult<()> {
        self.bounded(selector, "double click", self.driver.double_click(handle))
            .await?;
        self.bounded(selector, "type", self.driver.type_text(text)).await?;
        if then_enter {
            self.bounded(selector, "enter", self.driver.press_enter()).await?;
        }
        Ok(())
    }

    pub async fn drag_start(
        &self,
        source: ElementHandle,
        selector: &str,
        arena: &mut TransferArena,
    ) -> E2eResult<TransferToken> {
        let transfer = self
            .bounded(selector, "dragstart", self.driver.drag_start(source))
            .await?;
        Ok(arena.issue(source, transfer))
    }

    pub async fn drop(
        &self,
        target: ElementHandle,
        selector: &str,
        token: TransferToken,
        arena: &mut TransferArena,
    ) -> E2eResult<()> {
        let transfer = arena.redeem(&token, selector)?;
        self.bounded(
            selector,
            "drop",
            self.driver.drop(token.source, target, transfer),
        )
        .await
    }

    /// Apply the action timeout and label driver failures with the selector
    async fn bounded<T>(
        &self,
        selector: &str,
        what: &str,
        call: impl Future<Output = E2eResult<T>>,
    ) -> E2eResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(E2eError::InteractionFailed { reason, .. })) => {
                Err(E2eError::interaction(selector, reason))
            }
            Ok(Err(other)) => Err(other),
            Err(_) => Err(E2eError::Timeout {
                what: format!("{} on {}", what, selector),
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Step;

    #[test]
    fn test_token_single_use() {
        let mut arena = TransferArena::new();
        let token = arena.issue(ElementHandle(1), TransferId(7));
        assert_eq!(arena.redeem(&token, "x").unwrap(), TransferId(7));
        assert!(matches!(
            arena.redeem(&token, "x"),
            Err(E2eError::InteractionFailed { .. })
        ));
        assert_eq!(arena.outstanding(), 0);
    }

    #[test]
    fn test_token_from_other_arena_rejected() {
        let mut first = TransferArena::new();
        let mut second = TransferArena::new();
        let token = first.issue(ElementHandle(1), TransferId(1));
        let err = second.redeem(&token, "testid=column-drop-target").unwrap_err();
        assert!(err.to_string().contains("different drag sequence"));
        assert_eq!(first.outstanding(), 1);
    }

    fn action_of(yaml: &str) -> ActionKind {
        match serde_yaml::from_str::<Step>(yaml).unwrap() {
            Step::Action { action, .. } => action,
            other => panic!("not an action step: {:?}", other),
        }
    }

    #[test]
    fn test_action_yaml_forms() {
        let click = action_of("{ step: action, target: testid=add-ticket-button, action: click }");
        assert_eq!(click, ActionKind::Click);

        let typed = action_of(
            "{ step: action, target: testid=search, action: { type_text: { text: Buy milk, then_enter: true } } }",
        );
        assert_eq!(
            typed,
            ActionKind::TypeText {
                text: "Buy milk".into(),
                then_enter: true
            }
        );

        let drop = action_of("{ step: action, target: testid=column-drop-target, action: { drop: { token: t1 } } }");
        assert_eq!(drop.name(), "drop");
    }

    #[test]
    fn test_action_yaml_tag_form() {
        let typed: ActionKind = serde_yaml::from_str("!type_text { text: Walk the dog }").unwrap();
        assert_eq!(
            typed,
            ActionKind::TypeText {
                text: "Walk the dog".into(),
                then_enter: false
            }
        );
    }
}
