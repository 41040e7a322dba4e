//! In-process kanban board
//!
//! Renders the same hooks the deployed board exposes (`add-ticket-button`,
//! `ticket`, `ticket-text`, `delete-ticket-button`, `search`,
//! `column-counter`, `column-drop-target`) from a small board model. A render
//! lag can hold back the visible DOM for a number of reads after each
//! mutation, which is what wait-for-stability exists to absorb.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Driver, ElementHandle, TransferId};
use crate::error::{E2eError, E2eResult};
use crate::locator::Selector;

pub const PLACEHOLDER: &str = "Add your text here";
pub const EMPTY_TICKET: &str = "[Empty ticket]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimColumn {
    pub id: String,
    pub title: String,
    pub background_color: String,
}

impl SimColumn {
    pub fn new(id: &str, title: &str, background_color: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            background_color: background_color.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub columns: Vec<SimColumn>,
    /// Reads that still observe the previous render after a mutation
    pub render_lag: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                SimColumn::new("todo", "To do", "rgb(255, 255, 255)"),
                SimColumn::new("inprogress", "In progress", "rgb(238, 238, 238)"),
                SimColumn::new("done", "Done", "rgb(221, 221, 221)"),
            ],
            render_lag: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Board,
    Search,
    Column(usize),
    Title(usize),
    Counter(usize),
    AddButton(usize),
    DropTarget(usize),
    Ticket(u64),
    TicketNumber(u64),
    TicketText(u64),
    TicketLabel(u64),
    TicketDelete(u64),
}

impl NodeKey {
    fn ticket(self) -> Option<u64> {
        match self {
            NodeKey::Ticket(id)
            | NodeKey::TicketNumber(id)
            | NodeKey::TicketText(id)
            | NodeKey::TicketLabel(id)
            | NodeKey::TicketDelete(id) => Some(id),
            _ => None,
        }
    }

    fn column(self) -> Option<usize> {
        match self {
            NodeKey::Column(c)
            | NodeKey::Title(c)
            | NodeKey::Counter(c)
            | NodeKey::AddButton(c)
            | NodeKey::DropTarget(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Ticket {
    id: u64,
    column: usize,
    text: String,
    /// Pending edit, present while the text field is in edit mode
    draft: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Search,
    TicketText(u64),
    Other,
}

#[derive(Debug, Clone)]
struct Node {
    handle: ElementHandle,
    tag: &'static str,
    attrs: Vec<(String, String)>,
    css: Vec<(String, String)>,
    own_text: String,
    /// Index one past this node's last descendant
    end: usize,
}

impl Node {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Rendered DOM in document order
#[derive(Debug, Clone, Default)]
struct Dom {
    nodes: Vec<Node>,
}

impl Dom {
    fn position(&self, handle: ElementHandle) -> Option<usize> {
        self.nodes.iter().position(|n| n.handle == handle)
    }

    fn text_content(&self, pos: usize) -> String {
        let end = self.nodes[pos].end;
        self.nodes[pos..end]
            .iter()
            .map(|n| n.own_text.as_str())
            .collect()
    }
}

struct Board {
    config: SimConfig,
    loaded: bool,
    tickets: Vec<Ticket>,
    next_ticket: u64,
    search: String,
    focus: Option<Focus>,
    transfers: HashMap<u64, u64>,
    next_transfer: u64,
    handles: HashMap<NodeKey, ElementHandle>,
    keys: HashMap<ElementHandle, NodeKey>,
    next_handle: u64,
    rendered: Dom,
    stale_reads: u32,
}

impl Board {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            loaded: false,
            tickets: Vec::new(),
            next_ticket: 1,
            search: String::new(),
            focus: None,
            transfers: HashMap::new(),
            next_transfer: 1,
            handles: HashMap::new(),
            keys: HashMap::new(),
            next_handle: 1,
            rendered: Dom::default(),
            stale_reads: 0,
        }
    }

    fn reset(&mut self) {
        self.loaded = true;
        self.tickets.clear();
        self.search.clear();
        self.focus = None;
        self.transfers.clear();
        // Handles never get reused across page loads
        self.handles.clear();
        self.keys.clear();
        self.stale_reads = 0;
        self.rendered = self.render();
    }

    fn handle_for(&mut self, key: NodeKey) -> ElementHandle {
        if let Some(handle) = self.handles.get(&key) {
            return *handle;
        }
        let handle = ElementHandle(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(key, handle);
        self.keys.insert(handle, key);
        handle
    }

    fn is_visible(&self, ticket: &Ticket) -> bool {
        let needle = self.search.trim().to_lowercase();
        needle.is_empty() || ticket.text.to_lowercase().contains(&needle)
    }

    fn visible_in(&self, column: usize) -> Vec<&Ticket> {
        self.tickets
            .iter()
            .filter(|t| t.column == column && self.is_visible(t))
            .collect()
    }

    /// Whether `key` is part of the current (unlagged) page
    fn is_live(&self, key: NodeKey) -> bool {
        if !self.loaded {
            return false;
        }
        if let Some(id) = key.ticket() {
            return self
                .tickets
                .iter()
                .any(|t| t.id == id && self.is_visible(t));
        }
        match key.column() {
            Some(c) => c < self.config.columns.len(),
            None => true,
        }
    }

    fn render(&mut self) -> Dom {
        let mut dom = Dom::default();
        if !self.loaded {
            return dom;
        }

        let board = self.open(&mut dom, NodeKey::Board, "div", &[("data-testid", "board")], &[], "");
        let search = self.search.clone();
        let s = self.open(
            &mut dom,
            NodeKey::Search,
            "input",
            &[("data-testid", "search"), ("value", &search)],
            &[],
            "",
        );
        close(&mut dom, s);

        for c in 0..self.config.columns.len() {
            let column = self.config.columns[c].clone();
            let col = self.open(
                &mut dom,
                NodeKey::Column(c),
                "div",
                &[("data-testid", "column"), ("data-column-id", &column.id)],
                &[],
                "",
            );
            let title = self.open(&mut dom, NodeKey::Title(c), "h2", &[], &[], &column.title);
            close(&mut dom, title);
            let count = format!("({})", self.visible_in(c).len());
            let counter = self.open(
                &mut dom,
                NodeKey::Counter(c),
                "span",
                &[("data-testid", "column-counter")],
                &[],
                &count,
            );
            close(&mut dom, counter);
            let add = self.open(
                &mut dom,
                NodeKey::AddButton(c),
                "button",
                &[("data-testid", "add-ticket-button")],
                &[],
                "+",
            );
            close(&mut dom, add);
            let target = self.open(
                &mut dom,
                NodeKey::DropTarget(c),
                "div",
                &[("data-testid", "column-drop-target")],
                &[],
                "",
            );

            let tickets: Vec<Ticket> = self.visible_in(c).into_iter().cloned().collect();
            for ticket in tickets {
                let id = ticket.id;
                let t = self.open(
                    &mut dom,
                    NodeKey::Ticket(id),
                    "div",
                    &[("data-testid", "ticket"), ("draggable", "true")],
                    &[("background-color", &column.background_color)],
                    "",
                );
                let number = self.open(&mut dom, NodeKey::TicketNumber(id), "span", &[], &[], &format!("#{}", id));
                close(&mut dom, number);
                let value = ticket.draft.clone().unwrap_or_else(|| ticket.text.clone());
                let text = self.open(
                    &mut dom,
                    NodeKey::TicketText(id),
                    "textarea",
                    &[
                        ("data-testid", "ticket-text"),
                        ("columnid", &column.id),
                        ("placeholder", PLACEHOLDER),
                        ("value", &value),
                    ],
                    &[],
                    "",
                );
                close(&mut dom, text);
                let shown = if ticket.text.is_empty() {
                    EMPTY_TICKET.to_string()
                } else {
                    ticket.text.clone()
                };
                let label = self.open(&mut dom, NodeKey::TicketLabel(id), "span", &[], &[], &shown);
                close(&mut dom, label);
                let delete = self.open(
                    &mut dom,
                    NodeKey::TicketDelete(id),
                    "button",
                    &[("data-testid", "delete-ticket-button")],
                    &[],
                    "",
                );
                close(&mut dom, delete);
                close(&mut dom, t);
            }
            close(&mut dom, target);
            close(&mut dom, col);
        }
        close(&mut dom, board);
        self.prune_handles();
        dom
    }

    /// Forget the handles of deleted tickets
    fn prune_handles(&mut self) {
        let tickets = &self.tickets;
        let alive = |key: &NodeKey| key.ticket().map_or(true, |id| tickets.iter().any(|t| t.id == id));
        self.handles.retain(|key, _| alive(key));
        self.keys.retain(|_, key| alive(key));
    }

    fn open(
        &mut self,
        dom: &mut Dom,
        key: NodeKey,
        tag: &'static str,
        attrs: &[(&str, &str)],
        css: &[(&str, &str)],
        text: &str,
    ) -> usize {
        let handle = self.handle_for(key);
        dom.nodes.push(Node {
            handle,
            tag,
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            css: css.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            own_text: text.to_string(),
            end: 0,
        });
        dom.nodes.len() - 1
    }

    /// The DOM as the page currently shows it
    fn read(&mut self) -> &Dom {
        if self.stale_reads > 0 {
            self.stale_reads -= 1;
        } else {
            self.rendered = self.render();
        }
        &self.rendered
    }

    /// Resolve a handle for an interaction against the live model
    fn live_key(&self, handle: ElementHandle) -> E2eResult<NodeKey> {
        match self.keys.get(&handle) {
            Some(key) if self.is_live(*key) => Ok(*key),
            _ => Err(E2eError::interaction(handle.to_string(), "element is detached from the DOM")),
        }
    }

    fn mutate(&mut self) {
        if self.config.render_lag > 0 {
            if self.stale_reads == 0 {
                self.rendered = self.render();
            }
            self.stale_reads = self.config.render_lag;
        }
    }

    fn ticket_mut(&mut self, id: u64) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == id)
    }

    fn add_ticket(&mut self, column: usize) {
        self.mutate();
        let id = self.next_ticket;
        self.next_ticket += 1;
        // New tickets go on top of their column
        self.tickets.insert(
            0,
            Ticket {
                id,
                column,
                text: String::new(),
                draft: Some(String::new()),
            },
        );
        self.focus = Some(Focus::TicketText(id));
        debug!("sim: added ticket {} to column {}", id, self.config.columns[column].id);
    }

    fn edit(&mut self, id: u64) {
        if let Some(ticket) = self.ticket_mut(id) {
            if ticket.draft.is_none() {
                ticket.draft = Some(ticket.text.clone());
            }
        }
        self.focus = Some(Focus::TicketText(id));
    }
}

fn close(dom: &mut Dom, pos: usize) {
    dom.nodes[pos].end = dom.nodes.len();
}

/// `tag`, `[name="value"]`, `tag[name="value"]` or `*`
fn css_matches(css: &str, node: &Node) -> E2eResult<bool> {
    let unsupported = || E2eError::InvalidSelector {
        input: css.to_string(),
        reason: "the simulated board supports tag, [attr=\"value\"] and tag[attr=\"value\"] selectors".to_string(),
    };

    let css = css.trim();
    let (tag, attr) = match css.find('[') {
        Some(pos) => (&css[..pos], Some(&css[pos..])),
        None => (css, None),
    };
    if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '*') {
        return Err(unsupported());
    }
    if !tag.is_empty() && tag != "*" && tag != node.tag {
        return Ok(false);
    }

    let Some(attr) = attr else {
        return Ok(true);
    };
    let inner = attr
        .strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .ok_or_else(unsupported)?;
    let (name, value) = match inner.split_once('=') {
        Some((name, value)) => (name, Some(value.trim_matches(|c| c == '"' || c == '\''))),
        None => (inner, None),
    };
    Ok(match (node.attr(name.trim()), value) {
        (Some(actual), Some(expected)) => actual == expected,
        (Some(_), None) => true,
        (None, _) => false,
    })
}

fn selector_matches(selector: &Selector, node: &Node) -> E2eResult<bool> {
    match selector {
        Selector::TestId(id) => Ok(node.attr("data-testid") == Some(id.as_str())),
        Selector::Css(css) => css_matches(css, node),
    }
}

/// Driver backed by the in-process board
pub struct SimDriver {
    board: Mutex<Board>,
}

impl SimDriver {
    pub fn new(config: SimConfig) -> Self {
        Self {
            board: Mutex::new(Board::new(config)),
        }
    }

    /// Committed ticket texts per column id, top to bottom, ignoring search
    pub fn tickets(&self) -> Vec<(String, String)> {
        let board = self.board.lock();
        board
            .tickets
            .iter()
            .map(|t| (board.config.columns[t.column].id.clone(), t.text.clone()))
            .collect()
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

#[async_trait]
impl Driver for SimDriver {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("sim: navigate {}", url);
        self.board.lock().reset();
        Ok(())
    }

    async fn query(
        &self,
        scope: Option<ElementHandle>,
        selector: &Selector,
    ) -> E2eResult<Vec<ElementHandle>> {
        let mut board = self.board.lock();
        let dom = board.read();
        let (start, end) = match scope {
            None => (0, dom.nodes.len()),
            Some(handle) => {
                let pos = dom.position(handle).ok_or_else(|| {
                    E2eError::interaction(handle.to_string(), "scope element is detached from the DOM")
                })?;
                (pos + 1, dom.nodes[pos].end)
            }
        };

        let mut found = Vec::new();
        for node in &dom.nodes[start..end] {
            if selector_matches(selector, node)? {
                found.push(node.handle);
            }
        }
        Ok(found)
    }

    async fn click(&self, handle: ElementHandle) -> E2eResult<()> {
        let mut board = self.board.lock();
        match board.live_key(handle)? {
            NodeKey::AddButton(c) => board.add_ticket(c),
            NodeKey::TicketDelete(id) => {
                board.mutate();
                board.tickets.retain(|t| t.id != id);
                if board.focus == Some(Focus::TicketText(id)) {
                    board.focus = None;
                }
                debug!("sim: deleted ticket {}", id);
            }
            NodeKey::TicketText(id) => board.edit(id),
            NodeKey::Search => board.focus = Some(Focus::Search),
            _ => board.focus = Some(Focus::Other),
        }
        Ok(())
    }

    async fn double_click(&self, handle: ElementHandle) -> E2eResult<()> {
        let mut board = self.board.lock();
        let key = board.live_key(handle)?;
        match key.ticket() {
            Some(id) => {
                board.mutate();
                board.edit(id);
            }
            None => board.focus = Some(Focus::Other),
        }
        Ok(())
    }

    async fn focus(&self, handle: ElementHandle) -> E2eResult<()> {
        let mut board = self.board.lock();
        match board.live_key(handle)? {
            NodeKey::TicketText(id) => {
                board.mutate();
                board.edit(id);
            }
            NodeKey::Search => board.focus = Some(Focus::Search),
            _ => board.focus = Some(Focus::Other),
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> E2eResult<()> {
        let mut board = self.board.lock();
        match board.focus {
            Some(Focus::Search) => {
                board.mutate();
                board.search.push_str(text);
            }
            Some(Focus::TicketText(id)) => {
                board.mutate();
                if let Some(ticket) = board.ticket_mut(id) {
                    ticket.draft.get_or_insert_with(String::new).push_str(text);
                }
            }
            Some(Focus::Other) => {
                return Err(E2eError::interaction("<focused element>", "element is not editable"))
            }
            None => return Err(E2eError::interaction("<focused element>", "no element has focus")),
        }
        Ok(())
    }

    async fn press_enter(&self) -> E2eResult<()> {
        let mut board = self.board.lock();
        if let Some(Focus::TicketText(id)) = board.focus {
            board.mutate();
            if let Some(ticket) = board.ticket_mut(id) {
                if let Some(draft) = ticket.draft.take() {
                    ticket.text = draft;
                }
            }
            board.focus = None;
        }
        Ok(())
    }

    async fn clear(&self, handle: ElementHandle) -> E2eResult<()> {
        let mut board = self.board.lock();
        match board.live_key(handle)? {
            NodeKey::Search => {
                board.mutate();
                board.search.clear();
                board.focus = Some(Focus::Search);
            }
            NodeKey::TicketText(id) => {
                board.mutate();
                board.edit(id);
                if let Some(ticket) = board.ticket_mut(id) {
                    ticket.draft = Some(String::new());
                }
            }
            _ => return Err(E2eError::interaction(handle.to_string(), "element is not editable")),
        }
        Ok(())
    }

    async fn drag_start(&self, source: ElementHandle) -> E2eResult<TransferId> {
        let mut board = self.board.lock();
        match board.live_key(source)? {
            NodeKey::Ticket(id) => {
                let transfer = board.next_transfer;
                board.next_transfer += 1;
                board.transfers.insert(transfer, id);
                Ok(TransferId(transfer))
            }
            _ => Err(E2eError::interaction(source.to_string(), "element is not draggable")),
        }
    }

    async fn drop(
        &self,
        source: ElementHandle,
        target: ElementHandle,
        transfer: TransferId,
    ) -> E2eResult<()> {
        let mut board = self.board.lock();
        let source_key = board.live_key(source)?;
        let column = board.live_key(target)?.column().ok_or_else(|| {
            E2eError::interaction(target.to_string(), "element is not a drop target")
        })?;
        let ticket = match board.transfers.remove(&transfer.0) {
            Some(id) if source_key.ticket() == Some(id) => id,
            _ => {
                return Err(E2eError::interaction(
                    target.to_string(),
                    "drop carries no data from this drag source",
                ))
            }
        };

        board.mutate();
        if let Some(pos) = board.tickets.iter().position(|t| t.id == ticket) {
            let mut moved = board.tickets.remove(pos);
            moved.column = column;
            board.tickets.insert(0, moved);
        }
        debug!("sim: moved ticket {} to column {}", ticket, board.config.columns[column].id);
        Ok(())
    }

    async fn attribute(&self, handle: ElementHandle, name: &str) -> E2eResult<Option<String>> {
        let mut board = self.board.lock();
        let dom = board.read();
        let pos = dom
            .position(handle)
            .ok_or_else(|| E2eError::interaction(handle.to_string(), "element is detached from the DOM"))?;
        Ok(dom.nodes[pos].attr(name).map(str::to_string))
    }

    async fn css_property(&self, handle: ElementHandle, name: &str) -> E2eResult<Option<String>> {
        let mut board = self.board.lock();
        let dom = board.read();
        let pos = dom
            .position(handle)
            .ok_or_else(|| E2eError::interaction(handle.to_string(), "element is detached from the DOM"))?;
        Ok(dom.nodes[pos]
            .css
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone()))
    }

    async fn text(&self, handle: ElementHandle) -> E2eResult<String> {
        let mut board = self.board.lock();
        let dom = board.read();
        let pos = dom
            .position(handle)
            .ok_or_else(|| E2eError::interaction(handle.to_string(), "element is detached from the DOM"))?;
        Ok(dom.text_content(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn first(driver: &SimDriver, selector: Selector) -> ElementHandle {
        driver.query(None, &selector).await.unwrap()[0]
    }

    #[tokio::test]
    async fn test_blank_before_navigate() {
        let driver = SimDriver::default();
        let found = driver.query(None, &Selector::test_id("board")).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_add_type_and_commit() {
        let driver = SimDriver::default();
        driver.navigate("/").await.unwrap();

        let add = first(&driver, Selector::test_id("add-ticket-button")).await;
        driver.click(add).await.unwrap();
        driver.type_text("Buy milk").await.unwrap();
        driver.press_enter().await.unwrap();

        assert_eq!(driver.tickets(), vec![("todo".to_string(), "Buy milk".to_string())]);
        let counter = first(&driver, Selector::test_id("column-counter")).await;
        assert_eq!(driver.text(counter).await.unwrap(), "(1)");
    }

    #[tokio::test]
    async fn test_scoped_query_stays_inside_scope() {
        let driver = SimDriver::default();
        driver.navigate("/").await.unwrap();
        let adds = driver.query(None, &Selector::test_id("add-ticket-button")).await.unwrap();
        driver.click(adds[0]).await.unwrap();
        driver.click(adds[1]).await.unwrap();

        let tickets = driver.query(None, &Selector::test_id("ticket")).await.unwrap();
        assert_eq!(tickets.len(), 2);
        let spans = driver.query(Some(tickets[0]), &Selector::css("span")).await.unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(driver.text(spans[1]).await.unwrap(), EMPTY_TICKET);
    }

    #[tokio::test]
    async fn test_css_subset() {
        let driver = SimDriver::default();
        driver.navigate("/").await.unwrap();
        let by_attr = driver
            .query(None, &Selector::css(r#"div[data-column-id="done"]"#))
            .await
            .unwrap();
        assert_eq!(by_attr.len(), 1);
        assert!(driver.query(None, &Selector::css("div > span")).await.is_err());
    }

    #[tokio::test]
    async fn test_render_lag_holds_back_reads() {
        let driver = SimDriver::new(SimConfig {
            render_lag: 2,
            ..Default::default()
        });
        driver.navigate("/").await.unwrap();
        let add = first(&driver, Selector::test_id("add-ticket-button")).await;
        driver.click(add).await.unwrap();

        let ticket = Selector::test_id("ticket");
        assert!(driver.query(None, &ticket).await.unwrap().is_empty());
        assert!(driver.query(None, &ticket).await.unwrap().is_empty());
        assert_eq!(driver.query(None, &ticket).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_ticket_is_detached() {
        let driver = SimDriver::default();
        driver.navigate("/").await.unwrap();
        let add = first(&driver, Selector::test_id("add-ticket-button")).await;
        driver.click(add).await.unwrap();
        let delete = first(&driver, Selector::test_id("delete-ticket-button")).await;
        driver.click(delete).await.unwrap();

        let err = driver.click(delete).await.unwrap_err();
        assert!(matches!(err, E2eError::InteractionFailed { .. }));
    }

    #[tokio::test]
    async fn test_deleted_tickets_release_their_handles() {
        let driver = SimDriver::default();
        driver.navigate("/").await.unwrap();
        let add = first(&driver, Selector::test_id("add-ticket-button")).await;
        driver.click(add).await.unwrap();
        first(&driver, Selector::test_id("ticket")).await;
        let with_ticket = driver.board.lock().handles.len();

        let delete = first(&driver, Selector::test_id("delete-ticket-button")).await;
        driver.click(delete).await.unwrap();
        assert!(driver.query(None, &Selector::test_id("ticket")).await.unwrap().is_empty());

        let board = driver.board.lock();
        assert!(board.handles.len() < with_ticket);
        assert_eq!(board.handles.len(), board.keys.len());
        assert!(!board.keys.contains_key(&delete));
    }
}
