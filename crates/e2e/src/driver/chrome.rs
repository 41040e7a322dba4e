//! Headless Chrome driver over the Chrome DevTools Protocol
//!
//! Elements are tracked by a registry injected into the page: every element
//! returned from a query gets a stable numeric id (so re-querying the same
//! element yields the same handle), and drag transfers keep their real
//! `DataTransfer` object page-side until the matching drop.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::util::Timeout as WaitTimeout;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{Driver, ElementHandle, TransferId};
use crate::config::DriverConfig;
use crate::error::{E2eError, E2eResult};
use crate::locator::Selector;

const DETACHED: &str = "detached";
const STALE_TRANSFER: &str = "stale-transfer";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const PRELUDE: &str = r#"
const R = window.__kanbanE2e || (window.__kanbanE2e = {
  next: 1, ids: new WeakMap(), byId: new Map(), nextTransfer: 1, transfers: new Map()
});
const idOf = (e) => {
  let i = R.ids.get(e);
  if (!i) { i = R.next++; R.ids.set(e, i); }
  R.byId.set(i, e);
  return i;
};
const sweep = () => {
  for (const [i, e] of R.byId) if (!e.isConnected) R.byId.delete(i);
};
const el = (i) => {
  const e = R.byId.get(i);
  if (!e || !e.isConnected) throw new Error('detached');
  return e;
};
"#;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: Value,
    #[serde(default)]
    err: Option<String>,
}

/// Chrome session holding one tab
///
/// headless_chrome blocks the calling thread, so every tab call runs on the
/// blocking pool. A caller's timeout then fires even when the page hangs.
pub struct ChromeDriver {
    /// Kept alive for the lifetime of the tab
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
    call_timeout: Duration,
}

impl ChromeDriver {
    /// Launch a new browser, or attach to one listening on
    /// `remote_debugging_port`
    pub fn launch(config: &DriverConfig) -> E2eResult<Self> {
        let browser = match config.remote_debugging_port {
            Some(port) => {
                info!("Connecting to existing browser on port {}", port);
                Browser::connect(format!("http://127.0.0.1:{}", port))
                    .map_err(|e| E2eError::Browser(format!("Failed to connect to browser: {}", e)))?
            }
            None => {
                info!(
                    "Launching browser (headless: {}, size: {}x{})",
                    config.headless, config.window_width, config.window_height
                );
                let mut options = LaunchOptions::default_builder()
                    .headless(config.headless)
                    .window_size(Some((config.window_width, config.window_height)))
                    .idle_browser_timeout(config.idle_timeout())
                    .build()
                    .map_err(|e| E2eError::Browser(format!("Invalid launch options: {}", e)))?;
                if config.no_sandbox {
                    options.sandbox = false;
                }
                options.args.push(OsStr::new("--disable-gpu"));
                Browser::new(options)
                    .map_err(|e| E2eError::Browser(format!("Failed to launch browser: {}", e)))?
            }
        };

        let tab = browser
            .new_tab()
            .map_err(|e| E2eError::Browser(format!("Failed to create tab: {}", e)))?;

        Ok(Self {
            browser,
            tab,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Bound headless_chrome's own waits (navigation) by `timeout`
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.tab.set_default_timeout(timeout);
        self.call_timeout = timeout;
        self
    }

    /// Run `f` against the tab on the blocking pool
    async fn on_tab<T, F>(&self, f: F) -> E2eResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> E2eResult<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| E2eError::Browser(format!("tab task failed: {}", e)))?
    }

    /// Run `body` with the registry prelude in scope. `body` must evaluate to
    /// the value to hand back.
    async fn call(&self, subject: &str, body: &str) -> E2eResult<Value> {
        let script = format!(
            "(() => {{ try {{ {prelude} return JSON.stringify({{ ok: ({body}) }}); }} \
             catch (e) {{ return JSON.stringify({{ err: String(e && e.message || e) }}); }} }})()",
            prelude = PRELUDE,
            body = body,
        );

        let timeout = self.call_timeout;
        let what = format!("script on {}", subject);
        let raw = self
            .on_tab(move |tab| {
                let result = tab
                    .evaluate(&script, false)
                    .map_err(|e| tab_error(&what, timeout, e))?;
                result
                    .value
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| E2eError::Browser("evaluation returned no value".to_string()))
            })
            .await?;
        let envelope: Envelope = serde_json::from_str(&raw)?;

        match envelope.err {
            None => Ok(envelope.ok),
            Some(msg) if msg == DETACHED => Err(E2eError::interaction(
                subject,
                "element is detached from the DOM",
            )),
            Some(msg) if msg == STALE_TRANSFER => Err(E2eError::interaction(
                subject,
                "drop carries no data from this drag source",
            )),
            Some(msg) => Err(E2eError::Browser(msg)),
        }
    }

    /// Send keystrokes to the focused element
    async fn keys(
        &self,
        what: &'static str,
        send: fn(&Tab, &str) -> anyhow::Result<()>,
        input: String,
    ) -> E2eResult<()> {
        let timeout = self.call_timeout;
        self.on_tab(move |tab| {
            send(tab, &input).map_err(|e| match tab_error(what, timeout, e) {
                E2eError::Browser(reason) => E2eError::interaction("<focused element>", reason),
                other => other,
            })
        })
        .await
    }

    fn js_string(value: &str) -> String {
        // A JSON string literal is a valid JS string literal
        Value::String(value.to_string()).to_string()
    }

    fn optional_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

/// headless_chrome's wait timeout becomes a step timeout; anything else is a
/// browser failure
fn tab_error(what: &str, timeout: Duration, err: anyhow::Error) -> E2eError {
    if err.is::<WaitTimeout>() {
        E2eError::Timeout {
            what: what.to_string(),
            after_ms: timeout.as_millis() as u64,
        }
    } else {
        E2eError::Browser(format!("{}: {}", what, err))
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        let timeout = self.call_timeout;
        let target = url.to_string();
        self.on_tab(move |tab| {
            let what = format!("navigation to {}", target);
            tab.navigate_to(&target).map_err(|e| tab_error(&what, timeout, e))?;
            tab.wait_until_navigated()
                .map_err(|e| tab_error(&what, timeout, e))?;
            Ok(())
        })
        .await?;
        info!("Navigated to {}", url);
        Ok(())
    }

    async fn query(
        &self,
        scope: Option<ElementHandle>,
        selector: &Selector,
    ) -> E2eResult<Vec<ElementHandle>> {
        let root = match scope {
            Some(h) => format!("el({})", h.0),
            None => "document".to_string(),
        };
        let body = format!(
            "(sweep(), Array.from({}.querySelectorAll({})).map(idOf))",
            root,
            Self::js_string(&selector.to_css())
        );
        let ids: Vec<u64> = serde_json::from_value(self.call(&selector.to_string(), &body).await?)?;
        Ok(ids.into_iter().map(ElementHandle).collect())
    }

    async fn click(&self, handle: ElementHandle) -> E2eResult<()> {
        // Like a forced click: hidden controls are still clickable
        self.call(&handle.to_string(), &format!("(el({}).click(), null)", handle.0))
            .await?;
        Ok(())
    }

    async fn double_click(&self, handle: ElementHandle) -> E2eResult<()> {
        let body = format!(
            "el({}).dispatchEvent(new MouseEvent('dblclick', {{ bubbles: true, cancelable: true, view: window }}))",
            handle.0
        );
        self.call(&handle.to_string(), &body).await?;
        Ok(())
    }

    async fn focus(&self, handle: ElementHandle) -> E2eResult<()> {
        self.call(&handle.to_string(), &format!("(el({}).focus(), null)", handle.0))
            .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> E2eResult<()> {
        self.keys(
            "typing",
            |tab, text| tab.type_str(text).map(|_| ()),
            text.to_string(),
        )
        .await
    }

    async fn press_enter(&self) -> E2eResult<()> {
        self.keys(
            "enter",
            |tab, key| tab.press_key(key).map(|_| ()),
            "Enter".to_string(),
        )
        .await
    }

    async fn clear(&self, handle: ElementHandle) -> E2eResult<()> {
        // Go through the native setter so framework-controlled inputs notice
        let body = format!(
            "(() => {{ const e = el({}); e.focus(); \
             const d = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(e), 'value'); \
             if (d && d.set) d.set.call(e, ''); else e.value = ''; \
             e.dispatchEvent(new Event('input', {{ bubbles: true }})); return null; }})()",
            handle.0
        );
        self.call(&handle.to_string(), &body).await?;
        Ok(())
    }

    async fn drag_start(&self, source: ElementHandle) -> E2eResult<TransferId> {
        let body = format!(
            "(() => {{ const e = el({src}); const dt = new DataTransfer(); const t = R.nextTransfer++; \
             R.transfers.set(t, {{ dt, source: {src} }}); \
             e.dispatchEvent(new DragEvent('dragstart', {{ bubbles: true, cancelable: true, dataTransfer: dt }})); \
             return t; }})()",
            src = source.0
        );
        let id = self
            .call(&source.to_string(), &body)
            .await?
            .as_u64()
            .ok_or_else(|| E2eError::Browser("dragstart returned no transfer id".to_string()))?;
        Ok(TransferId(id))
    }

    async fn drop(
        &self,
        source: ElementHandle,
        target: ElementHandle,
        transfer: TransferId,
    ) -> E2eResult<()> {
        let body = format!(
            "(() => {{ const x = R.transfers.get({t}); \
             if (!x || x.source !== {src}) throw new Error('{stale}'); \
             R.transfers.delete({t}); const target = el({dst}); \
             const init = {{ bubbles: true, cancelable: true, dataTransfer: x.dt }}; \
             target.dispatchEvent(new DragEvent('dragover', init)); \
             target.dispatchEvent(new DragEvent('drop', init)); \
             const s = R.byId.get({src}); \
             if (s && s.isConnected) s.dispatchEvent(new DragEvent('dragend', init)); \
             return null; }})()",
            t = transfer.0,
            src = source.0,
            dst = target.0,
            stale = STALE_TRANSFER,
        );
        self.call(&target.to_string(), &body).await?;
        Ok(())
    }

    async fn attribute(&self, handle: ElementHandle, name: &str) -> E2eResult<Option<String>> {
        let body = format!("el({}).getAttribute({})", handle.0, Self::js_string(name));
        match self.call(&handle.to_string(), &body).await? {
            Value::String(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    async fn css_property(&self, handle: ElementHandle, name: &str) -> E2eResult<Option<String>> {
        let body = format!(
            "getComputedStyle(el({})).getPropertyValue({})",
            handle.0,
            Self::js_string(name)
        );
        Ok(Self::optional_string(self.call(&handle.to_string(), &body).await?))
    }

    async fn text(&self, handle: ElementHandle) -> E2eResult<String> {
        let body = format!("el({}).textContent", handle.0);
        Ok(self
            .call(&handle.to_string(), &body)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn screenshot(&self) -> E2eResult<Option<Vec<u8>>> {
        let timeout = self.call_timeout;
        let png = self
            .on_tab(move |tab| {
                tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                    .map_err(|e| tab_error("screenshot", timeout, e))
            })
            .await?;
        Ok(Some(png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(
            ChromeDriver::js_string(r#"[data-testid="ticket"]"#),
            r#""[data-testid=\"ticket\"]""#
        );
    }

    #[test]
    fn test_envelope_null_ok() {
        let envelope: Envelope = serde_json::from_str(r#"{"ok":null}"#).unwrap();
        assert!(envelope.ok.is_null());
        assert!(envelope.err.is_none());
    }

    #[test]
    fn test_wait_timeout_is_a_step_timeout() {
        let err = tab_error("navigation to /", Duration::from_millis(250), WaitTimeout.into());
        assert!(matches!(err, E2eError::Timeout { after_ms: 250, .. }));

        let err = tab_error("screenshot", Duration::from_millis(250), anyhow::anyhow!("closed"));
        assert!(matches!(err, E2eError::Browser(_)));
    }

    #[test]
    fn test_empty_css_value_is_absent() {
        assert_eq!(ChromeDriver::optional_string(Value::String(String::new())), None);
        assert_eq!(
            ChromeDriver::optional_string(Value::String("rgb(1, 2, 3)".into())),
            Some("rgb(1, 2, 3)".to_string())
        );
    }
}
