//! Browser control boundary.
//!
//! [`BrowserControl`] is the narrow seam between the collector loop and a
//! live browser: navigate, query feed items, evaluate scripts, scroll, and
//! reload. The production implementation speaks CDP over the websocket
//! endpoint the launcher reported; tests substitute scripted fakes.

use std::time::Duration;

use {
    async_trait::async_trait,
    chromiumoxide::{Browser, Page, handler::HandlerConfig},
    futures::StreamExt,
    serde::{Deserialize, Serialize},
    tracing::{debug, trace},
};

use crate::error::SessionError;

/// A feed item found on the page.
///
/// The payload is captured at query time (text, links, timestamps, labels),
/// so extraction downstream never has to reach back into the live page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Stable per-page reference, tagged onto the DOM node.
    pub node_ref: u32,
    /// Raw content captured from the node.
    pub payload: serde_json::Value,
}

/// Operations the collector needs from a browser session.
#[async_trait]
pub trait BrowserControl: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// Find all elements matching `selector`, tagging each with a stable
    /// reference and capturing its content payload.
    async fn query_all(&self, selector: &str) -> Result<Vec<NodeHandle>, SessionError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SessionError>;

    async fn scroll_by(&self, delta_y: i64) -> Result<(), SessionError>;

    async fn reload(&self) -> Result<(), SessionError>;
}

/// Tags matching elements with `data-gleaner-ref` and returns their content.
/// References survive re-queries, so the same node always yields the same ref.
const QUERY_NODES_JS: &str = r#"
((selector) => {
    let next = window.__gleanerNextRef || 1;
    const out = [];
    for (const el of document.querySelectorAll(selector)) {
        let ref = el.dataset.gleanerRef;
        if (!ref) {
            ref = String(next++);
            el.dataset.gleanerRef = ref;
        }
        const time = el.querySelector('time');
        out.push({
            ref: Number(ref),
            text: el.innerText || '',
            links: Array.from(el.querySelectorAll('a[href]'))
                .map((a) => a.getAttribute('href'))
                .filter((h) => h),
            datetime: time ? time.getAttribute('datetime') : null,
            labels: Array.from(el.querySelectorAll('[aria-label]'))
                .map((n) => n.getAttribute('aria-label'))
                .slice(0, 8),
        });
    }
    window.__gleanerNextRef = next;
    return out;
})
"#;

/// CDP-backed implementation of [`BrowserControl`].
pub struct CdpControl {
    // Dropping the browser handle tears down the CDP connection, so it is
    // kept alive for the lifetime of the control.
    _browser: Browser,
    page: Page,
    timeout: Duration,
}

impl CdpControl {
    /// Connect to a browser's remote-debugging websocket and take over its
    /// first page (creating one when the browser has none).
    pub async fn connect(ws_url: &str, timeout: Duration) -> Result<Self, SessionError> {
        let handler_config = HandlerConfig {
            request_timeout: timeout,
            ..Default::default()
        };
        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| {
                SessionError::Unavailable(format!("failed to connect to browser at {ws_url}: {e}"))
            })?;

        // Drain browser events; the handler exits when the connection closes.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                trace!(?event, "browser event");
            }
            debug!("browser event handler exited");
        });

        let page = match browser.pages().await?.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };

        Ok(Self {
            _browser: browser,
            page,
            timeout,
        })
    }

    async fn with_timeout<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T, SessionError>> + Send,
    ) -> Result<T, SessionError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| SessionError::Timeout(format!("{op} exceeded {:?}", self.timeout)))?
    }
}

#[async_trait]
impl BrowserControl for CdpControl {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.with_timeout("navigate", async {
            self.page
                .goto(url)
                .await
                .map_err(|e| SessionError::NavigationFailed(e.to_string()))?;
            let _ = self.page.wait_for_navigation().await;
            Ok(())
        })
        .await?;
        debug!(url, "navigated");
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<NodeHandle>, SessionError> {
        let selector_json = serde_json::to_string(selector)
            .map_err(|e| SessionError::JsEvalFailed(e.to_string()))?;
        let script = format!("({QUERY_NODES_JS})({selector_json})");

        let value = self.evaluate(&script).await?;
        let raw: Vec<serde_json::Value> = serde_json::from_value(value)
            .map_err(|e| SessionError::JsEvalFailed(format!("unexpected query result: {e}")))?;

        let mut handles = Vec::with_capacity(raw.len());
        for payload in raw {
            let node_ref = payload
                .get("ref")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    SessionError::JsEvalFailed("query result missing node ref".to_string())
                })? as u32;
            handles.push(NodeHandle { node_ref, payload });
        }
        Ok(handles)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SessionError> {
        self.with_timeout("evaluate", async {
            let result = self
                .page
                .evaluate(script)
                .await
                .map_err(|e| SessionError::JsEvalFailed(e.to_string()))?;
            result
                .into_value()
                .map_err(|e| SessionError::JsEvalFailed(e.to_string()))
        })
        .await
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<(), SessionError> {
        let script =
            format!("window.scrollBy({{ top: {delta_y}, left: 0, behavior: 'instant' }}); true");
        self.evaluate(&script).await?;
        trace!(delta_y, "scrolled");
        Ok(())
    }

    async fn reload(&self) -> Result<(), SessionError> {
        self.with_timeout("reload", async {
            self.page
                .reload()
                .await
                .map_err(|e| SessionError::NavigationFailed(format!("reload: {e}")))?;
            Ok(())
        })
        .await?;
        debug!("page reloaded");
        Ok(())
    }
}
