//! Low-level Chrome DevTools Protocol (CDP) client over WebSocket.
//!
//! Talks to a Chrome/Chromium instance via its debugging WebSocket
//! endpoint. Carries exactly the command surface the audit pipeline
//! needs: navigation, script injection, evaluation, device emulation,
//! cache/cookie clearing, screenshots and target management.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

/// How long a single CDP command may wait for its response.
const COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Outcome of a `Page.navigate` call.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    pub frame_id: String,
    pub loader_id: Option<String>,
    /// Set when Chrome could not start the navigation (DNS failure,
    /// connection refused, ...).
    pub error_text: Option<String>,
}

/// A CDP WebSocket client that can send commands and receive
/// responses/events. One instance per connection: either the browser
/// endpoint (target management) or a page endpoint (everything else).
pub struct CdpClient {
    /// Sender to write messages to the WebSocket.
    ws_tx: mpsc::Sender<String>,
    /// Pending command responses, keyed by request ID.
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    /// Auto-incrementing command ID.
    next_id: AtomicU64,
    /// Event listeners (domain.event -> channel).
    event_listeners: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>>,
    /// Handle to the reader task so we can abort on close.
    _reader_handle: tokio::task::JoinHandle<()>,
    /// Handle to the writer task.
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a CDP WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> Result<Self, String> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| format!("Failed to connect to CDP endpoint {}: {}", ws_url, e))?;

        let (mut ws_sink, mut ws_stream_read) = ws_stream.split();

        // Channel for outgoing messages
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        // Pending responses
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();

        // Event listeners
        let event_listeners: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let events_clone = event_listeners.clone();

        // Writer task: owns the sink, forwards messages from the channel
        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!("CDP WebSocket write error: {}", e);
                    break;
                }
            }
        });

        // Reader task: reads from the WebSocket, dispatches responses and events
        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_stream_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if let Ok(val) = serde_json::from_str::<Value>(&text) {
                            if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                                // Command response
                                let mut pending = pending_clone.lock().await;
                                if let Some(tx) = pending.remove(&id) {
                                    let _ = tx.send(val);
                                }
                            } else if let Some(method) = val.get("method").and_then(|v| v.as_str())
                            {
                                // Event
                                let listeners = events_clone.lock().await;
                                if let Some(senders) = listeners.get(method) {
                                    let params =
                                        val.get("params").cloned().unwrap_or(Value::Null);
                                    for tx in senders {
                                        let _ = tx.try_send(params.clone());
                                    }
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            event_listeners,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    /// Send a CDP command and wait for the response.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let msg = json!({
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        self.ws_tx
            .send(msg.to_string())
            .await
            .map_err(|e| format!("Failed to send CDP command: {}", e))?;

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    Err(format!("CDP error: {}", error))
                } else {
                    Ok(response.get("result").cloned().unwrap_or(Value::Null))
                }
            }
            Ok(Err(_)) => Err("CDP response channel closed".to_string()),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                Err(format!(
                    "CDP command '{}' timed out after {:?}",
                    method, COMMAND_TIMEOUT
                ))
            }
        }
    }

    /// Subscribe to a CDP event. Returns a receiver that will get event
    /// params. Subscribers must drain promptly; the reader task drops
    /// events for receivers whose buffer is full.
    pub async fn subscribe_event(&self, method: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(256);
        let mut listeners = self.event_listeners.lock().await;
        listeners
            .entry(method.to_string())
            .or_insert_with(Vec::new)
            .push(tx);
        rx
    }

    /// Enable a CDP domain (e.g. "Page", "Runtime", "Network").
    pub async fn enable_domain(&self, domain: &str) -> Result<(), String> {
        self.send_command(&format!("{}.enable", domain), json!({}))
            .await?;
        Ok(())
    }

    /// Navigate to a URL. Resolves when the navigation is committed, not
    /// when the page has finished loading.
    pub async fn navigate(&self, url: &str) -> Result<Navigation, String> {
        let result = self
            .send_command("Page.navigate", json!({"url": url}))
            .await?;

        Ok(Navigation {
            frame_id: result
                .get("frameId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            loader_id: result
                .get("loaderId")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            error_text: result
                .get("errorText")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
        })
    }

    /// Evaluate JavaScript in the page context and return the value.
    /// A thrown exception is an error, not a value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, String> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .or_else(|| details.get("text").and_then(|v| v.as_str()))
                .unwrap_or("unknown evaluation exception");
            return Err(format!("Evaluation failed: {}", text));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Register a script to run in every new document before any of the
    /// page's own scripts. Instrumentation must be installed this way so
    /// it observes the site's own load.
    pub async fn add_init_script(&self, source: &str) -> Result<(), String> {
        self.send_command(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({"source": source}),
        )
        .await?;
        Ok(())
    }

    /// Override device metrics (viewport, scale factor, mobile flag).
    pub async fn set_device_metrics(
        &self,
        width: i64,
        height: i64,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), String> {
        self.send_command(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": device_scale_factor,
                "mobile": mobile,
            }),
        )
        .await?;
        Ok(())
    }

    /// Override the user agent string.
    pub async fn set_user_agent(&self, user_agent: &str) -> Result<(), String> {
        self.send_command(
            "Emulation.setUserAgentOverride",
            json!({"userAgent": user_agent}),
        )
        .await?;
        Ok(())
    }

    /// Toggle touch event emulation.
    pub async fn set_touch_emulation(&self, enabled: bool) -> Result<(), String> {
        self.send_command(
            "Emulation.setTouchEmulationEnabled",
            json!({"enabled": enabled}),
        )
        .await?;
        Ok(())
    }

    /// Toggle the browser cache for this page.
    pub async fn set_cache_disabled(&self, disabled: bool) -> Result<(), String> {
        self.send_command("Network.setCacheDisabled", json!({"cacheDisabled": disabled}))
            .await?;
        Ok(())
    }

    /// Clear the browser cache.
    pub async fn clear_browser_cache(&self) -> Result<(), String> {
        self.send_command("Network.clearBrowserCache", json!({}))
            .await?;
        Ok(())
    }

    /// Clear browser cookies.
    pub async fn clear_browser_cookies(&self) -> Result<(), String> {
        self.send_command("Network.clearBrowserCookies", json!({}))
            .await?;
        Ok(())
    }

    /// Take a screenshot and return base64-encoded PNG data.
    pub async fn capture_screenshot(&self, full_page: bool) -> Result<String, String> {
        let mut params = json!({"format": "png"});
        if full_page {
            params["captureBeyondViewport"] = json!(true);
        }
        let result = self.send_command("Page.captureScreenshot", params).await?;
        result
            .get("data")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| "No screenshot data returned".to_string())
    }

    // ─── Target / context management (browser endpoint) ───────────────

    /// Create an isolated browsing context (its own cookies, cache and
    /// storage), akin to an incognito window.
    pub async fn create_browser_context(&self) -> Result<String, String> {
        let result = self
            .send_command("Target.createBrowserContext", json!({}))
            .await?;
        result
            .get("browserContextId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| "No browserContextId returned".to_string())
    }

    /// Dispose a browsing context and everything in it.
    pub async fn dispose_browser_context(&self, context_id: &str) -> Result<(), String> {
        self.send_command(
            "Target.disposeBrowserContext",
            json!({"browserContextId": context_id}),
        )
        .await?;
        Ok(())
    }

    /// Create a new page target inside a browsing context.
    pub async fn create_target(&self, url: &str, context_id: &str) -> Result<String, String> {
        let result = self
            .send_command(
                "Target.createTarget",
                json!({"url": url, "browserContextId": context_id}),
            )
            .await?;
        result
            .get("targetId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| "No targetId returned from createTarget".to_string())
    }

    /// Close a target by its targetId.
    pub async fn close_target(&self, target_id: &str) -> Result<(), String> {
        self.send_command("Target.closeTarget", json!({"targetId": target_id}))
            .await?;
        Ok(())
    }

    /// Activate (bring to front) a target by its targetId.
    pub async fn activate_target(&self, target_id: &str) -> Result<(), String> {
        self.send_command("Target.activateTarget", json!({"targetId": target_id}))
            .await?;
        Ok(())
    }

    /// Ask the browser process to shut down cleanly.
    pub async fn close_browser(&self) -> Result<(), String> {
        self.send_command("Browser.close", json!({})).await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._reader_handle.abort();
        self._writer_handle.abort();
    }
}
