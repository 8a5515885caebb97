//! Browser session management.
//!
//! One headless Chrome process serves the whole batch; each site is
//! audited sequentially inside its own freshly-created browsing context
//! so cookies, cache and instrumentation globals never leak between
//! sites.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use siteaudit_core::{AuditConfig, AuditResult, CheckKind, CheckSelection, Error, Result, Site};

use crate::cdp::CdpClient;
use crate::pipeline;

/// How long to wait for the debugging endpoint after process spawn.
const DEBUGGER_READY_TIMEOUT: Duration = Duration::from_secs(15);

/// Cold-start settle after launch, so browser startup overhead does not
/// bleed into the first site's performance metrics.
const LAUNCH_SETTLE: Duration = Duration::from_millis(500);

/// A headless browser process shared by one audit batch.
pub struct Browser {
    process: Child,
    debug_port: u16,
    /// Browser-endpoint CDP client, used for target/context management.
    cdp: CdpClient,
}

/// One site's isolated browsing context and its page-level connection.
struct Window {
    cdp: CdpClient,
    target_id: String,
    context_id: String,
}

impl Browser {
    /// Launch the browser for a batch. Failure here is fatal to the
    /// whole run; no partial results are possible without a browser.
    pub async fn launch() -> Result<Self> {
        let binary = find_browser_binary().ok_or_else(|| {
            Error::Browser("no Chrome/Chromium installation found".to_string())
        })?;

        let debug_port = find_free_port().await.map_err(Error::Browser)?;
        let user_data_dir = std::env::temp_dir().join(format!("siteaudit-profile-{}", debug_port));
        std::fs::create_dir_all(&user_data_dir)?;

        let args = build_launch_args(debug_port, &user_data_dir);

        info!(binary = %binary, port = debug_port, "launching headless browser");

        let process = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("failed to launch {}: {}", binary, e)))?;

        let ws_url = wait_for_debugger_ready(debug_port, DEBUGGER_READY_TIMEOUT)
            .await
            .map_err(Error::Browser)?;

        let cdp = CdpClient::connect(&ws_url).await.map_err(Error::Browser)?;

        debug!(ws_url = %ws_url, "browser debugging connection established");

        // Let the blank startup page settle before the first site runs.
        tokio::time::sleep(LAUNCH_SETTLE).await;

        Ok(Self {
            process,
            debug_port,
            cdp,
        })
    }

    /// Audit every site sequentially, in input order. Per-site failures
    /// are captured in that site's result and never abort the batch; a
    /// tripped cancellation token drains the remaining sites with fatal
    /// entries so the output still lines up with the input.
    pub async fn run(
        &self,
        sites: &[Site],
        selection: &CheckSelection,
        config: &AuditConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<AuditResult>> {
        if selection.is_enabled(CheckKind::Screenshot) {
            tokio::fs::create_dir_all(&config.screenshot_dir).await?;
        }

        let mut results = Vec::with_capacity(sites.len());
        for (index, site) in sites.iter().enumerate() {
            if cancel.is_cancelled() {
                let mut result = AuditResult::new(site.clone());
                result.push_error("audit cancelled before this site started");
                results.push(result);
                continue;
            }

            info!(
                site = %site.domain,
                index = index + 1,
                total = sites.len(),
                "auditing site"
            );
            results.push(self.audit_site(site, selection, config, cancel).await);
        }

        Ok(results)
    }

    /// Run one site inside a fresh browsing context, bounded by the
    /// per-site deadline and the batch cancellation signal. The context
    /// is torn down before the next site starts, whatever happened.
    async fn audit_site(
        &self,
        site: &Site,
        selection: &CheckSelection,
        config: &AuditConfig,
        cancel: &CancellationToken,
    ) -> AuditResult {
        let window = match self.open_window().await {
            Ok(window) => window,
            Err(e) => {
                let mut result = AuditResult::new(site.clone());
                result.push_error(format!("failed to open browsing context: {}", e));
                return result;
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                let mut result = AuditResult::new(site.clone());
                result.push_error("audit cancelled");
                result
            }
            outcome = tokio::time::timeout(
                config.site_timeout(),
                pipeline::run_one(&window.cdp, site, selection, config),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    let mut result = AuditResult::new(site.clone());
                    result.push_error(format!(
                        "audit timed out after {}s",
                        config.site_timeout_secs
                    ));
                    result
                }
            }
        };

        self.close_window(window).await;
        result
    }

    async fn open_window(&self) -> std::result::Result<Window, String> {
        let context_id = self.cdp.create_browser_context().await?;
        let target_id = self.cdp.create_target("about:blank", &context_id).await?;

        let ws_url = page_ws_url(self.debug_port, &target_id).await?;
        let cdp = CdpClient::connect(&ws_url).await?;

        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.enable_domain("Network").await?;

        // Foreground the window so paint observers run at full fidelity.
        self.cdp.activate_target(&target_id).await?;

        Ok(Window {
            cdp,
            target_id,
            context_id,
        })
    }

    async fn close_window(&self, window: Window) {
        if let Err(e) = self.cdp.close_target(&window.target_id).await {
            debug!("failed to close target: {}", e);
        }
        if let Err(e) = self.cdp.dispose_browser_context(&window.context_id).await {
            debug!("failed to dispose browsing context: {}", e);
        }
    }

    /// Shut the browser down: graceful CDP close first, then kill.
    pub async fn close(mut self) {
        if let Err(e) = self.cdp.close_browser().await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        if let Err(e) = self.process.kill().await {
            warn!("failed to kill browser process: {}", e);
        }
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        // Best-effort kill on drop
        let _ = self.process.start_kill();
    }
}

/// Launch flags: headless, deterministic (no GPU, no cache, no
/// background networking) and quiet.
fn build_launch_args(debug_port: u16, user_data_dir: &std::path::Path) -> Vec<String> {
    vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disk-cache-size=0".to_string(),
        "--disable-background-networking".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
        "--window-size=1280,720".to_string(),
        "about:blank".to_string(),
    ]
}

/// Find a Chromium-family binary on the system.
fn find_browser_binary() -> Option<String> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    };

    for candidate in candidates {
        if std::path::Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port for the debugging endpoint.
async fn find_free_port() -> std::result::Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll `/json/version` until the debugging endpoint answers, and return
/// the browser-level WebSocket URL.
async fn wait_for_debugger_ready(
    port: u16,
    budget: Duration,
) -> std::result::Result<String, String> {
    let start = std::time::Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > budget {
            return Err(format!(
                "browser debugging endpoint not ready after {:?} on port {}",
                budget, port
            ));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Resolve a targetId to its WebSocket debugger URL via `/json/list`.
/// Retries a few times since a fresh target may not appear immediately.
async fn page_ws_url(port: u16, target_id: &str) -> std::result::Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        for target in &targets {
            if target.get("id").and_then(|v| v.as_str()) == Some(target_id) {
                if let Some(ws_url) = target
                    .get("webSocketDebuggerUrl")
                    .and_then(|v| v.as_str())
                {
                    return Ok(ws_url.to_string());
                }
            }
        }
    }

    Err(format!(
        "no WebSocket URL found for target '{}' after retries",
        target_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_disable_nondeterminism() {
        let args = build_launch_args(9222, std::path::Path::new("/tmp/profile"));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--disable-gpu".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disk-cache-size=0".to_string()));
        assert!(args.contains(&"--disable-background-networking".to_string()));
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
    }
}
