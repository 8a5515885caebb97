//! Per-site check pipeline.
//!
//! Runs the enabled checks against one isolated browsing context in a
//! fixed order, short-circuiting on fatal navigation failure and
//! assembling a partial-failure-tolerant [`AuditResult`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use siteaudit_core::{AuditConfig, AuditResult, CheckKind, CheckSelection, CheckValue, Site};

use crate::cdp::CdpClient;
use crate::idle::{self, IdleOutcome};
use crate::scripts;

/// Settle delay after opening a fresh window, before instrumentation.
const WINDOW_SETTLE: Duration = Duration::from_millis(200);

/// Budget for the post-navigation `body` existence wait.
const BODY_WAIT: Duration = Duration::from_secs(10);

/// Fixed mobile emulation profile applied to every site.
const MOBILE_VIEWPORT_WIDTH: i64 = 390;
const MOBILE_VIEWPORT_HEIGHT: i64 = 844;
const MOBILE_SCALE_FACTOR: f64 = 3.0;
const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";

/// Headers every production site should send on its main document, in
/// reporting order.
const REQUIRED_SECURITY_HEADERS: [&str; 6] = [
    "Content-Security-Policy",
    "Strict-Transport-Security",
    "X-Content-Type-Options",
    "X-Frame-Options",
    "Permissions-Policy",
    "Referrer-Policy",
];

static UNSAFE_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[:/\\]").expect("valid pattern"));

/// Run all enabled checks for one site inside an already-isolated
/// browsing context. Never returns an error: every failure mode lands in
/// the result's `audit_errors`.
pub async fn run_one(
    cdp: &CdpClient,
    site: &Site,
    selection: &CheckSelection,
    config: &AuditConfig,
) -> AuditResult {
    let mut result = AuditResult::new(site.clone());

    // Fresh window: settle on a blank page so window cold-start does not
    // bleed into the site's load metrics.
    if let Err(e) = cdp.navigate("about:blank").await {
        result.push_error(format!("failed to initialise window: {}", e));
        return result;
    }
    tokio::time::sleep(WINDOW_SETTLE).await;

    // Instrumentation goes in before navigation so it observes the
    // site's own load.
    let mut init_script = String::new();
    if selection.is_enabled(CheckKind::Lcp) {
        init_script.push_str(scripts::LCP_OBSERVER_SCRIPT);
        init_script.push('\n');
    }
    if selection.is_enabled(CheckKind::ConsoleErrors) || selection.is_enabled(CheckKind::RequestErrors)
    {
        init_script.push_str(scripts::ERROR_CAPTURE_SCRIPT);
        init_script.push('\n');
    }
    if !init_script.is_empty() {
        if let Err(e) = cdp.add_init_script(&init_script).await {
            result.push_error(format!("failed to inject instrumentation: {}", e));
            return result;
        }
    }

    if let Err(e) = emulate_mobile_device(cdp).await {
        result.push_error(format!("failed to apply device emulation: {}", e));
        return result;
    }

    // Every site is measured cold, independent of what ran before it.
    if let Err(e) = reset_browsing_state(cdp).await {
        result.push_error(format!("failed to clear cache/cookies: {}", e));
        return result;
    }

    // Watchers must attach before navigation starts.
    let mut network_events = idle::watch_network(cdp).await;
    let main_doc = MainDocumentWatch::attach(cdp).await;

    // With the secure check enabled we approach over plain http to
    // observe whether the site upgrades the connection.
    let nav_url = if selection.is_enabled(CheckKind::Secure) {
        site.forced_http_url()
    } else {
        site.url()
    };

    let navigation = match cdp.navigate(&nav_url).await {
        Ok(nav) => nav,
        Err(e) => {
            result.push_error(format!("failed to navigate to {}: {}", nav_url, e));
            return result;
        }
    };
    if let Some(error_text) = &navigation.error_text {
        result.push_error(format!("navigation to {} failed: {}", nav_url, error_text));
        return result;
    }

    if !wait_for_body(cdp, BODY_WAIT).await {
        warn!(site = %site.domain, "body did not appear within {:?}", BODY_WAIT);
    }

    match idle::wait_for_idle(&mut network_events, &config.idle).await {
        IdleOutcome::Idle => {}
        IdleOutcome::StaticPage => {
            // No dynamic loading observed; a DOM-ready check is all the
            // settling a static page needs.
            let _ = cdp.evaluate("document.readyState").await;
        }
        IdleOutcome::TimedOut => {
            warn!(site = %site.domain, "network never went idle within {:?}", config.idle.max_wait());
            if config.idle.fail_on_timeout {
                result.push_error(format!(
                    "network idle not reached within {}ms",
                    config.idle.max_wait_ms
                ));
                return result;
            }
        }
    }
    tokio::time::sleep(config.settle_delay()).await;

    // Fatal-failure checkpoint: a missing or error-status main document
    // aborts the remaining checks for this site.
    let document = main_doc
        .main_document(navigation.loader_id.as_deref())
        .await;
    let document = match document {
        Some(doc) if doc.status >= 400 => {
            result.push_error(format!("main document returned status {}", doc.status));
            return result;
        }
        Some(doc) => doc,
        None => {
            result.push_error("no main document response observed".to_string());
            return result;
        }
    };

    // Pure header inspection, independent of in-page evaluation.
    if selection.is_enabled(CheckKind::SecurityHeaders) {
        result.record(
            CheckKind::SecurityHeaders,
            CheckValue::Findings(missing_security_headers(&document.headers)),
        );
    }

    if selection.is_enabled(CheckKind::Secure) {
        match cdp.evaluate("window.location.protocol === 'https:'").await {
            Ok(value) => result.record(
                CheckKind::Secure,
                CheckValue::Flag(value.as_bool().unwrap_or(false)),
            ),
            Err(e) => {
                result.push_error(format!("secure check failed: {}", e));
                return result;
            }
        }
    }

    if selection.is_enabled(CheckKind::Lcp) {
        match cdp.evaluate("window.__audit_lcp || 0").await {
            Ok(value) => result.record(
                CheckKind::Lcp,
                CheckValue::Millis(value.as_f64().unwrap_or(0.0)),
            ),
            Err(e) => {
                result.push_error(format!("LCP check failed: {}", e));
                return result;
            }
        }
    }

    let mut responsive_issue_count = 0;
    if selection.is_enabled(CheckKind::Responsive) {
        match cdp.evaluate(scripts::RESPONSIVE_AUDIT_SCRIPT).await {
            Ok(value) => {
                let (findings, count) = format_responsive_findings(&value);
                responsive_issue_count = count;
                result.record(CheckKind::Responsive, CheckValue::Findings(findings));
            }
            Err(e) => {
                result.push_error(format!("responsiveness check failed: {}", e));
                return result;
            }
        }
    }

    if selection.is_enabled(CheckKind::ConsoleErrors) {
        match eval_string_list(cdp, "window.__audit_console_errors || []").await {
            Ok(findings) => result.record(CheckKind::ConsoleErrors, CheckValue::Findings(findings)),
            Err(e) => {
                result.push_error(format!("console error check failed: {}", e));
                return result;
            }
        }
    }

    if selection.is_enabled(CheckKind::RequestErrors) {
        match eval_string_list(cdp, "window.__audit_request_errors || []").await {
            Ok(findings) => result.record(CheckKind::RequestErrors, CheckValue::Findings(findings)),
            Err(e) => {
                result.push_error(format!("request error check failed: {}", e));
                return result;
            }
        }
    }

    let mut form_issue_count = 0;
    if selection.is_enabled(CheckKind::Forms) {
        match eval_string_list(cdp, scripts::FORM_AUDIT_SCRIPT).await {
            Ok(findings) => {
                form_issue_count = findings.len();
                result.record(CheckKind::Forms, CheckValue::Findings(findings));
            }
            Err(e) => {
                result.push_error(format!("form check failed: {}", e));
                return result;
            }
        }
    }

    if selection.is_enabled(CheckKind::TechStack) {
        if should_run_tech_stack(
            selection.important_mode(),
            responsive_issue_count,
            form_issue_count,
        ) {
            match eval_string_list(cdp, scripts::TECH_STACK_SCRIPT).await {
                Ok(findings) => result.record(CheckKind::TechStack, CheckValue::Findings(findings)),
                Err(e) => {
                    result.push_error(format!("tech stack check failed: {}", e));
                    return result;
                }
            }
        } else {
            debug!(site = %site.domain, "site looks healthy, skipping tech stack detection");
            result.record(CheckKind::TechStack, CheckValue::Findings(Vec::new()));
        }
    }

    if selection.is_enabled(CheckKind::Screenshot) {
        match save_screenshot(cdp, &config.screenshot_dir, &site.domain).await {
            Ok(path) => {
                debug!(site = %site.domain, path = %path, "screenshot saved");
                result.record(CheckKind::Screenshot, CheckValue::Flag(true));
            }
            Err(e) => {
                result.push_error(format!("screenshot failed: {}", e));
                result.record(CheckKind::Screenshot, CheckValue::Flag(false));
            }
        }
    }

    result
}

/// Apply the fixed mobile device profile: viewport, user agent, touch.
async fn emulate_mobile_device(cdp: &CdpClient) -> Result<(), String> {
    cdp.set_device_metrics(
        MOBILE_VIEWPORT_WIDTH,
        MOBILE_VIEWPORT_HEIGHT,
        MOBILE_SCALE_FACTOR,
        true,
    )
    .await?;
    cdp.set_user_agent(MOBILE_USER_AGENT).await?;
    cdp.set_touch_emulation(true).await?;
    Ok(())
}

async fn reset_browsing_state(cdp: &CdpClient) -> Result<(), String> {
    cdp.set_cache_disabled(true).await?;
    cdp.clear_browser_cache().await?;
    cdp.clear_browser_cookies().await?;
    Ok(())
}

/// Poll until `document.body` exists or the budget runs out.
async fn wait_for_body(cdp: &CdpClient, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if let Ok(Value::Bool(true)) = cdp.evaluate("!!document.body").await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn eval_string_list(cdp: &CdpClient, expression: &str) -> Result<Vec<String>, String> {
    let value = cdp.evaluate(expression).await?;
    Ok(string_list(&value))
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Flatten the responsive audit's `{ issues, score }` payload into
/// report findings with a trailing score line, and return how many real
/// issues (score line excluded) were found.
fn format_responsive_findings(value: &Value) -> (Vec<String>, usize) {
    let mut findings = value
        .get("issues")
        .map(string_list)
        .unwrap_or_default();
    let count = findings.len();

    let score = value
        .get("score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .round() as i64;
    findings.push(format!("Score: {} ({})", score, score_band(score)));

    (findings, count)
}

/// Qualitative band for a responsiveness score.
fn score_band(score: i64) -> &'static str {
    if score >= 75 {
        "Good"
    } else if score >= 60 {
        "Minor"
    } else if score >= 45 {
        "Major"
    } else {
        "Critical"
    }
}

/// Required headers absent from the main-document response, compared
/// case-insensitively, in the fixed reporting order.
fn missing_security_headers(headers: &HashMap<String, String>) -> Vec<String> {
    let present: Vec<String> = headers.keys().map(|k| k.to_lowercase()).collect();
    REQUIRED_SECURITY_HEADERS
        .iter()
        .filter(|required| !present.iter().any(|h| h == &required.to_lowercase()))
        .map(|required| required.to_string())
        .collect()
}

/// The tech-stack check is the most expensive and noisiest one. In
/// important mode it only runs when the cheaper checks already flagged
/// something worth following up on.
fn should_run_tech_stack(
    important_mode: bool,
    responsive_issue_count: usize,
    form_issue_count: usize,
) -> bool {
    !important_mode || responsive_issue_count > 0 || form_issue_count > 0
}

/// Filesystem-safe screenshot name derived from the domain.
fn safe_file_name(domain: &str) -> String {
    UNSAFE_PATH_CHARS.replace_all(domain, "_").into_owned()
}

async fn save_screenshot(cdp: &CdpClient, dir: &Path, domain: &str) -> Result<String, String> {
    let data = cdp.capture_screenshot(true).await?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| format!("invalid screenshot payload: {}", e))?;

    let path = dir.join(format!("{}.png", safe_file_name(domain)));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;

    Ok(path.display().to_string())
}

/// Main-document response (status + headers), captured from the network
/// event stream. Sub-frame documents are recorded too; the navigation's
/// loader id picks out the right one.
#[derive(Debug, Clone)]
pub struct DocumentResponse {
    pub status: i64,
    pub headers: HashMap<String, String>,
    loader_id: Option<String>,
}

struct MainDocumentWatch {
    responses: Arc<Mutex<Vec<DocumentResponse>>>,
    task: tokio::task::JoinHandle<()>,
}

impl MainDocumentWatch {
    async fn attach(cdp: &CdpClient) -> Self {
        let mut rx = cdp.subscribe_event("Network.responseReceived").await;
        let responses: Arc<Mutex<Vec<DocumentResponse>>> = Arc::new(Mutex::new(Vec::new()));
        let store = responses.clone();

        let task = tokio::spawn(async move {
            while let Some(params) = rx.recv().await {
                if params.get("type").and_then(|v| v.as_str()) != Some("Document") {
                    continue;
                }
                let Some(response) = params.get("response") else {
                    continue;
                };

                let status = response.get("status").and_then(|v| v.as_i64()).unwrap_or(0);
                let headers = response
                    .get("headers")
                    .and_then(|v| v.as_object())
                    .map(|map| {
                        map.iter()
                            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                let loader_id = params
                    .get("loaderId")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                store.lock().await.push(DocumentResponse {
                    status,
                    headers,
                    loader_id,
                });
            }
        });

        Self { responses, task }
    }

    /// The response for the top-level navigation: matched by loader id
    /// when known, otherwise the first document response seen.
    async fn main_document(&self, loader_id: Option<&str>) -> Option<DocumentResponse> {
        let responses = self.responses.lock().await;
        if let Some(wanted) = loader_id {
            if let Some(doc) = responses
                .iter()
                .find(|d| d.loader_id.as_deref() == Some(wanted))
            {
                return Some(doc.clone());
            }
        }
        responses.first().cloned()
    }
}

impl Drop for MainDocumentWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(names: &[&str]) -> HashMap<String, String> {
        names
            .iter()
            .map(|n| (n.to_string(), "x".to_string()))
            .collect()
    }

    #[test]
    fn test_missing_headers_in_fixed_order() {
        let present = headers(&[
            "content-security-policy",
            "X-Content-Type-Options",
            "permissions-policy",
            "Referrer-Policy",
        ]);
        assert_eq!(
            missing_security_headers(&present),
            vec!["Strict-Transport-Security", "X-Frame-Options"]
        );
    }

    #[test]
    fn test_all_headers_present_case_insensitively() {
        let present = headers(&[
            "CONTENT-SECURITY-POLICY",
            "strict-transport-security",
            "x-content-type-options",
            "x-frame-options",
            "permissions-policy",
            "referrer-policy",
        ]);
        assert!(missing_security_headers(&present).is_empty());
    }

    #[test]
    fn test_tech_stack_gate() {
        // Full mode always runs the check.
        assert!(should_run_tech_stack(false, 0, 0));
        // Important mode skips it on a clean site.
        assert!(!should_run_tech_stack(true, 0, 0));
        assert!(should_run_tech_stack(true, 1, 0));
        assert!(should_run_tech_stack(true, 0, 2));
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(score_band(100), "Good");
        assert_eq!(score_band(75), "Good");
        assert_eq!(score_band(60), "Minor");
        assert_eq!(score_band(45), "Major");
        assert_eq!(score_band(10), "Critical");
    }

    #[test]
    fn test_responsive_findings_keep_issue_count() {
        let payload = json!({
            "issues": ["No viewport meta tag", "Has small text"],
            "score": 61.0,
        });
        let (findings, count) = format_responsive_findings(&payload);
        assert_eq!(count, 2);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[2], "Score: 61 (Minor)");

        let clean = json!({"issues": [], "score": 100.0});
        let (findings, count) = format_responsive_findings(&clean);
        assert_eq!(count, 0);
        assert_eq!(findings, vec!["Score: 100 (Good)"]);
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("example.com"), "example.com");
        assert_eq!(safe_file_name("example.com:8080"), "example.com_8080");
        assert_eq!(safe_file_name("a/b\\c"), "a_b_c");
    }
}
