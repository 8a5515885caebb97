//! Network-idle detection.
//!
//! Approximates "page has finished loading" without a browser-native
//! completion signal. Tracks in-flight requests from a network event
//! stream and resolves when the network has been quiet for a full quiet
//! period, when the page turns out to be static, or when the overall
//! wait budget runs out, whichever deadline comes first.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use siteaudit_core::IdleConfig;

use crate::cdp::CdpClient;
use crate::filter::is_ignored_resource;

/// One network lifecycle event, as seen by the idle detector. Produced
/// by [`watch_network`] in production and by hand in tests.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    RequestStarted { id: String, url: String },
    RequestFinished { id: String },
    RequestFailed { id: String },
}

/// How an idle wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// No tracked request was in flight for the full quiet period.
    Idle,
    /// No trackable request was ever observed; the page loads without
    /// dynamic fetches. Callers should fall back to a DOM-ready check.
    StaticPage,
    /// The wait budget elapsed with requests still in flight. Soft by
    /// default: callers sample whatever state the page is in.
    TimedOut,
}

/// Bridge the page's CDP network events into a [`NetworkEvent`] stream.
///
/// Must be called before navigation so the main document request itself
/// is observed. The spawned task ends when the CDP connection closes or
/// the returned receiver is dropped.
pub async fn watch_network(cdp: &CdpClient) -> mpsc::Receiver<NetworkEvent> {
    let mut started = cdp.subscribe_event("Network.requestWillBeSent").await;
    let mut finished = cdp.subscribe_event("Network.loadingFinished").await;
    let mut failed = cdp.subscribe_event("Network.loadingFailed").await;

    let (tx, rx) = mpsc::channel(256);

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(params) = started.recv() => {
                    let id = request_id(&params);
                    let url = params
                        .get("request")
                        .and_then(|r| r.get("url"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    NetworkEvent::RequestStarted { id, url }
                }
                Some(params) = finished.recv() => {
                    NetworkEvent::RequestFinished { id: request_id(&params) }
                }
                Some(params) = failed.recv() => {
                    NetworkEvent::RequestFailed { id: request_id(&params) }
                }
                else => break,
            };

            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    rx
}

fn request_id(params: &serde_json::Value) -> String {
    params
        .get("requestId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Wait until the page's network activity settles.
///
/// State machine over the event stream:
/// - a non-ignored request starting disarms the static-page fallback,
///   cancels any running quiet-period timer and joins the in-flight set;
/// - a request finishing or failing leaves the in-flight set, and the
///   quiet-period timer (re)starts once the set is empty;
/// - the wait resolves at the earliest of the armed deadlines: quiet
///   period elapsed ([`IdleOutcome::Idle`]), static fallback elapsed with
///   no traffic seen ([`IdleOutcome::StaticPage`]), or the max-wait
///   budget ([`IdleOutcome::TimedOut`]).
pub async fn wait_for_idle(
    events: &mut mpsc::Receiver<NetworkEvent>,
    config: &IdleConfig,
) -> IdleOutcome {
    let started_at = Instant::now();
    let max_deadline = started_at + config.max_wait();
    let static_deadline = started_at + config.static_fallback();

    let mut in_flight: HashMap<String, String> = HashMap::new();
    let mut saw_traffic = false;
    let mut quiet_deadline: Option<Instant> = None;
    let mut events_closed = false;

    loop {
        // The next wake-up is the earliest of the deadlines currently armed.
        let next_deadline = [
            Some(max_deadline),
            (!saw_traffic).then_some(static_deadline),
            quiet_deadline.filter(|_| in_flight.is_empty()),
        ]
        .into_iter()
        .flatten()
        .min()
        .expect("max deadline is always armed");

        tokio::select! {
            event = events.recv(), if !events_closed => match event {
                Some(NetworkEvent::RequestStarted { id, url }) => {
                    if is_ignored_resource(&url) {
                        trace!(url = %url, "ignoring background resource");
                        continue;
                    }
                    saw_traffic = true;
                    quiet_deadline = None;
                    in_flight.insert(id, url);
                }
                Some(NetworkEvent::RequestFinished { id })
                | Some(NetworkEvent::RequestFailed { id }) => {
                    in_flight.remove(&id);
                    if in_flight.is_empty() {
                        quiet_deadline = Some(Instant::now() + config.quiet_period());
                    }
                }
                None => {
                    // Event source gone (connection closed); keep waiting
                    // on the timers alone.
                    events_closed = true;
                }
            },
            _ = tokio::time::sleep_until(next_deadline) => {
                let now = Instant::now();
                if quiet_deadline.is_some_and(|d| now >= d) && in_flight.is_empty() {
                    debug!(elapsed = ?started_at.elapsed(), "network idle reached");
                    return IdleOutcome::Idle;
                }
                if !saw_traffic && now >= static_deadline {
                    debug!("no trackable requests observed, treating page as static");
                    return IdleOutcome::StaticPage;
                }
                if now >= max_deadline {
                    debug!(in_flight = in_flight.len(), "idle wait budget exhausted");
                    return IdleOutcome::TimedOut;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> IdleConfig {
        IdleConfig {
            quiet_period_ms: 2_000,
            max_wait_ms: 10_000,
            static_fallback_ms: 1_000,
            fail_on_timeout: false,
        }
    }

    fn started(id: &str, url: &str) -> NetworkEvent {
        NetworkEvent::RequestStarted {
            id: id.to_string(),
            url: url.to_string(),
        }
    }

    fn finished(id: &str) -> NetworkEvent {
        NetworkEvent::RequestFinished { id: id.to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_after_single_request_completes() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(started("1", "https://example.com/app.js")).await.unwrap();
        tx.send(finished("1")).await.unwrap();

        let begin = Instant::now();
        let outcome = wait_for_idle(&mut rx, &config()).await;

        assert_eq!(outcome, IdleOutcome::Idle);
        // Quiet period, well before the max-wait budget.
        assert!(begin.elapsed() < Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_page_resolves_at_fallback_delay() {
        let (_tx, mut rx) = mpsc::channel::<NetworkEvent>(16);

        let begin = Instant::now();
        let outcome = wait_for_idle(&mut rx, &config()).await;

        assert_eq!(outcome, IdleOutcome::StaticPage);
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed < Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_times_out_at_max_wait() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(started("1", "https://example.com/slow")).await.unwrap();

        let begin = Instant::now();
        let outcome = wait_for_idle(&mut rx, &config()).await;

        assert_eq!(outcome, IdleOutcome::TimedOut);
        assert!(begin.elapsed() >= Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_resources_do_not_disarm_static_fallback() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(started("1", "https://www.google-analytics.com/collect"))
            .await
            .unwrap();
        tx.send(started("2", "blob:https://example.com/abc"))
            .await
            .unwrap();

        let outcome = wait_for_idle(&mut rx, &config()).await;
        assert_eq!(outcome, IdleOutcome::StaticPage);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_resets_quiet_period() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(started("1", "https://example.com/a.js")).await.unwrap();
        tx.send(finished("1")).await.unwrap();

        let cfg = config();
        let handle = tokio::spawn(async move {
            let begin = Instant::now();
            let outcome = wait_for_idle(&mut rx, &cfg).await;
            (outcome, begin.elapsed())
        });

        // Midway through the quiet period a second request starts, then
        // finishes; idleness must be measured from the second completion.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        tx.send(started("2", "https://example.com/b.js")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(finished("2")).await.unwrap();

        let (outcome, elapsed) = handle.await.unwrap();
        assert_eq!(outcome, IdleOutcome::Idle);
        assert!(elapsed >= Duration::from_millis(3_500));
        assert!(elapsed < Duration::from_millis(4_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_event_source_still_times_out() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send(started("1", "https://example.com/slow")).await.unwrap();
        drop(tx);

        let outcome = wait_for_idle(&mut rx, &config()).await;
        assert_eq!(outcome, IdleOutcome::TimedOut);
    }
}
