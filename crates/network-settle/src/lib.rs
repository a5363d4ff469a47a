//! Quiescence detection over a page's network/page debug-event stream.
//!
//! The detector consumes normalized [`NetworkEvent`]s fanned out by the CDP
//! adapter (one broadcast sender per page covering the top frame and every
//! auto-attached same-page target) and resolves when no non-streaming request
//! has been in flight for the quiet window, or at the hard deadline.
//!
//! Each call to [`wait_for_settled`] is an independent guard: several waits
//! on the same page coexist by subscribing their own receivers to the shared
//! sender. Dropping the receiver at return is what unsubscribes, so no
//! handler can outlive a resolved wait.

pub mod config;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub use config::SettleConfig;

/// Normalized network/page events consumed by the detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NetworkEvent {
    RequestWillBeSent {
        request_id: String,
        url: String,
        resource_type: String,
        frame_id: Option<String>,
        is_document: bool,
    },
    ResponseReceived {
        request_id: String,
        url: String,
    },
    LoadingFinished {
        request_id: String,
    },
    LoadingFailed {
        request_id: String,
    },
    ServedFromCache {
        request_id: String,
    },
    FrameStoppedLoading {
        frame_id: String,
    },
}

/// How a wait ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettleOutcome {
    /// True when the quiet window elapsed; false when the hard deadline fired
    /// first. The deadline path is not an error.
    pub quiet: bool,
    /// Requests still tracked as in flight at resolution.
    pub pending: usize,
}

#[derive(Debug)]
struct RequestMeta {
    url: String,
    started: Instant,
}

/// In-flight bookkeeping, separated from the event loop so the transition
/// rules stay unit-testable without timers.
#[derive(Debug, Default)]
struct InflightLedger {
    meta: HashMap<String, RequestMeta>,
    doc_by_frame: HashMap<String, String>,
}

impl InflightLedger {
    /// Apply one event. Returns true when the set of in-flight requests may
    /// have changed in a way that affects quietness.
    fn apply(&mut self, event: &NetworkEvent, now: Instant) -> bool {
        match event {
            NetworkEvent::RequestWillBeSent {
                request_id,
                url,
                resource_type,
                frame_id,
                is_document,
            } => {
                if matches!(resource_type.as_str(), "WebSocket" | "EventSource") {
                    return false;
                }
                self.meta.insert(
                    request_id.clone(),
                    RequestMeta {
                        url: url.clone(),
                        started: now,
                    },
                );
                if *is_document {
                    if let Some(frame) = frame_id {
                        self.doc_by_frame.insert(frame.clone(), request_id.clone());
                    }
                }
                true
            }
            NetworkEvent::ResponseReceived { request_id, url } => {
                // data: URLs never produce loadingFinished; treat the
                // response as completion.
                if url.starts_with("data:") {
                    self.complete(request_id)
                } else {
                    false
                }
            }
            NetworkEvent::LoadingFinished { request_id }
            | NetworkEvent::LoadingFailed { request_id }
            | NetworkEvent::ServedFromCache { request_id } => self.complete(request_id),
            NetworkEvent::FrameStoppedLoading { frame_id } => {
                // Covers iframes whose network events never close out.
                if let Some(request_id) = self.doc_by_frame.remove(frame_id) {
                    self.complete(&request_id)
                } else {
                    false
                }
            }
        }
    }

    fn complete(&mut self, request_id: &str) -> bool {
        let removed = self.meta.remove(request_id).is_some();
        if removed {
            self.doc_by_frame.retain(|_, pending| pending != request_id);
        }
        removed
    }

    /// Drop requests older than `stall_age`, logging each expiry.
    fn sweep(&mut self, now: Instant, stall_age: Duration) -> bool {
        let stalled: Vec<(String, String)> = self
            .meta
            .iter()
            .filter(|(_, meta)| now.saturating_duration_since(meta.started) >= stall_age)
            .map(|(id, meta)| (id.clone(), meta.url.clone()))
            .collect();
        for (request_id, url) in &stalled {
            warn!(
                target: "network-settle",
                request_id = %request_id,
                url = %url,
                "expiring stalled request"
            );
            self.complete(request_id);
        }
        !stalled.is_empty()
    }

    fn is_quiet(&self) -> bool {
        self.meta.is_empty()
    }

    fn pending(&self) -> usize {
        self.meta.len()
    }
}

/// Wait until the page has had no in-flight non-streaming request for the
/// configured quiet window, or until `timeout` elapses.
///
/// Always resolves, exactly once, within `timeout` plus one scheduler tick.
/// The subscription ends when the call returns.
pub async fn wait_for_settled(
    mut events: broadcast::Receiver<NetworkEvent>,
    cfg: SettleConfig,
    timeout: Option<Duration>,
) -> SettleOutcome {
    let deadline = Instant::now() + timeout.unwrap_or(cfg.default_deadline);
    let mut ledger = InflightLedger::default();
    let mut quiet_at = Instant::now() + cfg.quiet_window;

    let mut sweep = interval(cfg.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    sweep.reset();

    loop {
        let quiet_timer = sleep_until(quiet_at);
        tokio::pin!(quiet_timer);

        tokio::select! {
            _ = sleep_until(deadline) => {
                let pending = ledger.pending();
                if pending > 0 {
                    warn!(
                        target: "network-settle",
                        pending,
                        "settle deadline reached with requests in flight"
                    );
                }
                return SettleOutcome { quiet: false, pending };
            }
            _ = &mut quiet_timer, if ledger.is_quiet() => {
                debug!(target: "network-settle", "quiet window elapsed");
                return SettleOutcome { quiet: true, pending: 0 };
            }
            _ = sweep.tick() => {
                if ledger.sweep(Instant::now(), cfg.stall_age) && ledger.is_quiet() {
                    quiet_at = Instant::now() + cfg.quiet_window;
                }
            }
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        // A new request parks the quiet timer via its select
                        // guard; a completion that drains the set restarts
                        // the window from now.
                        if ledger.apply(&event, Instant::now()) && ledger.is_quiet() {
                            quiet_at = Instant::now() + cfg.quiet_window;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "network-settle", skipped, "event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Page went away; nothing further can arrive, so the
                        // quiet window decides from here.
                        let pending = ledger.pending();
                        if ledger.is_quiet() {
                            return SettleOutcome { quiet: true, pending: 0 };
                        }
                        warn!(
                            target: "network-settle",
                            pending,
                            "event stream closed with requests in flight"
                        );
                        return SettleOutcome { quiet: false, pending };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> NetworkEvent {
        NetworkEvent::RequestWillBeSent {
            request_id: id.into(),
            url: format!("https://example.test/{id}"),
            resource_type: "XHR".into(),
            frame_id: None,
            is_document: false,
        }
    }

    fn document(id: &str, frame: &str) -> NetworkEvent {
        NetworkEvent::RequestWillBeSent {
            request_id: id.into(),
            url: format!("https://example.test/{id}"),
            resource_type: "Document".into(),
            frame_id: Some(frame.into()),
            is_document: true,
        }
    }

    fn fast_cfg() -> SettleConfig {
        SettleConfig::default()
    }

    #[test]
    fn ledger_ignores_streaming_requests() {
        let mut ledger = InflightLedger::default();
        let now = Instant::now();
        ledger.apply(
            &NetworkEvent::RequestWillBeSent {
                request_id: "ws-1".into(),
                url: "wss://example.test/socket".into(),
                resource_type: "WebSocket".into(),
                frame_id: None,
                is_document: false,
            },
            now,
        );
        assert!(ledger.is_quiet());
    }

    #[test]
    fn ledger_completes_data_urls_on_response() {
        let mut ledger = InflightLedger::default();
        let now = Instant::now();
        ledger.apply(
            &NetworkEvent::RequestWillBeSent {
                request_id: "r1".into(),
                url: "data:text/html,<h1>hi</h1>".into(),
                resource_type: "Document".into(),
                frame_id: Some("f1".into()),
                is_document: true,
            },
            now,
        );
        assert!(!ledger.is_quiet());
        ledger.apply(
            &NetworkEvent::ResponseReceived {
                request_id: "r1".into(),
                url: "data:text/html,<h1>hi</h1>".into(),
            },
            now,
        );
        assert!(ledger.is_quiet());
        assert!(ledger.doc_by_frame.is_empty());
    }

    #[test]
    fn frame_stop_force_completes_document_request() {
        let mut ledger = InflightLedger::default();
        let now = Instant::now();
        ledger.apply(&document("doc-1", "frame-1"), now);
        assert_eq!(ledger.pending(), 1);
        ledger.apply(
            &NetworkEvent::FrameStoppedLoading {
                frame_id: "frame-1".into(),
            },
            now,
        );
        assert!(ledger.is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_after_quiet_window_on_empty_stream() {
        let (tx, rx) = broadcast::channel(16);
        let outcome = wait_for_settled(rx, fast_cfg(), Some(Duration::from_secs(30))).await;
        drop(tx);
        assert_eq!(
            outcome,
            SettleOutcome {
                quiet: true,
                pending: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_restarts_quiet_window() {
        let (tx, rx) = broadcast::channel(16);
        let wait = tokio::spawn(wait_for_settled(rx, fast_cfg(), Some(Duration::from_secs(30))));

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(request("r1")).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        tx.send(NetworkEvent::LoadingFinished {
            request_id: "r1".into(),
        })
        .unwrap();

        let started = tokio::time::Instant::now();
        let outcome = wait.await.unwrap();
        assert!(outcome.quiet);
        // The window restarted at completion, so at least 500ms elapsed after
        // the finish event.
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_deadline_resolves_with_pending_requests() {
        let (tx, rx) = broadcast::channel(16);
        let cfg = SettleConfig {
            // Keep the sweep from expiring the request before the deadline.
            stall_age: Duration::from_secs(60),
            ..SettleConfig::default()
        };
        tx.send(request("stuck")).unwrap();
        let outcome = wait_for_settled(rx, cfg, Some(Duration::from_secs(2))).await;
        assert!(!outcome.quiet);
        assert_eq!(outcome.pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_sweep_unblocks_settlement() {
        let (tx, rx) = broadcast::channel(16);
        tx.send(request("slow")).unwrap();
        let outcome = wait_for_settled(rx, fast_cfg(), Some(Duration::from_secs(30))).await;
        // The sweep expires the request at ~2s, then the quiet window runs.
        assert!(outcome.quiet);
        assert_eq!(outcome.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waits_resolve_independently() {
        let (tx, _keep) = broadcast::channel(16);
        let first = tokio::spawn(wait_for_settled(
            tx.subscribe(),
            fast_cfg(),
            Some(Duration::from_secs(5)),
        ));
        let second = tokio::spawn(wait_for_settled(
            tx.subscribe(),
            fast_cfg(),
            Some(Duration::from_secs(5)),
        ));
        assert!(first.await.unwrap().quiet);
        assert!(second.await.unwrap().quiet);
    }
}
