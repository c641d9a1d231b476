//! Outbound probe execution.
//!
//! A probe has three ways to complete: an HTTP response, a transport
//! error, or the timeout deadline. Exactly one of them may win. Every
//! completion path goes through an [`OutcomeSlot`], a single-assignment
//! slot that accepts only the first resolution and discards the rest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use super::types::{Check, HttpMethod, Outcome};

/// Issues one network probe per validated check.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe the check's target. Never fails: transport problems are
    /// folded into the returned [`Outcome`].
    async fn probe(&self, check: &Check) -> Outcome;
}

/// Single-assignment slot for a probe's outcome.
///
/// Cloned into every completion source; the first `resolve` consumes the
/// underlying channel, so a later response for an already-timed-out probe
/// (or the reverse) cannot produce a second outcome.
#[derive(Clone)]
pub struct OutcomeSlot {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl OutcomeSlot {
    pub fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Arc::new(Mutex::new(Some(tx))) }, rx)
    }

    /// Resolve the probe. Returns whether this call won the race.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        let Ok(mut slot) = self.tx.lock() else {
            return false;
        };
        match slot.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// HTTP/HTTPS prober backed by a shared [`reqwest::Client`].
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Timeouts are per-request (each check carries its own), so the
    /// client itself is built without one.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { client: reqwest::Client::builder().build()? })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, check: &Check) -> Outcome {
        let (slot, rx) = OutcomeSlot::new();
        let timeout = Duration::from_millis(check.timeout_seconds * 1000);

        match Url::parse(&check.target()) {
            Ok(target) => {
                let request = self
                    .client
                    .request(reqwest_method(check.method), target)
                    .timeout(timeout);

                let transport = slot.clone();
                tokio::spawn(async move {
                    match request.send().await {
                        Ok(response) => {
                            transport.resolve(Outcome::response(response.status().as_u16()));
                        }
                        Err(err) if err.is_timeout() => {
                            transport.resolve(Outcome::timed_out());
                        }
                        Err(err) => {
                            debug!(error = %err, "probe transport error");
                            transport.resolve(Outcome::network_error());
                        }
                    }
                });

                // Independent deadline; whichever event fires first wins
                // the slot.
                let deadline = slot.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    deadline.resolve(Outcome::timed_out());
                });
            }
            Err(err) => {
                debug!(url = %check.url, error = %err, "check url does not parse");
                slot.resolve(Outcome::network_error());
            }
        }

        // At least one completion source always resolves the slot; the
        // fallback only guards against a panicked task.
        rx.await.unwrap_or_else(|_| Outcome::network_error())
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}
