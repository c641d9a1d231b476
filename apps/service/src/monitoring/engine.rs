//! The evaluation engine: one pipeline per check per tick.
//!
//! Each pipeline runs read → validate → probe → evaluate → log → persist
//! → alert, isolated from every other pipeline. Nothing in here is fatal:
//! a malformed record, an unreachable registry or a failed append costs at
//! most one check one tick, and the next tick re-derives everything from
//! the persisted record and a fresh probe.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::evaluator;
use super::probe::Prober;
use super::types::{Check, EvalLogEntry, Outcome};
use super::validation::validate_check_record;
use crate::clock::Clock;
use crate::logstore::EvalLogStore;
use crate::notify::Notifier;
use crate::registry::CheckRegistry;

/// Background engine holding the injected collaborators.
pub struct Engine {
    registry: Arc<dyn CheckRegistry>,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    logs: Arc<dyn EvalLogStore>,
    clock: Arc<dyn Clock>,
    /// Caps concurrently in-flight pipelines across ticks.
    probe_permits: Arc<Semaphore>,
}

impl Engine {
    pub fn new(
        registry: Arc<dyn CheckRegistry>,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        logs: Arc<dyn EvalLogStore>,
        clock: Arc<dyn Clock>,
        max_concurrent_probes: usize,
    ) -> Self {
        Self {
            registry,
            prober,
            notifier,
            logs,
            clock,
            probe_permits: Arc::new(Semaphore::new(max_concurrent_probes)),
        }
    }

    /// One firing of the check loop: enumerate all checks and launch a
    /// pipeline per id. Returns as soon as the pipelines are spawned; it
    /// never waits for them, so a slow target cannot delay the schedule.
    pub async fn run_check_tick(self: Arc<Self>) {
        let ids = match self.registry.list().await {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => {
                warn!("no checks to process this tick");
                return;
            }
            Err(err) => {
                warn!(error = %err, "could not enumerate checks, skipping tick");
                return;
            }
        };

        debug!(count = ids.len(), "launching check pipelines");
        for id in ids {
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                engine.process_check(&id).await;
            });
        }
    }

    /// Run one check's full pipeline.
    pub(crate) async fn process_check(&self, id: &str) {
        // The semaphore is never closed, so acquire only fails at
        // shutdown when the runtime is going away with us.
        let Ok(_permit) = self.probe_permits.acquire().await else {
            return;
        };

        let raw = match self.registry.read(id).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(check = %id, error = %err, "could not read check record");
                return;
            }
        };

        let check = match validate_check_record(&raw) {
            Ok(check) => check,
            Err(err) => {
                warn!(check = %id, error = %err, "dropping malformed check record");
                return;
            }
        };

        let outcome = self.prober.probe(&check).await;
        self.process_outcome(check, outcome).await;
    }

    async fn process_outcome(&self, check: Check, outcome: Outcome) {
        let evaluation = evaluator::evaluate(&check, &outcome);
        let now = self.clock.now_millis();

        let entry = EvalLogEntry {
            check: check.clone(),
            outcome,
            state: evaluation.state,
            alert_warranted: evaluation.alert_warranted,
            time: now,
        };
        if let Err(err) = self.logs.append(&check.id, &entry).await {
            warn!(check = %check.id, error = %err, "could not append evaluation log entry");
        }

        let updated = Check {
            state: evaluation.state,
            last_checked: Some(now),
            ..check
        };
        if let Err(err) = self.registry.update(&updated.id, &updated).await {
            warn!(check = %updated.id, error = %err, "could not persist check update");
            return;
        }

        if evaluation.alert_warranted {
            self.alert(&updated).await;
        } else {
            debug!(check = %updated.id, state = %updated.state, "state unchanged, no alert");
        }
    }

    async fn alert(&self, check: &Check) {
        let message = evaluator::alert_message(check, check.state);
        match self.notifier.send(&check.user_phone, &message).await {
            Ok(()) => info!(check = %check.id, state = %check.state, "owner alerted to state change"),
            Err(err) => {
                warn!(check = %check.id, error = %err, "could not deliver state-change alert");
            }
        }
    }

    /// One firing of the rotation loop: archive and reset every active
    /// log segment. Segments rotate independently; a failed compression
    /// leaves that segment untouched and does not block the rest.
    pub async fn rotate_logs(&self) {
        let ids = match self.logs.list_active().await {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => {
                debug!("no log segments to rotate");
                return;
            }
            Err(err) => {
                warn!(error = %err, "could not list active log segments");
                return;
            }
        };

        join_all(ids.iter().map(|id| self.rotate_segment(id))).await;
    }

    async fn rotate_segment(&self, id: &str) {
        let archive_id = format!("{}-{}", id, self.clock.now_millis());
        if let Err(err) = self.logs.compress(id, &archive_id).await {
            warn!(segment = %id, error = %err, "compression failed, leaving segment in place");
            return;
        }
        match self.logs.truncate(id).await {
            Ok(()) => debug!(segment = %id, archive = %archive_id, "log segment rotated"),
            Err(err) => warn!(segment = %id, error = %err, "could not truncate rotated segment"),
        }
    }
}
