//! Engine-level tests driven through in-memory collaborators.
//!
//! Everything the engine touches is injected, so these tests swap in
//! scripted fakes and exercise whole pipelines: validation gating, alert
//! edge-triggering, persistence ordering, rotation safety and the two
//! scheduler loops.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

use super::engine::Engine;
use super::probe::Prober;
use super::scheduler::Scheduler;
use super::types::{Check, CheckState, EvalLogEntry, Outcome};
use crate::clock::Clock;
use crate::logstore::{EvalLogStore, LogStoreError};
use crate::notify::Notifier;
use crate::registry::CheckRegistry;

const CHECK_ID: &str = "abcdefghij1234567890";
const NOW_MILLIS: i64 = 1_700_000_100_000;
const EARLIER_MILLIS: i64 = 1_700_000_000_000;

struct MemoryRegistry {
    records: Mutex<HashMap<String, Value>>,
    updates: Mutex<Vec<Check>>,
    fail_list: bool,
    fail_update: bool,
}

impl MemoryRegistry {
    fn with_records(records: Vec<(&str, Value)>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(
                records.into_iter().map(|(id, record)| (id.to_string(), record)).collect(),
            ),
            updates: Mutex::new(Vec::new()),
            fail_list: false,
            fail_update: false,
        })
    }

    fn updates(&self) -> Vec<Check> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckRegistry for MemoryRegistry {
    async fn list(&self) -> Result<Vec<String>> {
        if self.fail_list {
            return Err(anyhow!("registry unreachable"));
        }
        let mut ids: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, id: &str) -> Result<Value> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no record for {id}"))
    }

    async fn update(&self, id: &str, check: &Check) -> Result<()> {
        if self.fail_update {
            return Err(anyhow!("registry write refused"));
        }
        self.records.lock().unwrap().insert(id.to_string(), serde_json::to_value(check)?);
        self.updates.lock().unwrap().push(check.clone());
        Ok(())
    }
}

struct ScriptedProber {
    outcome: Outcome,
    calls: AtomicUsize,
}

impl ScriptedProber {
    fn returning(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self { outcome, calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, _check: &Check) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
    }
}

struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    fn ok() -> Arc<Self> {
        Arc::new(Self { sent: Mutex::new(Vec::new()), fail: false })
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<()> {
        self.sent.lock().unwrap().push((phone.to_string(), message.to_string()));
        if self.fail {
            return Err(anyhow!("sms gateway unavailable"));
        }
        Ok(())
    }
}

struct MemoryLogStore {
    segments: Mutex<HashMap<String, Vec<EvalLogEntry>>>,
    archives: Mutex<HashMap<String, Vec<EvalLogEntry>>>,
    fail_append: bool,
    /// Segment id whose compression should fail.
    fail_compress_for: Option<String>,
}

impl MemoryLogStore {
    fn empty() -> Arc<Self> {
        Arc::new(Self {
            segments: Mutex::new(HashMap::new()),
            archives: Mutex::new(HashMap::new()),
            fail_append: false,
            fail_compress_for: None,
        })
    }

    fn segment(&self, id: &str) -> Vec<EvalLogEntry> {
        self.segments.lock().unwrap().get(id).cloned().unwrap_or_default()
    }

    fn archives(&self) -> HashMap<String, Vec<EvalLogEntry>> {
        self.archives.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvalLogStore for MemoryLogStore {
    async fn append(&self, id: &str, entry: &EvalLogEntry) -> Result<(), LogStoreError> {
        if self.fail_append {
            return Err(LogStoreError::Io(std::io::Error::other("log disk full")));
        }
        self.segments.lock().unwrap().entry(id.to_string()).or_default().push(entry.clone());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<String>, LogStoreError> {
        let mut ids: Vec<String> = self
            .segments
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn compress(&self, id: &str, archive_id: &str) -> Result<(), LogStoreError> {
        if self.fail_compress_for.as_deref() == Some(id) {
            return Err(LogStoreError::Io(std::io::Error::other("archive disk full")));
        }
        let entries = self
            .segments
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| LogStoreError::Io(std::io::Error::other("no such segment")))?;
        self.archives.lock().unwrap().insert(archive_id.to_string(), entries);
        Ok(())
    }

    async fn truncate(&self, id: &str) -> Result<(), LogStoreError> {
        self.segments.lock().unwrap().insert(id.to_string(), Vec::new());
        Ok(())
    }
}

struct ManualClock(DateTime<Utc>);

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn build_engine(
    registry: &Arc<MemoryRegistry>,
    prober: &Arc<ScriptedProber>,
    notifier: &Arc<RecordingNotifier>,
    logs: &Arc<MemoryLogStore>,
) -> Arc<Engine> {
    Arc::new(Engine::new(
        registry.clone(),
        prober.clone(),
        notifier.clone(),
        logs.clone(),
        Arc::new(ManualClock(Utc.timestamp_millis_opt(NOW_MILLIS).unwrap())),
        8,
    ))
}

fn fresh_record() -> Value {
    json!({
        "id": CHECK_ID,
        "userPhone": "5551234567",
        "protocol": "http",
        "url": "example.com",
        "method": "get",
        "successCodes": [200],
        "timeoutSeconds": 3,
    })
}

fn persisted_record(state: &str) -> Value {
    let mut record = fresh_record();
    record["state"] = json!(state);
    record["lastChecked"] = json!(EARLIER_MILLIS);
    record
}

fn sample_entry(time: i64) -> EvalLogEntry {
    EvalLogEntry {
        check: crate::monitoring::validation::validate_check_record(&fresh_record()).unwrap(),
        outcome: Outcome::response(200),
        state: CheckState::Up,
        alert_warranted: false,
        time,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

#[tokio::test]
async fn first_evaluation_records_state_without_alerting() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, fresh_record())]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    let updates = registry.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].state, CheckState::Up);
    assert_eq!(updates[0].last_checked, Some(NOW_MILLIS));
    assert!(notifier.sent().is_empty());

    let entries = logs.segment(CHECK_ID);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, CheckState::Up);
    assert!(!entries[0].alert_warranted);
    assert_eq!(entries[0].time, NOW_MILLIS);
    // The logged snapshot is the pre-update check.
    assert_eq!(entries[0].check.last_checked, None);
    assert_eq!(entries[0].check.state, CheckState::Down);
}

#[tokio::test]
async fn timeout_on_previously_up_check_alerts_once() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, persisted_record("up"))]);
    let prober = ScriptedProber::returning(Outcome::timed_out());
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    let updates = registry.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].state, CheckState::Down);
    assert_eq!(
        notifier.sent(),
        vec![(
            "5551234567".to_string(),
            "Alert: your check for GET http://example.com is currently down".to_string()
        )]
    );
    assert!(logs.segment(CHECK_ID)[0].alert_warranted);
}

#[tokio::test]
async fn recovery_alerts_in_the_other_direction() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, persisted_record("down"))]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Alert: your check for GET http://example.com is currently up");
}

#[tokio::test]
async fn unchanged_state_persists_without_alerting() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, persisted_record("up"))]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    assert!(notifier.sent().is_empty());
    assert_eq!(registry.updates()[0].last_checked, Some(NOW_MILLIS));
}

#[tokio::test]
async fn malformed_record_is_never_probed_or_persisted() {
    let mut record = fresh_record();
    record["id"] = json!("nineteen-chars-only");
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, record)]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    assert_eq!(prober.calls(), 0);
    assert!(registry.updates().is_empty());
    assert!(logs.segment(CHECK_ID).is_empty());
}

#[tokio::test]
async fn enumeration_failure_no_ops_the_tick() {
    let registry = Arc::new(MemoryRegistry {
        records: Mutex::new(HashMap::new()),
        updates: Mutex::new(Vec::new()),
        fail_list: true,
        fail_update: false,
    });
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.run_check_tick().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(prober.calls(), 0);
    assert!(registry.updates().is_empty());
}

#[tokio::test]
async fn tick_launches_a_pipeline_per_check() {
    let mut other = fresh_record();
    other["id"] = json!("bbcdefghij1234567890");
    let registry = MemoryRegistry::with_records(vec![
        (CHECK_ID, fresh_record()),
        ("bbcdefghij1234567890", other),
    ]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.run_check_tick().await;
    wait_for(|| registry.updates().len() == 2).await;

    assert_eq!(prober.calls(), 2);
}

#[tokio::test]
async fn notifier_failure_does_not_lose_the_state_update() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, persisted_record("up"))]);
    let prober = ScriptedProber::returning(Outcome::timed_out());
    let notifier = Arc::new(RecordingNotifier { sent: Mutex::new(Vec::new()), fail: true });
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    // The attempt was made, the failure swallowed, and the flip persisted.
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(registry.updates()[0].state, CheckState::Down);
}

#[tokio::test]
async fn persist_failure_defers_the_alert() {
    let registry = Arc::new(MemoryRegistry {
        records: Mutex::new(HashMap::from([(CHECK_ID.to_string(), persisted_record("up"))])),
        updates: Mutex::new(Vec::new()),
        fail_list: false,
        fail_update: true,
    });
    let prober = ScriptedProber::returning(Outcome::timed_out());
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    // The evaluation is still logged, but no alert goes out for a flip
    // that was never persisted; the next tick will re-detect it.
    assert_eq!(logs.segment(CHECK_ID).len(), 1);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn log_append_failure_is_not_fatal() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, persisted_record("up"))]);
    let prober = ScriptedProber::returning(Outcome::timed_out());
    let notifier = RecordingNotifier::ok();
    let logs = Arc::new(MemoryLogStore {
        segments: Mutex::new(HashMap::new()),
        archives: Mutex::new(HashMap::new()),
        fail_append: true,
        fail_compress_for: None,
    });
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.process_check(CHECK_ID).await;

    assert_eq!(registry.updates().len(), 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn rotation_archives_then_truncates() {
    let registry = MemoryRegistry::with_records(vec![]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    logs.segments
        .lock()
        .unwrap()
        .insert("abc123".to_string(), vec![sample_entry(1), sample_entry(2), sample_entry(3)]);
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.rotate_logs().await;

    let archives = logs.archives();
    let archived = archives.get(&format!("abc123-{NOW_MILLIS}")).unwrap();
    assert_eq!(archived.len(), 3);
    assert!(logs.segment("abc123").is_empty());
}

#[tokio::test]
async fn failed_compression_skips_truncation_for_that_segment_only() {
    let registry = MemoryRegistry::with_records(vec![]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = Arc::new(MemoryLogStore {
        segments: Mutex::new(HashMap::from([
            ("abc123".to_string(), vec![sample_entry(1), sample_entry(2)]),
            ("xyz789".to_string(), vec![sample_entry(3)]),
        ])),
        archives: Mutex::new(HashMap::new()),
        fail_append: false,
        fail_compress_for: Some("abc123".to_string()),
    });
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    engine.rotate_logs().await;

    // The failing segment keeps its entries; the healthy one rotates.
    assert_eq!(logs.segment("abc123").len(), 2);
    let archives = logs.archives();
    assert!(!archives.contains_key(&format!("abc123-{NOW_MILLIS}")));
    assert_eq!(archives.get(&format!("xyz789-{NOW_MILLIS}")).unwrap().len(), 1);
    assert!(logs.segment("xyz789").is_empty());
}

#[tokio::test]
async fn check_loop_fires_immediately_and_repeats() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, fresh_record())]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    let scheduler =
        Scheduler::new(engine, Duration::from_millis(50), Duration::from_secs(3600));
    let handles = scheduler.start();

    wait_for(|| prober.calls() >= 2).await;

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn rotation_loop_runs_without_touching_checks() {
    let registry = MemoryRegistry::with_records(vec![(CHECK_ID, fresh_record())]);
    let prober = ScriptedProber::returning(Outcome::response(200));
    let notifier = RecordingNotifier::ok();
    let logs = MemoryLogStore::empty();
    logs.segments.lock().unwrap().insert("abc123".to_string(), vec![sample_entry(1)]);
    let engine = build_engine(&registry, &prober, &notifier, &logs);

    let scheduler =
        Scheduler::new(engine, Duration::from_secs(3600), Duration::from_millis(50));
    let handles = scheduler.start();

    wait_for(|| !logs.archives().is_empty()).await;

    // The rotation loop never drives the check pipeline... except for the
    // check loop's own immediate first firing.
    assert!(prober.calls() <= 1);
    for handle in handles {
        handle.abort();
    }
}
