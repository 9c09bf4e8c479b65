use crate::engine::{AlertDraft, AlertEngine, AlertStore, StoreError, UpsertOutcome};
use crate::rules::consumption::ConsumptionRule;
use crate::rules::offline::OfflineRule;
use crate::rules::weather::WeatherRule;
use crate::snapshot::{DeviceState, EvaluationSnapshot, LocationState};
use crate::{AlertRule, SkipReason};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use wattmon_common::types::{
    Alert, AlertScope, AlertState, DeviceEntry, DeviceKind, ForecastRecord, Reading,
    ReadingSource, Severity, SubjectKey,
};

// ---- Snapshot helpers (also used by the per-rule test modules) ----

pub(crate) fn device_entry(
    device_id: &str,
    max_power_watts: Option<f64>,
    expected_interval_secs: Option<u64>,
) -> DeviceEntry {
    let now = Utc::now();
    DeviceEntry {
        id: wattmon_common::id::next_id(),
        device_id: device_id.to_string(),
        name: device_id.to_string(),
        kind: DeviceKind::Smart,
        max_power_watts,
        expected_interval_secs,
        location: None,
        is_active: true,
        owner: None,
        last_seen: Some(now),
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn reading(device_id: &str, power_watts: f64, secs_ago: i64) -> Reading {
    let ts = Utc::now() - Duration::seconds(secs_ago);
    Reading {
        id: wattmon_common::id::next_id(),
        device_id: device_id.to_string(),
        timestamp: ts,
        power_watts,
        source: ReadingSource::Polled,
        created_at: ts,
    }
}

pub(crate) fn device_state(
    entry: DeviceEntry,
    readings: Vec<Reading>,
    now: DateTime<Utc>,
) -> DeviceState {
    DeviceState::new(entry, readings, 600, now)
}

pub(crate) fn forecast(
    city: &str,
    country: &str,
    irradiation: f64,
    temperature: f64,
) -> ForecastRecord {
    let now = Utc::now();
    ForecastRecord {
        id: wattmon_common::id::next_id(),
        city: city.to_string(),
        country: country.to_string(),
        forecast_date: now,
        temperature,
        humidity: 50,
        cloudiness: 50,
        condition: "Clouds".to_string(),
        irradiation_factor: irradiation,
        fetched_at: now,
    }
}

// ---- In-memory alert store ----

#[derive(Default)]
struct MemoryAlertStore {
    /// (subject, scope) -> active alert
    active: Mutex<HashMap<(String, AlertScope), Alert>>,
    /// Every alert ever resolved, for resurrection checks.
    resolved: Mutex<Vec<Alert>>,
    /// Remaining calls that should fail with `Conflict` before succeeding.
    conflicts_to_inject: Mutex<u32>,
    seq: Mutex<u64>,
}

impl MemoryAlertStore {
    fn inject_conflicts(&self, n: u32) {
        *self.conflicts_to_inject.lock().unwrap() = n;
    }

    fn maybe_conflict(&self) -> Result<(), StoreError> {
        let mut remaining = self.conflicts_to_inject.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    fn active_alert(&self, subject: &SubjectKey, scope: AlertScope) -> Option<Alert> {
        self.active
            .lock()
            .unwrap()
            .get(&(subject.to_string(), scope))
            .cloned()
    }

    fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    fn resolved_alerts(&self) -> Vec<Alert> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn find_active(
        &self,
        subject: &SubjectKey,
        scope: AlertScope,
    ) -> Result<Option<Alert>, StoreError> {
        self.maybe_conflict()?;
        Ok(self.active_alert(subject, scope))
    }

    async fn upsert_active(&self, draft: &AlertDraft) -> Result<UpsertOutcome, StoreError> {
        self.maybe_conflict()?;
        let now = Utc::now();
        let mut active = self.active.lock().unwrap();
        let key = (draft.subject.to_string(), draft.scope);
        if let Some(existing) = active.get_mut(&key) {
            if existing.severity == draft.severity
                && existing.message == draft.message
                && existing.value == draft.value
                && existing.threshold == draft.threshold
            {
                return Ok(UpsertOutcome::Unchanged(existing.clone()));
            }
            existing.severity = draft.severity;
            existing.message = draft.message.clone();
            existing.value = draft.value;
            existing.threshold = draft.threshold;
            existing.updated_at = now;
            return Ok(UpsertOutcome::Updated(existing.clone()));
        }
        let mut seq = self.seq.lock().unwrap();
        *seq += 1;
        let alert = Alert {
            id: format!("alert-{seq}"),
            subject: draft.subject.clone(),
            scope: draft.scope,
            severity: draft.severity,
            message: draft.message.clone(),
            value: draft.value,
            threshold: draft.threshold,
            state: AlertState::Unread,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        active.insert(key, alert.clone());
        Ok(UpsertOutcome::Created(alert))
    }

    async fn resolve(&self, alert_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.maybe_conflict()?;
        let mut active = self.active.lock().unwrap();
        let key = active
            .iter()
            .find(|(_, a)| a.id == alert_id)
            .map(|(k, _)| k.clone());
        match key {
            Some(key) => {
                let mut alert = active.remove(&key).unwrap();
                alert.state = AlertState::Resolved;
                alert.resolved_at = Some(at);
                self.resolved.lock().unwrap().push(alert);
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "no active alert with id {alert_id}"
            ))),
        }
    }
}

// ---- Engine fixtures ----

fn consumption_rule(critical_ratio: f64) -> Box<dyn AlertRule> {
    Box::new(ConsumptionRule {
        id: "consumption-1".into(),
        name: "High consumption".into(),
        device_pattern: "*".into(),
        warning_ratio: 1.0,
        critical_ratio,
        sample_window_secs: 60,
    })
}

fn offline_rule() -> Box<dyn AlertRule> {
    Box::new(OfflineRule {
        id: "offline-1".into(),
        name: "Device offline".into(),
        device_pattern: "*".into(),
        missed_cycles: 3,
        default_interval_secs: 300,
    })
}

fn weather_rule(min_irradiation: f64) -> Box<dyn AlertRule> {
    Box::new(WeatherRule {
        id: "weather-1".into(),
        name: "Low solar output".into(),
        location_pattern: "*".into(),
        min_irradiation: Some(min_irradiation),
        min_temperature: None,
        max_temperature: None,
        low_irradiation_severity: Severity::Warning,
        temperature_severity: Severity::Warning,
    })
}

fn snapshot_with_device(entry: DeviceEntry, readings: Vec<Reading>) -> EvaluationSnapshot {
    let now = Utc::now();
    let mut snapshot = EvaluationSnapshot::new(now);
    snapshot.devices.push(device_state(entry, readings, now));
    snapshot
}

// ---- Pass-level properties ----

#[tokio::test]
async fn repeated_pass_on_unchanged_snapshot_is_noop() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    let snapshot = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1200.0, 10)],
    );

    let first = engine.evaluate(&snapshot, &store).await;
    assert_eq!(first.created, 1);
    assert_eq!(store.active_count(), 1);

    let second = engine.evaluate(&snapshot, &store).await;
    assert!(second.is_noop(), "unchanged inputs must cause no churn");
    assert_eq!(store.active_count(), 1);
    assert!(store.resolved_alerts().is_empty());
}

#[tokio::test]
async fn sustained_breach_keeps_a_single_active_alert() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    let key = SubjectKey::device("plug-1");

    let first_pass = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1200.0, 10)],
    );
    engine.evaluate(&first_pass, &store).await;
    let created = store
        .active_alert(&key, AlertScope::Consumption)
        .expect("alert should exist");

    let second_pass = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1250.0, 10)],
    );
    let report = engine.evaluate(&second_pass, &store).await;
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(store.active_count(), 1);

    let updated = store.active_alert(&key, AlertScope::Consumption).unwrap();
    assert_eq!(updated.id, created.id, "dedup must update, not insert");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
}

#[tokio::test]
async fn cleared_condition_resolves_then_new_breach_creates_fresh_alert() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    let key = SubjectKey::device("plug-1");

    let over = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1200.0, 10)],
    );
    engine.evaluate(&over, &store).await;
    let first = store.active_alert(&key, AlertScope::Consumption).unwrap();

    let under = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 400.0, 10)],
    );
    let report = engine.evaluate(&under, &store).await;
    assert_eq!(report.resolved, 1);
    assert_eq!(store.active_count(), 0);
    let resolved = store.resolved_alerts();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, first.id);
    assert_eq!(resolved[0].state, AlertState::Resolved);
    assert!(resolved[0].resolved_at.is_some());

    // A later breach creates a fresh alert, not a resurrection
    let over_again = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1300.0, 10)],
    );
    let report = engine.evaluate(&over_again, &store).await;
    assert_eq!(report.created, 1);
    let fresh = store.active_alert(&key, AlertScope::Consumption).unwrap();
    assert_ne!(fresh.id, first.id);
    assert_eq!(fresh.state, AlertState::Unread);
}

#[tokio::test]
async fn consumption_scenario_escalates_single_row_to_critical() {
    // Threshold 1000 W, readings 1200 / 1300 / 1400 across three passes;
    // the critical band is configured at 135% so the third pass crosses it.
    let engine = AlertEngine::new(vec![consumption_rule(1.35)]);
    let store = MemoryAlertStore::default();
    let key = SubjectKey::device("heater-1");

    let mut first_id = None;
    for (pass, (watts, expected)) in [
        (1200.0, Severity::Warning),
        (1300.0, Severity::Warning),
        (1400.0, Severity::Critical),
    ]
    .into_iter()
    .enumerate()
    {
        let snapshot = snapshot_with_device(
            device_entry("heater-1", Some(1000.0), None),
            vec![reading("heater-1", watts, 5)],
        );
        engine.evaluate(&snapshot, &store).await;

        assert_eq!(store.active_count(), 1, "pass {}", pass + 1);
        let alert = store.active_alert(&key, AlertScope::Consumption).unwrap();
        assert_eq!(alert.severity, expected, "pass {}", pass + 1);
        match &first_id {
            None => first_id = Some(alert.id.clone()),
            Some(id) => assert_eq!(&alert.id, id, "single row throughout"),
        }
    }
}

#[tokio::test]
async fn stale_device_goes_offline_and_fresh_reading_resolves_it() {
    let engine = AlertEngine::new(vec![offline_rule()]);
    let store = MemoryAlertStore::default();
    let key = SubjectKey::device("meter-1");
    let now = Utc::now();

    // last_seen far beyond interval (60 s) * missed_cycles (3)
    let mut stale = device_entry("meter-1", None, Some(60));
    stale.last_seen = Some(now - Duration::seconds(3600));
    let mut snapshot = EvaluationSnapshot::new(now);
    snapshot.devices.push(device_state(stale, vec![], now));

    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.created, 1);
    let alert = store.active_alert(&key, AlertScope::Offline).unwrap();
    assert_eq!(alert.severity, Severity::Warning);

    // A reading arrived; last_seen is fresh in the next snapshot
    let mut fresh = device_entry("meter-1", None, Some(60));
    fresh.last_seen = Some(now);
    let mut snapshot = EvaluationSnapshot::new(now);
    snapshot
        .devices
        .push(device_state(fresh, vec![reading("meter-1", 12.0, 1)], now));

    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.resolved, 1);
    assert_eq!(store.active_count(), 0);
}

#[tokio::test]
async fn weather_scenario_low_irradiation_then_recovery() {
    let engine = AlertEngine::new(vec![weather_rule(0.6)]);
    let store = MemoryAlertStore::default();
    let key = SubjectKey::location("Porto", "PT");

    let mut low = EvaluationSnapshot::new(Utc::now());
    low.locations.push(LocationState {
        location: "Porto,PT".into(),
        forecast: Some(forecast("Porto", "PT", 0.45, 18.0)),
    });
    let report = engine.evaluate(&low, &store).await;
    assert_eq!(report.created, 1);
    let alert = store.active_alert(&key, AlertScope::Weather).unwrap();
    assert_eq!(alert.severity, Severity::Warning);
    assert!(alert.message.contains("irradiation"));

    let mut clear = EvaluationSnapshot::new(Utc::now());
    clear.locations.push(LocationState {
        location: "Porto,PT".into(),
        forecast: Some(forecast("Porto", "PT", 0.95, 18.0)),
    });
    let report = engine.evaluate(&clear, &store).await;
    assert_eq!(report.resolved, 1);
    assert_eq!(store.active_count(), 0);
}

#[tokio::test]
async fn skips_are_scoped_to_the_failing_subject() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    let now = Utc::now();

    let mut snapshot = EvaluationSnapshot::new(now);
    // No threshold configured: consumption check skipped for this one only
    snapshot.devices.push(device_state(
        device_entry("unconfigured", None, None),
        vec![reading("unconfigured", 9000.0, 5)],
        now,
    ));
    snapshot.devices.push(device_state(
        device_entry("plug-2", Some(1000.0), None),
        vec![reading("plug-2", 1500.0, 5)],
        now,
    ));

    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::ConfigMissing);
    assert_eq!(
        report.skipped[0].subject,
        SubjectKey::device("unconfigured")
    );
    assert!(store
        .active_alert(&SubjectKey::device("plug-2"), AlertScope::Consumption)
        .is_some());
}

#[tokio::test]
async fn missing_forecast_skips_weather_check_for_that_location() {
    let engine = AlertEngine::new(vec![weather_rule(0.6)]);
    let store = MemoryAlertStore::default();

    let mut snapshot = EvaluationSnapshot::new(Utc::now());
    snapshot.locations.push(LocationState {
        location: "Faro,PT".into(),
        forecast: None,
    });
    snapshot.locations.push(LocationState {
        location: "Porto,PT".into(),
        forecast: Some(forecast("Porto", "PT", 0.4, 20.0)),
    });

    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::DataUnavailable);
}

#[tokio::test]
async fn inactive_devices_are_not_evaluated() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    let now = Utc::now();

    let mut entry = device_entry("plug-1", Some(1000.0), None);
    entry.is_active = false;
    let mut snapshot = EvaluationSnapshot::new(now);
    snapshot
        .devices
        .push(device_state(entry, vec![reading("plug-1", 5000.0, 5)], now));

    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.evaluated, 0);
    assert_eq!(store.active_count(), 0);
}

#[tokio::test]
async fn store_conflict_is_retried_once() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    store.inject_conflicts(1);

    let snapshot = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1200.0, 10)],
    );
    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.errored, 0);
}

#[tokio::test]
async fn double_conflict_skips_the_subject_and_is_reported() {
    let engine = AlertEngine::new(vec![consumption_rule(1.5)]);
    let store = MemoryAlertStore::default();
    store.inject_conflicts(2);

    let snapshot = snapshot_with_device(
        device_entry("plug-1", Some(1000.0), None),
        vec![reading("plug-1", 1200.0, 10)],
    );
    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.created, 0);
    assert_eq!(report.errored, 1);
    assert_eq!(store.active_count(), 0);

    // Next pass succeeds and the alert appears
    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.created, 1);
}

#[tokio::test]
async fn device_pattern_scopes_rules_to_matching_devices() {
    let rule = Box::new(ConsumptionRule {
        id: "consumption-heaters".into(),
        name: "Heater limit".into(),
        device_pattern: "heater-*".into(),
        warning_ratio: 1.0,
        critical_ratio: 1.5,
        sample_window_secs: 60,
    });
    let engine = AlertEngine::new(vec![rule]);
    let store = MemoryAlertStore::default();
    let now = Utc::now();

    let mut snapshot = EvaluationSnapshot::new(now);
    snapshot.devices.push(device_state(
        device_entry("heater-1", Some(1000.0), None),
        vec![reading("heater-1", 1500.0, 5)],
        now,
    ));
    snapshot.devices.push(device_state(
        device_entry("plug-1", Some(100.0), None),
        vec![reading("plug-1", 900.0, 5)],
        now,
    ));

    let report = engine.evaluate(&snapshot, &store).await;
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.created, 1);
    assert!(store
        .active_alert(&SubjectKey::device("plug-1"), AlertScope::Consumption)
        .is_none());
}
