use chrono::{Duration, Utc};
use wattmon_alert::engine::{AlertDraft, AlertStore, UpsertOutcome};
use wattmon_common::types::{
    AlertScope, AlertState, DeviceKind, ReadingSource, Severity, SubjectKey,
};

use crate::store::{
    AlertFilter, AlertRuleUpdate, DeviceFilter, NewAlertRule, NewDevice, NewForecast, NewReading,
    Store,
};

async fn memory_store() -> Store {
    Store::new("sqlite::memory:").await.unwrap()
}

fn sample_device(device_id: &str) -> NewDevice {
    NewDevice {
        device_id: device_id.to_string(),
        name: format!("Device {device_id}"),
        kind: DeviceKind::Manual,
        max_power_watts: Some(1500.0),
        expected_interval_secs: Some(300),
        location: Some("Porto,PT".to_string()),
        owner: None,
    }
}

fn draft(device_id: &str, severity: Severity, message: &str) -> AlertDraft {
    AlertDraft {
        subject: SubjectKey::device(device_id),
        scope: AlertScope::Consumption,
        severity,
        message: message.to_string(),
        value: Some(1800.0),
        threshold: Some(1500.0),
    }
}

#[tokio::test]
async fn device_roundtrip_and_threshold_update() {
    let store = memory_store().await;
    let created = store.insert_device(&sample_device("meter-1")).await.unwrap();
    assert!(created.is_active);
    assert!(created.last_seen.is_none());

    let fetched = store.get_device("meter-1").await.unwrap().unwrap();
    assert_eq!(fetched.max_power_watts, Some(1500.0));

    let updated = store
        .update_device_threshold("meter-1", Some(2000.0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.max_power_watts, Some(2000.0));

    assert!(store
        .update_device_threshold("nope", Some(1.0))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn device_filters_and_delete() {
    let store = memory_store().await;
    store.insert_device(&sample_device("meter-1")).await.unwrap();
    let mut other = sample_device("meter-2");
    other.location = Some("Lisbon,PT".to_string());
    store.insert_device(&other).await.unwrap();

    let filter = DeviceFilter {
        location_eq: Some("Porto,PT".to_string()),
        ..Default::default()
    };
    let porto = store.list_devices(&filter, 50, 0).await.unwrap();
    assert_eq!(porto.len(), 1);
    assert_eq!(porto[0].device_id, "meter-1");

    assert!(store.delete_device("meter-2").await.unwrap());
    assert!(!store.delete_device("meter-2").await.unwrap());
    assert_eq!(store.count_devices(&DeviceFilter::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn ingesting_a_reading_touches_last_seen() {
    let store = memory_store().await;
    store.insert_device(&sample_device("meter-1")).await.unwrap();

    let ts = Utc::now() - Duration::seconds(30);
    store
        .insert_reading(&NewReading {
            device_id: "meter-1".to_string(),
            timestamp: Some(ts),
            power_watts: 420.0,
            source: ReadingSource::Manual,
        })
        .await
        .unwrap();

    let device = store.get_device("meter-1").await.unwrap().unwrap();
    assert_eq!(device.last_seen.unwrap().timestamp(), ts.timestamp());

    let latest = store.latest_reading("meter-1").await.unwrap().unwrap();
    assert_eq!(latest.power_watts, 420.0);
    assert_eq!(latest.source, ReadingSource::Manual);
}

#[tokio::test]
async fn recent_readings_are_windowed_and_ascending() {
    let store = memory_store().await;
    store.insert_device(&sample_device("meter-1")).await.unwrap();
    let now = Utc::now();

    for (watts, secs_ago) in [(100.0, 900), (200.0, 300), (300.0, 60)] {
        store
            .insert_reading(&NewReading {
                device_id: "meter-1".to_string(),
                timestamp: Some(now - Duration::seconds(secs_ago)),
                power_watts: watts,
                source: ReadingSource::Polled,
            })
            .await
            .unwrap();
    }

    let recent = store
        .recent_readings("meter-1", now - Duration::seconds(600))
        .await
        .unwrap();
    let watts: Vec<f64> = recent.iter().map(|r| r.power_watts).collect();
    assert_eq!(watts, vec![200.0, 300.0]);
}

#[tokio::test]
async fn latest_forecast_per_location() {
    let store = memory_store().await;
    let date = Utc::now();

    store
        .insert_forecast(&NewForecast {
            city: "Porto".to_string(),
            country: "PT".to_string(),
            forecast_date: date,
            temperature: 18.0,
            humidity: 80,
            cloudiness: 90,
            condition: "Rain".to_string(),
        })
        .await
        .unwrap();
    store
        .insert_forecast(&NewForecast {
            city: "Porto".to_string(),
            country: "PT".to_string(),
            forecast_date: date,
            temperature: 24.0,
            humidity: 40,
            cloudiness: 10,
            condition: "Clear".to_string(),
        })
        .await
        .unwrap();
    store
        .insert_forecast(&NewForecast {
            city: "Lisbon".to_string(),
            country: "PT".to_string(),
            forecast_date: date,
            temperature: 28.0,
            humidity: 35,
            cloudiness: 5,
            condition: "Clear".to_string(),
        })
        .await
        .unwrap();

    let porto = store.latest_forecast("Porto", "PT").await.unwrap().unwrap();
    assert_eq!(porto.condition, "Clear");
    assert_eq!(porto.temperature, 24.0);
    assert!(porto.irradiation_factor > 1.0);

    let all = store.latest_forecasts().await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn rule_crud_and_enabled_listing() {
    let store = memory_store().await;
    let created = store
        .insert_alert_rule(&NewAlertRule {
            name: "high draw".to_string(),
            scope: AlertScope::Consumption,
            subject_pattern: "*".to_string(),
            enabled: true,
            config_json: r#"{"warning_ratio":1.0}"#.to_string(),
        })
        .await
        .unwrap();
    store
        .insert_alert_rule(&NewAlertRule {
            name: "silent device".to_string(),
            scope: AlertScope::Offline,
            subject_pattern: "*".to_string(),
            enabled: false,
            config_json: "{}".to_string(),
        })
        .await
        .unwrap();

    let enabled = store.list_enabled_alert_rules().await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].name, "high draw");

    let updated = store
        .update_alert_rule(
            &created.id,
            &AlertRuleUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!updated.enabled);
    assert!(store.list_enabled_alert_rules().await.unwrap().is_empty());

    assert!(store.delete_alert_rule(&created.id).await.unwrap());
    assert!(store.get_alert_rule_by_id(&created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_creates_then_updates_then_reports_unchanged() {
    let store = memory_store().await;

    let first = store
        .upsert_active_alert(&draft("meter-1", Severity::Warning, "over limit"))
        .await
        .unwrap();
    let created = match first {
        UpsertOutcome::Created(a) => a,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(created.state, AlertState::Unread);

    let second = store
        .upsert_active_alert(&draft("meter-1", Severity::Critical, "way over limit"))
        .await
        .unwrap();
    let updated = match second {
        UpsertOutcome::Updated(a) => a,
        other => panic!("expected Updated, got {other:?}"),
    };
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.severity, Severity::Critical);

    let third = store
        .upsert_active_alert(&draft("meter-1", Severity::Critical, "way over limit"))
        .await
        .unwrap();
    assert!(matches!(third, UpsertOutcome::Unchanged(_)));

    // still exactly one row for the key
    assert_eq!(store.count_alerts(&AlertFilter::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn at_most_one_active_alert_per_subject_and_scope() {
    let store = memory_store().await;

    store
        .upsert_active_alert(&draft("meter-1", Severity::Warning, "over limit"))
        .await
        .unwrap();
    let active = store
        .find_active_alert(&SubjectKey::device("meter-1"), AlertScope::Consumption)
        .await
        .unwrap()
        .unwrap();

    store.resolve_alert(&active.id, Utc::now()).await.unwrap();
    assert!(store
        .find_active_alert(&SubjectKey::device("meter-1"), AlertScope::Consumption)
        .await
        .unwrap()
        .is_none());

    // a fresh breach after resolution is a new row
    let next = store
        .upsert_active_alert(&draft("meter-1", Severity::Warning, "over limit"))
        .await
        .unwrap();
    let fresh = match next {
        UpsertOutcome::Created(a) => a,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_ne!(fresh.id, active.id);
    assert_eq!(store.count_alerts(&AlertFilter::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn mark_read_only_moves_unread_forward() {
    let store = memory_store().await;
    let created = match store
        .upsert_active_alert(&draft("meter-1", Severity::Warning, "over limit"))
        .await
        .unwrap()
    {
        UpsertOutcome::Created(a) => a,
        other => panic!("expected Created, got {other:?}"),
    };

    let read = store.mark_alert_read(&created.id).await.unwrap().unwrap();
    assert_eq!(read.state, AlertState::Read);

    // idempotent
    let again = store.mark_alert_read(&created.id).await.unwrap().unwrap();
    assert_eq!(again.state, AlertState::Read);

    let resolved = store
        .resolve_alert(&created.id, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.state, AlertState::Resolved);
    assert!(resolved.resolved_at.is_some());

    // reading a resolved alert does not reopen it
    let after = store.mark_alert_read(&created.id).await.unwrap().unwrap();
    assert_eq!(after.state, AlertState::Resolved);
}

#[tokio::test]
async fn alert_filters_narrow_by_state_scope_and_subject() {
    let store = memory_store().await;
    store
        .upsert_active_alert(&draft("meter-1", Severity::Warning, "over limit"))
        .await
        .unwrap();
    store
        .upsert_active_alert(&AlertDraft {
            subject: SubjectKey::location("Porto", "PT"),
            scope: AlertScope::Weather,
            severity: Severity::Info,
            message: "low irradiation".to_string(),
            value: Some(0.45),
            threshold: Some(0.6),
        })
        .await
        .unwrap();

    let weather = store
        .list_alerts(
            &AlertFilter {
                scope_eq: Some(AlertScope::Weather),
                ..Default::default()
            },
            50,
            0,
        )
        .await
        .unwrap();
    assert_eq!(weather.len(), 1);
    assert_eq!(weather[0].subject, SubjectKey::location("Porto", "PT"));

    let unread = AlertFilter {
        state_eq: Some(AlertState::Unread),
        ..Default::default()
    };
    assert_eq!(store.count_alerts(&unread).await.unwrap(), 2);

    let by_subject = store
        .list_alerts(
            &AlertFilter {
                subject_eq: Some("device:meter-1".to_string()),
                ..Default::default()
            },
            50,
            0,
        )
        .await
        .unwrap();
    assert_eq!(by_subject.len(), 1);
    assert_eq!(by_subject[0].scope, AlertScope::Consumption);
}

#[tokio::test]
async fn store_satisfies_the_engine_contract() {
    let store = memory_store().await;
    let engine_store: &dyn AlertStore = &store;

    let outcome = engine_store
        .upsert_active(&draft("meter-1", Severity::Warning, "over limit"))
        .await
        .unwrap();
    let alert = match outcome {
        UpsertOutcome::Created(a) => a,
        other => panic!("expected Created, got {other:?}"),
    };

    let found = engine_store
        .find_active(&SubjectKey::device("meter-1"), AlertScope::Consumption)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, alert.id);

    engine_store.resolve(&alert.id, Utc::now()).await.unwrap();
    assert!(engine_store
        .find_active(&SubjectKey::device("meter-1"), AlertScope::Consumption)
        .await
        .unwrap()
        .is_none());
}
