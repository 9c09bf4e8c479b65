use wattmon_common::types::AlertScope;
use wattmon_storage::{AlertRuleFilter, NewAlertRule, Store};

use crate::config::EvaluationConfig;

/// Default alert rule definitions for first-time startup. The offline and
/// consumption defaults pick up the evaluation settings so the seeded
/// rules agree with the scheduler's windows.
fn default_rules(config: &EvaluationConfig) -> Vec<NewAlertRule> {
    vec![
        NewAlertRule {
            name: "Consumption over device limit".to_string(),
            scope: AlertScope::Consumption,
            subject_pattern: "*".to_string(),
            enabled: true,
            config_json: serde_json::json!({
                "warning_ratio": 1.0,
                "critical_ratio": 1.5,
                "sample_window_secs": config.reading_window_secs,
            })
            .to_string(),
        },
        NewAlertRule {
            name: "Device stopped reporting".to_string(),
            scope: AlertScope::Offline,
            subject_pattern: "*".to_string(),
            enabled: true,
            config_json: serde_json::json!({
                "missed_cycles": config.staleness_multiplier,
                "default_interval_secs": config.default_device_interval_secs,
            })
            .to_string(),
        },
        NewAlertRule {
            name: "Poor solar conditions".to_string(),
            scope: AlertScope::Weather,
            subject_pattern: "*".to_string(),
            enabled: true,
            config_json: serde_json::json!({"min_irradiation": 0.6}).to_string(),
        },
    ]
}

/// Initialize default alert rules if the database has no rules yet.
/// Only seeds when the alert_rules table is empty.
pub async fn init_default_rules(store: &Store, config: &EvaluationConfig) -> anyhow::Result<usize> {
    let count = store.count_alert_rules(&AlertRuleFilter::default()).await?;
    if count > 0 {
        tracing::debug!(
            existing = count,
            "Alert rules already exist, skipping seed initialization"
        );
        return Ok(0);
    }

    let defaults = default_rules(config);
    let total = defaults.len();
    let mut inserted = 0usize;
    for new in defaults {
        match store.insert_alert_rule(&new).await {
            Ok(_) => {
                inserted += 1;
                tracing::info!(name = %new.name, scope = %new.scope, "Seeded alert rule");
            }
            Err(e) => {
                tracing::warn!(name = %new.name, error = %e, "Failed to seed alert rule");
            }
        }
    }

    tracing::info!(inserted, total, "Default alert rules initialized");
    Ok(inserted)
}
