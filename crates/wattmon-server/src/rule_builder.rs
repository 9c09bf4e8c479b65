use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use wattmon_alert::engine::AlertEngine;
use wattmon_alert::rules::consumption::ConsumptionRule;
use wattmon_alert::rules::offline::OfflineRule;
use wattmon_alert::rules::weather::WeatherRule;
use wattmon_alert::AlertRule;
use wattmon_common::types::{AlertScope, Severity};
use wattmon_storage::{AlertRuleRow, Store};

// ---- Per-scope config JSON schemas ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionConfig {
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,
    #[serde(default = "default_sample_window_secs")]
    pub sample_window_secs: u64,
}

fn default_warning_ratio() -> f64 {
    1.0
}

fn default_critical_ratio() -> f64 {
    1.5
}

fn default_sample_window_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    #[serde(default = "default_missed_cycles")]
    pub missed_cycles: u32,
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
}

fn default_missed_cycles() -> u32 {
    3
}

fn default_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Irradiation factor floor; below it the location alerts
    #[serde(default)]
    pub min_irradiation: Option<f64>,
    /// Temperature floor in degrees Celsius
    #[serde(default)]
    pub min_temperature: Option<f64>,
    /// Temperature ceiling in degrees Celsius
    #[serde(default)]
    pub max_temperature: Option<f64>,
    #[serde(default = "default_irradiation_severity")]
    pub low_irradiation_severity: Severity,
    #[serde(default = "default_temperature_severity")]
    pub temperature_severity: Severity,
}

fn default_irradiation_severity() -> Severity {
    Severity::Info
}

fn default_temperature_severity() -> Severity {
    Severity::Warning
}

/// Check a rule config parses for its scope, without building the rule.
/// Used by the API before accepting a create/update.
pub fn validate_rule_config(scope: AlertScope, config_json: &str) -> Result<()> {
    match scope {
        AlertScope::Consumption => {
            let cfg: ConsumptionConfig = serde_json::from_str(config_json)
                .map_err(|e| anyhow::anyhow!("invalid consumption config: {e}"))?;
            if cfg.warning_ratio <= 0.0 || cfg.critical_ratio < cfg.warning_ratio {
                anyhow::bail!(
                    "consumption config requires 0 < warning_ratio <= critical_ratio"
                );
            }
        }
        AlertScope::Offline => {
            let cfg: OfflineConfig = serde_json::from_str(config_json)
                .map_err(|e| anyhow::anyhow!("invalid offline config: {e}"))?;
            if cfg.missed_cycles == 0 {
                anyhow::bail!("offline config requires missed_cycles >= 1");
            }
        }
        AlertScope::Weather => {
            let cfg: WeatherConfig = serde_json::from_str(config_json)
                .map_err(|e| anyhow::anyhow!("invalid weather config: {e}"))?;
            if let (Some(min), Some(max)) = (cfg.min_temperature, cfg.max_temperature) {
                if min >= max {
                    anyhow::bail!("weather config requires min_temperature < max_temperature");
                }
            }
        }
    }
    Ok(())
}

// ---- DB row -> AlertRule trait object ----

/// Convert a single `AlertRuleRow` into a `Box<dyn AlertRule>`.
pub fn build_rule_from_row(row: &AlertRuleRow) -> Result<Box<dyn AlertRule>> {
    match row.scope {
        AlertScope::Consumption => {
            let cfg: ConsumptionConfig = serde_json::from_str(&row.config_json)
                .map_err(|e| anyhow::anyhow!("invalid consumption config: {e}"))?;
            Ok(Box::new(ConsumptionRule {
                id: row.id.clone(),
                name: row.name.clone(),
                device_pattern: row.subject_pattern.clone(),
                warning_ratio: cfg.warning_ratio,
                critical_ratio: cfg.critical_ratio,
                sample_window_secs: cfg.sample_window_secs,
            }))
        }
        AlertScope::Offline => {
            let cfg: OfflineConfig = serde_json::from_str(&row.config_json)
                .map_err(|e| anyhow::anyhow!("invalid offline config: {e}"))?;
            Ok(Box::new(OfflineRule {
                id: row.id.clone(),
                name: row.name.clone(),
                device_pattern: row.subject_pattern.clone(),
                missed_cycles: cfg.missed_cycles,
                default_interval_secs: cfg.default_interval_secs,
            }))
        }
        AlertScope::Weather => {
            let cfg: WeatherConfig = serde_json::from_str(&row.config_json)
                .map_err(|e| anyhow::anyhow!("invalid weather config: {e}"))?;
            Ok(Box::new(WeatherRule {
                id: row.id.clone(),
                name: row.name.clone(),
                location_pattern: row.subject_pattern.clone(),
                min_irradiation: cfg.min_irradiation,
                min_temperature: cfg.min_temperature,
                max_temperature: cfg.max_temperature,
                low_irradiation_severity: cfg.low_irradiation_severity,
                temperature_severity: cfg.temperature_severity,
            }))
        }
    }
}

/// Convert multiple rows into trait objects, skipping invalid ones with warnings.
pub fn build_rules_from_rows(rows: &[AlertRuleRow]) -> Vec<Box<dyn AlertRule>> {
    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        match build_rule_from_row(row) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(
                    rule_id = %row.id,
                    rule_name = %row.name,
                    scope = %row.scope,
                    error = %e,
                    "Skipping invalid alert rule"
                );
            }
        }
    }
    rules
}

// ---- Engine reload ----

/// Reload alert engine rules from the database. Returns the number of
/// loaded rules.
pub async fn reload_alert_engine(
    store: &Store,
    engine: &Mutex<AlertEngine>,
) -> Result<usize> {
    let rows = store.list_enabled_alert_rules().await?;
    let rules = build_rules_from_rows(&rows);
    let count = rules.len();

    engine.lock().await.replace_rules(rules);

    tracing::info!(rule_count = count, "Alert engine reloaded from DB");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(scope: AlertScope, config: &str) -> AlertRuleRow {
        AlertRuleRow {
            id: "r1".to_string(),
            name: "test".to_string(),
            scope,
            subject_pattern: "*".to_string(),
            enabled: true,
            config_json: config.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn consumption_config_defaults_apply() {
        let rule = build_rule_from_row(&row(AlertScope::Consumption, "{}")).unwrap();
        assert_eq!(rule.scope(), AlertScope::Consumption);
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(build_rule_from_row(&row(AlertScope::Offline, "not json")).is_err());
    }

    #[test]
    fn invalid_rows_are_skipped_not_fatal() {
        let rows = vec![
            row(AlertScope::Consumption, "{}"),
            row(AlertScope::Weather, "{{"),
            row(AlertScope::Offline, "{}"),
        ];
        assert_eq!(build_rules_from_rows(&rows).len(), 2);
    }

    #[test]
    fn validate_rejects_inverted_ratios() {
        let config = r#"{"warning_ratio": 2.0, "critical_ratio": 1.0}"#;
        assert!(validate_rule_config(AlertScope::Consumption, config).is_err());
        assert!(validate_rule_config(AlertScope::Consumption, "{}").is_ok());
    }

    #[test]
    fn validate_rejects_inverted_temperature_band() {
        let config = r#"{"min_temperature": 30.0, "max_temperature": 10.0}"#;
        assert!(validate_rule_config(AlertScope::Weather, config).is_err());
    }
}
