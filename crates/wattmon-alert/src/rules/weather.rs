use chrono::{DateTime, Utc};
use wattmon_common::types::{AlertScope, Severity};

use crate::snapshot::SubjectState;
use crate::{AlertRule, Finding, SkipReason, Verdict};

/// Forecast conditions at a location: solar irradiation below the
/// configured floor, or temperature outside the configured range.
///
/// All thresholds are optional; a rule with none configured skips with
/// `ConfigMissing`. When several conditions hold at once the finding
/// takes the highest configured severity and joins the messages.
pub struct WeatherRule {
    pub id: String,
    pub name: String,
    /// Glob over location keys, `city,country`.
    pub location_pattern: String,
    /// Irradiation factor below which solar output is considered degraded.
    pub min_irradiation: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub low_irradiation_severity: Severity,
    pub temperature_severity: Severity,
}

impl AlertRule for WeatherRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> AlertScope {
        AlertScope::Weather
    }

    fn subject_pattern(&self) -> &str {
        &self.location_pattern
    }

    fn evaluate(&self, subject: &SubjectState<'_>, _now: DateTime<Utc>) -> Verdict {
        let SubjectState::Location(state) = subject else {
            return Verdict::Skip(SkipReason::DataUnavailable);
        };

        if self.min_irradiation.is_none()
            && self.min_temperature.is_none()
            && self.max_temperature.is_none()
        {
            return Verdict::Skip(SkipReason::ConfigMissing);
        }

        let Some(forecast) = &state.forecast else {
            return Verdict::Skip(SkipReason::DataUnavailable);
        };

        let mut severity: Option<Severity> = None;
        let mut messages = Vec::new();
        let mut value = None;
        let mut threshold = None;

        if let Some(floor) = self.min_irradiation {
            if forecast.irradiation_factor < floor {
                severity = Some(self.low_irradiation_severity);
                messages.push(format!(
                    "solar irradiation factor {:.2} below {:.2} ({})",
                    forecast.irradiation_factor, floor, forecast.condition,
                ));
                value = Some(forecast.irradiation_factor);
                threshold = Some(floor);
            }
        }

        let temp_breach = match (self.min_temperature, self.max_temperature) {
            (Some(min), _) if forecast.temperature < min => Some(min),
            (_, Some(max)) if forecast.temperature > max => Some(max),
            _ => None,
        };
        if let Some(limit) = temp_breach {
            severity = Some(severity.map_or(self.temperature_severity, |s| {
                s.max(self.temperature_severity)
            }));
            messages.push(format!(
                "temperature {:.1} °C outside configured range (limit {:.1} °C)",
                forecast.temperature, limit,
            ));
            if value.is_none() {
                value = Some(forecast.temperature);
                threshold = Some(limit);
            }
        }

        match severity {
            Some(severity) => Verdict::Trigger(Finding {
                severity,
                message: format!("{}: {}", state.location, messages.join("; ")),
                value,
                threshold,
            }),
            None => Verdict::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::LocationState;
    use crate::tests::forecast;
    use chrono::Utc;

    fn rule() -> WeatherRule {
        WeatherRule {
            id: "weather-1".into(),
            name: "Harsh conditions".into(),
            location_pattern: "*".into(),
            min_irradiation: Some(0.6),
            min_temperature: Some(5.0),
            max_temperature: Some(35.0),
            low_irradiation_severity: Severity::Warning,
            temperature_severity: Severity::Critical,
        }
    }

    fn location(irradiation: f64, temperature: f64) -> LocationState {
        LocationState {
            location: "Porto,PT".into(),
            forecast: Some(forecast("Porto", "PT", irradiation, temperature)),
        }
    }

    fn evaluate(rule: &WeatherRule, state: &LocationState) -> Verdict {
        rule.evaluate(&SubjectState::Location(state), Utc::now())
    }

    #[test]
    fn cold_snap_below_min_temperature_triggers() {
        let state = location(0.9, 2.0);
        match evaluate(&rule(), &state) {
            Verdict::Trigger(f) => {
                assert_eq!(f.severity, Severity::Critical);
                assert!(f.message.contains("temperature 2.0"));
                assert_eq!(f.value, Some(2.0));
                assert_eq!(f.threshold, Some(5.0));
            }
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn heat_above_max_temperature_triggers() {
        let state = location(0.9, 41.5);
        match evaluate(&rule(), &state) {
            Verdict::Trigger(f) => {
                assert_eq!(f.severity, Severity::Critical);
                assert!(f.message.contains("temperature 41.5"));
                assert_eq!(f.threshold, Some(35.0));
            }
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn temperature_exactly_at_the_bounds_is_clear() {
        // Only strictly outside the range counts as a breach
        assert_eq!(evaluate(&rule(), &location(0.9, 5.0)), Verdict::Clear);
        assert_eq!(evaluate(&rule(), &location(0.9, 35.0)), Verdict::Clear);
    }

    #[test]
    fn combined_breach_joins_messages_and_takes_highest_severity() {
        let state = location(0.4, 41.0);
        match evaluate(&rule(), &state) {
            Verdict::Trigger(f) => {
                assert_eq!(f.severity, Severity::Critical);
                assert!(f.message.starts_with("Porto,PT: "));
                assert!(f.message.contains("irradiation"));
                assert!(f.message.contains("; "));
                assert!(f.message.contains("temperature"));
                // The irradiation condition claims the value/threshold pair
                assert_eq!(f.value, Some(0.4));
                assert_eq!(f.threshold, Some(0.6));
            }
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn combined_breach_never_downgrades_the_irradiation_severity() {
        let rule = WeatherRule {
            low_irradiation_severity: Severity::Critical,
            temperature_severity: Severity::Warning,
            ..rule()
        };
        match evaluate(&rule, &location(0.4, 41.0)) {
            Verdict::Trigger(f) => assert_eq!(f.severity, Severity::Critical),
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn no_thresholds_configured_skips_config_missing() {
        let rule = WeatherRule {
            min_irradiation: None,
            min_temperature: None,
            max_temperature: None,
            ..rule()
        };
        assert_eq!(
            evaluate(&rule, &location(0.2, 50.0)),
            Verdict::Skip(SkipReason::ConfigMissing)
        );
    }
}
