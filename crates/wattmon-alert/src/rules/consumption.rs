use chrono::{DateTime, Duration, Utc};
use wattmon_common::types::{AlertScope, Severity};

use crate::snapshot::SubjectState;
use crate::{AlertRule, Finding, SkipReason, Verdict};

/// Device consumption vs its configured threshold, graded by severity
/// bands on the ratio of observed draw to the threshold.
///
/// The observed value is the mean of readings inside `sample_window_secs`
/// (a short moving aggregate, to avoid flapping on single noisy samples),
/// falling back to the latest reading when the window is empty.
pub struct ConsumptionRule {
    pub id: String,
    pub name: String,
    pub device_pattern: String,
    /// Ratio above which the alert is `warning` (default 1.0). A draw at
    /// exactly the threshold does not alert.
    pub warning_ratio: f64,
    /// Ratio above which the alert escalates to `critical` (default 1.5).
    pub critical_ratio: f64,
    pub sample_window_secs: u64,
}

impl ConsumptionRule {
    fn observed_watts(&self, state: &crate::snapshot::DeviceState, now: DateTime<Utc>) -> Option<f64> {
        let cutoff = now - Duration::seconds(self.sample_window_secs as i64);
        let mut sum = 0.0;
        let mut count = 0usize;
        for reading in &state.readings {
            if reading.timestamp >= cutoff {
                sum += reading.power_watts;
                count += 1;
            }
        }
        if count > 0 {
            return Some(sum / count as f64);
        }
        state.latest_reading().map(|r| r.power_watts)
    }
}

impl AlertRule for ConsumptionRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> AlertScope {
        AlertScope::Consumption
    }

    fn subject_pattern(&self) -> &str {
        &self.device_pattern
    }

    fn evaluate(&self, subject: &SubjectState<'_>, now: DateTime<Utc>) -> Verdict {
        let SubjectState::Device(state) = subject else {
            return Verdict::Skip(SkipReason::DataUnavailable);
        };

        let Some(threshold) = state.entry.max_power_watts else {
            return Verdict::Skip(SkipReason::ConfigMissing);
        };
        if threshold <= 0.0 {
            return Verdict::Skip(SkipReason::ConfigMissing);
        }

        let Some(watts) = self.observed_watts(state, now) else {
            return Verdict::Skip(SkipReason::DataUnavailable);
        };

        let ratio = watts / threshold;
        let severity = if ratio > self.critical_ratio {
            Severity::Critical
        } else if ratio > self.warning_ratio {
            Severity::Warning
        } else {
            return Verdict::Clear;
        };

        Verdict::Trigger(Finding {
            severity,
            message: format!(
                "{} is drawing {:.0} W, {:.0}% of its {:.0} W limit",
                state.entry.name,
                watts,
                ratio * 100.0,
                threshold,
            ),
            value: Some(watts),
            threshold: Some(threshold),
        })
    }
}
