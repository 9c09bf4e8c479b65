use chrono::{DateTime, Duration, Utc};
use wattmon_common::types::{AlertScope, Severity};

use crate::snapshot::SubjectState;
use crate::{AlertRule, Finding, SkipReason, Verdict};

/// Device silent for longer than its staleness window.
///
/// The staleness window is the device's expected reporting interval times
/// `missed_cycles`; devices without a configured interval fall back to
/// `default_interval_secs`. Offline alerts are fixed `warning` severity,
/// and a fresh reading clears them on the pass that sees it.
pub struct OfflineRule {
    pub id: String,
    pub name: String,
    pub device_pattern: String,
    /// Multiplier on the expected interval before a device counts as
    /// offline (default 3).
    pub missed_cycles: u32,
    /// Interval assumed for devices without one configured.
    pub default_interval_secs: u64,
}

impl AlertRule for OfflineRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> AlertScope {
        AlertScope::Offline
    }

    fn subject_pattern(&self) -> &str {
        &self.device_pattern
    }

    fn evaluate(&self, subject: &SubjectState<'_>, now: DateTime<Utc>) -> Verdict {
        let SubjectState::Device(state) = subject else {
            return Verdict::Skip(SkipReason::DataUnavailable);
        };

        // A device that never reported cannot be distinguished from one
        // still being provisioned; leave it alone.
        let Some(last_seen) = state.entry.last_seen else {
            return Verdict::Skip(SkipReason::DataUnavailable);
        };

        let interval = state
            .entry
            .expected_interval_secs
            .unwrap_or(self.default_interval_secs);
        if interval == 0 {
            return Verdict::Skip(SkipReason::ConfigMissing);
        }

        let staleness = Duration::seconds((interval * u64::from(self.missed_cycles.max(1))) as i64);
        let silent_for = now - last_seen;
        if silent_for <= staleness {
            return Verdict::Clear;
        }

        Verdict::Trigger(Finding {
            severity: Severity::Warning,
            message: format!(
                "{} has not reported for {} min (expected every {} s)",
                state.entry.name,
                silent_for.num_minutes(),
                interval,
            ),
            value: Some(silent_for.num_seconds() as f64),
            threshold: Some(staleness.num_seconds() as f64),
        })
    }
}
