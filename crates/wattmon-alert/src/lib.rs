//! Alert rule engine for home energy monitoring.
//!
//! The engine runs one pass ([`engine::AlertEngine::evaluate`]) over an
//! [`snapshot::EvaluationSnapshot`] of devices and locations, evaluates the
//! registered [`AlertRule`] implementations, and reconciles the result
//! against the active-alert set behind the [`engine::AlertStore`] trait:
//! newly true conditions insert an alert, still-true conditions update the
//! existing one in place, and cleared conditions auto-resolve it. Built-in
//! rule types cover consumption thresholds, offline detection, and weather
//! conditions.

pub mod engine;
pub mod rules;
pub mod snapshot;
pub mod window;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use wattmon_common::types::{AlertScope, Severity};

use crate::snapshot::SubjectState;

/// Why a rule declined to evaluate a subject. Skips are scoped to the
/// single subject/check pair and never abort the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No threshold or rule configuration for this subject.
    ConfigMissing,
    /// No recent reading or forecast to decide on.
    DataUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ConfigMissing => write!(f, "config_missing"),
            SkipReason::DataUnavailable => write!(f, "data_unavailable"),
        }
    }
}

/// A triggered condition, ready to be upserted as an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    /// Observed value (watts, irradiation factor, °C).
    pub value: Option<f64>,
    /// Threshold the value was compared against.
    pub threshold: Option<f64>,
}

/// Outcome of evaluating one rule against one subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The condition holds; an alert should be active.
    Trigger(Finding),
    /// The condition was evaluated and is false; any active alert for the
    /// (subject, scope) key auto-resolves.
    Clear,
    /// The subject could not be evaluated; existing alert state is left
    /// untouched until the next successful pass.
    Skip(SkipReason),
}

/// An alert rule evaluated once per subject per pass.
///
/// Rules are pure: given the same subject state and clock they return the
/// same verdict. Deduplication and resolution are the engine's concern,
/// not the rule's.
pub trait AlertRule: Send + Sync {
    /// Unique identifier for this rule instance (e.g. `"high-draw-1"`).
    fn id(&self) -> &str;

    /// Human-readable name (e.g. `"Living room high consumption"`).
    fn name(&self) -> &str;

    /// The alert scope this rule produces.
    fn scope(&self) -> AlertScope;

    /// A glob pattern matching subject keys: device IDs for device-scoped
    /// rules, `city,country` for weather rules (e.g. `"plug-*"` or `"*"`).
    fn subject_pattern(&self) -> &str;

    /// Evaluates the subject and returns a verdict.
    fn evaluate(&self, subject: &SubjectState<'_>, now: DateTime<Utc>) -> Verdict;
}

pub(crate) fn subject_matches(pattern: &str, subject_id: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    glob_match::glob_match(pattern, subject_id)
}
