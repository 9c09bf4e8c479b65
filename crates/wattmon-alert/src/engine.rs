use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wattmon_common::types::{Alert, AlertScope, Severity, SubjectKey};

use crate::snapshot::{EvaluationSnapshot, SubjectState};
use crate::{subject_matches, AlertRule, SkipReason, Verdict};

/// Errors an [`AlertStore`] can report back to the engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A concurrent writer touched the same active-alert key. The engine
    /// retries the operation once, then skips the subject.
    #[error("conflicting update on active alert key")]
    Conflict,

    #[error("alert store backend error: {0}")]
    Backend(String),
}

/// What should be active for a (subject, scope) key after a trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub subject: SubjectKey,
    pub scope: AlertScope,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

/// Whether an upsert created a new alert row, refreshed the existing one,
/// or found it already identical to the draft.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Created(Alert),
    Updated(Alert),
    /// The active alert already matches the draft; the row was left
    /// untouched so repeated passes over unchanged inputs cause no churn.
    Unchanged(Alert),
}

/// Keyed store of active alerts, `(subject, scope) -> Alert`.
///
/// Implementations must make `upsert_active` and `resolve` atomic per key
/// so two overlapping passes cannot both insert for the same pair. Each
/// call is its own unit; a pass abandoned mid-way leaves only committed
/// per-subject updates behind.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Looks up the active (not resolved) alert for a key, if any.
    async fn find_active(
        &self,
        subject: &SubjectKey,
        scope: AlertScope,
    ) -> Result<Option<Alert>, StoreError>;

    /// Inserts a new `unread` alert for the key, or updates the existing
    /// active one's severity, message, value and `updated_at` in place.
    /// The read/unread state of an existing alert is preserved, and a
    /// draft identical to the active alert must not touch the row.
    async fn upsert_active(&self, draft: &AlertDraft) -> Result<UpsertOutcome, StoreError>;

    /// Transitions an alert to `resolved`, stamping `resolved_at`.
    async fn resolve(&self, alert_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// A subject/check pair that was skipped during a pass, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSubject {
    pub subject: SubjectKey,
    pub rule_id: String,
    pub reason: SkipReason,
}

/// Summary of one complete evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Rule/subject pairs evaluated (including skips and errors).
    pub evaluated: u32,
    /// New alerts created.
    pub created: u32,
    /// Existing active alerts refreshed in place.
    pub updated: u32,
    /// Active alerts auto-resolved because their condition cleared.
    pub resolved: u32,
    /// Store failures after the conflict retry; the subject keeps its
    /// previous alert state until the next pass.
    pub errored: u32,
    pub skipped: Vec<SkippedSubject>,
}

impl PassReport {
    /// True when the pass changed no alert state at all.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.resolved == 0
    }
}

/// The evaluation engine: a set of rules applied to a snapshot.
///
/// The engine is scheduler-agnostic and single-shot per call; the caller
/// guarantees passes over the same subject set do not overlap.
pub struct AlertEngine {
    rules: Vec<Box<dyn AlertRule>>,
}

impl AlertEngine {
    pub fn new(rules: Vec<Box<dyn AlertRule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Box<dyn AlertRule>] {
        &self.rules
    }

    /// Replace all rules with a new set (e.g. after a config reload).
    pub fn replace_rules(&mut self, rules: Vec<Box<dyn AlertRule>>) {
        self.rules = rules;
    }

    /// Runs one pass over the snapshot, reconciling every matching
    /// (subject, rule) pair against the store. Idempotent: a second pass
    /// over an unchanged snapshot reports `is_noop()`.
    pub async fn evaluate(
        &self,
        snapshot: &EvaluationSnapshot,
        store: &dyn AlertStore,
    ) -> PassReport {
        let now = snapshot.taken_at;
        let mut report = PassReport::default();

        for device in &snapshot.devices {
            if !device.entry.is_active {
                continue;
            }
            let key = SubjectKey::device(&device.entry.device_id);
            let state = SubjectState::Device(device);
            for rule in &self.rules {
                if rule.scope() == AlertScope::Weather {
                    continue;
                }
                if !subject_matches(rule.subject_pattern(), &device.entry.device_id) {
                    continue;
                }
                self.apply(rule.as_ref(), &state, &key, now, store, &mut report)
                    .await;
            }
        }

        for location in &snapshot.locations {
            let key = SubjectKey::Location(location.location.clone());
            let state = SubjectState::Location(location);
            for rule in &self.rules {
                if rule.scope() != AlertScope::Weather {
                    continue;
                }
                if !subject_matches(rule.subject_pattern(), &location.location) {
                    continue;
                }
                self.apply(rule.as_ref(), &state, &key, now, store, &mut report)
                    .await;
            }
        }

        report
    }

    async fn apply(
        &self,
        rule: &dyn AlertRule,
        subject: &SubjectState<'_>,
        key: &SubjectKey,
        now: DateTime<Utc>,
        store: &dyn AlertStore,
        report: &mut PassReport,
    ) {
        report.evaluated += 1;

        match rule.evaluate(subject, now) {
            Verdict::Trigger(finding) => {
                let draft = AlertDraft {
                    subject: key.clone(),
                    scope: rule.scope(),
                    severity: finding.severity,
                    message: finding.message,
                    value: finding.value,
                    threshold: finding.threshold,
                };
                match with_conflict_retry(|| store.upsert_active(&draft)).await {
                    Ok(UpsertOutcome::Created(alert)) => {
                        tracing::info!(
                            subject = %key,
                            scope = %rule.scope(),
                            severity = %alert.severity,
                            "Alert created"
                        );
                        report.created += 1;
                    }
                    Ok(UpsertOutcome::Updated(_)) => {
                        report.updated += 1;
                    }
                    Ok(UpsertOutcome::Unchanged(_)) => {}
                    Err(e) => {
                        tracing::warn!(subject = %key, rule_id = rule.id(), error = %e, "Alert upsert failed");
                        report.errored += 1;
                    }
                }
            }
            Verdict::Clear => {
                match with_conflict_retry(|| store.find_active(key, rule.scope())).await {
                    Ok(Some(active)) => {
                        match with_conflict_retry(|| store.resolve(&active.id, now)).await {
                            Ok(()) => {
                                tracing::info!(subject = %key, scope = %rule.scope(), "Alert auto-resolved");
                                report.resolved += 1;
                            }
                            Err(e) => {
                                tracing::warn!(subject = %key, rule_id = rule.id(), error = %e, "Alert resolve failed");
                                report.errored += 1;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(subject = %key, rule_id = rule.id(), error = %e, "Active alert lookup failed");
                        report.errored += 1;
                    }
                }
            }
            Verdict::Skip(reason) => {
                tracing::debug!(subject = %key, rule_id = rule.id(), reason = %reason, "Subject skipped");
                report.skipped.push(SkippedSubject {
                    subject: key.clone(),
                    rule_id: rule.id().to_string(),
                    reason,
                });
            }
        }
    }
}

/// Conflicts on the per-key read-modify-write are retried once; any other
/// error, or a second conflict, is returned to the caller.
async fn with_conflict_retry<T, F, Fut>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Err(StoreError::Conflict) => {
            tracing::debug!("Store conflict, retrying once");
            op().await
        }
        other => other,
    }
}
