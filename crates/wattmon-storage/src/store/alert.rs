use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
};
use wattmon_alert::engine::{AlertDraft, AlertStore, StoreError, UpsertOutcome};
use wattmon_common::types::{Alert, AlertScope, AlertState, Severity, SubjectKey};

use crate::entities::alert::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

const RESOLVED: &str = "resolved";

/// Alert list filter.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub state_eq: Option<AlertState>,
    pub scope_eq: Option<AlertScope>,
    pub severity_eq: Option<Severity>,
    pub subject_eq: Option<String>,
    /// Only `unread` and `read` alerts.
    pub active_only: bool,
}

fn to_alert(m: alert::Model) -> Result<Alert> {
    fn parse<T: std::str::FromStr<Err = String>>(
        raw: &str,
        column: &'static str,
    ) -> Result<T> {
        raw.parse()
            .map_err(|message| StorageError::InvalidColumn { column, message })
    }

    Ok(Alert {
        subject: parse(&m.subject, "subject")?,
        scope: parse(&m.scope, "scope")?,
        severity: parse(&m.severity, "severity")?,
        state: parse(&m.state, "state")?,
        id: m.id,
        message: m.message,
        value: m.value,
        threshold: m.threshold,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn apply_filter(mut q: sea_orm::Select<Entity>, filter: &AlertFilter) -> sea_orm::Select<Entity> {
    if let Some(state) = filter.state_eq {
        q = q.filter(Column::State.eq(state.to_string()));
    }
    if filter.active_only {
        q = q.filter(Column::State.ne(RESOLVED));
    }
    if let Some(scope) = filter.scope_eq {
        q = q.filter(Column::Scope.eq(scope.to_string()));
    }
    if let Some(severity) = filter.severity_eq {
        q = q.filter(Column::Severity.eq(severity.to_string()));
    }
    if let Some(subject) = &filter.subject_eq {
        q = q.filter(Column::Subject.eq(subject.clone()));
    }
    q
}

impl Store {
    pub async fn list_alerts(
        &self,
        filter: &AlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Alert>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_alert).collect()
    }

    pub async fn count_alerts(&self, filter: &AlertFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), filter)
            .count(self.db())
            .await?)
    }

    pub async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        model.map(to_alert).transpose()
    }

    /// User action: `unread` becomes `read`. Reading an already-read or
    /// resolved alert changes nothing.
    pub async fn mark_alert_read(&self, id: &str) -> Result<Option<Alert>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(None);
        };
        if m.state != AlertState::Unread.to_string() {
            return to_alert(m).map(Some);
        }
        let mut am: alert::ActiveModel = m.into();
        am.state = Set(AlertState::Read.to_string());
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        to_alert(updated).map(Some)
    }

    /// Transition an alert to `resolved`, stamping `resolved_at`. Used by
    /// the user action and by the engine's auto-resolution. Resolving an
    /// already-resolved alert changes nothing.
    pub async fn resolve_alert(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Alert>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(None);
        };
        if m.state == RESOLVED {
            return to_alert(m).map(Some);
        }
        let mut am: alert::ActiveModel = m.into();
        am.state = Set(AlertState::Resolved.to_string());
        am.resolved_at = Set(Some(at.fixed_offset()));
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        to_alert(updated).map(Some)
    }

    pub async fn find_active_alert(
        &self,
        subject: &SubjectKey,
        scope: AlertScope,
    ) -> Result<Option<Alert>> {
        let model = Entity::find()
            .filter(Column::Subject.eq(subject.to_string()))
            .filter(Column::Scope.eq(scope.to_string()))
            .filter(Column::State.ne(RESOLVED))
            .one(self.db())
            .await?;
        model.map(to_alert).transpose()
    }

    /// Atomic per-(subject, scope) upsert of the active alert. Runs in a
    /// transaction; a racing insert surfaces as `Conflict` via the partial
    /// unique index on active alerts.
    pub async fn upsert_active_alert(&self, draft: &AlertDraft) -> Result<UpsertOutcome> {
        let txn = self.db.begin().await?;

        let existing = Entity::find()
            .filter(Column::Subject.eq(draft.subject.to_string()))
            .filter(Column::Scope.eq(draft.scope.to_string()))
            .filter(Column::State.ne(RESOLVED))
            .one(&txn)
            .await?;

        let outcome = match existing {
            Some(m) => {
                let unchanged = m.severity == draft.severity.to_string()
                    && m.message == draft.message
                    && m.value == draft.value
                    && m.threshold == draft.threshold;
                if unchanged {
                    UpsertOutcome::Unchanged(to_alert(m)?)
                } else {
                    let mut am: alert::ActiveModel = m.into();
                    am.severity = Set(draft.severity.to_string());
                    am.message = Set(draft.message.clone());
                    am.value = Set(draft.value);
                    am.threshold = Set(draft.threshold);
                    am.updated_at = Set(Utc::now().fixed_offset());
                    let updated = am.update(&txn).await?;
                    UpsertOutcome::Updated(to_alert(updated)?)
                }
            }
            None => {
                let now = Utc::now().fixed_offset();
                let am = alert::ActiveModel {
                    id: Set(wattmon_common::id::next_id()),
                    subject: Set(draft.subject.to_string()),
                    scope: Set(draft.scope.to_string()),
                    severity: Set(draft.severity.to_string()),
                    message: Set(draft.message.clone()),
                    value: Set(draft.value),
                    threshold: Set(draft.threshold),
                    state: Set(AlertState::Unread.to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    resolved_at: Set(None),
                };
                let inserted = am.insert(&txn).await.map_err(|e| {
                    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                        StorageError::Conflict
                    } else {
                        StorageError::Database(e)
                    }
                })?;
                UpsertOutcome::Created(to_alert(inserted)?)
            }
        };

        txn.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl AlertStore for Store {
    async fn find_active(
        &self,
        subject: &SubjectKey,
        scope: AlertScope,
    ) -> std::result::Result<Option<Alert>, StoreError> {
        self.find_active_alert(subject, scope)
            .await
            .map_err(into_store_error)
    }

    async fn upsert_active(
        &self,
        draft: &AlertDraft,
    ) -> std::result::Result<UpsertOutcome, StoreError> {
        self.upsert_active_alert(draft)
            .await
            .map_err(into_store_error)
    }

    async fn resolve(
        &self,
        alert_id: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<(), StoreError> {
        match self.resolve_alert(alert_id, at).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(StoreError::Backend(format!(
                "no alert with id {alert_id}"
            ))),
            Err(e) => Err(into_store_error(e)),
        }
    }
}

fn into_store_error(e: StorageError) -> StoreError {
    match e {
        StorageError::Conflict => StoreError::Conflict,
        other => StoreError::Backend(other.to_string()),
    }
}
