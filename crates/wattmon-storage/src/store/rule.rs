use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use wattmon_common::types::AlertScope;

use crate::entities::alert_rule::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

/// Alert rule configuration row (from the alert_rules table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRuleRow {
    pub id: String,
    pub name: String,
    pub scope: AlertScope,
    pub subject_pattern: String,
    pub enabled: bool,
    pub config_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub name: String,
    pub scope: AlertScope,
    pub subject_pattern: String,
    pub enabled: bool,
    pub config_json: String,
}

/// Partial rule update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertRuleUpdate {
    pub name: Option<String>,
    pub subject_pattern: Option<String>,
    pub enabled: Option<bool>,
    pub config_json: Option<String>,
}

/// Alert rule list filter.
#[derive(Debug, Clone, Default)]
pub struct AlertRuleFilter {
    pub scope_eq: Option<AlertScope>,
    pub enabled_eq: Option<bool>,
}

fn to_row(m: alert_rule::Model) -> Result<AlertRuleRow> {
    Ok(AlertRuleRow {
        id: m.id,
        name: m.name,
        scope: m
            .scope
            .parse()
            .map_err(|message| StorageError::InvalidColumn {
                column: "scope",
                message,
            })?,
        subject_pattern: m.subject_pattern,
        enabled: m.enabled,
        config_json: m.config_json,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn apply_filter(
    mut q: sea_orm::Select<Entity>,
    filter: &AlertRuleFilter,
) -> sea_orm::Select<Entity> {
    if let Some(scope) = filter.scope_eq {
        q = q.filter(Column::Scope.eq(scope.to_string()));
    }
    if let Some(enabled) = filter.enabled_eq {
        q = q.filter(Column::Enabled.eq(enabled));
    }
    q
}

impl Store {
    pub async fn insert_alert_rule(&self, new: &NewAlertRule) -> Result<AlertRuleRow> {
        let now = Utc::now().fixed_offset();
        let am = alert_rule::ActiveModel {
            id: Set(wattmon_common::id::next_id()),
            name: Set(new.name.clone()),
            scope: Set(new.scope.to_string()),
            subject_pattern: Set(new.subject_pattern.clone()),
            enabled: Set(new.enabled),
            config_json: Set(new.config_json.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        to_row(model)
    }

    pub async fn get_alert_rule_by_id(&self, id: &str) -> Result<Option<AlertRuleRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        model.map(to_row).transpose()
    }

    pub async fn list_alert_rules(
        &self,
        filter: &AlertRuleFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRuleRow>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    pub async fn count_alert_rules(&self, filter: &AlertRuleFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), filter)
            .count(self.db())
            .await?)
    }

    /// All enabled rules, in creation order. The scheduler rebuilds the
    /// engine's rule set from this on every pass.
    pub async fn list_enabled_alert_rules(&self) -> Result<Vec<AlertRuleRow>> {
        let rows = Entity::find()
            .filter(Column::Enabled.eq(true))
            .order_by(Column::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_row).collect()
    }

    pub async fn update_alert_rule(
        &self,
        id: &str,
        update: &AlertRuleUpdate,
    ) -> Result<Option<AlertRuleRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        let Some(m) = model else {
            return Ok(None);
        };
        let mut am: alert_rule::ActiveModel = m.into();
        if let Some(name) = &update.name {
            am.name = Set(name.clone());
        }
        if let Some(pattern) = &update.subject_pattern {
            am.subject_pattern = Set(pattern.clone());
        }
        if let Some(enabled) = update.enabled {
            am.enabled = Set(enabled);
        }
        if let Some(config) = &update.config_json {
            am.config_json = Set(config.clone());
        }
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        to_row(updated).map(Some)
    }

    pub async fn delete_alert_rule(&self, id: &str) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
