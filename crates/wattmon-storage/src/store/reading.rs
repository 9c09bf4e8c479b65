use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use wattmon_common::types::{Reading, ReadingSource};

use crate::entities::reading::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

/// A reading to ingest. `timestamp` defaults to now when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReading {
    pub device_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub power_watts: f64,
    pub source: ReadingSource,
}

fn to_reading(m: reading::Model) -> Result<Reading> {
    Ok(Reading {
        id: m.id,
        device_id: m.device_id,
        timestamp: m.timestamp.with_timezone(&Utc),
        power_watts: m.power_watts,
        source: m
            .source
            .parse()
            .map_err(|message| StorageError::InvalidColumn {
                column: "source",
                message,
            })?,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl Store {
    /// Append a reading and stamp the device's `last_seen`. Readings are
    /// immutable once recorded.
    pub async fn insert_reading(&self, new: &NewReading) -> Result<Reading> {
        let now = Utc::now();
        let ts = new.timestamp.unwrap_or(now);
        let am = reading::ActiveModel {
            id: Set(wattmon_common::id::next_id()),
            device_id: Set(new.device_id.clone()),
            timestamp: Set(ts.fixed_offset()),
            power_watts: Set(new.power_watts),
            source: Set(new.source.to_string()),
            created_at: Set(now.fixed_offset()),
        };
        let model = am.insert(self.db()).await?;
        self.touch_device_last_seen(&new.device_id, ts).await?;
        to_reading(model)
    }

    pub async fn latest_reading(&self, device_id: &str) -> Result<Option<Reading>> {
        let model = Entity::find()
            .filter(Column::DeviceId.eq(device_id))
            .order_by(Column::Timestamp, Order::Desc)
            .one(self.db())
            .await?;
        model.map(to_reading).transpose()
    }

    /// Readings for a device since `since`, oldest first.
    pub async fn recent_readings(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let rows = Entity::find()
            .filter(Column::DeviceId.eq(device_id))
            .filter(Column::Timestamp.gte(since.fixed_offset()))
            .order_by(Column::Timestamp, Order::Asc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_reading).collect()
    }

    pub async fn list_readings(
        &self,
        device_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Reading>> {
        let mut q = Entity::find();
        if let Some(id) = device_id {
            q = q.filter(Column::DeviceId.eq(id));
        }
        let rows = q
            .order_by(Column::Timestamp, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_reading).collect()
    }

    pub async fn count_readings(&self, device_id: Option<&str>) -> Result<u64> {
        let mut q = Entity::find();
        if let Some(id) = device_id {
            q = q.filter(Column::DeviceId.eq(id));
        }
        Ok(q.count(self.db()).await?)
    }
}
