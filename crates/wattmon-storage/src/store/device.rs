use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use wattmon_common::types::{DeviceEntry, DeviceKind};

use crate::entities::device::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::Store;

/// Fields needed to register a new device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub device_id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub max_power_watts: Option<f64>,
    pub expected_interval_secs: Option<u64>,
    pub location: Option<String>,
    pub owner: Option<String>,
}

/// Device list filter.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub is_active_eq: Option<bool>,
    pub kind_eq: Option<DeviceKind>,
    pub location_eq: Option<String>,
}

fn to_entry(m: device::Model) -> Result<DeviceEntry> {
    Ok(DeviceEntry {
        id: m.id,
        device_id: m.device_id,
        name: m.name,
        kind: m
            .kind
            .parse()
            .map_err(|message| StorageError::InvalidColumn {
                column: "kind",
                message,
            })?,
        max_power_watts: m.max_power_watts,
        expected_interval_secs: m.expected_interval_secs.map(|v| v.max(0) as u64),
        location: m.location,
        is_active: m.is_active,
        owner: m.owner,
        last_seen: m.last_seen.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn apply_filter(
    mut q: sea_orm::Select<Entity>,
    filter: &DeviceFilter,
) -> sea_orm::Select<Entity> {
    if let Some(active) = filter.is_active_eq {
        q = q.filter(Column::IsActive.eq(active));
    }
    if let Some(kind) = filter.kind_eq {
        q = q.filter(Column::Kind.eq(kind.to_string()));
    }
    if let Some(location) = &filter.location_eq {
        q = q.filter(Column::Location.eq(location.clone()));
    }
    q
}

impl Store {
    pub async fn insert_device(&self, new: &NewDevice) -> Result<DeviceEntry> {
        let now = Utc::now().fixed_offset();
        let am = device::ActiveModel {
            id: Set(wattmon_common::id::next_id()),
            device_id: Set(new.device_id.clone()),
            name: Set(new.name.clone()),
            kind: Set(new.kind.to_string()),
            max_power_watts: Set(new.max_power_watts),
            expected_interval_secs: Set(new.expected_interval_secs.map(|v| v as i64)),
            location: Set(new.location.clone()),
            is_active: Set(true),
            owner: Set(new.owner.clone()),
            last_seen: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        to_entry(model)
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<DeviceEntry>> {
        let model = Entity::find()
            .filter(Column::DeviceId.eq(device_id))
            .one(self.db())
            .await?;
        model.map(to_entry).transpose()
    }

    pub async fn list_devices(
        &self,
        filter: &DeviceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeviceEntry>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::Name, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_entry).collect()
    }

    pub async fn count_devices(&self, filter: &DeviceFilter) -> Result<u64> {
        Ok(apply_filter(Entity::find(), filter)
            .count(self.db())
            .await?)
    }

    /// Update the consumption threshold for a device. Returns the updated
    /// entry, or `None` when the device does not exist.
    pub async fn update_device_threshold(
        &self,
        device_id: &str,
        max_power_watts: Option<f64>,
    ) -> Result<Option<DeviceEntry>> {
        let model = Entity::find()
            .filter(Column::DeviceId.eq(device_id))
            .one(self.db())
            .await?;
        let Some(m) = model else {
            return Ok(None);
        };
        let mut am: device::ActiveModel = m.into();
        am.max_power_watts = Set(max_power_watts);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        to_entry(updated).map(Some)
    }

    /// Stamp the device's `last_seen`, called on every ingested reading.
    pub async fn touch_device_last_seen(
        &self,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let model = Entity::find()
            .filter(Column::DeviceId.eq(device_id))
            .one(self.db())
            .await?;
        let Some(m) = model else {
            return Err(StorageError::NotFound {
                entity: "device",
                id: device_id.to_string(),
            });
        };
        let mut am: device::ActiveModel = m.into();
        am.last_seen = Set(Some(at.fixed_offset()));
        am.updated_at = Set(Utc::now().fixed_offset());
        am.update(self.db()).await?;
        Ok(())
    }

    pub async fn delete_device(&self, device_id: &str) -> Result<bool> {
        let res = Entity::delete_many()
            .filter(Column::DeviceId.eq(device_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }
}
