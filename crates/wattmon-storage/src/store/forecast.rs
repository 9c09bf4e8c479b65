use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use wattmon_common::types::{irradiation_factor, ForecastRecord};

use crate::entities::forecast::{self, Column, Entity};
use crate::error::Result;
use crate::store::Store;

/// A fetched forecast to record. The solar irradiation factor is derived
/// at ingest time from condition, cloudiness and humidity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewForecast {
    pub city: String,
    pub country: String,
    pub forecast_date: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: i32,
    pub cloudiness: i32,
    pub condition: String,
}

fn to_record(m: forecast::Model) -> ForecastRecord {
    ForecastRecord {
        id: m.id,
        city: m.city,
        country: m.country,
        forecast_date: m.forecast_date.with_timezone(&Utc),
        temperature: m.temperature,
        humidity: m.humidity,
        cloudiness: m.cloudiness,
        condition: m.condition,
        irradiation_factor: m.irradiation_factor,
        fetched_at: m.fetched_at.with_timezone(&Utc),
    }
}

impl Store {
    /// Record a fetched forecast. Superseded records are retained for
    /// history; "latest" is decided by `fetched_at`.
    pub async fn insert_forecast(&self, new: &NewForecast) -> Result<ForecastRecord> {
        let now = Utc::now().fixed_offset();
        let factor = irradiation_factor(&new.condition, new.cloudiness, new.humidity);
        let am = forecast::ActiveModel {
            id: Set(wattmon_common::id::next_id()),
            city: Set(new.city.clone()),
            country: Set(new.country.clone()),
            forecast_date: Set(new.forecast_date.fixed_offset()),
            temperature: Set(new.temperature),
            humidity: Set(new.humidity),
            cloudiness: Set(new.cloudiness),
            condition: Set(new.condition.clone()),
            irradiation_factor: Set(factor),
            fetched_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_record(model))
    }

    pub async fn latest_forecast(
        &self,
        city: &str,
        country: &str,
    ) -> Result<Option<ForecastRecord>> {
        let model = Entity::find()
            .filter(Column::City.eq(city))
            .filter(Column::Country.eq(country))
            .order_by(Column::FetchedAt, Order::Desc)
            .one(self.db())
            .await?;
        Ok(model.map(to_record))
    }

    /// The latest forecast for every location that ever had one. Used by
    /// the scheduler to build the evaluation snapshot.
    pub async fn latest_forecasts(&self) -> Result<Vec<ForecastRecord>> {
        let locations: Vec<(String, String)> = Entity::find()
            .select_only()
            .column(Column::City)
            .column(Column::Country)
            .group_by(Column::City)
            .group_by(Column::Country)
            .into_tuple()
            .all(self.db())
            .await?;

        let mut records = Vec::with_capacity(locations.len());
        for (city, country) in locations {
            if let Some(record) = self.latest_forecast(&city, &country).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
