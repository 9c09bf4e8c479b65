use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "forecasts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub city: String,
    pub country: String,
    pub forecast_date: DateTimeWithTimeZone,
    pub temperature: f64,
    pub humidity: i32,
    pub cloudiness: i32,
    pub condition: String,
    pub irradiation_factor: f64,
    pub fetched_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
