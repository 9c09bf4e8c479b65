//! Persistence layer for devices, readings, forecasts, rules and alerts.
//!
//! [`Store`] is the unified access layer over SeaORM (SQLite by default,
//! any SeaORM-supported backend via the connection URL). It also
//! implements the engine's [`wattmon_alert::engine::AlertStore`] contract
//! with an atomic per-(subject, scope) upsert/resolve, backed by a partial
//! unique index on active alerts.

pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use store::{
    AlertFilter, AlertRuleFilter, AlertRuleRow, AlertRuleUpdate, DeviceFilter, NewAlertRule,
    NewDevice, NewForecast, NewReading, Store,
};
