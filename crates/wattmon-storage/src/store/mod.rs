use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::error::Result;

pub mod alert;
pub mod device;
pub mod forecast;
pub mod reading;
pub mod rule;

pub use alert::AlertFilter;
pub use device::{DeviceFilter, NewDevice};
pub use forecast::NewForecast;
pub use reading::NewReading;
pub use rule::{AlertRuleFilter, AlertRuleRow, AlertRuleUpdate, NewAlertRule};

/// Unified access layer over the wattmon database.
///
/// All methods are `async fn` on SeaORM. Safe to share across the HTTP
/// handlers and the evaluation scheduler (`Clone` is cheap, the underlying
/// connection is pooled).
#[derive(Clone)]
pub struct Store {
    pub(crate) db: DatabaseConnection,
}

impl Store {
    /// Connect and initialize the database.
    ///
    /// `db_url` examples: `sqlite://data/wattmon.db?mode=rwc`,
    /// `sqlite::memory:`. Runs all pending migrations.
    pub async fn new(db_url: &str) -> Result<Self> {
        let mut options = ConnectOptions::new(db_url);
        if db_url.contains(":memory:") {
            // A pooled in-memory SQLite gives every connection its own
            // empty database; pin the pool to one connection
            options.max_connections(1);
        }
        let db = Database::connect(options).await?;

        // WAL mode only applies to file-backed SQLite
        if db_url.starts_with("sqlite://") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;
        tracing::info!(db_url = %db_url, "Initialized store");

        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
