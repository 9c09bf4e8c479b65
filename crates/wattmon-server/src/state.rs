use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use wattmon_alert::engine::AlertEngine;
use wattmon_storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<Mutex<AlertEngine>>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}
