use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use wattmon_alert::engine::{AlertEngine, PassReport};
use wattmon_alert::snapshot::{DeviceState, EvaluationSnapshot, LocationState};
use wattmon_storage::{DeviceFilter, Store};

use crate::config::EvaluationConfig;
use crate::rule_builder;

const SNAPSHOT_PAGE_SIZE: usize = 500;

/// Periodic evaluation driver. Each tick rebuilds the rule set from
/// storage, snapshots devices, readings and forecasts, and runs one
/// engine pass. Holding the engine mutex across the pass keeps passes
/// from overlapping when one runs long.
pub struct EvaluationScheduler {
    store: Arc<Store>,
    engine: Arc<Mutex<AlertEngine>>,
    config: EvaluationConfig,
}

impl EvaluationScheduler {
    pub fn new(store: Arc<Store>, engine: Arc<Mutex<AlertEngine>>, config: EvaluationConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            reading_window_secs = self.config.reading_window_secs,
            "Evaluation scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tick.tick().await;
            match self.run_pass().await {
                Ok(report) if report.is_noop() => {}
                Ok(report) => {
                    tracing::info!(
                        evaluated = report.evaluated,
                        created = report.created,
                        updated = report.updated,
                        resolved = report.resolved,
                        errored = report.errored,
                        skipped = report.skipped.len(),
                        "Evaluation pass finished"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Evaluation pass failed");
                }
            }
        }
    }

    /// Run a single evaluation pass over the current store contents.
    pub async fn run_pass(&self) -> Result<PassReport> {
        // Held across the whole pass so passes never overlap
        let mut engine = self.engine.lock().await;

        // Pick up rule changes made since the previous tick
        let rows = self.store.list_enabled_alert_rules().await?;
        engine.replace_rules(rule_builder::build_rules_from_rows(&rows));

        let snapshot = self.build_snapshot().await?;
        let report = engine.evaluate(&snapshot, self.store.as_ref()).await;
        Ok(report)
    }

    async fn build_snapshot(&self) -> Result<EvaluationSnapshot> {
        let now = Utc::now();
        let mut snapshot = EvaluationSnapshot::new(now);
        let since = now - ChronoDuration::seconds(self.config.reading_window_secs as i64);

        // Devices with their trailing reading windows
        let filter = DeviceFilter::default();
        let mut offset = 0usize;
        let mut locations: BTreeSet<String> = BTreeSet::new();
        loop {
            let page = self
                .store
                .list_devices(&filter, SNAPSHOT_PAGE_SIZE, offset)
                .await?;
            let page_len = page.len();
            for entry in page {
                if let Some(location) = &entry.location {
                    locations.insert(location.clone());
                }
                let readings = self.store.recent_readings(&entry.device_id, since).await?;
                snapshot.devices.push(DeviceState::new(
                    entry,
                    readings,
                    self.config.reading_window_secs,
                    now,
                ));
            }
            if page_len < SNAPSHOT_PAGE_SIZE {
                break;
            }
            offset += SNAPSHOT_PAGE_SIZE;
        }

        // Latest forecast per location; device locations without one still
        // get a LocationState so the weather check reports the gap
        for record in self.store.latest_forecasts().await? {
            let location = record.location();
            locations.remove(&location);
            snapshot.locations.push(LocationState {
                location,
                forecast: Some(record),
            });
        }
        for location in locations {
            snapshot.locations.push(LocationState {
                location,
                forecast: None,
            });
        }

        Ok(snapshot)
    }
}
