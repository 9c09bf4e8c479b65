use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// SeaORM connection URL. Defaults to a SQLite file under `data_dir`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// CORS allowed origins; empty allows any origin (development mode).
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_evaluation_enabled")]
    pub enabled: bool,
    /// Seconds between evaluation passes.
    #[serde(default = "default_evaluation_interval_secs")]
    pub interval_secs: u64,
    /// How far back readings feed the consumption check.
    #[serde(default = "default_reading_window_secs")]
    pub reading_window_secs: u64,
    /// Missed reporting cycles before a device counts as offline. Seeds
    /// the default offline rule; per-rule config overrides it.
    #[serde(default = "default_staleness_multiplier")]
    pub staleness_multiplier: u32,
    /// Reporting interval assumed for devices that declare none.
    #[serde(default = "default_device_interval_secs")]
    pub default_device_interval_secs: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: default_evaluation_enabled(),
            interval_secs: default_evaluation_interval_secs(),
            reading_window_secs: default_reading_window_secs(),
            staleness_multiplier: default_staleness_multiplier(),
            default_device_interval_secs: default_device_interval_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_evaluation_enabled() -> bool {
    true
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_reading_window_secs() -> u64 {
    600
}

fn default_staleness_multiplier() -> u32 {
    3
}

fn default_device_interval_secs() -> u64 {
    300
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn connection_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}/wattmon.db?mode=rwc", self.data_dir),
        }
    }
}
