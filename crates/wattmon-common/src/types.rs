use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use wattmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Rule category an alert belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertScope {
    /// Device consumption above its configured threshold.
    Consumption,
    /// Device silent for longer than its staleness window.
    Offline,
    /// Forecast condition at a location (low irradiation, extreme temperature).
    Weather,
}

impl std::fmt::Display for AlertScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertScope::Consumption => write!(f, "consumption"),
            AlertScope::Offline => write!(f, "offline"),
            AlertScope::Weather => write!(f, "weather"),
        }
    }
}

impl std::str::FromStr for AlertScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "consumption" => Ok(AlertScope::Consumption),
            "offline" => Ok(AlertScope::Offline),
            "weather" => Ok(AlertScope::Weather),
            _ => Err(format!("unknown alert scope: {s}")),
        }
    }
}

/// Lifecycle state of an alert. `Unread` and `Read` are both considered
/// active; only explicit resolution (user action or auto-resolution by the
/// engine) moves an alert to `Resolved`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Unread,
    Read,
    Resolved,
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertState::Resolved)
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Unread => write!(f, "unread"),
            AlertState::Read => write!(f, "read"),
            AlertState::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unread" => Ok(AlertState::Unread),
            "read" => Ok(AlertState::Read),
            "resolved" => Ok(AlertState::Resolved),
            _ => Err(format!("unknown alert state: {s}")),
        }
    }
}

/// The entity an alert concerns: a device or a location.
///
/// Serialized as `device:<device_id>` or `location:<city>,<country>` so the
/// pair (subject, scope) can act as the deduplication key in storage.
///
/// # Examples
///
/// ```
/// use wattmon_common::types::SubjectKey;
///
/// let key: SubjectKey = "device:heater-01".parse().unwrap();
/// assert_eq!(key, SubjectKey::Device("heater-01".to_string()));
/// assert_eq!(key.to_string(), "device:heater-01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKey {
    /// A device, by its external device ID.
    Device(String),
    /// A location, as `city,country`.
    Location(String),
}

impl SubjectKey {
    pub fn device(device_id: impl Into<String>) -> Self {
        SubjectKey::Device(device_id.into())
    }

    pub fn location(city: &str, country: &str) -> Self {
        SubjectKey::Location(format!("{city},{country}"))
    }
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectKey::Device(id) => write!(f, "device:{id}"),
            SubjectKey::Location(loc) => write!(f, "location:{loc}"),
        }
    }
}

impl std::str::FromStr for SubjectKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("device", id)) if !id.is_empty() => Ok(SubjectKey::Device(id.to_string())),
            Some(("location", loc)) if !loc.is_empty() => {
                Ok(SubjectKey::Location(loc.to_string()))
            }
            _ => Err(format!("unknown subject key: {s}")),
        }
    }
}

impl Serialize for SubjectKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SubjectKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Device category, matching how readings are produced for it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Manual,
    Tuya,
    Smart,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Manual => write!(f, "manual"),
            DeviceKind::Tuya => write!(f, "tuya"),
            DeviceKind::Smart => write!(f, "smart"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(DeviceKind::Manual),
            "tuya" => Ok(DeviceKind::Tuya),
            "smart" => Ok(DeviceKind::Smart),
            _ => Err(format!("unknown device kind: {s}")),
        }
    }
}

/// Where a consumption reading came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    Manual,
    Polled,
}

impl std::fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingSource::Manual => write!(f, "manual"),
            ReadingSource::Polled => write!(f, "polled"),
        }
    }
}

impl std::str::FromStr for ReadingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(ReadingSource::Manual),
            "polled" => Ok(ReadingSource::Polled),
            _ => Err(format!("unknown reading source: {s}")),
        }
    }
}

/// A single consumption reading for a device. Append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Reading {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Instantaneous power draw in watts.
    pub power_watts: f64,
    pub source: ReadingSource,
    pub created_at: DateTime<Utc>,
}

/// Device record as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeviceEntry {
    /// Database ID (devices table primary key).
    pub id: String,
    /// External device identifier (unique).
    pub device_id: String,
    pub name: String,
    pub kind: DeviceKind,
    /// Configured consumption threshold in watts. Absent means the
    /// consumption check is skipped for this device.
    pub max_power_watts: Option<f64>,
    /// Expected reporting interval in seconds, used for offline detection.
    pub expected_interval_secs: Option<u64>,
    /// Location the device is at, as `city,country`.
    pub location: Option<String>,
    pub is_active: bool,
    pub owner: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A weather forecast observation for a location at a point in time.
///
/// Each fetch inserts a new record; superseded records are retained for
/// history. The "latest" forecast for a location is the one with the
/// greatest `fetched_at`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ForecastRecord {
    pub id: String,
    pub city: String,
    pub country: String,
    pub forecast_date: DateTime<Utc>,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, 0-100.
    pub humidity: i32,
    /// Cloud cover, 0-100.
    pub cloudiness: i32,
    /// Main weather condition (e.g. `Clear`, `Clouds`, `Rain`).
    pub condition: String,
    /// Derived solar irradiation factor, clamped to [0.3, 1.2].
    pub irradiation_factor: f64,
    pub fetched_at: DateTime<Utc>,
}

impl ForecastRecord {
    /// Location key for this record, as `city,country`.
    pub fn location(&self) -> String {
        format!("{},{}", self.city, self.country)
    }
}

/// Derive a solar irradiation factor from forecast attributes.
///
/// A base factor per condition, reduced by cloud cover (up to 30%) and
/// humidity (up to 10%), clamped to [0.3, 1.2].
///
/// # Examples
///
/// ```
/// use wattmon_common::types::irradiation_factor;
///
/// let clear = irradiation_factor("Clear", 0, 0);
/// let storm = irradiation_factor("Thunderstorm", 100, 100);
/// assert!(clear > storm);
/// assert!((0.3..=1.2).contains(&storm));
/// ```
pub fn irradiation_factor(condition: &str, cloudiness: i32, humidity: i32) -> f64 {
    let base = match condition {
        "Clear" => 1.2,
        "Clouds" | "Mist" => 0.8,
        "Drizzle" | "Fog" => 0.7,
        "Rain" => 0.6,
        "Thunderstorm" => 0.5,
        "Snow" => 0.4,
        _ => 0.8,
    };

    let cloudiness_factor = 1.0 - (f64::from(cloudiness.clamp(0, 100)) / 100.0) * 0.3;
    let humidity_factor = 1.0 - (f64::from(humidity.clamp(0, 100)) / 100.0) * 0.1;

    (base * cloudiness_factor * humidity_factor).clamp(0.3, 1.2)
}

/// A severity-graded alert produced by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Alert {
    pub id: String,
    /// Deduplication subject, `device:<id>` or `location:<city>,<country>`.
    #[schema(value_type = String)]
    pub subject: SubjectKey,
    pub scope: AlertScope,
    pub severity: Severity,
    pub message: String,
    /// Observed value that triggered the alert (watts, factor, °C).
    pub value: Option<f64>,
    /// Threshold the value was compared against.
    pub threshold: Option<f64>,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever a pass re-confirms the condition.
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn subject_key_round_trip() {
        for raw in ["device:plug-7", "location:Lisbon,PT"] {
            let key: SubjectKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
        }
        assert!("gadget:x".parse::<SubjectKey>().is_err());
        assert!("device:".parse::<SubjectKey>().is_err());
    }

    #[test]
    fn irradiation_factor_is_clamped() {
        assert!((irradiation_factor("Clear", 0, 0) - 1.2).abs() < f64::EPSILON);
        assert!(irradiation_factor("Snow", 100, 100) >= 0.3);
        // Unknown conditions fall back to the cloudy baseline
        assert!((irradiation_factor("Haze", 0, 0) - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn scope_and_state_round_trip() {
        let scope: AlertScope = "weather".parse().unwrap();
        assert_eq!(scope.to_string(), "weather");
        let state: AlertState = "read".parse().unwrap();
        assert!(state.is_active());
        assert!(!AlertState::Resolved.is_active());
    }
}
