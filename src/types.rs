use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::protocol::{
    DHW_TEMP_ECO, DHW_TEMP_HIGH, DHW_TEMP_LOW, HC_COMFORT2_TEMP, HC_ECO_TEMP, is_sentinel,
};

/// OAuth token pair plus the expiry of the access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClimateMode {
    Heat,
    Auto,
}

impl ClimateMode {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ClimateMode::Heat => "manual",
            ClimateMode::Auto => "auto",
        }
    }

    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ClimateMode::Heat),
            "auto" => Some(ClimateMode::Auto),
            _ => None,
        }
    }
}

/// Schedule temperature level selected while the circuit runs in auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Comfort,
    Eco,
}

impl Preset {
    pub fn level_path(&self) -> &'static str {
        match self {
            Preset::Comfort => HC_COMFORT2_TEMP,
            Preset::Eco => HC_ECO_TEMP,
        }
    }
}

/// Hot-water operation mode. `EcoPlus`, `Eco` and `Comfort` each own a
/// separate temperature level on the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhwMode {
    Off,
    EcoPlus,
    Eco,
    Comfort,
    Auto,
}

impl DhwMode {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            DhwMode::Off => "Off",
            DhwMode::EcoPlus => "low",
            DhwMode::Eco => "eco",
            DhwMode::Comfort => "high",
            DhwMode::Auto => "ownprogram",
        }
    }

    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "Off" | "off" => Some(DhwMode::Off),
            "low" => Some(DhwMode::EcoPlus),
            "eco" => Some(DhwMode::Eco),
            "high" => Some(DhwMode::Comfort),
            "ownprogram" => Some(DhwMode::Auto),
            _ => None,
        }
    }

    /// Temperature level written when the target is changed in this mode.
    /// The gateway crosses the names: mode `low` owns `temperatureLevels/eco`
    /// and mode `eco` owns `temperatureLevels/low`.
    /// `None` for modes without a user-settable setpoint.
    pub fn level_path(&self) -> Option<&'static str> {
        match self {
            DhwMode::EcoPlus => Some(DHW_TEMP_ECO),
            DhwMode::Eco => Some(DHW_TEMP_LOW),
            DhwMode::Comfort => Some(DHW_TEMP_HIGH),
            DhwMode::Off | DhwMode::Auto => None,
        }
    }
}

/// Extra Hot Water request. Unset fields keep the gateway's current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtraHotWater {
    pub duration_min: Option<f64>,
    pub setpoint: Option<f64>,
}

impl ExtraHotWater {
    pub fn new(duration_min: f64, setpoint: f64) -> Self {
        Self {
            duration_min: Some(duration_min),
            setpoint: Some(setpoint),
        }
    }
}

/// Last successfully observed response for one endpoint path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedValue {
    pub path: String,
    pub body: Value,
    pub observed_at: DateTime<Utc>,
}

impl CachedValue {
    pub fn new(path: impl Into<String>, body: Value, observed_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            body,
            observed_at,
        }
    }

    /// Copy of this entry with only `value` swapped, keeping unit and limits.
    pub(crate) fn with_value(&self, value: Value, observed_at: DateTime<Utc>) -> Self {
        let mut body = match &self.body {
            Value::Object(_) => self.body.clone(),
            _ => json!({ "id": self.path }),
        };
        body["value"] = value;
        Self::new(self.path.clone(), body, observed_at)
    }

    pub fn value(&self) -> Option<&Value> {
        self.body.get("value")
    }

    /// Numeric value, with the gateway's "no sensor" sentinels filtered out.
    pub fn number(&self) -> Option<f64> {
        self.value()
            .and_then(Value::as_f64)
            .filter(|v| !is_sentinel(*v))
    }

    pub fn text(&self) -> Option<&str> {
        self.value().and_then(Value::as_str)
    }

    pub fn unit(&self) -> Option<&str> {
        self.body.get("unitOfMeasure").and_then(Value::as_str)
    }

    /// `values` array carried by list endpoints (notifications, start counters).
    pub fn values_list(&self) -> Option<&Vec<Value>> {
        self.body.get("values").and_then(Value::as_array)
    }

    /// Looks up `key` in an emon-style list such as `[{"ch": 4052}, {"dhw": 519}]`.
    pub fn emon_value(&self, key: &str) -> Option<f64> {
        self.values_list()?
            .iter()
            .find_map(|item| item.get(key).and_then(Value::as_f64))
    }

    /// Cumulative energy from a recording body: the `y` of the last sample,
    /// falling back to a plain `value`.
    pub fn recording_total(&self) -> Option<f64> {
        let last = self
            .body
            .get("recording")
            .and_then(Value::as_array)
            .and_then(|r| r.last());
        match last {
            Some(sample) => sample.get("y").and_then(Value::as_f64),
            None => self.number(),
        }
    }
}

/// Consistent view of the heating circuit derived from several cached paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateState {
    pub mode: Option<ClimateMode>,
    pub preset: Option<Preset>,
    pub room_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub comfort_level: Option<f64>,
    pub eco_level: Option<f64>,
    pub status: Option<String>,
}

/// Consistent view of the hot-water circuit derived from several cached paths.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterHeaterState {
    pub mode: Option<DhwMode>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub extra_hot_water_running: bool,
    pub charge_duration_min: Option<f64>,
    pub charge_setpoint: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub firmware: Option<String>,
    pub hardware: Option<String>,
    pub ip: Option<String>,
    pub source_type: Option<String>,
    pub heat_pump_type: Option<String>,
    pub brand: Option<String>,
}

/// Change notifications emitted as the cache is updated.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ClimateModeChanged { mode: ClimateMode },
    WaterHeaterModeChanged { mode: DhwMode },
    ExtraHotWaterChanged { running: bool },
    TemperatureChanged { path: String, celsius: f64 },
    NotificationsChanged { count: usize },

    ValueChanged { path: String, value: Value },
    FieldChanged { path: String, field: String, value: Value },

    Unavailable { path: String },
    Restored { path: String },
    ReauthorizationRequired { reason: String },
}
