use serde_json::Value;

use crate::protocol::*;
use crate::{Error, Result};

/// Declared value type of an endpoint, as the gateway exposes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueKind {
    /// Writable number. `step` is enforced only where the gateway rejects
    /// off-grid values.
    Number {
        min: f64,
        max: f64,
        step: Option<f64>,
        unit: &'static str,
    },
    /// Read-only numeric measurement.
    Measurement { unit: &'static str },
    Enum(&'static [&'static str]),
    Switch {
        on: &'static str,
        off: &'static str,
    },
    Text,
    /// Body carries a `values` array instead of a scalar.
    List,
    /// Energy recording with a `recording` sample array.
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollGroup {
    /// Fetched every poll cycle.
    Realtime,
    /// Fetched every few cycles; counters move slowly.
    Energy,
    /// Only fetched on request (device info).
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceEndpoint {
    pub path: &'static str,
    pub kind: ValueKind,
    pub writable: bool,
    pub poll: PollGroup,
}

const fn number(path: &'static str, min: f64, max: f64, step: Option<f64>, unit: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Number { min, max, step, unit },
        writable: true,
        poll: PollGroup::Realtime,
    }
}

const fn measurement(path: &'static str, unit: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Measurement { unit },
        writable: false,
        poll: PollGroup::Realtime,
    }
}

const fn text(path: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Text,
        writable: false,
        poll: PollGroup::Realtime,
    }
}

const fn switch(path: &'static str, on: &'static str, off: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Switch { on, off },
        writable: true,
        poll: PollGroup::Realtime,
    }
}

const fn choice(path: &'static str, values: &'static [&'static str]) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Enum(values),
        writable: true,
        poll: PollGroup::Realtime,
    }
}

const fn list(path: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::List,
        writable: false,
        poll: PollGroup::Realtime,
    }
}

const fn recording(path: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Recording,
        writable: false,
        poll: PollGroup::Energy,
    }
}

const fn on_demand(path: &'static str) -> DeviceEndpoint {
    DeviceEndpoint {
        path,
        kind: ValueKind::Text,
        writable: false,
        poll: PollGroup::OnDemand,
    }
}

pub const CLIMATE_MIN_C: f64 = 5.0;
pub const CLIMATE_MAX_C: f64 = 30.0;

pub static ENDPOINTS: &[DeviceEndpoint] = &[
    // heating circuit
    measurement(HC_ROOM_TEMP, "C"),
    measurement(HC_CURRENT_SETPOINT, "C"),
    number(HC_TEMP_OVERRIDE, CLIMATE_MIN_C, CLIMATE_MAX_C, None, "C"),
    choice(HC_OPERATION_MODE, &["manual", "auto"]),
    text(HC_ACTIVE_PROGRAM),
    text(HC_STATUS),
    number(HC_COMFORT2_TEMP, 20.5, 30.0, None, "C"),
    number(HC_ECO_TEMP, 5.0, 20.5, None, "C"),
    number(HC_MAX_FLOW_TEMP, 30.0, 85.0, Some(1.0), "C"),
    text(HC_HEAT_COOL_MODE),
    text(HC_SUWI_MODE),
    number(HC_SUWI_THRESHOLD, 10.0, 30.0, Some(0.5), "C"),
    text(HC_HEATING_TYPE),
    text(HC_CONTROL_TYPE),
    // hot water
    measurement(DHW_ACTUAL_TEMP, "C"),
    measurement(DHW_CURRENT_SETPOINT, "C"),
    choice(DHW_OPERATION_MODE, &["Off", "low", "eco", "high", "ownprogram"]),
    text(DHW_STATUS),
    choice(DHW_CHARGE, &["start", "stop"]),
    number(DHW_CHARGE_DURATION, 15.0, 2880.0, Some(15.0), "min"),
    number(DHW_SINGLE_CHARGE_SETPOINT, 50.0, 70.0, Some(1.0), "C"),
    number(DHW_TEMP_ECO, 30.0, 43.0, None, "C"),
    number(DHW_TEMP_LOW, 30.0, 48.0, None, "C"),
    number(DHW_TEMP_HIGH, 30.0, 47.0, None, "C"),
    text(DHW_TD_MODE),
    switch(DHW_REDUCE_TEMP_ON_ALARM, "on", "off"),
    // heat sources
    measurement(HS_ACTUAL_MODULATION, "%"),
    measurement(HS_SUPPLY_TEMP, "C"),
    measurement(HS_RETURN_TEMP, "C"),
    text(HS_CH_STATUS),
    text(HS_HEAT_DEMAND),
    measurement(HS_NUM_STARTS, ""),
    text(HS_STANDBY),
    text(HS_EM_STATUS),
    list(HS_HS1_STARTS),
    // system and gateway
    measurement(SYS_OUTDOOR_TEMP, "C"),
    text(SYS_TYPE),
    text(GW_FIRMWARE),
    text(GW_HARDWARE),
    text(GW_IP),
    text(GW_MAC),
    text(GW_SSID),
    text(GW_SERIAL),
    text(GW_SW_PREFIX),
    text(GW_TIMEZONE),
    list(NOTIFICATIONS),
    on_demand(HS_TYPE),
    on_demand(HS_HP_TYPE),
    on_demand(SYS_BRAND),
    // variable tariff
    switch(VT_CH_OPTIMIZATION, "on", "off"),
    number(VT_CH_HIGH_DELTA, 0.5, 2.0, Some(0.5), ""),
    number(VT_CH_LOW_DELTA, 0.0, 2.0, Some(0.5), ""),
    number(VT_CH_MID_SETPOINT, 7.0, 28.0, Some(0.5), "C"),
    switch(VT_DHW_OPTIMIZATION, "on", "off"),
    switch(VT_DHW_HIGH_ENABLE, "yes", "no"),
    switch(VT_DHW_LOW_ENABLE, "yes", "no"),
    // energy recordings
    recording(REC_TOTAL_COMPRESSOR),
    recording(REC_TOTAL_EHEATER),
    recording(REC_TOTAL_OUTPUT),
    recording(REC_CH_COMPRESSOR),
    recording(REC_CH_EHEATER),
    recording(REC_CH_OUTPUT),
    recording(REC_DHW_COMPRESSOR),
    recording(REC_DHW_EHEATER),
    recording(REC_DHW_OUTPUT),
];

pub fn lookup(path: &str) -> Option<&'static DeviceEndpoint> {
    ENDPOINTS.iter().find(|e| e.path == path)
}

pub fn paths_in(group: PollGroup) -> Vec<&'static str> {
    ENDPOINTS
        .iter()
        .filter(|e| e.poll == group)
        .map(|e| e.path)
        .collect()
}

impl DeviceEndpoint {
    /// Checks a proposed write against the declared type and range and
    /// returns the value to put on the wire.
    pub fn validate(&self, value: &Value) -> Result<Value> {
        if !self.writable {
            return Err(Error::InvalidValue {
                path: self.path.to_string(),
                reason: "endpoint is read-only".to_string(),
            });
        }
        match self.kind {
            ValueKind::Number { min, max, step, .. } => {
                let v = value.as_f64().ok_or_else(|| Error::InvalidValue {
                    path: self.path.to_string(),
                    reason: format!("not a number: {value}"),
                })?;
                self.check_range(v, min, max, step)?;
                Ok(Value::from(v))
            }
            ValueKind::Enum(options) => match value.as_str() {
                Some(s) if options.contains(&s) => Ok(Value::from(s)),
                _ => Err(Error::InvalidValue {
                    path: self.path.to_string(),
                    reason: format!("unknown option: {value} (valid: {options:?})"),
                }),
            },
            ValueKind::Switch { on, off } => match value {
                Value::Bool(true) => Ok(Value::from(on)),
                Value::Bool(false) => Ok(Value::from(off)),
                Value::String(s) if s == on || s == off => Ok(value.clone()),
                _ => Err(Error::InvalidValue {
                    path: self.path.to_string(),
                    reason: format!("expected {on}/{off}, got {value}"),
                }),
            },
            ValueKind::Measurement { .. } | ValueKind::Text | ValueKind::List | ValueKind::Recording => {
                Err(Error::InvalidValue {
                    path: self.path.to_string(),
                    reason: "endpoint is read-only".to_string(),
                })
            }
        }
    }

    fn check_range(&self, v: f64, min: f64, max: f64, step: Option<f64>) -> Result<()> {
        if !v.is_finite() || v < min || v > max {
            return Err(Error::OutOfRange {
                path: self.path.to_string(),
                value: v,
                min,
                max,
            });
        }
        if let Some(inc) = step
            && inc > 0.0
        {
            let steps = ((v - min) / inc).round();
            let reconstructed = min + steps * inc;
            if (reconstructed - v).abs() > 1e-9 {
                return Err(Error::InvalidValue {
                    path: self.path.to_string(),
                    reason: format!("{v} not a multiple of {inc} (from {min})"),
                });
            }
        }
        Ok(())
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        match self.kind {
            ValueKind::Number { min, max, .. } => Some((min, max)),
            _ => None,
        }
    }
}
