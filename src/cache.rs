use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::diff::events_for;
use crate::protocol::*;
use crate::types::*;
use crate::{Error, Result};

pub(crate) type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

/// Tolerance when matching the current setpoint against a preset level.
pub const PRESET_MATCH_TOLERANCE_C: f64 = 0.3;

#[derive(Default)]
struct Inner {
    values: HashMap<String, CachedValue>,
    failures: HashMap<String, u32>,
}

/// Last known gateway state, keyed by endpoint path.
///
/// Each path is replaced whole under one lock. When a poll response and an
/// optimistic write race, the one with the later `observed_at` wins.
pub struct StateCache {
    inner: RwLock<Inner>,
    unavailable_after: u32,
    callbacks: Vec<EventCallback>,
}

impl StateCache {
    pub fn new(unavailable_after: u32) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            unavailable_after: unavailable_after.max(1),
            callbacks: Vec::new(),
        }
    }

    pub(crate) fn with_callbacks(mut self, callbacks: Vec<EventCallback>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Stores `body` for `path` unless a newer observation is already held.
    /// Returns whether the body was stored.
    pub fn apply(&self, path: &str, body: Value, observed_at: DateTime<Utc>) -> bool {
        let mut events = Vec::new();
        {
            let mut inner = self.write();
            if let Some(existing) = inner.values.get(path)
                && existing.observed_at > observed_at
            {
                trace!(path, "discarding stale observation");
                return false;
            }
            let previous = inner.values.get(path).map(|v| v.body.clone());
            events.extend(events_for(path, previous.as_ref(), &body));
            inner
                .values
                .insert(path.to_string(), CachedValue::new(path, body, observed_at));
            if let Some(count) = inner.failures.remove(path)
                && count >= self.unavailable_after
            {
                debug!(path, "path restored");
                events.push(Event::Restored {
                    path: path.to_string(),
                });
            }
        }
        self.fire_all(&events);
        true
    }

    /// Counts a failed poll of `path`. The cached value stays; the path is
    /// reported unavailable once the count reaches the threshold.
    pub fn record_failure(&self, path: &str) -> u32 {
        let count = {
            let mut inner = self.write();
            let count = inner.failures.entry(path.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if count == self.unavailable_after {
            warn!(path, failures = count, "path unavailable");
            self.fire(&Event::Unavailable {
                path: path.to_string(),
            });
        }
        count
    }

    /// Replaces the `value` of a path after a confirmed write, so reads
    /// reflect the command before the next poll.
    pub fn set_optimistic(&self, path: &str, value: Value) -> CachedValue {
        let now = Utc::now();
        let updated = {
            let inner = self.read_lock();
            match inner.values.get(path) {
                Some(existing) => existing.with_value(value, now),
                None => CachedValue::new(path, serde_json::json!({ "id": path, "value": value }), now),
            }
        };
        self.apply(path, updated.body.clone(), now);
        updated
    }

    pub fn read(&self, path: &str) -> Result<CachedValue> {
        self.read_lock()
            .values
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Unavailable(path.to_string()))
    }

    pub fn get(&self, path: &str) -> Option<CachedValue> {
        self.read_lock().values.get(path).cloned()
    }

    pub fn is_available(&self, path: &str) -> bool {
        let inner = self.read_lock();
        inner.values.contains_key(path)
            && inner.failures.get(path).copied().unwrap_or(0) < self.unavailable_after
    }

    pub fn failures(&self, path: &str) -> u32 {
        self.read_lock().failures.get(path).copied().unwrap_or(0)
    }

    pub fn list_sensors(&self) -> BTreeMap<String, CachedValue> {
        self.read_lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn number(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.number())
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|v| v.text().map(str::to_string))
    }

    pub fn climate_mode(&self) -> Option<ClimateMode> {
        self.text(HC_OPERATION_MODE)
            .and_then(|s| ClimateMode::from_api_str(&s))
    }

    pub fn dhw_mode(&self) -> Option<DhwMode> {
        self.text(DHW_OPERATION_MODE)
            .and_then(|s| DhwMode::from_api_str(&s))
    }

    pub fn climate_state(&self) -> ClimateState {
        let mode = self.climate_mode();
        let target = self.number(HC_CURRENT_SETPOINT);
        let comfort = self.number(HC_COMFORT2_TEMP);
        let eco = self.number(HC_ECO_TEMP);
        let preset = match mode {
            Some(ClimateMode::Auto) => active_preset(target, comfort, eco),
            _ => None,
        };
        ClimateState {
            mode,
            preset,
            room_temperature: self.number(HC_ROOM_TEMP),
            target_temperature: target,
            comfort_level: comfort,
            eco_level: eco,
            status: self.text(HC_STATUS),
        }
    }

    pub fn water_heater_state(&self) -> WaterHeaterState {
        let mode = self.dhw_mode();
        // the level of the active mode is the effective target
        let target = mode
            .and_then(|m| m.level_path())
            .and_then(|p| self.number(p))
            .or_else(|| self.number(DHW_CURRENT_SETPOINT));
        WaterHeaterState {
            mode,
            current_temperature: self.number(DHW_ACTUAL_TEMP),
            target_temperature: target,
            extra_hot_water_running: self.text(DHW_CHARGE).as_deref() == Some("start"),
            charge_duration_min: self.number(DHW_CHARGE_DURATION),
            charge_setpoint: self.number(DHW_SINGLE_CHARGE_SETPOINT),
            status: self.text(DHW_STATUS),
        }
    }

    pub(crate) fn fire(&self, event: &Event) {
        for cb in &self.callbacks {
            cb(event);
        }
    }

    fn fire_all(&self, events: &[Event]) {
        for event in events {
            self.fire(event);
        }
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Preset whose level matches the current setpoint, comfort first.
pub fn active_preset(
    setpoint: Option<f64>,
    comfort: Option<f64>,
    eco: Option<f64>,
) -> Option<Preset> {
    let sp = setpoint?;
    let near = |level: Option<f64>| level.is_some_and(|l| (sp - l).abs() <= PRESET_MATCH_TOLERANCE_C);
    if near(comfort) {
        Some(Preset::Comfort)
    } else if near(eco) {
        Some(Preset::Eco)
    } else {
        None
    }
}
