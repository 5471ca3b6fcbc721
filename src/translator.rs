use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::cache::{StateCache, active_preset};
use crate::endpoints::{CLIMATE_MAX_C, CLIMATE_MIN_C, DeviceEndpoint, ValueKind, lookup};
use crate::logger::MessageLogger;
use crate::protocol::*;
use crate::types::*;
use crate::{Error, Result};

/// A validated write sequence, alive for the duration of one command.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub id: Uuid,
    pub action: &'static str,
    pub writes: Vec<(String, Value)>,
}

impl PendingCommand {
    fn new(action: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            writes: Vec::new(),
        }
    }

    fn write(mut self, path: &str, value: Value) -> Self {
        self.writes.push((path.to_string(), value));
        self
    }
}

/// Turns domain operations into validated gateway writes.
///
/// Writes whose meaning depends on the current operating mode read that mode
/// from the gateway first and refuse to proceed if it differs from what the
/// cache showed the caller.
pub struct CommandTranslator {
    api: Arc<ApiClient>,
    cache: Arc<StateCache>,
    logger: Option<Arc<MessageLogger>>,
}

impl CommandTranslator {
    pub fn new(api: Arc<ApiClient>, cache: Arc<StateCache>) -> Self {
        Self {
            api,
            cache,
            logger: None,
        }
    }

    pub(crate) fn with_logger(mut self, logger: Option<Arc<MessageLogger>>) -> Self {
        self.logger = logger;
        self
    }

    // -- climate --

    pub async fn set_climate_mode(&self, mode: ClimateMode) -> Result<PendingCommand> {
        let value = endpoint(HC_OPERATION_MODE)?.validate(&Value::from(mode.as_api_str()))?;
        let cmd = PendingCommand::new("set_climate_mode").write(HC_OPERATION_MODE, value);
        self.execute(cmd, Vec::new()).await
    }

    pub async fn set_climate_temperature(&self, celsius: f64) -> Result<PendingCommand> {
        if !celsius.is_finite() || !(CLIMATE_MIN_C..=CLIMATE_MAX_C).contains(&celsius) {
            return Err(Error::OutOfRange {
                path: HC_TEMP_OVERRIDE.to_string(),
                value: celsius,
                min: CLIMATE_MIN_C,
                max: CLIMATE_MAX_C,
            });
        }

        let mode = self.confirm_climate_mode().await?;
        let target = match mode {
            ClimateMode::Heat => HC_TEMP_OVERRIDE,
            // the level only moves when the value fits it, otherwise the
            // temperature becomes a temporary override
            ClimateMode::Auto => match self.confirm_active_preset().await? {
                Some(preset) if fits_level(preset, celsius) => preset.level_path(),
                _ => HC_TEMP_OVERRIDE,
            },
        };
        let value = endpoint(target)?.validate(&Value::from(celsius))?;
        let cmd = PendingCommand::new("set_climate_temperature").write(target, value.clone());
        self.execute(cmd, vec![(HC_CURRENT_SETPOINT, value)]).await
    }

    /// Switches the schedule level by writing the preset's temperature as
    /// the temporary setpoint. Only meaningful in auto mode.
    pub async fn set_preset(&self, preset: Preset) -> Result<PendingCommand> {
        let mode = self.confirm_climate_mode().await?;
        if mode != ClimateMode::Auto {
            return Err(Error::UnsupportedInMode {
                operation: "set_preset",
                mode: mode.as_api_str().to_string(),
            });
        }
        let level = self.cached_or_fetch(preset.level_path()).await?;
        let value = endpoint(HC_TEMP_OVERRIDE)?.validate(&Value::from(level))?;
        let cmd = PendingCommand::new("set_preset").write(HC_TEMP_OVERRIDE, value.clone());
        self.execute(cmd, vec![(HC_CURRENT_SETPOINT, value)]).await
    }

    // -- hot water --

    pub async fn set_water_heater_mode(&self, mode: DhwMode) -> Result<PendingCommand> {
        let value = endpoint(DHW_OPERATION_MODE)?.validate(&Value::from(mode.as_api_str()))?;
        let cmd = PendingCommand::new("set_water_heater_mode").write(DHW_OPERATION_MODE, value);
        self.execute(cmd, Vec::new()).await
    }

    /// Sets the level of whichever mode the gateway is in right now.
    pub async fn set_water_heater_temperature(&self, celsius: f64) -> Result<PendingCommand> {
        if !celsius.is_finite() {
            return Err(Error::InvalidValue {
                path: DHW_OPERATION_MODE.to_string(),
                reason: format!("not a temperature: {celsius}"),
            });
        }
        let mode = self.confirm_dhw_mode().await?;
        let level = level_path_for(mode, "set_water_heater_temperature")?;
        let value = endpoint(level)?.validate(&Value::from(celsius))?;
        let cmd = PendingCommand::new("set_water_heater_temperature").write(level, value);
        self.execute(cmd, Vec::new()).await
    }

    /// Writes the mode, then optionally the setpoint. The setpoint is checked
    /// against the range of the mode being switched to.
    pub async fn set_water_heater(
        &self,
        mode: DhwMode,
        celsius: Option<f64>,
    ) -> Result<PendingCommand> {
        let mode_value = endpoint(DHW_OPERATION_MODE)?.validate(&Value::from(mode.as_api_str()))?;
        let mut cmd = PendingCommand::new("set_water_heater").write(DHW_OPERATION_MODE, mode_value);
        if let Some(t) = celsius {
            let level = level_path_for(mode, "set_water_heater")?;
            let value = endpoint(level)?.validate(&Value::from(t))?;
            cmd = cmd.write(level, value);
        }
        self.execute(cmd, Vec::new()).await
    }

    /// Writes any changed charge configuration, then starts the charge.
    /// Starting while a charge is running re-issues the start.
    pub async fn start_extra_hot_water(&self, request: ExtraHotWater) -> Result<PendingCommand> {
        let mut cmd = PendingCommand::new("start_extra_hot_water");
        let config = [
            (DHW_CHARGE_DURATION, request.duration_min),
            (DHW_SINGLE_CHARGE_SETPOINT, request.setpoint),
        ];
        for (path, wanted) in config {
            let Some(wanted) = wanted else { continue };
            let value = endpoint(path)?.validate(&Value::from(wanted))?;
            if self.cache.number(path) == Some(wanted) {
                debug!(path, "charge config unchanged");
                continue;
            }
            cmd = cmd.write(path, value);
        }
        let start = endpoint(DHW_CHARGE)?.validate(&Value::from("start"))?;
        self.execute(cmd.write(DHW_CHARGE, start), Vec::new()).await
    }

    pub async fn stop_extra_hot_water(&self) -> Result<PendingCommand> {
        self.stop_charge("stop_extra_hot_water").await
    }

    /// Away mode cancels any running Extra Hot Water charge.
    pub async fn enter_away_mode(&self) -> Result<PendingCommand> {
        self.stop_charge("enter_away_mode").await
    }

    async fn stop_charge(&self, action: &'static str) -> Result<PendingCommand> {
        let stop = endpoint(DHW_CHARGE)?.validate(&Value::from("stop"))?;
        self.execute(PendingCommand::new(action).write(DHW_CHARGE, stop), Vec::new())
            .await
    }

    // -- generic tunables --

    pub async fn set_number(&self, path: &str, value: f64) -> Result<PendingCommand> {
        let ep = endpoint(path)?;
        if !matches!(ep.kind, ValueKind::Number { .. }) {
            return Err(Error::InvalidValue {
                path: path.to_string(),
                reason: "not a numeric endpoint".into(),
            });
        }
        let value = ep.validate(&Value::from(value))?;
        self.execute(PendingCommand::new("set_number").write(path, value), Vec::new())
            .await
    }

    pub async fn set_switch(&self, path: &str, on: bool) -> Result<PendingCommand> {
        let ep = endpoint(path)?;
        if !matches!(ep.kind, ValueKind::Switch { .. }) {
            return Err(Error::InvalidValue {
                path: path.to_string(),
                reason: "not a switch endpoint".into(),
            });
        }
        let value = ep.validate(&Value::Bool(on))?;
        self.execute(PendingCommand::new("set_switch").write(path, value), Vec::new())
            .await
    }

    // -- pipeline --

    async fn execute(
        &self,
        cmd: PendingCommand,
        also_optimistic: Vec<(&str, Value)>,
    ) -> Result<PendingCommand> {
        if let Some(logger) = &self.logger {
            logger.log_command(cmd.id, cmd.action, &cmd.writes);
        }
        debug!(id = %cmd.id, action = cmd.action, writes = cmd.writes.len(), "executing command");
        for (path, value) in &cmd.writes {
            self.api.put(path, value).await?;
            self.cache.set_optimistic(path, value.clone());
        }
        for (path, value) in also_optimistic {
            self.cache.set_optimistic(path, value);
        }
        info!(id = %cmd.id, action = cmd.action, "command applied");
        Ok(cmd)
    }

    /// Reads `path` from the gateway into the cache and compares it with
    /// the value the cache held before.
    async fn pre_read_mode(&self, path: &str) -> Result<(Option<String>, String)> {
        let cached = self.cache.text(path);
        let body = self.api.get(path).await?;
        self.cache.apply(path, body.clone(), Utc::now());
        let device = body
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("{path}: missing mode value")))?;
        if let Some(cached) = &cached
            && *cached != device
        {
            return Err(Error::ModeConflict {
                expected: cached.clone(),
                actual: device,
            });
        }
        Ok((cached, device))
    }

    async fn confirm_climate_mode(&self) -> Result<ClimateMode> {
        let (_, device) = self.pre_read_mode(HC_OPERATION_MODE).await?;
        ClimateMode::from_api_str(&device)
            .ok_or_else(|| Error::Protocol(format!("unknown climate mode: {device}")))
    }

    async fn confirm_dhw_mode(&self) -> Result<DhwMode> {
        let (_, device) = self.pre_read_mode(DHW_OPERATION_MODE).await?;
        DhwMode::from_api_str(&device)
            .ok_or_else(|| Error::Protocol(format!("unknown hot water mode: {device}")))
    }

    /// Re-reads the current setpoint and derives the active preset from it.
    /// A preset the caller saw that no longer matches the gateway is a
    /// conflict.
    async fn confirm_active_preset(&self) -> Result<Option<Preset>> {
        let cached = active_preset(
            self.cache.number(HC_CURRENT_SETPOINT),
            self.cache.number(HC_COMFORT2_TEMP),
            self.cache.number(HC_ECO_TEMP),
        );
        let current = self.fetch_number(HC_CURRENT_SETPOINT).await?;
        let comfort = self.cached_or_fetch(HC_COMFORT2_TEMP).await?;
        let eco = self.cached_or_fetch(HC_ECO_TEMP).await?;
        let device = active_preset(Some(current), Some(comfort), Some(eco));
        if let Some(cached) = cached
            && device != Some(cached)
        {
            return Err(Error::ModeConflict {
                expected: format!("auto/{cached:?}"),
                actual: match device {
                    Some(p) => format!("auto/{p:?}"),
                    None => "auto without a matching preset".into(),
                },
            });
        }
        Ok(device)
    }

    async fn cached_or_fetch(&self, path: &str) -> Result<f64> {
        match self.cache.number(path) {
            Some(v) => Ok(v),
            None => self.fetch_number(path).await,
        }
    }

    async fn fetch_number(&self, path: &str) -> Result<f64> {
        let body = self.api.get(path).await?;
        self.cache.apply(path, body, Utc::now());
        self.cache
            .number(path)
            .ok_or_else(|| Error::Unavailable(path.to_string()))
    }
}

fn endpoint(path: &str) -> Result<&'static DeviceEndpoint> {
    lookup(path).ok_or_else(|| Error::UnknownEndpoint(path.to_string()))
}

fn fits_level(preset: Preset, celsius: f64) -> bool {
    lookup(preset.level_path())
        .and_then(DeviceEndpoint::range)
        .is_some_and(|(min, max)| (min..=max).contains(&celsius))
}

fn level_path_for(mode: DhwMode, operation: &'static str) -> Result<&'static str> {
    mode.level_path().ok_or_else(|| Error::UnsupportedInMode {
        operation,
        mode: mode.as_api_str().to_string(),
    })
}
