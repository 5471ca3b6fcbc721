use serde_json::Value;

use crate::protocol::{DHW_CHARGE, DHW_OPERATION_MODE, HC_OPERATION_MODE, NOTIFICATIONS, is_sentinel};
use crate::types::*;

/// Fields that describe the endpoint rather than its state.
const STATIC_FIELDS: &[&str] = &["id", "type", "writeable", "recordable", "used"];

pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(serde_json::Map::new()), curr_val, &path, changes)
                    }
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Events describing how the body stored for `path` moved from `previous`
/// to `current`. A first observation only reports the value itself.
pub(crate) fn events_for(path: &str, previous: Option<&Value>, current: &Value) -> Vec<Event> {
    let Some(previous) = previous else {
        return initial_event(path, current).into_iter().collect();
    };

    let mut changes = Vec::new();
    diff_json(previous, current, "", &mut changes);

    let mut events = Vec::new();
    let mut value_reported = false;
    for (field, _old, new) in &changes {
        let top = field.split('.').next().unwrap_or(field);
        if top == "value" {
            if value_reported {
                continue;
            }
            value_reported = true;
            events.extend(map_typed_event(path, current).or_else(|| generic_event(path, new)));
        } else if path == NOTIFICATIONS && top == "values" {
            events.push(Event::NotificationsChanged {
                count: current.get("values").and_then(Value::as_array).map_or(0, Vec::len),
            });
        } else if !STATIC_FIELDS.contains(&top) {
            events.push(Event::FieldChanged {
                path: path.to_string(),
                field: field.clone(),
                value: new.clone(),
            });
        }
    }
    events
}

fn initial_event(path: &str, body: &Value) -> Option<Event> {
    if path == NOTIFICATIONS {
        let count = body.get("values").and_then(Value::as_array)?.len();
        return Some(Event::NotificationsChanged { count });
    }
    let value = body.get("value")?;
    map_typed_event(path, body).or_else(|| generic_event(path, value))
}

pub(crate) fn map_typed_event(path: &str, body: &Value) -> Option<Event> {
    let value = body.get("value")?;
    match path {
        HC_OPERATION_MODE => Some(Event::ClimateModeChanged {
            mode: ClimateMode::from_api_str(value.as_str()?)?,
        }),
        DHW_OPERATION_MODE => Some(Event::WaterHeaterModeChanged {
            mode: DhwMode::from_api_str(value.as_str()?)?,
        }),
        DHW_CHARGE => Some(Event::ExtraHotWaterChanged {
            running: value.as_str()? == "start",
        }),
        _ if body.get("unitOfMeasure").and_then(Value::as_str) == Some("C") => {
            let celsius = value.as_f64().filter(|v| !is_sentinel(*v))?;
            Some(Event::TemperatureChanged {
                path: path.to_string(),
                celsius,
            })
        }
        _ => None,
    }
}

pub(crate) fn generic_event(path: &str, value: &Value) -> Option<Event> {
    match value {
        Value::Null => None,
        Value::Number(n) if n.as_f64().is_some_and(is_sentinel) => None,
        _ => Some(Event::ValueChanged {
            path: path.to_string(),
            value: value.clone(),
        }),
    }
}
