use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::diff::diff_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    /// First response per path in full, then only the changed fields.
    Diffed,
}

struct LogState {
    file: File,
    previous: HashMap<String, Value>,
}

/// NDJSON trace of gateway traffic, shared by the poll loop and commands.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    state: Mutex<LogState>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            state: Mutex::new(LogState {
                file,
                previous: HashMap::new(),
            }),
        })
    }

    pub fn log_request(&self, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_command(&self, id: Uuid, action: &str, writes: &[(String, Value)]) {
        let writes: Vec<Value> = writes
            .iter()
            .map(|(path, value)| json!({ "path": path, "value": value }))
            .collect();
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "id": id.to_string(),
            "action": action,
            "writes": writes,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&self, path: &str, status: u16, body: &Value) {
        let entry = match self.mode {
            MessageLogMode::Full => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
                "body": body,
            }),
            MessageLogMode::Diffed => {
                let mut state = self.lock();
                let prev = state.previous.insert(path.to_string(), body.clone());
                drop(state);
                match prev {
                    None => json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "resp",
                        "path": path,
                        "status": status,
                        "full": true,
                        "body": body,
                    }),
                    Some(prev) => {
                        let mut changes = Vec::new();
                        diff_json(&prev, body, "", &mut changes);
                        let changes: Vec<Value> = changes
                            .iter()
                            .map(|(field, old, new)| json!({ "path": field, "old": old, "new": new }))
                            .collect();
                        json!({
                            "ts": Utc::now().to_rfc3339(),
                            "dir": "resp",
                            "path": path,
                            "status": status,
                            "changes": changes,
                        })
                    }
                }
            }
        };
        self.write_line(&entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn write_line(&self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.lock().file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
