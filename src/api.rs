use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::AuthSession;
use crate::logger::MessageLogger;
use crate::protocol::*;
use crate::retry::{RetryPolicy, is_retryable_status};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::types::DeviceInfo;
use crate::{Error, Result};

/// Authenticated access to one gateway's resource tree.
///
/// A 401 triggers one token refresh and a retry; a second 401 is final.
/// 5xx and transport failures are retried per [`RetryPolicy`]; any other
/// 4xx fails at once.
///
/// The gateway copes badly with parallel requests, so only one request is
/// on the wire at a time. The gate is held per request, never across a
/// retry delay or a whole command.
pub struct ApiClient {
    auth: Arc<AuthSession>,
    transport: Arc<dyn Transport>,
    api_base: String,
    device_id: String,
    retry: RetryPolicy,
    logger: Option<Arc<MessageLogger>>,
    gate: Mutex<()>,
}

impl ApiClient {
    pub fn new(
        auth: Arc<AuthSession>,
        transport: Arc<dyn Transport>,
        api_base: impl Into<String>,
        device_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            auth,
            transport,
            api_base: api_base.into(),
            device_id: device_id.into(),
            retry,
            logger: None,
            gate: Mutex::new(()),
        }
    }

    pub(crate) fn with_logger(mut self, logger: Option<Arc<MessageLogger>>) -> Self {
        self.logger = logger;
        self
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let resp = self.execute(Method::Get, path, None).await?;
        let body: Value = serde_json::from_str(&resp.body)
            .map_err(|e| Error::Protocol(format!("{path}: invalid JSON body: {e}")))?;
        if let Some(logger) = &self.logger {
            logger.log_response(path, resp.status, &body);
        }
        Ok(body)
    }

    pub async fn put(&self, path: &str, value: &Value) -> Result<()> {
        let body = put_body(value);
        let resp = self.execute(Method::Put, path, Some(body)).await?;
        if let Some(logger) = &self.logger {
            let body = serde_json::from_str(&resp.body).unwrap_or(Value::Null);
            logger.log_response(path, resp.status, &body);
        }
        debug!(path, value = %value, "write accepted");
        Ok(())
    }

    /// Fetches paths one after another; the gateway copes badly with
    /// parallel requests.
    pub async fn get_many(&self, paths: &[&str]) -> Vec<(String, Result<Value>)> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let result = self.get(path).await;
            out.push((path.to_string(), result));
        }
        out
    }

    /// Reads the firmware version as a cheap reachability check.
    pub async fn test_connection(&self) -> Result<String> {
        let body = self.get(GW_FIRMWARE).await?;
        body.get("value")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("{GW_FIRMWARE}: missing value")))
    }

    /// Collects identification fields. Individual missing endpoints are
    /// tolerated; authentication failures are not.
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        let mut info = DeviceInfo::default();
        let fields: [(&str, &mut Option<String>); 6] = [
            (GW_FIRMWARE, &mut info.firmware),
            (GW_HARDWARE, &mut info.hardware),
            (GW_IP, &mut info.ip),
            (HS_TYPE, &mut info.source_type),
            (HS_HP_TYPE, &mut info.heat_pump_type),
            (SYS_BRAND, &mut info.brand),
        ];
        for (path, slot) in fields {
            match self.get(path).await {
                Ok(body) => *slot = body.get("value").and_then(Value::as_str).map(str::to_string),
                Err(e) if e.needs_reauthorization() => return Err(e),
                Err(e) => debug!(path, error = %e, "device info field unavailable"),
            }
        }
        Ok(info)
    }

    async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<HttpResponse> {
        let url = resource_url(&self.api_base, &self.device_id, path);
        let mut token = self.auth.ensure_fresh().await?;
        let mut attempt = 0u32;
        let mut refreshed = false;

        loop {
            attempt += 1;
            if let Some(logger) = &self.logger {
                logger.log_request(method.as_str(), path, body.as_ref());
            }
            let req = match &body {
                Some(b) => HttpRequest::put_json(&url, b.clone()),
                None => HttpRequest::get(&url),
            }
            .bearer(&token);

            let sent = {
                let _on_wire = self.gate.lock().await;
                self.transport.request(req).await
            };
            let reason = match sent {
                Ok(resp) if resp.is_success() => return Ok(resp),
                Ok(resp) if resp.status == 401 => {
                    if refreshed {
                        warn!(path, "token rejected after refresh");
                        return Err(Error::AuthExpired);
                    }
                    debug!(path, "401, refreshing token");
                    refreshed = true;
                    token = self.auth.refresh_rejected(&token).await?;
                    // an auth retry does not consume the transient budget
                    attempt -= 1;
                    continue;
                }
                Ok(resp) if is_retryable_status(resp.status) => format!("HTTP {}", resp.status),
                Ok(resp) => {
                    return Err(Error::InvalidRequest {
                        path: path.to_string(),
                        status: resp.status,
                        message: resp.body,
                    });
                }
                Err(e) => e.to_string(),
            };

            if !self.retry.should_retry(attempt) {
                warn!(path, attempt, reason = %reason, "giving up");
                return Err(Error::GatewayUnreachable {
                    path: path.to_string(),
                    reason,
                });
            }
            let delay = self.retry.delay_for_attempt(attempt);
            debug!(path, attempt, delay_ms = delay.as_millis() as u64, reason = %reason, "retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
