use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::auth::AuthSession;
use crate::cache::{EventCallback, StateCache};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::poller::{PollReport, Poller};
use crate::protocol::{DEFAULT_API_BASE, DEFAULT_TOKEN_URL, HS_HS1_STARTS, NOTIFICATIONS};
use crate::retry::RetryPolicy;
use crate::store::CredentialStore;
use crate::transport::{ReqwestTransport, Transport};
use crate::translator::{CommandTranslator, PendingCommand};
use crate::types::*;
use crate::{Error, Result};

/// Tunables for one device session. The defaults are operational choices,
/// not limits published by the vendor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub token_url: String,
    pub poll_interval: Duration,
    /// Energy recordings are fetched every this many poll cycles.
    pub energy_every: u32,
    pub retry_policy: RetryPolicy,
    pub expiry_skew: Duration,
    /// Consecutive poll failures before a path is reported unavailable.
    pub unavailable_after: u32,
    pub command_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            poll_interval: Duration::from_secs(60),
            energy_every: 5,
            retry_policy: RetryPolicy::default(),
            expiry_skew: Duration::from_secs(30),
            unavailable_after: 3,
            command_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct K30ClientBuilder {
    device_id: String,
    config: SessionConfig,
    transport: Option<Arc<dyn Transport>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    event_callbacks: Vec<EventCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl K30ClientBuilder {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            config: SessionConfig::default(),
            transport: None,
            credential_store: None,
            event_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.token_url = url.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn energy_every(mut self, cycles: u32) -> Self {
        self.config.energy_every = cycles;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    pub fn expiry_skew(mut self, skew: Duration) -> Self {
        self.config.expiry_skew = skew;
        self
    }

    pub fn unavailable_after(mut self, failures: u32) -> Self {
        self.config.unavailable_after = failures;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<K30Client> {
        let config = self.config;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(config.request_timeout)?),
        };

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Arc::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        let mut auth = AuthSession::new(transport.clone(), &config.token_url, config.expiry_skew);
        if let Some(store) = self.credential_store {
            auth = auth.with_store(store);
        }
        let auth = Arc::new(auth);

        let api = Arc::new(
            ApiClient::new(
                auth.clone(),
                transport,
                &config.api_base_url,
                &self.device_id,
                config.retry_policy.clone(),
            )
            .with_logger(logger.clone()),
        );
        let cache = Arc::new(
            StateCache::new(config.unavailable_after).with_callbacks(self.event_callbacks),
        );
        let translator = Arc::new(
            CommandTranslator::new(api.clone(), cache.clone()).with_logger(logger),
        );
        let poller = Arc::new(Poller::new(api.clone(), cache.clone(), config.energy_every));

        Ok(K30Client {
            device_id: self.device_id,
            config,
            auth,
            api,
            cache,
            translator,
            poller,
        })
    }
}

/// Session for one K30 gateway: credential, cache, poller and commands.
pub struct K30Client {
    device_id: String,
    config: SessionConfig,
    auth: Arc<AuthSession>,
    api: Arc<ApiClient>,
    cache: Arc<StateCache>,
    translator: Arc<CommandTranslator>,
    poller: Arc<Poller>,
}

impl K30Client {
    pub fn builder(device_id: impl Into<String>) -> K30ClientBuilder {
        K30ClientBuilder::new(device_id)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    // -- authentication --

    pub fn authorization_url(&self) -> String {
        self.auth.authorization_url()
    }

    pub async fn exchange_redirect(&self, redirect_url: &str) -> Result<Credential> {
        self.auth.exchange_redirect(redirect_url).await
    }

    pub async fn import_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Credential> {
        self.auth
            .import_tokens(access_token, refresh_token, expires_at)
            .await
    }

    pub async fn restore(&self) -> Result<bool> {
        self.auth.restore().await
    }

    // -- device --

    pub async fn test_connection(&self) -> Result<String> {
        self.api.test_connection().await
    }

    pub async fn device_info(&self) -> Result<DeviceInfo> {
        self.api.device_info().await
    }

    /// Fetches paths outside the poll set straight into the cache.
    pub async fn get_many(&self, paths: &[&str]) -> Result<usize> {
        let mut stored = 0;
        for (path, result) in self.api.get_many(paths).await {
            match result {
                Ok(body) => {
                    self.cache.apply(&path, body, Utc::now());
                    stored += 1;
                }
                Err(e) if e.needs_reauthorization() => return Err(e),
                Err(e) => debug!(path = %path, error = %e, "fetch failed"),
            }
        }
        Ok(stored)
    }

    // -- polling --

    pub async fn poll_once(&self) -> Result<PollReport> {
        let result = self.poller.poll_once().await;
        if let Err(e) = &result {
            self.cache.fire(&Event::ReauthorizationRequired {
                reason: e.to_string(),
            });
        }
        result
    }

    /// Starts the background poll loop. Cancel `cancel` to stop it.
    pub fn start_polling(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.poller
            .clone()
            .spawn(self.config.poll_interval, cancel)
    }

    // -- reads --

    pub fn list_sensors(&self) -> BTreeMap<String, CachedValue> {
        self.cache.list_sensors()
    }

    pub fn read(&self, path: &str) -> Result<CachedValue> {
        self.cache.read(path)
    }

    pub fn is_available(&self, path: &str) -> bool {
        self.cache.is_available(path)
    }

    pub fn climate_state(&self) -> ClimateState {
        self.cache.climate_state()
    }

    pub fn water_heater_state(&self) -> WaterHeaterState {
        self.cache.water_heater_state()
    }

    /// Active gateway notifications, raw as reported.
    pub fn notifications(&self) -> Vec<Value> {
        self.cache
            .get(NOTIFICATIONS)
            .and_then(|v| v.values_list().cloned())
            .unwrap_or_default()
    }

    /// Cumulative energy of a recording path.
    pub fn energy_total(&self, path: &str) -> Option<f64> {
        self.cache.get(path).and_then(|v| v.recording_total())
    }

    /// Compressor starts for one circuit key such as `"ch"` or `"dhw"`.
    pub fn compressor_starts(&self, key: &str) -> Option<f64> {
        self.cache.get(HS_HS1_STARTS).and_then(|v| v.emon_value(key))
    }

    // -- commands --

    pub async fn set_climate_mode(&self, mode: ClimateMode) -> Result<PendingCommand> {
        self.run("set_climate_mode", move |t| async move { t.set_climate_mode(mode).await })
            .await
    }

    pub async fn set_climate_temperature(&self, celsius: f64) -> Result<PendingCommand> {
        self.run("set_climate_temperature", move |t| async move {
            t.set_climate_temperature(celsius).await
        })
        .await
    }

    pub async fn set_preset(&self, preset: Preset) -> Result<PendingCommand> {
        self.run("set_preset", move |t| async move { t.set_preset(preset).await })
            .await
    }

    pub async fn set_water_heater_mode(&self, mode: DhwMode) -> Result<PendingCommand> {
        self.run("set_water_heater_mode", move |t| async move {
            t.set_water_heater_mode(mode).await
        })
        .await
    }

    pub async fn set_water_heater_temperature(&self, celsius: f64) -> Result<PendingCommand> {
        self.run("set_water_heater_temperature", move |t| async move {
            t.set_water_heater_temperature(celsius).await
        })
        .await
    }

    pub async fn set_water_heater(
        &self,
        mode: DhwMode,
        celsius: Option<f64>,
    ) -> Result<PendingCommand> {
        self.run("set_water_heater", move |t| async move {
            t.set_water_heater(mode, celsius).await
        })
        .await
    }

    pub async fn start_extra_hot_water(&self, request: ExtraHotWater) -> Result<PendingCommand> {
        self.run("start_extra_hot_water", move |t| async move {
            t.start_extra_hot_water(request).await
        })
        .await
    }

    pub async fn stop_extra_hot_water(&self) -> Result<PendingCommand> {
        self.run("stop_extra_hot_water", |t| async move { t.stop_extra_hot_water().await })
            .await
    }

    pub async fn enter_away_mode(&self) -> Result<PendingCommand> {
        self.run("enter_away_mode", |t| async move { t.enter_away_mode().await })
            .await
    }

    pub async fn set_number(&self, path: &str, value: f64) -> Result<PendingCommand> {
        let path = path.to_string();
        self.run("set_number", move |t| async move { t.set_number(&path, value).await })
            .await
    }

    pub async fn set_switch(&self, path: &str, on: bool) -> Result<PendingCommand> {
        let path = path.to_string();
        self.run("set_switch", move |t| async move { t.set_switch(&path, on).await })
            .await
    }

    /// Runs a command on its own task. Commands are not cancellable once
    /// started: on timeout the caller stops waiting but the task completes.
    async fn run<F, Fut>(&self, action: &'static str, f: F) -> Result<PendingCommand>
    where
        F: FnOnce(Arc<CommandTranslator>) -> Fut,
        Fut: Future<Output = Result<PendingCommand>> + Send + 'static,
    {
        let handle = tokio::spawn(f(self.translator.clone()));
        match tokio::time::timeout(self.config.command_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Protocol(format!("{action} task failed: {e}"))),
            Err(_) => {
                warn!(action, "command timed out, still running in background");
                Err(Error::GatewayUnreachable {
                    path: action.to_string(),
                    reason: format!(
                        "no completion within {}s",
                        self.config.command_timeout.as_secs()
                    ),
                })
            }
        }
    }
}
