use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::cache::StateCache;
use crate::endpoints::{PollGroup, paths_in};
use crate::types::Event;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    pub cycle: u64,
    pub updated: usize,
    pub failed: Vec<String>,
    pub energy_polled: bool,
}

/// Refreshes [`StateCache`] from the gateway on a fixed cadence.
pub struct Poller {
    api: Arc<ApiClient>,
    cache: Arc<StateCache>,
    realtime: Vec<&'static str>,
    energy: Vec<&'static str>,
    energy_every: u64,
    cycle: AtomicU64,
}

impl Poller {
    pub fn new(api: Arc<ApiClient>, cache: Arc<StateCache>, energy_every: u32) -> Self {
        Self {
            api,
            cache,
            realtime: paths_in(PollGroup::Realtime),
            energy: paths_in(PollGroup::Energy),
            energy_every: u64::from(energy_every.max(1)),
            cycle: AtomicU64::new(0),
        }
    }

    /// One sequential pass over the realtime endpoints, plus the energy
    /// recordings on the first cycle and every `energy_every` cycles after.
    ///
    /// A failing path only bumps its own failure counter. A credential that
    /// is lost or rejected after a refresh aborts the pass.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed);
        let energy_polled = cycle % self.energy_every == 0;
        let mut report = PollReport {
            cycle,
            energy_polled,
            ..Default::default()
        };

        let energy: &[&'static str] = if energy_polled { &self.energy } else { &[] };
        for path in self.realtime.iter().chain(energy) {
            match self.api.get(path).await {
                Ok(body) => {
                    self.cache.apply(path, body, Utc::now());
                    report.updated += 1;
                }
                Err(e) if e.needs_reauthorization() => {
                    error!(path, error = %e, "poll aborted");
                    return Err(e);
                }
                Err(e) => {
                    let failures = self.cache.record_failure(path);
                    debug!(path, failures, error = %e, "poll failed");
                    report.failed.push(path.to_string());
                }
            }
        }

        if !report.failed.is_empty() {
            warn!(cycle, failed = report.failed.len(), "poll cycle had failures");
        }
        Ok(report)
    }

    /// Polls every `interval` until `cancel` fires or the credential can no
    /// longer be refreshed.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    r = self.poll_once() => r,
                };
                match result {
                    Ok(report) => debug!(cycle = report.cycle, updated = report.updated, "poll cycle done"),
                    Err(e) => {
                        self.cache.fire(&Event::ReauthorizationRequired {
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
            info!("poll loop stopped");
        })
    }
}
