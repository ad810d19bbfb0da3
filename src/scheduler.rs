//! Timer fan-in onto [`ShipmentSyncService::run_batch`].
//!
//! Cadences run independently and may fire together; overlapping triggers
//! are resolved by the service's single-flight guard.

use chrono::{Local, NaiveDateTime, NaiveTime};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::SyncConfig;
use crate::errors::ServiceError;
use crate::services::shipment_sync::{ShipmentSyncService, SyncOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSchedule {
    pub startup_delay: Duration,
    pub intervals: Vec<(&'static str, Duration)>,
    /// Local wall-clock times, sorted
    pub daily_times: Vec<NaiveTime>,
}

impl SyncSchedule {
    pub fn from_config(config: &SyncConfig) -> Result<Self, ServiceError> {
        let mut daily_times = config
            .daily_times
            .iter()
            .map(|raw| {
                NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| {
                    ServiceError::ValidationError(format!("invalid daily sync time '{}'", raw))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        daily_times.sort();
        daily_times.dedup();

        Ok(Self {
            startup_delay: Duration::from_secs(config.startup_delay_secs),
            intervals: vec![
                ("interval", Duration::from_secs(config.interval_minutes * 60)),
                (
                    "backup_interval",
                    Duration::from_secs(config.backup_interval_minutes * 60),
                ),
            ],
            daily_times,
        })
    }
}

/// First daily time strictly after `now`, rolling over to the next day.
pub fn next_occurrence(now: NaiveDateTime, times: &[NaiveTime]) -> Option<NaiveDateTime> {
    let today = now.date();
    if let Some(time) = times.iter().filter(|t| **t > now.time()).min() {
        return Some(today.and_time(*time));
    }
    let earliest = times.iter().min()?;
    today.succ_opt().map(|tomorrow| tomorrow.and_time(*earliest))
}

pub struct SyncScheduler {
    service: Arc<ShipmentSyncService>,
    schedule: SyncSchedule,
}

impl SyncScheduler {
    pub fn new(service: Arc<ShipmentSyncService>, schedule: SyncSchedule) -> Self {
        Self { service, schedule }
    }

    /// Runs every cadence until `shutdown` resolves, then stops all timers.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();

        let service = self.service.clone();
        let startup_delay = self.schedule.startup_delay;
        tasks.spawn(
            async move {
                tokio::time::sleep(startup_delay).await;
                trigger(&service).await;
            }
            .instrument(info_span!("sync_trigger", cadence = "startup")),
        );

        for (cadence, period) in self.schedule.intervals.iter().copied() {
            let service = self.service.clone();
            tasks.spawn(
                async move {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        trigger(&service).await;
                    }
                }
                .instrument(info_span!("sync_trigger", cadence)),
            );
        }

        if !self.schedule.daily_times.is_empty() {
            let service = self.service.clone();
            let times = self.schedule.daily_times.clone();
            tasks.spawn(
                async move {
                    loop {
                        let now = Local::now().naive_local();
                        let Some(next) = next_occurrence(now, &times) else {
                            break;
                        };
                        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                        debug!(next = %next, "Next daily shipment sync scheduled");
                        tokio::time::sleep(wait).await;
                        trigger(&service).await;
                    }
                }
                .instrument(info_span!("sync_trigger", cadence = "daily")),
            );
        }

        info!(
            startup_delay_secs = startup_delay.as_secs(),
            daily_times = ?self.schedule.daily_times,
            "Shipment sync scheduler started"
        );

        shutdown.await;
        info!("Stopping shipment sync scheduler");
        tasks.shutdown().await;
    }
}

async fn trigger(service: &ShipmentSyncService) {
    match service.run_batch().await {
        SyncOutcome::Completed(summary) => {
            debug!(updated = summary.updated, errors = summary.errors, "Scheduled sync done")
        }
        SyncOutcome::Skipped => debug!("Scheduled sync skipped, batch already in flight"),
        SyncOutcome::Failed { reason } => error!(%reason, "Scheduled sync failed"),
    }
}
