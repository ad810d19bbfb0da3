use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::carrier::{CarrierClient, CarrierOrderInfo, CarrierStatus};
use crate::entities::shipment;
use crate::errors::ServiceError;
use crate::repositories::{
    CandidateOrder, OrderChanges, ShipmentChanges, ShipmentRepository, SyncCandidate,
};

/// Pause used between two candidates; injectable so tests need not wait.
pub type DelayFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

pub fn tokio_delay() -> DelayFn {
    Arc::new(|duration| Box::pin(tokio::time::sleep(duration)))
}

/// Counters for one reconciliation batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncSummary),
    /// Another batch was already running; nothing was done
    Skipped,
    /// The batch could not start or stopped early (e.g. candidate query failed)
    Failed { reason: String },
}

/// Clears the in-flight flag when dropped, including on early return or panic.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles locally stored shipments against the carrier's view of them.
pub struct ShipmentSyncService {
    repository: ShipmentRepository,
    carrier: Arc<dyn CarrierClient>,
    candidate_delay: Duration,
    delay: DelayFn,
    running: AtomicBool,
}

impl ShipmentSyncService {
    pub fn new(
        repository: ShipmentRepository,
        carrier: Arc<dyn CarrierClient>,
        candidate_delay: Duration,
    ) -> Self {
        Self {
            repository,
            carrier,
            candidate_delay,
            delay: tokio_delay(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one reconciliation batch unless one is already in flight.
    ///
    /// Per-candidate failures are counted and never abort the batch.
    #[instrument(skip(self))]
    pub async fn run_batch(&self) -> SyncOutcome {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("Shipment sync already running; skipping this trigger");
            counter!("shipment_sync.skipped", 1);
            return SyncOutcome::Skipped;
        };

        counter!("shipment_sync.batches", 1);
        let started = Instant::now();
        info!("Starting shipment sync batch");

        match self.sweep().await {
            Ok(mut summary) => {
                let elapsed = started.elapsed();
                summary.duration_ms = elapsed.as_millis() as u64;
                histogram!("shipment_sync.duration", elapsed);
                counter!("shipment_sync.updated", summary.updated as u64);
                counter!("shipment_sync.errors", summary.errors as u64);
                info!(
                    duration_ms = summary.duration_ms,
                    processed = summary.processed,
                    succeeded = summary.succeeded,
                    updated = summary.updated,
                    unchanged = summary.unchanged,
                    errors = summary.errors,
                    "Shipment sync batch finished"
                );
                SyncOutcome::Completed(summary)
            }
            Err(e) => {
                error!(error = %e, "Shipment sync batch failed");
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn sweep(&self) -> Result<SyncSummary, ServiceError> {
        let candidates = self.repository.find_sync_candidates().await?;
        info!(candidates = candidates.len(), "Loaded shipments to reconcile");

        let mut summary = SyncSummary::default();
        for (index, candidate) in candidates.iter().enumerate() {
            if index > 0 {
                (self.delay)(self.candidate_delay).await;
            }

            summary.processed += 1;
            match self.reconcile(candidate).await {
                Ok(true) => {
                    summary.succeeded += 1;
                    summary.updated += 1;
                }
                Ok(false) => {
                    summary.succeeded += 1;
                    summary.unchanged += 1;
                }
                Err(e) => {
                    summary.errors += 1;
                    warn!(
                        order_id = candidate.order.id,
                        shipment_id = candidate.shipment.id,
                        error = %e,
                        "Failed to reconcile shipment"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Returns whether anything was written.
    async fn reconcile(&self, candidate: &SyncCandidate) -> Result<bool, ServiceError> {
        let Some(carrier_order_id) = candidate.shipment.carrier_order_id.as_deref() else {
            return Ok(false);
        };

        let info = self.carrier.get_order(carrier_order_id).await?;
        let changes = diff_shipment(&candidate.shipment, &info);
        if changes.is_empty() {
            debug!(
                order_id = candidate.order.id,
                carrier_order_id, "Shipment already up to date"
            );
            return Ok(false);
        }

        let updated = self
            .repository
            .apply_shipment_changes(&candidate.shipment, &changes)
            .await?;

        if candidate.order.known_status().is_none() {
            warn!(
                order_id = candidate.order.id,
                status = %candidate.order.status,
                "Unknown local order status; order status left as is"
            );
        }
        let order_changes = derive_order_changes(&candidate.order, &updated, &changes);
        self.repository
            .apply_order_changes(candidate.order.id, &order_changes)
            .await?;

        info!(
            order_id = candidate.order.id,
            carrier_order_id,
            fields = ?changes.changed_fields(),
            order_status = ?order_changes.status,
            "Shipment reconciled"
        );
        Ok(true)
    }
}

/// Field-by-field difference between the stored shipment and the carrier.
///
/// Milestone flags only ever go from false to true; their timestamps are
/// written on that transition only.
pub fn diff_shipment(current: &shipment::Model, info: &CarrierOrderInfo) -> ShipmentChanges {
    let mut changes = ShipmentChanges {
        status: present_and_differs(info.status.as_deref(), Some(current.status.as_str())),
        tracking_code: present_and_differs(
            info.tracking.as_deref(),
            current.tracking_code.as_deref(),
        ),
        protocol: present_and_differs(info.protocol.as_deref(), current.protocol.as_deref()),
        service_name: present_and_differs(info.service_name(), current.service_name.as_deref()),
        carrier: present_and_differs(info.company_name(), current.carrier.as_deref()),
        ..Default::default()
    };

    if !current.posted {
        changes.posted_at = milestone(info.posted_at.as_deref(), "posted_at", current.id);
    }
    if !current.delivered {
        changes.delivered_at = milestone(info.delivered_at.as_deref(), "delivered_at", current.id);
    }
    if !current.canceled {
        changes.canceled_at = milestone(info.canceled_at.as_deref(), "canceled_at", current.id);
    }

    changes
}

/// Order update implied by a shipment that just changed. The status only
/// moves forward in the lifecycle, and never from a status it does not know.
pub fn derive_order_changes(
    current: &CandidateOrder,
    shipment: &shipment::Model,
    changes: &ShipmentChanges,
) -> OrderChanges {
    let status = CarrierStatus::parse(&shipment.status)
        .implied_order_status()
        .filter(|next| {
            current
                .known_status()
                .is_some_and(|status| status.can_advance_to(*next))
        });

    let shipping_tracking_code = changes
        .tracking_code
        .as_ref()
        .filter(|code| current.shipping_tracking_code.as_deref() != Some(code.as_str()))
        .cloned();

    OrderChanges {
        status,
        shipping_tracking_code,
    }
}

fn present_and_differs(carrier: Option<&str>, stored: Option<&str>) -> Option<String> {
    let value = carrier.map(str::trim).filter(|v| !v.is_empty())?;
    (stored != Some(value)).then(|| value.to_string())
}

fn milestone(raw: Option<&str>, field: &str, shipment_id: i32) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
    let parsed = parse_carrier_timestamp(raw);
    if parsed.is_none() {
        warn!(shipment_id, field, raw, "Ignoring unparseable carrier timestamp");
    }
    parsed
}

/// Accepts RFC 3339 or the carrier's `YYYY-MM-DD HH:MM:SS`, read as UTC.
pub fn parse_carrier_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
