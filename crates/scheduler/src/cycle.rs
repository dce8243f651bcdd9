use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use change_detector::ChangeDetector;
use chrono::{DateTime, Utc};
use metrics::MetricsHandle;
use notifier::{deliver_all, Composer, DeliveryReport, MessageSender};
use preferences::SubscriberBook;
use stock_model::{CategoryId, StockSnapshot};
use stock_source::{FetchOutcome, StockSource};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::delay::{aligned_delay, category_delay, SchedulerError};
use crate::{MonitorConfig, SchedulePolicy};

/// Unit of scheduling: one category, or the whole inventory at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lane {
    Category(CategoryId),
    All,
}

impl Lane {
    pub fn label(self) -> &'static str {
        match self {
            Lane::Category(id) => id.key(),
            Lane::All => "all",
        }
    }

    pub fn categories(self, config: &MonitorConfig) -> Vec<CategoryId> {
        match self {
            Lane::Category(id) => vec![id],
            Lane::All => config.categories.clone(),
        }
    }

    pub fn for_config(config: &MonitorConfig) -> Vec<Lane> {
        match config.policy {
            SchedulePolicy::PerCategory => config
                .categories
                .iter()
                .map(|id| Lane::Category(*id))
                .collect(),
            SchedulePolicy::WallClock { .. } => vec![Lane::All],
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State a lane carries from one cycle to the next. Moved into the cycle
/// task and handed back when it finishes.
#[derive(Debug)]
pub struct LaneContext {
    lane: Lane,
    detector: ChangeDetector,
    since: Option<DateTime<Utc>>,
}

impl LaneContext {
    pub fn new(lane: Lane, config: &MonitorConfig) -> Self {
        Self {
            lane,
            detector: ChangeDetector::new(config.default_cooldown).with_cooldowns(&config.cooldowns),
            since: None,
        }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// `updated_at` of the last snapshot this lane processed.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub snapshot: Option<Arc<StockSnapshot>>,
    pub fetch_error: Option<String>,
    pub changed: Vec<CategoryId>,
    pub delivery: DeliveryReport,
    pub next_delay: Result<Duration, SchedulerError>,
}

/// Everything a cycle needs, shared by all lanes.
pub(crate) struct Pipeline {
    pub(crate) source: Arc<dyn StockSource>,
    pub(crate) sender: Arc<dyn MessageSender>,
    pub(crate) book: SubscriberBook,
    pub(crate) metrics: MetricsHandle,
    pub(crate) config: Arc<MonitorConfig>,
    pub(crate) latest: watch::Sender<Option<Arc<StockSnapshot>>>,
}

impl Pipeline {
    /// fetch → detect → compose → deliver, then work out when to come back.
    pub(crate) async fn run_cycle(&self, mut ctx: LaneContext) -> (LaneContext, CycleReport) {
        let lane = ctx.lane;
        let mut report = CycleReport {
            snapshot: None,
            fetch_error: None,
            changed: Vec::new(),
            delivery: DeliveryReport::default(),
            next_delay: Ok(self.config.safe_retry_delay),
        };

        let snapshot = match self.source.fetch(ctx.since).await {
            Ok(FetchOutcome::Snapshot(snapshot)) => {
                self.metrics.record_fetch(lane.label(), "snapshot");
                snapshot
            }
            Ok(FetchOutcome::NoNewData) => {
                self.metrics.record_fetch(lane.label(), "no_new_data");
                debug!(%lane, source = self.source.name(), "no new stock data");
                report.next_delay = self.idle_delay(lane);
                return (ctx, report);
            }
            Err(err) => {
                self.metrics.record_fetch(lane.label(), "error");
                warn!(%lane, source = self.source.name(), error = %err, "stock fetch failed");
                report.fetch_error = Some(err.to_string());
                report.next_delay = self.retry_delay();
                return (ctx, report);
            }
        };

        if ctx.since.map_or(true, |since| snapshot.updated_at > since) {
            ctx.since = Some(snapshot.updated_at);
        }
        self.publish_latest(&snapshot);

        let mut changed = Vec::new();
        for category in lane.categories(&self.config) {
            if let Some(state) = snapshot.category(category) {
                if ctx.detector.should_notify(category, state) {
                    changed.push((category, state));
                }
            }
        }
        report.changed = changed.iter().map(|(id, _)| *id).collect();

        if !changed.is_empty() {
            let prefs = self.book.snapshot();
            let composer = Composer::new(self.config.utc_offset);
            let batch = composer.compose(&changed, &prefs, Utc::now());
            info!(
                %lane,
                categories = ?report.changed,
                messages = batch.len(),
                "stock changed"
            );
            if !batch.is_empty() {
                report.delivery =
                    deliver_all(self.sender.as_ref(), batch, self.config.delivery_timeout).await;
                self.metrics
                    .record_deliveries(report.delivery.delivered, report.delivery.failed.len());
            }
        }

        report.next_delay = self.next_delay(lane, &snapshot);
        report.snapshot = Some(snapshot);
        (ctx, report)
    }

    fn next_delay(&self, lane: Lane, snapshot: &StockSnapshot) -> Result<Duration, SchedulerError> {
        match (lane, self.config.policy) {
            (_, SchedulePolicy::WallClock { interval, offset }) => {
                aligned_delay(Utc::now(), interval, offset)
            }
            (Lane::Category(id), SchedulePolicy::PerCategory) => {
                Ok(category_delay(id, snapshot.category(id), &self.config))
            }
            (Lane::All, SchedulePolicy::PerCategory) => Err(SchedulerError::DelayOutOfRange(
                "whole-inventory lane under per-category policy".into(),
            )),
        }
    }

    /// Nothing newer arrived: come back at the regular cadence, capped at the
    /// safe retry delay so countdown-driven lanes are not parked for hours.
    fn idle_delay(&self, lane: Lane) -> Result<Duration, SchedulerError> {
        match (lane, self.config.policy) {
            (_, SchedulePolicy::WallClock { interval, offset }) => {
                aligned_delay(Utc::now(), interval, offset)
            }
            (Lane::Category(id), SchedulePolicy::PerCategory) => Ok(category_delay(id, None, &self.config)
                .min(self.config.safe_retry_delay + self.config.buffer)),
            (Lane::All, SchedulePolicy::PerCategory) => Ok(self.config.safe_retry_delay),
        }
    }

    /// After a failed fetch. Aligned schedules stay on their boundaries.
    fn retry_delay(&self) -> Result<Duration, SchedulerError> {
        match self.config.policy {
            SchedulePolicy::WallClock { interval, offset } => aligned_delay(Utc::now(), interval, offset),
            SchedulePolicy::PerCategory => Ok(self.config.safe_retry_delay),
        }
    }

    fn publish_latest(&self, snapshot: &Arc<StockSnapshot>) {
        self.latest.send_if_modified(|latest| match latest {
            Some(current) if current.updated_at >= snapshot.updated_at => false,
            _ => {
                *latest = Some(Arc::clone(snapshot));
                true
            }
        });
    }
}
