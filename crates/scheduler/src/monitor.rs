use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::FutureExt;
use metrics::MetricsHandle;
use notifier::MessageSender;
use preferences::SubscriberBook;
use stock_model::StockSnapshot;
use stock_source::StockSource;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use crate::cycle::{CycleReport, Lane, LaneContext, Pipeline};
use crate::delay::{clamp_delay, SchedulerError};
use crate::MonitorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    Idle,
    Scheduled { at: Instant },
    Fetching,
}

/// Point-in-time view of one lane, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneView {
    pub lane: Lane,
    pub state: &'static str,
    pub next_fire_in: Option<Duration>,
}

struct Slot {
    state: LaneState,
    context: Option<LaneContext>,
    running: Option<AbortHandle>,
}

type Finished = (Lane, Result<(LaneContext, CycleReport), SchedulerError>);

/// Drives every lane: arms timers, runs cycles, re-arms.
#[derive(Clone)]
pub struct Monitor {
    pipeline: Arc<Pipeline>,
    lanes: Arc<RwLock<Vec<LaneView>>>,
    latest: watch::Receiver<Option<Arc<StockSnapshot>>>,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn StockSource>,
        sender: Arc<dyn MessageSender>,
        book: SubscriberBook,
        metrics: MetricsHandle,
        config: MonitorConfig,
    ) -> Self {
        let (latest_tx, latest_rx) = watch::channel(None);
        let config = Arc::new(config);
        let lanes = Lane::for_config(&config)
            .into_iter()
            .map(|lane| LaneView {
                lane,
                state: "idle",
                next_fire_in: None,
            })
            .collect();
        Self {
            pipeline: Arc::new(Pipeline {
                source,
                sender,
                book,
                metrics,
                config,
                latest: latest_tx,
            }),
            lanes: Arc::new(RwLock::new(lanes)),
            latest: latest_rx,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.pipeline.config
    }

    pub fn source_name(&self) -> &'static str {
        self.pipeline.source.name()
    }

    pub fn status(&self) -> Vec<LaneView> {
        match self.lanes.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Newest snapshot any lane has seen.
    pub fn latest_snapshot(&self) -> Option<Arc<StockSnapshot>> {
        self.latest.borrow().clone()
    }

    /// Runs a single cycle outside the timer loop.
    pub async fn cycle(&self, context: LaneContext) -> (LaneContext, CycleReport) {
        self.pipeline.run_cycle(context).await
    }

    /// Runs until `shutdown` flips to `true`. In-flight cycles are left to
    /// finish on their own.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let config = Arc::clone(&self.pipeline.config);
        let start = Instant::now() + config.initial_delay;
        let mut slots: BTreeMap<Lane, Slot> = Lane::for_config(&config)
            .into_iter()
            .map(|lane| {
                let slot = Slot {
                    state: LaneState::Scheduled { at: start },
                    context: Some(LaneContext::new(lane, &config)),
                    running: None,
                };
                (lane, slot)
            })
            .collect();
        let mut running: JoinSet<Finished> = JoinSet::new();

        info!(
            lanes = slots.len(),
            policy = %config.policy,
            source = self.pipeline.source.name(),
            "monitor started"
        );

        loop {
            self.publish_status(&slots);

            let next = slots
                .iter()
                .filter_map(|(lane, slot)| match slot.state {
                    LaneState::Scheduled { at } => Some((*lane, at)),
                    _ => None,
                })
                .min_by_key(|(_, at)| *at);
            let deadline = next
                .map(|(_, at)| at)
                .unwrap_or_else(|| Instant::now() + config.safe_retry_delay);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(in_flight = running.len(), "monitor stopping");
                        running.detach_all();
                        break;
                    }
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    match joined {
                        Ok(finished) => self.on_finished(&mut slots, finished),
                        Err(err) => {
                            error!(error = %err, "cycle task ended abnormally");
                            self.recover_orphans(&mut slots);
                        }
                    }
                }
                _ = sleep_until(deadline), if next.is_some() => {
                    if let Some((lane, _)) = next {
                        self.fire(lane, &mut slots, &mut running);
                    }
                }
            }
        }
    }

    fn fire(&self, lane: Lane, slots: &mut BTreeMap<Lane, Slot>, running: &mut JoinSet<Finished>) {
        let Some(slot) = slots.get_mut(&lane) else {
            return;
        };
        if slot.state == LaneState::Fetching {
            return;
        }
        let context = slot
            .context
            .take()
            .unwrap_or_else(|| LaneContext::new(lane, &self.pipeline.config));
        slot.state = LaneState::Fetching;

        let pipeline = Arc::clone(&self.pipeline);
        let handle = running.spawn(async move {
            let outcome = AssertUnwindSafe(pipeline.run_cycle(context))
                .catch_unwind()
                .await
                .map_err(|panic| SchedulerError::CycleFailed(panic_message(panic.as_ref())));
            (lane, outcome)
        });
        slot.running = Some(handle);
    }

    fn on_finished(&self, slots: &mut BTreeMap<Lane, Slot>, (lane, outcome): Finished) {
        let config = &self.pipeline.config;
        let Some(slot) = slots.get_mut(&lane) else {
            return;
        };
        slot.running = None;

        let delay = match outcome {
            Ok((context, report)) => {
                slot.context = Some(context);
                match report.next_delay {
                    Ok(delay) => clamp_delay(delay, config.min_delay),
                    Err(err) => {
                        error!(%lane, error = %err, "could not compute next delay, using safe retry");
                        config.safe_retry_delay
                    }
                }
            }
            Err(err) => {
                error!(%lane, error = %err, "cycle failed, using safe retry");
                slot.context = Some(LaneContext::new(lane, config));
                config.safe_retry_delay
            }
        };

        slot.state = LaneState::Scheduled {
            at: Instant::now() + delay,
        };
        self.pipeline
            .metrics
            .set_next_fire(lane.label(), delay.as_secs_f64());
        info!(%lane, delay_secs = delay.as_secs(), "next check scheduled");
    }

    /// Re-arms lanes whose task vanished without reporting back.
    fn recover_orphans(&self, slots: &mut BTreeMap<Lane, Slot>) {
        let config = &self.pipeline.config;
        for (lane, slot) in slots.iter_mut() {
            let orphaned = slot.state == LaneState::Fetching
                && slot.running.as_ref().map_or(true, AbortHandle::is_finished);
            if orphaned {
                warn!(%lane, "re-arming lane after lost cycle");
                slot.running = None;
                slot.context = Some(LaneContext::new(*lane, config));
                slot.state = LaneState::Scheduled {
                    at: Instant::now() + config.safe_retry_delay,
                };
            }
        }
    }

    fn publish_status(&self, slots: &BTreeMap<Lane, Slot>) {
        let now = Instant::now();
        let views: Vec<LaneView> = slots
            .iter()
            .map(|(lane, slot)| match slot.state {
                LaneState::Idle => LaneView {
                    lane: *lane,
                    state: "idle",
                    next_fire_in: None,
                },
                LaneState::Scheduled { at } => LaneView {
                    lane: *lane,
                    state: "scheduled",
                    next_fire_in: Some(at.saturating_duration_since(now)),
                },
                LaneState::Fetching => LaneView {
                    lane: *lane,
                    state: "fetching",
                    next_fire_in: None,
                },
            })
            .collect();
        match self.lanes.write() {
            Ok(mut guard) => *guard = views,
            Err(poisoned) => *poisoned.into_inner() = views,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "cycle panicked".to_string()
    }
}
