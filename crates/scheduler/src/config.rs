use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use change_detector::DEFAULT_COOLDOWN;
use notifier::DEFAULT_DELIVERY_TIMEOUT;
use stock_model::CategoryId;

pub const DEFAULT_BUFFER: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_SAFE_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ALIGN_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_ALIGN_OFFSET: Duration = Duration::from_secs(12);
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// How lanes are laid out and re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// One lane per category, each on its own cadence.
    PerCategory,
    /// One lane covering every category, firing `offset` past each
    /// `interval` boundary of the wall clock.
    WallClock { interval: Duration, offset: Duration },
}

impl SchedulePolicy {
    pub fn aligned_default() -> Self {
        SchedulePolicy::WallClock {
            interval: DEFAULT_ALIGN_INTERVAL,
            offset: DEFAULT_ALIGN_OFFSET,
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulePolicy::PerCategory => f.write_str("per-category"),
            SchedulePolicy::WallClock { interval, offset } => write!(
                f,
                "aligned({}s+{}s)",
                interval.as_secs(),
                offset.as_secs()
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub policy: SchedulePolicy,
    /// Categories the monitor tracks.
    pub categories: Vec<CategoryId>,
    pub refresh_intervals: BTreeMap<CategoryId, Duration>,
    pub default_cooldown: Duration,
    pub cooldowns: BTreeMap<CategoryId, Duration>,
    /// Added to every computed delay so fetches land after the upstream flip.
    pub buffer: Duration,
    pub min_delay: Duration,
    pub safe_retry_delay: Duration,
    pub initial_delay: Duration,
    pub delivery_timeout: Duration,
    pub utc_offset: FixedOffset,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            policy: SchedulePolicy::PerCategory,
            categories: CategoryId::ALL.to_vec(),
            refresh_intervals: CategoryId::ALL
                .iter()
                .map(|id| (*id, id.descriptor().refresh_interval))
                .collect(),
            default_cooldown: DEFAULT_COOLDOWN,
            cooldowns: BTreeMap::new(),
            buffer: DEFAULT_BUFFER,
            min_delay: DEFAULT_MIN_DELAY,
            safe_retry_delay: DEFAULT_SAFE_RETRY_DELAY,
            initial_delay: Duration::ZERO,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            utc_offset: utc_offset_from_secs(DEFAULT_UTC_OFFSET_SECS),
        }
    }
}

impl MonitorConfig {
    pub fn refresh_interval(&self, category: CategoryId) -> Duration {
        self.refresh_intervals
            .get(&category)
            .copied()
            .unwrap_or(category.descriptor().refresh_interval)
    }
}

/// Out-of-range offsets fall back to UTC.
pub fn utc_offset_from_secs(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}
