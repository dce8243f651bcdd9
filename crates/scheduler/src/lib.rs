//! Refresh scheduling and the notification cycle.
//!
//! Each [`Lane`] owns a timer and a change detector. When its timer fires the
//! lane fetches, compares, notifies and re-arms itself, whatever happened.

mod config;
mod cycle;
mod delay;
mod monitor;

pub use config::{
    utc_offset_from_secs, MonitorConfig, SchedulePolicy, DEFAULT_ALIGN_INTERVAL,
    DEFAULT_ALIGN_OFFSET, DEFAULT_BUFFER, DEFAULT_MIN_DELAY, DEFAULT_SAFE_RETRY_DELAY,
    DEFAULT_UTC_OFFSET_SECS,
};
pub use cycle::{CycleReport, Lane, LaneContext};
pub use delay::{aligned_delay, category_delay, clamp_delay, SchedulerError};
pub use monitor::{LaneState, LaneView, Monitor};
