use std::time::Duration;

use chrono::{DateTime, Utc};
use stock_model::{countdown_duration, CategoryId, CategoryState};
use thiserror::Error;

use crate::MonitorConfig;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("delay out of range: {0}")]
    DelayOutOfRange(String),
    #[error("clock arithmetic failed: {0}")]
    ClockArithmetic(String),
    #[error("cycle task failed: {0}")]
    CycleFailed(String),
}

pub fn clamp_delay(raw: Duration, min_delay: Duration) -> Duration {
    raw.max(min_delay)
}

/// Delay until a category is worth fetching again.
///
/// Presence-aware categories follow the countdown upstream announces
/// (`appear_in` while away, `countdown` while present). Everything else, and
/// a presence-aware category with no usable countdown, uses its refresh
/// interval. The buffer is added either way.
pub fn category_delay(
    category: CategoryId,
    state: Option<&CategoryState>,
    config: &MonitorConfig,
) -> Duration {
    let announced = match state {
        Some(state) if category.descriptor().presence_aware => {
            if state.is_departed() {
                announced_countdown(state.appear_in.as_deref())
            } else {
                announced_countdown(state.countdown.as_deref())
            }
        }
        _ => None,
    };
    let base = announced.unwrap_or_else(|| config.refresh_interval(category));
    clamp_delay(base.saturating_add(config.buffer), config.min_delay)
}

/// `None` when upstream gave no countdown, or text without any number in it.
fn announced_countdown(raw: Option<&str>) -> Option<Duration> {
    let raw = raw?.trim();
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(countdown_duration(Some(raw)))
}

/// Delay from `now` to `offset` past the next `interval` boundary.
pub fn aligned_delay(
    now: DateTime<Utc>,
    interval: Duration,
    offset: Duration,
) -> Result<Duration, SchedulerError> {
    let interval_ms = i64::try_from(interval.as_millis())
        .map_err(|_| SchedulerError::DelayOutOfRange(format!("interval {interval:?}")))?;
    if interval_ms <= 0 {
        return Err(SchedulerError::DelayOutOfRange(format!(
            "interval must be positive, got {interval:?}"
        )));
    }
    let offset_ms = i64::try_from(offset.as_millis())
        .map_err(|_| SchedulerError::DelayOutOfRange(format!("offset {offset:?}")))?;

    let now_ms = now.timestamp_millis();
    let slot_start = now_ms - now_ms.rem_euclid(interval_ms);
    let mut target = slot_start
        .checked_add(interval_ms)
        .and_then(|boundary| boundary.checked_add(offset_ms))
        .ok_or_else(|| SchedulerError::ClockArithmetic("boundary + offset overflowed".into()))?;
    if target <= now_ms {
        target = target
            .checked_add(interval_ms)
            .ok_or_else(|| SchedulerError::ClockArithmetic("roll forward overflowed".into()))?;
    }

    let wait = u64::try_from(target - now_ms)
        .map_err(|_| SchedulerError::ClockArithmetic(format!("target {target} before now {now_ms}")))?;
    Ok(Duration::from_millis(wait))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stock_model::{Item, Presence};

    fn merchant(presence: Presence, countdown: &str, appear_in: &str) -> CategoryState {
        CategoryState {
            presence,
            countdown: Some(countdown.into()),
            appear_in: Some(appear_in.into()),
            ..CategoryState::with_items(vec![Item::new("Night Staff", 1)])
        }
    }

    #[test]
    fn fixed_categories_use_interval_plus_buffer() {
        let config = MonitorConfig::default();
        let delay = category_delay(CategoryId::Seed, None, &config);
        assert_eq!(delay, Duration::from_secs(305));

        let state = CategoryState::with_items(vec![]);
        assert_eq!(
            category_delay(CategoryId::Egg, Some(&state), &config),
            Duration::from_secs(905)
        );
    }

    #[test]
    fn departed_merchant_waits_for_appear_in() {
        let config = MonitorConfig::default();
        let state = merchant(Presence::Departed, "10m", "1h");
        assert_eq!(
            category_delay(CategoryId::TravelingMerchant, Some(&state), &config),
            Duration::from_secs(3605)
        );
    }

    #[test]
    fn present_merchant_waits_for_countdown() {
        let config = MonitorConfig::default();
        let state = merchant(Presence::Present, "2m 30s", "4h");
        assert_eq!(
            category_delay(CategoryId::TravelingMerchant, Some(&state), &config),
            Duration::from_secs(155)
        );
    }

    #[test]
    fn merchant_without_countdown_falls_back_to_interval() {
        let config = MonitorConfig::default();
        let present = CategoryState {
            presence: Presence::Present,
            countdown: None,
            ..CategoryState::with_items(vec![Item::new("Night Staff", 1)])
        };
        assert_eq!(
            category_delay(CategoryId::TravelingMerchant, Some(&present), &config),
            Duration::from_secs(4 * 3600 + 5)
        );

        let departed = merchant(Presence::Departed, "10m", "soon");
        assert_eq!(
            category_delay(CategoryId::TravelingMerchant, Some(&departed), &config),
            Duration::from_secs(4 * 3600 + 5)
        );
    }

    #[test]
    fn merchant_without_snapshot_falls_back_to_interval() {
        let config = MonitorConfig::default();
        assert_eq!(
            category_delay(CategoryId::TravelingMerchant, None, &config),
            Duration::from_secs(4 * 3600 + 5)
        );
    }

    #[test]
    fn tiny_delays_are_clamped() {
        assert_eq!(
            clamp_delay(Duration::from_millis(200), Duration::from_secs(1)),
            Duration::from_secs(1)
        );

        let config = MonitorConfig {
            buffer: Duration::ZERO,
            ..MonitorConfig::default()
        };
        let state = merchant(Presence::Present, "0s", "");
        assert_eq!(
            category_delay(CategoryId::TravelingMerchant, Some(&state), &config),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn aligned_delay_targets_next_boundary_plus_offset() {
        let now = Utc.with_ymd_and_hms(2025, 7, 20, 10, 5, 5).unwrap();
        let delay = aligned_delay(now, Duration::from_secs(300), Duration::from_secs(12)).unwrap();
        assert_eq!(delay, Duration::from_secs(307));

        let now = Utc.with_ymd_and_hms(2025, 7, 20, 10, 5, 12).unwrap();
        let delay = aligned_delay(now, Duration::from_secs(300), Duration::from_secs(12)).unwrap();
        assert_eq!(delay, Duration::from_secs(300));

        let now = Utc.with_ymd_and_hms(2025, 7, 20, 10, 9, 59).unwrap();
        let delay = aligned_delay(now, Duration::from_secs(300), Duration::from_secs(12)).unwrap();
        assert_eq!(delay, Duration::from_secs(13));
    }

    #[test]
    fn aligned_delay_on_a_boundary_waits_for_the_next_one() {
        let now = Utc.with_ymd_and_hms(2025, 7, 20, 10, 0, 0).unwrap();
        let delay = aligned_delay(now, Duration::from_secs(300), Duration::from_secs(12)).unwrap();
        assert_eq!(delay, Duration::from_secs(312));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let now = Utc.with_ymd_and_hms(2025, 7, 20, 10, 0, 0).unwrap();
        let err = aligned_delay(now, Duration::ZERO, Duration::from_secs(12)).unwrap_err();
        assert!(matches!(err, SchedulerError::DelayOutOfRange(_)));
    }
}
