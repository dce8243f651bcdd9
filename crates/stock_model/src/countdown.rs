use std::time::Duration;

/// Parses strings such as `"1h 30m 5s"` into milliseconds.
///
/// Tokens with an unknown suffix or a non-numeric value contribute nothing;
/// an empty or missing input is zero.
pub fn parse_countdown(input: Option<&str>) -> u64 {
    let Some(input) = input else {
        return 0;
    };

    input
        .split_whitespace()
        .map(|token| {
            let (digits, unit_ms) = if let Some(n) = token.strip_suffix('h') {
                (n, 60 * 60 * 1000)
            } else if let Some(n) = token.strip_suffix('m') {
                (n, 60 * 1000)
            } else if let Some(n) = token.strip_suffix('s') {
                (n, 1000)
            } else {
                return 0;
            };
            digits
                .parse::<u64>()
                .map(|n| n.saturating_mul(unit_ms))
                .unwrap_or(0)
        })
        .fold(0u64, u64::saturating_add)
}

pub fn countdown_duration(input: Option<&str>) -> Duration {
    Duration::from_millis(parse_countdown(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_hours_minutes_seconds() {
        assert_eq!(parse_countdown(Some("1h 2m 3s")), 3_723_000);
        assert_eq!(parse_countdown(Some("4m 59s")), 299_000);
    }

    #[test]
    fn empty_and_missing_are_zero() {
        assert_eq!(parse_countdown(Some("")), 0);
        assert_eq!(parse_countdown(Some("   ")), 0);
        assert_eq!(parse_countdown(None), 0);
    }

    #[test]
    fn unknown_units_are_ignored() {
        assert_eq!(parse_countdown(Some("5x")), 0);
        assert_eq!(parse_countdown(Some("2m 5x 1s")), 121_000);
        assert_eq!(parse_countdown(Some("abc_m 3s")), 3_000);
    }

    #[test]
    fn tolerates_irregular_spacing() {
        assert_eq!(parse_countdown(Some("  1m\t30s ")), 90_000);
        assert_eq!(countdown_duration(Some("1m 30s")), Duration::from_secs(90));
    }
}
