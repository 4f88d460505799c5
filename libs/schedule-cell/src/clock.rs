//! `HH:MM` wall-clock strings as stored on schedules and appointments.

use std::sync::LazyLock;

use regex::Regex;

static CLOCK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("clock pattern is a valid regex")
});

pub fn is_valid_clock(value: &str) -> bool {
    CLOCK_PATTERN.is_match(value)
}

/// Minutes since midnight, `None` for anything that is not zero-padded 24-hour `HH:MM`.
pub fn minute_of_day(value: &str) -> Option<u32> {
    let caps = CLOCK_PATTERN.captures(value)?;
    let hours: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some(hours * 60 + minutes)
}

/// Both ends are valid and `start` is strictly before `end`.
pub fn is_ordered_window(start: &str, end: &str) -> bool {
    matches!((minute_of_day(start), minute_of_day(end)), (Some(s), Some(e)) if s < e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zero_padded_times() {
        assert_eq!(minute_of_day("00:00"), Some(0));
        assert_eq!(minute_of_day("09:30"), Some(570));
        assert_eq!(minute_of_day("23:59"), Some(1439));
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["9:30", "24:00", "12:60", "12:5", "noon", "", "12:00:00"] {
            assert!(!is_valid_clock(bad), "{bad} should be rejected");
            assert_eq!(minute_of_day(bad), None);
        }
    }

    #[test]
    fn window_order() {
        assert!(is_ordered_window("09:00", "09:30"));
        assert!(!is_ordered_window("09:30", "09:30"));
        assert!(!is_ordered_window("10:00", "09:00"));
        assert!(!is_ordered_window("10:00", "bad"));
    }
}
