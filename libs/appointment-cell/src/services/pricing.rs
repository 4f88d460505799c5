// libs/appointment-cell/src/services/pricing.rs
use schedule_cell::clock::minute_of_day;

/// Length of an `HH:MM` window in minutes, `None` when malformed or not ordered.
pub fn window_minutes(start: &str, end: &str) -> Option<u32> {
    let (start, end) = (minute_of_day(start)?, minute_of_day(end)?);
    (end > start).then_some(end - start)
}

/// Fee scales with the booked duration against the doctor's standard slot length.
/// Shorter bookings are charged a full slot.
pub fn appointment_fee(consultation_fee: f64, duration_minutes: u32, standard_duration: i32) -> f64 {
    let standard = standard_duration.max(1) as f64;
    let ratio = (duration_minutes as f64 / standard).max(1.0);
    (consultation_fee * ratio).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_slot_costs_base_fee() {
        assert_eq!(appointment_fee(200000.0, 30, 30), 200000.0);
    }

    #[test]
    fn longer_slot_scales_and_rounds() {
        assert_eq!(appointment_fee(200000.0, 60, 30), 400000.0);
        assert_eq!(appointment_fee(100.0, 45, 30), 150.0);
        assert_eq!(appointment_fee(99.99, 40, 30), 133.0);
    }

    #[test]
    fn short_slot_is_never_discounted() {
        assert_eq!(appointment_fee(200000.0, 15, 30), 200000.0);
    }

    #[test]
    fn window_length() {
        assert_eq!(window_minutes("10:00", "10:45"), Some(45));
        assert_eq!(window_minutes("10:00", "10:00"), None);
        assert_eq!(window_minutes("10:00", "9:00"), None);
    }
}
