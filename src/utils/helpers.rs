//! Helper functions and utilities
//!
//! Ticket identity generation, ticket format checks and calendar-window math
//! shared by the services and the scheduler.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use regex::Regex;
use uuid::Uuid;

const TICKET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate an opaque QR token
pub fn generate_qr_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate a human-readable ticket number: `<PREFIX>-YYYYMMDD-XXXXX`
pub fn generate_ticket_number(prefix: &str, issued_at: DateTime<Utc>, suffix_length: usize) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        issued_at.format("%Y%m%d"),
        generate_random_string(suffix_length)
    )
}

/// Check a ticket number against the `EVT-YYYYMMDD-XXXXX` layout
pub fn is_valid_ticket_number(ticket_number: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Z]+-\d{8}-[A-Z0-9]+$").expect("ticket number pattern is valid"))
        .is_match(ticket_number)
}

/// Generate a random uppercase alphanumeric string
pub fn generate_random_string(length: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..TICKET_CHARSET.len());
            TICKET_CHARSET[idx] as char
        })
        .collect()
}

/// Format a timestamp for display
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// UTC bounds `[start, end)` of the calendar day after `now` in the given local offset
pub fn next_local_day_window(now: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_today = now.with_timezone(&offset).date_naive();
    let tomorrow = local_today + Duration::days(1);
    let start = local_midnight(tomorrow, offset);
    (start, start + Duration::days(1))
}

/// Next UTC instant at which the local wall clock reads `hour:00`, strictly after `now`
pub fn next_local_hour(now: DateTime<Utc>, offset: FixedOffset, hour: u32) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset);
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = local_now.date_naive().and_time(at);

    let candidate = offset
        .from_local_datetime(&today)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);

    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

fn local_midnight(date: chrono::NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        // A fixed offset always resolves to exactly one instant
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ticket_number_format() {
        let issued_at = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let ticket = generate_ticket_number("EVT", issued_at, 5);
        assert!(ticket.starts_with("EVT-20240309-"));
        assert_eq!(ticket.len(), "EVT-20240309-".len() + 5);
        assert!(is_valid_ticket_number(&ticket));
    }

    #[test]
    fn test_ticket_number_validation() {
        assert!(is_valid_ticket_number("EVT-20240101-AB12C"));
        assert!(!is_valid_ticket_number("EVT-2024011-AB12C"));
        assert!(!is_valid_ticket_number("evt-20240101-ab12c"));
        assert!(!is_valid_ticket_number(""));
    }

    #[test]
    fn test_qr_tokens_are_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_qr_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_next_local_day_window() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        // 22:30 UTC is already 01:30 the next day at UTC+3
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 22, 30, 0).unwrap();
        let (start, end) = next_local_day_window(now, offset);

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 2, 21, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn test_next_local_hour() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(
            next_local_hour(before, offset, 9),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
        );

        let after = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_local_hour(after, offset, 9),
            Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
        );
    }
}
