use chrono::{DateTime, Datelike, LocalResult, NaiveDate, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use super::base;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static HAPPENING_NOW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Happening now").expect("happening-now anchor regex"));
static TODAY_AT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Today at\s+(\d{1,2})(?::(\d{2}))?\s*([AP]M)").expect("today-at regex")
});
static WEEKDAY_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun),\s+([A-Za-z]{3,})\s+(\d{1,2})")
        .expect("weekday date regex")
});
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z]{3,})\s+(\d{1,2})\b").expect("month-day regex"));

/// Result of parsing a free-text time fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeLabel {
    pub start: Option<DateTime<Tz>>,
    pub label: String,
}

impl TimeLabel {
    fn none() -> Self {
        Self {
            start: None,
            label: String::new(),
        }
    }
}

/// Parses a time/date fragment into an absolute instant plus a normalized
/// display label. `now` is the injected reference instant; the parser never
/// reads a clock. Patterns are tried in a fixed order because they overlap;
/// a pattern whose date cannot be built (unknown month token, out-of-range
/// day, nonexistent local time) falls through instead of panicking.
pub fn parse(text: &str, now: DateTime<Tz>) -> TimeLabel {
    let t = base::clean_text(text);
    let tz = now.timezone();

    if HAPPENING_NOW_RE.is_match(&t) {
        return TimeLabel {
            start: Some(now),
            label: "Happening now".to_string(),
        };
    }

    if let Some(caps) = TODAY_AT_RE.captures(&t) {
        let (hour, minute) = meridiem(&caps[1], caps.get(2).map(|m| m.as_str()), &caps[3]);
        if let Some(start) = zone_datetime(tz, now.year(), now.month(), now.day(), hour, minute) {
            return TimeLabel {
                start: Some(start),
                label: caps[0].to_string(),
            };
        }
    }

    if let Some(caps) = WEEKDAY_DATE_RE.captures(&t) {
        if let Some(month) = month_number(&caps[1]) {
            let day = caps[2].parse::<u32>().unwrap_or(0);
            // a clock time anywhere in the fragment refines midnight
            let clock = base::CLOCK_RE.captures(&t);
            let (hour, minute) = match &clock {
                Some(time) => meridiem(&time[1], time.get(2).map(|m| m.as_str()), &time[3]),
                None => (0, 0),
            };
            if let Some(start) = zone_datetime(tz, now.year(), month, day, hour, minute) {
                let mut label = caps[0].to_string();
                if let Some(time) = clock {
                    label.push(' ');
                    label.push_str(&time[0]);
                }
                return TimeLabel {
                    start: Some(start),
                    label,
                };
            }
        }
    }

    if let Some(caps) = MONTH_DAY_RE.captures(&t) {
        if let Some(month) = month_number(&caps[1]) {
            let day = caps[2].parse::<u32>().unwrap_or(0);
            if let Some(start) = zone_datetime(tz, now.year(), month, day, 0, 0) {
                return TimeLabel {
                    start: Some(start),
                    label: caps[0].to_string(),
                };
            }
        }
    }

    TimeLabel::none()
}

/// 12-hour to 24-hour conversion: 12 AM is midnight, 12 PM stays noon.
fn meridiem(hour: &str, minute: Option<&str>, ampm: &str) -> (u32, u32) {
    let mut hour = hour.parse::<u32>().unwrap_or(0);
    let minute = minute.and_then(|m| m.parse::<u32>().ok()).unwrap_or(0);
    if ampm.eq_ignore_ascii_case("pm") && hour != 12 {
        hour += 12;
    }
    if ampm.eq_ignore_ascii_case("am") && hour == 12 {
        hour = 0;
    }
    (hour, minute)
}

/// Month token lookup against the fixed 3-letter table; 1-based. Tokens that
/// name no month are a parse failure, not a panic.
fn month_number(token: &str) -> Option<u32> {
    let key = token.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| *month == key)
        .map(|index| index as u32 + 1)
}

fn zone_datetime(tz: Tz, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::Helsinki;

    fn reference() -> DateTime<Tz> {
        Helsinki
            .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
            .single()
            .expect("valid reference instant")
    }

    #[test]
    fn happening_now_uses_reference_instant() {
        let now = reference();
        let parsed = parse("Happening now", now);
        assert_eq!(parsed.start, Some(now));
        assert_eq!(parsed.label, "Happening now");
    }

    #[test]
    fn today_at_builds_on_reference_date() {
        let parsed = parse("Today at 3:30 PM", reference());
        let start = parsed.start.expect("parsed start");
        assert_eq!(start.date_naive(), reference().date_naive());
        assert_eq!((start.hour(), start.minute()), (15, 30));
        assert_eq!(parsed.label, "Today at 3:30 PM");
    }

    #[test]
    fn noon_and_midnight_meridiem() {
        let noon = parse("Today at 12 PM", reference()).start.expect("noon");
        assert_eq!(noon.hour(), 12);
        let midnight = parse("Today at 12 AM", reference()).start.expect("midnight");
        assert_eq!(midnight.hour(), 0);
    }

    #[test]
    fn weekday_month_day_defaults_to_midnight() {
        let parsed = parse("Sat, Jun 15", reference());
        let start = parsed.start.expect("parsed start");
        assert_eq!(start.date_naive().to_string(), "2024-06-15");
        assert_eq!((start.hour(), start.minute()), (0, 0));
        assert_eq!(parsed.label, "Sat, Jun 15");
    }

    #[test]
    fn weekday_fragment_picks_up_trailing_clock_time() {
        let parsed = parse("Fri, Aug 8 Summer Rave 10 PM", reference());
        let start = parsed.start.expect("parsed start");
        assert_eq!(start.date_naive().to_string(), "2024-08-08");
        assert_eq!(start.hour(), 22);
        assert_eq!(parsed.label, "Fri, Aug 8 10 PM");
    }

    #[test]
    fn bare_month_day_parses_at_midnight() {
        let parsed = parse("Jun 15", reference());
        let start = parsed.start.expect("parsed start");
        assert_eq!(start.date_naive().to_string(), "2024-06-15");
        assert_eq!(parsed.label, "Jun 15");
    }

    #[test]
    fn unrecognized_text_is_a_miss() {
        assert_eq!(parse("no date info here", reference()), TimeLabel::none());
    }

    #[test]
    fn unknown_month_token_falls_through_to_miss() {
        // "Room 12" matches the month-day shape but names no month
        assert_eq!(parse("Room 12", reference()), TimeLabel::none());
    }

    #[test]
    fn out_of_range_day_is_a_miss() {
        assert_eq!(parse("Jun 31", reference()), TimeLabel::none());
    }

    #[test]
    fn whitespace_is_collapsed_before_matching() {
        let parsed = parse("  Today   at  9 PM ", reference());
        assert_eq!(parsed.start.expect("start").hour(), 21);
        assert_eq!(parsed.label, "Today at 9 PM");
    }
}
