use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric listing id: a minimum-5-digit run after the events path segment.
static EVENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/events/(\d{5,})").expect("event id regex"));

// Time-fragment alternation, tried in order; the first hit wins. The order
// matters because the patterns overlap (a weekday line also contains a bare
// month-day pair).
static HAPPENING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Happening now.*").expect("happening-now regex"));
static TODAY_AT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Today at\s+\d{1,2}(?::\d{2})?\s*[AP]M").expect("today-at regex")
});
static WEEKDAY_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun),\s+[A-Za-z]{3,}\s+\d{1,2}(?:.*?[AP]M)?")
        .expect("weekday date regex")
});
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z]{3,}\s+\d{1,2}\b").expect("month-day regex"));

pub static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?\s*([AP]M)").expect("clock regex"));

pub static INTERESTED_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+interested").expect("interested count regex"));
pub static GOING_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+(?:going|went)").expect("going count regex"));

// Non-capturing variants used for subtractive cleaning.
pub static STRIP_INTERESTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s+interested").expect("strip interested regex"));
pub static STRIP_GOING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s+(?:going|went)").expect("strip going regex"));

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn event_id_from_href(href: &str) -> Option<&str> {
    EVENT_ID_RE
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Locates the time fragment in collapsed card text. Same precedence as the
/// label parser, applied here to find the substring to hand over.
pub fn find_time_fragment(text: &str) -> Option<&str> {
    for pattern in [&HAPPENING_RE, &TODAY_AT_RE, &WEEKDAY_DATE_RE, &MONTH_DAY_RE] {
        if let Some(hit) = pattern.find(text) {
            return Some(hit.as_str());
        }
    }
    None
}

/// Removes the first occurrence of `needle` from `haystack`.
pub fn remove_first(haystack: &str, needle: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    haystack.replacen(needle, "", 1)
}
