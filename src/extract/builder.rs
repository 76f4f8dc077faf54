use chrono::DateTime;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::CompiledLocale;
use crate::models::EventRecord;

use super::{base, fields, timetext};

static DATE_PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Mon|Tue|Wed|Thu|Fri|Sat|Sun),?\s+[A-Za-z]{3,}\s+\d{1,2}")
        .expect("date part regex")
});
static TIME_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d{1,2}(?::\d{2})?\s*[AP]M").expect("time part regex"));

/// Assembles the canonical record for one card. No field is ever left
/// undefined: absent values are empty string / 0 / None.
pub fn build(
    card_text: &str,
    raw_title: &str,
    id: &str,
    url: &str,
    now: DateTime<Tz>,
    locale: &CompiledLocale,
    description_limit: usize,
) -> EventRecord {
    let text = base::clean_text(card_text);
    let raw_title = base::clean_text(raw_title);

    let time_fragment = base::find_time_fragment(&text).unwrap_or("").to_string();
    let parsed = timetext::parse(&time_fragment, now);

    let date = DATE_PART_RE
        .find(&time_fragment)
        .map(|hit| hit.as_str().to_string())
        .unwrap_or_default();
    let time = TIME_PART_RE
        .find(&time_fragment)
        .map(|hit| hit.as_str().to_string())
        .unwrap_or_default();

    let separated = fields::separate(&raw_title, &text, &time_fragment, locale);

    // best display label: parsed label, else the raw located fragment
    let time_text = if !parsed.label.is_empty() {
        parsed.label.clone()
    } else {
        time_fragment.clone()
    };

    EventRecord {
        id: id.to_string(),
        title: separated.clean_title,
        url: url.to_string(),
        date,
        time,
        time_text,
        start_ts: parsed.start.map(|start| start.timestamp_millis()),
        location: separated.location,
        interested_count: separated.interested_count,
        going_count: separated.going_count,
        description: truncate(&text, description_limit),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut snippet: String = text.chars().take(limit).collect();
    snippet.push_str("...");
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Helsinki;

    fn reference() -> DateTime<Tz> {
        Helsinki
            .with_ymd_and_hms(2024, 6, 1, 10, 0, 0)
            .single()
            .expect("valid reference instant")
    }

    fn locale() -> CompiledLocale {
        crate::config::LocaleProfile::default()
            .compile()
            .expect("default locale")
    }

    #[test]
    fn builds_complete_record_from_card() {
        let card = "Midsummer Rave · Sat, Jun 15 · 10 PM · Kaasutehtaankatu 1, 00540 Helsinki \
                    · 5 interested · 2 going · View on Facebook";
        let record = build(
            card,
            "Midsummer Rave",
            "123456789",
            "https://www.facebook.com/events/123456789",
            reference(),
            &locale(),
            150,
        );

        assert_eq!(record.id, "123456789");
        assert_eq!(record.title, "Midsummer Rave");
        assert_eq!(record.date, "Sat, Jun 15");
        assert_eq!(record.time, "10 PM");
        assert_eq!(record.time_text, "Sat, Jun 15 10 PM");
        assert_eq!(record.interested_count, 5);
        assert_eq!(record.going_count, 2);
        assert_eq!(record.location, "Kaasutehtaankatu 1, 00540 Helsinki");

        let start = Helsinki
            .with_ymd_and_hms(2024, 6, 15, 22, 0, 0)
            .single()
            .expect("expected start");
        assert_eq!(record.start_ts, Some(start.timestamp_millis()));
    }

    #[test]
    fn cardless_fragment_still_yields_a_record() {
        let record = build(
            "Mystery gathering somewhere",
            "Mystery gathering",
            "55555",
            "https://www.facebook.com/events/55555",
            reference(),
            &locale(),
            150,
        );
        assert_eq!(record.start_ts, None);
        assert_eq!(record.date, "");
        assert_eq!(record.time, "");
        assert_eq!(record.interested_count, 0);
        assert_eq!(record.going_count, 0);
    }

    #[test]
    fn unparseable_fragment_keeps_raw_time_text() {
        // "Room 12" looks like a month-day pair but names no month
        let record = build(
            "Poker night Room 12 tonight",
            "Poker night",
            "67890",
            "https://www.facebook.com/events/67890",
            reference(),
            &locale(),
            150,
        );
        assert_eq!(record.start_ts, None);
        assert_eq!(record.time_text, "Room 12");
    }

    #[test]
    fn description_is_truncated_with_ellipsis() {
        let long = "x".repeat(300);
        let record = build(
            &long,
            "t",
            "11111",
            "https://www.facebook.com/events/11111",
            reference(),
            &locale(),
            150,
        );
        assert_eq!(record.description.chars().count(), 153);
        assert!(record.description.ends_with("..."));
    }

    #[test]
    fn short_description_is_untouched() {
        let record = build(
            "short card",
            "short",
            "22222",
            "https://www.facebook.com/events/22222",
            reference(),
            &locale(),
            150,
        );
        assert_eq!(record.description, "short card");
    }
}
