use crate::config::CompiledLocale;

use super::base;

const BULLET: &str = "·";

#[derive(Debug, Clone, PartialEq)]
pub struct SeparatedFields {
    pub clean_title: String,
    pub location: String,
    pub interested_count: u32,
    pub going_count: u32,
}

/// Separates one listing's fields out of its raw title and card text.
///
/// The source markup carries no semantic tags distinguishing title from venue
/// from counters, so separation works by elimination: strip every other
/// field's text out of the card text and treat the remainder as the location
/// candidate. The elimination order is load-bearing; reordering it changes
/// results on real cards.
pub fn separate(
    raw_title: &str,
    card_text: &str,
    time_text: &str,
    locale: &CompiledLocale,
) -> SeparatedFields {
    let clean_title = scrub_title(raw_title, time_text);

    let interested_count = first_count(&base::INTERESTED_COUNT_RE, card_text);
    let going_count = first_count(&base::GOING_COUNT_RE, card_text);

    let location = extract_location(card_text, time_text, &clean_title, locale);

    SeparatedFields {
        clean_title,
        location,
        interested_count,
        going_count,
    }
}

fn scrub_title(raw_title: &str, time_text: &str) -> String {
    let mut title = base::remove_first(raw_title, time_text);
    title = base::STRIP_INTERESTED_RE.replace_all(&title, "").into_owned();
    title = base::STRIP_GOING_RE.replace_all(&title, "").into_owned();
    title = title.replace(BULLET, "");
    base::clean_text(&title)
}

fn first_count(pattern: &regex::Regex, text: &str) -> u32 {
    pattern
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .unwrap_or(0)
}

fn extract_location(
    card_text: &str,
    time_text: &str,
    clean_title: &str,
    locale: &CompiledLocale,
) -> String {
    let mut candidate = base::remove_first(card_text, time_text);
    candidate = base::remove_first(&candidate, clean_title);
    candidate = base::STRIP_INTERESTED_RE
        .replace_all(&candidate, "")
        .into_owned();
    candidate = base::STRIP_GOING_RE.replace_all(&candidate, "").into_owned();
    candidate = candidate.replace(BULLET, "");
    for phrase in &locale.boilerplate {
        candidate = phrase.replace_all(&candidate, "").into_owned();
    }
    let candidate = base::clean_text(&candidate);

    for pattern in &locale.location_patterns {
        if let Some(hit) = pattern.find(&candidate) {
            let found = hit.as_str().trim();
            if found.chars().count() > 3 {
                return found.to_string();
            }
        }
    }
    String::new()
}
