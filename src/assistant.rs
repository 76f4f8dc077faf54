use chrono::TimeZone;
use chrono_tz::Tz;

use crate::models::EventRecord;

pub const QUICK_PROMPTS: [&str; 7] = [
    "What events are happening today?",
    "Show me all upcoming events",
    "What music events are available?",
    "Find events near me",
    "What's happening this weekend?",
    "Show me free events",
    "What are the most popular events?",
];

const NO_EVENTS: &str = "No events are currently available.";

/// Text projection of the record set handed to the external assistant as
/// context. The transport is the host's concern; only the projection lives
/// here.
pub fn events_context(events: &[EventRecord], tz: Tz) -> String {
    if events.is_empty() {
        return NO_EVENTS.to_string();
    }

    events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let resolved = event
                .start_ts
                .and_then(|millis| tz.timestamp_millis_opt(millis).single())
                .map(|start| start.format("%a, %b %e %Y %H:%M").to_string())
                .unwrap_or_else(|| "Date not specified".to_string());
            format!(
                "Event {n}:\n- Name: {title}\n- Time: {time} ({resolved})\n- Location: {location}\n- Description: {description}\n- URL: {url}\n- ID: {id}",
                n = index + 1,
                title = event.title,
                time = or_placeholder(&event.time_text, "Time not specified"),
                location = or_placeholder(&event.location, "Location not specified"),
                description = or_placeholder(&event.description, "No description available"),
                url = event.url,
                id = event.id,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an AI assistant helping users find and understand events \
         extracted from a social feed.\n\n\
         AVAILABLE EVENTS:\n{context}\n\n\
         USER QUESTION: {question}\n\n\
         INSTRUCTIONS:\n\
         - Respond in a helpful, conversational tone\n\
         - When listing events, always sort them chronologically (earliest first)\n\
         - Include the event name, time, location, and URL\n\
         - If nothing matches the question, explain what is available instead\n"
    )
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() {
        placeholder
    } else {
        value
    }
}
