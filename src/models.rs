use serde::{Deserialize, Serialize};

/// One scraped listing. A fresh set is produced on every extraction pass and
/// fully replaces the persisted array; records are read-only after creation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub id: String, // numeric string from the listing's canonical URL
    pub title: String,
    pub url: String,
    pub date: String,
    pub time: String,
    pub time_text: String,
    pub start_ts: Option<i64>, // epoch milliseconds; None when no time resolved
    pub location: String,
    pub interested_count: u32,
    pub going_count: u32,
    pub description: String,
}

impl EventRecord {
    /// Records without a location are skipped by geocoded placement but may
    /// still appear in the all-events grid view.
    pub fn has_location(&self) -> bool {
        !self.location.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// An [`EventRecord`] augmented with render-time map coordinates. Ephemeral,
/// recomputed per render; never persisted.
#[derive(Serialize, Clone, Debug)]
pub struct PlacedEvent {
    #[serde(flatten)]
    pub record: EventRecord,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub map_x: f64,
    pub map_y: f64,
    pub geocoded: bool,
}
