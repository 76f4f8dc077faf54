//! Event-feed extraction, normalization and map-placement pipeline.
//!
//! The host (a browser extension) hands over a rendered feed document as
//! HTML; the pipeline scans it for listing cards, normalizes each card's
//! noisy text into an [`models::EventRecord`], deduplicates and sorts the
//! set, and fully replaces the persisted array behind the [`store`]
//! boundary. The [`geo`] module places records onto a bounded map rectangle
//! (geocoded when possible, deterministic grid otherwise) and [`assistant`]
//! projects the set into assistant context text.

pub mod assistant;
pub mod config;
pub mod extract;
pub mod geo;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod utils;

pub use config::{ExtractorConfig, GeoBounds, LocaleProfile, MapRect};
pub use extract::{InnerText, LeafWalk, PerElement, TextAcquisition};
pub use geo::{GeocodeError, Geocoder, NominatimGeocoder, Placement};
pub use models::{Coordinate, EventRecord, PlacedEvent};
pub use pipeline::{ExtractError, ExtractSession};
pub use store::{EventStore, MemoryStore, SqliteStore, StoreError, StoreHandle};
