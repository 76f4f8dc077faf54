use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{CompiledLocale, ExtractorConfig, GeoBounds, MapRect};
use crate::models::{Coordinate, EventRecord, PlacedEvent};

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Transport(String),
    #[error("geocoding response invalid: {0}")]
    Payload(String),
    #[error("geocoding lookup timed out")]
    Timeout,
}

impl GeocodeError {
    /// Transport-shaped failures feed the circuit breaker; payload problems
    /// prove the service is reachable and reset it.
    fn is_transport(&self) -> bool {
        matches!(self, GeocodeError::Transport(_) | GeocodeError::Timeout)
    }
}

/// Free-text place description to coordinates. Network errors are results,
/// never panics; a miss is `Ok(None)`.
pub trait Geocoder: Send + Sync {
    fn lookup(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<Coordinate>, GeocodeError>> + Send;
}

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent("event-map/0.1")
        .build()
        .expect("http client")
});

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Nominatim-style lookup, restricted to the profile's country code. The
/// endpoint is injectable so a CORS proxy or a test server can stand in.
pub struct NominatimGeocoder {
    endpoint: String,
    country_codes: String,
}

impl NominatimGeocoder {
    pub fn new(locale: &CompiledLocale) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            country_codes: locale.country_code.clone(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl Geocoder for NominatimGeocoder {
    async fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let url = reqwest::Url::parse_with_params(
            &self.endpoint,
            [
                ("format", "json"),
                ("q", query),
                ("limit", "1"),
                ("countrycodes", &self.country_codes),
            ],
        )
        .map_err(|err| GeocodeError::Transport(err.to_string()))?;

        let response = CLIENT
            .get(url)
            .send()
            .await
            .map_err(|err| GeocodeError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Transport(format!("status {status}")));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|err| GeocodeError::Payload(err.to_string()))?;

        match places.first() {
            Some(place) => {
                let lat = place.lat.parse::<f64>();
                let lng = place.lon.parse::<f64>();
                match (lat, lng) {
                    (Ok(lat), Ok(lng)) => Ok(Some(Coordinate { lat, lng })),
                    _ => Err(GeocodeError::Payload(format!(
                        "non-numeric coordinates for {query:?}"
                    ))),
                }
            }
            None => Ok(None),
        }
    }
}

static TRAILING_INTERESTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s+interested.*$").expect("trailing interested regex"));
static TRAILING_GOING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s+going.*$").expect("trailing going regex"));

/// Query variants tried in order of decreasing specificity; the first hit
/// wins.
fn query_variants(location: &str, locale: &CompiledLocale) -> Vec<String> {
    let mut clean = TRAILING_INTERESTED_RE.replace(location, "").into_owned();
    clean = TRAILING_GOING_RE.replace(&clean, "").into_owned();
    clean = locale.trailing_country.replace(&clean, "").into_owned();
    clean = locale.trailing_city.replace(&clean, "").into_owned();
    let clean = clean.trim().to_string();
    let main = clean
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    vec![
        format!("{clean}, {}, {}", locale.city, locale.country),
        format!("{main}, {}, {}", locale.city, locale.country),
        format!("{clean}, {}", locale.country),
        clean,
        main,
    ]
}

/// Runs the variant ladder with an individual timeout per lookup. Errors
/// bubble only when every variant failed on transport; any reachable variant
/// downgrades the outcome to a plain miss.
async fn resolve<G: Geocoder>(
    geocoder: &G,
    locale: &CompiledLocale,
    location: &str,
    per_lookup: Duration,
) -> Result<Option<Coordinate>, GeocodeError> {
    let mut last_error: Option<GeocodeError> = None;
    let mut reachable = false;

    for query in query_variants(location, locale) {
        if query.trim().is_empty() || query.trim().starts_with(',') {
            continue;
        }
        match timeout(per_lookup, geocoder.lookup(&query)).await {
            Ok(Ok(Some(coordinate))) => {
                debug!(%query, "geocoded");
                return Ok(Some(coordinate));
            }
            Ok(Ok(None)) => reachable = true,
            Ok(Err(err)) => {
                if !err.is_transport() {
                    reachable = true;
                }
                last_error = Some(err);
            }
            Err(_) => last_error = Some(GeocodeError::Timeout),
        }
    }

    if reachable {
        return Ok(None);
    }
    match last_error {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

/// Outcome of placing one batch of events.
#[derive(Debug)]
pub struct Placement {
    /// One entry per input event, input order preserved.
    pub events: Vec<PlacedEvent>,
    pub geocoded: usize,
    /// True when the circuit breaker tripped and remaining lookups were
    /// skipped; informational only, never an error.
    pub lookups_suspended: bool,
}

/// Places every event onto the map rectangle: geocoded projection when the
/// lookup succeeds, deterministic grid cell otherwise. Lookups run in
/// bounded-concurrency batches; a timeout equals a failed lookup and never
/// aborts the batch. After `failure_threshold` consecutive transport
/// failures the remaining lookups are skipped — a blocked service would
/// otherwise cost one timeout per event.
pub async fn place<G>(
    events: &[EventRecord],
    geocoder: Arc<G>,
    locale: &CompiledLocale,
    config: &ExtractorConfig,
) -> Placement
where
    G: Geocoder + Send + Sync + 'static,
{
    let total = events.len();
    let rect = &config.map_rect;
    let bounds = &config.bounds;
    let batch_size = config.geocode_batch.max(1);
    let per_lookup = Duration::from_secs(config.geocode_timeout_secs);

    let mut placed: Vec<Option<PlacedEvent>> = (0..total).map(|_| None).collect();
    let mut geocoded = 0usize;
    let mut suspended = false;
    let mut consecutive_failures = 0u32;

    let mut index = 0;
    while index < total {
        let end = (index + batch_size).min(total);

        if suspended {
            for i in index..end {
                placed[i] = Some(grid_placed(&events[i], i, total, rect));
            }
            index = end;
            continue;
        }

        let mut lookups: JoinSet<(usize, Result<Option<Coordinate>, GeocodeError>)> =
            JoinSet::new();
        for i in index..end {
            let geocoder = Arc::clone(&geocoder);
            let locale = locale.clone();
            let location = events[i].location.clone();
            lookups.spawn(async move {
                let outcome = resolve(geocoder.as_ref(), &locale, &location, per_lookup).await;
                (i, outcome)
            });
        }

        let mut outcomes: HashMap<usize, Result<Option<Coordinate>, GeocodeError>> =
            HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((i, outcome)) => {
                    outcomes.insert(i, outcome);
                }
                Err(err) => warn!(error = %err, "geocoding task failed to join"),
            }
        }

        // Breaker accounting walks the batch in input order so the streak is
        // index-stable regardless of completion order.
        for i in index..end {
            match outcomes.remove(&i) {
                Some(Ok(Some(coordinate))) => {
                    consecutive_failures = 0;
                    geocoded += 1;
                    placed[i] = Some(coordinate_placed(&events[i], coordinate, bounds, rect));
                }
                Some(Ok(None)) => {
                    consecutive_failures = 0;
                    placed[i] = Some(grid_placed(&events[i], i, total, rect));
                }
                Some(Err(err)) => {
                    if err.is_transport() {
                        consecutive_failures += 1;
                    } else {
                        consecutive_failures = 0;
                    }
                    debug!(index = i, error = %err, "lookup failed, grid fallback");
                    placed[i] = Some(grid_placed(&events[i], i, total, rect));
                    if !suspended && consecutive_failures >= config.failure_threshold {
                        warn!(
                            failures = consecutive_failures,
                            "geocoding looks blocked, switching remaining events to grid layout"
                        );
                        suspended = true;
                    }
                }
                None => {
                    placed[i] = Some(grid_placed(&events[i], i, total, rect));
                }
            }
        }
        index = end;
    }

    let events: Vec<PlacedEvent> = placed.into_iter().flatten().collect();
    debug!(
        total,
        geocoded,
        suspended,
        "placement complete"
    );
    Placement {
        events,
        geocoded,
        lookups_suspended: suspended,
    }
}

/// Grid tiling for the all-events view, where records with no usable
/// location still get a cell.
pub fn grid_layout(events: &[EventRecord], rect: &MapRect) -> Vec<PlacedEvent> {
    let total = events.len();
    events
        .iter()
        .enumerate()
        .map(|(index, event)| grid_placed(event, index, total, rect))
        .collect()
}

pub fn grid_columns(total: usize) -> usize {
    ((total as f64).sqrt().ceil() as usize).max(1)
}

pub fn grid_cell(index: usize, total: usize) -> (usize, usize) {
    let cols = grid_columns(total);
    (index % cols, index / cols)
}

fn grid_position(id: &str, index: usize, total: usize, rect: &MapRect) -> (f64, f64) {
    let cols = grid_columns(total);
    let rows = ((total as f64) / (cols as f64)).ceil().max(1.0);
    let cell_width = rect.width / cols as f64;
    let cell_height = rect.height / rows;

    let (col, row) = grid_cell(index, total);
    let (fx, fy) = jitter_fraction(id);
    // markers land in the inner 60% of the cell so neighbours never touch
    let x = col as f64 * cell_width + cell_width * 0.2 + fx * cell_width * 0.6;
    let y = row as f64 * cell_height + cell_height * 0.2 + fy * cell_height * 0.6;

    (
        rect.clamp_x(x + rect.offset_x),
        rect.clamp_y(y + rect.offset_y),
    )
}

/// Reproducible stand-in for cosmetic jitter: two fractions in [0, 1) from a
/// digest of the event id.
fn jitter_fraction(id: &str) -> (f64, f64) {
    let digest = Sha256::digest(id.as_bytes());
    let fx = u16::from_be_bytes([digest[0], digest[1]]) as f64 / (u16::MAX as f64 + 1.0);
    let fy = u16::from_be_bytes([digest[2], digest[3]]) as f64 / (u16::MAX as f64 + 1.0);
    (fx, fy)
}

fn project(coordinate: Coordinate, bounds: &GeoBounds, rect: &MapRect) -> (f64, f64) {
    let x = (coordinate.lng - bounds.west) / (bounds.east - bounds.west) * rect.width
        + rect.offset_x;
    let y = (bounds.north - coordinate.lat) / (bounds.north - bounds.south) * rect.height
        + rect.offset_y;
    (rect.clamp_x(x), rect.clamp_y(y))
}

fn coordinate_placed(
    event: &EventRecord,
    coordinate: Coordinate,
    bounds: &GeoBounds,
    rect: &MapRect,
) -> PlacedEvent {
    let (map_x, map_y) = project(coordinate, bounds, rect);
    PlacedEvent {
        record: event.clone(),
        lat: Some(coordinate.lat),
        lng: Some(coordinate.lng),
        map_x,
        map_y,
        geocoded: true,
    }
}

fn grid_placed(event: &EventRecord, index: usize, total: usize, rect: &MapRect) -> PlacedEvent {
    let (map_x, map_y) = grid_position(&event.id, index, total, rect);
    PlacedEvent {
        record: event.clone(),
        lat: None,
        lng: None,
        map_x,
        map_y,
        geocoded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocaleProfile;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn locale() -> CompiledLocale {
        LocaleProfile::default().compile().expect("default locale")
    }

    fn sample(id: &str, location: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            title: format!("event {id}"),
            url: format!("https://www.facebook.com/events/{id}"),
            date: String::new(),
            time: String::new(),
            time_text: String::new(),
            start_ts: None,
            location: location.to_string(),
            interested_count: 0,
            going_count: 0,
            description: String::new(),
        }
    }

    fn in_rect(rect: &MapRect, placed: &PlacedEvent) -> bool {
        placed.map_x >= rect.min_x
            && placed.map_x <= rect.width + rect.min_x
            && placed.map_y >= rect.min_y
            && placed.map_y <= rect.height + rect.min_y
    }

    struct FixedGeocoder(Coordinate);

    impl Geocoder for FixedGeocoder {
        async fn lookup(&self, _query: &str) -> Result<Option<Coordinate>, GeocodeError> {
            Ok(Some(self.0))
        }
    }

    struct MissGeocoder;

    impl Geocoder for MissGeocoder {
        async fn lookup(&self, _query: &str) -> Result<Option<Coordinate>, GeocodeError> {
            Ok(None)
        }
    }

    struct BrokenGeocoder {
        calls: AtomicUsize,
    }

    impl Geocoder for BrokenGeocoder {
        async fn lookup(&self, _query: &str) -> Result<Option<Coordinate>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GeocodeError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn query_variants_follow_the_specificity_ladder() {
        let variants = query_variants("Kaiku, Helsinki", &locale());
        assert_eq!(
            variants,
            vec![
                "Kaiku, Helsinki, Finland".to_string(),
                "Kaiku, Helsinki, Finland".to_string(),
                "Kaiku, Finland".to_string(),
                "Kaiku".to_string(),
                "Kaiku".to_string(),
            ]
        );
    }

    #[test]
    fn query_cleaning_strips_count_noise_and_suffixes() {
        let variants = query_variants("Tavastia 5 interested 2 going, Finland", &locale());
        assert!(variants.iter().all(|v| !v.contains("interested")));
        assert_eq!(variants[3], "Tavastia");
    }

    #[test]
    fn grid_cells_follow_the_ceil_sqrt_layout() {
        // ten events: cols = ceil(sqrt(10)) = 4
        assert_eq!(grid_columns(10), 4);
        assert_eq!(grid_cell(0, 10), (0, 0));
        assert_eq!(grid_cell(3, 10), (3, 0));
        assert_eq!(grid_cell(4, 10), (0, 1));
        assert_eq!(grid_cell(9, 10), (1, 2));
    }

    #[test]
    fn grid_layout_is_deterministic_and_bounded() {
        let rect = MapRect::default();
        let events: Vec<EventRecord> = (0..17)
            .map(|i| sample(&format!("{}", 100000 + i), ""))
            .collect();
        let first = grid_layout(&events, &rect);
        let second = grid_layout(&events, &rect);
        assert_eq!(first.len(), events.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!((a.map_x, a.map_y), (b.map_x, b.map_y));
            assert!(in_rect(&rect, a));
            assert!(!a.geocoded);
        }
    }

    #[tokio::test]
    async fn placement_preserves_count_and_order() {
        let events = vec![
            sample("111111", "Kaasutehtaankatu 1"),
            sample("222222", "Tavastia"),
            sample("333333", "Kaiku"),
        ];
        let placement = place(
            &events,
            Arc::new(FixedGeocoder(Coordinate {
                lat: 60.17,
                lng: 24.94,
            })),
            &locale(),
            &ExtractorConfig::default(),
        )
        .await;

        assert_eq!(placement.events.len(), events.len());
        assert_eq!(placement.geocoded, 3);
        assert!(!placement.lookups_suspended);
        for (placed, event) in placement.events.iter().zip(&events) {
            assert_eq!(placed.record.id, event.id, "index-stable output order");
            assert!(placed.geocoded);
        }
    }

    #[tokio::test]
    async fn geocoded_markers_project_into_the_rectangle() {
        let config = ExtractorConfig::default();
        let events = vec![sample("111111", "Somewhere")];
        // far outside the bounding box: must clamp, not escape
        let placement = place(
            &events,
            Arc::new(FixedGeocoder(Coordinate {
                lat: 10.0,
                lng: 100.0,
            })),
            &locale(),
            &config,
        )
        .await;
        assert!(in_rect(&config.map_rect, &placement.events[0]));
    }

    #[tokio::test]
    async fn misses_fall_back_to_grid_cells() {
        let config = ExtractorConfig::default();
        let events = vec![sample("111111", "Nowhere"), sample("222222", "Elsewhere")];
        let placement = place(&events, Arc::new(MissGeocoder), &locale(), &config).await;

        assert_eq!(placement.events.len(), 2);
        assert_eq!(placement.geocoded, 0);
        assert!(!placement.lookups_suspended, "misses are not failures");
        for placed in &placement.events {
            assert!(!placed.geocoded);
            assert!(in_rect(&config.map_rect, placed));
        }
    }

    #[tokio::test]
    async fn breaker_suspends_lookups_after_consecutive_transport_failures() {
        let mut config = ExtractorConfig::default();
        config.geocode_batch = 1;
        config.failure_threshold = 3;

        let geocoder = Arc::new(BrokenGeocoder {
            calls: AtomicUsize::new(0),
        });
        let events: Vec<EventRecord> = (0..10)
            .map(|i| sample(&format!("{}", 500000 + i), "Kaiku"))
            .collect();

        let placement = place(&events, Arc::clone(&geocoder), &locale(), &config).await;

        assert!(placement.lookups_suspended);
        assert_eq!(placement.events.len(), 10, "every event is still placed");
        assert!(placement.events.iter().all(|p| !p.geocoded));
        // three events attempted (5 variant queries each), the rest skipped
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 15);
    }
}
