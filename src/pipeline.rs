use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use anyhow::Context;
use chrono::DateTime;
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{self, CompiledLocale, ConfigError, ExtractorConfig};
use crate::extract::{self, InnerText, TextAcquisition};
use crate::models::EventRecord;
use crate::store::{EventStore, StoreError, StoreHandle};
use crate::utils;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// A pass is already in flight; concurrent passes would race on the
    /// persisted array.
    #[error("an extraction pass is already in progress")]
    Busy,
    /// Persisting failed. The extracted records ride along so the caller can
    /// retry or present them without re-scanning; durability was the only
    /// casualty.
    #[error("failed to persist extracted events: {source}")]
    Persist {
        #[source]
        source: StoreError,
        events: Vec<EventRecord>,
    },
}

/// First-seen-wins dedup by id, then a stable chronological sort. Untimed
/// records keep their relative order at the tail.
pub fn process(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<EventRecord> = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(record.id.clone()) {
            unique.push(record);
        }
    }
    unique.sort_by(compare_start);
    unique
}

fn compare_start(a: &EventRecord, b: &EventRecord) -> Ordering {
    match (a.start_ts, b.start_ts) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => left.cmp(&right),
    }
}

/// One extraction surface: owns the store handle, compiled locale, and the
/// single re-entrancy flag. All shared-state mutation happens on the logical
/// thread between await points, so the flag is the only guard needed.
pub struct ExtractSession<S> {
    store: S,
    config: ExtractorConfig,
    locale: CompiledLocale,
    strategy: Box<dyn TextAcquisition>,
    in_progress: AtomicBool,
}

impl ExtractSession<StoreHandle> {
    /// Default host wiring: config from the data directory (absent file means
    /// defaults), store by capability detection.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let config = config::load_or_default(&utils::config_path())
            .context("loading extractor config")?;
        let store = StoreHandle::detect(&utils::database_path());
        Self::new(store, config).context("compiling locale profile")
    }
}

impl<S: EventStore> ExtractSession<S> {
    pub fn new(store: S, config: ExtractorConfig) -> Result<Self, ConfigError> {
        let locale = config.locale.compile()?;
        Ok(Self {
            store,
            config,
            locale,
            strategy: Box::new(InnerText),
            in_progress: AtomicBool::new(false),
        })
    }

    pub fn with_strategy(mut self, strategy: Box<dyn TextAcquisition>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn locale(&self) -> &CompiledLocale {
        &self.locale
    }

    /// Runs one full pass: scan, dedup/sort, replace the persisted array.
    /// Rejected while another pass is in flight. Zero events is a successful
    /// empty result, distinct from any failure.
    pub async fn extract(
        &self,
        html: &str,
        now: DateTime<Tz>,
    ) -> Result<Vec<EventRecord>, ExtractError> {
        if self.in_progress.swap(true, AtomicOrdering::SeqCst) {
            return Err(ExtractError::Busy);
        }
        let _guard = ClearFlag(&self.in_progress);

        let records = extract::scan_document(
            html,
            self.strategy.as_ref(),
            now,
            &self.locale,
            self.config.description_limit,
        );
        let events = process(records);
        debug!(events = events.len(), "extraction pass complete");

        if let Err(source) = self.store.save(&events).await {
            warn!(error = %source, "persisting extraction pass failed");
            return Err(ExtractError::Persist { source, events });
        }
        Ok(events)
    }

    /// The persisted array, as the map/list/assistant surfaces read it.
    pub async fn stored(&self) -> Result<Vec<EventRecord>, StoreError> {
        self.store.load().await
    }
}

struct ClearFlag<'a>(&'a AtomicBool);

impl Drop for ClearFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, AtomicOrdering::SeqCst);
    }
}
