use std::{fs, path::Path, str::FromStr};

use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid location pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("unknown timezone: {0}")]
    Timezone(String),
}

/// Locale-specific extraction knobs. The defaults reproduce the
/// Finnish/Helsinki profile the heuristics were tuned against; other locales
/// swap in their own suffix names and pattern set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleProfile {
    pub country_code: String,
    pub city: String,
    pub country: String,
    pub timezone: String,
    /// Street address with a postal code, e.g. "Mannerheimintie 3, 00100 Helsinki".
    pub address_pattern: String,
    /// Street-suffix word followed by a house number.
    pub street_pattern: String,
    /// Venue-name fallback: a substantial run of word-like characters.
    pub venue_pattern: String,
    /// UI chrome phrases stripped before location matching.
    pub boilerplate: Vec<String>,
}

impl Default for LocaleProfile {
    fn default() -> Self {
        Self {
            country_code: "fi".to_string(),
            city: "Helsinki".to_string(),
            country: "Finland".to_string(),
            timezone: "Europe/Helsinki".to_string(),
            address_pattern: r"[A-Za-zäöåÄÖÅ\s]+\d+[a-zA-Z]?,?\s*\d{5}\s+[A-Za-zäöåÄÖÅ]+"
                .to_string(),
            street_pattern: r"(?i)[A-Za-zäöåÄÖÅ]+(?:katu|tie|väylä|polku|puistikko)\s+\d+[a-zA-Z]?"
                .to_string(),
            venue_pattern: r"[A-Za-zäöåÄÖÅ\s&-]{8,50}".to_string(),
            boilerplate: vec![
                "View on Facebook".to_string(),
                "Show on Map".to_string(),
                "Interested".to_string(),
                "Share".to_string(),
            ],
        }
    }
}

impl LocaleProfile {
    pub fn compile(&self) -> Result<CompiledLocale, ConfigError> {
        let location_patterns = [
            &self.address_pattern,
            &self.street_pattern,
            &self.venue_pattern,
        ]
        .into_iter()
        .map(|pattern| compile_pattern(pattern))
        .collect::<Result<Vec<_>, _>>()?;

        let boilerplate = self
            .boilerplate
            .iter()
            .map(|phrase| compile_pattern(&format!("(?i){}", regex::escape(phrase))))
            .collect::<Result<Vec<_>, _>>()?;

        let tz =
            Tz::from_str(&self.timezone).map_err(|_| ConfigError::Timezone(self.timezone.clone()))?;

        Ok(CompiledLocale {
            country_code: self.country_code.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            tz,
            location_patterns,
            boilerplate,
            trailing_city: compile_pattern(&trailing_suffix(&self.city))?,
            trailing_country: compile_pattern(&trailing_suffix(&self.country))?,
        })
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn trailing_suffix(name: &str) -> String {
    format!(r"(?i)\s*,\s*{}\s*$", regex::escape(name))
}

/// [`LocaleProfile`] with its patterns compiled once, built at session start.
#[derive(Debug, Clone)]
pub struct CompiledLocale {
    pub country_code: String,
    pub city: String,
    pub country: String,
    pub tz: Tz,
    pub location_patterns: Vec<Regex>,
    pub boilerplate: Vec<Regex>,
    pub trailing_city: Regex,
    pub trailing_country: Regex,
}

/// Target pixel rectangle for marker placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapRect {
    pub width: f64,
    pub height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub min_x: f64,
    pub min_y: f64,
}

impl Default for MapRect {
    fn default() -> Self {
        Self {
            width: 350.0,
            height: 220.0,
            offset_x: 20.0,
            offset_y: 30.0,
            min_x: 10.0,
            min_y: 20.0,
        }
    }
}

impl MapRect {
    pub fn clamp_x(&self, x: f64) -> f64 {
        x.max(self.min_x).min(self.width + self.min_x)
    }

    pub fn clamp_y(&self, y: f64) -> f64 {
        y.max(self.min_y).min(self.height + self.min_y)
    }
}

/// Geographic bounding box projected onto the map rectangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Default for GeoBounds {
    fn default() -> Self {
        // Helsinki metropolitan area
        Self {
            north: 60.25,
            south: 60.10,
            east: 25.15,
            west: 24.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub locale: LocaleProfile,
    pub map_rect: MapRect,
    pub bounds: GeoBounds,
    /// Character limit for the description snippet.
    pub description_limit: usize,
    /// Lookups issued concurrently per geocoding batch.
    pub geocode_batch: usize,
    /// Individual lookup timeout, seconds.
    pub geocode_timeout_secs: u64,
    /// Consecutive transport failures before remaining lookups are skipped.
    pub failure_threshold: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            locale: LocaleProfile::default(),
            map_rect: MapRect::default(),
            bounds: GeoBounds::default(),
            description_limit: 150,
            geocode_batch: 4,
            geocode_timeout_secs: 8,
            failure_threshold: 3,
        }
    }
}

/// Missing file yields defaults; an unreadable or malformed file is an error.
pub fn load_or_default(path: &Path) -> Result<ExtractorConfig, ConfigError> {
    if !path.exists() {
        return Ok(ExtractorConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_compiles() {
        let locale = LocaleProfile::default().compile().expect("compile default");
        assert_eq!(locale.country_code, "fi");
        assert_eq!(locale.tz, chrono_tz::Europe::Helsinki);
        assert_eq!(locale.location_patterns.len(), 3);
        assert!(locale
            .location_patterns[1]
            .is_match("Mannerheimintie 3"));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let profile = LocaleProfile {
            timezone: "Mars/Olympus".to_string(),
            ..LocaleProfile::default()
        };
        assert!(matches!(profile.compile(), Err(ConfigError::Timezone(_))));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_or_default(Path::new("/nonexistent/event-map/config.json"))
            .expect("defaults for missing file");
        assert_eq!(config.description_limit, 150);
        assert_eq!(config.locale.city, "Helsinki");
    }
}
