// Screen configuration, loaded from CLI flags with environment-variable
// fallbacks (a .env file is loaded by main before parsing).

use clap::{Parser, ValueEnum};
use log::warn;

use crate::ttv_client::validate_coords;
use crate::ttv_filters::DEFAULT_DEPARTURE_WINDOW_MINUTES;
use crate::ttv_models::{Result, TtvError};
use crate::ttv_pipeline::DisplayOptions;

/// Itinerary grouping strategy. Merge and split address different upstream
/// defects and are never composed; exactly one (or neither) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupingStrategy {
    /// Combine itineraries sharing a direction and headsign onto one card.
    Merge,
    /// Split over-merged itineraries into one card per physical branch.
    Split,
    /// Leave itineraries exactly as the upstream reports them.
    None,
}

const ALLOWED_MAX_DISTANCES: [u32; 6] = [250, 500, 750, 1000, 1250, 1500];
const DEFAULT_MAX_DISTANCE: u32 = 500;

#[derive(Debug, Clone, Parser)]
#[command(name = "TTV", about = "Transit departures screen for a fixed location")]
pub struct ScreenConfig {
    /// Latitude of the screen location
    #[arg(long, env = "TTV_LAT", allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude of the screen location
    #[arg(long, env = "TTV_LON", allow_negative_numbers = true)]
    pub lon: f64,

    /// Search radius in meters (250, 500, 750, 1000, 1250 or 1500)
    #[arg(long, env = "TTV_MAX_DISTANCE", default_value_t = DEFAULT_MAX_DISTANCE)]
    pub max_distance: u32,

    /// How far ahead (minutes) a departure may be and still be displayed
    #[arg(long, env = "TTV_DEPARTURE_WINDOW_MINUTES", default_value_t = DEFAULT_DEPARTURE_WINDOW_MINUTES)]
    pub departure_window_minutes: i64,

    /// Itinerary grouping strategy
    #[arg(long, env = "TTV_GROUPING", value_enum, default_value_t = GroupingStrategy::Merge)]
    pub grouping: GroupingStrategy,

    /// Hide itineraries whose headsign names the stop the screen is at
    #[arg(long, env = "TTV_FILTER_TERMINUS", default_value_t = false)]
    pub filter_redundant_terminus: bool,

    /// Cache TTL for payloads carrying real-time predictions
    #[arg(long, env = "TTV_REALTIME_CACHE_TTL_MS", default_value_t = 5_000)]
    pub realtime_ttl_ms: u64,

    /// Cache TTL for static schedule payloads
    #[arg(long, env = "TTV_STATIC_CACHE_TTL_MS", default_value_t = 120_000)]
    pub schedule_ttl_ms: u64,

    /// Bound on cached responses before insertion-order eviction kicks in
    #[arg(long, env = "TTV_MAX_CACHE_ENTRIES", default_value_t = 100)]
    pub max_cache_entries: usize,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "TTV_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Seconds between screen refreshes
    #[arg(long, env = "TTV_REFRESH_SECONDS", default_value_t = 30)]
    pub refresh_seconds: u64,

    /// Upstream API key
    #[arg(long, env = "TRANSIT_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Upstream API base URL
    #[arg(long, env = "TTV_BASE_URL", default_value = "https://external.transitapp.com/v3")]
    pub base_url: String,
}

impl ScreenConfig {
    /// Hard-validate what must be right before any network call; warn and
    /// fall back for soft settings.
    pub fn validate(&self) -> Result<()> {
        validate_coords(self.lat, self.lon)?;

        if self.departure_window_minutes <= 0 {
            return Err(TtvError::Validation(format!(
                "departure window must be positive, got {}",
                self.departure_window_minutes
            )));
        }
        if self.api_key.is_empty() {
            warn!("no API key configured, upstream requests will fail with authentication errors");
        }
        if !(1_000..=60_000).contains(&self.request_timeout_ms) {
            warn!(
                "request timeout {}ms outside the expected 1000-60000ms range",
                self.request_timeout_ms
            );
        }
        Ok(())
    }

    /// The search radius, snapped to the allowed steps. Out-of-range values
    /// warn and fall back to the default rather than failing.
    pub fn effective_max_distance(&self) -> u32 {
        if ALLOWED_MAX_DISTANCES.contains(&self.max_distance) {
            self.max_distance
        } else {
            warn!(
                "max distance {} not one of {:?}, using {}",
                self.max_distance, ALLOWED_MAX_DISTANCES, DEFAULT_MAX_DISTANCE
            );
            DEFAULT_MAX_DISTANCE
        }
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            grouping: self.grouping,
            filter_redundant_terminus: self.filter_redundant_terminus,
            departure_window_minutes: self.departure_window_minutes,
            origin: (self.lat, self.lon),
            max_distance_meters: f64::from(self.effective_max_distance()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScreenConfig {
        ScreenConfig::parse_from(["TTV", "--lat", "45.5017", "--lon", "-73.5673"])
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = config();
        assert_eq!(config.max_distance, 500);
        assert_eq!(config.departure_window_minutes, 130);
        assert_eq!(config.grouping, GroupingStrategy::Merge);
        assert!(!config.filter_redundant_terminus);
        assert_eq!(config.realtime_ttl_ms, 5_000);
        assert_eq!(config.schedule_ttl_ms, 120_000);
        assert_eq!(config.max_cache_entries, 100);
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.refresh_seconds, 30);
    }

    #[test]
    fn validation_rejects_bad_coordinates() {
        let mut config = config();
        config.lat = 120.0;
        assert!(matches!(config.validate(), Err(TtvError::Validation(_))));
    }

    #[test]
    fn validation_rejects_nonpositive_window() {
        let mut config = config();
        config.departure_window_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_distance_falls_back_to_default() {
        let mut config = config();
        config.max_distance = 333;
        assert_eq!(config.effective_max_distance(), 500);
        config.max_distance = 1500;
        assert_eq!(config.effective_max_distance(), 1500);
    }

    #[test]
    fn grouping_parses_from_flag() {
        let config =
            ScreenConfig::parse_from(["TTV", "--lat", "0", "--lon", "0", "--grouping", "split"]);
        assert_eq!(config.grouping, GroupingStrategy::Split);
    }
}
