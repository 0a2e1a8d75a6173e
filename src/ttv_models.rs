// Data model for the TTV transit departures screen.
//
// These structures mirror the upstream nearby-routes API payload (v3 flat
// shape). The v4 nested shape is translated into this model by
// ttv_normalize before anything else looks at it.
//
// Upstream endpoint: GET {base_url}/public/nearby_routes?lat=..&lon=..&max_distance=..

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Handling
// ============================================================================

/// Error taxonomy surfaced to callers. Clone is required so a coalesced
/// in-flight failure can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TtvError {
    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimit { retry_after_seconds: u64 },

    #[error("authentication with the upstream API failed")]
    Authentication,

    #[error("upstream API did not respond in time")]
    Timeout,

    #[error("upstream API is unavailable")]
    BackendUnavailable,

    #[error("upstream API error (status {status})")]
    Upstream { status: u16 },

    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("malformed upstream payload: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, TtvError>;

// ============================================================================
// Data Structures
// ============================================================================

/// The flat (v3) response shape: a list of routes near the screen location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutesPayload {
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Route {
    pub global_route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_long_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_display_short_name: Option<RouteDisplayShortName>,
    #[serde(default)]
    pub itineraries: Vec<Itinerary>,
    /// Flat list of every schedule item on the route, kept for backward
    /// compatibility with consumers of the v3 shape.
    #[serde(default)]
    pub schedule_items: Vec<ScheduleItem>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Glyph/icon description for the route badge (boxed route number and friends).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteDisplayShortName {
    #[serde(default)]
    pub elements: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_headsign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_headsign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest_stop: Option<ClosestStop>,
    /// Physical branch discriminator, attached by the variant splitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    /// Internal group identifier from the v4 nested shape. Stripped by the
    /// normalizer; never part of the public output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary_id: Option<String>,
    #[serde(default)]
    pub schedule_items: Vec<ScheduleItem>,
}

impl Itinerary {
    /// The destination text shown on the card. Prefers the merged headsign,
    /// falls back to the direction headsign, then to a literal "unknown".
    pub fn display_headsign(&self) -> &str {
        self.merged_headsign
            .as_deref()
            .or(self.direction_headsign.as_deref())
            .unwrap_or("unknown")
    }

    /// Whether any headsign text is actually present (as opposed to the
    /// "unknown" fallback).
    pub fn has_headsign(&self) -> bool {
        self.merged_headsign.is_some() || self.direction_headsign.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosestStop {
    #[serde(default)]
    pub stop_name: String,
    #[serde(default)]
    pub global_stop_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_station_global_stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_lon: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleItem {
    /// Departure time in Unix seconds, possibly real-time adjusted upstream.
    pub departure_time: i64,
    #[serde(default)]
    pub is_real_time: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,
    /// Colon-delimited trip key; the 3rd field discriminates route variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_search_key: Option<String>,
    /// Internal itinerary identifier from the v4 nested shape. Stripped by
    /// the normalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub informed_entities: Vec<InformedEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InformedEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_route_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_stop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
