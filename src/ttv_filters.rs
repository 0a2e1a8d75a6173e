// Display filters: the departure time window, the redundant-terminus
// headsign check, and the Haversine distance post-filter.

use log::warn;
use regex::Regex;

use crate::ttv_models::{Itinerary, Route};

/// Default display window in minutes. A departure is shown when it is in
/// the future and at most this far out.
pub const DEFAULT_DEPARTURE_WINDOW_MINUTES: i64 = 130;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// ============================================================================
// Departure Time Window
// ============================================================================

/// True when the departure is strictly in the future and within the display
/// window. `departure` is Unix seconds; `now_ms` is Unix milliseconds.
pub fn should_show_departure(departure: i64, now_ms: i64, window_minutes: i64) -> bool {
    let diff = departure * 1000 - now_ms;
    diff > 0 && diff <= window_minutes * 60_000
}

/// An itinerary is worth displaying iff at least one schedule item falls in
/// the window.
pub fn itinerary_has_shown_departure(itinerary: &Itinerary, now_ms: i64, window_minutes: i64) -> bool {
    itinerary
        .schedule_items
        .iter()
        .any(|item| should_show_departure(item.departure_time, now_ms, window_minutes))
}

/// A route header is worth displaying iff some itinerary is.
pub fn route_has_shown_departure(route: &Route, now_ms: i64, window_minutes: i64) -> bool {
    route
        .itineraries
        .iter()
        .any(|itinerary| itinerary_has_shown_departure(itinerary, now_ms, window_minutes))
}

// ============================================================================
// Redundant-Terminus Filter
// ============================================================================

/// Decide whether a headsign merely names the stop the viewer is already
/// standing at, e.g. headsign "North to Waterfront" at Waterfront Station.
///
/// The pattern is anchored at both ends: an optional "... to " prefix, the
/// stop's core name (trailing "station" stripped), and an optional trailing
/// "station". Headsigns that pass *through* the stop ("Downtown via Union
/// Station") do not match. The word-boundary handling for stop names with
/// internal "station"-like substrings is approximate; when the pattern does
/// not clearly match, the itinerary is shown.
pub fn is_redundant_terminus(stop_name: &str, headsign: &str) -> bool {
    let stop = stop_name.trim().to_lowercase();
    let headsign = headsign.trim().to_lowercase();

    let core = stop.strip_suffix("station").unwrap_or(&stop).trim();
    if core.is_empty() {
        return false;
    }

    let pattern = format!(r"^(?:.*\bto\s+)?{}(?:\s+station)?$", regex::escape(core));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(&headsign),
        Err(e) => {
            warn!("terminus pattern failed to compile for {stop_name:?}: {e}");
            false
        }
    }
}

// ============================================================================
// Distance Post-Filter
// ============================================================================

/// Great-circle distance in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

fn itinerary_within(itinerary: &Itinerary, lat: f64, lon: f64, max_meters: f64) -> bool {
    let Some(stop) = &itinerary.closest_stop else {
        return false;
    };
    match (stop.stop_lat, stop.stop_lon) {
        (Some(stop_lat), Some(stop_lon)) => {
            haversine_meters(lat, lon, stop_lat, stop_lon) <= max_meters
        }
        _ => false,
    }
}

/// Retain only routes with at least one itinerary whose closest stop is
/// within `max_meters` of the origin. The upstream API's own radius
/// parameter is unreliable; this is a client-side safety net.
pub fn filter_routes_by_distance(
    routes: Vec<Route>,
    lat: f64,
    lon: f64,
    max_meters: f64,
) -> Vec<Route> {
    routes
        .into_iter()
        .filter(|route| {
            route
                .itineraries
                .iter()
                .any(|itinerary| itinerary_within(itinerary, lat, lon, max_meters))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
