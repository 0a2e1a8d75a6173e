// The display pipeline: everything between a normalized upstream payload
// and the list of route cards the screen renders.
//
// Stages, in order:
//  1. de-duplicate routes by global id (upstream sometimes repeats a route
//     once per nearby stop)
//  2. apply the configured itinerary grouping strategy
//  3. drop departures outside the display window, then itineraries and
//     routes left with nothing to show
//  4. optionally drop itineraries whose headsign names the stop itself
//  5. enforce the search radius client-side

use crate::ttv_config::GroupingStrategy;
use crate::ttv_filters::{
    filter_routes_by_distance, is_redundant_terminus, should_show_departure,
};
use crate::ttv_itineraries::{demerge_itineraries, merge_itineraries};
use crate::ttv_models::{Route, RoutesPayload};

#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub grouping: GroupingStrategy,
    pub filter_redundant_terminus: bool,
    pub departure_window_minutes: i64,
    /// Screen location, (lat, lon).
    pub origin: (f64, f64),
    pub max_distance_meters: f64,
}

/// First occurrence of each global route id wins; later duplicates carry the
/// same itineraries anchored to a different nearby stop.
fn dedup_routes(routes: Vec<Route>) -> Vec<Route> {
    let mut seen: Vec<String> = Vec::new();
    routes
        .into_iter()
        .filter(|route| {
            if seen.iter().any(|id| *id == route.global_route_id) {
                false
            } else {
                seen.push(route.global_route_id.clone());
                true
            }
        })
        .collect()
}

fn apply_grouping(route: &mut Route, strategy: GroupingStrategy) {
    let itineraries = std::mem::take(&mut route.itineraries);
    route.itineraries = match strategy {
        GroupingStrategy::Merge => merge_itineraries(itineraries),
        GroupingStrategy::Split => demerge_itineraries(itineraries),
        GroupingStrategy::None => itineraries,
    };
}

/// Trim each itinerary to the departures inside the window, then drop
/// itineraries with nothing left. The route's flat compatibility list is
/// rebuilt from the survivors.
fn apply_departure_window(route: &mut Route, now_ms: i64, window_minutes: i64) {
    for itinerary in &mut route.itineraries {
        itinerary
            .schedule_items
            .retain(|item| should_show_departure(item.departure_time, now_ms, window_minutes));
    }
    route.itineraries.retain(|itinerary| !itinerary.schedule_items.is_empty());
    route.schedule_items = route
        .itineraries
        .iter()
        .flat_map(|itinerary| itinerary.schedule_items.iter().cloned())
        .collect();
}

/// Drop itineraries that only tell the viewer where they already are. Applied
/// only when both a stop name and a real headsign exist; an itinerary we
/// cannot judge is shown, not hidden.
fn apply_terminus_filter(route: &mut Route) {
    route.itineraries.retain(|itinerary| {
        let Some(stop) = &itinerary.closest_stop else {
            return true;
        };
        if stop.stop_name.is_empty() || !itinerary.has_headsign() {
            return true;
        }
        !is_redundant_terminus(&stop.stop_name, itinerary.display_headsign())
    });
}

/// Run the full pipeline over a normalized payload.
pub fn build_route_cards(
    payload: RoutesPayload,
    now_ms: i64,
    options: &DisplayOptions,
) -> Vec<Route> {
    let mut routes = dedup_routes(payload.routes);

    for route in &mut routes {
        apply_grouping(route, options.grouping);
        apply_departure_window(route, now_ms, options.departure_window_minutes);
        if options.filter_redundant_terminus {
            apply_terminus_filter(route);
        }
    }
    routes.retain(|route| !route.itineraries.is_empty());

    filter_routes_by_distance(
        routes,
        options.origin.0,
        options.origin.1,
        options.max_distance_meters,
    )
}

// ============================================================================
// Tests
// ============================================================================
