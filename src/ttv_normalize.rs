// Format normalizer: translates the upstream v4 nested response shape
// (nearby_routes -> merged_itineraries groups) into the flat v3 shape the
// rest of the pipeline consumes. Payloads that are already flat, or that
// lack the expected top-level key entirely, pass through unchanged.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::ttv_models::{ClosestStop, Itinerary, Result, Route, RoutesPayload, ScheduleItem, TtvError};

// ============================================================================
// v4 Wire Shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct PayloadV4 {
    #[serde(default)]
    nearby_routes: Vec<RouteV4>,
}

#[derive(Debug, Deserialize)]
struct RouteV4 {
    #[serde(flatten)]
    route: Route,
    #[serde(default)]
    merged_itineraries: Vec<MergedGroup>,
}

#[derive(Debug, Deserialize)]
struct MergedGroup {
    #[serde(default)]
    closest_stop: Option<ClosestStop>,
    #[serde(default)]
    itineraries: Vec<Itinerary>,
    #[serde(default)]
    schedule_items: Vec<ScheduleItem>,
}

// ============================================================================
// Normalization
// ============================================================================

/// Translate an upstream payload into the flat v3 shape.
///
/// A payload carrying `nearby_routes` is flattened; anything else is
/// deserialized directly as the v3 shape (a missing `routes` key yields an
/// empty route list rather than an error).
pub fn normalize_payload(value: Value) -> Result<RoutesPayload> {
    let is_v4 = value
        .as_object()
        .is_some_and(|obj| obj.contains_key("nearby_routes"));

    if is_v4 {
        let payload: PayloadV4 =
            serde_json::from_value(value).map_err(|e| TtvError::Parse(e.to_string()))?;
        Ok(RoutesPayload {
            routes: payload.nearby_routes.into_iter().map(flatten_route).collect(),
        })
    } else {
        serde_json::from_value(value).map_err(|e| TtvError::Parse(e.to_string()))
    }
}

/// Flatten one route's merged-itinerary groups into flat `itineraries` and
/// `schedule_items` lists.
fn flatten_route(raw: RouteV4) -> Route {
    let mut route = raw.route;
    let mut itineraries = Vec::new();
    let mut all_items = Vec::new();

    for group in raw.merged_itineraries {
        // Pass 1: bucket the group's schedule items by the internal
        // itinerary identifier, stripping it from the public shape.
        let mut by_itinerary: HashMap<String, Vec<ScheduleItem>> = HashMap::new();
        for mut item in group.schedule_items {
            let id = item.itinerary_id.take();
            if let Some(id) = &id {
                by_itinerary.entry(id.clone()).or_default().push(item.clone());
            }
            all_items.push(item);
        }

        // Pass 2: attach the group's closest stop and the matching schedule
        // items to each itinerary in the group. No matching items is an
        // empty list, not an error.
        for mut itinerary in group.itineraries {
            let id = itinerary.itinerary_id.take();
            itinerary.closest_stop = group.closest_stop.clone();
            itinerary.schedule_items = id
                .and_then(|id| by_itinerary.get(&id).cloned())
                .unwrap_or_default();
            itineraries.push(itinerary);
        }
    }

    route.itineraries = itineraries;
    route.schedule_items = all_items;
    route
}

// ============================================================================
// Tests
// ============================================================================
