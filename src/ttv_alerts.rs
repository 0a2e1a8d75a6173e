// Alert relevance matching and ranking for the alert ticker.

use std::collections::HashSet;

use crate::ttv_models::{Alert, Route};

/// One ticker entry: an alert paired with the route it applies to.
#[derive(Debug, Clone)]
pub struct AlertData<'a> {
    pub route: &'a Route,
    pub alert: &'a Alert,
    pub is_escalated: bool,
}

/// Severities that escalate an alert above plain informational notices.
fn is_escalated_severity(severity: Option<&str>) -> bool {
    let severity = severity.unwrap_or("Info").to_lowercase();
    severity == "severe" || severity == "warning"
}

pub fn has_alerts(route: &Route) -> bool {
    !route.alerts.is_empty()
}

/// Route-level escalation: true when any alert on the route is escalated.
/// Drives the card's alert-vs-info icon.
pub fn route_has_escalated_alert(route: &Route) -> bool {
    route
        .alerts
        .iter()
        .any(|alert| is_escalated_severity(alert.severity.as_deref()))
}

pub fn alert_icon(route: &Route) -> &'static str {
    if route_has_escalated_alert(route) { "alert" } else { "info" }
}

/// Relevance of one alert to one route, given the set of every stop id
/// visible anywhere in the result set.
///
/// No informed entities means globally relevant. Otherwise at least one
/// entity must match: an empty entity matches everything, and a populated
/// one matches when its route id (if any) equals this route and its stop id
/// (if any) is among the visible stops. A trip id is accepted as evidence
/// but never excludes on its own.
fn alert_applies(alert: &Alert, route_id: &str, visible_stops: &HashSet<&str>) -> bool {
    if alert.informed_entities.is_empty() {
        return true;
    }

    alert.informed_entities.iter().any(|entity| {
        let blank = entity.global_route_id.is_none()
            && entity.global_stop_id.is_none()
            && entity.trip_id.is_none();
        if blank {
            return true;
        }

        let route_ok = entity
            .global_route_id
            .as_deref()
            .map(|id| id == route_id)
            .unwrap_or(true);
        let stop_ok = entity
            .global_stop_id
            .as_deref()
            .map(|id| visible_stops.contains(id))
            .unwrap_or(true);

        route_ok && stop_ok
    })
}

/// Every stop id appearing in any itinerary's closest stop, across the whole
/// result set. Alerts scoped to a stop are relevant wherever that stop is on
/// screen, not just on the route that carries the alert.
fn visible_stop_ids(routes: &[Route]) -> HashSet<&str> {
    routes
        .iter()
        .flat_map(|route| route.itineraries.iter())
        .filter_map(|itinerary| itinerary.closest_stop.as_ref())
        .filter(|stop| !stop.global_stop_id.is_empty())
        .map(|stop| stop.global_stop_id.as_str())
        .collect()
}

/// Build the ranked ticker feed: every relevant (route, alert) pair, with
/// escalated alerts first. The sort is a stable partition; original order
/// is preserved within each tier.
pub fn ranked_alerts(routes: &[Route]) -> Vec<AlertData<'_>> {
    let visible_stops = visible_stop_ids(routes);

    let mut feed: Vec<AlertData<'_>> = routes
        .iter()
        .flat_map(|route| {
            let visible_stops = &visible_stops;
            route
                .alerts
                .iter()
                .filter(move |alert| alert_applies(alert, &route.global_route_id, visible_stops))
                .map(move |alert| AlertData {
                    route,
                    alert,
                    is_escalated: is_escalated_severity(alert.severity.as_deref()),
                })
        })
        .collect();

    feed.sort_by_key(|entry| !entry.is_escalated);
    feed
}

/// Ticker line: "<route name>: <alert title>".
pub fn format_alert_text(entry: &AlertData<'_>) -> String {
    let route_name = entry
        .route
        .route_short_name
        .as_deref()
        .or(entry.route.route_long_name.as_deref())
        .unwrap_or("Route");
    let title = entry
        .alert
        .title
        .as_deref()
        .or(entry.alert.description.as_deref())
        .unwrap_or("Service alert");
    format!("{route_name}: {title}")
}

// ============================================================================
// Tests
// ============================================================================
