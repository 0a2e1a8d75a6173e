// Terminal rendering for the TTV departures screen.

use crate::ttv_alerts::{alert_icon, format_alert_text, has_alerts, AlertData};
use crate::ttv_models::{Route, TtvError};

pub struct TtvViews;

impl TtvViews {
    /// Render one full refresh: header, route cards, alert ticker.
    pub fn render_screen(routes: &[Route], alerts: &[AlertData<'_>], now_ms: i64) {
        // Clear and home, so each refresh repaints in place.
        print!("\x1b[2J\x1b[H");

        println!("{}", "═".repeat(70));
        println!("     🚏 NEXT DEPARTURES");
        println!("{}", "═".repeat(70));

        if routes.is_empty() {
            Self::show_no_departures_message();
        }
        for route in routes {
            Self::render_route_card(route, now_ms);
        }

        if !alerts.is_empty() {
            println!("\n{}", "═".repeat(70));
            println!("  SERVICE ALERTS");
            println!("{}", "─".repeat(70));
            for entry in alerts {
                let marker = if entry.is_escalated { "⚠️ " } else { "ℹ️ " };
                println!("  {} {}", marker, format_alert_text(entry));
            }
        }

        println!("{}", "═".repeat(70));
    }

    /// One card per route: badge, then a line per itinerary with its next
    /// few departures.
    fn render_route_card(route: &Route, now_ms: i64) {
        println!("\n{}", "─".repeat(70));
        let long_name = match (&route.route_short_name, &route.route_long_name) {
            (Some(_), Some(long)) => long.as_str(),
            _ => "",
        };
        let marker = if has_alerts(route) {
            if alert_icon(route) == "alert" { " ⚠️" } else { " ℹ️" }
        } else {
            ""
        };
        println!("  {} {}{}", Self::colorize_route(route), long_name, marker);

        for itinerary in &route.itineraries {
            let branch = itinerary
                .branch_code
                .as_deref()
                .or(itinerary.variant_id.as_deref());
            match branch {
                Some(branch) => println!("    → {} ({})", itinerary.display_headsign(), branch),
                None => println!("    → {}", itinerary.display_headsign()),
            }

            let times: Vec<String> = itinerary
                .schedule_items
                .iter()
                .filter(|item| item.is_cancelled != Some(true))
                .take(3)
                .map(|item| {
                    let minutes = Self::minutes_until(item.departure_time, now_ms);
                    // Scheduled times are approximate; real-time ones are not.
                    if item.is_real_time {
                        format!("📡 {} min", minutes)
                    } else {
                        format!("~{} min", minutes)
                    }
                })
                .collect();
            if times.is_empty() {
                println!("       (no upcoming departures)");
            } else {
                println!("       {}", times.join("   "));
            }

            if let Some(stop) = &itinerary.closest_stop {
                if !stop.stop_name.is_empty() {
                    println!("       📍 {}", stop.stop_name);
                }
            }
        }
    }

    /// Whole minutes until a Unix-seconds departure, floored at zero.
    pub fn minutes_until(departure: i64, now_ms: i64) -> i64 {
        ((departure * 1000 - now_ms) / 60_000).max(0)
    }

    fn show_no_departures_message() {
        println!("\n  No departures within the display window.");
        println!("  Service may not be operating at this time.");
    }

    /// Error screen. Transient upstream trouble and configuration problems
    /// read differently; a rate limit tells the viewer when it will recover.
    pub fn render_error(error: &TtvError) {
        println!("\n{}", "═".repeat(70));
        match error {
            TtvError::RateLimit { retry_after_seconds } => {
                println!("  ⏳ Too many requests upstream.");
                println!("     Departures will refresh in about {retry_after_seconds}s.");
            }
            TtvError::Authentication => {
                println!("  ❌ The upstream API rejected this screen's API key.");
                println!("     Check the TRANSIT_API_KEY configuration.");
            }
            TtvError::Timeout | TtvError::BackendUnavailable => {
                println!("  📡 Departure data is temporarily unavailable.");
                println!("     Retrying on the next refresh.");
            }
            TtvError::Upstream { status } => {
                println!("  ❌ Upstream API error (status {status}).");
            }
            TtvError::Validation(message) | TtvError::Parse(message) => {
                println!("  ❌ {message}");
            }
        }
        println!("{}", "═".repeat(70));
    }

    /// Route badge on the route's own color, with contrast-aware text.
    fn colorize_route(route: &Route) -> String {
        let code = route
            .route_short_name
            .as_deref()
            .or(route.route_long_name.as_deref())
            .unwrap_or("?");

        let (r, g, b) = Self::parse_hex_color(route.route_color.as_deref().unwrap_or("008060"));
        let luminance = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0;
        let text_color = if luminance > 0.5 { "30" } else { "97" };

        format!("\x1b[48;2;{};{};{}m\x1b[{}m {} \x1b[0m", r, g, b, text_color, code)
    }

    fn parse_hex_color(hex: &str) -> (u8, u8, u8) {
        let hex = hex.trim_start_matches('#');
        // Length alone is not enough: slicing assumes single-byte chars, and
        // the color string is free text from the upstream payload.
        if hex.len() != 6 || !hex.is_ascii() {
            return (0, 128, 96);
        }
        let parse = |range| u8::from_str_radix(&hex[range], 16).unwrap_or(0);
        (parse(0..2), parse(2..4), parse(4..6))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_until_floors_at_zero_and_rounds_down() {
        let now_ms = 1_700_000_000_000;
        assert_eq!(TtvViews::minutes_until(now_ms / 1000 + 90, now_ms), 1);
        assert_eq!(TtvViews::minutes_until(now_ms / 1000 + 60, now_ms), 1);
        assert_eq!(TtvViews::minutes_until(now_ms / 1000 + 59, now_ms), 0);
        assert_eq!(TtvViews::minutes_until(now_ms / 1000 - 300, now_ms), 0);
    }

    #[test]
    fn hex_colors_parse_with_and_without_hash() {
        assert_eq!(TtvViews::parse_hex_color("#ff0080"), (255, 0, 128));
        assert_eq!(TtvViews::parse_hex_color("ff0080"), (255, 0, 128));
        assert_eq!(TtvViews::parse_hex_color("nonsense"), (0, 128, 96));
    }

    #[test]
    fn multibyte_color_text_falls_back_instead_of_panicking() {
        // Two euro signs are 6 bytes but only 2 chars; byte-indexed slicing
        // on this input is a char-boundary panic.
        assert_eq!(TtvViews::parse_hex_color("\u{20ac}\u{20ac}"), (0, 128, 96));
        assert_eq!(TtvViews::parse_hex_color("#ffrouge"), (0, 128, 96));
    }
}
