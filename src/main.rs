mod ttv_alerts;
mod ttv_cache;
mod ttv_client;
mod ttv_config;
mod ttv_filters;
mod ttv_itineraries;
mod ttv_models;
mod ttv_normalize;
mod ttv_pipeline;
mod ttv_views;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use ttv_alerts::ranked_alerts;
use ttv_cache::{nearby_cache_key, ResponseCache};
use ttv_client::TransitClient;
use ttv_config::ScreenConfig;
use ttv_models::Result;
use ttv_pipeline::{build_route_cards, DisplayOptions};
use ttv_views::TtvViews;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = ScreenConfig::parse();
    if let Err(err) = run(config).await {
        error!("fatal: {err}");
        TtvViews::render_error(&err);
        std::process::exit(1);
    }
}

async fn run(config: ScreenConfig) -> Result<()> {
    config.validate()?;

    let client = TransitClient::new(
        &config.base_url,
        &config.api_key,
        Duration::from_millis(config.request_timeout_ms),
    )?;
    let cache = Arc::new(ResponseCache::new(
        Duration::from_millis(config.realtime_ttl_ms),
        Duration::from_millis(config.schedule_ttl_ms),
        config.max_cache_entries,
    ));
    cache.start(SWEEP_INTERVAL);

    let options = config.display_options();
    let max_distance = config.effective_max_distance();
    info!(
        "departures screen at ({}, {}), radius {max_distance}m, refresh every {}s",
        config.lat, config.lon, config.refresh_seconds
    );

    let mut refresh = tokio::time::interval(Duration::from_secs(config.refresh_seconds));
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                refresh_screen(&client, &cache, &config, &options, max_distance).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                cache.clear();
                break;
            }
        }
    }
    Ok(())
}

/// One refresh cycle: fetch through the cache, run the pipeline, repaint.
/// Errors are rendered, never fatal; the next tick retries.
async fn refresh_screen(
    client: &TransitClient,
    cache: &Arc<ResponseCache>,
    config: &ScreenConfig,
    options: &DisplayOptions,
    max_distance: u32,
) {
    let key = nearby_cache_key(config.lat, config.lon, max_distance);
    let client = client.clone();
    let (lat, lon) = (config.lat, config.lon);
    let result = cache
        .fetch(&key, move || async move {
            client.nearby_routes(lat, lon, max_distance).await
        })
        .await;

    match result {
        Ok(payload) => {
            let now_ms = chrono::Utc::now().timestamp_millis();
            let cards = build_route_cards((*payload).clone(), now_ms, options);
            let alerts = ranked_alerts(&cards);
            TtvViews::render_screen(&cards, &alerts, now_ms);
        }
        Err(err) => {
            error!("refresh failed: {err}");
            TtvViews::render_error(&err);
        }
    }
}
