// HTTP client for the upstream nearby-routes API.
//
// Responsible for the request itself and for translating transport and
// status failures into the TtvError taxonomy; it never leaks a raw reqwest
// error to callers. Responses are normalized before being handed back, so
// the cache always stores the flat v3 shape.

use std::time::Duration;

use log::error;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Response, StatusCode};

use crate::ttv_models::{Result, RoutesPayload, TtvError};
use crate::ttv_normalize::normalize_payload;

const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

#[derive(Clone)]
pub struct TransitClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TransitClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TtvError::Validation(format!("failed to build HTTP client: {e}")))?;

        Ok(TransitClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetch and normalize the routes near a coordinate. Coordinates are
    /// validated before any network call.
    pub async fn nearby_routes(&self, lat: f64, lon: f64, max_distance: u32) -> Result<RoutesPayload> {
        validate_coords(lat, lon)?;

        let url = format!("{}/public/nearby_routes", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("max_distance", max_distance.to_string()),
            ])
            .header(ACCEPT, "application/json")
            .header("apiKey", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status, &response));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TtvError::Parse(format!("invalid JSON from upstream: {e}")))?;

        normalize_payload(value)
    }
}

/// Reject coordinates outside the valid lat/lon ranges.
pub fn validate_coords(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(TtvError::Validation(format!(
            "latitude {lat} out of range, must be between -90 and 90"
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(TtvError::Validation(format!(
            "longitude {lon} out of range, must be between -180 and 180"
        )));
    }
    Ok(())
}

fn map_transport_error(err: reqwest::Error) -> TtvError {
    if err.is_timeout() {
        error!("upstream request timed out: {err}");
        TtvError::Timeout
    } else {
        error!("upstream request failed: {err}");
        TtvError::BackendUnavailable
    }
}

fn map_status_error(status: StatusCode, response: &Response) -> TtvError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_seconds = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
            error!("rate limited by upstream, retry after {retry_after_seconds}s");
            TtvError::RateLimit { retry_after_seconds }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            error!("upstream rejected the API key (status {status})");
            TtvError::Authentication
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            error!("upstream unavailable (status {status})");
            TtvError::BackendUnavailable
        }
        other => {
            error!("upstream error (status {other})");
            TtvError::Upstream {
                status: other.as_u16(),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_validated_before_any_network_call() {
        assert!(validate_coords(45.5017, -73.5673).is_ok());
        assert!(validate_coords(90.0, 180.0).is_ok());
        assert!(validate_coords(-90.0, -180.0).is_ok());

        assert!(matches!(validate_coords(91.0, 0.0), Err(TtvError::Validation(_))));
        assert!(matches!(validate_coords(0.0, -181.0), Err(TtvError::Validation(_))));
        assert!(matches!(validate_coords(f64::NAN, 0.0), Err(TtvError::Validation(_))));
    }

    #[tokio::test]
    async fn invalid_coordinates_short_circuit_the_request() {
        let client = TransitClient::new("http://localhost:1", "key", Duration::from_secs(1)).unwrap();
        // Port 1 is not listening; a validation error proves nothing was sent.
        let err = client.nearby_routes(120.0, 0.0, 500).await.unwrap_err();
        assert!(matches!(err, TtvError::Validation(_)));
    }

    #[test]
    fn client_strips_trailing_slash_from_base_url() {
        let client = TransitClient::new("https://api.example.com/v3/", "key", Duration::from_secs(1))
            .unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v3");
    }
}
