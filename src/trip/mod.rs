// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trip-planning REST service.
//!
//! `POST /plan-trip` validates the request, forwards the body unchanged to
//! four upstream services (maps, flights, hotels, transport) concurrently
//! and returns the combined itinerary. `GET /health` answers `{"status":"ok"}`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, instrument};

/// Fields every request must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["origin", "destination", "start_date", "end_date", "num_people"];

/// Upstream endpoints and server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripConfig {
    /// Listen address.
    pub bind: String,
    pub maps_url: String,
    pub flights_url: String,
    pub hotels_url: String,
    pub transport_url: String,
    /// Per-upstream timeout in seconds.
    pub timeout_sec: u64,
    /// Reject ill-typed fields with 422 instead of forwarding them.
    pub strict_validation: bool,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            maps_url: "http://127.0.0.1:9001/api/maps".to_string(),
            flights_url: "http://127.0.0.1:9002/api/flights".to_string(),
            hotels_url: "http://127.0.0.1:9003/api/hotels".to_string(),
            transport_url: "http://127.0.0.1:9004/api/transport".to_string(),
            timeout_sec: 10,
            strict_validation: false,
        }
    }
}

/// Request rejected before any upstream call.
#[derive(Debug, Error, PartialEq)]
pub enum TripError {
    #[error("Missing required fields")]
    MissingFields(Vec<String>),

    #[error("{0}")]
    InvalidField(String),

    #[error("Invalid JSON body: {0}")]
    MalformedBody(String),
}

impl IntoResponse for TripError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingFields(missing) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing required fields", "missing": missing})),
            )
                .into_response(),
            Self::InvalidField(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": message}))).into_response()
            }
            Self::MalformedBody(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": self.to_string()}))).into_response()
            }
        }
    }
}

#[derive(Clone)]
struct TripState {
    client: reqwest::Client,
    config: Arc<TripConfig>,
}

/// Build the service router.
pub fn router(config: TripConfig) -> Router {
    let state = TripState {
        client: reqwest::Client::new(),
        config: Arc::new(config),
    };
    Router::new()
        .route("/plan-trip", post(plan_trip))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(config: TripConfig) -> std::io::Result<()> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}: {}", config.bind, e)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Trip planner listening");
    axum::serve(listener, router(config)).await
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[instrument(skip_all)]
async fn plan_trip(State(state): State<TripState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return TripError::MalformedBody(rejection.body_text()).into_response(),
    };
    if let Err(e) = validate(&request, state.config.strict_validation) {
        return e.into_response();
    }

    let config = &state.config;
    let timeout = Duration::from_secs(config.timeout_sec);
    let (maps, flights, hotels, transport) = tokio::join!(
        fetch_leg(&state.client, "Maps", &config.maps_url, &request, timeout),
        fetch_leg(&state.client, "Flights", &config.flights_url, &request, timeout),
        fetch_leg(&state.client, "Hotels", &config.hotels_url, &request, timeout),
        fetch_leg(&state.client, "Transport", &config.transport_url, &request, timeout),
    );

    let failed = [&maps, &flights, &hotels, &transport].into_iter().any(leg_failed);
    let itinerary = json!({
        "maps": maps,
        "flights": flights,
        "hotels": hotels,
        "transport": transport,
    });

    if failed {
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({"status": "error", "itinerary": itinerary})),
        )
            .into_response()
    } else {
        Json(json!({"status": "success", "itinerary": itinerary})).into_response()
    }
}

/// Check that every required field is present.
///
/// With `strict`, also check types: places are strings, dates are ISO 8601
/// (a calendar date or an RFC 3339 timestamp), and `num_people` is a
/// positive integer, either as a number or a numeric string.
pub fn validate(request: &Value, strict: bool) -> Result<(), TripError> {
    let Some(fields) = request.as_object() else {
        return Err(TripError::MissingFields(
            REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
        ));
    };

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| !fields.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(TripError::MissingFields(missing));
    }
    if !strict {
        return Ok(());
    }

    for place in ["origin", "destination"] {
        if !fields[place].is_string() {
            return Err(TripError::InvalidField(format!("{} must be a string", place)));
        }
    }

    for date in ["start_date", "end_date"] {
        if !fields[date].as_str().is_some_and(is_iso_date) {
            return Err(TripError::InvalidField(format!("{} must be an ISO 8601 date", date)));
        }
    }

    let people = match &fields["num_people"] {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        other => other.as_u64(),
    };
    if !people.is_some_and(|n| n > 0) {
        return Err(TripError::InvalidField("num_people must be a positive integer".to_string()));
    }

    Ok(())
}

fn is_iso_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Post the request to one upstream; any failure becomes `{"error": ...}`.
async fn fetch_leg(client: &reqwest::Client, service: &str, url: &str, body: &Value, timeout: Duration) -> Value {
    let response = match client.post(url).json(body).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            error!(service, error = %e, "Upstream request failed");
            return json!({"error": format!("HTTP error from {}: {}", service, e)});
        }
    };

    let status = response.status();
    if !status.is_success() {
        error!(service, %status, "Upstream returned error status");
        return json!({"error": format!("HTTP error from {}: status {}", service, status)});
    }

    match response.json::<Value>().await {
        Ok(value) => value,
        Err(e) => {
            error!(service, error = %e, "Upstream returned invalid JSON");
            json!({"error": format!("Invalid response from {}: {}", service, e)})
        }
    }
}

fn leg_failed(leg: &Value) -> bool {
    leg.as_object().is_some_and(|o| o.contains_key("error"))
}
