use crate::api::{error_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use wattmon_common::types::ForecastRecord;
use wattmon_storage::NewForecast;

#[derive(Deserialize, ToSchema)]
struct IngestForecastRequest {
    city: String,
    /// ISO country code, e.g. `PT`
    country: String,
    /// Day the forecast is for
    forecast_date: DateTime<Utc>,
    /// Temperature in degrees Celsius
    temperature: f64,
    /// Relative humidity, 0-100
    humidity: i32,
    /// Cloud cover, 0-100
    cloudiness: i32,
    /// Condition label (Clear / Clouds / Rain / ...)
    condition: String,
}

/// Record a weather forecast. The solar irradiation factor is derived on
/// ingest from condition, cloudiness and humidity.
#[utoipa::path(
    post,
    path = "/v1/forecasts",
    tag = "Forecasts",
    request_body = IngestForecastRequest,
    responses(
        (status = 201, description = "Forecast recorded", body = ForecastRecord),
        (status = 400, description = "Invalid forecast", body = crate::api::ApiError)
    )
)]
async fn ingest_forecast(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<IngestForecastRequest>,
) -> impl IntoResponse {
    if req.city.trim().is_empty() || req.country.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "city and country must not be empty",
        );
    }
    if !(0..=100).contains(&req.humidity) || !(0..=100).contains(&req.cloudiness) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "humidity and cloudiness must be within 0-100",
        );
    }

    let new = NewForecast {
        city: req.city,
        country: req.country,
        forecast_date: req.forecast_date,
        temperature: req.temperature,
        humidity: req.humidity,
        cloudiness: req.cloudiness,
        condition: req.condition,
    };
    match state.store.insert_forecast(&new).await {
        Ok(record) => success_response(StatusCode::CREATED, &trace_id, record),
        Err(e) => {
            tracing::error!(error = %e, "Failed to record forecast");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct LatestForecastParams {
    /// City name; omit both to get the latest forecast per location
    #[param(required = false)]
    city: Option<String>,
    /// ISO country code
    #[param(required = false)]
    country: Option<String>,
}

/// Latest forecast. With `city` and `country`, one record; without, the
/// latest record for every known location.
#[utoipa::path(
    get,
    path = "/v1/forecasts/latest",
    tag = "Forecasts",
    params(LatestForecastParams),
    responses(
        (status = 200, description = "Latest forecast(s)", body = Vec<ForecastRecord>),
        (status = 404, description = "No forecast for location", body = crate::api::ApiError)
    )
)]
async fn latest_forecast(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<LatestForecastParams>,
) -> impl IntoResponse {
    match (params.city, params.country) {
        (Some(city), Some(country)) => {
            match state.store.latest_forecast(&city, &country).await {
                Ok(Some(record)) => success_response(StatusCode::OK, &trace_id, vec![record]),
                Ok(None) => error_response(
                    StatusCode::NOT_FOUND,
                    &trace_id,
                    "not_found",
                    &format!("No forecast for '{city},{country}'"),
                ),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to query latest forecast");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &trace_id,
                        "storage_error",
                        "Database error",
                    )
                }
            }
        }
        (None, None) => match state.store.latest_forecasts().await {
            Ok(records) => success_response(StatusCode::OK, &trace_id, records),
            Err(e) => {
                tracing::error!(error = %e, "Failed to query latest forecasts");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "storage_error",
                    "Database error",
                )
            }
        },
        _ => error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "city and country must be provided together",
        ),
    }
}

pub fn forecast_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(ingest_forecast))
        .routes(routes!(latest_forecast))
}
