use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response, success_response};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use wattmon_common::types::{Reading, ReadingSource};
use wattmon_storage::NewReading;

#[derive(Deserialize, ToSchema)]
struct IngestReadingRequest {
    /// External device ID the reading belongs to
    device_id: String,
    /// Instantaneous power in watts
    power_watts: f64,
    /// When the reading was taken; defaults to now
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    /// manual / polled
    #[serde(default = "default_source")]
    source: ReadingSource,
}

fn default_source() -> ReadingSource {
    ReadingSource::Manual
}

/// Ingest a consumption reading. Stamps the device's `last_seen`.
#[utoipa::path(
    post,
    path = "/v1/readings",
    tag = "Readings",
    request_body = IngestReadingRequest,
    responses(
        (status = 201, description = "Reading recorded", body = Reading),
        (status = 400, description = "Invalid reading", body = crate::api::ApiError),
        (status = 404, description = "Unknown device", body = crate::api::ApiError)
    )
)]
async fn ingest_reading(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<IngestReadingRequest>,
) -> impl IntoResponse {
    if !req.power_watts.is_finite() || req.power_watts < 0.0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "power_watts must be a non-negative number",
        );
    }

    // Readings only attach to registered devices
    match state.store.get_device(&req.device_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                &format!("Device '{}' not found", req.device_id),
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to check device for reading");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }

    let new = NewReading {
        device_id: req.device_id,
        timestamp: req.timestamp,
        power_watts: req.power_watts,
        source: req.source,
    };
    match state.store.insert_reading(&new).await {
        Ok(reading) => success_response(StatusCode::CREATED, &trace_id, reading),
        Err(e) => {
            tracing::error!(error = %e, "Failed to record reading");
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
struct ListReadingsParams {
    /// Device ID exact match
    #[param(required = false, rename = "device_id__eq")]
    #[serde(rename = "device_id__eq")]
    device_id_eq: Option<String>,
}

/// List readings, newest first.
#[utoipa::path(
    get,
    path = "/v1/readings",
    tag = "Readings",
    params(ListReadingsParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated reading list", body = Vec<Reading>)
    )
)]
async fn list_readings(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListReadingsParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let limit = pagination.limit();
    let offset = pagination.offset();
    let device_id = params.device_id_eq.as_deref();

    let total = match state.store.count_readings(device_id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count readings");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match state.store.list_readings(device_id, limit, offset).await {
        Ok(items) => success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list readings");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Latest reading for one device.
#[utoipa::path(
    get,
    path = "/v1/readings/{device_id}/latest",
    tag = "Readings",
    params(("device_id" = String, Path, description = "External device ID")),
    responses(
        (status = 200, description = "Latest reading", body = Reading),
        (status = 404, description = "No readings for device", body = crate::api::ApiError)
    )
)]
async fn latest_reading(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match state.store.latest_reading(&device_id).await {
        Ok(Some(reading)) => success_response(StatusCode::OK, &trace_id, reading),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("No readings for device '{device_id}'"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to query latest reading");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn reading_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(ingest_reading, list_readings))
        .routes(routes!(latest_reading))
}
