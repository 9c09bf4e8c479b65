use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, success_empty_response, success_paginated_response, success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use wattmon_common::types::{DeviceEntry, DeviceKind};
use wattmon_storage::{DeviceFilter, NewDevice};

#[derive(Deserialize, ToSchema)]
struct CreateDeviceRequest {
    /// External device identifier, unique across the registry
    device_id: String,
    /// Display name
    name: String,
    /// Device category (manual / tuya / smart)
    #[serde(default = "default_kind")]
    kind: DeviceKind,
    /// Consumption threshold in watts
    #[serde(default)]
    max_power_watts: Option<f64>,
    /// Expected reporting interval in seconds
    #[serde(default)]
    expected_interval_secs: Option<u64>,
    /// Location as `City,CC`
    #[serde(default)]
    location: Option<String>,
    /// Owner identifier
    #[serde(default)]
    owner: Option<String>,
}

fn default_kind() -> DeviceKind {
    DeviceKind::Manual
}

/// Register a new device.
#[utoipa::path(
    post,
    path = "/v1/devices",
    tag = "Devices",
    request_body = CreateDeviceRequest,
    responses(
        (status = 201, description = "Device registered", body = DeviceEntry),
        (status = 400, description = "Invalid request", body = crate::api::ApiError),
        (status = 409, description = "Device ID already registered", body = crate::api::ApiError)
    )
)]
async fn create_device(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> impl IntoResponse {
    if req.device_id.trim().is_empty() || req.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "device_id and name must not be empty",
        );
    }
    if req.max_power_watts.is_some_and(|w| w <= 0.0) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "max_power_watts must be positive",
        );
    }

    match state.store.get_device(&req.device_id).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                &trace_id,
                "conflict",
                &format!("Device '{}' already registered", req.device_id),
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to check existing device");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }

    let new = NewDevice {
        device_id: req.device_id,
        name: req.name,
        kind: req.kind,
        max_power_watts: req.max_power_watts,
        expected_interval_secs: req.expected_interval_secs,
        location: req.location,
        owner: req.owner,
    };
    match state.store.insert_device(&new).await {
        Ok(entry) => success_response(StatusCode::CREATED, &trace_id, entry),
        Err(e) => {
            tracing::error!(error = %e, "Failed to register device");
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
struct ListDevicesParams {
    /// Active flag exact match
    #[param(required = false, rename = "is_active__eq")]
    #[serde(rename = "is_active__eq")]
    is_active_eq: Option<bool>,
    /// Device kind exact match (manual / tuya / smart)
    #[param(required = false, rename = "kind__eq")]
    #[serde(rename = "kind__eq")]
    kind_eq: Option<DeviceKind>,
    /// Location exact match (`City,CC`)
    #[param(required = false, rename = "location__eq")]
    #[serde(rename = "location__eq")]
    location_eq: Option<String>,
}

/// List devices. Default sort: `name` ascending; default page `limit=20&offset=0`.
#[utoipa::path(
    get,
    path = "/v1/devices",
    tag = "Devices",
    params(ListDevicesParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated device list", body = Vec<DeviceEntry>)
    )
)]
async fn list_devices(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListDevicesParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = DeviceFilter {
        is_active_eq: params.is_active_eq,
        kind_eq: params.kind_eq,
        location_eq: params.location_eq,
    };
    let limit = pagination.limit();
    let offset = pagination.offset();

    let total = match state.store.count_devices(&filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count devices");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match state.store.list_devices(&filter, limit, offset).await {
        Ok(items) => success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list devices");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Fetch one device by its external device ID.
#[utoipa::path(
    get,
    path = "/v1/devices/{device_id}",
    tag = "Devices",
    params(("device_id" = String, Path, description = "External device ID")),
    responses(
        (status = 200, description = "Device detail", body = DeviceEntry),
        (status = 404, description = "Device not found", body = crate::api::ApiError)
    )
)]
async fn get_device(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_device(&device_id).await {
        Ok(Some(entry)) => success_response(StatusCode::OK, &trace_id, entry),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("Device '{device_id}' not found"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get device");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
struct UpdateThresholdRequest {
    /// New consumption threshold in watts; `null` clears it and the
    /// consumption check skips the device with `config_missing`.
    max_power_watts: Option<f64>,
}

/// Set or clear a device's consumption threshold.
#[utoipa::path(
    put,
    path = "/v1/devices/{device_id}/threshold",
    tag = "Devices",
    params(("device_id" = String, Path, description = "External device ID")),
    request_body = UpdateThresholdRequest,
    responses(
        (status = 200, description = "Updated device", body = DeviceEntry),
        (status = 400, description = "Invalid threshold", body = crate::api::ApiError),
        (status = 404, description = "Device not found", body = crate::api::ApiError)
    )
)]
async fn update_threshold(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(req): Json<UpdateThresholdRequest>,
) -> impl IntoResponse {
    if req.max_power_watts.is_some_and(|w| w <= 0.0) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "max_power_watts must be positive",
        );
    }

    match state
        .store
        .update_device_threshold(&device_id, req.max_power_watts)
        .await
    {
        Ok(Some(entry)) => success_response(StatusCode::OK, &trace_id, entry),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("Device '{device_id}' not found"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update device threshold");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Remove a device from the registry. Its readings are retained.
#[utoipa::path(
    delete,
    path = "/v1/devices/{device_id}",
    tag = "Devices",
    params(("device_id" = String, Path, description = "External device ID")),
    responses(
        (status = 200, description = "Device deleted"),
        (status = 404, description = "Device not found", body = crate::api::ApiError)
    )
)]
async fn delete_device(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_device(&device_id).await {
        Ok(true) => success_empty_response(StatusCode::OK, &trace_id, "Device deleted"),
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("Device '{device_id}' not found"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete device");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn device_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_device, list_devices))
        .routes(routes!(get_device, delete_device))
        .routes(routes!(update_threshold))
}
