use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, success_empty_response, success_paginated_response, success_response,
};
use crate::logging::TraceId;
use crate::rule_builder;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use wattmon_common::types::{Alert, AlertScope, AlertState, Severity};
use wattmon_storage::{AlertFilter, AlertRuleFilter, AlertRuleRow, AlertRuleUpdate, NewAlertRule};

// ---- Alerts ----

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ListAlertsParams {
    /// Lifecycle state exact match (unread / read / resolved)
    #[param(required = false, rename = "state__eq")]
    #[serde(rename = "state__eq")]
    state_eq: Option<AlertState>,
    /// Scope exact match (consumption / offline / weather)
    #[param(required = false, rename = "scope__eq")]
    #[serde(rename = "scope__eq")]
    scope_eq: Option<AlertScope>,
    /// Severity exact match (info / warning / critical)
    #[param(required = false, rename = "severity__eq")]
    #[serde(rename = "severity__eq")]
    severity_eq: Option<Severity>,
    /// Subject exact match (`device:<id>` or `location:<city>,<cc>`)
    #[param(required = false, rename = "subject__eq")]
    #[serde(rename = "subject__eq")]
    subject_eq: Option<String>,
    /// Only unread and read alerts
    #[param(required = false)]
    #[serde(default)]
    active_only: bool,
}

/// List alerts. Default sort: `created_at` descending.
#[utoipa::path(
    get,
    path = "/v1/alerts",
    tag = "Alerts",
    params(ListAlertsParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated alert list", body = Vec<Alert>)
    )
)]
async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListAlertsParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = AlertFilter {
        state_eq: params.state_eq,
        scope_eq: params.scope_eq,
        severity_eq: params.severity_eq,
        subject_eq: params.subject_eq,
        active_only: params.active_only,
    };
    let limit = pagination.limit();
    let offset = pagination.offset();

    let total = match state.store.count_alerts(&filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count alerts");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match state.store.list_alerts(&filter, limit, offset).await {
        Ok(items) => success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list alerts");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Fetch one alert.
#[utoipa::path(
    get,
    path = "/v1/alerts/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert detail", body = Alert),
        (status = 404, description = "Alert not found", body = crate::api::ApiError)
    )
)]
async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_alert(&id).await {
        Ok(Some(alert)) => success_response(StatusCode::OK, &trace_id, alert),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Alert not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get alert");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Mark an alert as read. Read and resolved alerts are left unchanged.
#[utoipa::path(
    post,
    path = "/v1/alerts/{id}/mark_as_read",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Updated alert", body = Alert),
        (status = 404, description = "Alert not found", body = crate::api::ApiError)
    )
)]
async fn mark_as_read(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.mark_alert_read(&id).await {
        Ok(Some(alert)) => success_response(StatusCode::OK, &trace_id, alert),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Alert not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to mark alert as read");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Resolve an alert by hand. The next breach of the same (subject, scope)
/// creates a fresh alert rather than reopening this one.
#[utoipa::path(
    post,
    path = "/v1/alerts/{id}/mark_as_resolved",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Updated alert", body = Alert),
        (status = 404, description = "Alert not found", body = crate::api::ApiError)
    )
)]
async fn mark_as_resolved(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.resolve_alert(&id, Utc::now()).await {
        Ok(Some(alert)) => success_response(StatusCode::OK, &trace_id, alert),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Alert not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to resolve alert");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

// ---- Alert rules ----

/// Alert rule detail
#[derive(serde::Serialize, ToSchema)]
struct AlertRuleResponse {
    /// Rule unique ID
    id: String,
    /// Rule name
    name: String,
    /// consumption / offline / weather
    scope: AlertScope,
    /// Glob matched against device IDs, or `city,country` for weather rules
    subject_pattern: String,
    /// Whether the engine evaluates this rule
    enabled: bool,
    /// Scope-specific settings as a JSON object
    config_json: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<AlertRuleRow> for AlertRuleResponse {
    fn from(r: AlertRuleRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            scope: r.scope,
            subject_pattern: r.subject_pattern,
            enabled: r.enabled,
            config_json: r.config_json,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ListAlertRulesParams {
    /// Scope exact match (consumption / offline / weather)
    #[param(required = false, rename = "scope__eq")]
    #[serde(rename = "scope__eq")]
    scope_eq: Option<AlertScope>,
    /// Enabled flag exact match
    #[param(required = false, rename = "enabled__eq")]
    #[serde(rename = "enabled__eq")]
    enabled_eq: Option<bool>,
}

/// List alert rules. Default sort: `created_at` descending.
#[utoipa::path(
    get,
    path = "/v1/alerts/rules",
    tag = "Alerts",
    params(ListAlertRulesParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated rule list", body = Vec<AlertRuleResponse>)
    )
)]
async fn list_alert_rules(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListAlertRulesParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = AlertRuleFilter {
        scope_eq: params.scope_eq,
        enabled_eq: params.enabled_eq,
    };
    let limit = pagination.limit();
    let offset = pagination.offset();

    let total = match state.store.count_alert_rules(&filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count alert rules");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match state.store.list_alert_rules(&filter, limit, offset).await {
        Ok(rows) => {
            let items: Vec<AlertRuleResponse> = rows.into_iter().map(Into::into).collect();
            success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list alert rules");
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
struct CreateAlertRuleRequest {
    name: String,
    /// consumption / offline / weather
    scope: AlertScope,
    /// Glob matched against device IDs, or `city,country` for weather rules
    #[serde(default = "default_subject_pattern")]
    subject_pattern: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    /// Scope-specific settings as a JSON object
    #[serde(default = "default_config_json")]
    config_json: String,
}

fn default_subject_pattern() -> String {
    "*".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_config_json() -> String {
    "{}".to_string()
}

/// Create an alert rule. The config is validated against the scope before
/// the rule is stored; the engine picks it up on the next pass.
#[utoipa::path(
    post,
    path = "/v1/alerts/rules",
    tag = "Alerts",
    request_body = CreateAlertRuleRequest,
    responses(
        (status = 201, description = "Created rule", body = AlertRuleResponse),
        (status = 400, description = "Invalid rule config", body = crate::api::ApiError)
    )
)]
async fn create_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<CreateAlertRuleRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "name must not be empty",
        );
    }
    if let Err(e) = rule_builder::validate_rule_config(req.scope, &req.config_json) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_rule_config",
            &e.to_string(),
        );
    }

    let new = NewAlertRule {
        name: req.name,
        scope: req.scope,
        subject_pattern: req.subject_pattern,
        enabled: req.enabled,
        config_json: req.config_json,
    };
    match state.store.insert_alert_rule(&new).await {
        Ok(row) => {
            if let Err(e) = rule_builder::reload_alert_engine(&state.store, &state.engine).await {
                tracing::error!(error = %e, "Failed to reload alert engine after rule create");
            }
            success_response(StatusCode::CREATED, &trace_id, AlertRuleResponse::from(row))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create alert rule");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Fetch one alert rule.
#[utoipa::path(
    get,
    path = "/v1/alerts/rules/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule detail", body = AlertRuleResponse),
        (status = 404, description = "Rule not found", body = crate::api::ApiError)
    )
)]
async fn get_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_alert_rule_by_id(&id).await {
        Ok(Some(row)) => success_response(StatusCode::OK, &trace_id, AlertRuleResponse::from(row)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Rule not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get alert rule");
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
struct UpdateAlertRuleRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    subject_pattern: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    config_json: Option<String>,
}

/// Update an alert rule. Absent fields are left untouched; a new config is
/// validated against the rule's scope.
#[utoipa::path(
    put,
    path = "/v1/alerts/rules/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "Rule ID")),
    request_body = UpdateAlertRuleRequest,
    responses(
        (status = 200, description = "Updated rule", body = AlertRuleResponse),
        (status = 400, description = "Invalid rule config", body = crate::api::ApiError),
        (status = 404, description = "Rule not found", body = crate::api::ApiError)
    )
)]
async fn update_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAlertRuleRequest>,
) -> impl IntoResponse {
    let existing = match state.store.get_alert_rule_by_id(&id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Rule not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get alert rule");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    if let Some(config) = &req.config_json {
        if let Err(e) = rule_builder::validate_rule_config(existing.scope, config) {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "invalid_rule_config",
                &e.to_string(),
            );
        }
    }

    let update = AlertRuleUpdate {
        name: req.name,
        subject_pattern: req.subject_pattern,
        enabled: req.enabled,
        config_json: req.config_json,
    };
    match state.store.update_alert_rule(&id, &update).await {
        Ok(Some(row)) => {
            if let Err(e) = rule_builder::reload_alert_engine(&state.store, &state.engine).await {
                tracing::error!(error = %e, "Failed to reload alert engine after rule update");
            }
            success_response(StatusCode::OK, &trace_id, AlertRuleResponse::from(row))
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Rule not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update alert rule");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// Delete an alert rule. Alerts it already raised are untouched.
#[utoipa::path(
    delete,
    path = "/v1/alerts/rules/{id}",
    tag = "Alerts",
    params(("id" = String, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule deleted"),
        (status = 404, description = "Rule not found", body = crate::api::ApiError)
    )
)]
async fn delete_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_alert_rule(&id).await {
        Ok(true) => {
            if let Err(e) = rule_builder::reload_alert_engine(&state.store, &state.engine).await {
                tracing::error!(error = %e, "Failed to reload alert engine after rule delete");
            }
            success_empty_response(StatusCode::OK, &trace_id, "Rule deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Rule not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete alert rule");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn alert_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_alerts))
        .routes(routes!(list_alert_rules, create_alert_rule))
        .routes(routes!(get_alert_rule, update_alert_rule, delete_alert_rule))
        .routes(routes!(get_alert))
        .routes(routes!(mark_as_read))
        .routes(routes!(mark_as_resolved))
}
