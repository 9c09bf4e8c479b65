use crate::state::AppState;
use crate::{api, logging};
use axum::http::HeaderValue;
use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "wattmon API",
        description = "Home energy monitoring and alerting REST API",
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Devices", description = "Device registry"),
        (name = "Readings", description = "Consumption readings"),
        (name = "Forecasts", description = "Weather forecasts"),
        (name = "Alerts", description = "Alerts and alert rules")
    )
)]
struct ApiDoc;

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_http_app(state: AppState) -> Router {
    let (router, route_spec) = api::routes().split_for_parts();

    let mut spec = ApiDoc::openapi();
    spec.merge(route_spec);

    let cors = build_cors(&state.config.cors_allowed_origins);

    router
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/v1/openapi.json", spec))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
