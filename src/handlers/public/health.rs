// handlers/public/health.rs - GET / and GET /v1/health

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::config::Environment;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub environment: Environment,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

/// GET / - Service name, version and environment
pub async fn root_get(State(state): State<AppState>) -> ApiResult<ServiceInfo> {
    Ok(ApiResponse::success(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.server.env,
    }))
}

/// GET /v1/health - 200 when the store answers, 503 otherwise
pub async fn health_get(State(state): State<AppState>) -> Response {
    match state.health.ping().await {
        Ok(()) => ApiResponse::success(HealthStatus {
            status: "ok",
            database: "up",
        })
        .with_message("Service healthy")
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            ApiResponse::with_status(
                HealthStatus {
                    status: "degraded",
                    database: "down",
                },
                StatusCode::SERVICE_UNAVAILABLE,
            )
            .with_message("Service unavailable")
            .into_response()
        }
    }
}
