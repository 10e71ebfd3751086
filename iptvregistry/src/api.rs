//! REST API for the device registry
//!
//! Routes, relative to the mount point (`/api/devices` by default):
//! - `GET /` - every device
//! - `POST /` - create or update a device from `{macAddress, m3uUrl}`
//! - `GET /{mac}` - one device
//! - `DELETE /{mac}` - remove a device
//!
//! Failures are answered with `{error, message}`, `error` being a stable code.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use utoipa::ToSchema;

use crate::error::RegistryError;
use crate::record::DeviceRecord;
use crate::registry::Registry;

/// Body of `POST /api/devices`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpsertDeviceRequest {
    /// MAC address, `:` or `-` separated, any case
    #[serde(rename = "macAddress", alias = "identifier")]
    #[schema(example = "aa-bb-cc-dd-ee-ff")]
    pub mac_address: String,
    /// Absolute URL of the M3U playlist
    #[serde(rename = "m3uUrl", alias = "playlistUrl")]
    #[schema(example = "http://example.com/list.m3u")]
    pub m3u_url: String,
}

/// Answer to a successful upsert
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsertDeviceResponse {
    #[schema(example = "Device created")]
    pub message: String,
    pub device: DeviceRecord,
    /// `true` when the device did not exist before
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteDeviceResponse {
    #[schema(example = "Device AA:BB:CC:DD:EE:FF deleted")]
    pub message: String,
}

/// Error body shared by every route
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable error code
    #[schema(example = "INVALID_IDENTIFIER")]
    pub error: String,
    /// Human readable description
    #[schema(example = "invalid MAC address format: \"AABBCCDDEEFF\"")]
    pub message: String,
}

impl ErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::InvalidIdentifier(_) | RegistryError::InvalidUrl { .. } => {
                StatusCode::BAD_REQUEST
            }
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Store details are logged by the registry, never sent to clients
        let message = match &self {
            RegistryError::StoreUnavailable(_) => "Device store unavailable".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(self.code(), message))).into_response()
    }
}

/// Lists every registered device, oldest first
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Registered devices", body = Vec<DeviceRecord>),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "devices"
)]
pub async fn list_devices(
    State(registry): State<Arc<Registry>>,
) -> Result<Json<Vec<DeviceRecord>>, RegistryError> {
    Ok(Json(registry.list_all().await?))
}

/// Gets one device by MAC address
#[utoipa::path(
    get,
    path = "/{mac}",
    params(("mac" = String, Path, description = "MAC address, any case, `:` or `-` separated")),
    responses(
        (status = 200, description = "Device found", body = DeviceRecord),
        (status = 404, description = "Unknown device", body = ErrorResponse),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "devices"
)]
pub async fn get_device(
    State(registry): State<Arc<Registry>>,
    Path(mac): Path<String>,
) -> Result<Json<DeviceRecord>, RegistryError> {
    Ok(Json(registry.get_by_identifier(&mac).await?))
}

/// Creates a device or replaces its playlist URL
#[utoipa::path(
    post,
    path = "/",
    request_body = UpsertDeviceRequest,
    responses(
        (status = 200, description = "Device saved", body = UpsertDeviceResponse),
        (status = 400, description = "Invalid MAC address, URL or body", body = ErrorResponse),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "devices"
)]
pub async fn upsert_device(
    State(registry): State<Arc<Registry>>,
    payload: Result<Json<UpsertDeviceRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("INVALID_REQUEST", rejection.body_text())),
            )
                .into_response();
        }
    };

    match registry.upsert(&req.mac_address, &req.m3u_url).await {
        Ok(outcome) => {
            let message = if outcome.created {
                "Device created"
            } else {
                "Device updated"
            };
            Json(UpsertDeviceResponse {
                message: message.to_string(),
                device: outcome.record,
                created: outcome.created,
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Removes a device
#[utoipa::path(
    delete,
    path = "/{mac}",
    params(("mac" = String, Path, description = "MAC address, any case, `:` or `-` separated")),
    responses(
        (status = 200, description = "Device deleted", body = DeleteDeviceResponse),
        (status = 404, description = "Unknown device", body = ErrorResponse),
        (status = 500, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "devices"
)]
pub async fn delete_device(
    State(registry): State<Arc<Registry>>,
    Path(mac): Path<String>,
) -> Result<Json<DeleteDeviceResponse>, RegistryError> {
    let key = registry.delete_by_identifier(&mac).await?;
    Ok(Json(DeleteDeviceResponse {
        message: format!("Device {key} deleted"),
    }))
}

/// Builds the device router, to be nested under `/api/devices`
pub fn create_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(list_devices).post(upsert_device))
        .route("/{mac}", get(get_device).delete(delete_device))
        .layer(CorsLayer::permissive())
        .with_state(registry)
}
