//! OpenAPI document of the device API

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::list_devices,
        crate::api::get_device,
        crate::api::upsert_device,
        crate::api::delete_device,
    ),
    components(schemas(
        crate::record::DeviceRecord,
        crate::api::UpsertDeviceRequest,
        crate::api::UpsertDeviceResponse,
        crate::api::DeleteDeviceResponse,
        crate::api::ErrorResponse,
    )),
    tags(
        (name = "devices", description = "MAC address to M3U playlist registry")
    ),
    info(
        title = "IPTV Registry API",
        version = "0.1.0",
        description = "Associates set-top box MAC addresses with M3U playlist URLs",
        license(name = "MIT"),
    )
)]
pub struct DevicesApiDoc;
