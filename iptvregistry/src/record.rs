//! Device records and the values they are built from

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::RegistryError;
use crate::mac::MacAddress;

/// Association between a set-top box and its M3U playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceRecord {
    /// Canonical MAC address, unique key of the record
    #[serde(rename = "macAddress")]
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "AA:BB:CC:DD:EE:FF"))]
    pub mac_address: MacAddress,

    /// Playlist served to the device
    #[serde(rename = "m3uUrl")]
    #[cfg_attr(feature = "openapi", schema(example = "http://example.com/list.m3u"))]
    pub m3u_url: String,

    /// Set on first creation, never modified afterwards
    #[serde(rename = "createdAt")]
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "2025-01-15T10:30:00.000000Z"))]
    pub created_at: DateTime<Utc>,

    /// Set on every creation or update
    #[serde(rename = "updatedAt")]
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "2025-01-15T10:30:00.000000Z"))]
    pub updated_at: DateTime<Utc>,
}

/// A validated absolute playlist URL
///
/// The text is kept as submitted: the registry stores what the operator typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistUrl(String);

impl PlaylistUrl {
    /// Accepts absolute URLs with a scheme and a non-empty host
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidUrl {
            url: input.to_string(),
            reason,
        };

        let url = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(Self(input.to_string())),
            _ => Err(invalid(format!("{} URL has no host", url.scheme()))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PlaylistUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values written by one atomic upsert
#[derive(Debug, Clone)]
pub struct UpsertFields {
    pub m3u_url: PlaylistUrl,
    /// Becomes `updated_at`, and `created_at` when the key is new
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_url_accepts_absolute_urls() {
        for input in [
            "http://example.com/list.m3u",
            "https://iptv.example.org:8443/get.php?user=a&type=m3u_plus",
            "http://192.168.1.10/list.m3u8",
        ] {
            assert_eq!(PlaylistUrl::parse(input).unwrap().as_str(), input);
        }
    }

    #[test]
    fn test_playlist_url_rejects_relative_or_hostless() {
        for input in ["not-a-url", "", "/list.m3u", "example.com/list.m3u", "mailto:a@b.c", "file:///tmp/list.m3u"] {
            assert!(
                matches!(PlaylistUrl::parse(input), Err(RegistryError::InvalidUrl { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_record_wire_names() {
        let now = Utc::now();
        let record = DeviceRecord {
            mac_address: MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap(),
            m3u_url: "http://example.com/list.m3u".into(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["macAddress"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(json["m3uUrl"], "http://example.com/list.m3u");
        assert!(json["createdAt"].is_string());
        assert!(json["updatedAt"].is_string());
    }
}
