//! Data models for Microsoft Graph drive API responses.
//!
//! Raw `*Resource` types mirror the wire schema and tolerate absent fields;
//! they are converted once, at the response boundary, into the stable
//! `*Info` domain types. Nothing downstream sees a raw record.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Side-channel key Graph uses for the transient download URL.
///
/// This is instance metadata, not part of the stable item schema. The key is
/// versioned by Microsoft; a schema change only touches this constant and
/// [`DriveItemResource::download_url`].
pub const DOWNLOAD_URL_KEY: &str = "@microsoft.graph.downloadUrl";

/// Metadata for a file or folder in a drive.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveItemInfo {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub is_folder: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub web_url: Option<String>,
    /// Pre-authenticated download URL. Only valid for a short,
    /// service-defined window.
    pub download_url: Option<String>,
}

impl DriveItemInfo {
    /// Return true if this item is a file.
    pub fn is_file(&self) -> bool {
        !self.is_folder
    }
}

/// Metadata for a folder together with its immediate children.
///
/// A point-in-time snapshot: constructed fresh on every fetch, never cached.
/// Child order is the service-returned order.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
    pub children: Vec<DriveItemInfo>,
    pub web_url: Option<String>,
}

/// Metadata for a SharePoint site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub web_url: Option<String>,
}

/// Raw driveItem record as returned by Graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItemResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_url: Option<String>,
    /// Everything outside the stable schema, including the
    /// `@microsoft.graph.*` instance annotations.
    #[serde(flatten)]
    pub additional_data: Map<String, Value>,
}

impl DriveItemResource {
    /// Read the transient download URL from the vendor side-channel.
    pub fn download_url(&self) -> Option<String> {
        self.additional_data
            .get(DOWNLOAD_URL_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

/// Marker facet present on file items.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Marker facet present on folder items.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: Option<i64>,
}

impl From<DriveItemResource> for DriveItemInfo {
    fn from(item: DriveItemResource) -> Self {
        let download_url = item.download_url();
        DriveItemInfo {
            id: item.id.unwrap_or_default(),
            name: item.name.unwrap_or_default(),
            size: item.size,
            // Folders never carry a MIME type; read it from the file facet only.
            mime_type: item.file.and_then(|f| f.mime_type),
            is_folder: item.folder.is_some(),
            created_at: item.created_date_time,
            modified_at: item.last_modified_date_time,
            web_url: item.web_url,
            download_url,
        }
    }
}

/// Response wrapper for driveItem collections.
#[derive(Debug, Deserialize)]
pub struct DriveItemCollection {
    #[serde(default)]
    pub value: Vec<DriveItemResource>,
}

/// Raw drive record. Only the identifier matters to this crate.
#[derive(Debug, Deserialize)]
pub struct DriveResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Raw site record as returned by Graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl From<SiteResource> for SiteInfo {
    fn from(site: SiteResource) -> Self {
        let name = site.name.unwrap_or_default();
        let display_name = site.display_name.unwrap_or_else(|| name.clone());
        SiteInfo {
            id: site.id.unwrap_or_default(),
            name,
            display_name,
            web_url: site.web_url,
        }
    }
}

/// Response wrapper for site collections.
#[derive(Debug, Deserialize)]
pub struct SiteCollection {
    #[serde(default)]
    pub value: Vec<SiteResource>,
}

/// Raw user record. Only the display name is consumed here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResource {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Graph API error response body.
#[derive(Debug, Deserialize)]
pub struct GraphErrorResponse {
    pub error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// OAuth2 token response from the Microsoft identity platform.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(deserialize_with = "deserialize_expires_in")]
    pub expires_in: u64,
}

/// Device authorization response from the devicecode endpoint.
#[derive(Debug, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(deserialize_with = "deserialize_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_poll_interval() -> u64 {
    5
}

/// Token record emitted by `az account get-access-token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_on: Option<String>,
}

// The token endpoint returns `expires_in` as a number, but the instance
// metadata service returns it as a decimal string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("expires_in out of range")),
        Value::String(s) => s.parse::<u64>().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "unexpected expires_in value: {other}"
        ))),
    }
}
