//! graph_drive - A typed client for OneDrive / SharePoint drives.
//!
//! This library provides functionality to:
//! - Discover drives reachable from the signed-in identity (personal
//!   drive, followed sites, sites by ID or by hostname and path)
//! - List, fetch, download, upload, create and delete drive items,
//!   addressed by identifier or by drive-root-relative path
//!
//! All values returned are point-in-time snapshots owned by the service;
//! nothing is cached and no operation retries internally.
//!
//! # Example
//!
//! ```no_run
//! use graph_drive::{OneDriveClient, StaticTokenCredential, ROOT_ITEM_ID};
//!
//! #[tokio::main]
//! async fn main() -> graph_drive::Result<()> {
//!     let client = OneDriveClient::new(StaticTokenCredential::new("token"));
//!
//!     let drive_id = client.get_my_drive_id().await?;
//!     for item in client.list_items(&drive_id, ROOT_ITEM_ID).await? {
//!         println!("{}\t{}", item.id, item.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod addressing;
pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod settings;

// Re-exports for convenience
pub use addressing::ROOT_ITEM_ID;
pub use auth::{DefaultCredential, StaticTokenCredential, TokenCredential, DEFAULT_SCOPE};
pub use client::{shared_client, OneDriveClient, OneDriveClientBuilder};
pub use error::{Error, Result};
pub use models::{DriveItemInfo, FolderInfo, SiteInfo};
pub use settings::Settings;
