//! Microsoft Graph client for OneDrive / SharePoint drive operations.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::addressing::{child_name_ref, root_path_ref, ROOT_ITEM_ID};
use crate::auth::{DefaultCredential, TokenCredential, DEFAULT_SCOPE};
use crate::error::{Error, Result};
use crate::models::{
    DriveItemCollection, DriveItemInfo, DriveItemResource, DriveResource, FolderInfo,
    GraphErrorResponse, SiteCollection, SiteInfo, SiteResource, UserResource,
};
use crate::settings::Settings;

/// Base URL for Microsoft Graph v1.0.
const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Query/body key selecting the service-side naming-collision policy.
const CONFLICT_BEHAVIOR_PARAM: &str = "@microsoft.graph.conflictBehavior";

/// Collision policy for uploads and folder creation. Fixed: the service
/// renames the new item instead of overwriting or rejecting.
const CONFLICT_RENAME: &str = "rename";

/// High-level client for OneDrive / SharePoint file operations.
///
/// Every operation is a single request against Graph; nothing is cached or
/// retried here. Transport failures surface as [`Error::Http`]; domain-level
/// not-found conditions as [`Error::NotFound`].
pub struct OneDriveClient {
    http: Client,
    credential: Option<Arc<dyn TokenCredential>>,
    scope: String,
    base_url: String,
}

impl std::fmt::Debug for OneDriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneDriveClient")
            .field("http", &self.http)
            .field("credential", &self.credential.as_ref().map(|_| "<credential>"))
            .field("scope", &self.scope)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Builder for [`OneDriveClient`].
///
/// A credential is required unless a pre-built HTTP client is supplied, in
/// which case requests are dispatched without a bearer header and the caller
/// owns authentication.
#[derive(Default)]
pub struct OneDriveClientBuilder {
    credential: Option<Arc<dyn TokenCredential>>,
    scope: Option<String>,
    base_url: Option<String>,
    http: Option<Client>,
}

impl OneDriveClientBuilder {
    pub fn credential(mut self, credential: impl TokenCredential + 'static) -> Self {
        self.credential = Some(Arc::new(credential));
        self
    }

    pub fn shared_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// OAuth 2.0 scope requested for each token. Defaults to the
    /// application-permission scope [`DEFAULT_SCOPE`].
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Override the Graph endpoint (sovereign clouds, tests).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Use a pre-configured HTTP client.
    pub fn http(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<OneDriveClient> {
        if self.credential.is_none() && self.http.is_none() {
            return Err(Error::Config(
                "either a credential or a pre-built HTTP client must be provided".to_string(),
            ));
        }
        Ok(OneDriveClient {
            http: self.http.unwrap_or_default(),
            credential: self.credential,
            scope: self.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            base_url: self.base_url.unwrap_or_else(|| GRAPH_API_BASE.to_string()),
        })
    }
}

impl OneDriveClient {
    /// Create a client for the default Graph endpoint and scope.
    pub fn new(credential: impl TokenCredential + 'static) -> Self {
        Self {
            http: Client::new(),
            credential: Some(Arc::new(credential)),
            scope: DEFAULT_SCOPE.to_string(),
            base_url: GRAPH_API_BASE.to_string(),
        }
    }

    pub fn builder() -> OneDriveClientBuilder {
        OneDriveClientBuilder::default()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let mut request = self.http.request(method, url);
        if let Some(credential) = &self.credential {
            let token = credential.get_token(&self.scope).await?;
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    /// Decode a non-success response into an API error, using the Graph
    /// error body when it parses.
    async fn api_error(response: Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if let Ok(graph_error) = serde_json::from_str::<GraphErrorResponse>(&body) {
            let detail = graph_error.error;
            let message = if detail.message.is_empty() {
                detail.code
            } else {
                detail.message
            };
            return Error::Api { status, message };
        }
        Error::Api {
            status,
            message: body,
        }
    }

    /// Return the authenticated user's display name, or `"User"` when the
    /// profile does not carry one.
    pub async fn get_user_display_name(&self) -> Result<String> {
        let response = self.request(Method::GET, &self.url("/me")).await?.send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let user: UserResource = response.json().await?;
        Ok(user.display_name.unwrap_or_else(|| "User".to_string()))
    }

    /// Get the drive ID of the authenticated user's OneDrive.
    pub async fn get_my_drive_id(&self) -> Result<String> {
        let response = self
            .request(Method::GET, &self.url("/me/drive"))
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(
                "could not resolve the current user's drive".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let drive: DriveResource = response.json().await?;
        drive
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::NotFound("could not resolve the current user's drive".to_string()))
    }

    /// Return the SharePoint sites the current user is following. An empty
    /// list is a valid answer, not an error.
    pub async fn list_followed_sites(&self) -> Result<Vec<SiteInfo>> {
        let response = self
            .request(Method::GET, &self.url("/me/followedSites"))
            .await?
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let sites: SiteCollection = response.json().await?;
        Ok(sites.value.into_iter().map(SiteInfo::from).collect())
    }

    /// Resolve the default document-library drive ID for a site by ID.
    ///
    /// # Arguments
    /// * `site_id` - The site identifier
    ///   (e.g. `"contoso.sharepoint.com,guid,guid"`)
    pub async fn get_site_default_drive_id(&self, site_id: &str) -> Result<String> {
        let url = self.url(&format!("/sites/{site_id}/drive"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "Default drive not found for site {site_id}"
            )));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let drive: DriveResource = response.json().await?;
        drive.id.filter(|id| !id.is_empty()).ok_or_else(|| {
            Error::NotFound(format!("Default drive not found for site {site_id}"))
        })
    }

    /// Resolve the default document-library drive ID for a SharePoint site
    /// addressed by hostname and server-relative path.
    ///
    /// # Arguments
    /// * `hostname` - e.g. `"contoso.sharepoint.com"`
    /// * `site_path` - Server-relative path, e.g. `"/sites/my-team"`
    pub async fn get_site_drive_id(&self, hostname: &str, site_path: &str) -> Result<String> {
        let url = self.url(&format!("/sites/{hostname}:{site_path}"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "Site not found: {hostname}:{site_path}"
            )));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let site: SiteResource = response.json().await?;
        let site_id = site.id.unwrap_or_default();

        let url = self.url(&format!("/sites/{site_id}/drive"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "Default drive not found for site {hostname}:{site_path}"
            )));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let drive: DriveResource = response.json().await?;
        Ok(drive.id.unwrap_or_default())
    }

    /// List immediate children of a folder in a drive.
    ///
    /// # Arguments
    /// * `drive_id` - The drive (document library) identifier
    /// * `folder_id` - The item ID of the folder; use [`ROOT_ITEM_ID`] for
    ///   the drive root
    pub async fn list_items(&self, drive_id: &str, folder_id: &str) -> Result<Vec<DriveItemInfo>> {
        let url = self.url(&format!("/drives/{drive_id}/items/{folder_id}/children"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Item not found: {folder_id}")));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let items: DriveItemCollection = response.json().await?;
        Ok(items.value.into_iter().map(DriveItemInfo::from).collect())
    }

    /// List children of a folder identified by its path relative to the
    /// drive root, e.g. `"Documents/Reports"`.
    ///
    /// The path is resolved to its item ID first; a path that resolves to
    /// nothing is a not-found error naming that path.
    pub async fn list_items_by_path(&self, drive_id: &str, path: &str) -> Result<Vec<DriveItemInfo>> {
        let item_ref = root_path_ref(path);
        let url = self.url(&format!("/drives/{drive_id}/items/{item_ref}"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Folder not found at path: {path}")));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let folder: DriveItemResource = response.json().await?;
        let folder_id = folder
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| ROOT_ITEM_ID.to_string());
        self.list_items(drive_id, &folder_id).await
    }

    /// Get metadata for a single drive item.
    pub async fn get_item(&self, drive_id: &str, item_id: &str) -> Result<DriveItemInfo> {
        let url = self.url(&format!("/drives/{drive_id}/items/{item_id}"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Item not found: {item_id}")));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let item: DriveItemResource = response.json().await?;
        Ok(item.into())
    }

    /// Download a file to the local filesystem and return the path written.
    ///
    /// # Arguments
    /// * `drive_id` - The drive (document library) identifier
    /// * `item_id` - The drive item identifier for the file
    /// * `destination` - Local path (file or directory). If a directory,
    ///   the remote file name is preserved; missing parent directories are
    ///   created.
    pub async fn download_file(
        &self,
        drive_id: &str,
        item_id: &str,
        destination: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        let mut destination = destination.as_ref().to_path_buf();

        // A directory destination keeps the remote name, which takes one
        // extra metadata fetch.
        if destination.is_dir() {
            let meta = self.get_item(drive_id, item_id).await?;
            destination.push(meta.name);
        }

        let url = self.url(&format!("/drives/{drive_id}/items/{item_id}/content"));
        let response = self.request(Method::GET, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "No content returned for item {item_id}"
            )));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = File::create(&destination).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(item_id, path = %destination.display(), "downloaded drive item");
        Ok(destination)
    }

    /// Upload a small file (≤ 250 MB) into a folder.
    ///
    /// A name collision makes the service rename the new item; nothing is
    /// overwritten and no conflict error is raised.
    ///
    /// # Arguments
    /// * `drive_id` - The drive (document library) identifier
    /// * `parent_folder_id` - The item ID of the destination folder
    /// * `filename` - The desired filename in the drive
    /// * `content` - Raw bytes of the file
    pub async fn upload_file(
        &self,
        drive_id: &str,
        parent_folder_id: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<DriveItemInfo> {
        let item_ref = child_name_ref(parent_folder_id, filename);
        self.put_content(drive_id, &item_ref, filename, content).await
    }

    /// Upload a small file addressed by a path relative to the drive root,
    /// e.g. `"Documents/report.pdf"`. Same collision behavior as
    /// [`OneDriveClient::upload_file`].
    pub async fn upload_file_by_path(
        &self,
        drive_id: &str,
        remote_path: &str,
        content: Vec<u8>,
    ) -> Result<DriveItemInfo> {
        let item_ref = root_path_ref(remote_path);
        self.put_content(drive_id, &item_ref, remote_path, content).await
    }

    async fn put_content(
        &self,
        drive_id: &str,
        item_ref: &str,
        label: &str,
        content: Vec<u8>,
    ) -> Result<DriveItemInfo> {
        let mime_type = mime_guess::from_path(label)
            .first_or_octet_stream()
            .to_string();
        let size = content.len();

        let url = self.url(&format!("/drives/{drive_id}/items/{item_ref}/content"));
        let response = self
            .request(Method::PUT, &url)
            .await?
            .query(&[(CONFLICT_BEHAVIOR_PARAM, CONFLICT_RENAME)])
            .header("Content-Type", mime_type)
            .body(content)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::OperationFailed(format!(
                "Upload returned no metadata for {label}"
            )));
        }
        let item: DriveItemResource = serde_json::from_str(&body)?;
        info!(label, size, "uploaded drive item");
        Ok(item.into())
    }

    /// Create a new folder inside a parent folder. Name collisions are
    /// renamed by the service, as with uploads.
    ///
    /// # Arguments
    /// * `drive_id` - The drive (document library) identifier
    /// * `parent_folder_id` - Item ID of the parent folder; use
    ///   [`ROOT_ITEM_ID`] for the drive root
    /// * `folder_name` - Name of the new folder
    pub async fn create_folder(
        &self,
        drive_id: &str,
        parent_folder_id: &str,
        folder_name: &str,
    ) -> Result<DriveItemInfo> {
        let mut body = serde_json::json!({
            "name": folder_name,
            "folder": {}
        });
        body[CONFLICT_BEHAVIOR_PARAM] = serde_json::Value::from(CONFLICT_RENAME);

        let url = self.url(&format!("/drives/{drive_id}/items/{parent_folder_id}/children"));
        let response = self
            .request(Method::POST, &url)
            .await?
            .json(&body)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "Item not found: {parent_folder_id}"
            )));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::OperationFailed(format!(
                "Folder creation returned no metadata for {folder_name}"
            )));
        }
        let item: DriveItemResource = serde_json::from_str(&body)?;
        info!(folder_name, "created drive folder");
        Ok(item.into())
    }

    /// Delete a file or folder. The service moves it to the recycle bin;
    /// there is no local confirmation step.
    pub async fn delete_item(&self, drive_id: &str, item_id: &str) -> Result<()> {
        let url = self.url(&format!("/drives/{drive_id}/items/{item_id}"));
        let response = self.request(Method::DELETE, &url).await?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Item not found: {item_id}")));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        info!(item_id, drive_id, "deleted drive item");
        Ok(())
    }

    /// Get folder metadata together with one level of children.
    pub async fn get_folder_info(&self, drive_id: &str, folder_id: &str) -> Result<FolderInfo> {
        let folder_meta = self.get_item(drive_id, folder_id).await?;
        let children = self.list_items(drive_id, folder_id).await?;
        Ok(FolderInfo {
            id: folder_meta.id,
            name: folder_meta.name,
            children,
            web_url: folder_meta.web_url,
        })
    }
}

static SHARED_CLIENT: OnceLock<OneDriveClient> = OnceLock::new();

/// Get the process-wide [`OneDriveClient`], constructing it on first use.
///
/// The client is bound to [`Settings::from_env`] configuration and the
/// [`DefaultCredential`] fallback chain, and is never rebuilt; credential
/// rotation happens inside the chain. Repeated calls return the identical
/// instance. A configuration error is returned before anything is memoized,
/// so a later call can succeed once the environment is fixed.
pub fn shared_client() -> Result<&'static OneDriveClient> {
    if let Some(client) = SHARED_CLIENT.get() {
        return Ok(client);
    }
    let settings = Settings::from_env()?;
    let credential = DefaultCredential::new(&settings);
    let client = OneDriveClient::new(credential);
    // A concurrent first caller may already have installed an instance;
    // get_or_init keeps exactly one.
    Ok(SHARED_CLIENT.get_or_init(|| client))
}
