//! Credential acquisition for Microsoft Graph.
//!
//! The client needs exactly one capability from a credential: produce a
//! bearer token for a scope. [`DefaultCredential`] implements the usual
//! fallback chain for that capability — environment-provided application
//! credentials, managed identity, the local Azure CLI session, then
//! interactive device-code login — and remembers whichever link worked.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{CliTokenResponse, DeviceCodeResponse, TokenResponse};
use crate::settings::Settings;

/// Scope for default application-permission token requests.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Default Microsoft identity platform authority host.
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Azure instance metadata service token endpoint.
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Timeout for the metadata endpoint probe. Off-Azure hosts have no route
/// to it, so the probe must fail fast for the chain to move on.
const IMDS_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Capability contract for credential providers: produce a bearer token
/// valid for the given scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<String>;
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

impl CachedToken {
    fn from_response(token: TokenResponse) -> Self {
        Self {
            expires_at: SystemTime::now() + Duration::from_secs(token.expires_in),
            access_token: token.access_token,
        }
    }

    fn is_fresh(&self) -> bool {
        // 60 second buffer before expiration
        self.expires_at > SystemTime::now() + Duration::from_secs(60)
    }
}

/// Shared token cache used by every credential in this module.
#[derive(Clone, Default)]
struct TokenCache(Arc<RwLock<Option<CachedToken>>>);

impl TokenCache {
    async fn fresh_token(&self) -> Option<String> {
        let cached = self.0.read().await;
        cached
            .as_ref()
            .filter(|token| token.is_fresh())
            .map(|token| token.access_token.clone())
    }

    async fn store(&self, token: CachedToken) -> String {
        let access_token = token.access_token.clone();
        *self.0.write().await = Some(token);
        access_token
    }
}

fn authority_host_from_env() -> String {
    env_var("AZURE_AUTHORITY_HOST")
        .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Wraps a pre-acquired bearer token.
///
/// Useful when the embedding application already owns token acquisition.
/// The token is returned as-is for every scope; expiry is the caller's
/// problem.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// OAuth2 client-credentials grant using an application secret.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority_host: String,
    http: Client,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority_host: authority_host_from_env(),
            http: Client::new(),
            cache: TokenCache::default(),
        }
    }

    /// Build from the conventional `AZURE_*` environment variables, if all
    /// three are present.
    pub fn from_env() -> Option<Self> {
        let tenant_id = env_var("AZURE_TENANT_ID")?;
        let client_id = env_var("AZURE_CLIENT_ID")?;
        let client_secret = env_var("AZURE_CLIENT_SECRET")?;
        Some(Self::new(tenant_id, client_id, client_secret))
    }

    /// Override the authority host (sovereign clouds, tests).
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_string();
        self
    }

    async fn request_token(&self, scope: &str) -> Result<TokenResponse> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self.http.post(url).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenAcquisition(format!(
                "client-credentials grant failed ({status}): {body}"
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<String> {
        if let Some(token) = self.cache.fresh_token().await {
            return Ok(token);
        }
        let token = self.request_token(scope).await?;
        Ok(self.cache.store(CachedToken::from_response(token)).await)
    }
}

/// Managed identity token acquisition via the Azure instance metadata
/// service. Only works on Azure-hosted compute.
#[derive(Default)]
pub struct ManagedIdentityCredential {
    http: Client,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new() -> Self {
        Self::default()
    }

    async fn request_token(&self, scope: &str) -> Result<TokenResponse> {
        // IMDS speaks resource URIs, not scopes.
        let resource = scope.strip_suffix("/.default").unwrap_or(scope);

        let response = self
            .http
            .get(IMDS_TOKEN_URL)
            .timeout(IMDS_PROBE_TIMEOUT)
            .header("Metadata", "true")
            .query(&[("api-version", "2018-02-01"), ("resource", resource)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenAcquisition(format!(
                "instance metadata service refused the token request ({status}): {body}"
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<String> {
        if let Some(token) = self.cache.fresh_token().await {
            return Ok(token);
        }
        let token = self.request_token(scope).await?;
        Ok(self.cache.store(CachedToken::from_response(token)).await)
    }
}

/// Token acquisition through a logged-in Azure CLI session.
#[derive(Default)]
pub struct AzureCliCredential {
    cache: TokenCache,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::default()
    }

    async fn request_token(scope: &str) -> Result<CliTokenResponse> {
        let output = tokio::process::Command::new("az")
            .args(["account", "get-access-token", "--scope", scope, "--output", "json"])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::TokenAcquisition(format!(
                "az account get-access-token failed: {}",
                stderr.trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn expiry(expires_on: Option<&str>) -> SystemTime {
        // `az` prints local time without an offset, e.g.
        // "2024-05-01 16:01:23.000000". Fall back to a short lifetime when
        // the format drifts.
        expires_on
            .and_then(|value| {
                NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()
            })
            .and_then(|naive| naive.and_local_timezone(Local).single())
            .map(SystemTime::from)
            .unwrap_or_else(|| SystemTime::now() + Duration::from_secs(300))
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> Result<String> {
        if let Some(token) = self.cache.fresh_token().await {
            return Ok(token);
        }
        let token = Self::request_token(scope).await?;
        let cached = CachedToken {
            expires_at: Self::expiry(token.expires_on.as_deref()),
            access_token: token.access_token,
        };
        Ok(self.cache.store(cached).await)
    }
}

/// Interactive device-code grant. Prints the verification instructions to
/// stderr and polls the token endpoint until the user completes sign-in.
pub struct DeviceCodeCredential {
    tenant_id: String,
    client_id: String,
    authority_host: String,
    http: Client,
    cache: TokenCache,
}

impl DeviceCodeCredential {
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authority_host: authority_host_from_env(),
            http: Client::new(),
            cache: TokenCache::default(),
        }
    }

    /// Override the authority host (sovereign clouds, tests).
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, leaf: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{leaf}",
            self.authority_host, self.tenant_id
        )
    }

    async fn request_device_code(&self, scope: &str) -> Result<DeviceCodeResponse> {
        let params = [("client_id", self.client_id.as_str()), ("scope", scope)];
        let response = self
            .http
            .post(self.endpoint("devicecode"))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenAcquisition(format!(
                "device authorization request failed ({status}): {body}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn poll_for_token(&self, device: &DeviceCodeResponse) -> Result<TokenResponse> {
        let deadline = SystemTime::now() + Duration::from_secs(device.expires_in);
        let mut interval = device.interval;

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if SystemTime::now() > deadline {
                return Err(Error::TokenAcquisition(
                    "device code expired before sign-in completed".to_string(),
                ));
            }

            let params = [
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", self.client_id.as_str()),
                ("device_code", device.device_code.as_str()),
            ];
            let response = self
                .http
                .post(self.endpoint("token"))
                .form(&params)
                .send()
                .await?;

            if response.status().is_success() {
                return Ok(response.json().await?);
            }

            let body = response.text().await.unwrap_or_default();
            let code = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str().map(str::to_owned)))
                .unwrap_or_default();
            match code.as_str() {
                "authorization_pending" => {}
                "slow_down" => interval += 5,
                _ => {
                    return Err(Error::TokenAcquisition(format!(
                        "device-code grant failed: {body}"
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl TokenCredential for DeviceCodeCredential {
    async fn get_token(&self, scope: &str) -> Result<String> {
        if let Some(token) = self.cache.fresh_token().await {
            return Ok(token);
        }

        let device = self.request_device_code(scope).await?;
        let instructions = device.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}",
                device.verification_uri, device.user_code
            )
        });
        eprintln!("{instructions}");

        let token = self.poll_for_token(&device).await?;
        Ok(self.cache.store(CachedToken::from_response(token)).await)
    }
}

/// Ordered credential fallback chain.
///
/// Tries, in order: environment-provided client secret, managed identity,
/// Azure CLI, interactive device code. The first credential to produce a
/// token is remembered and used for every subsequent request.
pub struct DefaultCredential {
    chain: Vec<(&'static str, Arc<dyn TokenCredential>)>,
    selected: RwLock<Option<usize>>,
}

impl DefaultCredential {
    pub fn new(settings: &Settings) -> Self {
        let mut chain: Vec<(&'static str, Arc<dyn TokenCredential>)> = Vec::new();
        if let Some(credential) = ClientSecretCredential::from_env() {
            chain.push(("client secret", Arc::new(credential)));
        }
        chain.push(("managed identity", Arc::new(ManagedIdentityCredential::new())));
        chain.push(("azure cli", Arc::new(AzureCliCredential::new())));
        chain.push((
            "device code",
            Arc::new(DeviceCodeCredential::new(
                settings.tenant_id.clone(),
                settings.client_id.clone(),
            )),
        ));
        Self {
            chain,
            selected: RwLock::new(None),
        }
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    async fn get_token(&self, scope: &str) -> Result<String> {
        if let Some(index) = *self.selected.read().await {
            return self.chain[index].1.get_token(scope).await;
        }

        let mut failures = Vec::new();
        for (index, (name, credential)) in self.chain.iter().enumerate() {
            match credential.get_token(scope).await {
                Ok(token) => {
                    debug!(credential = name, "credential chain settled");
                    *self.selected.write().await = Some(index);
                    return Ok(token);
                }
                Err(err) => failures.push(format!("{name}: {err}")),
            }
        }
        Err(Error::TokenAcquisition(format!(
            "no credential in the default chain produced a token ({})",
            failures.join("; ")
        )))
    }
}
