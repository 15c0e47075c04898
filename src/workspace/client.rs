//! REST implementation of [`WorkspaceClient`] over Azure Resource Manager.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, IntoUrl, Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::wire::{DatastoreList, DatastoreResource, ErrorEnvelope};
use super::{Datastore, WorkspaceClient, WorkspaceError};

/// Azure Resource Manager endpoint of the public cloud.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Microsoft identity platform host of the public cloud.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const API_VERSION: &str = "2021-03-01-preview";

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and endpoints for a [`Workspace`].
#[derive(Debug)]
pub struct WorkspaceConfig {
    /// Application (client) ID of the service principal.
    pub client_id: String,
    /// Client secret of the service principal.
    pub client_secret: SecretString,
    /// Directory (tenant) the service principal belongs to.
    pub tenant_id: String,
    /// Subscription holding the workspaces.
    pub subscription_id: String,
    /// Base URL of Azure Resource Manager.
    pub management_endpoint: String,
    /// Base URL of the token issuer.
    pub authority_host: String,
}

impl WorkspaceConfig {
    /// Configuration against the public cloud endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        tenant_id: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            tenant_id: tenant_id.into(),
            subscription_id: subscription_id.into(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
        }
    }

    /// Override the Resource Manager endpoint.
    pub fn with_management_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.management_endpoint = endpoint.into();
        self
    }

    /// Override the identity platform host.
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Datastore operations of the Azure ML workspaces in one subscription.
pub struct Workspace {
    http: Client,
    config: WorkspaceConfig,
    token: Mutex<Option<CachedToken>>,
}

impl Workspace {
    /// Create a client for the configured subscription.
    pub fn new(config: WorkspaceConfig) -> Result<Self, WorkspaceError> {
        for (field, value) in [
            ("client_id", config.client_id.as_str()),
            ("tenant_id", config.tenant_id.as_str()),
            ("subscription_id", config.subscription_id.as_str()),
            ("client_secret", config.client_secret.expose_secret()),
        ] {
            if value.trim().is_empty() {
                return Err(WorkspaceError::InvalidConfig(format!("{field} is empty")));
            }
        }

        let http = Client::builder()
            .user_agent(concat!("azureml-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn datastores_url(&self, resource_group: &str, workspace: &str) -> Result<Url, WorkspaceError> {
        endpoint_url(
            &self.config.management_endpoint,
            &[
                "subscriptions",
                &self.config.subscription_id,
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.MachineLearningServices",
                "workspaces",
                workspace,
                "datastores",
            ],
        )
    }

    fn datastore_url(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<Url, WorkspaceError> {
        let mut url = self.datastores_url(resource_group, workspace)?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(name);
        }
        Ok(url)
    }

    /// A bearer token for Resource Manager, fetched on first use and on expiry.
    async fn access_token(&self) -> Result<String, WorkspaceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let url = endpoint_url(
            &self.config.authority_host,
            &[&self.config.tenant_id, "oauth2", "v2.0", "token"],
        )?;
        let scope = format!(
            "{}/.default",
            self.config.management_endpoint.trim_end_matches('/')
        );
        debug!(tenant_id = %self.config.tenant_id, "requesting access token");

        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkspaceError::Authentication(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn request(
        &self,
        method: Method,
        url: impl IntoUrl + Send,
    ) -> Result<RequestBuilder, WorkspaceError> {
        let token = self.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, WorkspaceError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(WorkspaceError::NotFound(what.to_string()));
        }

        let body = response.bytes().await?;
        let (code, message) = match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (String::new(), String::from_utf8_lossy(&body).into_owned()),
        };
        Err(WorkspaceError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

/// Append `segments` to `base`, percent-encoding each one.
fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, WorkspaceError> {
    let mut url = Url::parse(base)
        .map_err(|e| WorkspaceError::InvalidConfig(format!("invalid endpoint {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| WorkspaceError::InvalidConfig(format!("invalid endpoint {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl WorkspaceClient for Workspace {
    async fn get_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<Datastore, WorkspaceError> {
        debug!(resource_group, workspace, name, "getting datastore");
        let url = self.datastore_url(resource_group, workspace, name)?;
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("api-version", API_VERSION)]);
        let response = self.send(request, &format!("datastore {name}")).await?;

        let resource: DatastoreResource = serde_json::from_slice(&response.bytes().await?)?;
        Ok(resource.into())
    }

    async fn get_datastores(
        &self,
        resource_group: &str,
        workspace: &str,
    ) -> Result<Vec<Datastore>, WorkspaceError> {
        debug!(resource_group, workspace, "listing datastores");
        let what = format!("workspace {workspace}");
        let url = self.datastores_url(resource_group, workspace)?;
        let request = self
            .request(Method::GET, url)
            .await?
            .query(&[("api-version", API_VERSION)]);
        let mut page: DatastoreList =
            serde_json::from_slice(&self.send(request, &what).await?.bytes().await?)?;

        let mut datastores = Vec::new();
        loop {
            datastores.extend(page.value.into_iter().map(Datastore::from));
            let Some(next_link) = page.next_link.filter(|link| !link.is_empty()) else {
                break;
            };
            // The link already carries the api-version and continuation token.
            let request = self.request(Method::GET, next_link.as_str()).await?;
            page = serde_json::from_slice(&self.send(request, &what).await?.bytes().await?)?;
        }

        debug!(count = datastores.len(), "listed datastores");
        Ok(datastores)
    }

    async fn create_or_update_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        datastore: &Datastore,
    ) -> Result<Datastore, WorkspaceError> {
        debug!(resource_group, workspace, name = %datastore.name, "putting datastore");
        let url = self.datastore_url(resource_group, workspace, &datastore.name)?;
        let request = self
            .request(Method::PUT, url)
            .await?
            .query(&[("api-version", API_VERSION)])
            .json(&DatastoreResource::from(datastore));
        let response = self
            .send(request, &format!("workspace {workspace}"))
            .await?;

        let resource: DatastoreResource = serde_json::from_slice(&response.bytes().await?)?;
        Ok(resource.into())
    }

    async fn delete_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<(), WorkspaceError> {
        debug!(resource_group, workspace, name, "deleting datastore");
        let url = self.datastore_url(resource_group, workspace, name)?;
        let request = self
            .request(Method::DELETE, url)
            .await?
            .query(&[("api-version", API_VERSION)]);
        self.send(request, &format!("datastore {name}")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkspaceConfig {
        WorkspaceConfig::new(
            "app",
            SecretString::from("secret"),
            "tenant",
            "00000000-0000-0000-0000-000000000000",
        )
    }

    #[test]
    fn test_urls() {
        let workspace =
            Workspace::new(config().with_management_endpoint("https://arm.example/")).unwrap();
        assert_eq!(
            workspace.datastore_url("rg", "ws", "blobstore").unwrap().as_str(),
            "https://arm.example/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.MachineLearningServices/workspaces/ws/datastores/blobstore"
        );
    }

    #[test]
    fn test_urls_escape_segments() {
        let workspace =
            Workspace::new(config().with_management_endpoint("https://arm.example")).unwrap();
        let url = workspace
            .datastore_url("my rg", "ws/../other", "blob?store#1")
            .unwrap();
        assert_eq!(
            url.path(),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/my%20rg/providers/Microsoft.MachineLearningServices/workspaces/ws%2F..%2Fother/datastores/blob%3Fstore%231"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let workspace =
            Workspace::new(config().with_management_endpoint("not a url")).unwrap();
        let err = workspace.datastores_url("rg", "ws").unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidConfig(_)));
    }

    #[test]
    fn test_new_rejects_empty_fields() {
        let mut config = config();
        config.tenant_id = " ".to_string();
        let err = Workspace::new(config).err().unwrap();
        assert!(matches!(err, WorkspaceError::InvalidConfig(ref msg) if msg == "tenant_id is empty"));
    }

    #[test]
    fn test_config_debug_hides_secret() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("\"secret\""));
        assert_eq!(config().management_endpoint, DEFAULT_MANAGEMENT_ENDPOINT);
        assert_eq!(config().authority_host, DEFAULT_AUTHORITY_HOST);
    }
}
