//! The Azure ML provider: configuration and dispatch by type name.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{provider_schema, ProviderConfig};
use crate::datastore::{data_source, resource};
use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::{validate, validate_result};
use crate::workspace::{Workspace, WorkspaceClient, WorkspaceError};

/// Builds the workspace client once the provider block is known.
pub type ClientFactory =
    Box<dyn Fn(ProviderConfig) -> Result<Arc<dyn WorkspaceClient>, WorkspaceError> + Send + Sync>;

struct Configured {
    client: Arc<dyn WorkspaceClient>,
    subscription_id: String,
}

/// Provider for Azure Machine Learning datastores.
pub struct AzureMlProvider {
    factory: ClientFactory,
    configured: RwLock<Option<Configured>>,
}

impl AzureMlProvider {
    /// A provider talking to Azure Resource Manager.
    pub fn new() -> Self {
        Self::with_client_factory(|config| {
            let workspace = Workspace::new(config.into_workspace_config())?;
            Ok(Arc::new(workspace) as Arc<dyn WorkspaceClient>)
        })
    }

    /// A provider using `factory` to build its workspace client.
    pub fn with_client_factory<F>(factory: F) -> Self
    where
        F: Fn(ProviderConfig) -> Result<Arc<dyn WorkspaceClient>, WorkspaceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            factory: Box::new(factory),
            configured: RwLock::new(None),
        }
    }

    async fn client(&self) -> Result<(Arc<dyn WorkspaceClient>, String), ProviderError> {
        self.configured
            .read()
            .await
            .as_ref()
            .map(|c| (Arc::clone(&c.client), c.subscription_id.clone()))
            .ok_or_else(|| ProviderError::Configuration("provider is not configured".to_string()))
    }
}

impl Default for AzureMlProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn check_resource_type(resource_type: &str) -> Result<(), ProviderError> {
    if resource_type == resource::RESOURCE_TYPE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderService for AzureMlProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_schema())
            .with_resource(resource::RESOURCE_TYPE, resource::schema())
            .with_data_source(data_source::DATASTORE, data_source::datastore_schema())
            .with_data_source(data_source::DATASTORES, data_source::datastores_schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&provider_schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validate(&provider_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let built = ProviderConfig::from_value(&config).and_then(|config| {
            let subscription_id = config.subscription_id.clone();
            (self.factory)(config)
                .map(|client| (client, subscription_id))
                .map_err(|e| ProviderError::Configuration(e.to_string()))
        });

        match built {
            Ok((client, subscription_id)) => {
                info!(subscription_id = %subscription_id, "provider configured");
                *self.configured.write().await = Some(Configured {
                    client,
                    subscription_id,
                });
                Ok(diagnostics)
            }
            Err(e) => {
                let detail = match e {
                    ProviderError::Configuration(msg) => msg,
                    other => other.to_string(),
                };
                Ok(vec![Diagnostic::error("Unable to create client").with_detail(detail)])
            }
        }
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        debug!("dropping workspace client");
        self.configured.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        check_resource_type(resource_type)?;
        Ok(resource::validate_config(&config))
    }

    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let current = resource::schema().version;
        // Only version 0 exists so far.
        if u64::try_from(version).map_or(true, |v| v > current) {
            return Err(ProviderError::InvalidRequest(format!(
                "state version {} is not supported, the latest is {}",
                version, current
            )));
        }
        Ok(state)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        check_resource_type(resource_type)?;
        resource::plan(prior_state, proposed_state)
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let (client, _) = self.client().await?;
        resource::create(client.as_ref(), planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let (client, _) = self.client().await?;
        resource::read(client.as_ref(), current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let (client, _) = self.client().await?;
        resource::update(client.as_ref(), prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        check_resource_type(resource_type)?;
        let (client, _) = self.client().await?;
        resource::delete(client.as_ref(), current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        check_resource_type(resource_type)?;
        let (client, subscription_id) = self.client().await?;
        resource::import(client.as_ref(), &subscription_id, id).await
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match data_source_type {
            data_source::DATASTORE => Ok(validate(&data_source::datastore_schema(), &config)),
            data_source::DATASTORES => Ok(validate(&data_source::datastores_schema(), &config)),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let schema = match data_source_type {
            data_source::DATASTORE => data_source::datastore_schema(),
            data_source::DATASTORES => data_source::datastores_schema(),
            other => return Err(ProviderError::UnknownResource(other.to_string())),
        };
        validate_result(&schema, &config).map_err(ProviderError::Diagnostics)?;

        let (client, subscription_id) = self.client().await?;
        if data_source_type == data_source::DATASTORE {
            data_source::read_datastore(client.as_ref(), config).await
        } else {
            data_source::read_datastores(client.as_ref(), &subscription_id, config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWorkspace;
    use serde_json::json;

    fn provider_config() -> Value {
        json!({
            "client_id": "app",
            "client_secret": "s3cret",
            "tenant_id": "tenant",
            "subscription_id": "sub"
        })
    }

    #[tokio::test]
    async fn test_calls_before_configure_fail() {
        let provider = AzureMlProvider::with_client_factory(|_| {
            Ok(Arc::new(FakeWorkspace::new("sub")) as Arc<dyn WorkspaceClient>)
        });

        let err = provider
            .read(resource::RESOURCE_TYPE, json!({}))
            .await
            .unwrap_err();
        // State parsing happens after the client lookup.
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_reports_factory_error() {
        let provider = AzureMlProvider::with_client_factory(|_| {
            Err(WorkspaceError::InvalidConfig("tenant not found".to_string()))
        });

        let diagnostics = provider.configure(provider_config()).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Unable to create client");
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("invalid client configuration: tenant not found")
        );
        assert!(provider.client().await.is_err());
    }

    #[tokio::test]
    async fn test_configure_validates_schema() {
        let provider = AzureMlProvider::with_client_factory(|_| {
            panic!("client must not be built for an invalid block")
        });

        let diagnostics = provider
            .configure(json!({"client_id": "app", "tenant_id": "", "subscription_id": "sub"}))
            .await
            .unwrap();
        assert!(has_errors(&diagnostics));
        assert_eq!(diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let provider = AzureMlProvider::new();

        let err = provider
            .validate_resource_config("azureml_compute", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(ref t) if t == "azureml_compute"));

        let err = provider
            .read_data_source("azureml_workspace", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_stop_drops_client() {
        let provider = AzureMlProvider::with_client_factory(|_| {
            Ok(Arc::new(FakeWorkspace::new("sub")) as Arc<dyn WorkspaceClient>)
        });
        assert!(provider.configure(provider_config()).await.unwrap().is_empty());
        assert!(provider.client().await.is_ok());

        provider.stop().await.unwrap();
        assert!(provider.client().await.is_err());
    }

    #[tokio::test]
    async fn test_upgrade_resource_state() {
        let provider = AzureMlProvider::new();
        let state = json!({"name": "blobstore"});

        let upgraded = provider
            .upgrade_resource_state(resource::RESOURCE_TYPE, 0, state.clone())
            .await
            .unwrap();
        assert_eq!(upgraded, state);

        let err = provider
            .upgrade_resource_state(resource::RESOURCE_TYPE, 3, state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_metadata() {
        let metadata = AzureMlProvider::new().metadata();
        assert_eq!(metadata.resources, vec!["azureml_datastore"]);
        assert_eq!(
            metadata.data_sources,
            vec!["azureml_datastore", "azureml_datastores"]
        );
    }
}
