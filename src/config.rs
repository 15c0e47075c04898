//! Provider configuration.
//!
//! The provider block carries the service principal used to call Azure
//! Resource Manager. The REST endpoints default to the public cloud and can be
//! overridden through the environment:
//!
//! - `AZUREML_MANAGEMENT_ENDPOINT`: Resource Manager base URL
//! - `AZUREML_AUTHORITY_HOST`: token issuer base URL

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::validation::Validator;
use crate::workspace::{WorkspaceConfig, DEFAULT_AUTHORITY_HOST, DEFAULT_MANAGEMENT_ENDPOINT};

/// Environment variable overriding the Resource Manager endpoint.
pub const MANAGEMENT_ENDPOINT_ENV: &str = "AZUREML_MANAGEMENT_ENDPOINT";

/// Environment variable overriding the token issuer host.
pub const AUTHORITY_HOST_ENV: &str = "AZUREML_AUTHORITY_HOST";

/// Schema of the provider block.
pub fn provider_schema() -> Schema {
    Schema::v0()
        .with_description("Azure Machine Learning provider.")
        .with_attribute(
            "client_id",
            Attribute::required_string()
                .with_description("Application (client) ID of the service principal.")
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "client_secret",
            Attribute::required_string()
                .with_description("Client secret of the service principal.")
                .sensitive()
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "tenant_id",
            Attribute::required_string()
                .with_description("Directory (tenant) ID of the service principal.")
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "subscription_id",
            Attribute::required_string()
                .with_description("Subscription holding the workspaces.")
                .with_validator(Validator::StringNotEmpty),
        )
}

#[derive(Deserialize)]
struct RawConfig {
    client_id: String,
    client_secret: String,
    tenant_id: String,
    subscription_id: String,
}

/// Parsed provider block plus endpoint overrides.
#[derive(Debug)]
pub struct ProviderConfig {
    /// Application (client) ID of the service principal.
    pub client_id: String,
    /// Client secret of the service principal.
    pub client_secret: SecretString,
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Subscription holding the workspaces.
    pub subscription_id: String,
    /// Resource Manager base URL.
    pub management_endpoint: String,
    /// Token issuer base URL.
    pub authority_host: String,
}

impl ProviderConfig {
    /// Parse the provider block, reading endpoint overrides from the process
    /// environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |key| std::env::var(key).ok())
    }

    /// Parse the provider block with an explicit environment lookup.
    pub fn from_value_with_env<F>(config: &Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = RawConfig::deserialize(config)?;

        for (field, value) in [
            ("client_id", &raw.client_id),
            ("client_secret", &raw.client_secret),
            ("tenant_id", &raw.tenant_id),
            ("subscription_id", &raw.subscription_id),
        ] {
            if value.trim().is_empty() {
                return Err(ProviderError::Configuration(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        let override_or = |key: &str, default: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            client_id: raw.client_id,
            client_secret: SecretString::from(raw.client_secret),
            tenant_id: raw.tenant_id,
            subscription_id: raw.subscription_id,
            management_endpoint: override_or(MANAGEMENT_ENDPOINT_ENV, DEFAULT_MANAGEMENT_ENDPOINT),
            authority_host: override_or(AUTHORITY_HOST_ENV, DEFAULT_AUTHORITY_HOST),
        })
    }

    /// Settings for the REST workspace client.
    pub fn into_workspace_config(self) -> WorkspaceConfig {
        WorkspaceConfig::new(
            self.client_id,
            self.client_secret,
            self.tenant_id,
            self.subscription_id,
        )
        .with_management_endpoint(self.management_endpoint)
        .with_authority_host(self.authority_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;
    use secrecy::ExposeSecret;
    use serde_json::json;

    fn block() -> Value {
        json!({
            "client_id": "app",
            "client_secret": "s3cret",
            "tenant_id": "tenant",
            "subscription_id": "sub"
        })
    }

    #[test]
    fn test_from_value_defaults() {
        let config = ProviderConfig::from_value_with_env(&block(), |_| None).unwrap();
        assert_eq!(config.client_id, "app");
        assert_eq!(config.client_secret.expose_secret(), "s3cret");
        assert_eq!(config.management_endpoint, DEFAULT_MANAGEMENT_ENDPOINT);
        assert_eq!(config.authority_host, DEFAULT_AUTHORITY_HOST);
    }

    #[test]
    fn test_env_overrides() {
        let config = ProviderConfig::from_value_with_env(&block(), |key| match key {
            MANAGEMENT_ENDPOINT_ENV => Some("http://127.0.0.1:8080".to_string()),
            AUTHORITY_HOST_ENV => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.management_endpoint, "http://127.0.0.1:8080");
        assert_eq!(config.authority_host, DEFAULT_AUTHORITY_HOST);

        let workspace = config.into_workspace_config();
        assert_eq!(workspace.management_endpoint, "http://127.0.0.1:8080");
        assert_eq!(workspace.subscription_id, "sub");
    }

    #[test]
    fn test_empty_field_rejected() {
        let mut value = block();
        value["tenant_id"] = json!("  ");
        let err = ProviderConfig::from_value_with_env(&value, |_| None).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: tenant_id must not be empty");
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = ProviderConfig::from_value_with_env(&json!({"client_id": "app"}), |_| None)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Serialization(_)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = ProviderConfig::from_value_with_env(&block(), |_| None).unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }

    #[test]
    fn test_schema_marks_secret_sensitive() {
        let schema = provider_schema();
        assert!(schema.block.attributes["client_secret"].flags.sensitive);
        assert!(!schema.block.attributes["client_id"].flags.sensitive);

        let diagnostics = validate(&schema, &json!({"client_id": ""}));
        // One empty value plus three missing attributes.
        assert_eq!(diagnostics.len(), 4);
    }
}
