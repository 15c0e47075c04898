//! The `azureml_datastore` resource and the datastore data sources.
//!
//! State travels as JSON; the structs here give it a shape and carry the
//! rules for turning a [`Datastore`] returned by the API back into state.

pub mod data_source;
pub mod resource;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::AttributeType;
use crate::workspace::{
    redacted, CredentialsType, Datastore, DatastoreAuth, StorageType, SystemData,
};

/// Render a timestamp the way it is stored in state (RFC 1123, UTC).
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S UTC").to_string()
}

/// Type of the computed `system_data` attribute.
pub fn system_data_type() -> AttributeType {
    AttributeType::object([
        ("creation_date", AttributeType::String),
        ("creation_user", AttributeType::String),
        ("creation_user_type", AttributeType::String),
        ("last_modified_date", AttributeType::String),
        ("last_modified_user", AttributeType::String),
        ("last_modified_user_type", AttributeType::String),
    ])
}

/// Audit metadata as stored in state.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDataState {
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub creation_user: String,
    #[serde(default)]
    pub creation_user_type: String,
    #[serde(default)]
    pub last_modified_date: Option<String>,
    #[serde(default)]
    pub last_modified_user: String,
    #[serde(default)]
    pub last_modified_user_type: String,
}

impl From<&SystemData> for SystemDataState {
    fn from(system_data: &SystemData) -> Self {
        Self {
            creation_date: system_data.creation_date.as_ref().map(format_timestamp),
            creation_user: system_data.creation_user.clone(),
            creation_user_type: system_data.creation_user_type.clone(),
            last_modified_date: system_data.last_modified_date.as_ref().map(format_timestamp),
            last_modified_user: system_data.last_modified_user.clone(),
            last_modified_user_type: system_data.last_modified_user_type.clone(),
        }
    }
}

/// The `auth` block.
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub credentials_type: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default)]
    pub sql_user_name: Option<String>,
    #[serde(default)]
    pub sql_user_password: Option<String>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("credentials_type", &self.credentials_type)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("account_key", &redacted(&self.account_key))
            .field("sql_user_name", &self.sql_user_name)
            .field("sql_user_password", &redacted(&self.sql_user_password))
            .finish()
    }
}

/// State of an `azureml_datastore` resource.
///
/// Fields mirror the resource schema attributes.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreState {
    pub resource_group_name: String,
    pub workspace_name: String,
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
    pub storage_type: String,
    #[serde(default)]
    pub storage_account_name: Option<String>,
    #[serde(default)]
    pub storage_container_name: Option<String>,
    #[serde(default)]
    pub system_data: Option<SystemDataState>,
    pub auth: AuthState,
}

impl DatastoreState {
    /// Parse state or configuration JSON.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        Ok(Self::deserialize(value)?)
    }

    /// Render as state JSON.
    pub fn to_value(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }

    /// The request body for the workspace API.
    pub fn to_datastore(&self) -> Result<Datastore, ProviderError> {
        let storage_type = self
            .storage_type
            .parse::<StorageType>()
            .map_err(|e| ProviderError::Validation(e.to_string()))?;
        let credentials_type = self
            .auth
            .credentials_type
            .parse::<CredentialsType>()
            .map_err(|e| ProviderError::Validation(e.to_string()))?;

        Ok(Datastore {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            is_default: self.is_default.unwrap_or(false),
            storage_type,
            storage_account_name: self.storage_account_name.clone(),
            storage_container_name: self.storage_container_name.clone(),
            auth: DatastoreAuth {
                credentials_type,
                tenant_id: self.auth.tenant_id.clone(),
                client_id: self.auth.client_id.clone(),
                client_secret: self.auth.client_secret.clone(),
                account_key: self.auth.account_key.clone(),
                sql_user_name: self.auth.sql_user_name.clone(),
                sql_user_password: self.auth.sql_user_password.clone(),
            },
            system_data: SystemData::default(),
        })
    }

    /// State after refreshing from `remote`.
    ///
    /// The API never returns secrets, so those are kept from `self`. The
    /// optional identity fields are only tracked when `self` already tracks
    /// them.
    pub fn merge_remote(&self, remote: Datastore) -> Self {
        let auth = &self.auth;
        Self {
            resource_group_name: self.resource_group_name.clone(),
            workspace_name: self.workspace_name.clone(),
            name: non_empty(remote.name).unwrap_or_else(|| self.name.clone()),
            id: non_empty(remote.id).or_else(|| self.id.clone()),
            description: Some(remote.description),
            is_default: Some(remote.is_default),
            storage_type: remote.storage_type.to_string(),
            storage_account_name: remote.storage_account_name,
            storage_container_name: remote.storage_container_name,
            system_data: Some(SystemDataState::from(&remote.system_data)),
            auth: AuthState {
                credentials_type: remote.auth.credentials_type.to_string(),
                tenant_id: auth.tenant_id.as_ref().and(remote.auth.tenant_id),
                client_id: auth.client_id.as_ref().and(remote.auth.client_id),
                client_secret: auth.client_secret.clone(),
                account_key: auth.account_key.clone(),
                sql_user_name: auth.sql_user_name.as_ref().and(remote.auth.sql_user_name),
                sql_user_password: auth.sql_user_password.clone(),
            },
        }
    }

    /// State built from the API alone; secrets are unknown and left null.
    pub fn from_remote(resource_group_name: &str, workspace_name: &str, remote: Datastore) -> Self {
        Self {
            resource_group_name: resource_group_name.to_string(),
            workspace_name: workspace_name.to_string(),
            name: remote.name,
            id: non_empty(remote.id),
            description: Some(remote.description),
            is_default: Some(remote.is_default),
            storage_type: remote.storage_type.to_string(),
            storage_account_name: remote.storage_account_name,
            storage_container_name: remote.storage_container_name,
            system_data: Some(SystemDataState::from(&remote.system_data)),
            auth: AuthState {
                credentials_type: remote.auth.credentials_type.to_string(),
                tenant_id: remote.auth.tenant_id,
                client_id: remote.auth.client_id,
                client_secret: None,
                account_key: None,
                sql_user_name: remote.auth.sql_user_name,
                sql_user_password: None,
            },
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The Azure Resource Manager ID of a datastore.
///
/// `/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.MachineLearningServices/workspaces/{workspace}/datastores/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreId {
    /// Subscription ID.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Workspace name.
    pub workspace: String,
    /// Datastore name.
    pub name: String,
}

const PROVIDER_NAMESPACE: &str = "Microsoft.MachineLearningServices";

impl DatastoreId {
    /// Build an ID from its parts.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        workspace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            workspace: workspace.into(),
            name: name.into(),
        }
    }

    /// The ID of the workspace's datastore collection.
    pub fn collection(subscription_id: &str, resource_group: &str, workspace: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/workspaces/{}/datastores",
            subscription_id, resource_group, PROVIDER_NAMESPACE, workspace
        )
    }
}

impl fmt::Display for DatastoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            Self::collection(&self.subscription_id, &self.resource_group, &self.workspace),
            self.name
        )
    }
}

impl FromStr for DatastoreId {
    type Err = ProviderError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ProviderError::InvalidRequest(format!(
                "invalid datastore ID {:?}, expected /subscriptions/{{subscription}}/resourceGroups/{{group}}/providers/{}/workspaces/{{workspace}}/datastores/{{name}}",
                id, PROVIDER_NAMESPACE
            ))
        };

        let path = id.strip_prefix('/').ok_or_else(invalid)?;
        let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        let [subscriptions, subscription_id, resource_groups, resource_group, providers, namespace, workspaces, workspace, datastores, name] =
            segments.as_slice()
        else {
            return Err(invalid());
        };

        // ARM treats the fixed segments case-insensitively.
        let keys_match = [
            (subscriptions, "subscriptions"),
            (resource_groups, "resourceGroups"),
            (providers, "providers"),
            (namespace, PROVIDER_NAMESPACE),
            (workspaces, "workspaces"),
            (datastores, "datastores"),
        ]
        .iter()
        .all(|(segment, key)| segment.eq_ignore_ascii_case(key));
        let values_present = [subscription_id, resource_group, workspace, name]
            .iter()
            .all(|value| !value.is_empty());

        if !keys_match || !values_present {
            return Err(invalid());
        }

        Ok(Self::new(*subscription_id, *resource_group, *workspace, *name))
    }
}
