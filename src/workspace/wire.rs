//! JSON bodies of the Azure Resource Manager datastore API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{CredentialsType, Datastore, DatastoreAuth, StorageType, SystemData};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatastoreResource {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    pub properties: DatastoreProperties,
    #[serde(default, skip_serializing)]
    pub system_data: Option<WireSystemData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatastoreProperties {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub contents: DatastoreContents,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatastoreContents {
    pub contents_type: StorageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub credentials: Credentials,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Credentials {
    pub credentials_type: CredentialsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// SQL login name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Secrets {
    pub secrets_type: CredentialsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct WireSystemData {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_by_type: Option<String>,
    #[serde(default)]
    pub last_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
    #[serde(default)]
    pub last_modified_by_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DatastoreList {
    #[serde(default)]
    pub value: Vec<DatastoreResource>,
    #[serde(default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl From<&Datastore> for DatastoreResource {
    fn from(datastore: &Datastore) -> Self {
        let auth = &datastore.auth;
        Self {
            id: None,
            name: None,
            properties: DatastoreProperties {
                description: Some(datastore.description.clone()),
                is_default: datastore.is_default,
                contents: DatastoreContents {
                    contents_type: datastore.storage_type,
                    account_name: datastore.storage_account_name.clone(),
                    container_name: datastore.storage_container_name.clone(),
                    credentials: Credentials {
                        credentials_type: auth.credentials_type,
                        client_id: auth.client_id.clone(),
                        tenant_id: auth.tenant_id.clone(),
                        user_id: auth.sql_user_name.clone(),
                        secrets: secrets_for(auth),
                    },
                },
            },
            system_data: None,
        }
    }
}

/// The secret payload matching the credentials type, if any secret is set.
fn secrets_for(auth: &DatastoreAuth) -> Option<Secrets> {
    let mut secrets = Secrets {
        secrets_type: auth.credentials_type,
        key: None,
        client_secret: None,
        password: None,
    };
    match auth.credentials_type {
        CredentialsType::AccountKey => secrets.key = auth.account_key.clone(),
        CredentialsType::ServicePrincipal => secrets.client_secret = auth.client_secret.clone(),
        CredentialsType::SqlAdmin => secrets.password = auth.sql_user_password.clone(),
        CredentialsType::Certificate | CredentialsType::None | CredentialsType::Sas => {}
    }

    if secrets.key.is_none() && secrets.client_secret.is_none() && secrets.password.is_none() {
        None
    } else {
        Some(secrets)
    }
}

impl From<DatastoreResource> for Datastore {
    fn from(resource: DatastoreResource) -> Self {
        let DatastoreResource {
            id,
            name,
            properties,
            system_data,
        } = resource;
        let contents = properties.contents;
        let credentials = contents.credentials;
        let secrets = credentials.secrets;
        let system_data = system_data.unwrap_or_default();

        Datastore {
            id: id.unwrap_or_default(),
            name: name.unwrap_or_default(),
            description: properties.description.unwrap_or_default(),
            is_default: properties.is_default,
            storage_type: contents.contents_type,
            storage_account_name: non_empty(contents.account_name),
            storage_container_name: non_empty(contents.container_name),
            auth: DatastoreAuth {
                credentials_type: credentials.credentials_type,
                tenant_id: credentials.tenant_id,
                client_id: credentials.client_id,
                client_secret: secrets.as_ref().and_then(|s| s.client_secret.clone()),
                account_key: secrets.as_ref().and_then(|s| s.key.clone()),
                sql_user_name: credentials.user_id,
                sql_user_password: secrets.and_then(|s| s.password),
            },
            system_data: SystemData {
                creation_date: system_data.created_at,
                creation_user: system_data.created_by.unwrap_or_default(),
                creation_user_type: system_data.created_by_type.unwrap_or_default(),
                last_modified_date: system_data.last_modified_at,
                last_modified_user: system_data.last_modified_by.unwrap_or_default(),
                last_modified_user_type: system_data.last_modified_by_type.unwrap_or_default(),
            },
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blob_datastore() -> Datastore {
        Datastore {
            id: String::new(),
            name: "blobstore".to_string(),
            description: "training data".to_string(),
            is_default: false,
            storage_type: StorageType::AzureBlob,
            storage_account_name: Some("mlstorage01".to_string()),
            storage_container_name: Some("datasets".to_string()),
            auth: DatastoreAuth {
                account_key: Some("c2VjcmV0".to_string()),
                ..DatastoreAuth::new(CredentialsType::AccountKey)
            },
            system_data: SystemData::default(),
        }
    }

    #[test]
    fn test_request_body_carries_account_key() {
        let body = serde_json::to_value(DatastoreResource::from(&blob_datastore())).unwrap();

        assert_eq!(
            body,
            json!({
                "properties": {
                    "description": "training data",
                    "isDefault": false,
                    "contents": {
                        "contentsType": "AzureBlob",
                        "accountName": "mlstorage01",
                        "containerName": "datasets",
                        "credentials": {
                            "credentialsType": "AccountKey",
                            "secrets": {"secretsType": "AccountKey", "key": "c2VjcmV0"}
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_request_body_service_principal() {
        let mut datastore = blob_datastore();
        datastore.auth = DatastoreAuth {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("app".to_string()),
            client_secret: Some("sp-secret".to_string()),
            // Not relevant for a service principal and must not be sent.
            account_key: Some("ignored".to_string()),
            ..DatastoreAuth::new(CredentialsType::ServicePrincipal)
        };

        let body = serde_json::to_value(DatastoreResource::from(&datastore)).unwrap();
        let credentials = &body["properties"]["contents"]["credentials"];
        assert_eq!(credentials["clientId"], "app");
        assert_eq!(credentials["tenantId"], "tenant");
        assert_eq!(
            credentials["secrets"],
            json!({"secretsType": "ServicePrincipal", "clientSecret": "sp-secret"})
        );
    }

    #[test]
    fn test_request_body_without_secrets() {
        let mut datastore = blob_datastore();
        datastore.auth = DatastoreAuth::new(CredentialsType::None);

        let body = serde_json::to_value(DatastoreResource::from(&datastore)).unwrap();
        assert!(body["properties"]["contents"]["credentials"]
            .get("secrets")
            .is_none());
    }

    #[test]
    fn test_response_decodes_without_secrets() {
        let response = json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.MachineLearningServices/workspaces/ws/datastores/sqlstore",
            "name": "sqlstore",
            "type": "Microsoft.MachineLearningServices/workspaces/datastores",
            "properties": {
                "isDefault": true,
                "contents": {
                    "contentsType": "AzureSqlDatabase",
                    "accountName": "",
                    "credentials": {"credentialsType": "SqlAdmin", "userId": "admin"}
                }
            },
            "systemData": {
                "createdAt": "2021-10-05T09:30:00Z",
                "createdBy": "someone@example.com",
                "createdByType": "User",
                "lastModifiedAt": "2021-10-06T10:00:00Z",
                "lastModifiedBy": "app",
                "lastModifiedByType": "Application"
            }
        });

        let resource: DatastoreResource = serde_json::from_value(response).unwrap();
        let datastore = Datastore::from(resource);

        assert_eq!(datastore.name, "sqlstore");
        assert!(datastore.is_default);
        assert_eq!(datastore.description, "");
        assert_eq!(datastore.storage_type, StorageType::AzureSqlDatabase);
        assert_eq!(datastore.storage_account_name, None);
        assert_eq!(datastore.auth.sql_user_name.as_deref(), Some("admin"));
        assert_eq!(datastore.auth.sql_user_password, None);
        assert_eq!(datastore.system_data.creation_user_type, "User");
        assert_eq!(datastore.system_data.last_modified_user, "app");
        assert!(datastore.system_data.creation_date.is_some());
    }

    #[test]
    fn test_error_envelope() {
        let envelope: ErrorEnvelope = serde_json::from_value(json!({
            "error": {"code": "UserError", "message": "Datastore name is invalid"}
        }))
        .unwrap();
        assert_eq!(envelope.error.code, "UserError");
        assert_eq!(envelope.error.message, "Datastore name is invalid");
    }
}
