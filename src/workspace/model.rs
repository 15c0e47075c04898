//! Datastore data model of the workspace API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of storage a datastore is linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    AzureFile,
    AzureBlob,
    AzureDataLakeGen1,
    AzureDataLakeGen2,
    AzureMySql,
    AzurePostgreSql,
    AzureSqlDatabase,
    GlusterFs,
}

impl StorageType {
    /// Every accepted storage type, in display order.
    pub const ALL: [StorageType; 8] = [
        StorageType::AzureFile,
        StorageType::AzureBlob,
        StorageType::AzureDataLakeGen1,
        StorageType::AzureDataLakeGen2,
        StorageType::AzureMySql,
        StorageType::AzurePostgreSql,
        StorageType::AzureSqlDatabase,
        StorageType::GlusterFs,
    ];

    /// The wire name of the storage type.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::AzureFile => "AzureFile",
            StorageType::AzureBlob => "AzureBlob",
            StorageType::AzureDataLakeGen1 => "AzureDataLakeGen1",
            StorageType::AzureDataLakeGen2 => "AzureDataLakeGen2",
            StorageType::AzureMySql => "AzureMySql",
            StorageType::AzurePostgreSql => "AzurePostgreSql",
            StorageType::AzureSqlDatabase => "AzureSqlDatabase",
            StorageType::GlusterFs => "GlusterFs",
        }
    }

    /// Wire names of every accepted storage type.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(StorageType::as_str).collect()
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("storage type", s))
    }
}

/// How the workspace authenticates against the linked storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialsType {
    AccountKey,
    Certificate,
    None,
    Sas,
    ServicePrincipal,
    SqlAdmin,
}

impl CredentialsType {
    /// Every accepted credentials type, in display order.
    pub const ALL: [CredentialsType; 6] = [
        CredentialsType::AccountKey,
        CredentialsType::Certificate,
        CredentialsType::None,
        CredentialsType::Sas,
        CredentialsType::ServicePrincipal,
        CredentialsType::SqlAdmin,
    ];

    /// The wire name of the credentials type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialsType::AccountKey => "AccountKey",
            CredentialsType::Certificate => "Certificate",
            CredentialsType::None => "None",
            CredentialsType::Sas => "Sas",
            CredentialsType::ServicePrincipal => "ServicePrincipal",
            CredentialsType::SqlAdmin => "SqlAdmin",
        }
    }

    /// Wire names of every accepted credentials type.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(CredentialsType::as_str).collect()
    }
}

impl fmt::Display for CredentialsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialsType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("credentials type", s))
    }
}

/// A string that does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Credentials used by the workspace to reach the linked storage.
///
/// The secret fields are write-only: the API never returns them.
#[derive(Clone, PartialEq, Eq)]
pub struct DatastoreAuth {
    pub credentials_type: CredentialsType,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub account_key: Option<String>,
    pub sql_user_name: Option<String>,
    pub sql_user_password: Option<String>,
}

impl DatastoreAuth {
    /// Auth of the given type with every optional field unset.
    pub fn new(credentials_type: CredentialsType) -> Self {
        Self {
            credentials_type,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            account_key: None,
            sql_user_name: None,
            sql_user_password: None,
        }
    }

    /// A copy with the secret fields removed, as the API returns it.
    pub fn without_secrets(&self) -> Self {
        Self {
            client_secret: None,
            account_key: None,
            sql_user_password: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for DatastoreAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatastoreAuth")
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

pub(crate) fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

/// Audit metadata attached to a datastore by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemData {
    pub creation_date: Option<DateTime<Utc>>,
    pub creation_user: String,
    pub creation_user_type: String,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub last_modified_user: String,
    pub last_modified_user_type: String,
}

/// A named storage location registered in a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datastore {
    /// ARM resource ID; empty until the API assigns one.
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub storage_type: StorageType,
    pub storage_account_name: Option<String>,
    pub storage_container_name: Option<String>,
    pub auth: DatastoreAuth,
    pub system_data: SystemData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_names_round_trip() {
        for storage_type in StorageType::ALL {
            assert_eq!(storage_type.as_str().parse::<StorageType>(), Ok(storage_type));
        }
        assert_eq!(StorageType::names().len(), 8);
        assert_eq!(StorageType::AzureDataLakeGen2.to_string(), "AzureDataLakeGen2");
    }

    #[test]
    fn test_unknown_credentials_type() {
        let err = "Password".parse::<CredentialsType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown credentials type \"Password\"");
        assert_eq!("None".parse::<CredentialsType>(), Ok(CredentialsType::None));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&StorageType::AzurePostgreSql).unwrap(),
            r#""AzurePostgreSql""#
        );
        let parsed: CredentialsType = serde_json::from_str(r#""ServicePrincipal""#).unwrap();
        assert_eq!(parsed, CredentialsType::ServicePrincipal);
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let auth = DatastoreAuth {
            client_id: Some("app-id".to_string()),
            client_secret: Some("hunter2".to_string()),
            ..DatastoreAuth::new(CredentialsType::ServicePrincipal)
        };

        let debug = format!("{:?}", auth);
        assert!(debug.contains("app-id"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_without_secrets() {
        let auth = DatastoreAuth {
            account_key: Some("key".to_string()),
            sql_user_name: Some("admin".to_string()),
            sql_user_password: Some("pw".to_string()),
            ..DatastoreAuth::new(CredentialsType::SqlAdmin)
        };

        let stripped = auth.without_secrets();
        assert!(stripped.account_key.is_none());
        assert!(stripped.sql_user_password.is_none());
        assert_eq!(stripped.sql_user_name.as_deref(), Some("admin"));
    }
}
