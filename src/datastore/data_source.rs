//! The `azureml_datastore` and `azureml_datastores` data sources.
//!
//! Both are read-only views of the API and never carry secrets.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{system_data_type, DatastoreId, SystemDataState};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Schema};
use crate::validation::Validator;
use crate::workspace::{Datastore, WorkspaceClient};

/// Type name of the single-datastore data source.
pub const DATASTORE: &str = "azureml_datastore";

/// Type name of the datastore listing data source.
pub const DATASTORES: &str = "azureml_datastores";

fn lookup_attribute() -> Attribute {
    Attribute::required_string().with_validator(Validator::StringNotEmpty)
}

/// Schema of `azureml_datastore`.
pub fn datastore_schema() -> Schema {
    Schema::v0()
        .with_description("Look up a single datastore of a workspace.")
        .with_attribute("resource_group_name", lookup_attribute())
        .with_attribute("workspace_name", lookup_attribute())
        .with_attribute("name", lookup_attribute())
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("description", Attribute::computed_string())
        .with_attribute("is_default", Attribute::computed_bool())
        .with_attribute("storage_type", Attribute::computed_string())
        .with_attribute("storage_account_name", Attribute::computed_string())
        .with_attribute("storage_container_name", Attribute::computed_string())
        .with_attribute("credentials_type", Attribute::computed_string())
        .with_attribute("system_data", Attribute::computed(system_data_type()))
}

/// Schema of `azureml_datastores`.
pub fn datastores_schema() -> Schema {
    let item = AttributeType::object([
        ("resource_group_name", AttributeType::String),
        ("workspace_name", AttributeType::String),
        ("name", AttributeType::String),
        ("id", AttributeType::String),
        ("description", AttributeType::String),
        ("is_default", AttributeType::Bool),
        ("storage_type", AttributeType::String),
        ("storage_account_name", AttributeType::String),
        ("storage_container_name", AttributeType::String),
        ("credentials_type", AttributeType::String),
        ("system_data", system_data_type()),
    ]);

    Schema::v0()
        .with_description("List the datastores of a workspace.")
        .with_attribute("resource_group_name", lookup_attribute())
        .with_attribute("workspace_name", lookup_attribute())
        .with_attribute(
            "id",
            Attribute::computed_string()
                .with_description("Resource Manager ID of the workspace's datastore collection."),
        )
        .with_attribute("datastores", Attribute::computed(AttributeType::list(item)))
}

#[derive(Deserialize)]
struct DatastoreLookup {
    resource_group_name: String,
    workspace_name: String,
    name: String,
}

#[derive(Deserialize)]
struct DatastoresLookup {
    resource_group_name: String,
    workspace_name: String,
}

/// A datastore as exposed by the data sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct DatastoreView {
    resource_group_name: String,
    workspace_name: String,
    name: String,
    id: String,
    description: String,
    is_default: bool,
    storage_type: String,
    storage_account_name: Option<String>,
    storage_container_name: Option<String>,
    credentials_type: String,
    system_data: SystemDataState,
}

impl DatastoreView {
    fn new(resource_group_name: &str, workspace_name: &str, datastore: Datastore) -> Self {
        Self {
            resource_group_name: resource_group_name.to_string(),
            workspace_name: workspace_name.to_string(),
            system_data: SystemDataState::from(&datastore.system_data),
            name: datastore.name,
            id: datastore.id,
            description: datastore.description,
            is_default: datastore.is_default,
            storage_type: datastore.storage_type.to_string(),
            storage_account_name: datastore.storage_account_name,
            storage_container_name: datastore.storage_container_name,
            credentials_type: datastore.auth.credentials_type.to_string(),
        }
    }
}

#[derive(Serialize)]
struct DatastoresView {
    resource_group_name: String,
    workspace_name: String,
    id: String,
    datastores: Vec<DatastoreView>,
}

/// Read `azureml_datastore`.
pub async fn read_datastore(
    client: &dyn WorkspaceClient,
    config: Value,
) -> Result<Value, ProviderError> {
    let lookup = DatastoreLookup::deserialize(&config)?;
    debug!(workspace = %lookup.workspace_name, name = %lookup.name, "looking up datastore");

    let datastore = client
        .get_datastore(&lookup.resource_group_name, &lookup.workspace_name, &lookup.name)
        .await
        .map_err(|e| {
            ProviderError::remote(format!("Error retrieving datastore \"{}\"", lookup.name), e)
        })?;

    let view = DatastoreView::new(&lookup.resource_group_name, &lookup.workspace_name, datastore);
    Ok(serde_json::to_value(view)?)
}

/// Read `azureml_datastores`.
pub async fn read_datastores(
    client: &dyn WorkspaceClient,
    subscription_id: &str,
    config: Value,
) -> Result<Value, ProviderError> {
    let lookup = DatastoresLookup::deserialize(&config)?;
    debug!(workspace = %lookup.workspace_name, "listing datastores");

    let datastores = client
        .get_datastores(&lookup.resource_group_name, &lookup.workspace_name)
        .await
        .map_err(|e| ProviderError::remote("Error retrieving datastores.", e))?;

    let view = DatastoresView {
        id: DatastoreId::collection(
            subscription_id,
            &lookup.resource_group_name,
            &lookup.workspace_name,
        ),
        datastores: datastores
            .into_iter()
            .map(|d| DatastoreView::new(&lookup.resource_group_name, &lookup.workspace_name, d))
            .collect(),
        resource_group_name: lookup.resource_group_name,
        workspace_name: lookup.workspace_name,
    };
    Ok(serde_json::to_value(view)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;
    use crate::workspace::{CredentialsType, DatastoreAuth, StorageType, SystemData};
    use serde_json::json;

    #[test]
    fn test_schemas_have_no_secrets() {
        for schema in [datastore_schema(), datastores_schema()] {
            assert!(schema
                .block
                .attributes
                .values()
                .all(|attr| !attr.flags.sensitive));
            assert!(schema.block.blocks.is_empty());
        }
    }

    #[test]
    fn test_lookup_requires_names() {
        let diagnostics = validate(
            &datastore_schema(),
            &json!({"resource_group_name": "rg", "workspace_name": "", "name": null}),
        );
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attributes, vec!["name", "workspace_name"]);
    }

    #[test]
    fn test_view_drops_secrets() {
        let datastore = Datastore {
            id: "id".to_string(),
            name: "sqlstore".to_string(),
            description: String::new(),
            is_default: true,
            storage_type: StorageType::AzureSqlDatabase,
            storage_account_name: None,
            storage_container_name: None,
            auth: DatastoreAuth {
                sql_user_name: Some("admin".to_string()),
                sql_user_password: Some("pw".to_string()),
                ..DatastoreAuth::new(CredentialsType::SqlAdmin)
            },
            system_data: SystemData::default(),
        };

        let value = serde_json::to_value(DatastoreView::new("rg", "ws", datastore)).unwrap();
        assert_eq!(value["credentials_type"], "SqlAdmin");
        assert_eq!(value["storage_account_name"], Value::Null);
        assert_eq!(value["resource_group_name"], "rg");
        assert!(!value.to_string().contains("pw"));
    }
}
