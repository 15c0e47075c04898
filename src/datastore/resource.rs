//! The `azureml_datastore` resource.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{system_data_type, DatastoreId, DatastoreState};
use crate::error::ProviderError;
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation::{validate, validate_result, Validator};
use crate::workspace::{CredentialsType, StorageType, WorkspaceClient};

/// Type name of the resource.
pub const RESOURCE_TYPE: &str = "azureml_datastore";

/// Schema of the resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("A datastore registered in an Azure Machine Learning workspace.")
        .with_attribute(
            "resource_group_name",
            Attribute::required_string()
                .with_description("Resource group of the workspace.")
                .with_force_new()
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "workspace_name",
            Attribute::required_string()
                .with_description("Name of the workspace.")
                .with_force_new()
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_description("Name of the datastore.")
                .with_force_new()
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Resource Manager ID of the datastore."),
        )
        .with_attribute(
            "description",
            Attribute::optional_string().with_default(json!("")),
        )
        .with_attribute(
            "is_default",
            Attribute::optional_bool()
                .with_description("Whether this is the default datastore of the workspace.")
                .with_default(json!(false)),
        )
        .with_attribute(
            "storage_type",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::one_of(StorageType::names())),
        )
        .with_attribute(
            "storage_account_name",
            Attribute::optional_string()
                .with_force_new()
                .with_validator(Validator::StorageAccountName),
        )
        .with_attribute(
            "storage_container_name",
            Attribute::optional_string()
                .with_force_new()
                .with_validator(Validator::StringNotEmpty),
        )
        .with_attribute(
            "system_data",
            Attribute::computed(system_data_type()).with_description("Audit metadata."),
        )
        .with_block("auth", NestedBlock::required(auth_block()))
}

fn auth_block() -> Block {
    Block::new()
        .with_description("Credentials the workspace uses to reach the storage.")
        .with_attribute(
            "credentials_type",
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::one_of(CredentialsType::names())),
        )
        .with_attribute("tenant_id", Attribute::optional_string())
        .with_attribute("client_id", Attribute::optional_string())
        .with_attribute("client_secret", Attribute::optional_string().sensitive())
        .with_attribute("account_key", Attribute::optional_string().sensitive())
        .with_attribute("sql_user_name", Attribute::optional_string())
        .with_attribute("sql_user_password", Attribute::optional_string().sensitive())
}

/// Check a configuration against the schema and its validators.
pub fn validate_config(config: &Value) -> Vec<Diagnostic> {
    validate(&schema(), config)
}

fn ensure_valid(value: &Value) -> Result<(), ProviderError> {
    validate_result(&schema(), value).map_err(ProviderError::Diagnostics)
}

/// Compute the planned state and the attribute changes.
///
/// A null `proposed` plans a destroy.
pub fn plan(prior: Option<Value>, proposed: Value) -> Result<PlanResult, ProviderError> {
    let schema = schema();

    if proposed.is_null() {
        return Ok(match prior {
            Some(prior) if !prior.is_null() => {
                let id = prior.get("id").cloned().unwrap_or(Value::Null);
                PlanResult::with_changes(Value::Null, vec![AttributeChange::removed("id", id)], false)
            }
            _ => PlanResult::no_change(Value::Null),
        });
    }

    let mut planned = proposed;
    schema.block.apply_defaults(&mut planned);
    let Some(fields) = planned.as_object_mut() else {
        return Err(ProviderError::InvalidRequest(
            "proposed state must be an object".to_string(),
        ));
    };

    // Computed attributes are unknown until create and stable afterwards.
    for computed in ["id", "system_data"] {
        let carried = prior
            .as_ref()
            .and_then(|p| p.get(computed))
            .cloned()
            .unwrap_or(Value::Null);
        fields.insert(computed.to_string(), carried);
    }

    let after = flatten(&schema.block, &planned);

    let Some(prior) = prior.filter(|p| !p.is_null()) else {
        let changes = after
            .into_iter()
            .filter(|(_, field)| !field.value.is_null())
            .map(|(path, field)| AttributeChange::added(path, field.value))
            .collect();
        return Ok(PlanResult::with_changes(planned, changes, false));
    };

    let before = flatten(&schema.block, &prior);
    let mut changes = Vec::new();
    let mut requires_replace = false;

    for (path, field) in after {
        let old = before
            .get(&path)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null);
        if old == field.value {
            continue;
        }

        requires_replace |= field.force_new;
        changes.push(match (old.is_null(), field.value.is_null()) {
            (true, _) => AttributeChange::added(path, field.value),
            (false, true) => AttributeChange::removed(path, old),
            (false, false) => AttributeChange::modified(path, old, field.value),
        });
    }

    if changes.is_empty() {
        return Ok(PlanResult::no_change(planned));
    }
    Ok(PlanResult::with_changes(planned, changes, requires_replace))
}

struct PlannedField {
    value: Value,
    force_new: bool,
}

/// Configurable attributes keyed by dotted path, nested blocks included.
fn flatten(block: &Block, value: &Value) -> BTreeMap<String, PlannedField> {
    let mut fields = BTreeMap::new();
    flatten_into(block, value, "", &mut fields);
    fields
}

fn flatten_into(
    block: &Block,
    value: &Value,
    prefix: &str,
    fields: &mut BTreeMap<String, PlannedField>,
) {
    for (name, attr) in &block.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        fields.insert(
            format!("{}{}", prefix, name),
            PlannedField {
                value: value.get(name).cloned().unwrap_or(Value::Null),
                force_new: attr.force_new,
            },
        );
    }

    for (name, nested) in &block.blocks {
        let inner = value.get(name).unwrap_or(&Value::Null);
        flatten_into(&nested.block, inner, &format!("{}{}.", prefix, name), fields);
    }
}

/// Create the datastore described by `planned`.
pub async fn create(client: &dyn WorkspaceClient, planned: Value) -> Result<Value, ProviderError> {
    ensure_valid(&planned)?;
    let state = DatastoreState::from_value(&planned)?;
    let datastore = state.to_datastore()?;
    info!(workspace = %state.workspace_name, name = %state.name, "creating datastore");

    let created = client
        .create_or_update_datastore(&state.resource_group_name, &state.workspace_name, &datastore)
        .await
        .map_err(|e| ProviderError::remote(format!("Error creating datastore {}", state.name), e))?;

    state.merge_remote(created).to_value()
}

/// Refresh `current` from the API.
pub async fn read(client: &dyn WorkspaceClient, current: Value) -> Result<Value, ProviderError> {
    let state = DatastoreState::from_value(&current)?;
    debug!(workspace = %state.workspace_name, name = %state.name, "reading datastore");

    let remote = client
        .get_datastore(&state.resource_group_name, &state.workspace_name, &state.name)
        .await
        .map_err(|e| ProviderError::remote(format!("Error reading datastore {}", state.name), e))?;

    state.merge_remote(remote).to_value()
}

/// Apply `planned` to an existing datastore.
pub async fn update(
    client: &dyn WorkspaceClient,
    prior: Value,
    planned: Value,
) -> Result<Value, ProviderError> {
    ensure_valid(&planned)?;
    let mut state = DatastoreState::from_value(&planned)?;
    if state.id.is_none() {
        state.id = prior.get("id").and_then(Value::as_str).map(str::to_string);
    }
    let datastore = state.to_datastore()?;
    info!(workspace = %state.workspace_name, name = %state.name, "updating datastore");

    let updated = client
        .create_or_update_datastore(&state.resource_group_name, &state.workspace_name, &datastore)
        .await
        .map_err(|e| ProviderError::remote(format!("Error updating datastore {}", state.name), e))?;

    state.merge_remote(updated).to_value()
}

/// Delete the datastore recorded in `current`.
pub async fn delete(client: &dyn WorkspaceClient, current: Value) -> Result<(), ProviderError> {
    let state = DatastoreState::from_value(&current)?;
    info!(workspace = %state.workspace_name, name = %state.name, "deleting datastore");

    client
        .delete_datastore(&state.resource_group_name, &state.workspace_name, &state.name)
        .await
        .map_err(|e| ProviderError::remote(format!("Error deleting datastore {}", state.name), e))
}

/// Import a datastore by its Resource Manager ID.
///
/// Secrets cannot be read back, so they are null in the imported state.
pub async fn import(
    client: &dyn WorkspaceClient,
    subscription_id: &str,
    id: &str,
) -> Result<Vec<ImportedResource>, ProviderError> {
    let id: DatastoreId = id.parse()?;
    if !id.subscription_id.eq_ignore_ascii_case(subscription_id) {
        return Err(ProviderError::InvalidRequest(format!(
            "datastore ID belongs to subscription {}, but the provider is configured for {}",
            id.subscription_id, subscription_id
        )));
    }
    info!(workspace = %id.workspace, name = %id.name, "importing datastore");

    let remote = client
        .get_datastore(&id.resource_group, &id.workspace, &id.name)
        .await
        .map_err(|e| ProviderError::remote(format!("Error reading datastore {}", id.name), e))?;

    let state = DatastoreState::from_remote(&id.resource_group, &id.workspace, remote);
    Ok(vec![ImportedResource::new(RESOURCE_TYPE, state.to_value()?)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Value {
        json!({
            "resource_group_name": "rg",
            "workspace_name": "ws",
            "name": "blobstore",
            "storage_type": "AzureBlob",
            "storage_account_name": "mlstorage01",
            "storage_container_name": "images",
            "auth": {"credentials_type": "AccountKey", "account_key": "a2V5"}
        })
    }

    fn change<'a>(plan: &'a PlanResult, path: &str) -> Option<&'a AttributeChange> {
        plan.changes.iter().find(|c| c.path == path)
    }

    #[test]
    fn test_schema_flags() {
        let schema = schema();
        let attrs = &schema.block.attributes;
        assert!(attrs["name"].force_new);
        assert!(attrs["storage_type"].force_new);
        assert!(!attrs["description"].force_new);
        assert!(attrs["id"].flags.is_computed_only());
        assert!(attrs["system_data"].flags.is_computed_only());

        let auth = &schema.block.blocks["auth"];
        assert!(auth.required);
        assert!(auth.block.attributes["account_key"].flags.sensitive);
        assert!(auth.block.attributes["credentials_type"].force_new);
        assert!(!auth.block.attributes["sql_user_name"].flags.sensitive);
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&config()).is_empty());

        let mut bad = config();
        bad["storage_type"] = json!("Ftp");
        bad["auth"]["credentials_type"] = json!("Password");
        bad["storage_account_name"] = json!("ml-storage");
        let diagnostics = validate_config(&bad);
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(
            attributes,
            vec!["storage_account_name", "storage_type", "auth.credentials_type"]
        );

        let mut missing = config();
        missing.as_object_mut().unwrap().remove("auth");
        let diagnostics = validate_config(&missing);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Missing required block 'auth'");
    }

    #[test]
    fn test_plan_create() {
        let plan = plan(None, config()).unwrap();

        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["description"], "");
        assert_eq!(plan.planned_state["is_default"], false);
        assert_eq!(plan.planned_state["id"], Value::Null);
        assert_eq!(plan.planned_state["system_data"], Value::Null);

        assert!(plan.changes.iter().all(|c| c.before.is_none()));
        assert_eq!(change(&plan, "name").unwrap().after, Some(json!("blobstore")));
        assert_eq!(
            change(&plan, "auth.credentials_type").unwrap().after,
            Some(json!("AccountKey"))
        );
        assert!(change(&plan, "auth.client_id").is_none());
        assert!(change(&plan, "id").is_none());
    }

    #[test]
    fn test_plan_update_in_place() {
        let prior = {
            let mut p = plan(None, config()).unwrap().planned_state;
            p["id"] = json!("/subscriptions/sub/resourceGroups/rg/providers/Microsoft.MachineLearningServices/workspaces/ws/datastores/blobstore");
            p["system_data"] = json!({"creation_user": "someone"});
            p
        };
        let mut proposed = config();
        proposed["description"] = json!("raw images");

        let plan = plan(Some(prior.clone()), proposed).unwrap();
        assert!(!plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(
            plan.changes[0],
            AttributeChange::modified("description", json!(""), json!("raw images"))
        );
        assert_eq!(plan.planned_state["id"], prior["id"]);
        assert_eq!(plan.planned_state["system_data"], prior["system_data"]);
    }

    #[test]
    fn test_plan_update_requires_replace() {
        let prior = plan(None, config()).unwrap().planned_state;

        let mut proposed = config();
        proposed["auth"]["credentials_type"] = json!("Sas");
        let plan = plan(Some(prior.clone()), proposed).unwrap();
        assert!(plan.requires_replace);
        assert!(change(&plan, "auth.credentials_type").is_some());

        let mut proposed = config();
        proposed["auth"]["client_secret"] = json!("new");
        let plan = super::plan(Some(prior), proposed).unwrap();
        assert!(!plan.requires_replace);
        assert_eq!(
            change(&plan, "auth.client_secret").unwrap().before,
            None
        );
    }

    #[test]
    fn test_plan_no_change() {
        let prior = plan(None, config()).unwrap().planned_state;
        let plan = plan(Some(prior), config()).unwrap();
        assert!(plan.changes.is_empty());
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_plan_delete() {
        let mut prior = config();
        prior["id"] = json!("/subscriptions/sub/datastores/blobstore");

        let plan = plan(Some(prior), Value::Null).unwrap();
        assert_eq!(plan.planned_state, Value::Null);
        assert_eq!(
            plan.changes,
            vec![AttributeChange::removed(
                "id",
                json!("/subscriptions/sub/datastores/blobstore")
            )]
        );
    }
}
