//! Testing utilities.
//!
//! [`FakeWorkspace`] is an in-memory [`WorkspaceClient`] that behaves like the
//! real API where it matters to the provider: it assigns IDs and audit
//! metadata and never returns secrets. [`ProviderTester`] drives a
//! [`ProviderService`] without a gRPC server.
//!
//! # Example
//!
//! ```ignore
//! use azureml_provider::testing::{FakeWorkspace, ProviderTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_datastore() {
//!     let fake = FakeWorkspace::shared("sub");
//!     let tester = ProviderTester::with_fake(fake.clone()).await;
//!
//!     let state = tester
//!         .lifecycle_create("azureml_datastore", json!({ /* ... */ }))
//!         .await
//!         .unwrap();
//!     assert!(state["id"].is_string());
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::datastore::DatastoreId;
use crate::error::ProviderError;
use crate::provider::AzureMlProvider;
use crate::schema::{Diagnostic, DiagnosticSeverity};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::workspace::{Datastore, SystemData, WorkspaceClient, WorkspaceError};

/// A call received by a [`FakeWorkspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceCall {
    /// `get_datastore(resource_group, workspace, name)`
    Get(String, String, String),
    /// `get_datastores(resource_group, workspace)`
    List(String, String),
    /// `create_or_update_datastore(resource_group, workspace, datastore)`,
    /// recorded with the datastore as sent.
    Put(String, String, Datastore),
    /// `delete_datastore(resource_group, workspace, name)`
    Delete(String, String, String),
}

type Key = (String, String, String);

#[derive(Default)]
struct FakeState {
    datastores: BTreeMap<Key, Datastore>,
    calls: Vec<WorkspaceCall>,
    failure: Option<(u16, String, String)>,
}

/// In-memory workspace for tests.
pub struct FakeWorkspace {
    subscription_id: String,
    state: Mutex<FakeState>,
}

impl FakeWorkspace {
    /// An empty workspace in the given subscription.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// [`FakeWorkspace::new`] behind an `Arc`, ready to hand to a provider.
    pub fn shared(subscription_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(subscription_id))
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a datastore as if it had been created out of band.
    pub fn insert(&self, resource_group: &str, workspace: &str, datastore: Datastore) -> Datastore {
        self.store(resource_group, workspace, datastore)
    }

    /// The stored datastore, secrets included only if they were never sent.
    pub fn get(&self, resource_group: &str, workspace: &str, name: &str) -> Option<Datastore> {
        self.lock()
            .datastores
            .get(&key(resource_group, workspace, name))
            .cloned()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<WorkspaceCall> {
        self.lock().calls.clone()
    }

    /// Make the next call fail with an API error.
    pub fn fail_next(&self, status: u16, code: &str, message: &str) {
        self.lock().failure = Some((status, code.to_string(), message.to_string()));
    }

    fn record(&self, call: WorkspaceCall) -> Result<(), WorkspaceError> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failure.take() {
            Some((status, code, message)) => Err(WorkspaceError::Api {
                status,
                code,
                message,
            }),
            None => Ok(()),
        }
    }

    fn store(&self, resource_group: &str, workspace: &str, mut datastore: Datastore) -> Datastore {
        let mut state = self.lock();
        let key = key(resource_group, workspace, &datastore.name);
        let now = Utc::now();

        datastore.id =
            DatastoreId::new(&self.subscription_id, resource_group, workspace, &datastore.name)
                .to_string();
        // The service does not keep secrets readable.
        datastore.auth = datastore.auth.without_secrets();
        datastore.system_data = match state.datastores.get(&key) {
            Some(existing) => SystemData {
                last_modified_date: Some(now),
                last_modified_user: "fake@example.com".to_string(),
                last_modified_user_type: "User".to_string(),
                ..existing.system_data.clone()
            },
            None => SystemData {
                creation_date: Some(now),
                creation_user: "fake@example.com".to_string(),
                creation_user_type: "User".to_string(),
                last_modified_date: Some(now),
                last_modified_user: "fake@example.com".to_string(),
                last_modified_user_type: "User".to_string(),
            },
        };

        state.datastores.insert(key, datastore.clone());
        datastore
    }
}

fn key(resource_group: &str, workspace: &str, name: &str) -> Key {
    (
        resource_group.to_string(),
        workspace.to_string(),
        name.to_string(),
    )
}

#[async_trait]
impl WorkspaceClient for FakeWorkspace {
    async fn get_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<Datastore, WorkspaceError> {
        self.record(WorkspaceCall::Get(
            resource_group.to_string(),
            workspace.to_string(),
            name.to_string(),
        ))?;
        self.get(resource_group, workspace, name)
            .ok_or_else(|| WorkspaceError::NotFound(format!("datastore {name}")))
    }

    async fn get_datastores(
        &self,
        resource_group: &str,
        workspace: &str,
    ) -> Result<Vec<Datastore>, WorkspaceError> {
        self.record(WorkspaceCall::List(
            resource_group.to_string(),
            workspace.to_string(),
        ))?;
        Ok(self
            .lock()
            .datastores
            .iter()
            .filter(|((rg, ws, _), _)| rg == resource_group && ws == workspace)
            .map(|(_, datastore)| datastore.clone())
            .collect())
    }

    async fn create_or_update_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        datastore: &Datastore,
    ) -> Result<Datastore, WorkspaceError> {
        self.record(WorkspaceCall::Put(
            resource_group.to_string(),
            workspace.to_string(),
            datastore.clone(),
        ))?;
        Ok(self.store(resource_group, workspace, datastore.clone()))
    }

    async fn delete_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<(), WorkspaceError> {
        self.record(WorkspaceCall::Delete(
            resource_group.to_string(),
            workspace.to_string(),
            name.to_string(),
        ))?;
        self.lock()
            .datastores
            .remove(&key(resource_group, workspace, name))
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::NotFound(format!("datastore {name}")))
    }
}

/// A test harness for provider implementations.
///
/// Wraps a [`ProviderService`] and exposes its operations without a gRPC
/// server, plus lifecycle helpers that chain them the way the host does.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Refresh a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run plan → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let plan_result = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        assert!(
            plan_result.planned_state.is_null(),
            "Expected a destroy plan to have null planned state"
        );
        self.delete(resource_type, current_state).await
    }
}

impl ProviderTester<AzureMlProvider> {
    /// A provider configured against `fake`.
    ///
    /// # Panics
    ///
    /// Panics if configuration fails.
    pub async fn with_fake(fake: Arc<FakeWorkspace>) -> Self {
        let subscription_id = fake.subscription_id.clone();
        let tester = Self::new(AzureMlProvider::with_client_factory(move |_| {
            Ok(Arc::clone(&fake) as Arc<dyn WorkspaceClient>)
        }));

        let configured = tester
            .configure(json!({
                "client_id": "00000000-0000-0000-0000-000000000001",
                "client_secret": "test-secret",
                "tenant_id": "00000000-0000-0000-0000-000000000002",
                "subscription_id": subscription_id,
            }))
            .await;
        if let Err(e) = configured {
            panic!("Failed to configure provider against the fake workspace: {e}");
        }
        tester
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        plan.changes.iter().all(|c| c.before.is_none()),
        "Expected every change of a create plan to be an addition"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates the resource in place.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that an error renders to a single error diagnostic with the given
/// summary, returning its detail.
///
/// # Panics
///
/// Panics if the summary differs or there is not exactly one diagnostic.
pub fn assert_error_summary(err: ProviderError, summary: &str) -> String {
    let diagnostics = err.into_diagnostics();
    assert_eq!(
        diagnostics.len(),
        1,
        "Expected a single diagnostic, got {:?}",
        diagnostics
    );
    let diagnostic = &diagnostics[0];
    assert!(
        matches!(diagnostic.severity, DiagnosticSeverity::Error),
        "Expected an error diagnostic"
    );
    assert_eq!(diagnostic.summary, summary);
    diagnostic.detail.clone().unwrap_or_default()
}

/// Assert that diagnostics contain an error on the attribute at `path`.
///
/// # Panics
///
/// Panics if no error diagnostic points at `path`.
pub fn assert_error_on_attribute(diagnostics: &[Diagnostic], path: &str) {
    let found = diagnostics
        .iter()
        .any(|d| d.is_error() && d.attribute.as_deref() == Some(path));
    assert!(
        found,
        "Expected an error on '{}', but got errors on {:?}",
        path,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.attribute)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{CredentialsType, DatastoreAuth, StorageType};

    fn datastore(name: &str) -> Datastore {
        Datastore {
            id: String::new(),
            name: name.to_string(),
            description: String::new(),
            is_default: false,
            storage_type: StorageType::AzureFile,
            storage_account_name: Some("mlstorage01".to_string()),
            storage_container_name: Some("share".to_string()),
            auth: DatastoreAuth {
                account_key: Some("a2V5".to_string()),
                ..DatastoreAuth::new(CredentialsType::AccountKey)
            },
            system_data: SystemData::default(),
        }
    }

    #[tokio::test]
    async fn test_fake_strips_secrets_and_assigns_metadata() {
        let fake = FakeWorkspace::new("sub");
        let created = fake
            .create_or_update_datastore("rg", "ws", &datastore("files"))
            .await
            .unwrap();

        assert_eq!(
            created.id,
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.MachineLearningServices/workspaces/ws/datastores/files"
        );
        assert_eq!(created.auth.account_key, None);
        assert_eq!(created.system_data.creation_user_type, "User");
        assert!(created.system_data.creation_date.is_some());

        // The request itself carried the key.
        match &fake.calls()[0] {
            WorkspaceCall::Put(_, _, sent) => assert_eq!(sent.auth.account_key.as_deref(), Some("a2V5")),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fake_update_keeps_creation_data() {
        let fake = FakeWorkspace::new("sub");
        let first = fake.insert("rg", "ws", datastore("files"));

        let mut changed = datastore("files");
        changed.description = "shared files".to_string();
        let second = fake
            .create_or_update_datastore("rg", "ws", &changed)
            .await
            .unwrap();

        assert_eq!(second.system_data.creation_date, first.system_data.creation_date);
        assert_eq!(second.description, "shared files");
    }

    #[tokio::test]
    async fn test_fake_list_and_delete() {
        let fake = FakeWorkspace::new("sub");
        fake.insert("rg", "ws", datastore("a"));
        fake.insert("rg", "ws", datastore("b"));
        fake.insert("rg", "other", datastore("c"));

        let listed = fake.get_datastores("rg", "ws").await.unwrap();
        assert_eq!(
            listed.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        fake.delete_datastore("rg", "ws", "a").await.unwrap();
        assert!(fake.get("rg", "ws", "a").is_none());
        assert!(matches!(
            fake.delete_datastore("rg", "ws", "a").await,
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fake_fail_next() {
        let fake = FakeWorkspace::new("sub");
        fake.fail_next(409, "Conflict", "datastore is in use");

        let err = fake.get_datastores("rg", "ws").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "api returned 409 (Conflict): datastore is in use"
        );
        // Only the next call fails.
        assert!(fake.get_datastores("rg", "ws").await.is_ok());
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_tester_with_fake_is_configured() {
        let tester = ProviderTester::with_fake(FakeWorkspace::shared("sub")).await;
        let state = tester
            .read_data_source(
                "azureml_datastores",
                json!({"resource_group_name": "rg", "workspace_name": "ws"}),
            )
            .await
            .unwrap();
        assert_eq!(state["datastores"], json!([]));
    }

    #[test]
    fn test_assert_error_summary() {
        let detail = assert_error_summary(
            ProviderError::remote("Error deleting datastore files", "not found: datastore files"),
            "Error deleting datastore files",
        );
        assert_eq!(detail, "not found: datastore files");
    }

    #[test]
    #[should_panic(expected = "Expected an error on 'name'")]
    fn test_assert_error_on_attribute_fails() {
        assert_error_on_attribute(&[Diagnostic::error("bad").with_attribute("storage_type")], "name");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![Diagnostic::error("Unable to create client")
            .with_detail("tenant not found")
            .with_attribute("tenant_id")]);
        let rendered = err.to_string();
        assert!(rendered.contains("1 diagnostic(s)"));
        assert!(rendered.contains("Unable to create client: tenant not found (at tenant_id)"));
    }
}
