//! Azure ML workspace client.
//!
//! The provider talks to the workspace through the [`WorkspaceClient`] trait.
//! [`Workspace`] implements it against the Azure Resource Manager REST API;
//! tests substitute an in-memory implementation.

mod client;
#[allow(missing_docs)]
mod model;
mod wire;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{Workspace, WorkspaceConfig, DEFAULT_AUTHORITY_HOST, DEFAULT_MANAGEMENT_ENDPOINT};
pub use model::{
    CredentialsType, Datastore, DatastoreAuth, StorageType, SystemData, UnknownVariant,
};
pub(crate) use model::redacted;

/// Errors returned by the workspace client.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The datastore (or workspace) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API rejected the request.
    #[error("api returned {status} ({code}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// ARM error code.
        code: String,
        /// ARM error message.
        message: String,
    },

    /// A token could not be obtained for the configured service principal.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The request could not be sent or its body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("unable to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client configuration is unusable.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Operations on the datastores of a workspace.
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Fetch a single datastore by name.
    async fn get_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<Datastore, WorkspaceError>;

    /// List every datastore of the workspace.
    async fn get_datastores(
        &self,
        resource_group: &str,
        workspace: &str,
    ) -> Result<Vec<Datastore>, WorkspaceError>;

    /// Create the datastore, or replace it if one with the same name exists.
    async fn create_or_update_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        datastore: &Datastore,
    ) -> Result<Datastore, WorkspaceError>;

    /// Delete a datastore by name.
    async fn delete_datastore(
        &self,
        resource_group: &str,
        workspace: &str,
        name: &str,
    ) -> Result<(), WorkspaceError>;
}
