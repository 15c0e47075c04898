//! Azure Machine Learning provider
//!
//! A provider plugin that manages the datastores of Azure Machine Learning
//! workspaces. It speaks the provider gRPC protocol and talks to Azure
//! Resource Manager on behalf of the host.
//!
//! # Overview
//!
//! - **`azureml_datastore` resource**: create, read, update, delete and
//!   import of a datastore; secrets are kept in state because the API never
//!   returns them
//! - **`azureml_datastore` / `azureml_datastores` data sources**: read-only
//!   views of one or all datastores of a workspace
//! - **Workspace client**: the [`workspace::WorkspaceClient`] trait and its
//!   REST implementation
//! - **Testing**: an in-memory workspace and a provider harness in [`testing`]
//!
//! # Running
//!
//! ```ignore
//! use azureml_provider::{init_logging, serve, AzureMlProvider, ServeOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging("info");
//!     serve(AzureMlProvider::new(), ServeOptions::new()).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! Once listening, [`serve`] prints a single line to stdout:
//!
//! ```text
//! AZUREML_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `AZUREML_PROVIDER|<protocol_version>|<address>`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod datastore;
pub mod error;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;
pub mod workspace;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, try_init_logging};
pub use provider::AzureMlProvider;
pub use schema::ProviderSchema;
pub use server::{serve, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{validate, validate_result};

pub use async_trait::async_trait;
