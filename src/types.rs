//! Plan, import and metadata types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::server::encode;

/// One attribute difference in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Dotted path to the attribute that changed (e.g. `auth.client_id`).
    pub path: String,
    /// The value before the change, `None` when creating.
    pub before: Option<Value>,
    /// The value after the change, `None` when deleting.
    pub after: Option<Value>,
}

impl AttributeChange {
    /// `path` goes from null to `value`.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(value),
        }
    }

    /// `path` goes from `value` to null.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(value),
            after: None,
        }
    }

    /// `path` goes from `before` to `after`.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: change.before.as_ref().map(encode).unwrap_or_default(),
            after: change.after.as_ref().map(encode).unwrap_or_default(),
        }
    }
}

/// Planned state and the differences from the prior state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State expected after apply; null for a destroy.
    pub planned_state: Value,
    /// Differences by attribute path.
    pub changes: Vec<AttributeChange>,
    /// Set when a force-new attribute changed.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Nothing to apply.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// A plan with the given differences.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// State of type `resource_type`.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Type names and capabilities reported by `GetMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource types, sorted.
    pub resources: Vec<String>,
    /// Data source types, sorted.
    pub data_sources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// The provider is asked to plan destroys.
    pub plan_destroy: bool,
}

/// Protocol version announced in the handshake line.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix written to stdout on startup.
pub const HANDSHAKE_PREFIX: &str = "AZUREML_PROVIDER";
