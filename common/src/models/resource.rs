//! Resource configuration models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// Operations a resource may optionally implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceCapabilities {
    /// `POST /search`.
    pub search: bool,
    /// `POST /query` with status polling and result fetching.
    pub async_query: bool,
    /// `POST /query/sync`.
    pub sync_query: bool,
}

impl Default for ResourceCapabilities {
    fn default() -> Self {
        Self {
            search: true,
            async_query: true,
            sync_query: true,
        }
    }
}

/// A single optional operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Search,
    AsyncQuery,
    SyncQuery,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Search => write!(f, "search"),
            Capability::AsyncQuery => write!(f, "asynchronous query"),
            Capability::SyncQuery => write!(f, "synchronous query"),
        }
    }
}

impl ResourceCapabilities {
    /// Whether the capability is declared.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Search => self.search,
            Capability::AsyncQuery => self.async_query,
            Capability::SyncQuery => self.sync_query,
        }
    }
}

/// A configured backend query provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Administrator-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Base URL of the resource interface.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Declared optional operations.
    #[serde(default)]
    pub capabilities: ResourceCapabilities,
}

impl Resource {
    /// Fails with `ProtocolError` when the resource does not declare `capability`.
    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.capabilities.supports(capability) {
            Ok(())
        } else {
            Err(AppError::Protocol(format!(
                "Resource {} does not support {}",
                self.id, capability
            )))
        }
    }
}
