//! Shared data models for the gateway.

pub mod query;
pub mod record;
pub mod resource;
pub mod status;

// Re-export commonly used types
pub use query::{
    Credentials, QueryPayload, QueryRequest, QueryStatus, ResourceInfo, SearchResults,
    CREDENTIALS_FIELD,
};
pub use record::QueryRecord;
pub use resource::{Capability, Resource, ResourceCapabilities};
pub use status::{reconcile, Status};
