//! Utility functions and helpers.

pub mod id_generator;
pub mod redactor;

// Re-export commonly used types
pub use id_generator::IdGenerator;
pub use redactor::CredentialRedactor;
