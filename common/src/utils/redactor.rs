//! Credential redaction for request bodies.
//!
//! Request bodies may nest QueryRequest-shaped values to any depth (aggregate
//! payloads carry one per sub-query), each with its own credentials. The
//! redactor removes every credentials field while leaving all other structure
//! and key order untouched.

use serde_json::{Map, Value};

use crate::models::query::{QueryRequest, CREDENTIALS_FIELD};

/// Removes embedded credentials from arbitrary JSON trees.
pub struct CredentialRedactor;

impl CredentialRedactor {
    /// Returns a copy of `value` with every credentials field removed.
    ///
    /// Idempotent: redacting a redacted tree returns it unchanged.
    pub fn redact(value: &Value) -> Value {
        if !Self::contains_credentials(value) {
            return value.clone();
        }

        if let Some(cleaned) = Self::redact_query_request(value) {
            return cleaned;
        }

        match value {
            Value::Object(map) => {
                let mut cleaned = Map::with_capacity(map.len());
                for (key, inner) in map {
                    if key == CREDENTIALS_FIELD {
                        continue;
                    }
                    if Self::contains_credentials(inner) {
                        cleaned.insert(key.clone(), Self::redact(inner));
                    } else {
                        cleaned.insert(key.clone(), inner.clone());
                    }
                }
                Value::Object(cleaned)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| {
                        if Self::contains_credentials(item) {
                            Self::redact(item)
                        } else {
                            item.clone()
                        }
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Redacts a serialized body. Returns `None` if it is not JSON.
    pub fn redact_bytes(body: &[u8]) -> Option<String> {
        let value: Value = serde_json::from_slice(body).ok()?;
        Some(Self::redact(&value).to_string())
    }

    /// Whether a credentials field appears anywhere in the tree.
    pub fn contains_credentials(value: &Value) -> bool {
        match value {
            Value::Object(map) => map
                .iter()
                .any(|(key, inner)| key == CREDENTIALS_FIELD || Self::contains_credentials(inner)),
            Value::Array(items) => items.iter().any(Self::contains_credentials),
            _ => false,
        }
    }

    /// Cleans a value that parses as a QueryRequest, recursing into its query.
    fn redact_query_request(value: &Value) -> Option<Value> {
        QueryRequest::from_shape(value)?;
        let map = value.as_object()?;

        let mut cleaned = Map::with_capacity(map.len());
        for (key, inner) in map {
            match key.as_str() {
                CREDENTIALS_FIELD => {}
                "query" => {
                    cleaned.insert(key.clone(), Self::redact(inner));
                }
                _ => {
                    cleaned.insert(key.clone(), inner.clone());
                }
            }
        }
        Some(Value::Object(cleaned))
    }
}
