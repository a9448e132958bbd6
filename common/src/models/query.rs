//! Query request and status models.
//!
//! `QueryRequest` is the inbound/outbound wire shape. Its `query` field is
//! polymorphic: a string, an object, or a list of further
//! QueryRequest-shaped values (aggregate fan-out).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::models::status::Status;

/// Field name carrying credentials in a QueryRequest.
pub const CREDENTIALS_FIELD: &str = "resourceCredentials";

/// Message used when a payload is not a list of sub-requests.
pub const INCORRECTLY_FORMATTED_REQUEST: &str = "Incorrectly formatted query request data";

/// Message used when no request data was supplied.
pub const MISSING_REQUEST_DATA: &str = "Missing query request data";

/// Per-resource bearer tokens, keyed by resource id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Credentials(pub BTreeMap<String, String>);

impl Credentials {
    /// Creates credentials holding a single token.
    pub fn single(resource_id: impl Into<String>, token: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(resource_id.into(), token.into());
        Self(map)
    }

    /// Returns the token for a resource, if present.
    pub fn get(&self, resource_id: &str) -> Option<&str> {
        self.0.get(resource_id).map(String::as_str)
    }

    /// Returns the token for a resource or fails with `Unauthorized`.
    pub fn token_for(&self, resource_id: &str) -> AppResult<&str> {
        self.get(resource_id).ok_or_else(|| {
            AppError::Unauthorized(format!("Missing credentials for resource with id {}", resource_id))
        })
    }
}

/// The untyped query payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryPayload {
    /// Ordered list; for aggregate submits, a list of sub-requests.
    List(Vec<Value>),
    /// Resource-specific query object.
    Object(Map<String, Value>),
    /// Search term, query string, or any other scalar.
    Scalar(Value),
}

impl QueryPayload {
    /// Converts the payload back into a plain JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            QueryPayload::List(items) => Value::Array(items.clone()),
            QueryPayload::Object(map) => Value::Object(map.clone()),
            QueryPayload::Scalar(value) => value.clone(),
        }
    }

    /// Builds a payload from a plain JSON value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => QueryPayload::List(items),
            Value::Object(map) => QueryPayload::Object(map),
            other => QueryPayload::Scalar(other),
        }
    }
}

impl From<&str> for QueryPayload {
    fn from(s: &str) -> Self {
        QueryPayload::Scalar(Value::String(s.to_string()))
    }
}

/// Request forwarded to a resource: credentials, query and target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Resource id → bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_credentials: Option<Credentials>,

    /// String, object, or list of sub-requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub query: Option<QueryPayload>,

    /// Resource the query is aimed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resource_id: Option<String>,
}

/// Strict view used to decide whether an arbitrary value is a QueryRequest.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct QueryRequestShape {
    #[serde(default)]
    resource_credentials: Option<Credentials>,
    #[serde(default)]
    query: Option<Value>,
    #[serde(default)]
    target_resource_id: Option<String>,
}

impl QueryRequest {
    /// Creates a request with credentials and a query for one resource.
    pub fn new(credentials: Credentials, query: QueryPayload, target: impl Into<String>) -> Self {
        Self {
            resource_credentials: Some(credentials),
            query: Some(query),
            target_resource_id: Some(target.into()),
        }
    }

    /// Creates a request that only carries credentials.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            resource_credentials: Some(credentials),
            ..Default::default()
        }
    }

    /// Tries to view an arbitrary value as a QueryRequest.
    ///
    /// Succeeds only for objects whose keys are a subset of the three
    /// QueryRequest fields with correctly typed values.
    pub fn from_shape(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let shape = QueryRequestShape::deserialize(value).ok()?;
        Some(Self {
            resource_credentials: shape.resource_credentials,
            query: shape.query.map(QueryPayload::from_value),
            target_resource_id: shape.target_resource_id,
        })
    }

    /// Whether this request fans out to several resources.
    pub fn is_aggregate(&self) -> bool {
        self.target_resource_id.is_none() && matches!(self.query, Some(QueryPayload::List(_)))
    }

    /// Interprets the payload as an ordered list of sub-requests.
    ///
    /// # Errors
    /// `AppError::Protocol` if the payload is absent, not a list, or any
    /// element is not QueryRequest-shaped.
    pub fn sub_requests(&self) -> AppResult<Vec<QueryRequest>> {
        let items = match &self.query {
            Some(QueryPayload::List(items)) => items,
            Some(_) => return Err(AppError::Protocol(INCORRECTLY_FORMATTED_REQUEST.into())),
            None => return Err(AppError::Protocol(MISSING_REQUEST_DATA.into())),
        };
        items
            .iter()
            .map(|item| {
                QueryRequest::from_shape(item)
                    .ok_or_else(|| AppError::Protocol(INCORRECTLY_FORMATTED_REQUEST.into()))
            })
            .collect()
    }

    /// Credentials or an empty set.
    pub fn credentials(&self) -> Credentials {
        self.resource_credentials.clone().unwrap_or_default()
    }
}

/// Status object returned by the gateway for every lifecycle operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatus {
    /// Gateway-assigned query id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,

    /// Resource answering the query; absent for aggregates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Resource-native correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_result_id: Option<String>,

    /// Last known status.
    pub status: Status,

    /// Resource-native status string, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_status: Option<String>,

    /// Submission time (epoch milliseconds on the wire).
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<i64>)]
    pub start_time: Option<DateTime<Utc>>,

    /// Time the query reached a terminal status (epoch milliseconds).
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<i64>)]
    pub ready_time: Option<DateTime<Utc>>,

    /// Child query ids of an aggregate, in submission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_query_ids: Vec<String>,
}

impl QueryStatus {
    /// Creates a bare status object.
    pub fn new(status: Status) -> Self {
        Self {
            query_id: None,
            resource_id: None,
            resource_result_id: None,
            status,
            resource_status: None,
            start_time: None,
            ready_time: None,
            sub_query_ids: Vec::new(),
        }
    }
}

/// Information a resource reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Resource id as known by the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resource display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Query formats the resource accepts.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub query_formats: Vec<Value>,
}

/// Search results returned by a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Echo of the search term.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub search_query: Value,

    /// Resource-specific results.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub results: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_request_parses_all_payload_kinds() {
        let req: QueryRequest =
            serde_json::from_value(json!({"query": "searchTerm", "targetResourceId": "r1"})).unwrap();
        assert_eq!(req.query, Some(QueryPayload::from("searchTerm")));
        assert!(!req.is_aggregate());

        let req: QueryRequest = serde_json::from_value(json!({"query": {"select": ["a"]}})).unwrap();
        assert!(matches!(req.query, Some(QueryPayload::Object(_))));

        let req: QueryRequest = serde_json::from_value(json!({"query": [{"query": "Q1"}]})).unwrap();
        assert!(req.is_aggregate());
    }

    #[test]
    fn test_list_with_target_is_not_aggregate() {
        let req: QueryRequest =
            serde_json::from_value(json!({"query": ["a", "b"], "targetResourceId": "r1"})).unwrap();
        assert!(!req.is_aggregate());
    }

    #[test]
    fn test_from_shape_rejects_unknown_fields() {
        assert!(QueryRequest::from_shape(&json!({"query": "Q", "other": 1})).is_none());
        assert!(QueryRequest::from_shape(&json!("Q")).is_none());
        assert!(QueryRequest::from_shape(&json!({"resourceCredentials": {"a": 1}})).is_none());

        let req = QueryRequest::from_shape(&json!({
            "resourceCredentials": {"a": "s1"},
            "query": "Q1",
            "targetResourceId": "a"
        }))
        .unwrap();
        assert_eq!(req.credentials().get("a"), Some("s1"));
        assert_eq!(req.target_resource_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_sub_requests() {
        let req: QueryRequest = serde_json::from_value(json!({
            "query": [
                {"resourceCredentials": {"a": "s1"}, "query": "Q1", "targetResourceId": "a"},
                {"resourceCredentials": {"b": "s2"}, "query": "Q2", "targetResourceId": "b"}
            ]
        }))
        .unwrap();
        let subs = req.sub_requests().unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].target_resource_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_sub_requests_rejects_bad_payloads() {
        let not_list: QueryRequest = serde_json::from_value(json!({"query": "Q"})).unwrap();
        assert!(matches!(not_list.sub_requests(), Err(AppError::Protocol(_))));

        let missing = QueryRequest::default();
        assert!(matches!(missing.sub_requests(), Err(AppError::Protocol(_))));

        let bad_element: QueryRequest =
            serde_json::from_value(json!({"query": [{"query": "Q1"}, 5]})).unwrap();
        assert!(matches!(bad_element.sub_requests(), Err(AppError::Protocol(_))));
    }

    #[test]
    fn test_token_for_missing_key_is_unauthorized() {
        let creds = Credentials::single("a", "token");
        assert_eq!(creds.token_for("a").unwrap(), "token");
        let err = creds.token_for("b").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m.contains("b")));
    }

    #[test]
    fn test_status_times_are_epoch_millis() {
        let mut status = QueryStatus::new(Status::Pending);
        status.start_time = DateTime::from_timestamp_millis(1_700_000_000_123);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["startTime"], json!(1_700_000_000_123_i64));
        assert_eq!(value["status"], json!("PENDING"));
        assert!(value.get("readyTime").is_none());
        assert!(value.get("subQueryIds").is_none());
    }
}
