//! Persisted query lifecycle record.

use chrono::{DateTime, Utc};

use crate::models::query::QueryStatus;
use crate::models::status::Status;

/// Gateway-side lifecycle state of one submitted query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    /// Gateway-generated id.
    pub id: String,
    /// Target resource; `None` for aggregates.
    pub resource_id: Option<String>,
    /// Correlation id returned by the resource on submit.
    pub resource_result_id: Option<String>,
    /// Last known status.
    pub status: Status,
    /// Submission time.
    pub start_time: DateTime<Utc>,
    /// First time a terminal status was recorded.
    pub ready_time: Option<DateTime<Utc>>,
    /// Redacted text of the submitted query.
    pub original_query: Option<String>,
    /// Ordered child ids of an aggregate.
    pub sub_query_ids: Vec<String>,
}

impl QueryRecord {
    /// Whether this record tracks an aggregate query.
    pub fn is_aggregate(&self) -> bool {
        self.resource_id.is_none()
    }

    /// Overwrites the status, stamping `ready_time` on the first terminal status.
    pub fn apply_status(&mut self, status: Status, now: DateTime<Utc>) {
        self.status = status;
        if status.is_terminal() && self.ready_time.is_none() {
            self.ready_time = Some(now);
        }
    }

    /// Status object describing this record.
    pub fn to_status(&self) -> QueryStatus {
        QueryStatus {
            query_id: Some(self.id.clone()),
            resource_id: self.resource_id.clone(),
            resource_result_id: self.resource_result_id.clone(),
            status: self.status,
            resource_status: None,
            start_time: Some(self.start_time),
            ready_time: self.ready_time,
            sub_query_ids: self.sub_query_ids.clone(),
        }
    }
}
