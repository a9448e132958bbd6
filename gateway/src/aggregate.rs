//! 多资源聚合查询
//!
//! 聚合查询把子查询依次提交给各自的资源，父记录只保存子查询 ID 列表和合并后的状态。

use chrono::Utc;
use common::errors::{AppError, AppResult};
use common::models::{reconcile, Credentials, QueryRecord, QueryRequest, QueryStatus, Status};
use common::utils::IdGenerator;
use serde_json::Value;

use crate::resource_client::ResultBody;
use crate::service::QueryService;

/// 聚合查询协调器
pub struct AggregateCoordinator<'a> {
    service: &'a QueryService,
}

impl<'a> AggregateCoordinator<'a> {
    pub fn new(service: &'a QueryService) -> Self {
        Self { service }
    }

    /// 按顺序提交所有子查询，全部成功后才写入父记录
    ///
    /// 任一子查询失败即中止，已提交的子查询保留，但不会产生父记录。
    pub async fn submit(&self, request: &QueryRequest) -> AppResult<QueryStatus> {
        let sub_requests = request.sub_requests()?;
        if sub_requests.is_empty() {
            return Err(AppError::Protocol("Aggregate query contains no sub-queries".into()));
        }

        let start_time = Utc::now();
        let mut sub_query_ids = Vec::with_capacity(sub_requests.len());
        let mut statuses = Vec::with_capacity(sub_requests.len());

        for (index, sub) in sub_requests.iter().enumerate() {
            if sub.resource_credentials.is_none() {
                return Err(AppError::Unauthorized(format!(
                    "Missing credentials for resource with id {}",
                    sub.target_resource_id.as_deref().unwrap_or("<unspecified>")
                )));
            }

            let child = self.service.submit(sub).await.map_err(|e| {
                tracing::warn!(
                    index,
                    resource_id = ?sub.target_resource_id,
                    submitted = sub_query_ids.len(),
                    error = %e,
                    "聚合子查询提交失败，已中止"
                );
                e
            })?;

            let child_id = child.query_id.ok_or_else(|| {
                AppError::Application("Sub-query was accepted without a query id".into())
            })?;
            sub_query_ids.push(child_id);
            statuses.push(child.status);
        }

        let orchestrator = self.service.orchestrator();
        let mut record = QueryRecord {
            id: IdGenerator::query_id(),
            resource_id: None,
            resource_result_id: None,
            status: Status::Unknown,
            start_time,
            ready_time: None,
            original_query: orchestrator.original_query(request),
            sub_query_ids,
        };
        record.apply_status(reconcile(statuses), Utc::now());
        orchestrator.store().insert_query(&record).await?;

        tracing::info!(
            query_id = %record.id,
            children = record.sub_query_ids.len(),
            status = %record.status,
            "聚合查询已提交"
        );
        Ok(record.to_status())
    }

    /// 轮询所有子查询，合并状态后更新父记录
    pub async fn poll_status(
        &self,
        mut record: QueryRecord,
        credentials: Option<&Credentials>,
    ) -> AppResult<QueryStatus> {
        let credentials = require_credentials(credentials)?;

        let mut statuses = Vec::with_capacity(record.sub_query_ids.len());
        for child_id in &record.sub_query_ids {
            let child = self.service.poll_status(child_id, Some(credentials)).await?;
            statuses.push(child.status);
        }

        record.apply_status(reconcile(statuses), Utc::now());
        self.service.orchestrator().store().update_status(&record).await?;
        Ok(record.to_status())
    }

    /// 按子查询顺序获取结果，组合成 JSON 数组
    pub async fn fetch_result(
        &self,
        mut record: QueryRecord,
        credentials: Option<&Credentials>,
    ) -> AppResult<(QueryStatus, ResultBody)> {
        let credentials = require_credentials(credentials)?;

        let mut statuses = Vec::with_capacity(record.sub_query_ids.len());
        let mut results = Vec::with_capacity(record.sub_query_ids.len());
        for child_id in &record.sub_query_ids {
            let (child, body) = self.service.fetch_result(child_id, Some(credentials)).await?;
            statuses.push(child.status);
            results.push(body.to_json_value());
        }

        let status = reconcile(statuses);
        if status != record.status {
            record.apply_status(status, Utc::now());
            self.service.orchestrator().store().update_status(&record).await?;
        }

        let body = ResultBody::json(&Value::Array(results))?;
        Ok((record.to_status(), body))
    }
}

fn require_credentials(credentials: Option<&Credentials>) -> AppResult<&Credentials> {
    credentials.ok_or_else(|| AppError::Unauthorized("Missing credentials for aggregate query".into()))
}
