//! 单资源查询编排
//!
//! 负责查询记录的生命周期：提交后立即落库，轮询和取结果时更新状态。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use common::errors::{AppError, AppResult};
use common::models::{
    Capability, Credentials, QueryRecord, QueryRequest, QueryStatus, Resource, ResourceInfo,
    SearchResults, Status,
};
use common::utils::{CredentialRedactor, IdGenerator};

use crate::query_store::QueryStore;
use crate::resource_client::{ResourceClient, ResultBody};

/// 单资源查询编排器
pub struct QueryOrchestrator {
    store: Arc<dyn QueryStore>,
    http: reqwest::Client,
    original_query_max_len: usize,
}

impl QueryOrchestrator {
    /// 创建编排器
    pub fn new(store: Arc<dyn QueryStore>, http: reqwest::Client, original_query_max_len: usize) -> Self {
        Self {
            store,
            http,
            original_query_max_len,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueryStore> {
        &self.store
    }

    /// 按 ID 查找资源
    pub async fn resource(&self, resource_id: &str) -> AppResult<Resource> {
        self.store
            .get_resource(resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No resource with id {}", resource_id)))
    }

    /// 按 ID 加载查询记录
    pub async fn load(&self, query_id: &str) -> AppResult<QueryRecord> {
        self.store
            .get_query(query_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No query with id {}", query_id)))
    }

    /// 已列出资源：ID → 名称
    pub async fn list_resources(&self) -> AppResult<BTreeMap<String, String>> {
        let resources = self.store.list_resources().await?;
        Ok(resources.into_iter().map(|r| (r.id, r.name)).collect())
    }

    /// 获取资源信息
    pub async fn info(&self, resource_id: &str, credentials: Option<&Credentials>) -> AppResult<ResourceInfo> {
        let resource = self.resource(resource_id).await?;
        self.client(&resource).info(credentials).await
    }

    /// 在资源上检索
    pub async fn search(&self, resource_id: &str, request: Option<&QueryRequest>) -> AppResult<SearchResults> {
        let resource = self.resource(resource_id).await?;
        resource.require(Capability::Search)?;
        self.client(&resource).search(request).await
    }

    /// 向单个资源提交查询并落库
    ///
    /// 资源接受后记录一定写入；写入失败时资源侧的查询已成孤儿，仅记录日志后返回错误。
    pub async fn submit(&self, resource_id: &str, request: &QueryRequest) -> AppResult<QueryStatus> {
        let resource = self.resource(resource_id).await?;
        resource.require(Capability::AsyncQuery)?;

        let upstream = self.client(&resource).submit(Some(request)).await?;

        let now = Utc::now();
        let mut record = QueryRecord {
            id: IdGenerator::query_id(),
            resource_id: Some(resource.id.clone()),
            resource_result_id: upstream.resource_result_id.clone(),
            status: Status::Unknown,
            start_time: upstream.start_time.unwrap_or(now),
            ready_time: None,
            original_query: self.original_query(request),
            sub_query_ids: Vec::new(),
        };
        record.apply_status(upstream.status, now);

        self.store.insert_query(&record).await.map_err(|e| {
            tracing::error!(
                resource_id = %resource.id,
                resource_result_id = ?record.resource_result_id,
                error = %e,
                "资源已接受查询但记录写入失败"
            );
            e
        })?;

        tracing::info!(query_id = %record.id, resource_id = %resource.id, status = %record.status, "查询已提交");

        let mut status = record.to_status();
        status.resource_status = upstream.resource_status;
        Ok(status)
    }

    /// 同步执行查询，记录直接以 AVAILABLE 落库
    pub async fn submit_sync(&self, request: &QueryRequest) -> AppResult<(QueryStatus, ResultBody)> {
        let resource_id = request
            .target_resource_id
            .as_deref()
            .ok_or_else(|| AppError::Protocol("Missing target resource id".into()))?;
        let resource = self.resource(resource_id).await?;
        resource.require(Capability::SyncQuery)?;

        let body = self.client(&resource).query_sync(Some(request)).await?;

        let now = Utc::now();
        let record = QueryRecord {
            id: IdGenerator::query_id(),
            resource_id: Some(resource.id.clone()),
            resource_result_id: None,
            status: Status::Available,
            start_time: now,
            ready_time: Some(now),
            original_query: self.original_query(request),
            sub_query_ids: Vec::new(),
        };
        self.store.insert_query(&record).await?;

        tracing::info!(query_id = %record.id, resource_id = %resource.id, "同步查询完成");
        Ok((record.to_status(), body))
    }

    /// 轮询单资源查询状态并更新记录
    pub async fn poll_record(&self, mut record: QueryRecord, credentials: Option<&Credentials>) -> AppResult<QueryStatus> {
        let resource = self.record_resource(&record).await?;
        resource.require(Capability::AsyncQuery)?;

        let upstream = self
            .client(&resource)
            .poll_status(record.resource_result_id.as_deref(), credentials)
            .await?;

        record.apply_status(upstream.status, Utc::now());
        self.store.update_status(&record).await?;

        let mut status = record.to_status();
        status.resource_status = upstream.resource_status;
        Ok(status)
    }

    /// 获取单资源查询结果；成功时记录标为 AVAILABLE，已是 ERROR 的记录保持不变
    pub async fn fetch_record(
        &self,
        mut record: QueryRecord,
        credentials: Option<&Credentials>,
    ) -> AppResult<(QueryStatus, ResultBody)> {
        let resource = self.record_resource(&record).await?;
        resource.require(Capability::AsyncQuery)?;

        let body = self
            .client(&resource)
            .fetch_result(record.resource_result_id.as_deref(), credentials)
            .await?;

        if !record.status.is_terminal() {
            record.apply_status(Status::Available, Utc::now());
            self.store.update_status(&record).await?;
        }
        Ok((record.to_status(), body))
    }

    /// 查询元数据，仅读取本地记录
    pub async fn metadata(&self, query_id: &str) -> AppResult<QueryStatus> {
        Ok(self.load(query_id).await?.to_status())
    }

    /// 脱敏后的原始查询文本，超长时按字符边界截断
    pub fn original_query(&self, request: &QueryRequest) -> Option<String> {
        let value = request.query.as_ref()?.to_value();
        let text = CredentialRedactor::redact(&value).to_string();
        Some(truncate(text, self.original_query_max_len))
    }

    fn client(&self, resource: &Resource) -> ResourceClient {
        ResourceClient::new(self.http.clone(), resource)
    }

    async fn record_resource(&self, record: &QueryRecord) -> AppResult<Resource> {
        let resource_id = record.resource_id.as_deref().ok_or_else(|| {
            AppError::Application(format!("Query {} is not bound to a resource", record.id))
        })?;
        self.resource(resource_id).await
    }
}

fn truncate(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
