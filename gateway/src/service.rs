//! 查询分发服务
//!
//! 判断请求是单资源查询还是聚合查询，并交给对应的处理者。聚合查询的子查询
//! 会再次经过这里，因此这些方法返回装箱的 future。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::errors::{AppError, AppResult};
use common::models::{Credentials, QueryRequest, QueryStatus};

use crate::aggregate::AggregateCoordinator;
use crate::orchestrator::QueryOrchestrator;
use crate::query_store::QueryStore;
use crate::resource_client::ResultBody;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 查询服务
pub struct QueryService {
    orchestrator: QueryOrchestrator,
}

impl QueryService {
    /// 创建查询服务
    pub fn new(store: Arc<dyn QueryStore>, http: reqwest::Client, original_query_max_len: usize) -> Self {
        Self {
            orchestrator: QueryOrchestrator::new(store, http, original_query_max_len),
        }
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    /// 提交查询
    ///
    /// 无目标资源且载荷为列表时按聚合查询处理；指定了目标资源时，列表载荷原样转发。
    pub fn submit<'a>(&'a self, request: &'a QueryRequest) -> BoxFuture<'a, AppResult<QueryStatus>> {
        Box::pin(async move {
            if request.is_aggregate() {
                return AggregateCoordinator::new(self).submit(request).await;
            }
            let target = request
                .target_resource_id
                .as_deref()
                .ok_or_else(|| AppError::Protocol("Missing target resource id".into()))?;
            self.orchestrator.submit(target, request).await
        })
    }

    /// 轮询查询状态
    pub fn poll_status<'a>(
        &'a self,
        query_id: &'a str,
        credentials: Option<&'a Credentials>,
    ) -> BoxFuture<'a, AppResult<QueryStatus>> {
        Box::pin(async move {
            let record = self.orchestrator.load(query_id).await?;
            if record.is_aggregate() {
                AggregateCoordinator::new(self).poll_status(record, credentials).await
            } else {
                self.orchestrator.poll_record(record, credentials).await
            }
        })
    }

    /// 获取查询结果
    pub fn fetch_result<'a>(
        &'a self,
        query_id: &'a str,
        credentials: Option<&'a Credentials>,
    ) -> BoxFuture<'a, AppResult<(QueryStatus, ResultBody)>> {
        Box::pin(async move {
            let record = self.orchestrator.load(query_id).await?;
            if record.is_aggregate() {
                AggregateCoordinator::new(self).fetch_result(record, credentials).await
            } else {
                self.orchestrator.fetch_record(record, credentials).await
            }
        })
    }
}
