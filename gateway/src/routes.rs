//! 网关路由模块

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::models::Resource;

use crate::handlers;
use crate::resource_client::ResourceClient;
use crate::state::AppState;

/// 创建网关路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query", post(handlers::submit_query))
        .route("/query/sync", post(handlers::query_sync))
        .route("/query/{query_id}/status", post(handlers::query_status))
        .route("/query/{query_id}/result", post(handlers::query_result))
        .route("/query/{query_id}/metadata", get(handlers::query_metadata))
        .route("/info/resources", get(handlers::list_resources))
        .route("/info/{resource_id}", post(handlers::resource_info))
        .route("/search/{resource_id}", post(handlers::search))
        .route("/api/health", get(health_check))
        .route("/api/health/resources", get(resources_health))
}

/// 网关健康检查
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "网关运行正常", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// 聚合所有资源的健康状态
#[utoipa::path(
    get,
    path = "/api/health/resources",
    tag = "health",
    responses(
        (status = 200, description = "聚合健康状态", body = AggregatedHealth)
    )
)]
pub async fn resources_health(
    State(state): State<AppState>,
) -> Result<Json<AggregatedHealth>, AppError> {
    let resources = state.store.list_resources().await?;

    let mut checks = Vec::with_capacity(resources.len());
    for resource in &resources {
        checks.push(check_resource_health(&state.http_client, resource).await);
    }

    let all_healthy = checks.iter().all(|r| r.healthy);

    Ok(Json(AggregatedHealth {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        resources: checks,
    }))
}

async fn check_resource_health(client: &reqwest::Client, resource: &Resource) -> ResourceHealth {
    let result = ResourceClient::new(client.clone(), resource).health().await;

    ResourceHealth {
        id: resource.id.clone(),
        name: resource.name.clone(),
        url: resource.base_url.clone(),
        healthy: result.is_ok(),
        error: result.err().map(|e| e.message().to_string()),
    }
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
}

/// 聚合健康响应
#[derive(Serialize, ToSchema)]
pub struct AggregatedHealth {
    /// 整体状态
    pub status: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 各资源健康状态
    pub resources: Vec<ResourceHealth>,
}

/// 单个资源健康状态
#[derive(Serialize, ToSchema)]
pub struct ResourceHealth {
    /// 资源 ID
    pub id: String,
    /// 资源名称
    pub name: String,
    /// 资源地址
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 是否健康
    pub healthy: bool,
    /// 错误信息（如果不健康）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
