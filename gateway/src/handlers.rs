//! 查询接口处理模块

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::models::query::{INCORRECTLY_FORMATTED_REQUEST, MISSING_REQUEST_DATA};
use common::models::{Credentials, QueryRequest, QueryStatus, ResourceInfo, SearchResults};
use common::response::ApiResponse;

use crate::resource_client::ResultBody;
use crate::state::AppState;

/// 同步查询响应中携带网关查询 ID 的响应头
pub const QUERY_ID_HEADER: &str = "x-query-id";

/// 提交查询（单资源或聚合）
#[utoipa::path(
    post,
    path = "/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "查询已提交", body = ApiResponse<QueryStatus>),
        (status = 400, description = "请求数据缺失或格式错误"),
        (status = 401, description = "缺少资源凭证"),
        (status = 404, description = "资源未找到")
    )
)]
pub async fn submit_query(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse<QueryStatus>>, AppError> {
    let request = parse_request(&body)?;
    let data = state.service.submit(&request).await?;
    Ok(Json(ApiResponse::ok_with_service(data, &state.config.service_name)))
}

/// 轮询查询状态
#[utoipa::path(
    post,
    path = "/query/{query_id}/status",
    tag = "query",
    params(
        ("query_id" = String, Path, description = "网关查询 ID")
    ),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "最新状态", body = ApiResponse<QueryStatus>),
        (status = 404, description = "查询未找到")
    )
)]
pub async fn query_status(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<QueryStatus>>, AppError> {
    let credentials = parse_credentials(&body)?;
    let data = state.service.poll_status(&query_id, credentials.as_ref()).await?;
    Ok(Json(ApiResponse::ok_with_service(data, &state.config.service_name)))
}

/// 获取查询结果（原样返回资源的结果体）
#[utoipa::path(
    post,
    path = "/query/{query_id}/result",
    tag = "query",
    params(
        ("query_id" = String, Path, description = "网关查询 ID")
    ),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "资源结果"),
        (status = 404, description = "查询未找到")
    )
)]
pub async fn query_result(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let credentials = parse_credentials(&body)?;
    let (_, result) = state.service.fetch_result(&query_id, credentials.as_ref()).await?;
    Ok(raw_response(result, None))
}

/// 同步执行查询
#[utoipa::path(
    post,
    path = "/query/sync",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "资源结果，响应头 x-query-id 为网关查询 ID"),
        (status = 400, description = "缺少目标资源或资源不支持同步查询")
    )
)]
pub async fn query_sync(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request = parse_request(&body)?;
    let (status, result) = state.service.orchestrator().submit_sync(&request).await?;
    Ok(raw_response(result, status.query_id))
}

/// 查询元数据（不访问资源）
#[utoipa::path(
    get,
    path = "/query/{query_id}/metadata",
    tag = "query",
    params(
        ("query_id" = String, Path, description = "网关查询 ID")
    ),
    responses(
        (status = 200, description = "查询元数据", body = ApiResponse<QueryStatus>),
        (status = 404, description = "查询未找到")
    )
)]
pub async fn query_metadata(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
) -> Result<Json<ApiResponse<QueryStatus>>, AppError> {
    let data = state.service.orchestrator().metadata(&query_id).await?;
    Ok(Json(ApiResponse::ok_with_service(data, &state.config.service_name)))
}

/// 获取资源信息
#[utoipa::path(
    post,
    path = "/info/{resource_id}",
    tag = "resources",
    params(
        ("resource_id" = String, Path, description = "资源 ID")
    ),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "资源信息", body = ApiResponse<ResourceInfo>),
        (status = 404, description = "资源未找到")
    )
)]
pub async fn resource_info(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<ResourceInfo>>, AppError> {
    let credentials = parse_credentials(&body)?;
    let data = state
        .service
        .orchestrator()
        .info(&resource_id, credentials.as_ref())
        .await?;
    Ok(Json(ApiResponse::ok_with_service(data, &state.config.service_name)))
}

/// 列出已配置的资源（ID → 名称）
#[utoipa::path(
    get,
    path = "/info/resources",
    tag = "resources",
    responses(
        (status = 200, description = "资源 ID 与名称", body = Object)
    )
)]
pub async fn list_resources(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BTreeMap<String, String>>>, AppError> {
    let data = state.service.orchestrator().list_resources().await?;
    Ok(Json(ApiResponse::ok_with_service(data, &state.config.service_name)))
}

/// 在资源上检索
#[utoipa::path(
    post,
    path = "/search/{resource_id}",
    tag = "resources",
    params(
        ("resource_id" = String, Path, description = "资源 ID")
    ),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "检索结果", body = ApiResponse<SearchResults>),
        (status = 400, description = "缺少检索内容或资源不支持检索")
    )
)]
pub async fn search(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<SearchResults>>, AppError> {
    let request = parse_request(&body)?;
    let data = state
        .service
        .orchestrator()
        .search(&resource_id, Some(&request))
        .await?;
    Ok(Json(ApiResponse::ok_with_service(data, &state.config.service_name)))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// 解析 QueryRequest；空请求体或 `null` 视为缺少请求数据
fn parse_request(body: &[u8]) -> AppResult<QueryRequest> {
    if is_blank(body) {
        return Err(AppError::Protocol(MISSING_REQUEST_DATA.into()));
    }
    serde_json::from_slice::<Option<QueryRequest>>(body)?
        .ok_or_else(|| AppError::Protocol(MISSING_REQUEST_DATA.into()))
}

/// 解析凭证：可以是 QueryRequest，也可以是裸的资源 ID → 令牌映射
fn parse_credentials(body: &[u8]) -> AppResult<Option<Credentials>> {
    if is_blank(body) {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(body)?;
    if value.is_null() {
        return Ok(None);
    }
    if let Some(request) = QueryRequest::from_shape(&value) {
        return Ok(request.resource_credentials);
    }
    serde_json::from_value::<Credentials>(value)
        .map(Some)
        .map_err(|_| AppError::Protocol(INCORRECTLY_FORMATTED_REQUEST.into()))
}

fn raw_response(result: ResultBody, query_id: Option<String>) -> Response {
    let content_type = result
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match query_id {
        Some(id) => (
            [
                (header::CONTENT_TYPE, content_type),
                (HeaderName::from_static(QUERY_ID_HEADER), id),
            ],
            result.bytes,
        )
            .into_response(),
        None => ([(header::CONTENT_TYPE, content_type)], result.bytes).into_response(),
    }
}
