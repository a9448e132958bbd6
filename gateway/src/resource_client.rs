//! 资源 HTTP 客户端
//!
//! 每个操作在发出请求前按固定顺序校验：请求数据 → 凭证 → 资源地址 → 关联 ID。
//! 任一校验失败都不会产生外部调用。

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::query::MISSING_REQUEST_DATA;
use common::models::{Credentials, QueryRequest, QueryStatus, Resource, ResourceInfo, SearchResults, Status};
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 资源返回的原始结果体
#[derive(Debug, Clone)]
pub struct ResultBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl ResultBody {
    /// 以 JSON 方式构造结果体
    pub fn json(value: &Value) -> AppResult<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| AppError::Application(format!("无法序列化结果: {}", e)))?;
        Ok(Self {
            bytes: Bytes::from(bytes),
            content_type: Some("application/json".to_string()),
        })
    }

    /// 结果体能解析为 JSON 时原样嵌入，否则作为字符串嵌入
    pub fn to_json_value(&self) -> Value {
        serde_json::from_slice(&self.bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.bytes).into_owned()))
    }
}

/// 资源对查询状态的响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resource_status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    resource_result_id: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    start_time: Option<DateTime<Utc>>,
}

impl UpstreamStatus {
    fn gateway_status(&self) -> Status {
        self.status
            .as_deref()
            .map(|s| match Status::parse(s) {
                Status::Unknown => Status::from_resource_status(s),
                known => known,
            })
            .filter(|s| *s != Status::Unknown)
            .or_else(|| self.resource_status.as_deref().map(Status::from_resource_status))
            .unwrap_or(Status::Unknown)
    }

    fn into_status(self) -> QueryStatus {
        let mut status = QueryStatus::new(self.gateway_status());
        status.resource_status = self.resource_status.or(self.status);
        status.resource_result_id = self.resource_result_id;
        status.start_time = self.start_time;
        status
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "resourceResultId must be a string or number, got {}",
            other
        ))),
    }
}

/// 绑定到单个资源的客户端
pub struct ResourceClient {
    http: reqwest::Client,
    resource_id: String,
    base_url: Option<String>,
}

impl ResourceClient {
    /// 创建资源客户端
    pub fn new(http: reqwest::Client, resource: &Resource) -> Self {
        Self {
            http,
            resource_id: resource.id.clone(),
            base_url: resource.base_url.clone(),
        }
    }

    /// 获取资源信息
    pub async fn info(&self, credentials: Option<&Credentials>) -> AppResult<ResourceInfo> {
        let (credentials, token) = self.token(credentials)?;
        let base = self.base_url()?;
        let body = QueryRequest::with_credentials(credentials.clone());
        let response = self.post(base, "/info", token, &body).await?;
        read_json(response).await
    }

    /// 在资源上执行检索
    pub async fn search(&self, request: Option<&QueryRequest>) -> AppResult<SearchResults> {
        let request = require_query(request)?;
        let (_, token) = self.token(request.resource_credentials.as_ref())?;
        let base = self.base_url()?;
        let response = self.post(base, "/search", token, request).await?;
        read_json(response).await
    }

    /// 异步提交查询，资源必须返回关联 ID
    pub async fn submit(&self, request: Option<&QueryRequest>) -> AppResult<QueryStatus> {
        let request = require_query(request)?;
        let (_, token) = self.token(request.resource_credentials.as_ref())?;
        let base = self.base_url()?;
        let response = self.post(base, "/query", token, request).await?;
        let status = read_json::<UpstreamStatus>(response).await?.into_status();

        if status.resource_result_id.is_none() {
            return Err(AppError::ResourceInterface(format!(
                "{} accepted the query without a resourceResultId",
                base
            )));
        }
        Ok(status)
    }

    /// 同步执行查询并返回原始结果
    pub async fn query_sync(&self, request: Option<&QueryRequest>) -> AppResult<ResultBody> {
        let request = require_query(request)?;
        let (_, token) = self.token(request.resource_credentials.as_ref())?;
        let base = self.base_url()?;
        let response = self.post(base, "/query/sync", token, request).await?;
        read_body(response).await
    }

    /// 轮询查询状态
    pub async fn poll_status(
        &self,
        resource_result_id: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> AppResult<QueryStatus> {
        let (credentials, token) = self.token(credentials)?;
        let base = self.base_url()?;
        let result_id = require_result_id(resource_result_id)?;
        let path = format!("/query/{}/status", result_id);
        let body = QueryRequest::with_credentials(credentials.clone());
        let response = self.post(base, &path, token, &body).await?;
        read_json::<UpstreamStatus>(response).await.map(UpstreamStatus::into_status)
    }

    /// 获取查询结果
    pub async fn fetch_result(
        &self,
        resource_result_id: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> AppResult<ResultBody> {
        let (credentials, token) = self.token(credentials)?;
        let base = self.base_url()?;
        let result_id = require_result_id(resource_result_id)?;
        let path = format!("/query/{}/result", result_id);
        let body = QueryRequest::with_credentials(credentials.clone());
        let response = self.post(base, &path, token, &body).await?;
        read_body(response).await
    }

    /// 资源存活检查（不需要凭证）
    pub async fn health(&self) -> AppResult<()> {
        let base = self.base_url()?;
        let url = format!("{}/status", base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ResourceInterface(format!("无法连接到资源 {}: {}", url, e)))?;
        check_status(base, response).map(|_| ())
    }

    fn token<'c>(&self, credentials: Option<&'c Credentials>) -> AppResult<(&'c Credentials, &'c str)> {
        let credentials = credentials.ok_or_else(|| {
            AppError::Unauthorized(format!(
                "Missing credentials for resource with id {}",
                self.resource_id
            ))
        })?;
        let token = credentials.token_for(&self.resource_id)?;
        Ok((credentials, token))
    }

    fn base_url(&self) -> AppResult<&str> {
        self.base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AppError::Application(format!(
                    "Resource {} has no base URL configured",
                    self.resource_id
                ))
            })
    }

    async fn post<B>(&self, base: &str, path: &str, token: &str, body: &B) -> AppResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", base, path);
        tracing::debug!(resource_id = %self.resource_id, url = %url, "调用资源接口");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ResourceInterface(format!("无法连接到资源 {}: {}", url, e)))?;

        check_status(base, response)
    }
}

fn require_query(request: Option<&QueryRequest>) -> AppResult<&QueryRequest> {
    match request {
        Some(request) if request.query.is_some() => Ok(request),
        _ => Err(AppError::Protocol(MISSING_REQUEST_DATA.into())),
    }
}

fn require_result_id(resource_result_id: Option<&str>) -> AppResult<&str> {
    resource_result_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Protocol("Missing resource result id".into()))
}

fn check_status(base: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    let line = format!(
        "{} returned {}: {}",
        base,
        status.as_u16(),
        status.canonical_reason().unwrap_or("unknown")
    );
    tracing::error!(status = status.as_u16(), "{}", line);

    if status == StatusCode::UNAUTHORIZED {
        Err(AppError::Unauthorized(line))
    } else {
        Err(AppError::ResourceInterface(line))
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::ResourceInterface(format!("资源返回无效响应: {}", e)))
}

async fn read_body(response: reqwest::Response) -> AppResult<ResultBody> {
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::ResourceInterface(format!("读取资源结果失败: {}", e)))?;

    Ok(ResultBody { bytes, content_type })
}
