//! 联邦查询网关
//!
//! 客户端通过网关向已配置的资源提交查询，提供以下功能：
//! - 单资源查询的提交、状态轮询与结果获取
//! - 多资源聚合查询
//! - 资源信息、检索与同步查询转发
//! - 脱敏后的请求日志记录

mod aggregate;
mod audit;
mod handlers;
mod orchestrator;
mod query_store;
mod resource_client;
mod routes;
mod service;
mod state;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{load_dotenv, AppConfig, LogFormat};
use common::middleware::request_id::request_id_middleware;
use common::models::Resource;
use query_store::{QueryStore, SqlQueryStore};
use state::AppState;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "gateway";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "联邦查询网关 API",
        version = "0.1.0",
        description = "向多个查询资源提交、轮询、聚合查询的网关"
    ),
    paths(
        handlers::submit_query,
        handlers::query_status,
        handlers::query_result,
        handlers::query_sync,
        handlers::query_metadata,
        handlers::resource_info,
        handlers::list_resources,
        handlers::search,
        routes::health_check,
        routes::resources_health,
    ),
    components(schemas(
        common::models::QueryRequest,
        common::models::QueryStatus,
        common::models::Status,
        common::models::Credentials,
        common::models::ResourceInfo,
        common::models::SearchResults,
        routes::HealthResponse,
        routes::AggregatedHealth,
        routes::ResourceHealth,
    )),
    tags(
        (name = "query", description = "查询生命周期端点"),
        (name = "resources", description = "资源端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 加载配置
    let config = AppConfig::from_env(SERVICE_NAME)?;

    // 初始化日志追踪
    init_tracing(config.log_format);

    config.validate()?;

    // 打开查询存储并登记资源
    let store = SqlQueryStore::connect(&config.database_url)
        .await
        .context("无法打开查询存储")?;
    for resource in config.resources.iter().cloned().map(Resource::from) {
        store.upsert_resource(&resource).await?;
        info!(id = %resource.id, url = ?resource.base_url, "资源已登记");
    }

    // 创建应用状态
    let state = AppState::new(config.clone(), Arc::new(store))?;

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_addr();
    info!(service = SERVICE_NAME, address = %addr, "启动联邦查询网关");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    info!("网关已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "无法监听退出信号");
    }
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(audit::audit_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_store, MockResource};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::models::Status;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app(mocks: &[&MockResource]) -> Router {
        let resources: Vec<_> = mocks.iter().map(|m| m.resource()).collect();
        let store = memory_store(&resources).await;
        let config = AppConfig {
            resource_timeout_secs: 5,
            connect_timeout_secs: 2,
            ..AppConfig::default()
        };
        create_router(AppState::new(config, store).unwrap())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>, Option<String>) {
        let body = body.map(|v| Body::from(v.to_string())).unwrap_or_else(Body::empty);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let query_id = response
            .headers()
            .get(handlers::QUERY_ID_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, bytes, query_id)
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(&[]).await;
        let (status, body, _) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["status"], "healthy");
    }

    #[tokio::test]
    async fn test_submit_poll_fetch_over_http() {
        let mock = MockResource::start("r1", Status::Pending).await;
        let app = app(&[&mock]).await;

        let (status, body, _) = send(
            &app,
            "POST",
            "/query",
            Some(json!({"resourceCredentials": {"r1": "t"}, "query": {"q": 1}, "targetResourceId": "r1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let data = &json_body(&body)["data"];
        assert_eq!(data["status"], "PENDING");
        let query_id = data["queryId"].as_str().unwrap().to_string();

        mock.set_status(Status::Available);
        let (status, body, _) = send(
            &app,
            "POST",
            &format!("/query/{}/status", query_id),
            Some(json!({"r1": "t"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["status"], "AVAILABLE");

        let (status, body, _) = send(
            &app,
            "POST",
            &format!("/query/{}/result", query_id),
            Some(json!({"resourceCredentials": {"r1": "t"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["resource"], "r1");

        let (status, body, _) = send(&app, "GET", &format!("/query/{}/metadata", query_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["resourceResultId"], "r1-result");
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let mock = MockResource::start("r1", Status::Pending).await;
        let app = app(&[&mock]).await;

        let (status, body, _) = send(&app, "POST", "/query", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["code"], "PROTOCOL_ERROR");

        let (status, _, _) = send(&app, "GET", "/query/nope/metadata", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(
            &app,
            "POST",
            "/query",
            Some(json!({"resourceCredentials": {"other": "t"}, "query": "Q", "targetResourceId": "r1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        mock.fail_with(StatusCode::SERVICE_UNAVAILABLE);
        let (status, body, _) = send(
            &app,
            "POST",
            "/query",
            Some(json!({"resourceCredentials": {"r1": "t"}, "query": "Q", "targetResourceId": "r1"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&body)["error"]["code"], "RESOURCE_INTERFACE_ERROR");
    }

    #[tokio::test]
    async fn test_sync_query_sets_header() {
        let mock = MockResource::start("r1", Status::Available).await;
        let app = app(&[&mock]).await;

        let (status, body, query_id) = send(
            &app,
            "POST",
            "/query/sync",
            Some(json!({"resourceCredentials": {"r1": "t"}, "query": "Q", "targetResourceId": "r1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["resource"], "r1");

        let query_id = query_id.unwrap();
        let (_, body, _) = send(&app, "GET", &format!("/query/{}/metadata", query_id), None).await;
        assert_eq!(json_body(&body)["data"]["status"], "AVAILABLE");
    }

    #[tokio::test]
    async fn test_resource_endpoints() {
        let mock = MockResource::start("r1", Status::Available).await;
        let app = app(&[&mock]).await;

        let (status, body, _) = send(&app, "GET", "/info/resources", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"], json!({"r1": "r1 mock"}));

        let (status, body, _) = send(&app, "POST", "/info/r1", Some(json!({"r1": "t"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["id"], "r1");

        let (status, body, _) = send(
            &app,
            "POST",
            "/search/r1",
            Some(json!({"resourceCredentials": {"r1": "t"}, "query": "age"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"]["searchQuery"], "age");

        let (status, body, _) = send(&app, "GET", "/api/health/resources", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["resources"][0]["healthy"], true);
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = app(&[]).await;
        let (status, body, _) = send(&app, "GET", "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_body(&body)["paths"].get("/query").is_some());
    }
}
