//! 测试辅助：进程内模拟资源服务

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::models::{Resource, ResourceCapabilities, Status};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::query_store::{QueryStore, SqlQueryStore};

/// 模拟资源的可变状态
pub struct MockState {
    pub id: String,
    pub result_id: String,
    status: Mutex<Status>,
    fail_with: Mutex<Option<StatusCode>>,
    result: Mutex<Value>,
    last_auth: Mutex<Option<String>>,
    last_body: Mutex<Option<Value>>,
    hits: AtomicUsize,
}

impl MockState {
    fn record(&self, headers: &HeaderMap, body: Option<Value>) -> Option<Response> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        *self.last_auth.lock().unwrap() = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_body.lock().unwrap() = body;
        (*self.fail_with.lock().unwrap()).map(|code| (code, "resource failure").into_response())
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }
}

/// 在随机端口上运行的模拟资源，析构时关闭
pub struct MockResource {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockResource {
    /// 启动一个对所有查询返回 `status` 的模拟资源
    pub async fn start(id: &str, status: Status) -> Self {
        let state = Arc::new(MockState {
            id: id.to_string(),
            result_id: format!("{}-result", id),
            status: Mutex::new(status),
            fail_with: Mutex::new(None),
            result: Mutex::new(json!({"resource": id, "rows": [[1, 2]]})),
            last_auth: Mutex::new(None),
            last_body: Mutex::new(None),
            hits: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route("/status", get(status_handler))
            .route("/info", post(info_handler))
            .route("/search", post(search_handler))
            .route("/query", post(query_handler))
            .route("/query/sync", post(sync_handler))
            .route("/query/{id}/status", post(query_status_handler))
            .route("/query/{id}/result", post(query_result_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// 对应的资源定义（全部能力开启）
    pub fn resource(&self) -> Resource {
        Resource {
            id: self.state.id.clone(),
            name: format!("{} mock", self.state.id),
            description: None,
            base_url: Some(self.base_url()),
            capabilities: ResourceCapabilities::default(),
        }
    }

    pub fn set_status(&self, status: Status) {
        *self.state.status.lock().unwrap() = status;
    }

    /// 之后所有请求都以该状态码失败
    pub fn fail_with(&self, code: StatusCode) {
        *self.state.fail_with.lock().unwrap() = Some(code);
    }

    pub fn set_result(&self, result: Value) {
        *self.state.result.lock().unwrap() = result;
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_auth(&self) -> Option<String> {
        self.state.last_auth.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.state.last_body.lock().unwrap().clone()
    }
}

impl Drop for MockResource {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn status_handler(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(failure) = state.record(&headers, None) {
        return failure;
    }
    Json(json!({"status": "UP"})).into_response()
}

async fn info_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.record(&headers, Some(body)) {
        return failure;
    }
    Json(json!({
        "id": state.id,
        "name": format!("{} mock", state.id),
        "queryFormats": [{"name": "json"}]
    }))
    .into_response()
}

async fn search_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let term = body.get("query").cloned().unwrap_or(Value::Null);
    if let Some(failure) = state.record(&headers, Some(body)) {
        return failure;
    }
    Json(json!({"searchQuery": term, "results": {"hits": 1}})).into_response()
}

async fn query_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.record(&headers, Some(body)) {
        return failure;
    }
    Json(json!({
        "resourceResultId": state.result_id,
        "status": state.status(),
        "startTime": 1_700_000_000_000_i64
    }))
    .into_response()
}

async fn sync_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.record(&headers, Some(body)) {
        return failure;
    }
    Json(state.result.lock().unwrap().clone()).into_response()
}

async fn query_status_handler(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.record(&headers, Some(body)) {
        return failure;
    }
    if id != state.result_id {
        return (StatusCode::NOT_FOUND, "unknown result id").into_response();
    }
    Json(json!({"resourceResultId": id, "resourceStatus": state.status().as_str()})).into_response()
}

async fn query_result_handler(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.record(&headers, Some(body)) {
        return failure;
    }
    if id != state.result_id {
        return (StatusCode::NOT_FOUND, "unknown result id").into_response();
    }
    Json(state.result.lock().unwrap().clone()).into_response()
}

/// 内存中的查询存储，预先写入给定资源
pub async fn memory_store(resources: &[Resource]) -> Arc<SqlQueryStore> {
    let store = SqlQueryStore::connect("sqlite::memory:").await.unwrap();
    for resource in resources {
        store.upsert_resource(resource).await.unwrap();
    }
    Arc::new(store)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}
