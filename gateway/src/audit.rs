//! 请求审计日志中间件
//!
//! 记录每个 POST 请求体，记录前移除其中所有资源凭证。

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::errors::AppError;
use common::utils::CredentialRedactor;

/// 审计时允许缓冲的最大请求体，与 axum 默认的 `Bytes` 提取上限一致
pub const MAX_AUDIT_BODY: usize = 2 * 1024 * 1024;

/// 缓冲请求体、记录脱敏后的内容，再原样交给后续处理
///
/// 超过 [`MAX_AUDIT_BODY`] 的请求体不再继续读取，直接按协议错误拒绝。
pub async fn audit_middleware(req: Request, next: Next) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_AUDIT_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(method = %parts.method, path = %parts.uri.path(), error = %e, "请求体无法读取或超出上限");
            return AppError::Protocol(format!(
                "Request body unreadable or larger than {} bytes: {}",
                MAX_AUDIT_BODY, e
            ))
            .into_response();
        }
    };

    tracing::info!(
        method = %parts.method,
        path = %parts.uri.path(),
        request_body = %describe_body(&bytes),
        "收到请求"
    );

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// 日志中使用的请求体描述
pub fn describe_body(body: &[u8]) -> String {
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    CredentialRedactor::redact_bytes(body)
        .unwrap_or_else(|| format!("<non-json body, {} bytes>", body.len()))
}
