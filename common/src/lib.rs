//! 联邦查询网关公共模块
//!
//! 提供网关各组件共享的：
//! - 数据模型（状态、查询请求、资源、查询记录）
//! - 统一错误类型与响应格式
//! - 配置加载与校验
//! - 中间件与工具（请求 ID、凭证脱敏）

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
