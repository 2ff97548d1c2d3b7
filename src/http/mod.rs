//! HTTP传输模块

pub mod client;

// 重新导出主要类型
pub use client::{HttpClient, HttpRequest, HttpResponse};
