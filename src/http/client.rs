//! 最小HTTP GET客户端
//!
//! 为远程配置仓库提供带超时策略的GET请求，约定：
//! 200 返回反序列化后的响应体，304 无响应体，其余状态码为带状态码的错误

use crate::error::{HttpError, Result};
use crate::settings::ClientSettings;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// GET请求描述
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// 请求地址
    pub url: String,
    /// 单次请求的连接超时，为空时使用客户端默认值
    pub connect_timeout: Option<Duration>,
    /// 单次请求的读取超时，为空时使用客户端默认值
    pub read_timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: None,
            read_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

/// GET响应
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse<T> {
    /// HTTP状态码（200 或 304）
    pub status_code: u16,
    /// 响应体，304 时为空
    pub body: Option<T>,
}

impl<T> HttpResponse<T> {
    pub fn is_not_modified(&self) -> bool {
        self.status_code == StatusCode::NOT_MODIFIED.as_u16()
    }
}

/// 阻塞式HTTP客户端
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpClient {
    /// 创建HTTP客户端
    ///
    /// # 参数
    /// * `connect_timeout` - 默认连接超时
    /// * `read_timeout` - 默认读取超时
    ///
    /// # 返回
    /// * `Result<Self>` - 客户端实例
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = build_client(connect_timeout)?;
        Ok(Self {
            client,
            connect_timeout,
            read_timeout,
        })
    }

    /// 使用客户端配置中的超时创建
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(settings.connect_timeout(), settings.read_timeout())
    }

    /// 执行GET请求
    ///
    /// # 参数
    /// * `request` - 请求描述
    ///
    /// # 返回
    /// * `Result<HttpResponse<T>>` - 200/304 响应，其余状态码返回 `HttpError::Status`
    pub fn do_get<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<HttpResponse<T>> {
        let connect_timeout = request.connect_timeout.unwrap_or(self.connect_timeout);
        let read_timeout = request.read_timeout.unwrap_or(self.read_timeout);

        // 连接超时只能在客户端级别设置
        let one_off;
        let client = if connect_timeout == self.connect_timeout {
            &self.client
        } else {
            one_off = build_client(connect_timeout)?;
            &one_off
        };

        debug!("GET {} (read timeout {:?})", request.url, read_timeout);
        let response = client
            .get(&request.url)
            .timeout(read_timeout)
            .send()
            .map_err(HttpError::Request)?;

        self.handle_response(&request.url, response)
    }

    fn handle_response<T: DeserializeOwned>(
        &self,
        url: &str,
        response: Response,
    ) -> Result<HttpResponse<T>> {
        let status = response.status();

        match status {
            StatusCode::OK => {
                let text = response.text().map_err(|e| read_failure(url, status, e))?;
                let body = serde_json::from_str::<T>(&text)
                    .map_err(|e| HttpError::Decode(format!("{}: {}", url, e)))?;
                Ok(HttpResponse {
                    status_code: status.as_u16(),
                    body: Some(body),
                })
            }
            StatusCode::NOT_MODIFIED => {
                // 读完响应体以便连接复用
                let _ = response.bytes().map_err(|e| read_failure(url, status, e))?;
                Ok(HttpResponse {
                    status_code: status.as_u16(),
                    body: None,
                })
            }
            _ => {
                let body = response.text().ok().filter(|b| !b.is_empty());
                Err(HttpError::Status {
                    status: status.as_u16(),
                    message: format!("Get operation failed for {}", url),
                    body,
                }
                .into())
            }
        }
    }
}

fn build_client(connect_timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
        .build()
        .map_err(HttpError::Request)?;
    Ok(client)
}

fn read_failure(url: &str, status: StatusCode, error: reqwest::Error) -> HttpError {
    HttpError::Status {
        status: status.as_u16(),
        message: format!("读取响应失败 {}: {}", url, error),
        body: None,
    }
}
