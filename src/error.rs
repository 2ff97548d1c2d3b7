//! 错误处理模块
//!
//! 定义配置客户端的统一错误类型

use thiserror::Error;

/// confvault 的主要错误类型
#[derive(Error, Debug)]
pub enum ConfVaultError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// HTTP传输相关错误
    #[error("HTTP错误: {0}")]
    Http(#[from] HttpError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl ConfVaultError {
    /// 是否为服务发现失败（致命，不会自动重试）
    pub fn is_discovery_failure(&self) -> bool {
        matches!(self, Self::Config(ConfigError::DiscoveryFailed { .. }))
    }

    /// 是否为适配器契约违例
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::Config(ConfigError::ContractViolation(_)))
    }

    /// 若为状态码错误，返回HTTP状态码
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(HttpError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 上游与本地缓存均不可用
    #[error("加载配置失败 [{namespace}]: {reason}")]
    LoadFailed { namespace: String, reason: String },

    /// 配置内容解析错误
    #[error("配置解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },

    /// 可插拔实现解析失败
    #[error("无法解析 {contract} 的实现: {reason}")]
    DiscoveryFailed { contract: String, reason: String },

    /// 适配器违反契约（编程错误）
    #[error("契约违例: {0}")]
    ContractViolation(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),
}

/// HTTP错误类型
#[derive(Error, Debug)]
pub enum HttpError {
    /// 非 200/304 状态码
    #[error("HTTP状态码 {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// 服务端返回的错误内容
        body: Option<String>,
    },

    /// 请求或读取响应失败
    #[error("HTTP请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 响应体反序列化失败
    #[error("响应解析失败: {0}")]
    Decode(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConfVaultError>;
