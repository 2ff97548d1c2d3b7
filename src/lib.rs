//! ConfVault - 拉取式配置中心客户端核心
//!
//! 这是一个用Rust编写的配置中心客户端库，支持：
//! - 上游失败时回落到本地文件缓存
//! - 配置差异计算与变更通知
//! - properties / YAML 等命名空间文件格式
//! - 可插拔的工厂与远程仓库实现
//! - 指数退避的定时刷新

pub mod config;
pub mod error;
pub mod format;
pub mod http;
pub mod logging;
pub mod manager;
pub mod repository;
pub mod schedule;
pub mod service;
pub mod settings;
pub mod spi;

// 重新导出主要类型
pub use config::{Config, ConfigChangeEvent, ConfigFile, PropertyChangeType};
pub use error::{ConfVaultError, Result};
pub use format::{ConfigFileFormat, Properties};
pub use repository::{ConfigRepository, ConfigSourceType};
pub use service::{ConfigService, ConfigServiceBuilder};
pub use settings::ClientSettings;

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
