//! 客户端配置模块
//!
//! 负责客户端可调参数的定义、TOML加载以及服务器/应用两级属性

pub mod foundation;
pub mod loader;
pub mod types;

// 重新导出主要类型
pub use foundation::Foundation;
pub use loader::{SettingsLoader, TomlSettingsLoader};
pub use types::{validate_settings, ClientSettings};
