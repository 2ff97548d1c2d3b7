//! 配置模块
//!
//! 变更模型、差异计算与通知、类型化读取缓存以及命名空间文件视图

pub mod change;
pub mod config_file;
pub mod default_config;
pub mod typed_cache;

// 重新导出主要类型
pub use change::{calc_property_changes, ConfigChange, ConfigChangeEvent, PropertyChangeType};
pub use config_file::{ConfigFile, ConfigFileChangeEvent, ConfigFileChangeListener};
pub use default_config::{Config, ConfigChangeListener, DefaultConfig};
