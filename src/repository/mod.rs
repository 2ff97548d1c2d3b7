//! 配置仓库模块
//!
//! 仓库契约、本地文件缓存仓库以及格式适配仓库

pub mod base;
pub mod local_file;
pub mod properties_compatible;

#[cfg(test)]
pub(crate) mod mock;

// 重新导出主要类型
pub use base::{
    ConfigRepository, ConfigSourceType, ListenerSet, RepositoryChangeListener, SourceTypeCell,
};
pub use local_file::LocalFileConfigRepository;
pub use properties_compatible::PropertiesCompatibleFileConfigRepository;
