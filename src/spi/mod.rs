//! 可插拔实现模块
//!
//! 服务定位器、配置工厂、手动注册表与工厂管理器

pub mod factory;
pub mod factory_manager;
pub mod locator;
pub mod registry;

// 重新导出主要类型
pub use factory::{ConfigFactory, DefaultConfigFactory, RemoteRepositoryFactory, StaticConfigFactory};
pub use factory_manager::ConfigFactoryManager;
pub use locator::ServiceLocator;
pub use registry::ConfigRegistry;
