//! 工厂管理器
//!
//! 命名空间的工厂解析顺序：手动注册 > 缓存 > 按命名空间查找 > 默认实现

use crate::error::Result;
use crate::spi::factory::ConfigFactory;
use crate::spi::locator::ServiceLocator;
use crate::spi::registry::ConfigRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct ConfigFactoryManager {
    registry: Arc<ConfigRegistry>,
    locator: Arc<ServiceLocator>,
    factories: DashMap<String, Arc<dyn ConfigFactory>>,
}

impl ConfigFactoryManager {
    pub fn new(registry: Arc<ConfigRegistry>, locator: Arc<ServiceLocator>) -> Self {
        Self {
            registry,
            locator,
            factories: DashMap::new(),
        }
    }

    /// 获取命名空间对应的工厂
    ///
    /// 按命名空间查找和默认实现得到的工厂会被缓存；手动注册的工厂每次都优先
    pub fn get_factory(&self, namespace: &str) -> Result<Arc<dyn ConfigFactory>> {
        if let Some(factory) = self.registry.get_factory(namespace) {
            return Ok(factory);
        }

        if let Some(factory) = self.factories.get(namespace) {
            return Ok(Arc::clone(factory.value()));
        }

        let factory = match self.locator.lookup_named::<dyn ConfigFactory>(namespace)? {
            Some(factory) => {
                debug!("命名空间 {} 使用专属工厂", namespace);
                factory
            }
            None => self.locator.resolve::<dyn ConfigFactory>()?,
        };

        let factory = self
            .factories
            .entry(namespace.to_string())
            .or_insert(factory)
            .value()
            .clone();
        Ok(factory)
    }
}
