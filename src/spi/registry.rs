//! 手动注册的工厂

use crate::spi::factory::ConfigFactory;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// 命名空间到工厂的手动覆盖表，优先级高于任何自动解析
#[derive(Default)]
pub struct ConfigRegistry {
    factories: DashMap<String, Arc<dyn ConfigFactory>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为命名空间注册工厂，已存在时覆盖
    pub fn register(&self, namespace: &str, factory: Arc<dyn ConfigFactory>) {
        if self
            .factories
            .insert(namespace.to_string(), factory)
            .is_some()
        {
            info!("覆盖命名空间 {} 的手动注册工厂", namespace);
        }
    }

    pub fn get_factory(&self, namespace: &str) -> Option<Arc<dyn ConfigFactory>> {
        self.factories
            .get(namespace)
            .map(|entry| Arc::clone(entry.value()))
    }
}
