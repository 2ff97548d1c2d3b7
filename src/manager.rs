//! 配置管理器
//!
//! 每个命名空间只创建一次配置对象，之后始终返回同一个实例

use crate::config::{Config, ConfigFile};
use crate::error::Result;
use crate::format::ConfigFileFormat;
use crate::spi::ConfigFactoryManager;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// 单次赋值的槽位，创建期间持有槽位锁
type Cell<T> = Arc<Mutex<Option<T>>>;

pub struct ConfigManager {
    factory_manager: Arc<ConfigFactoryManager>,
    configs: DashMap<String, Cell<Arc<dyn Config>>>,
    config_files: DashMap<String, Cell<Arc<ConfigFile>>>,
}

impl ConfigManager {
    pub fn new(factory_manager: Arc<ConfigFactoryManager>) -> Self {
        Self {
            factory_manager,
            configs: DashMap::new(),
            config_files: DashMap::new(),
        }
    }

    /// 获取命名空间的配置
    ///
    /// 并发首次访问时只有一个调用方真正创建，其余等待并得到同一实例。
    /// 创建失败不会被记住，下次调用会重新尝试。
    ///
    /// # 参数
    /// * `namespace` - 命名空间，可带格式后缀如 `application.yml`
    pub fn get_config(&self, namespace: &str) -> Result<Arc<dyn Config>> {
        let cell = slot(&self.configs, namespace);
        let mut guard = cell.lock();
        if let Some(config) = guard.as_ref() {
            return Ok(Arc::clone(config));
        }

        let factory = self.factory_manager.get_factory(namespace)?;
        let config = factory.create(namespace, self)?;
        debug!("已创建命名空间 {} 的配置", namespace);
        *guard = Some(Arc::clone(&config));
        Ok(config)
    }

    /// 获取命名空间指定格式的配置文件
    ///
    /// 以 `{namespace}.{ext}` 作为键，工厂同样按该键解析
    pub fn get_config_file(
        &self,
        namespace: &str,
        format: ConfigFileFormat,
    ) -> Result<Arc<ConfigFile>> {
        let file_name = format!("{}.{}", namespace, format.extension());
        let cell = slot(&self.config_files, &file_name);
        let mut guard = cell.lock();
        if let Some(file) = guard.as_ref() {
            return Ok(Arc::clone(file));
        }

        let factory = self.factory_manager.get_factory(&file_name)?;
        let file = factory.create_config_file(&file_name, format)?;
        debug!("已创建配置文件 {}", file_name);
        *guard = Some(Arc::clone(&file));
        Ok(file)
    }
}

fn slot<T>(cells: &DashMap<String, Cell<T>>, key: &str) -> Cell<T> {
    if let Some(cell) = cells.get(key) {
        return Arc::clone(cell.value());
    }
    Arc::clone(cells.entry(key.to_string()).or_default().value())
}
