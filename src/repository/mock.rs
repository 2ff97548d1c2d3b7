//! 测试用的内存仓库

use crate::error::{ConfigError, Result};
use crate::format::Properties;
use crate::repository::base::{
    ConfigRepository, ConfigSourceType, ListenerSet, RepositoryChangeListener,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 可控的上游仓库：可切换失败状态，可主动推送新快照
pub(crate) struct MockRepository {
    namespace: String,
    properties: RwLock<Option<Arc<Properties>>>,
    failing: AtomicBool,
    listeners: ListenerSet<dyn RepositoryChangeListener>,
}

impl MockRepository {
    pub(crate) fn new(namespace: &str, properties: Option<Properties>) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            properties: RwLock::new(properties.map(Arc::new)),
            failing: AtomicBool::new(false),
            listeners: ListenerSet::new(),
        })
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn push(&self, properties: Properties) {
        let properties = Arc::new(properties);
        *self.properties.write() = Some(Arc::clone(&properties));
        self.listeners.fire(&self.namespace, &properties);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ConfigRepository for MockRepository {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn get_config(&self) -> Result<Arc<Properties>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigError::LoadFailed {
                namespace: self.namespace.clone(),
                reason: "上游不可达".to_string(),
            }
            .into());
        }
        self.properties.read().clone().ok_or_else(|| {
            ConfigError::LoadFailed {
                namespace: self.namespace.clone(),
                reason: "无配置".to_string(),
            }
            .into()
        })
    }

    fn set_upstream_repository(&self, _upstream: Option<Arc<dyn ConfigRepository>>) {}

    fn add_change_listener(&self, listener: Arc<dyn RepositoryChangeListener>) {
        self.listeners.add(listener);
    }

    fn remove_change_listener(&self, listener: &Arc<dyn RepositoryChangeListener>) {
        self.listeners.remove(listener);
    }

    fn source_type(&self) -> ConfigSourceType {
        ConfigSourceType::Remote
    }

    fn sync(&self) -> Result<()> {
        self.get_config().map(|_| ())
    }
}
