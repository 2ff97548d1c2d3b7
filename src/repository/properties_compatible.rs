//! 格式适配仓库
//!
//! 把可展开为扁平属性的配置文件（YAML/YML）包装成仓库，
//! 文件内容变化时重新同步并通知下游

use crate::config::config_file::{ConfigFile, ConfigFileChangeEvent, ConfigFileChangeListener};
use crate::error::{ConfigError, Result};
use crate::format::Properties;
use crate::repository::base::{
    ConfigRepository, ConfigSourceType, ListenerSet, RepositoryChangeListener,
};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// 以配置文件为数据源的仓库，自身即为上游
pub struct PropertiesCompatibleFileConfigRepository {
    config_file: Arc<ConfigFile>,
    cached_properties: ArcSwapOption<Properties>,
    sync_lock: Mutex<()>,
    listeners: ListenerSet<dyn RepositoryChangeListener>,
    file_listener: Arc<dyn ConfigFileChangeListener>,
}

struct FileChangeListener {
    repository: Weak<PropertiesCompatibleFileConfigRepository>,
}

impl ConfigFileChangeListener for FileChangeListener {
    fn on_change(&self, _event: &ConfigFileChangeEvent) {
        if let Some(repository) = self.repository.upgrade() {
            repository.try_sync();
        }
    }
}

impl PropertiesCompatibleFileConfigRepository {
    /// 创建适配仓库，注册文件监听并立即同步
    pub fn new(config_file: Arc<ConfigFile>) -> Arc<Self> {
        let repository = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            config_file,
            cached_properties: ArcSwapOption::empty(),
            sync_lock: Mutex::new(()),
            listeners: ListenerSet::new(),
            file_listener: Arc::new(FileChangeListener {
                repository: weak.clone(),
            }),
        });

        repository
            .config_file
            .add_change_listener(Arc::clone(&repository.file_listener));
        repository.try_sync();

        repository
    }

    pub fn config_file(&self) -> &Arc<ConfigFile> {
        &self.config_file
    }
}

impl ConfigRepository for PropertiesCompatibleFileConfigRepository {
    fn namespace(&self) -> &str {
        self.config_file.namespace()
    }

    fn get_config(&self) -> Result<Arc<Properties>> {
        if let Some(properties) = self.cached_properties.load_full() {
            return Ok(properties);
        }

        self.sync()?;
        self.cached_properties.load_full().ok_or_else(|| {
            ConfigError::LoadFailed {
                namespace: self.namespace().to_string(),
                reason: "同步后仍无可用配置".to_string(),
            }
            .into()
        })
    }

    /// 自身即为上游，忽略
    fn set_upstream_repository(&self, _upstream: Option<Arc<dyn ConfigRepository>>) {}

    fn add_change_listener(&self, listener: Arc<dyn RepositoryChangeListener>) {
        self.listeners.add(listener);
    }

    fn remove_change_listener(&self, listener: &Arc<dyn RepositoryChangeListener>) {
        self.listeners.remove(listener);
    }

    fn source_type(&self) -> ConfigSourceType {
        self.config_file.source_type()
    }

    fn sync(&self) -> Result<()> {
        let _guard = self.sync_lock.lock();

        let current = self.config_file.as_properties()?.ok_or_else(|| {
            ConfigError::ContractViolation(format!(
                "配置文件 {} 的格式 {} 无法展开为属性",
                self.config_file.namespace(),
                self.config_file.format()
            ))
        })?;

        if let Some(cached) = self.cached_properties.load_full() {
            if *cached == *current {
                return Ok(());
            }
        }

        debug!("适配仓库快照更新 [{}]", self.namespace());
        self.cached_properties.store(Some(Arc::clone(&current)));
        self.listeners.fire(self.namespace(), &current);
        Ok(())
    }
}

impl Drop for PropertiesCompatibleFileConfigRepository {
    fn drop(&mut self) {
        self.config_file.remove_change_listener(&self.file_listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_file::CONFIG_FILE_CONTENT_KEY;
    use crate::format::ConfigFileFormat;
    use crate::repository::mock::MockRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn yaml(content: &str) -> Properties {
        let mut props = Properties::new();
        props.insert(CONFIG_FILE_CONTENT_KEY.to_string(), content.to_string());
        props
    }

    struct Counter(AtomicUsize);

    impl RepositoryChangeListener for Counter {
        fn on_repository_change(&self, _namespace: &str, _properties: &Arc<Properties>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_renders_yaml_as_properties() {
        let upstream = MockRepository::new("application.yml", Some(yaml("db:\n  url: x\n")));
        let file = ConfigFile::new("application.yml", ConfigFileFormat::Yml, upstream);
        let repository = PropertiesCompatibleFileConfigRepository::new(file);

        assert_eq!(repository.namespace(), "application.yml");
        assert_eq!(repository.source_type(), ConfigSourceType::Remote);
        assert_eq!(
            repository.get_config().unwrap().get("db.url"),
            Some(&"x".to_string())
        );
    }

    #[test]
    fn test_file_change_propagates_once() {
        let upstream = MockRepository::new("application.yml", Some(yaml("a: 1\n")));
        let file = ConfigFile::new("application.yml", ConfigFileFormat::Yml, upstream.clone());
        let repository = PropertiesCompatibleFileConfigRepository::new(file);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        repository.add_change_listener(counter.clone());

        upstream.push(yaml("a: 2\n"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(repository.get_config().unwrap().get("a"), Some(&"2".to_string()));

        // 文本不同但展开结果相同，不再通知
        upstream.push(yaml("a: 2   \n"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        assert!(repository.try_sync());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_compatible_format_is_contract_violation() {
        let upstream = MockRepository::new("data.json", Some(yaml("{}")));
        let file = ConfigFile::new("data.json", ConfigFileFormat::Json, upstream);
        let repository = PropertiesCompatibleFileConfigRepository::new(file);

        let err = repository.sync().unwrap_err();
        assert!(err.is_contract_violation());
        assert!(!repository.try_sync());
        assert!(repository.get_config().is_err());
    }

    #[test]
    fn test_set_upstream_is_noop() {
        let upstream = MockRepository::new("application.yml", Some(yaml("a: 1\n")));
        let file = ConfigFile::new("application.yml", ConfigFileFormat::Yml, upstream);
        let repository = PropertiesCompatibleFileConfigRepository::new(file);

        let other = MockRepository::new("other", Some(Properties::new()));
        repository.set_upstream_repository(Some(other.clone()));
        assert_eq!(other.listener_count(), 0);
        assert_eq!(repository.get_config().unwrap().get("a"), Some(&"1".to_string()));
    }
}
