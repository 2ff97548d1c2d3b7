//! 配置工厂
//!
//! 工厂决定命名空间的文件格式并构建对应的仓库链

use crate::config::{Config, ConfigFile, DefaultConfig};
use crate::error::{ConfigError, Result};
use crate::format::ConfigFileFormat;
use crate::manager::ConfigManager;
use crate::repository::{
    ConfigRepository, LocalFileConfigRepository, PropertiesCompatibleFileConfigRepository,
};
use crate::settings::{ClientSettings, Foundation};
use crate::spi::locator::ServiceLocator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 配置工厂契约
pub trait ConfigFactory: Send + Sync {
    /// 为命名空间创建配置
    ///
    /// # 参数
    /// * `namespace` - 命名空间
    /// * `manager` - 用于获取依赖的配置文件
    fn create(&self, namespace: &str, manager: &ConfigManager) -> Result<Arc<dyn Config>>;

    /// 为命名空间创建指定格式的配置文件
    fn create_config_file(
        &self,
        namespace: &str,
        format: ConfigFileFormat,
    ) -> Result<Arc<ConfigFile>>;
}

/// 远程仓库工厂契约
///
/// 远程长轮询传输不在本库内实现，由使用方通过该契约接入
pub trait RemoteRepositoryFactory: Send + Sync {
    fn create(&self, namespace: &str) -> Result<Arc<dyn ConfigRepository>>;
}

impl<F> RemoteRepositoryFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn ConfigRepository>> + Send + Sync,
{
    fn create(&self, namespace: &str) -> Result<Arc<dyn ConfigRepository>> {
        self(namespace)
    }
}

/// 默认工厂
pub struct DefaultConfigFactory {
    app_id: String,
    cluster: String,
    cache_root: PathBuf,
    local_mode: bool,
    cache_size: usize,
    cache_expire: Duration,
    remote: Option<Arc<dyn RemoteRepositoryFactory>>,
}

impl DefaultConfigFactory {
    /// 创建默认工厂
    ///
    /// 非本地模式下必须提供远程仓库工厂，否则视为发现失败
    ///
    /// # 参数
    /// * `settings` - 客户端配置
    /// * `foundation` - 服务器与应用两级属性
    /// * `remote` - 远程仓库工厂
    pub fn new(
        settings: &ClientSettings,
        foundation: &Foundation,
        remote: Option<Arc<dyn RemoteRepositoryFactory>>,
    ) -> Result<Self> {
        let local_mode = settings.is_in_local_mode(foundation);
        if !local_mode && remote.is_none() {
            return Err(ConfigError::DiscoveryFailed {
                contract: std::any::type_name::<dyn RemoteRepositoryFactory>().to_string(),
                reason: "非本地模式下未提供远程仓库实现".to_string(),
            }
            .into());
        }

        Ok(Self {
            app_id: settings.resolve_app_id(foundation),
            cluster: settings.resolve_cluster(foundation),
            cache_root: settings.default_local_cache_dir(foundation),
            local_mode,
            cache_size: usize::try_from(settings.max_config_cache_size).unwrap_or(usize::MAX),
            cache_expire: settings.config_cache_expire(),
            remote,
        })
    }

    /// 通过服务定位器解析远程仓库工厂后创建
    pub fn from_locator(
        locator: &ServiceLocator,
        settings: &ClientSettings,
        foundation: &Foundation,
    ) -> Result<Self> {
        let remote = if settings.is_in_local_mode(foundation) {
            None
        } else {
            Some(locator.resolve::<dyn RemoteRepositoryFactory>()?)
        };
        Self::new(settings, foundation, remote)
    }

    /// 根据命名空间后缀判断文件格式（忽略大小写）
    pub fn determine_file_format(namespace: &str) -> ConfigFileFormat {
        ConfigFileFormat::from_namespace(namespace)
    }

    /// 去掉命名空间的格式后缀
    pub fn trim_namespace_format(namespace: &str, format: ConfigFileFormat) -> &str {
        format.trim_namespace(namespace)
    }

    pub fn is_in_local_mode(&self) -> bool {
        self.local_mode
    }

    /// 缓存根目录（其下为 `config-cache`）
    pub fn cache_root(&self) -> &PathBuf {
        &self.cache_root
    }

    fn create_local_config_repository(
        &self,
        namespace: &str,
    ) -> Result<Arc<LocalFileConfigRepository>> {
        let upstream = if self.local_mode {
            warn!(
                "当前为本地模式，命名空间 {} 只从本地缓存加载配置",
                namespace
            );
            None
        } else {
            Some(self.create_remote_config_repository(namespace)?)
        };

        Ok(LocalFileConfigRepository::new(
            namespace,
            self.app_id.as_str(),
            self.cluster.as_str(),
            &self.cache_root,
            upstream,
        ))
    }

    fn create_remote_config_repository(
        &self,
        namespace: &str,
    ) -> Result<Arc<dyn ConfigRepository>> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| ConfigError::DiscoveryFailed {
                contract: std::any::type_name::<dyn RemoteRepositoryFactory>().to_string(),
                reason: "未提供远程仓库实现".to_string(),
            })?;
        remote.create(namespace)
    }
}

impl ConfigFactory for DefaultConfigFactory {
    fn create(&self, namespace: &str, manager: &ConfigManager) -> Result<Arc<dyn Config>> {
        let format = Self::determine_file_format(namespace);

        let repository: Arc<dyn ConfigRepository> = if format.is_properties_compatible() {
            let logical = Self::trim_namespace_format(namespace, format);
            debug!(
                "命名空间 {} 使用 {} 格式文件 {}",
                namespace, format, logical
            );
            let file = manager.get_config_file(logical, format)?;
            PropertiesCompatibleFileConfigRepository::new(file) as Arc<dyn ConfigRepository>
        } else {
            self.create_local_config_repository(namespace)? as Arc<dyn ConfigRepository>
        };

        Ok(DefaultConfig::new(
            namespace,
            repository,
            self.cache_size,
            self.cache_expire,
        ))
    }

    fn create_config_file(
        &self,
        namespace: &str,
        format: ConfigFileFormat,
    ) -> Result<Arc<ConfigFile>> {
        let repository = self.create_local_config_repository(namespace)?;
        Ok(ConfigFile::new(namespace, format, repository))
    }
}

/// 固定返回同一个配置的工厂，用于手动设置命名空间配置
pub struct StaticConfigFactory {
    config: Arc<dyn Config>,
}

impl StaticConfigFactory {
    pub fn new(config: Arc<dyn Config>) -> Self {
        Self { config }
    }
}

impl ConfigFactory for StaticConfigFactory {
    fn create(&self, _namespace: &str, _manager: &ConfigManager) -> Result<Arc<dyn Config>> {
        Ok(Arc::clone(&self.config))
    }

    fn create_config_file(
        &self,
        namespace: &str,
        _format: ConfigFileFormat,
    ) -> Result<Arc<ConfigFile>> {
        Err(ConfigError::Unsupported(format!(
            "手动设置的配置 {} 不提供配置文件",
            namespace
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ConfigSourceType;
    use tempfile::TempDir;

    fn local_settings(dir: &TempDir) -> ClientSettings {
        ClientSettings {
            app_id: Some("demo".to_string()),
            env: Some("LOCAL".to_string()),
            cache_dir: Some(dir.path().to_path_buf()),
            ..ClientSettings::default()
        }
    }

    #[test]
    fn test_determine_file_format() {
        assert_eq!(
            DefaultConfigFactory::determine_file_format("application.yml"),
            ConfigFileFormat::Yml
        );
        assert_eq!(
            DefaultConfigFactory::determine_file_format("application"),
            ConfigFileFormat::Properties
        );
        assert_eq!(
            DefaultConfigFactory::trim_namespace_format("application.yml", ConfigFileFormat::Yml),
            "application"
        );
        assert_eq!(
            DefaultConfigFactory::trim_namespace_format("application", ConfigFileFormat::Properties),
            "application"
        );
    }

    #[test]
    fn test_remote_required_outside_local_mode() {
        let settings = ClientSettings {
            app_id: Some("demo".to_string()),
            env: Some("DEV".to_string()),
            ..ClientSettings::default()
        };
        let result = DefaultConfigFactory::new(&settings, &Foundation::default(), None);
        assert!(result.err().unwrap().is_discovery_failure());

        let locator = ServiceLocator::new();
        let result = DefaultConfigFactory::from_locator(&locator, &settings, &Foundation::default());
        assert!(result.err().unwrap().is_discovery_failure());
    }

    #[test]
    fn test_local_mode_config_file() {
        let dir = TempDir::new().unwrap();
        let settings = local_settings(&dir);
        let factory = DefaultConfigFactory::new(&settings, &Foundation::default(), None).unwrap();
        assert!(factory.is_in_local_mode());
        assert_eq!(factory.cache_root(), &dir.path().join("demo"));

        let cache_dir = dir.path().join("demo").join("config-cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(
            cache_dir.join("demo+default+notes.txt.properties"),
            "content=hello\n",
        )
        .unwrap();

        let file = factory
            .create_config_file("notes.txt", ConfigFileFormat::Txt)
            .unwrap();
        assert_eq!(file.content().as_deref(), Some("hello"));
        assert_eq!(file.source_type(), ConfigSourceType::Local);
    }

    #[test]
    fn test_closure_remote_factory() {
        let dir = TempDir::new().unwrap();
        let mut settings = local_settings(&dir);
        settings.env = Some("DEV".to_string());

        let remote: Arc<dyn RemoteRepositoryFactory> =
            Arc::new(|namespace: &str| -> Result<Arc<dyn ConfigRepository>> {
                Err(ConfigError::LoadFailed {
                    namespace: namespace.to_string(),
                    reason: "offline".to_string(),
                }
                .into())
            });
        let factory =
            DefaultConfigFactory::new(&settings, &Foundation::default(), Some(remote)).unwrap();

        let result = factory.create_config_file("notes", ConfigFileFormat::Txt);
        assert!(result.is_err());
    }
}
