//! 客户端入口
//!
//! `ConfigService` 持有服务定位器、手动注册表与配置管理器，
//! 通过 `ConfigServiceBuilder` 构建

use crate::config::{Config, ConfigFile};
use crate::error::{ConfigError, Result};
use crate::format::ConfigFileFormat;
use crate::manager::ConfigManager;
use crate::settings::{validate_settings, ClientSettings, Foundation};
use crate::spi::{
    ConfigFactory, ConfigFactoryManager, ConfigRegistry, DefaultConfigFactory,
    RemoteRepositoryFactory, ServiceLocator, StaticConfigFactory,
};
use std::sync::Arc;
use tracing::{info, warn};

/// 默认命名空间
pub const APPLICATION_NAMESPACE: &str = "application";

/// 配置客户端
pub struct ConfigService {
    settings: Arc<ClientSettings>,
    foundation: Arc<Foundation>,
    locator: Arc<ServiceLocator>,
    registry: Arc<ConfigRegistry>,
    manager: ConfigManager,
}

impl ConfigService {
    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    /// 获取 `application` 命名空间的配置
    pub fn get_app_config(&self) -> Result<Arc<dyn Config>> {
        self.get_config(APPLICATION_NAMESPACE)
    }

    /// 获取命名空间的配置
    ///
    /// 找不到可用的工厂或远程仓库实现时返回发现失败错误
    pub fn get_config(&self, namespace: &str) -> Result<Arc<dyn Config>> {
        self.manager.get_config(namespace)
    }

    /// 获取命名空间指定格式的配置文件
    pub fn get_config_file(
        &self,
        namespace: &str,
        format: ConfigFileFormat,
    ) -> Result<Arc<ConfigFile>> {
        self.manager.get_config_file(namespace, format)
    }

    /// 手动指定命名空间的配置，需在首次获取该命名空间之前调用
    pub fn set_config(&self, namespace: &str, config: Arc<dyn Config>) {
        self.registry
            .register(namespace, Arc::new(StaticConfigFactory::new(config)));
    }

    /// 手动指定命名空间的工厂，需在首次获取该命名空间之前调用
    pub fn set_config_factory(&self, namespace: &str, factory: Arc<dyn ConfigFactory>) {
        self.registry.register(namespace, factory);
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn foundation(&self) -> &Foundation {
        &self.foundation
    }

    /// 服务定位器，可用于解析已注册的可插拔实现
    pub fn locator(&self) -> &Arc<ServiceLocator> {
        &self.locator
    }
}

/// `ConfigService` 构建器
///
/// 使用方提供的实现先于默认实现注册，因此总是优先被解析
#[derive(Default)]
pub struct ConfigServiceBuilder {
    settings: Option<ClientSettings>,
    foundation: Option<Foundation>,
    remote_repository_factory: Option<Arc<dyn RemoteRepositoryFactory>>,
    config_factory: Option<Arc<dyn ConfigFactory>>,
    named_config_factories: Vec<(String, Arc<dyn ConfigFactory>)>,
}

impl ConfigServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 客户端配置；未设置时使用默认值并叠加 `CONFVAULT_*` 环境变量
    pub fn settings(mut self, settings: ClientSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 服务器与应用两级属性；未设置时从默认位置加载
    pub fn foundation(mut self, foundation: Foundation) -> Self {
        self.foundation = Some(foundation);
        self
    }

    /// 远程仓库实现，非本地模式下必须提供
    pub fn remote_repository_factory(mut self, factory: Arc<dyn RemoteRepositoryFactory>) -> Self {
        self.remote_repository_factory = Some(factory);
        self
    }

    /// 替换默认配置工厂
    pub fn config_factory(mut self, factory: Arc<dyn ConfigFactory>) -> Self {
        self.config_factory = Some(factory);
        self
    }

    /// 为指定命名空间提供专属工厂
    pub fn named_config_factory(
        mut self,
        namespace: impl Into<String>,
        factory: Arc<dyn ConfigFactory>,
    ) -> Self {
        self.named_config_factories.push((namespace.into(), factory));
        self
    }

    /// 构建客户端
    ///
    /// # 返回
    /// * `Result<ConfigService>` - 客户端配置校验失败时返回错误
    pub fn build(self) -> Result<ConfigService> {
        let settings = Arc::new(self.settings.unwrap_or_else(|| {
            let mut settings = ClientSettings::default();
            settings.apply_env_overrides();
            settings
        }));
        validate_settings(&settings).map_err(ConfigError::ValidationError)?;

        let foundation = Arc::new(match self.foundation {
            Some(foundation) => foundation,
            None => Foundation::load_default().unwrap_or_else(|e| {
                warn!("加载服务器属性失败，使用空属性: {}", e);
                Foundation::default()
            }),
        });

        let locator = Arc::new(ServiceLocator::new());
        if let Some(factory) = self.remote_repository_factory {
            locator.register_instance::<dyn RemoteRepositoryFactory>(factory);
        }
        if let Some(factory) = self.config_factory {
            locator.register_instance::<dyn ConfigFactory>(factory);
        }
        for (namespace, factory) in self.named_config_factories {
            locator.register_named_instance::<dyn ConfigFactory>(namespace, factory);
        }

        let default_settings = Arc::clone(&settings);
        let default_foundation = Arc::clone(&foundation);
        locator.register::<dyn ConfigFactory, _>(move |locator| {
            let factory =
                DefaultConfigFactory::from_locator(locator, &default_settings, &default_foundation)?;
            Ok(Arc::new(factory) as Arc<dyn ConfigFactory>)
        });

        let registry = Arc::new(ConfigRegistry::new());
        let factory_manager = Arc::new(ConfigFactoryManager::new(
            Arc::clone(&registry),
            Arc::clone(&locator),
        ));

        info!(
            "配置客户端已创建: app_id={}, cluster={}",
            settings.resolve_app_id(&foundation),
            settings.resolve_cluster(&foundation)
        );

        Ok(ConfigService {
            settings,
            foundation,
            locator,
            registry,
            manager: ConfigManager::new(factory_manager),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::base::same_instance;
    use crate::repository::mock::MockRepository;
    use crate::repository::{ConfigRepository, ConfigSourceType};
    use crate::config::DefaultConfig;
    use crate::format::Properties;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings_for(dir: &TempDir, env: &str) -> ClientSettings {
        ClientSettings {
            app_id: Some("demo".to_string()),
            env: Some(env.to_string()),
            cache_dir: Some(dir.path().to_path_buf()),
            ..ClientSettings::default()
        }
    }

    #[test]
    fn test_remote_backed_config() {
        let dir = TempDir::new().unwrap();
        let remote: Arc<dyn RemoteRepositoryFactory> =
            Arc::new(|namespace: &str| -> Result<Arc<dyn ConfigRepository>> {
                let mut properties = Properties::new();
                properties.insert("timeout".to_string(), "5000".to_string());
                Ok(MockRepository::new(namespace, Some(properties)))
            });

        let service = ConfigService::builder()
            .settings(settings_for(&dir, "DEV"))
            .foundation(Foundation::default())
            .remote_repository_factory(remote)
            .build()
            .unwrap();

        let config = service.get_app_config().unwrap();
        assert_eq!(config.get_int_property("timeout", 0), 5000);
        assert_eq!(config.source_type(), ConfigSourceType::Remote);
        assert!(same_instance(&config, &service.get_config("application").unwrap()));
    }

    #[test]
    fn test_missing_remote_is_discovery_failure() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::builder()
            .settings(settings_for(&dir, "DEV"))
            .foundation(Foundation::default())
            .build()
            .unwrap();

        let err = service.get_config("application").err().unwrap();
        assert!(err.is_discovery_failure());
    }

    #[test]
    fn test_set_config_override() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::builder()
            .settings(settings_for(&dir, "LOCAL"))
            .foundation(Foundation::default())
            .build()
            .unwrap();

        let mut properties = Properties::new();
        properties.insert("name".to_string(), "manual".to_string());
        let manual: Arc<dyn Config> = DefaultConfig::new(
            "FX.manual",
            MockRepository::new("FX.manual", Some(properties)),
            16,
            Duration::from_secs(60),
        );
        service.set_config("FX.manual", manual.clone());

        let config = service.get_config("FX.manual").unwrap();
        assert!(same_instance(&config, &manual));
        assert_eq!(config.get_property("name", ""), "manual");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = ClientSettings {
            retry_lower_bound_ms: 0,
            ..ClientSettings::default()
        };
        let result = ConfigService::builder()
            .settings(settings)
            .foundation(Foundation::default())
            .build();
        assert!(result.is_err());
    }
}
