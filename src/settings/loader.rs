//! 客户端配置加载器
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::error::{ConfigError, Result};
use crate::settings::types::{validate_settings, ClientSettings};
use regex::Regex;
use std::path::Path;

/// 配置加载器trait，定义配置加载接口
pub trait SettingsLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<ClientSettings>` - 加载的配置或错误
    fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ClientSettings>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<ClientSettings>` - 加载的配置或错误
    fn load_from_string(&self, content: &str) -> Result<ClientSettings>;

    /// 验证配置
    fn validate(&self, settings: &ClientSettings) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlSettingsLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlSettingsLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用 `${VAR}` 环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        // 匹配 ${VAR_NAME} 格式的环境变量
        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut missing = None;
        let result = env_var_regex.replace_all(content, |caps: &regex::Captures| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarError { var }.into()),
            None => Ok(result.into_owned()),
        }
    }

    fn parse_toml(&self, content: &str) -> Result<ClientSettings> {
        let processed_content = self.substitute_env_vars(content)?;

        let settings: ClientSettings = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(settings)
    }
}

impl Default for TomlSettingsLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SettingsLoader for TomlSettingsLoader {
    fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ClientSettings> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let settings = self.parse_toml(&content)?;
        self.validate(&settings)?;

        tracing::info!("成功加载客户端配置文件: {}", path.display());
        tracing::debug!("配置内容: {:?}", settings);

        Ok(settings)
    }

    fn load_from_string(&self, content: &str) -> Result<ClientSettings> {
        let settings = self.parse_toml(content)?;
        self.validate(&settings)?;

        tracing::debug!("成功解析客户端配置字符串");

        Ok(settings)
    }

    fn validate(&self, settings: &ClientSettings) -> Result<()> {
        validate_settings(settings).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::NamedTempFile;

    const TEST_SETTINGS_TOML: &str = r#"
app_id = "demo"
cluster = "blue"
connect_timeout_ms = 1500
refresh_interval_secs = 60
"#;

    #[test]
    fn test_toml_parsing() {
        let loader = TomlSettingsLoader::new(false);
        let settings = loader.load_from_string(TEST_SETTINGS_TOML).unwrap();

        assert_eq!(settings.app_id.as_deref(), Some("demo"));
        assert_eq!(settings.cluster.as_deref(), Some("blue"));
        assert_eq!(settings.connect_timeout_ms, 1500);
        assert_eq!(settings.refresh_interval_secs, 60);
        // 未指定的字段使用默认值
        assert_eq!(settings.read_timeout_ms, 5000);
    }

    #[test]
    #[serial]
    fn test_env_var_substitution() {
        env::set_var("CONFVAULT_TEST_APP", "from-env");

        let loader = TomlSettingsLoader::new(true);
        let settings = loader
            .load_from_string("app_id = \"${CONFVAULT_TEST_APP}\"\n")
            .unwrap();
        assert_eq!(settings.app_id.as_deref(), Some("from-env"));

        env::remove_var("CONFVAULT_TEST_APP");
    }

    #[test]
    #[serial]
    fn test_env_var_substitution_missing_var() {
        env::remove_var("CONFVAULT_MISSING_VAR");
        let loader = TomlSettingsLoader::new(true);
        let result = loader.load_from_string("app_id = \"${CONFVAULT_MISSING_VAR}\"\n");

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("CONFVAULT_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlSettingsLoader::new(false);
        let content = "test ${VAR} content";
        assert_eq!(loader.substitute_env_vars(content).unwrap(), content);
    }

    #[test]
    fn test_validation_failure() {
        let loader = TomlSettingsLoader::new(false);
        let result = loader.load_from_string("connect_timeout_ms = 0\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("连接超时"));
    }

    #[test]
    fn test_load_from_file() {
        let loader = TomlSettingsLoader::new(false);
        assert!(loader.load_from_file("/definitely/missing.toml").is_err());

        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), TEST_SETTINGS_TOML).unwrap();
        let settings = loader.load_from_file(file.path()).unwrap();
        assert_eq!(settings.app_id.as_deref(), Some("demo"));
    }
}
