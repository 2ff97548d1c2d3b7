//! 客户端配置数据结构
//!
//! 定义配置客户端自身的可调参数以及验证逻辑

use crate::settings::foundation::Foundation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, warn};

/// 未设置应用ID时使用的占位符
pub const NO_APPID_PLACEHOLDER: &str = "NoAppIdPlaceHolder";

/// 默认集群名
pub const CLUSTER_NAME_DEFAULT: &str = "default";

/// 本地模式的环境名
pub const LOCAL_ENV: &str = "LOCAL";

/// 缓存目录属性键（server/app 两级属性文件中使用）
pub const CACHE_DIR_PROPERTY: &str = "confvault.cacheDir";

/// 缓存目录环境变量
pub const CACHE_DIR_ENV: &str = "CONFVAULT_CACHEDIR";

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSettings {
    /// 应用ID，为空时回退到 app.properties 的 app.id
    #[serde(default)]
    pub app_id: Option<String>,
    /// 集群，为空时依次回退到数据中心和 `default`
    #[serde(default)]
    pub cluster: Option<String>,
    /// 数据中心
    #[serde(default)]
    pub data_center: Option<String>,
    /// 运行环境，`LOCAL` 表示只使用本地缓存
    #[serde(default)]
    pub env: Option<String>,
    /// 显式指定的缓存根目录
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 读取超时（毫秒）
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// 定时刷新间隔（秒）
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// 加载配置的QPS
    #[serde(default = "default_qps")]
    pub load_config_qps: u32,
    /// 长轮询QPS
    #[serde(default = "default_qps")]
    pub long_poll_qps: u32,
    /// 出错后的重试间隔（秒）
    #[serde(default = "default_on_error_retry_interval")]
    pub on_error_retry_interval_secs: u64,
    /// 退避下限（毫秒）
    #[serde(default = "default_retry_lower_bound")]
    pub retry_lower_bound_ms: u64,
    /// 退避上限（毫秒）
    #[serde(default = "default_retry_upper_bound")]
    pub retry_upper_bound_ms: u64,
    /// 类型化读取缓存的最大条目数
    #[serde(default = "default_max_cache_size")]
    pub max_config_cache_size: u64,
    /// 类型化读取缓存的过期时间（秒）
    #[serde(default = "default_cache_expire")]
    pub config_cache_expire_secs: u64,
    /// 长轮询初始延迟（毫秒）
    #[serde(default = "default_initial_delay")]
    pub long_polling_initial_delay_ms: u64,
    /// 是否自动更新已注入的属性
    #[serde(default = "default_auto_update")]
    pub auto_update_injected_properties: bool,
}

// 默认值函数
fn default_connect_timeout() -> u64 {
    1000
}
fn default_read_timeout() -> u64 {
    5000
}
fn default_refresh_interval() -> u64 {
    300 // 5分钟
}
fn default_qps() -> u32 {
    2
}
fn default_on_error_retry_interval() -> u64 {
    1
}
fn default_retry_lower_bound() -> u64 {
    1000
}
fn default_retry_upper_bound() -> u64 {
    120_000
}
fn default_max_cache_size() -> u64 {
    500
}
fn default_cache_expire() -> u64 {
    60
}
fn default_initial_delay() -> u64 {
    2000
}
fn default_auto_update() -> bool {
    true
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            app_id: None,
            cluster: None,
            data_center: None,
            env: None,
            cache_dir: None,
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            load_config_qps: default_qps(),
            long_poll_qps: default_qps(),
            on_error_retry_interval_secs: default_on_error_retry_interval(),
            retry_lower_bound_ms: default_retry_lower_bound(),
            retry_upper_bound_ms: default_retry_upper_bound(),
            max_config_cache_size: default_max_cache_size(),
            config_cache_expire_secs: default_cache_expire(),
            long_polling_initial_delay_ms: default_initial_delay(),
            auto_update_injected_properties: default_auto_update(),
        }
    }
}

impl ClientSettings {
    /// 使用 `CONFVAULT_*` 环境变量覆盖配置
    ///
    /// 无法解析的值记录错误日志后忽略，保留原值
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = read_env("CONFVAULT_APP_ID") {
            self.app_id = Some(value);
        }
        if let Some(value) = read_env("CONFVAULT_CLUSTER") {
            self.cluster = Some(value);
        }
        if let Some(value) = read_env("CONFVAULT_ENV") {
            self.env = Some(value);
        }
        override_parsed("CONFVAULT_CONNECT_TIMEOUT", &mut self.connect_timeout_ms);
        override_parsed("CONFVAULT_READ_TIMEOUT", &mut self.read_timeout_ms);
        override_parsed("CONFVAULT_REFRESH_INTERVAL", &mut self.refresh_interval_secs);
        override_parsed("CONFVAULT_LOAD_CONFIG_QPS", &mut self.load_config_qps);
        override_parsed("CONFVAULT_LONG_POLL_QPS", &mut self.long_poll_qps);
        override_parsed("CONFVAULT_CONFIG_CACHE_SIZE", &mut self.max_config_cache_size);
        override_parsed(
            "CONFVAULT_LONG_POLLING_INITIAL_DELAY",
            &mut self.long_polling_initial_delay_ms,
        );
        override_parsed(
            "CONFVAULT_AUTO_UPDATE_INJECTED_PROPERTIES",
            &mut self.auto_update_injected_properties,
        );
    }

    /// 解析应用ID：显式配置 > app.properties > 占位符
    pub fn resolve_app_id(&self, foundation: &Foundation) -> String {
        if let Some(app_id) = non_empty(self.app_id.as_deref()) {
            return app_id.to_string();
        }
        match foundation.app_id() {
            Some(app_id) => app_id,
            None => {
                warn!(
                    "未设置 app.id，将只能加载公共命名空间的配置，请在 app.properties 中设置"
                );
                NO_APPID_PLACEHOLDER.to_string()
            }
        }
    }

    /// 解析集群：显式配置 > 数据中心 > `default`
    pub fn resolve_cluster(&self, foundation: &Foundation) -> String {
        non_empty(self.cluster.as_deref())
            .map(str::to_string)
            .or_else(|| self.resolve_data_center(foundation))
            .unwrap_or_else(|| CLUSTER_NAME_DEFAULT.to_string())
    }

    /// 解析数据中心
    pub fn resolve_data_center(&self, foundation: &Foundation) -> Option<String> {
        non_empty(self.data_center.as_deref())
            .map(str::to_string)
            .or_else(|| foundation.data_center())
    }

    /// 解析运行环境
    pub fn resolve_env(&self, foundation: &Foundation) -> Option<String> {
        non_empty(self.env.as_deref())
            .map(str::to_string)
            .or_else(|| foundation.env())
    }

    /// 是否为本地模式（不访问远程配置源）
    pub fn is_in_local_mode(&self, foundation: &Foundation) -> bool {
        self.resolve_env(foundation)
            .map(|env| env.trim().eq_ignore_ascii_case(LOCAL_ENV))
            .unwrap_or(false)
    }

    /// 计算默认的本地缓存目录
    ///
    /// 依次尝试：显式配置、环境变量、server.properties、app.properties，
    /// 取到的根目录下再拼接应用ID；都没有时使用系统默认模板。
    ///
    /// # 参数
    /// * `foundation` - 服务器与应用两级属性
    ///
    /// # 返回
    /// * `PathBuf` - 缓存根目录（不含 `config-cache` 子目录）
    pub fn default_local_cache_dir(&self, foundation: &Foundation) -> PathBuf {
        let app_id = self.resolve_app_id(foundation);

        if let Some(root) = self.customized_cache_root(foundation) {
            return root.join(app_id);
        }

        if cfg!(windows) {
            PathBuf::from(format!("C:\\opt\\data\\{}", app_id))
        } else {
            PathBuf::from(format!("/opt/data/{}", app_id))
        }
    }

    fn customized_cache_root(&self, foundation: &Foundation) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            if !dir.as_os_str().is_empty() {
                return Some(dir.clone());
            }
        }
        read_env(CACHE_DIR_ENV)
            .or_else(|| foundation.server_property(CACHE_DIR_PROPERTY))
            .or_else(|| foundation.app_property(CACHE_DIR_PROPERTY))
            .map(PathBuf::from)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn on_error_retry_interval(&self) -> Duration {
        Duration::from_secs(self.on_error_retry_interval_secs)
    }

    pub fn config_cache_expire(&self) -> Duration {
        Duration::from_secs(self.config_cache_expire_secs)
    }

    pub fn long_polling_initial_delay(&self) -> Duration {
        Duration::from_millis(self.long_polling_initial_delay_ms)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn override_parsed<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Some(raw) = read_env(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => error!("环境变量 {} 的值无效: {}", name, raw),
        }
    }
}

/// 配置验证函数
///
/// # 参数
/// * `settings` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_settings(settings: &ClientSettings) -> Result<(), String> {
    if settings.connect_timeout_ms == 0 {
        return Err("连接超时时间不能为0".to_string());
    }

    if settings.read_timeout_ms == 0 {
        return Err("读取超时时间不能为0".to_string());
    }

    if settings.refresh_interval_secs == 0 {
        return Err("刷新间隔不能为0".to_string());
    }

    if settings.load_config_qps == 0 || settings.long_poll_qps == 0 {
        return Err("QPS不能为0".to_string());
    }

    if settings.retry_lower_bound_ms == 0 {
        return Err("退避下限不能为0".to_string());
    }

    if settings.retry_lower_bound_ms > settings.retry_upper_bound_ms {
        return Err(format!(
            "退避下限 {} 不能大于上限 {}",
            settings.retry_lower_bound_ms, settings.retry_upper_bound_ms
        ));
    }

    if let Some(app_id) = &settings.app_id {
        if app_id.contains(['/', '\\', '+']) {
            return Err(format!("应用ID包含非法字符: {}", app_id));
        }
    }

    Ok(())
}
