//! 服务器与应用两级属性
//!
//! 服务器级属性来自 `server.properties`（环境、数据中心等机器信息），
//! 应用级属性来自 `app.properties`（应用ID等）。

use crate::error::{ConfigError, Result};
use crate::format::properties::{self, Properties};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 应用ID属性键
pub const APP_ID_KEY: &str = "app.id";
/// 环境属性键
pub const ENV_KEY: &str = "env";
/// 数据中心属性键
pub const IDC_KEY: &str = "idc";

/// 两级属性集合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Foundation {
    server: Properties,
    app: Properties,
}

impl Foundation {
    /// 直接由属性快照构建
    pub fn from_properties(server: Properties, app: Properties) -> Self {
        Self { server, app }
    }

    /// 从属性文件加载
    ///
    /// 文件不存在时该级属性为空；存在但无法读取时返回错误。
    /// 环境变量 `ENV`/`IDC` 优先于 server.properties 中的 `env`/`idc`。
    ///
    /// # 参数
    /// * `server_path` - server.properties 路径
    /// * `app_path` - app.properties 路径
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(server_path: P, app_path: Q) -> Result<Self> {
        let mut server = read_optional(server_path.as_ref())?;
        let app = read_optional(app_path.as_ref())?;

        for (var, key) in [("ENV", ENV_KEY), ("IDC", IDC_KEY)] {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    server.insert(key.to_string(), value.trim().to_string());
                }
            }
        }

        Ok(Self { server, app })
    }

    /// 从默认位置加载
    pub fn load_default() -> Result<Self> {
        Self::load(default_server_properties_path(), "app.properties")
    }

    pub fn app_id(&self) -> Option<String> {
        self.app_property(APP_ID_KEY)
    }

    pub fn env(&self) -> Option<String> {
        self.server_property(ENV_KEY)
    }

    pub fn data_center(&self) -> Option<String> {
        self.server_property(IDC_KEY)
    }

    /// 服务器级属性，空值视为不存在
    pub fn server_property(&self, key: &str) -> Option<String> {
        lookup(&self.server, key)
    }

    /// 应用级属性，空值视为不存在
    pub fn app_property(&self, key: &str) -> Option<String> {
        lookup(&self.app, key)
    }
}

/// server.properties 的默认位置
pub fn default_server_properties_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:\\opt\\settings\\server.properties")
    } else {
        PathBuf::from("/opt/settings/server.properties")
    }
}

fn lookup(props: &Properties, key: &str) -> Option<String> {
    props
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_optional(path: &Path) -> Result<Properties> {
    if !path.exists() {
        debug!("属性文件不存在，跳过: {}", path.display());
        return Ok(Properties::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
        namespace: path.display().to_string(),
        reason: e.to_string(),
    })?;
    debug!("已加载属性文件: {}", path.display());
    Ok(properties::parse(&content))
}
