//! 配置文件格式

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 命名空间的文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFileFormat {
    /// 扁平 key=value，默认格式
    Properties,
    Xml,
    Json,
    Yml,
    Yaml,
    Txt,
}

impl ConfigFileFormat {
    /// 全部格式，按扩展名匹配顺序排列
    pub const ALL: [ConfigFileFormat; 6] = [
        ConfigFileFormat::Properties,
        ConfigFileFormat::Xml,
        ConfigFileFormat::Json,
        ConfigFileFormat::Yml,
        ConfigFileFormat::Yaml,
        ConfigFileFormat::Txt,
    ];

    /// 文件扩展名（不含点）
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Properties => "properties",
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Yml => "yml",
            Self::Yaml => "yaml",
            Self::Txt => "txt",
        }
    }

    /// 是否能渲染为扁平属性
    pub fn is_properties_compatible(&self) -> bool {
        matches!(self, Self::Yml | Self::Yaml)
    }

    /// 根据命名空间后缀判断格式（忽略大小写），无匹配时为 Properties
    pub fn from_namespace(namespace: &str) -> Self {
        let lower = namespace.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| lower.ends_with(&format!(".{}", format.extension())))
            .unwrap_or(Self::Properties)
    }

    /// 去掉命名空间的格式后缀
    ///
    /// # 参数
    /// * `namespace` - 原始命名空间，如 `application.yml`
    ///
    /// # 返回
    /// * `&str` - 逻辑命名空间，如 `application`；没有该后缀时原样返回
    pub fn trim_namespace<'a>(&self, namespace: &'a str) -> &'a str {
        let suffix_len = self.extension().len() + 1;
        if namespace.len() <= suffix_len {
            return namespace;
        }
        let split = namespace.len() - suffix_len;
        match namespace.get(split..) {
            Some(tail) if tail.eq_ignore_ascii_case(&format!(".{}", self.extension())) => {
                &namespace[..split]
            }
            _ => namespace,
        }
    }
}

impl fmt::Display for ConfigFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ConfigFileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == lower)
            .ok_or_else(|| format!("未知的配置文件格式: {}", s))
    }
}
