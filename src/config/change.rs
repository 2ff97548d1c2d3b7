//! 配置变更模型与差异计算

use crate::format::Properties;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 属性变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyChangeType {
    /// 新增
    Added,
    /// 值被修改
    Modified,
    /// 被删除
    Deleted,
}

impl fmt::Display for PropertyChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
        };
        f.write_str(name)
    }
}

/// 单个属性的变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChange {
    /// 所属命名空间
    pub namespace: String,
    /// 属性名
    pub property_name: String,
    /// 旧值，新增时为空
    pub old_value: Option<String>,
    /// 新值，删除时为空
    pub new_value: Option<String>,
    /// 变更类型
    pub change_type: PropertyChangeType,
}

/// 配置变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeEvent {
    namespace: String,
    changes: BTreeMap<String, ConfigChange>,
}

impl ConfigChangeEvent {
    pub fn new(namespace: impl Into<String>, changes: BTreeMap<String, ConfigChange>) -> Self {
        Self {
            namespace: namespace.into(),
            changes,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 发生变化的属性名
    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn get_change(&self, key: &str) -> Option<&ConfigChange> {
        self.changes.get(key)
    }

    pub fn is_changed(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn changes(&self) -> &BTreeMap<String, ConfigChange> {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// 计算两个快照之间的属性变更
///
/// 值相同的键不会出现在结果中；两个快照值相等时结果为空。
///
/// # 参数
/// * `namespace` - 命名空间
/// * `previous` - 旧快照
/// * `current` - 新快照
///
/// # 返回
/// * `BTreeMap<String, ConfigChange>` - 以属性名为键的变更集合
pub fn calc_property_changes(
    namespace: &str,
    previous: &Properties,
    current: &Properties,
) -> BTreeMap<String, ConfigChange> {
    let mut changes = BTreeMap::new();

    let previous_keys: BTreeSet<&String> = previous.keys().collect();
    let current_keys: BTreeSet<&String> = current.keys().collect();

    for key in previous_keys.difference(&current_keys) {
        changes.insert(
            (*key).clone(),
            ConfigChange {
                namespace: namespace.to_string(),
                property_name: (*key).clone(),
                old_value: previous.get(*key).cloned(),
                new_value: None,
                change_type: PropertyChangeType::Deleted,
            },
        );
    }

    for key in current_keys.difference(&previous_keys) {
        changes.insert(
            (*key).clone(),
            ConfigChange {
                namespace: namespace.to_string(),
                property_name: (*key).clone(),
                old_value: None,
                new_value: current.get(*key).cloned(),
                change_type: PropertyChangeType::Added,
            },
        );
    }

    for key in previous_keys.intersection(&current_keys) {
        let old_value = previous.get(*key);
        let new_value = current.get(*key);
        if old_value == new_value {
            continue;
        }
        changes.insert(
            (*key).clone(),
            ConfigChange {
                namespace: namespace.to_string(),
                property_name: (*key).clone(),
                old_value: old_value.cloned(),
                new_value: new_value.cloned(),
                change_type: PropertyChangeType::Modified,
            },
        );
    }

    changes
}
