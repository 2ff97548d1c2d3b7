//! 配置仓库契约
//!
//! 所有仓库（远程、本地缓存、格式适配）共享同一契约：提供属性快照、
//! 来源类型、可替换的上游，以及同步回调的变更监听器

use crate::error::Result;
use crate::format::Properties;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// 快照来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfigSourceType {
    /// 来自远程配置源
    Remote,
    /// 来自本地缓存文件
    Local,
    /// 加载失败
    None,
}

impl ConfigSourceType {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Remote,
            1 => Self::Local,
            _ => Self::None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Remote => 0,
            Self::Local => 1,
            Self::None => 2,
        }
    }
}

impl fmt::Display for ConfigSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Remote => "REMOTE",
            Self::Local => "LOCAL",
            Self::None => "NONE",
        };
        f.write_str(name)
    }
}

/// 可并发读写的来源类型
#[derive(Debug)]
pub struct SourceTypeCell(AtomicU8);

impl SourceTypeCell {
    pub fn new(source_type: ConfigSourceType) -> Self {
        Self(AtomicU8::new(source_type.as_u8()))
    }

    pub fn get(&self) -> ConfigSourceType {
        ConfigSourceType::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, source_type: ConfigSourceType) {
        self.0.store(source_type.as_u8(), Ordering::Release);
    }
}

impl Default for SourceTypeCell {
    fn default() -> Self {
        Self::new(ConfigSourceType::None)
    }
}

/// 仓库变更监听器
pub trait RepositoryChangeListener: Send + Sync {
    /// 上游仓库产生了新的快照
    ///
    /// # 参数
    /// * `namespace` - 命名空间
    /// * `properties` - 新快照
    fn on_repository_change(&self, namespace: &str, properties: &Arc<Properties>);
}

/// 配置仓库契约
pub trait ConfigRepository: Send + Sync {
    /// 仓库负责的命名空间
    fn namespace(&self) -> &str;

    /// 获取当前快照
    ///
    /// 从未成功同步过时会先同步一次；之后总是返回最后一次成功的快照
    fn get_config(&self) -> Result<Arc<Properties>>;

    /// 设置或替换上游仓库，`None` 表示解除上游
    fn set_upstream_repository(&self, upstream: Option<Arc<dyn ConfigRepository>>);

    /// 注册变更监听器，重复注册同一实例无效
    fn add_change_listener(&self, listener: Arc<dyn RepositoryChangeListener>);

    /// 移除变更监听器
    fn remove_change_listener(&self, listener: &Arc<dyn RepositoryChangeListener>);

    /// 当前快照的来源
    fn source_type(&self) -> ConfigSourceType;

    /// 执行一次同步
    fn sync(&self) -> Result<()>;

    /// 尝试同步，失败时记录日志并返回 `false`
    fn try_sync(&self) -> bool {
        match self.sync() {
            Ok(()) => true,
            Err(e) if e.is_contract_violation() => {
                error!("同步配置失败 [{}]: {}", self.namespace(), e);
                false
            }
            Err(e) => {
                warn!("同步配置失败 [{}]: {}", self.namespace(), e);
                false
            }
        }
    }
}

/// 监听器集合
///
/// 按注册顺序在调用线程上同步回调；回调前复制一份列表，
/// 回调中可以安全地增删监听器。单个监听器 panic 不影响后续监听器。
pub struct ListenerSet<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// 添加监听器，已存在时返回 `false`
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_instance(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// 移除监听器，不存在时返回 `false`
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_instance(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// 依次回调所有监听器
    pub fn for_each<F>(&self, mut notify: F)
    where
        F: FnMut(&L),
    {
        let snapshot: Vec<Arc<L>> = self.listeners.read().clone();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| notify(listener.as_ref()))).is_err() {
                error!("变更监听器执行失败，已跳过");
            }
        }
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet<dyn RepositoryChangeListener> {
    /// 向所有仓库监听器广播新快照
    pub fn fire(&self, namespace: &str, properties: &Arc<Properties>) {
        self.for_each(|listener| listener.on_repository_change(namespace, properties));
    }
}

/// 比较两个 `Arc` 是否指向同一实例（忽略 vtable）
pub fn same_instance<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
