//! 服务定位器
//!
//! 按契约类型（可选名称）惰性解析可插拔实现。每个契约只解析一次，
//! 并发首次访问时只有一次解析真正执行；解析失败同样被缓存，
//! 之后的调用都会得到同一个发现失败错误。

use crate::error::{ConfigError, Result};
use parking_lot::{Mutex, RwLock};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

type Instance = Box<dyn Any + Send + Sync>;
type Provider = Arc<dyn Fn(&ServiceLocator) -> Result<Instance> + Send + Sync>;
type SlotKey = (TypeId, Option<String>);

#[derive(Default)]
struct Slot {
    providers: Mutex<Vec<Provider>>,
    resolved: OnceLock<std::result::Result<Instance, String>>,
}

/// 可插拔实现的解析器
#[derive(Default)]
pub struct ServiceLocator {
    slots: RwLock<HashMap<SlotKey, Arc<Slot>>>,
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册契约 `T` 的实现提供者，按注册顺序尝试
    pub fn register<T, F>(&self, provider: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceLocator) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add_provider::<T, F>(None, provider);
    }

    /// 注册带名称的实现提供者
    pub fn register_named<T, F>(&self, name: impl Into<String>, provider: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceLocator) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.add_provider::<T, F>(Some(name.into()), provider);
    }

    /// 注册现成的实例
    pub fn register_instance<T>(&self, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register::<T, _>(move |_| Ok(Arc::clone(&instance)));
    }

    /// 注册带名称的现成实例
    pub fn register_named_instance<T>(&self, name: impl Into<String>, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_named::<T, _>(name, move |_| Ok(Arc::clone(&instance)));
    }

    /// 解析契约 `T` 的默认实现
    ///
    /// # 返回
    /// * `Result<Arc<T>>` - 第一个成功的实现；没有注册或全部失败时为发现失败错误
    pub fn resolve<T>(&self) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.slot::<T>(None) {
            Some(slot) => self.resolve_slot::<T>(&slot, None),
            None => Err(discovery_failed::<T>("未注册任何实现".to_string())),
        }
    }

    /// 按名称查找契约 `T` 的实现
    ///
    /// # 返回
    /// * `Ok(None)` - 该名称未注册
    /// * `Ok(Some(_))` - 解析得到的实现
    /// * `Err(_)` - 已注册但解析失败
    pub fn lookup_named<T>(&self, name: &str) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.slot::<T>(Some(name)) {
            Some(slot) => self.resolve_slot::<T>(&slot, Some(name)).map(Some),
            None => Ok(None),
        }
    }

    fn add_provider<T, F>(&self, name: Option<String>, provider: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceLocator) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let provider: Provider = Arc::new(move |locator: &ServiceLocator| {
            provider(locator).map(|instance| Box::new(instance) as Instance)
        });

        let key = (TypeId::of::<T>(), name);
        let slot = {
            let mut slots = self.slots.write();
            Arc::clone(slots.entry(key).or_default())
        };

        if slot.resolved.get().is_some() {
            warn!("{} 已完成解析，新注册的实现将被忽略", type_name::<T>());
            return;
        }
        slot.providers.lock().push(provider);
    }

    fn slot<T: ?Sized + 'static>(&self, name: Option<&str>) -> Option<Arc<Slot>> {
        let key = (TypeId::of::<T>(), name.map(str::to_string));
        self.slots.read().get(&key).cloned()
    }

    fn resolve_slot<T>(&self, slot: &Slot, name: Option<&str>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        // 提供者可能再次访问定位器，此处不能持有映射锁
        let outcome = slot.resolved.get_or_init(|| {
            let providers = slot.providers.lock().clone();
            let mut failures = Vec::new();
            for provider in providers {
                match provider(self) {
                    Ok(instance) => {
                        debug!("已解析 {} 的实现 (name={:?})", type_name::<T>(), name);
                        return Ok(instance);
                    }
                    Err(e) => failures.push(e.to_string()),
                }
            }
            let reason = if failures.is_empty() {
                "未注册任何实现".to_string()
            } else {
                failures.join("; ")
            };
            error!("无法解析 {} 的实现: {}", type_name::<T>(), reason);
            Err(reason)
        });

        match outcome {
            Ok(instance) => instance
                .downcast_ref::<Arc<T>>()
                .cloned()
                .ok_or_else(|| discovery_failed::<T>("实现类型不匹配".to_string())),
            Err(reason) => Err(discovery_failed::<T>(reason.clone())),
        }
    }
}

fn discovery_failed<T: ?Sized>(reason: String) -> crate::error::ConfVaultError {
    ConfigError::DiscoveryFailed {
        contract: type_name::<T>().to_string(),
        reason,
    }
    .into()
}
