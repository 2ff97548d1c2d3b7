//! 配置读取与变更通知
//!
//! `DefaultConfig` 持有仓库链末端的仓库和最后一次采用的快照，
//! 仓库推送新快照时计算差异并通知感兴趣的监听器

use crate::config::change::{calc_property_changes, ConfigChangeEvent};
use crate::config::typed_cache::{
    parse_bool, parse_number, split_array, CacheableValue, TypedValueCache, ValueKind,
};
use crate::format::Properties;
use crate::repository::base::{
    same_instance, ConfigRepository, ConfigSourceType, RepositoryChangeListener, SourceTypeCell,
};
use arc_swap::ArcSwapOption;
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 配置变更监听器
pub trait ConfigChangeListener: Send + Sync {
    fn on_change(&self, event: &ConfigChangeEvent);
}

impl<F> ConfigChangeListener for F
where
    F: Fn(&ConfigChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ConfigChangeEvent) {
        self(event)
    }
}

/// 命名空间配置的读取接口
pub trait Config: Send + Sync {
    /// 命名空间
    fn namespace(&self) -> &str;

    /// 读取属性，不存在时为空
    fn property(&self, key: &str) -> Option<String>;

    /// 所有属性名
    fn property_names(&self) -> Vec<String>;

    /// 当前快照的来源
    fn source_type(&self) -> ConfigSourceType;

    /// 注册监听器并指定关注的键和键前缀
    ///
    /// # 参数
    /// * `listener` - 监听器
    /// * `interested_keys` - 关注的键，空集合等同于不过滤
    /// * `interested_key_prefixes` - 关注的键前缀，空集合等同于不过滤
    fn add_change_listener_with_filter(
        &self,
        listener: Arc<dyn ConfigChangeListener>,
        interested_keys: Option<HashSet<String>>,
        interested_key_prefixes: Option<HashSet<String>>,
    );

    /// 移除监听器
    fn remove_change_listener(&self, listener: &Arc<dyn ConfigChangeListener>) -> bool;

    /// 注册接收全部变更的监听器
    fn add_change_listener(&self, listener: Arc<dyn ConfigChangeListener>) {
        self.add_change_listener_with_filter(listener, None, None);
    }

    /// 读取属性，不存在时返回默认值
    fn get_property(&self, key: &str, default_value: &str) -> String {
        self.property(key)
            .unwrap_or_else(|| default_value.to_string())
    }

    fn get_int_property(&self, key: &str, default_value: i32) -> i32 {
        parse_or_default(self, key, default_value, parse_number)
    }

    fn get_long_property(&self, key: &str, default_value: i64) -> i64 {
        parse_or_default(self, key, default_value, parse_number)
    }

    fn get_float_property(&self, key: &str, default_value: f32) -> f32 {
        parse_or_default(self, key, default_value, parse_number)
    }

    fn get_double_property(&self, key: &str, default_value: f64) -> f64 {
        parse_or_default(self, key, default_value, parse_number)
    }

    fn get_boolean_property(&self, key: &str, default_value: bool) -> bool {
        parse_or_default(self, key, default_value, parse_bool)
    }

    /// 按正则分隔符读取数组
    fn get_array_property(
        &self,
        key: &str,
        delimiter: &str,
        default_value: Vec<String>,
    ) -> Vec<String> {
        parse_or_default(self, key, default_value, |raw| split_array(raw, delimiter))
    }
}

fn parse_or_default<C, T, F>(config: &C, key: &str, default_value: T, parse: F) -> T
where
    C: Config + ?Sized,
    F: FnOnce(&str) -> Result<T, String>,
{
    match config.property(key) {
        None => default_value,
        Some(raw) => match parse(&raw) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    "解析配置失败 [{}] {}={}: {}，使用默认值",
                    config.namespace(),
                    key,
                    raw,
                    e
                );
                default_value
            }
        },
    }
}

struct RegisteredListener {
    listener: Arc<dyn ConfigChangeListener>,
    interested_keys: Option<HashSet<String>>,
    interested_key_prefixes: Option<HashSet<String>>,
}

impl RegisteredListener {
    fn is_interested(&self, event: &ConfigChangeEvent) -> bool {
        if self.interested_keys.is_none() && self.interested_key_prefixes.is_none() {
            return true;
        }

        if let Some(keys) = &self.interested_keys {
            if keys.iter().any(|key| event.is_changed(key)) {
                return true;
            }
        }

        if let Some(prefixes) = &self.interested_key_prefixes {
            if event
                .changed_keys()
                .any(|key| prefixes.iter().any(|prefix| key.starts_with(prefix.as_str())))
            {
                return true;
            }
        }

        false
    }
}

/// 默认的配置实现
pub struct DefaultConfig {
    namespace: String,
    repository: Arc<dyn ConfigRepository>,
    properties: ArcSwapOption<Properties>,
    source_type: SourceTypeCell,
    /// 串行化变更处理；可重入，监听器中再次触发变更不会死锁
    update_lock: ReentrantMutex<()>,
    listeners: RwLock<Vec<RegisteredListener>>,
    typed_cache: TypedValueCache,
    repository_listener: Arc<dyn RepositoryChangeListener>,
}

struct RepositoryListener {
    config: Weak<DefaultConfig>,
}

impl RepositoryChangeListener for RepositoryListener {
    fn on_repository_change(&self, namespace: &str, properties: &Arc<Properties>) {
        if let Some(config) = self.config.upgrade() {
            config.handle_repository_change(namespace, properties);
        }
    }
}

impl DefaultConfig {
    /// 创建配置并完成首次加载
    ///
    /// 首次加载失败只记录日志，配置从空快照开始；无论成功与否都会注册到仓库上
    ///
    /// # 参数
    /// * `namespace` - 命名空间
    /// * `repository` - 仓库链末端的仓库
    /// * `cache_size` - 类型化读取缓存的最大条目数
    /// * `cache_expire` - 类型化读取缓存的过期时间
    pub fn new(
        namespace: impl Into<String>,
        repository: Arc<dyn ConfigRepository>,
        cache_size: usize,
        cache_expire: Duration,
    ) -> Arc<Self> {
        let config = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            namespace: namespace.into(),
            repository,
            properties: ArcSwapOption::empty(),
            source_type: SourceTypeCell::default(),
            update_lock: ReentrantMutex::new(()),
            listeners: RwLock::new(Vec::new()),
            typed_cache: TypedValueCache::new(cache_size, cache_expire),
            repository_listener: Arc::new(RepositoryListener {
                config: weak.clone(),
            }),
        });
        config.initialize();
        config
    }

    fn initialize(&self) {
        match self.repository.get_config() {
            Ok(properties) => {
                let _guard = self.update_lock.lock();
                self.properties.store(Some(properties));
                self.source_type.set(self.repository.source_type());
            }
            Err(e) => {
                warn!(
                    "初始化配置失败 [{}]，将以空配置启动: {}",
                    self.namespace, e
                );
            }
        }

        self.repository
            .add_change_listener(Arc::clone(&self.repository_listener));
    }

    fn handle_repository_change(&self, _namespace: &str, properties: &Arc<Properties>) {
        let _guard = self.update_lock.lock();

        let previous = self.properties.load_full();
        if previous.as_deref() == Some(properties.as_ref()) {
            return;
        }

        let empty = Properties::new();
        let changes = calc_property_changes(
            &self.namespace,
            previous.as_deref().unwrap_or(&empty),
            properties,
        );

        self.properties.store(Some(Arc::clone(properties)));
        self.source_type.set(self.repository.source_type());
        self.typed_cache.clear();

        if changes.is_empty() {
            return;
        }

        debug!(
            "配置发生变化 [{}]，变更键数: {}",
            self.namespace,
            changes.len()
        );
        let event = ConfigChangeEvent::new(self.namespace.clone(), changes);
        self.fire_config_change(&event);
    }

    fn fire_config_change(&self, event: &ConfigChangeEvent) {
        let interested: Vec<Arc<dyn ConfigChangeListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|registered| registered.is_interested(event))
            .map(|registered| Arc::clone(&registered.listener))
            .collect();

        for listener in interested {
            if catch_unwind(AssertUnwindSafe(|| listener.on_change(event))).is_err() {
                error!("配置变更监听器执行失败 [{}]", self.namespace);
            }
        }
    }

    fn cached_property<T: CacheableValue>(
        &self,
        kind: ValueKind,
        key: &str,
        default_value: T,
        parse: impl FnOnce(&str) -> Result<T, String>,
    ) -> T {
        if let Some(value) = self.typed_cache.get::<T>(&kind, key) {
            return value;
        }

        let version = self.typed_cache.version();
        let Some(raw) = self.property(key) else {
            return default_value;
        };

        match parse(&raw) {
            Ok(value) => {
                self.typed_cache.put(kind, key, value.clone(), version);
                value
            }
            Err(e) => {
                error!(
                    "解析配置失败 [{}] {}={}: {}，使用默认值",
                    self.namespace, key, raw, e
                );
                default_value
            }
        }
    }
}

impl Config for DefaultConfig {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn property(&self, key: &str) -> Option<String> {
        self.properties
            .load()
            .as_ref()
            .and_then(|properties| properties.get(key).cloned())
    }

    fn property_names(&self) -> Vec<String> {
        self.properties
            .load()
            .as_ref()
            .map(|properties| properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn source_type(&self) -> ConfigSourceType {
        self.source_type.get()
    }

    fn add_change_listener_with_filter(
        &self,
        listener: Arc<dyn ConfigChangeListener>,
        interested_keys: Option<HashSet<String>>,
        interested_key_prefixes: Option<HashSet<String>>,
    ) {
        let mut listeners = self.listeners.write();
        if listeners
            .iter()
            .any(|registered| same_instance(&registered.listener, &listener))
        {
            return;
        }

        listeners.push(RegisteredListener {
            listener,
            interested_keys: interested_keys.filter(|keys| !keys.is_empty()),
            interested_key_prefixes: interested_key_prefixes.filter(|p| !p.is_empty()),
        });
    }

    fn remove_change_listener(&self, listener: &Arc<dyn ConfigChangeListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registered| !same_instance(&registered.listener, listener));
        listeners.len() != before
    }

    fn get_int_property(&self, key: &str, default_value: i32) -> i32 {
        self.cached_property(ValueKind::Int, key, default_value, parse_number)
    }

    fn get_long_property(&self, key: &str, default_value: i64) -> i64 {
        self.cached_property(ValueKind::Long, key, default_value, parse_number)
    }

    fn get_float_property(&self, key: &str, default_value: f32) -> f32 {
        self.cached_property(ValueKind::Float, key, default_value, parse_number)
    }

    fn get_double_property(&self, key: &str, default_value: f64) -> f64 {
        self.cached_property(ValueKind::Double, key, default_value, parse_number)
    }

    fn get_boolean_property(&self, key: &str, default_value: bool) -> bool {
        self.cached_property(ValueKind::Boolean, key, default_value, parse_bool)
    }

    fn get_array_property(
        &self,
        key: &str,
        delimiter: &str,
        default_value: Vec<String>,
    ) -> Vec<String> {
        self.cached_property(
            ValueKind::Array(delimiter.to_string()),
            key,
            default_value,
            |raw| split_array(raw, delimiter),
        )
    }
}

impl Drop for DefaultConfig {
    fn drop(&mut self) {
        self.repository
            .remove_change_listener(&self.repository_listener);
    }
}
