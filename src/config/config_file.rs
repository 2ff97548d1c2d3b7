//! 命名空间文件视图
//!
//! 以文件形式读取命名空间：properties 格式把快照渲染为文本，
//! 其余格式取 `content` 键的值。YAML/YML 可以再展开为扁平属性。

use crate::config::change::PropertyChangeType;
use crate::error::Result;
use crate::format::{properties, yaml, ConfigFileFormat, Properties};
use crate::repository::base::{
    ConfigRepository, ConfigSourceType, ListenerSet, RepositoryChangeListener, SourceTypeCell,
};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// 非 properties 格式存放文件内容的键
pub const CONFIG_FILE_CONTENT_KEY: &str = "content";

/// 文件内容变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileChangeEvent {
    pub namespace: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: PropertyChangeType,
}

/// 文件内容变更监听器
pub trait ConfigFileChangeListener: Send + Sync {
    fn on_change(&self, event: &ConfigFileChangeEvent);
}

impl<F> ConfigFileChangeListener for F
where
    F: Fn(&ConfigFileChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ConfigFileChangeEvent) {
        self(event)
    }
}

/// 命名空间文件
pub struct ConfigFile {
    namespace: String,
    format: ConfigFileFormat,
    repository: Arc<dyn ConfigRepository>,
    properties: ArcSwapOption<Properties>,
    source_type: SourceTypeCell,
    /// 串行化变更处理；可重入，监听器中再次触发变更不会死锁
    update_lock: ReentrantMutex<()>,
    /// 展开结果缓存，记录其来源快照
    flattened: Mutex<Option<(Arc<Properties>, Arc<Properties>)>>,
    listeners: ListenerSet<dyn ConfigFileChangeListener>,
    repository_listener: Arc<dyn RepositoryChangeListener>,
}

struct FileRepositoryListener {
    file: Weak<ConfigFile>,
}

impl RepositoryChangeListener for FileRepositoryListener {
    fn on_repository_change(&self, namespace: &str, properties: &Arc<Properties>) {
        if let Some(file) = self.file.upgrade() {
            file.handle_repository_change(namespace, properties);
        }
    }
}

impl ConfigFile {
    /// 创建文件视图并完成首次加载
    ///
    /// # 参数
    /// * `namespace` - 带扩展名的命名空间，如 `application.yml`
    /// * `format` - 文件格式
    /// * `repository` - 提供快照的仓库
    pub fn new(
        namespace: impl Into<String>,
        format: ConfigFileFormat,
        repository: Arc<dyn ConfigRepository>,
    ) -> Arc<Self> {
        let file = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            namespace: namespace.into(),
            format,
            repository,
            properties: ArcSwapOption::empty(),
            source_type: SourceTypeCell::default(),
            update_lock: ReentrantMutex::new(()),
            flattened: Mutex::new(None),
            listeners: ListenerSet::new(),
            repository_listener: Arc::new(FileRepositoryListener { file: weak.clone() }),
        });
        file.initialize();
        file
    }

    fn initialize(&self) {
        match self.repository.get_config() {
            Ok(properties) => {
                self.properties.store(Some(properties));
                self.source_type.set(self.repository.source_type());
            }
            Err(e) => warn!("初始化配置文件失败 [{}]: {}", self.namespace, e),
        }

        self.repository
            .add_change_listener(Arc::clone(&self.repository_listener));
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn format(&self) -> ConfigFileFormat {
        self.format
    }

    pub fn source_type(&self) -> ConfigSourceType {
        self.source_type.get()
    }

    /// 文件内容，无内容时为空
    pub fn content(&self) -> Option<String> {
        let snapshot = self.properties.load_full()?;
        render_content(self.format, &snapshot)
    }

    pub fn has_content(&self) -> bool {
        match self.properties.load().as_ref() {
            None => false,
            Some(snapshot) => match self.format {
                ConfigFileFormat::Properties => !snapshot.is_empty(),
                _ => snapshot.contains_key(CONFIG_FILE_CONTENT_KEY),
            },
        }
    }

    /// 展开为扁平属性
    ///
    /// # 返回
    /// * `Ok(None)` - 该格式无法展开为属性
    /// * `Ok(Some(_))` - 展开结果，无内容时为空属性
    /// * `Err(_)` - 内容无法解析
    pub fn as_properties(&self) -> Result<Option<Arc<Properties>>> {
        if !self.format.is_properties_compatible() {
            return Ok(None);
        }

        let Some(snapshot) = self.properties.load_full() else {
            return Ok(Some(Arc::new(Properties::new())));
        };

        let mut cache = self.flattened.lock();
        if let Some((source, flattened)) = cache.as_ref() {
            if Arc::ptr_eq(source, &snapshot) {
                return Ok(Some(Arc::clone(flattened)));
            }
        }

        let flattened = match snapshot.get(CONFIG_FILE_CONTENT_KEY) {
            Some(content) => Arc::new(yaml::yaml_to_properties(content)?),
            None => Arc::new(Properties::new()),
        };
        *cache = Some((snapshot, Arc::clone(&flattened)));
        Ok(Some(flattened))
    }

    pub fn add_change_listener(&self, listener: Arc<dyn ConfigFileChangeListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_change_listener(&self, listener: &Arc<dyn ConfigFileChangeListener>) -> bool {
        self.listeners.remove(listener)
    }

    fn handle_repository_change(&self, _namespace: &str, properties: &Arc<Properties>) {
        let _guard = self.update_lock.lock();

        let previous = self.properties.load_full();
        if previous.as_deref() == Some(properties.as_ref()) {
            return;
        }

        let old_value = previous
            .as_deref()
            .and_then(|snapshot| render_content(self.format, snapshot));
        self.properties.store(Some(Arc::clone(properties)));
        self.source_type.set(self.repository.source_type());
        let new_value = render_content(self.format, properties);

        let change_type = match (&old_value, &new_value) {
            (None, _) => PropertyChangeType::Added,
            (_, None) => PropertyChangeType::Deleted,
            _ => PropertyChangeType::Modified,
        };
        debug!("配置文件发生变化 [{}]: {}", self.namespace, change_type);

        let event = ConfigFileChangeEvent {
            namespace: self.namespace.clone(),
            old_value,
            new_value,
            change_type,
        };
        self.listeners.for_each(|listener| listener.on_change(&event));
    }
}

impl Drop for ConfigFile {
    fn drop(&mut self) {
        self.repository
            .remove_change_listener(&self.repository_listener);
    }
}

fn render_content(format: ConfigFileFormat, snapshot: &Properties) -> Option<String> {
    match format {
        ConfigFileFormat::Properties if snapshot.is_empty() => None,
        ConfigFileFormat::Properties => Some(properties::render(snapshot, &[])),
        _ => snapshot.get(CONFIG_FILE_CONTENT_KEY).cloned(),
    }
}
