//! 本地文件缓存仓库
//!
//! 位于上游（通常是远程仓库）之前的持久化缓存层：上游可用时采用并落盘，
//! 上游不可用时回退到磁盘缓存，保证始终能提供最后一次成功的配置

use crate::error::{ConfigError, Result};
use crate::format::properties::{self, Properties, PERSIST_HEADER};
use crate::repository::base::{
    ConfigRepository, ConfigSourceType, ListenerSet, RepositoryChangeListener, SourceTypeCell,
};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// 缓存根目录下存放缓存文件的子目录
pub const CONFIG_DIR: &str = "config-cache";

/// 缓存文件名各段之间的分隔符
pub const CACHE_FILE_SEPARATOR: &str = "+";

/// 缓存文件扩展名
pub const CACHE_FILE_EXTENSION: &str = "properties";

/// 本地文件缓存仓库
pub struct LocalFileConfigRepository {
    namespace: String,
    app_id: String,
    cluster: String,
    /// 存放缓存文件的目录，创建失败时为空
    base_dir: RwLock<Option<PathBuf>>,
    file_properties: ArcSwapOption<Properties>,
    upstream: RwLock<Option<Arc<dyn ConfigRepository>>>,
    source_type: SourceTypeCell,
    update_lock: Mutex<()>,
    listeners: ListenerSet<dyn RepositoryChangeListener>,
    /// 注册在上游上的监听器，弱引用回本仓库
    upstream_listener: Arc<dyn RepositoryChangeListener>,
}

struct UpstreamListener {
    repository: Weak<LocalFileConfigRepository>,
}

impl RepositoryChangeListener for UpstreamListener {
    fn on_repository_change(&self, namespace: &str, properties: &Arc<Properties>) {
        if let Some(repository) = self.repository.upgrade() {
            repository.handle_upstream_change(namespace, properties);
        }
    }
}

impl LocalFileConfigRepository {
    /// 创建本地文件缓存仓库并立即同步一次
    ///
    /// # 参数
    /// * `namespace` - 命名空间
    /// * `app_id` - 应用ID
    /// * `cluster` - 集群
    /// * `cache_root` - 缓存根目录（其下创建 `config-cache` 子目录）
    /// * `upstream` - 上游仓库（可选）
    ///
    /// # 返回
    /// * `Arc<Self>` - 仓库实例；同步失败只记录日志
    pub fn new(
        namespace: impl Into<String>,
        app_id: impl Into<String>,
        cluster: impl Into<String>,
        cache_root: &Path,
        upstream: Option<Arc<dyn ConfigRepository>>,
    ) -> Arc<Self> {
        let app_id = app_id.into();
        let repository = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            namespace: namespace.into(),
            app_id: app_id.clone(),
            cluster: cluster.into(),
            base_dir: RwLock::new(None),
            file_properties: ArcSwapOption::empty(),
            upstream: RwLock::new(None),
            source_type: SourceTypeCell::default(),
            update_lock: Mutex::new(()),
            listeners: ListenerSet::new(),
            upstream_listener: Arc::new(UpstreamListener {
                repository: weak.clone(),
            }),
        });

        let cache_dir = find_local_cache_dir(cache_root, &app_id);
        repository.set_local_cache_dir(cache_dir, false);
        if upstream.is_some() {
            repository.set_upstream_repository(upstream);
        }
        repository.try_sync();

        repository
    }

    /// 替换缓存目录
    ///
    /// # 参数
    /// * `dir` - 直接存放缓存文件的目录
    /// * `sync_immediately` - 是否立即同步
    pub fn set_local_cache_dir(&self, dir: PathBuf, sync_immediately: bool) {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("无法创建本地缓存目录 {}: {}", dir.display(), e);
        }
        *self.base_dir.write() = Some(dir);

        if sync_immediately {
            self.try_sync();
        }
    }

    /// 当前缓存文件路径
    pub fn cache_file_path(&self) -> Option<PathBuf> {
        self.base_dir
            .read()
            .as_ref()
            .map(|dir| dir.join(self.cache_file_name()))
    }

    /// 缓存文件名：`{appId}+{cluster}+{namespace}.properties`
    pub fn cache_file_name(&self) -> String {
        format!(
            "{}.{}",
            [
                self.app_id.as_str(),
                self.cluster.as_str(),
                self.namespace.as_str()
            ]
            .join(CACHE_FILE_SEPARATOR),
            CACHE_FILE_EXTENSION
        )
    }

    fn try_sync_from_upstream(&self) -> bool {
        let upstream = self.upstream.read().clone();
        let Some(upstream) = upstream else {
            return false;
        };

        match upstream.get_config() {
            Ok(properties) => {
                self.update_file_properties(properties, upstream.source_type());
                true
            }
            Err(e) => {
                warn!(
                    "从上游同步配置失败 [{}]，将尝试本地缓存: {}",
                    self.namespace, e
                );
                false
            }
        }
    }

    /// 采用新快照并落盘，值相同时跳过
    ///
    /// # 返回
    /// * `bool` - 快照是否发生变化
    fn update_file_properties(
        &self,
        properties: Arc<Properties>,
        source_type: ConfigSourceType,
    ) -> bool {
        let _guard = self.update_lock.lock();
        self.source_type.set(source_type);

        if let Some(current) = self.file_properties.load_full() {
            if *current == *properties {
                return false;
            }
        }

        self.file_properties.store(Some(Arc::clone(&properties)));
        self.persist_local_cache_file(&properties);
        true
    }

    fn handle_upstream_change(&self, namespace: &str, properties: &Arc<Properties>) {
        if let Some(current) = self.file_properties.load_full() {
            if *current == **properties {
                return;
            }
        }

        let source_type = self
            .upstream
            .read()
            .as_ref()
            .map(|upstream| upstream.source_type())
            .unwrap_or(ConfigSourceType::Remote);

        if self.update_file_properties(Arc::clone(properties), source_type) {
            self.listeners.fire(namespace, properties);
        }
    }

    fn load_from_local_cache_file(&self) -> Result<Properties> {
        let path = self.cache_file_path().ok_or_else(|| ConfigError::LoadFailed {
            namespace: self.namespace.clone(),
            reason: "本地缓存目录不可用".to_string(),
        })?;

        if !path.is_file() {
            return Err(ConfigError::LoadFailed {
                namespace: self.namespace.clone(),
                reason: format!("本地缓存文件不存在: {}", path.display()),
            }
            .into());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            namespace: self.namespace.clone(),
            reason: format!("读取本地缓存文件 {} 失败: {}", path.display(), e),
        })?;

        debug!("已从本地缓存加载配置: {}", path.display());
        Ok(properties::parse(&content))
    }

    fn persist_local_cache_file(&self, properties: &Properties) {
        let Some(path) = self.cache_file_path() else {
            return;
        };

        let timestamp = chrono::Utc::now().to_rfc3339();
        let content = properties::render(properties, &[PERSIST_HEADER, &timestamp]);

        // 先写临时文件再重命名，读取方不会看到半截内容
        let tmp_path = path.with_extension(format!("{}.tmp", CACHE_FILE_EXTENSION));
        let result = fs::write(&tmp_path, content).and_then(|_| fs::rename(&tmp_path, &path));
        match result {
            Ok(()) => debug!("已持久化本地缓存: {}", path.display()),
            Err(e) => {
                warn!("持久化本地缓存文件 {} 失败: {}", path.display(), e);
                let _ = fs::remove_file(&tmp_path);
            }
        }
    }
}

impl ConfigRepository for LocalFileConfigRepository {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn get_config(&self) -> Result<Arc<Properties>> {
        if let Some(properties) = self.file_properties.load_full() {
            return Ok(properties);
        }

        self.sync()?;
        self.file_properties
            .load_full()
            .ok_or_else(|| {
                ConfigError::LoadFailed {
                    namespace: self.namespace.clone(),
                    reason: "同步后仍无可用配置".to_string(),
                }
                .into()
            })
    }

    fn set_upstream_repository(&self, upstream: Option<Arc<dyn ConfigRepository>>) {
        let previous = {
            let mut guard = self.upstream.write();
            std::mem::replace(&mut *guard, upstream.clone())
        };

        if let Some(previous) = previous {
            previous.remove_change_listener(&self.upstream_listener);
        }

        if let Some(upstream) = upstream {
            self.try_sync_from_upstream();
            upstream.add_change_listener(Arc::clone(&self.upstream_listener));
        }
    }

    fn add_change_listener(&self, listener: Arc<dyn RepositoryChangeListener>) {
        self.listeners.add(listener);
    }

    fn remove_change_listener(&self, listener: &Arc<dyn RepositoryChangeListener>) {
        self.listeners.remove(listener);
    }

    fn source_type(&self) -> ConfigSourceType {
        self.source_type.get()
    }

    fn sync(&self) -> Result<()> {
        if self.try_sync_from_upstream() {
            return Ok(());
        }

        match self.load_from_local_cache_file() {
            Ok(properties) => {
                self.source_type.set(ConfigSourceType::Local);
                self.file_properties.store(Some(Arc::new(properties)));
                Ok(())
            }
            // 仍持有上次成功的快照时继续提供，来源保持不变
            Err(e) if self.file_properties.load().is_some() => {
                warn!(
                    "本地缓存不可用 [{}]，继续使用内存中的快照: {}",
                    self.namespace, e
                );
                Ok(())
            }
            Err(e) => {
                self.source_type.set(ConfigSourceType::None);
                Err(e)
            }
        }
    }
}

impl Drop for LocalFileConfigRepository {
    fn drop(&mut self) {
        if let Some(upstream) = self.upstream.get_mut().take() {
            upstream.remove_change_listener(&self.upstream_listener);
        }
    }
}

/// 确定缓存文件目录
///
/// 优先使用 `cache_root/config-cache`；无法创建时回退到用户缓存目录，
/// 再不行则使用系统临时目录。
pub fn find_local_cache_dir(cache_root: &Path, app_id: &str) -> PathBuf {
    let preferred = cache_root.join(CONFIG_DIR);
    if fs::create_dir_all(&preferred).is_ok() {
        return preferred;
    }

    let fallback_root = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    let fallback = fallback_root.join("confvault").join(app_id).join(CONFIG_DIR);
    info!(
        "缓存目录 {} 不可用，改用 {}",
        preferred.display(),
        fallback.display()
    );
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::MockRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    struct CountingListener {
        calls: AtomicUsize,
        last: Mutex<Option<Arc<Properties>>>,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    impl RepositoryChangeListener for CountingListener {
        fn on_repository_change(&self, _namespace: &str, properties: &Arc<Properties>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(Arc::clone(properties));
        }
    }

    #[test]
    fn test_cache_file_name() {
        let dir = TempDir::new().unwrap();
        let repo = LocalFileConfigRepository::new("application", "demo", "default", dir.path(), None);

        assert_eq!(repo.cache_file_name(), "demo+default+application.properties");
        assert_eq!(
            repo.cache_file_path(),
            Some(
                dir.path()
                    .join(CONFIG_DIR)
                    .join("demo+default+application.properties")
            )
        );
    }

    #[test]
    fn test_sync_from_upstream_persists() {
        let dir = TempDir::new().unwrap();
        let upstream = MockRepository::new("application", Some(props(&[("timeout", "5000")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream.clone()),
        );

        assert_eq!(repo.source_type(), ConfigSourceType::Remote);
        assert_eq!(
            repo.get_config().unwrap().get("timeout"),
            Some(&"5000".to_string())
        );

        let content = fs::read_to_string(repo.cache_file_path().unwrap()).unwrap();
        assert!(content.starts_with("#Persisted by DefaultConfig\n"));
        assert!(content.contains("timeout=5000\n"));
    }

    #[test]
    fn test_falls_back_to_local_cache() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(
            cache_dir.join("demo+default+application.properties"),
            "#cached\ntimeout=4000\n",
        )
        .unwrap();

        let upstream = MockRepository::new("application", None);
        upstream.set_failing(true);
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream),
        );

        assert_eq!(repo.source_type(), ConfigSourceType::Local);
        assert_eq!(
            repo.get_config().unwrap().get("timeout"),
            Some(&"4000".to_string())
        );
    }

    #[test]
    fn test_load_failure_without_any_source() {
        let dir = TempDir::new().unwrap();
        let repo = LocalFileConfigRepository::new("application", "demo", "default", dir.path(), None);

        assert_eq!(repo.source_type(), ConfigSourceType::None);
        assert!(!repo.try_sync());
        assert!(repo.get_config().is_err());
    }

    #[test]
    fn test_keeps_last_good_snapshot_when_upstream_fails() {
        let dir = TempDir::new().unwrap();
        let upstream = MockRepository::new("application", Some(props(&[("k", "v1")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream.clone()),
        );

        upstream.set_failing(true);
        assert!(repo.try_sync());

        // 上游失败后回退到刚刚落盘的缓存
        assert_eq!(repo.source_type(), ConfigSourceType::Local);
        assert_eq!(repo.get_config().unwrap().get("k"), Some(&"v1".to_string()));
    }

    #[test]
    fn test_keeps_source_type_when_upstream_and_cache_file_fail() {
        let dir = TempDir::new().unwrap();
        let upstream = MockRepository::new("application", Some(props(&[("k", "v1")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream.clone()),
        );
        assert_eq!(repo.source_type(), ConfigSourceType::Remote);

        fs::remove_file(repo.cache_file_path().unwrap()).unwrap();
        upstream.set_failing(true);
        assert!(repo.try_sync());

        assert_eq!(repo.source_type(), ConfigSourceType::Remote);
        assert_eq!(repo.get_config().unwrap().get("k"), Some(&"v1".to_string()));
    }

    #[test]
    fn test_idempotent_sync_does_not_rewrite_cache() {
        let dir = TempDir::new().unwrap();
        let upstream = MockRepository::new("application", Some(props(&[("k", "v1")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream.clone()),
        );
        let listener = CountingListener::new();
        repo.add_change_listener(listener.clone());

        let path = repo.cache_file_path().unwrap();
        let first = fs::read_to_string(&path).unwrap();
        // 时间戳精度足以区分两次写入
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(repo.try_sync());
        assert!(repo.try_sync());

        assert_eq!(fs::read_to_string(&path).unwrap(), first);
        assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_upstream_push_persists_then_fires() {
        let dir = TempDir::new().unwrap();
        let upstream = MockRepository::new("application", Some(props(&[("timeout", "5000")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream.clone()),
        );
        let listener = CountingListener::new();
        repo.add_change_listener(listener.clone());

        upstream.push(props(&[("timeout", "3000"), ("retries", "3")]));
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
        let delivered = listener.last.lock().clone().unwrap();
        assert_eq!(delivered.get("retries"), Some(&"3".to_string()));

        let content = fs::read_to_string(repo.cache_file_path().unwrap()).unwrap();
        assert!(content.contains("timeout=3000\n"));
        assert!(content.contains("retries=3\n"));

        // 相同内容再次推送不触发
        upstream.push(props(&[("timeout", "3000"), ("retries", "3")]));
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replace_upstream() {
        let dir = TempDir::new().unwrap();
        let first = MockRepository::new("application", Some(props(&[("k", "first")])));
        let second = MockRepository::new("application", Some(props(&[("k", "second")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(first.clone()),
        );
        assert_eq!(first.listener_count(), 1);

        repo.set_upstream_repository(Some(second.clone()));
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);
        assert_eq!(repo.get_config().unwrap().get("k"), Some(&"second".to_string()));

        // 旧上游的推送不再影响本仓库
        first.push(props(&[("k", "stale")]));
        assert_eq!(repo.get_config().unwrap().get("k"), Some(&"second".to_string()));
    }

    #[test]
    fn test_drop_detaches_from_upstream() {
        let dir = TempDir::new().unwrap();
        let upstream = MockRepository::new("application", Some(props(&[("k", "v")])));
        let repo = LocalFileConfigRepository::new(
            "application",
            "demo",
            "default",
            dir.path(),
            Some(upstream.clone()),
        );
        assert_eq!(upstream.listener_count(), 1);

        drop(repo);
        assert_eq!(upstream.listener_count(), 0);
    }

    #[test]
    fn test_set_local_cache_dir() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let target = other.path().join("custom-cache");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("demo+default+application.properties"), "k=moved\n").unwrap();

        let repo = LocalFileConfigRepository::new("application", "demo", "default", dir.path(), None);
        assert!(repo.get_config().is_err());

        repo.set_local_cache_dir(target, true);
        assert_eq!(repo.source_type(), ConfigSourceType::Local);
        assert_eq!(repo.get_config().unwrap().get("k"), Some(&"moved".to_string()));
    }
}
