//! 定时刷新调度器
//!
//! 为每个命名空间启动一个后台任务，周期性调用仓库同步；
//! 同步失败时按指数退避重试

use crate::repository::ConfigRepository;
use crate::schedule::policy::{ExponentialSchedulePolicy, SchedulePolicy};
use crate::settings::ClientSettings;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 定时刷新调度器
pub struct RefreshScheduler {
    /// 运行中的任务，按命名空间索引
    tasks: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    initial_delay: Duration,
    refresh_interval: Duration,
    retry_lower_bound: Duration,
    retry_upper_bound: Duration,
}

impl RefreshScheduler {
    /// 创建调度器
    ///
    /// # 参数
    /// * `initial_delay` - 首次同步前的等待
    /// * `refresh_interval` - 同步成功后的刷新间隔
    /// * `retry_lower_bound` - 失败重试的最小延迟
    /// * `retry_upper_bound` - 失败重试的最大延迟
    pub fn new(
        initial_delay: Duration,
        refresh_interval: Duration,
        retry_lower_bound: Duration,
        retry_upper_bound: Duration,
    ) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            initial_delay,
            refresh_interval,
            retry_lower_bound,
            retry_upper_bound,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(
            settings.long_polling_initial_delay(),
            settings.refresh_interval(),
            Duration::from_millis(settings.retry_lower_bound_ms),
            Duration::from_millis(settings.retry_upper_bound_ms),
        )
    }

    /// 为仓库启动定时刷新，同一命名空间已有任务时先停止旧任务
    ///
    /// 任务只持有仓库的弱引用，仓库释放后任务自行结束
    pub async fn schedule(&self, repository: Arc<dyn ConfigRepository>) {
        let namespace = repository.namespace().to_string();
        let target = Arc::downgrade(&repository);
        let mut policy =
            ExponentialSchedulePolicy::new(self.retry_lower_bound, self.retry_upper_bound);
        let initial_delay = self.initial_delay;
        let refresh_interval = self.refresh_interval;
        let task_namespace = namespace.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                let Some(delay) = refresh_once(&target, &mut policy, refresh_interval).await else {
                    debug!("命名空间 {} 的仓库已释放，停止刷新", task_namespace);
                    break;
                };
                tokio::time::sleep(delay).await;
            }
        });

        let mut tasks = self.tasks.write().await;
        if let Some(previous) = tasks.insert(namespace.clone(), task) {
            previous.abort();
        }
        info!("已启动命名空间 {} 的定时刷新", namespace);
    }

    /// 停止命名空间的刷新任务
    ///
    /// # 返回
    /// * `bool` - 是否存在该任务
    pub async fn cancel(&self, namespace: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.remove(namespace) {
            Some(task) => {
                task.abort();
                info!("已停止命名空间 {} 的定时刷新", namespace);
                true
            }
            None => false,
        }
    }

    /// 停止全部刷新任务
    pub async fn stop(&self) {
        let mut tasks = self.tasks.write().await;
        for (namespace, task) in tasks.drain() {
            task.abort();
            debug!("已停止命名空间 {} 的定时刷新", namespace);
        }
    }

    /// 仍在运行的任务数
    pub async fn running_tasks(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_write() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}

/// 执行一次同步，返回下一次执行前的等待时长；仓库已释放时返回 `None`
async fn refresh_once<P: SchedulePolicy>(
    target: &Weak<dyn ConfigRepository>,
    policy: &mut P,
    refresh_interval: Duration,
) -> Option<Duration> {
    let repository = target.upgrade()?;
    let namespace = repository.namespace().to_string();

    // 同步是阻塞操作（文件与网络），放到阻塞线程池执行
    let synced = tokio::task::spawn_blocking(move || repository.try_sync())
        .await
        .unwrap_or(false);

    if synced {
        policy.success();
        Some(refresh_interval)
    } else {
        let delay = policy.fail();
        warn!(
            "命名空间 {} 同步失败，{}ms 后重试",
            namespace,
            delay.as_millis()
        );
        Some(delay)
    }
}
