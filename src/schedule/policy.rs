//! 重试退避策略

use std::time::Duration;

/// 重试节奏策略
///
/// 调用方自行负责计时和休眠，策略只给出下一次的延迟
pub trait SchedulePolicy: Send {
    /// 记录一次失败，返回下一次重试前应等待的时长
    fn fail(&mut self) -> Duration;

    /// 记录一次成功，重置退避状态
    fn success(&mut self);
}

/// 指数退避：首次失败取下限，之后每次翻倍直至上限
#[derive(Debug, Clone)]
pub struct ExponentialSchedulePolicy {
    lower_bound: Duration,
    upper_bound: Duration,
    last: Duration,
}

impl ExponentialSchedulePolicy {
    /// 创建指数退避策略
    ///
    /// # 参数
    /// * `lower_bound` - 首次失败的延迟
    /// * `upper_bound` - 延迟上限
    pub fn new(lower_bound: Duration, upper_bound: Duration) -> Self {
        Self {
            lower_bound,
            upper_bound: upper_bound.max(lower_bound),
            last: Duration::ZERO,
        }
    }

    /// 以毫秒为单位创建
    pub fn from_millis(lower_bound_ms: u64, upper_bound_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(lower_bound_ms),
            Duration::from_millis(upper_bound_ms),
        )
    }
}

impl SchedulePolicy for ExponentialSchedulePolicy {
    fn fail(&mut self) -> Duration {
        let delay = if self.last.is_zero() {
            self.lower_bound
        } else {
            self.last.saturating_mul(2).min(self.upper_bound)
        };
        self.last = delay;
        delay
    }

    fn success(&mut self) {
        self.last = Duration::ZERO;
    }
}
