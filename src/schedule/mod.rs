//! 调度模块
//!
//! 重试退避策略与定时刷新

pub mod policy;
pub mod refresher;

// 重新导出主要类型
pub use policy::{ExponentialSchedulePolicy, SchedulePolicy};
pub use refresher::RefreshScheduler;
