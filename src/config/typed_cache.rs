//! 类型化读取缓存
//!
//! 缓存按（类型, 键）存放解析后的值，受最大条目数与过期时间约束。
//! 每次采用新快照时整体清空；解析期间版本发生变化的结果不写入缓存。

use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 缓存条目的值类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Boolean,
    /// 数组按分隔符区分
    Array(String),
}

/// 解析后的值
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Array(Arc<Vec<String>>),
}

/// 可放入缓存的类型
pub trait CacheableValue: Clone {
    fn into_typed(self) -> TypedValue;
    fn from_typed(value: &TypedValue) -> Option<Self>;
}

macro_rules! impl_cacheable {
    ($ty:ty, $variant:ident) => {
        impl CacheableValue for $ty {
            fn into_typed(self) -> TypedValue {
                TypedValue::$variant(self)
            }

            fn from_typed(value: &TypedValue) -> Option<Self> {
                match value {
                    TypedValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

impl_cacheable!(i32, Int);
impl_cacheable!(i64, Long);
impl_cacheable!(f32, Float);
impl_cacheable!(f64, Double);
impl_cacheable!(bool, Boolean);

impl CacheableValue for Vec<String> {
    fn into_typed(self) -> TypedValue {
        TypedValue::Array(Arc::new(self))
    }

    fn from_typed(value: &TypedValue) -> Option<Self> {
        match value {
            TypedValue::Array(v) => Some(v.as_ref().clone()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CachedEntry {
    value: TypedValue,
    inserted_at: Instant,
}

/// 类型化读取缓存
#[derive(Debug)]
pub struct TypedValueCache {
    entries: DashMap<(ValueKind, String), CachedEntry>,
    version: AtomicU64,
    max_size: usize,
    expire_after: Duration,
    /// 保证版本检查与写入、清空之间的原子性
    write_lock: Mutex<()>,
}

impl TypedValueCache {
    /// 创建缓存
    ///
    /// # 参数
    /// * `max_size` - 最大条目数，0 表示不缓存
    /// * `expire_after` - 条目写入后的存活时间
    pub fn new(max_size: usize, expire_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            version: AtomicU64::new(0),
            max_size,
            expire_after,
            write_lock: Mutex::new(()),
        }
    }

    /// 当前配置版本
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// 读取未过期的缓存值
    pub fn get<T: CacheableValue>(&self, kind: &ValueKind, key: &str) -> Option<T> {
        let cache_key = (kind.clone(), key.to_string());
        {
            let entry = self.entries.get(&cache_key)?;
            if entry.inserted_at.elapsed() < self.expire_after {
                return T::from_typed(&entry.value);
            }
        }
        self.entries.remove(&cache_key);
        None
    }

    /// 写入缓存；`version` 为开始解析时读取的版本，已过期的写入会被丢弃
    pub fn put<T: CacheableValue>(&self, kind: ValueKind, key: &str, value: T, version: u64) {
        if self.max_size == 0 {
            return;
        }

        let _guard = self.write_lock.lock();
        if self.version.load(Ordering::Acquire) != version {
            return;
        }

        if self.entries.len() >= self.max_size {
            self.evict();
        }

        self.entries.insert(
            (kind, key.to_string()),
            CachedEntry {
                value: value.into_typed(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// 清空缓存并推进版本
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.version.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 先清理过期条目，仍然满时淘汰最早写入的条目
    fn evict(&self) {
        let expire_after = self.expire_after;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < expire_after);

        while self.entries.len() >= self.max_size {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// 解析布尔值，只接受 true/false（忽略大小写）
pub fn parse_bool(raw: &str) -> Result<bool, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(format!("不是合法的布尔值: {}", raw))
    }
}

/// 解析数字
pub fn parse_number<T: std::str::FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| e.to_string())
}

/// 按正则分隔符切分，丢弃末尾的空串
pub fn split_array(raw: &str, delimiter: &str) -> Result<Vec<String>, String> {
    let regex = Regex::new(delimiter).map_err(|e| format!("无效的分隔符 {}: {}", delimiter, e))?;
    let mut parts: Vec<String> = regex.split(raw).map(str::to_string).collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    Ok(parts)
}
