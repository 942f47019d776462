//! 进程内 TTL 缓存模块
//!
//! 基于 DashMap 的线程安全键值缓存，用于规则/规则组等热点数据的查询加速。
//! 过期条目在 get/exists 时惰性清除，不启动后台清理任务。

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use crate::error::{Result, SharedError};

/// 缓存条目
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// 进程内 TTL 缓存
#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    /// set 未指定 TTL 时使用的默认存活时间
    default_ttl: Duration,
}

impl TtlCache {
    /// 创建缓存实例
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    /// 获取值
    ///
    /// 条目已过期时视为未命中，并在返回前将其清除。
    #[instrument(skip(self))]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        // 惰性清除：过期条目在读取路径上移除
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }

            let parsed: T = serde_json::from_value(entry.value.clone())
                .map_err(|e| SharedError::CacheSerialization(e.to_string()))?;
            return Ok(Some(parsed));
        }

        Ok(None)
    }

    /// 设置值（使用默认 TTL）
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    /// 设置值（指定 TTL）
    #[instrument(skip(self, value))]
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let serialized = serde_json::to_value(value)
            .map_err(|e| SharedError::CacheSerialization(e.to_string()))?;

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: serialized,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// 删除值
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// 检查键是否存在（过期条目同样惰性清除）
    pub fn exists(&self, key: &str) -> bool {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return false;
            }
            return true;
        }
        false
    }

    /// 清空所有条目
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// 当前条目数量（包含尚未被惰性清除的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
