//! 统一错误处理模块
//!
//! 定义基础设施层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum SharedError {
    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 缓存错误 ====================
    #[error("缓存序列化失败: {0}")]
    CacheSerialization(String),

    #[error("缓存未命中: {key}")]
    CacheMiss { key: String },

    // ==================== 事件总线错误 ====================
    #[error("事件处理失败: {event_type} - {message}")]
    EventHandler { event_type: String, message: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, SharedError>;

impl SharedError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::CacheSerialization(_) => "CACHE_SERIALIZATION_ERROR",
            Self::CacheMiss { .. } => "CACHE_MISS",
            Self::EventHandler { .. } => "EVENT_HANDLER_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
