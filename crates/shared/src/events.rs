//! 事件模型与进程内事件总线
//!
//! 定义规则引擎生命周期事件的统一信封格式、事件类型分类，以及
//! `EventSubscriber` trait 作为订阅方的核心抽象。事件总线按事件类型
//! 维护订阅者列表，发布时并发投递，单个订阅者的失败不影响其他订阅者，
//! 也不影响发布方。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EngineEventType — 事件类型枚举
// ---------------------------------------------------------------------------

/// 规则引擎生命周期事件类型
///
/// 按实体划分为规则、规则组、模板、执行四类。
/// 订阅者按类型注册，发布时只投递给对应类型的订阅者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEventType {
    // 规则定义生命周期
    RuleCreated,
    RuleUpdated,
    RuleDeleted,
    RuleEnabled,
    RuleDisabled,

    // 规则组生命周期
    GroupCreated,
    GroupUpdated,
    GroupDeleted,

    // 模板生命周期
    TemplateCreated,
    TemplateDeleted,
    RuleInstantiated,

    // 执行事件
    RuleExecuted,
    RuleExecutionFailed,
}

impl std::fmt::Display for EngineEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RuleCreated => "RULE_CREATED",
            Self::RuleUpdated => "RULE_UPDATED",
            Self::RuleDeleted => "RULE_DELETED",
            Self::RuleEnabled => "RULE_ENABLED",
            Self::RuleDisabled => "RULE_DISABLED",
            Self::GroupCreated => "GROUP_CREATED",
            Self::GroupUpdated => "GROUP_UPDATED",
            Self::GroupDeleted => "GROUP_DELETED",
            Self::TemplateCreated => "TEMPLATE_CREATED",
            Self::TemplateDeleted => "TEMPLATE_DELETED",
            Self::RuleInstantiated => "RULE_INSTANTIATED",
            Self::RuleExecuted => "RULE_EXECUTED",
            Self::RuleExecutionFailed => "RULE_EXECUTION_FAILED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// EngineEvent — 事件信封
// ---------------------------------------------------------------------------

/// 事件信封
///
/// 所有引擎事件都包装在此信封中：
/// - `event_id`（UUID v7）时间有序，便于排序和追踪
/// - `subject_id` 指向事件相关的规则/规则组/模板 ID
/// - `payload` 以 JSON 承载不同事件的附加数据，避免为每种事件定义独立结构
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    pub event_id: String,
    pub event_type: EngineEventType,
    /// 事件主体 ID（规则 / 规则组 / 模板）
    pub subject_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl EngineEvent {
    /// 构建新事件，自动生成 UUID v7 作为 event_id 并记录当前时间
    pub fn new(
        event_type: EngineEventType,
        subject_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            event_type,
            subject_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventSubscriber trait — 订阅者抽象
// ---------------------------------------------------------------------------

/// 事件订阅者抽象
///
/// 实现方处理投递到的事件。处理失败通过 Err 返回，
/// 由总线记录日志，不会传播给发布方或其他订阅者。
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// 订阅者名称，用于日志定位
    fn name(&self) -> &str;

    /// 处理单个事件
    async fn handle(&self, event: &EngineEvent) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// EventBus — 进程内发布/订阅总线
// ---------------------------------------------------------------------------

/// 进程内事件总线
///
/// 按事件类型维护订阅者列表。`publish` 为每个订阅者派生独立任务并发投递，
/// 订阅者的错误只记录日志。订阅注册应在引擎初始化阶段完成。
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<DashMap<EngineEventType, Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者
    pub fn subscribe(&self, event_type: EngineEventType, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers
            .entry(event_type)
            .or_default()
            .push(subscriber);
    }

    /// 某类型的订阅者数量
    pub fn subscriber_count(&self, event_type: EngineEventType) -> usize {
        self.subscribers
            .get(&event_type)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// 发布事件
    ///
    /// 每个订阅者在独立的 tokio 任务中接收事件，互不阻塞。
    /// 返回时投递任务已派生，但不保证处理完成。
    pub fn publish(&self, event: EngineEvent) {
        let Some(subscribers) = self.subscribers.get(&event.event_type) else {
            return;
        };

        for subscriber in subscribers.iter() {
            let subscriber = Arc::clone(subscriber);
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = subscriber.handle(&event).await {
                    warn!(
                        subscriber = subscriber.name(),
                        event_type = %event.event_type,
                        event_id = %event.event_id,
                        error = %e,
                        "事件订阅者处理失败"
                    );
                }
            });
        }
    }

    /// 发布事件并等待所有订阅者处理完成
    ///
    /// 测试和需要确定性时序的调用方使用。失败同样只记录日志。
    pub async fn publish_and_wait(&self, event: EngineEvent) {
        let subscribers: Vec<Arc<dyn EventSubscriber>> = match self.subscribers.get(&event.event_type)
        {
            Some(list) => list.clone(),
            None => return,
        };

        let tasks: Vec<_> = subscribers
            .iter()
            .map(|subscriber| {
                let subscriber = Arc::clone(subscriber);
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = subscriber.handle(&event).await {
                        warn!(
                            subscriber = subscriber.name(),
                            event_type = %event.event_type,
                            error = %e,
                            "事件订阅者处理失败"
                        );
                    }
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            // 订阅者 panic 同样被隔离，只记录日志
            if let Err(e) = result {
                warn!(error = %e, "事件订阅者任务异常退出");
            }
        }
    }
}
