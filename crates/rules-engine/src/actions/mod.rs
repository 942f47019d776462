//! 动作处理器抽象与注册表
//!
//! 引擎对动作背后的副作用不做假设：每种动作类型对应一个注册的
//! `ActionHandler`，引擎只关心调用是否成功及其结果载荷。
//! 外部副作用型动作（邮件、Webhook、工作流）的处理器由宿主注册，
//! 即外部动作后端端口。

pub mod builtin;

use crate::context::ExecutionContext;
use crate::models::ActionType;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// 动作处理器抽象
///
/// 处理器执行真正的动作逻辑并返回结果载荷。试运行时 `ctx.dry_run`
/// 为 true，产生外部副作用的处理器应据此改为只读路径。
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// 处理器名称，用于日志定位
    fn name(&self) -> &str;

    /// 必需参数列表，分发前由执行器校验
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// 执行动作
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, String>;
}

/// 动作注册表
///
/// 动作类型到处理器的映射。注册应在引擎初始化阶段完成，
/// 评估开始后注册表按只读方式使用。
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: Arc<DashMap<ActionType, Arc<dyn ActionHandler>>>,
}

impl ActionRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 预注册全部内置处理器的注册表
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(ActionType::SetField, Arc::new(builtin::SetFieldHandler));
        registry.register(ActionType::LogEvent, Arc::new(builtin::LogEventHandler));
        registry.register(ActionType::Approve, Arc::new(builtin::ApproveHandler));
        registry.register(ActionType::Reject, Arc::new(builtin::RejectHandler));
        registry.register(ActionType::Escalate, Arc::new(builtin::EscalateHandler));
        registry.register(ActionType::Calculate, Arc::new(builtin::CalculateHandler));
        registry
    }

    /// 注册处理器，同类型覆盖
    pub fn register(&self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type, handler);
    }

    /// 查找处理器
    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type).map(|h| Arc::clone(&h))
    }

    /// 是否已注册
    pub fn contains(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    /// 已注册的处理器数量
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
