//! 动作执行器
//!
//! 负责单个动作的守卫评估、参数校验、超时控制，以及动作批次的
//! 顺序执行。单个动作的失败被隔离在其结果中，批次不中断。

use crate::actions::ActionRegistry;
use crate::context::ExecutionContext;
use crate::evaluator::ConditionEvaluator;
use crate::models::RuleAction;
use crate::result::ActionResult;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 动作执行器
#[derive(Clone)]
pub struct ActionExecutor {
    registry: ActionRegistry,
    evaluator: ConditionEvaluator,
    /// 动作未配置超时时的默认超时
    default_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        registry: ActionRegistry,
        evaluator: ConditionEvaluator,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            evaluator,
            default_timeout,
        }
    }

    /// 执行单个动作
    ///
    /// 失败路径全部收敛为带错误信息的 `ActionResult`，此方法不返回 Err：
    /// - 守卫条件为 false -> skipped（计为成功）
    /// - 未注册的动作类型 / 缺少必需参数 / 处理器报错 / 超时 -> success=false
    pub async fn execute(&self, action: &RuleAction, ctx: &ExecutionContext) -> ActionResult {
        let start = Instant::now();

        // 动作级守卫：false 则跳过，不算失败
        if let Some(guard) = &action.condition {
            let trace = self.evaluator.evaluate(guard, ctx);
            if !trace.result {
                debug!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    guard_field = %guard.field,
                    "守卫条件不满足，动作跳过"
                );
                return ActionResult::skipped(
                    action.id.clone(),
                    action.action_type,
                    start.elapsed().as_millis() as u64,
                );
            }
        }

        let Some(handler) = self.registry.get(action.action_type) else {
            return ActionResult::failure(
                action.id.clone(),
                action.action_type,
                format!("未注册的动作类型: {}", action.action_type),
                start.elapsed().as_millis() as u64,
            );
        };

        // 参数校验先于分发，缺参是校验失败而非运行时异常
        let missing: Vec<&str> = handler
            .required_params()
            .iter()
            .copied()
            .filter(|p| !action.parameters.contains_key(*p))
            .collect();
        if !missing.is_empty() {
            return ActionResult::failure(
                action.id.clone(),
                action.action_type,
                format!("缺少必需参数: {}", missing.join(", ")),
                start.elapsed().as_millis() as u64,
            );
        }

        let timeout = action
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        // 处理器在独立任务中运行：panic 被隔离为该动作的失败结果，
        // 不会波及批次中的其他动作
        let parameters = action.parameters.clone();
        let task_ctx = ctx.clone();
        let task = tokio::spawn(async move { handler.execute(&parameters, &task_ctx).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(output))) => ActionResult::success(
                action.id.clone(),
                action.action_type,
                output,
                start.elapsed().as_millis() as u64,
            ),
            Ok(Ok(Err(e))) => {
                warn!(
                    action_id = %action.id,
                    action_type = %action.action_type,
                    error = %e,
                    "动作执行失败"
                );
                ActionResult::failure(
                    action.id.clone(),
                    action.action_type,
                    e,
                    start.elapsed().as_millis() as u64,
                )
            }
            Ok(Err(join_err)) => ActionResult::failure(
                action.id.clone(),
                action.action_type,
                format!("动作处理器异常退出: {}", join_err),
                start.elapsed().as_millis() as u64,
            ),
            // 超时后派生的任务被放弃继续运行，重试策略归属具体处理器
            Err(_) => ActionResult::failure(
                action.id.clone(),
                action.action_type,
                format!("动作执行超时 ({} ms)", timeout.as_millis()),
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    /// 按 order 升序顺序执行动作批次
    ///
    /// 动作之间可能存在有意的副作用顺序，因此严格串行；
    /// 任何动作失败都不会中断后续动作。
    pub async fn execute_actions(
        &self,
        actions: &[RuleAction],
        ctx: &ExecutionContext,
    ) -> Vec<ActionResult> {
        let mut ordered: Vec<&RuleAction> = actions.iter().collect();
        // 稳定排序：order 相同时保持定义顺序
        ordered.sort_by_key(|a| a.order);

        let mut results = Vec::with_capacity(ordered.len());
        for action in ordered {
            results.push(self.execute(action, ctx).await);
        }
        results
    }
}
