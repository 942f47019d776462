//! 规则执行服务
//!
//! 单规则执行状态机与多规则批次编排：
//! 1. 禁用规则短路为 skipped 结果；
//! 2. 评估全部条件并产出逐条件追踪（条件错误内联记录）；
//! 3. 全部条件为真才算匹配；
//! 4. 匹配时按序执行动作批次，动作失败互相隔离；
//! 5. 组装带耗时的结果和汇总。

use crate::context::ExecutionContext;
use crate::evaluator::ConditionEvaluator;
use crate::executor::ActionExecutor;
use crate::models::RuleDefinition;
use crate::operators::LogicalOperator;
use crate::result::{EngineResponse, RuleExecutionResult};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, instrument};

/// 规则执行服务
#[derive(Clone)]
pub struct RuleExecutionService {
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
}

impl RuleExecutionService {
    pub fn new(evaluator: ConditionEvaluator, executor: ActionExecutor) -> Self {
        Self {
            evaluator,
            executor,
        }
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    /// 执行单条规则，返回完整结果
    ///
    /// 规则匹配判定固定使用 AND 语义：所有条件为真才匹配。
    /// 条件评估错误记录在追踪中并使该条件为 false，不会使规则报错。
    #[instrument(skip(self, rule, ctx), fields(rule_id = %rule.id, rule_name = %rule.name))]
    pub async fn execute_rule(
        &self,
        rule: &RuleDefinition,
        ctx: &ExecutionContext,
    ) -> RuleExecutionResult {
        let start = Instant::now();

        // 禁用规则短路：不评估条件也不执行动作
        if !rule.enabled {
            debug!("规则已禁用，跳过执行");
            return RuleExecutionResult::skipped(rule.id.clone(), rule.name.clone());
        }

        let (matched, condition_traces) =
            self.evaluator
                .evaluate_conditions(&rule.conditions, ctx, LogicalOperator::And);

        let action_results = if matched && !rule.actions.is_empty() {
            self.executor.execute_actions(&rule.actions, ctx).await
        } else {
            Vec::new()
        };

        debug!(
            matched,
            conditions = condition_traces.len(),
            actions = action_results.len(),
            "规则执行完成"
        );

        RuleExecutionResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            matched,
            skipped: false,
            condition_traces,
            action_results,
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// 执行单条规则并包装为引擎响应
    pub async fn execute(&self, rule: &RuleDefinition, ctx: &ExecutionContext) -> EngineResponse {
        let result = self.execute_rule(rule, ctx).await;
        EngineResponse::from_results(vec![result])
    }

    /// 试运行单条规则
    ///
    /// 与正常执行走完全相同的路径；上下文带 dry_run 标记传递给每个
    /// 动作处理器，外部副作用型处理器应据此转为只读。响应元数据
    /// 标记 dryRun，调用方可以区分真实执行与模拟。
    pub async fn dry_run(&self, rule: &RuleDefinition, ctx: &ExecutionContext) -> EngineResponse {
        let mut dry_ctx = ctx.clone();
        dry_ctx.dry_run = true;

        let result = self.execute_rule(rule, &dry_ctx).await;
        EngineResponse::from_results(vec![result]).with_metadata("dryRun", json!(true))
    }

    /// 按优先级升序执行多条规则
    ///
    /// 稳定排序：同优先级保持传入顺序。规则之间相互独立，
    /// 串行执行以保证结果顺序确定。
    pub async fn execute_rules(
        &self,
        rules: &[RuleDefinition],
        ctx: &ExecutionContext,
    ) -> EngineResponse {
        let mut ordered: Vec<&RuleDefinition> = rules.iter().collect();
        ordered.sort_by_key(|r| r.priority);

        let mut results = Vec::with_capacity(ordered.len());
        for rule in ordered {
            results.push(self.execute_rule(rule, ctx).await);
        }

        EngineResponse::from_results(results)
    }
}
