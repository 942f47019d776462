//! 执行结果模型
//!
//! 每次执行返回完整、可检视的结构化结果：逐条件的评估追踪、
//! 逐动作的执行结果、规则级错误，以及跨规则的汇总统计。

use crate::models::ActionType;
use crate::operators::Operator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单条件评估追踪
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTrace {
    pub condition_id: String,
    pub field: String,
    pub operator: Operator,
    /// 规则中定义的期望值
    pub expected: Value,
    /// 从上下文解析出的实际值（解析失败为 null）
    pub actual: Value,
    pub result: bool,
    pub duration_ms: u64,
    /// 评估错误（未知操作符等），记录后条件结果为 false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 单动作执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_id: String,
    pub action_type: ActionType,
    pub success: bool,
    /// 守卫条件为 false 导致的跳过（跳过计为成功）
    #[serde(default)]
    pub skipped: bool,
    /// 处理器返回的结果载荷
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn success(action_id: String, action_type: ActionType, output: Value, duration_ms: u64) -> Self {
        Self {
            action_id,
            action_type,
            success: true,
            skipped: false,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn skipped(action_id: String, action_type: ActionType, duration_ms: u64) -> Self {
        Self {
            action_id,
            action_type,
            success: true,
            skipped: true,
            output: Value::Null,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(
        action_id: String,
        action_type: ActionType,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            action_id,
            action_type,
            success: false,
            skipped: false,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// 单规则执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleExecutionResult {
    pub rule_id: String,
    pub rule_name: String,
    pub matched: bool,
    /// 规则被禁用时短路为 skipped，不评估条件也不执行动作
    #[serde(default)]
    pub skipped: bool,
    pub condition_traces: Vec<ConditionTrace>,
    pub action_results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RuleExecutionResult {
    pub fn skipped(rule_id: String, rule_name: String) -> Self {
        Self {
            rule_id,
            rule_name,
            matched: false,
            skipped: true,
            condition_traces: Vec::new(),
            action_results: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }
}

/// 执行汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub total_rules: usize,
    pub matched_rules: usize,
    pub not_matched_rules: usize,
    pub errored_rules: usize,
    pub skipped_rules: usize,
    pub actions_succeeded: usize,
    pub actions_failed: usize,
    pub average_rule_duration_ms: f64,
}

impl ExecutionSummary {
    /// 由结果列表计算汇总
    pub fn from_results(results: &[RuleExecutionResult]) -> Self {
        let total_rules = results.len();
        let matched_rules = results.iter().filter(|r| r.matched).count();
        let skipped_rules = results.iter().filter(|r| r.skipped).count();
        let errored_rules = results.iter().filter(|r| r.error.is_some()).count();
        let not_matched_rules = total_rules - matched_rules - skipped_rules;

        let actions_succeeded = results
            .iter()
            .flat_map(|r| &r.action_results)
            .filter(|a| a.success)
            .count();
        let actions_failed = results
            .iter()
            .flat_map(|r| &r.action_results)
            .filter(|a| !a.success)
            .count();

        let average_rule_duration_ms = if total_rules > 0 {
            results.iter().map(|r| r.duration_ms).sum::<u64>() as f64 / total_rules as f64
        } else {
            0.0
        };

        Self {
            total_rules,
            matched_rules,
            not_matched_rules,
            errored_rules,
            skipped_rules,
            actions_succeeded,
            actions_failed,
            average_rule_duration_ms,
        }
    }
}

/// 引擎执行响应
///
/// 执行类调用统一返回此对象，调用方永远拿到完整响应而非裸异常。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub results: Vec<RuleExecutionResult>,
    pub summary: ExecutionSummary,
    /// 规则级错误的顶层汇总
    #[serde(default)]
    pub errors: Vec<String>,
    /// 响应元数据（如 dryRun 标记）
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EngineResponse {
    /// 由结果列表组装响应，汇总与顶层错误列表一并计算
    pub fn from_results(results: Vec<RuleExecutionResult>) -> Self {
        let summary = ExecutionSummary::from_results(&results);
        let errors = results
            .iter()
            .filter_map(|r| {
                r.error
                    .as_ref()
                    .map(|e| format!("{}: {}", r.rule_id, e))
            })
            .collect();

        Self {
            results,
            summary,
            errors,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
