//! 内置动作处理器
//!
//! 引擎自带的数据形态处理器：字段赋值、日志、审批决策和算术计算。
//! 这些处理器不产生外部副作用，试运行与正常执行行为一致。

use super::ActionHandler;
use crate::context::ExecutionContext;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::info;

/// 字段赋值
///
/// 执行上下文在单次执行内只读，赋值以结果载荷的形式返回，
/// 由调用方（或后续动作的处理器）应用到自己的数据上。
pub struct SetFieldHandler;

#[async_trait]
impl ActionHandler for SetFieldHandler {
    fn name(&self) -> &str {
        "set_field"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["field", "value"]
    }

    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Value, String> {
        Ok(json!({
            "field": parameters["field"],
            "value": parameters["value"],
            "applied": true,
        }))
    }
}

/// 结构化日志事件
pub struct LogEventHandler;

#[async_trait]
impl ActionHandler for LogEventHandler {
    fn name(&self) -> &str {
        "log_event"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["message"]
    }

    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, String> {
        let message = parameters["message"].as_str().unwrap_or_default();
        let level = parameters
            .get("level")
            .and_then(|v| v.as_str())
            .unwrap_or("info");

        info!(
            correlation_id = %ctx.correlation_id,
            entity_id = %ctx.entity_id,
            level,
            "{}",
            message
        );

        Ok(json!({
            "logged": true,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

/// 审批通过决策
pub struct ApproveHandler;

#[async_trait]
impl ActionHandler for ApproveHandler {
    fn name(&self) -> &str {
        "approve"
    }

    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, String> {
        Ok(decision("approved", parameters, ctx))
    }
}

/// 审批拒绝决策
pub struct RejectHandler;

#[async_trait]
impl ActionHandler for RejectHandler {
    fn name(&self) -> &str {
        "reject"
    }

    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, String> {
        Ok(decision("rejected", parameters, ctx))
    }
}

/// 升级处理决策
pub struct EscalateHandler;

#[async_trait]
impl ActionHandler for EscalateHandler {
    fn name(&self) -> &str {
        "escalate"
    }

    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Value, String> {
        let mut result = decision("escalated", parameters, ctx);
        if let Some(level) = parameters.get("level") {
            result["level"] = level.clone();
        }
        Ok(result)
    }
}

fn decision(decision: &str, parameters: &Map<String, Value>, ctx: &ExecutionContext) -> Value {
    json!({
        "decision": decision,
        "entityId": ctx.entity_id,
        "reason": parameters.get("reason").cloned().unwrap_or(Value::Null),
        "decidedAt": Utc::now().to_rfc3339(),
    })
}

/// 算术计算
///
/// operation: add / subtract / multiply / divide / percentage，
/// operands 为数值数组。percentage 为 [value, percent]。
pub struct CalculateHandler;

#[async_trait]
impl ActionHandler for CalculateHandler {
    fn name(&self) -> &str {
        "calculate"
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["operation", "operands"]
    }

    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<Value, String> {
        let operation = parameters["operation"]
            .as_str()
            .ok_or("operation 必须是字符串")?;

        let operands: Vec<f64> = parameters["operands"]
            .as_array()
            .ok_or("operands 必须是数值数组")?
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| format!("非数值操作数: {}", v)))
            .collect::<Result<_, _>>()?;

        if operands.is_empty() {
            return Err("operands 不能为空".to_string());
        }

        let result = match operation {
            "add" => operands.iter().sum(),
            "subtract" => operands[1..].iter().fold(operands[0], |acc, v| acc - v),
            "multiply" => operands.iter().product(),
            "divide" => {
                if operands[1..].iter().any(|v| *v == 0.0) {
                    return Err("除数为零".to_string());
                }
                operands[1..].iter().fold(operands[0], |acc, v| acc / v)
            }
            "percentage" => {
                if operands.len() != 2 {
                    return Err("percentage 需要 [value, percent] 两个操作数".to_string());
                }
                operands[0] * operands[1] / 100.0
            }
            other => return Err(format!("不支持的计算操作: {}", other)),
        };

        Ok(json!({ "operation": operation, "result": result }))
    }
}
