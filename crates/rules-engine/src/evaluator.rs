//! 条件评估器
//!
//! 实现内置操作符的评估逻辑和业务操作符的注册表分发。
//! 类型不匹配走宽松降级路径（数值强制转换、布尔转 0/1、日期转毫秒），
//! 评估错误内联记录在条件追踪中，不会中断兄弟条件或整条规则。

use crate::context::ExecutionContext;
use crate::models::RuleCondition;
use crate::operators::{LogicalOperator, Operator};
use crate::result::ConditionTrace;
use chrono::{DateTime, NaiveDate};
use dashmap::DashMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// 业务操作符抽象
///
/// 业务操作符将领域公式（信用检查、库存可用性等）封装为可注册的条件
/// 操作符。`parameters` 携带条件定义侧的领域输入，这些输入不属于实体本身。
pub trait BusinessOperator: Send + Sync {
    /// 操作符名称，规则定义通过此名称引用
    fn name(&self) -> &str;

    /// 评估操作符
    ///
    /// # Arguments
    /// * `field_value` - 从上下文解析出的字段值，字段缺失为 None
    /// * `expected` - 条件定义的操作数
    /// * `parameters` - 条件上的业务参数包
    /// * `ctx` - 完整执行上下文（可读取辅助变量）
    fn evaluate(
        &self,
        field_value: Option<&Value>,
        expected: &Value,
        parameters: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<bool, String>;
}

/// 条件评估器
///
/// 内置操作符静态分发；业务操作符在注册表中按名称查找。
/// 注册应在引擎初始化阶段完成。
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    business_operators: Arc<DashMap<String, Arc<dyn BusinessOperator>>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册业务操作符，同名覆盖
    pub fn register_operator(&self, operator: Arc<dyn BusinessOperator>) {
        self.business_operators
            .insert(operator.name().to_string(), operator);
    }

    /// 已注册的业务操作符数量
    pub fn operator_count(&self) -> usize {
        self.business_operators.len()
    }

    /// 评估单个条件，产出完整追踪
    ///
    /// 字段解析失败、未知操作符等都记录为追踪中的错误并使结果为 false，
    /// 绝不向外抛出。
    pub fn evaluate(&self, condition: &RuleCondition, ctx: &ExecutionContext) -> ConditionTrace {
        let start = Instant::now();
        let field_value = ctx.resolve(&condition.field);

        let outcome = self.apply(field_value.as_ref(), condition, ctx);

        let (result, error) = match outcome {
            // negate 与操作符结果异或；出错的条件保持 false，不受 negate 影响
            Ok(matched) => (matched ^ condition.negate, None),
            Err(e) => (false, Some(e)),
        };

        ConditionTrace {
            condition_id: condition.id.clone(),
            field: condition.field.clone(),
            operator: condition.operator.clone(),
            expected: condition.value.clone(),
            actual: field_value.unwrap_or(Value::Null),
            result,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
        }
    }

    /// 组合评估条件列表
    ///
    /// 每个条件独立评估（无短路，保证追踪完整），再按逻辑操作符组合：
    /// And 全部为真；Or 任一为真；Xor 恰好一个为真；Not 仅对单条件列表
    /// 有定义，取第一个条件的否定。
    pub fn evaluate_conditions(
        &self,
        conditions: &[RuleCondition],
        ctx: &ExecutionContext,
        logical_operator: LogicalOperator,
    ) -> (bool, Vec<ConditionTrace>) {
        let traces: Vec<ConditionTrace> = conditions
            .iter()
            .map(|c| self.evaluate(c, ctx))
            .collect();

        let combined = match logical_operator {
            LogicalOperator::And => traces.iter().all(|t| t.result),
            LogicalOperator::Or => traces.iter().any(|t| t.result),
            LogicalOperator::Xor => traces.iter().filter(|t| t.result).count() == 1,
            LogicalOperator::Not => !traces.first().map(|t| t.result).unwrap_or(false),
        };

        (combined, traces)
    }

    /// 应用操作符
    fn apply(
        &self,
        field_value: Option<&Value>,
        condition: &RuleCondition,
        ctx: &ExecutionContext,
    ) -> Result<bool, String> {
        // 空值检查的语义就是检查值是否存在，先于缺失短路处理
        match &condition.operator {
            Operator::IsNull => return Ok(is_null(field_value)),
            Operator::IsNotNull => return Ok(!is_null(field_value)),
            Operator::Business(name) => {
                let op = self
                    .business_operators
                    .get(name.as_str())
                    .ok_or_else(|| format!("未知操作符: {}", name))?;
                return op.evaluate(field_value, &condition.value, &condition.parameters, ctx);
            }
            _ => {}
        }

        // in/not_in 对非数组操作数有固定语义，不依赖字段值
        let expected = &condition.value;
        match &condition.operator {
            Operator::In if !expected.is_array() => return Ok(false),
            Operator::NotIn if !expected.is_array() => return Ok(true),
            _ => {}
        }

        // 其余操作符在字段缺失时一律不匹配
        let field = match field_value {
            Some(v) => v,
            None => return Ok(false),
        };

        let matched = match &condition.operator {
            Operator::Equals => loose_eq(field, expected),
            Operator::NotEquals => !loose_eq(field, expected),
            Operator::GreaterThan => to_number(field) > to_number(expected),
            Operator::GreaterThanOrEqual => to_number(field) >= to_number(expected),
            Operator::LessThan => to_number(field) < to_number(expected),
            Operator::LessThanOrEqual => to_number(field) <= to_number(expected),
            Operator::Between => between(field, expected),
            Operator::In => in_list(field, expected),
            Operator::NotIn => !in_list(field, expected),
            Operator::Contains => contains(field, expected),
            Operator::NotContains => !contains(field, expected),
            Operator::StartsWith => string_pair(field, expected)
                .map(|(s, p)| s.to_lowercase().starts_with(&p.to_lowercase()))
                .unwrap_or(false),
            Operator::EndsWith => string_pair(field, expected)
                .map(|(s, p)| s.to_lowercase().ends_with(&p.to_lowercase()))
                .unwrap_or(false),
            Operator::Regex => return regex_match(field, expected),
            Operator::IsNull | Operator::IsNotNull | Operator::Business(_) => unreachable!(),
        };

        Ok(matched)
    }
}

/// 判断值是否为空
fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// 宽松相等
///
/// 两侧都能解析为数值时按数值比较（100 == 100.0、"100" == 100），
/// 否则直接比较 JSON 值。
fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return (x - y).abs() < f64::EPSILON;
    }
    a == b
}

/// 严格数值解析：数值本身，或可解析为数值的字符串
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// 宽松数值强制转换（用于有序比较）
///
/// 字符串先按数值解析，再按日期解析（转为 epoch 毫秒），都失败回退 0；
/// 布尔转 0/1。存储层类型漂移因此退化为可比较数值而非报错。
fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s
            .parse::<f64>()
            .ok()
            .or_else(|| parse_datetime_millis(s))
            .unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// 解析日期时间字符串为 epoch 毫秒
fn parse_datetime_millis(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis() as f64);
    }
    None
}

/// 范围比较，expected 必须是 [min, max] 数组，形状非法时不匹配
fn between(field: &Value, expected: &Value) -> bool {
    let Some(arr) = expected.as_array() else {
        return false;
    };
    if arr.len() != 2 {
        return false;
    }

    let v = to_number(field);
    v >= to_number(&arr[0]) && v <= to_number(&arr[1])
}

/// 列表成员检查
fn in_list(field: &Value, expected: &Value) -> bool {
    expected
        .as_array()
        .map(|arr| arr.iter().any(|item| loose_eq(field, item)))
        .unwrap_or(false)
}

/// 包含检查：字符串子串（大小写不敏感）或数组成员
fn contains(field: &Value, expected: &Value) -> bool {
    match field {
        Value::String(s) => expected
            .as_str()
            .map(|sub| s.to_lowercase().contains(&sub.to_lowercase()))
            .unwrap_or(false),
        Value::Array(arr) => arr.iter().any(|item| loose_eq(item, expected)),
        _ => false,
    }
}

fn string_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

/// 正则匹配，模式非法记为条件错误
fn regex_match(field: &Value, expected: &Value) -> Result<bool, String> {
    let Some(s) = field.as_str() else {
        return Ok(false);
    };
    let Some(pattern) = expected.as_str() else {
        return Ok(false);
    };

    let regex =
        Regex::new(pattern).map_err(|e| format!("无效的正则表达式 '{}': {}", pattern, e))?;
    Ok(regex.is_match(s))
}
