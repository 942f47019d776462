//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
///
/// 内置比较操作符为封闭集合；`Business` 变体携带业务操作符名称，
/// 在评估时通过注册表动态分发。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较
    Equals,
    NotEquals,

    // 数值比较
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,

    // 包含检查
    In,
    NotIn,
    Contains,
    NotContains,

    // 字符串操作
    StartsWith,
    EndsWith,
    Regex,

    // 空值检查
    IsNull,
    IsNotNull,

    // 业务操作符（按名称查注册表分发）
    #[serde(untagged)]
    Business(String),
}

impl Operator {
    /// 空值检查操作符不需要条件值
    pub fn is_nullity_check(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::LessThan => "less_than",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::Business(name) => name,
        };
        write!(f, "{}", s)
    }
}

/// 逻辑操作符
///
/// 用于组合多个条件的评估结果。Not 仅对单条件列表有定义。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Xor,
    Not,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Xor => write!(f, "XOR"),
            Self::Not => write!(f, "NOT"),
        }
    }
}
