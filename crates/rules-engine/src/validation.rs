//! 规则定义校验器
//!
//! 创建/更新前的结构化校验：同步、无 I/O。所有违规累积到问题列表
//! 一次性返回，绝不在首个错误处短路，调用方能一次看到全部问题。
//! 警告不阻塞保存。

use crate::models::{RuleDefinition, RuleCondition};
use crate::operators::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// 问题严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// 单个校验问题
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    /// 问题定位路径，如 `conditions[2].field`
    pub field: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(code: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: field.into(),
            severity: Severity::Error,
        }
    }

    fn warning(code: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: field.into(),
            severity: Severity::Warning,
        }
    }
}

/// 校验报告
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// 无错误级问题即有效（警告不阻塞）
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .collect()
    }

    /// 错误级问题列表（用于构造校验失败错误）
    pub fn into_errors(self) -> Vec<ValidationIssue> {
        self.issues
            .into_iter()
            .filter(|i| i.severity == Severity::Error)
            .collect()
    }
}

/// 规则校验器
#[derive(Debug, Clone)]
pub struct RuleValidator {
    /// 规则名称长度告警阈值
    max_name_length: usize,
    /// 条件数量告警阈值
    max_conditions_warning: usize,
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self {
            max_name_length: 100,
            max_conditions_warning: 10,
        }
    }
}

impl RuleValidator {
    pub fn new(max_name_length: usize, max_conditions_warning: usize) -> Self {
        Self {
            max_name_length,
            max_conditions_warning,
        }
    }

    /// 校验规则定义
    pub fn validate(&self, rule: &RuleDefinition) -> ValidationReport {
        let mut issues = Vec::new();

        self.validate_identity(rule, &mut issues);
        self.validate_conditions(rule, &mut issues);
        self.validate_actions(rule, &mut issues);

        ValidationReport { issues }
    }

    fn validate_identity(&self, rule: &RuleDefinition, issues: &mut Vec<ValidationIssue>) {
        if rule.name.trim().is_empty() {
            issues.push(ValidationIssue::error("EMPTY_NAME", "name", "规则名称不能为空"));
        } else if rule.name.len() > self.max_name_length {
            issues.push(ValidationIssue::warning(
                "NAME_TOO_LONG",
                "name",
                format!("规则名称超过 {} 个字符", self.max_name_length),
            ));
        }

        if rule.version.trim().is_empty() {
            issues.push(ValidationIssue::error("EMPTY_VERSION", "version", "版本号不能为空"));
        }

        if rule.category.trim().is_empty() {
            issues.push(ValidationIssue::error("EMPTY_CATEGORY", "category", "分类不能为空"));
        }

        if rule.created_by.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "EMPTY_CREATED_BY",
                "createdBy",
                "创建人不能为空",
            ));
        }
    }

    fn validate_conditions(&self, rule: &RuleDefinition, issues: &mut Vec<ValidationIssue>) {
        if rule.conditions.is_empty() {
            issues.push(ValidationIssue::error(
                "NO_CONDITIONS",
                "conditions",
                "规则至少需要一个条件",
            ));
            return;
        }

        if rule.conditions.len() > self.max_conditions_warning {
            issues.push(ValidationIssue::warning(
                "TOO_MANY_CONDITIONS",
                "conditions",
                format!(
                    "条件数量 {} 超过建议上限 {}",
                    rule.conditions.len(),
                    self.max_conditions_warning
                ),
            ));
        }

        let mut seen_ids = HashSet::new();
        for (i, cond) in rule.conditions.iter().enumerate() {
            let path = format!("conditions[{}]", i);

            if !seen_ids.insert(cond.id.as_str()) {
                issues.push(ValidationIssue::error(
                    "DUPLICATE_CONDITION_ID",
                    format!("{}.id", path),
                    format!("条件 ID 重复: {}", cond.id),
                ));
            }

            if cond.field.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    "EMPTY_FIELD",
                    format!("{}.field", path),
                    "条件字段不能为空",
                ));
            }

            self.validate_condition_value(cond, &path, issues);
        }
    }

    /// 校验操作符与值的兼容性
    fn validate_condition_value(
        &self,
        cond: &RuleCondition,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match &cond.operator {
            // 空值检查不需要值
            Operator::IsNull | Operator::IsNotNull => {}
            Operator::Business(name) => {
                if name.trim().is_empty() {
                    issues.push(ValidationIssue::error(
                        "EMPTY_OPERATOR",
                        format!("{}.operator", path),
                        "操作符不能为空",
                    ));
                }
            }
            Operator::Between => {
                let valid = cond
                    .value
                    .as_array()
                    .map(|arr| arr.len() == 2)
                    .unwrap_or(false);
                if !valid {
                    issues.push(ValidationIssue::error(
                        "INVALID_OPERATOR_VALUE",
                        format!("{}.value", path),
                        "between 操作符需要 [min, max] 数组",
                    ));
                }
            }
            Operator::In | Operator::NotIn => {
                if !cond.value.is_array() {
                    issues.push(ValidationIssue::error(
                        "INVALID_OPERATOR_VALUE",
                        format!("{}.value", path),
                        format!("{} 操作符需要数组值", cond.operator),
                    ));
                }
            }
            Operator::Regex => match cond.value.as_str() {
                // 定义时预校验正则，避免运行时才暴露
                Some(pattern) => {
                    if let Err(e) = regex::Regex::new(pattern) {
                        issues.push(ValidationIssue::error(
                            "INVALID_REGEX",
                            format!("{}.value", path),
                            format!("无效的正则表达式: {}", e),
                        ));
                    }
                }
                None => {
                    issues.push(ValidationIssue::error(
                        "INVALID_OPERATOR_VALUE",
                        format!("{}.value", path),
                        "regex 操作符需要字符串值",
                    ));
                }
            },
            _ => {
                if cond.value == Value::Null {
                    issues.push(ValidationIssue::error(
                        "MISSING_VALUE",
                        format!("{}.value", path),
                        format!("{} 操作符需要条件值", cond.operator),
                    ));
                }
            }
        }
    }

    fn validate_actions(&self, rule: &RuleDefinition, issues: &mut Vec<ValidationIssue>) {
        if rule.actions.is_empty() {
            issues.push(ValidationIssue::error(
                "NO_ACTIONS",
                "actions",
                "规则至少需要一个动作",
            ));
            return;
        }

        let mut seen_ids = HashSet::new();
        for (i, action) in rule.actions.iter().enumerate() {
            let path = format!("actions[{}]", i);

            if !seen_ids.insert(action.id.as_str()) {
                issues.push(ValidationIssue::error(
                    "DUPLICATE_ACTION_ID",
                    format!("{}.id", path),
                    format!("动作 ID 重复: {}", action.id),
                ));
            }

            if action.timeout_ms == Some(0) {
                issues.push(ValidationIssue::error(
                    "INVALID_TIMEOUT",
                    format!("{}.timeoutMs", path),
                    "动作超时必须大于 0",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionType, RuleAction};
    use serde_json::{Map, json};

    fn valid_rule() -> RuleDefinition {
        RuleDefinition::new(
            "valid_rule",
            "orders",
            "tester",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(100))],
            vec![RuleAction::new(ActionType::Approve, Map::new(), 1)],
        )
    }

    #[test]
    fn test_valid_rule_passes() {
        let report = RuleValidator::default().validate(&valid_rule());
        assert!(report.is_valid());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_issues_accumulate() {
        let mut rule = valid_rule();
        rule.name = "".into();
        rule.version = "".into();
        rule.conditions.clear();
        rule.actions.clear();

        let report = RuleValidator::default().validate(&rule);

        // 不短路：所有问题一次性报告
        assert!(!report.is_valid());
        let codes: Vec<&str> = report.issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"EMPTY_NAME"));
        assert!(codes.contains(&"EMPTY_VERSION"));
        assert!(codes.contains(&"NO_CONDITIONS"));
        assert!(codes.contains(&"NO_ACTIONS"));
    }

    #[test]
    fn test_missing_value_for_comparison() {
        let mut rule = valid_rule();
        rule.conditions[0].value = Value::Null;

        let report = RuleValidator::default().validate(&rule);
        assert!(!report.is_valid());
        assert_eq!(report.errors()[0].code, "MISSING_VALUE");
    }

    #[test]
    fn test_nullity_check_needs_no_value() {
        let mut rule = valid_rule();
        rule.conditions = vec![RuleCondition::nullity("email", Operator::IsNotNull)];

        let report = RuleValidator::default().validate(&rule);
        assert!(report.is_valid());
    }

    #[test]
    fn test_duplicate_ids_detected() {
        let mut rule = valid_rule();
        let mut dup = rule.conditions[0].clone();
        dup.value = json!(200);
        rule.conditions.push(dup);

        let mut dup_action = rule.actions[0].clone();
        dup_action.order = 2;
        rule.actions.push(dup_action);

        let report = RuleValidator::default().validate(&rule);
        let codes: Vec<&str> = report.issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"DUPLICATE_CONDITION_ID"));
        assert!(codes.contains(&"DUPLICATE_ACTION_ID"));
    }

    #[test]
    fn test_between_shape_checked() {
        let mut rule = valid_rule();
        rule.conditions[0].operator = Operator::Between;
        rule.conditions[0].value = json!([1, 2, 3]);

        let report = RuleValidator::default().validate(&rule);
        assert!(!report.is_valid());
        assert_eq!(report.errors()[0].code, "INVALID_OPERATOR_VALUE");
    }

    #[test]
    fn test_invalid_regex_flagged() {
        let mut rule = valid_rule();
        rule.conditions[0].operator = Operator::Regex;
        rule.conditions[0].value = json!("[invalid");

        let report = RuleValidator::default().validate(&rule);
        assert_eq!(report.errors()[0].code, "INVALID_REGEX");
    }

    #[test]
    fn test_warnings_do_not_block() {
        let mut rule = valid_rule();
        rule.name = "x".repeat(150);
        for i in 0..12 {
            rule.conditions.push(RuleCondition::new(
                format!("field{}", i),
                Operator::GreaterThan,
                json!(i),
            ));
        }

        let report = RuleValidator::default().validate(&rule);
        assert!(report.is_valid());
        assert_eq!(report.warnings().len(), 2);
    }
}
