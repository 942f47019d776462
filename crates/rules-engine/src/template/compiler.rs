//! 模板编译器
//!
//! 将模板与参数值结合，生成具体的条件和动作。编译分两遍：
//! 第一遍收集全部 `{{name}}` 占位符并整体校验（必填参数、未声明
//! 占位符、参数类型），所有问题一次性报告；第二遍执行代入，
//! 纯占位符字符串代入为参数的原始 JSON 类型，混合字符串做文本插值。

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

use super::models::{RuleTemplate, TemplateParameter, TemplateParameterType};
use crate::models::{RuleAction, RuleCondition, new_id};

/// 模板编译错误
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("缺少必填参数: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("无法解析的占位符: {}", .0.join(", "))]
    UnresolvedPlaceholders(Vec<String>),

    #[error("参数类型错误: {name} 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// 模板编译器
pub struct TemplateCompiler {
    /// 匹配 {{paramName}} 格式的占位符
    placeholder_regex: Regex,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self {
            placeholder_regex: Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").unwrap(),
        }
    }

    /// 编译模板
    ///
    /// 返回可直接装配进规则定义的具体条件和动作，每个都带新生成的 ID。
    pub fn compile(
        &self,
        template: &RuleTemplate,
        params: &Map<String, Value>,
    ) -> Result<(Vec<RuleCondition>, Vec<RuleAction>), TemplateError> {
        let merged = self.merge_with_defaults(&template.parameters, params);

        // 第一遍：整体校验，所有问题一次性暴露
        self.validate_required(&template.parameters, &merged)?;
        self.validate_types(&template.parameters, &merged)?;
        self.validate_placeholders(template, &merged)?;

        // 第二遍：代入
        let conditions = template
            .condition_templates
            .iter()
            .map(|ct| RuleCondition {
                id: new_id(),
                field: ct.field.clone(),
                operator: ct.operator.clone(),
                value: self.substitute(&ct.value, &merged),
                data_type: Default::default(),
                negate: ct.negate,
                parameters: self.substitute_map(&ct.parameters, &merged),
            })
            .collect();

        let actions = template
            .action_templates
            .iter()
            .map(|at| RuleAction {
                id: new_id(),
                action_type: at.action_type,
                parameters: self.substitute_map(&at.parameters, &merged),
                order: at.order,
                condition: None,
                timeout_ms: None,
            })
            .collect();

        Ok((conditions, actions))
    }

    /// 合并用户参数与声明的默认值
    fn merge_with_defaults(
        &self,
        definitions: &[TemplateParameter],
        params: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut merged = params.clone();
        for def in definitions {
            if !merged.contains_key(&def.name)
                && let Some(default) = &def.default
            {
                merged.insert(def.name.clone(), default.clone());
            }
        }
        merged
    }

    /// 必填参数齐全性校验，缺失的参数全部列出
    fn validate_required(
        &self,
        definitions: &[TemplateParameter],
        merged: &Map<String, Value>,
    ) -> Result<(), TemplateError> {
        let missing: Vec<String> = definitions
            .iter()
            .filter(|def| def.required && !merged.contains_key(&def.name))
            .map(|def| def.name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::MissingParameters(missing))
        }
    }

    /// 参数值类型校验
    fn validate_types(
        &self,
        definitions: &[TemplateParameter],
        merged: &Map<String, Value>,
    ) -> Result<(), TemplateError> {
        for def in definitions {
            let Some(value) = merged.get(&def.name) else {
                continue;
            };

            let type_ok = match def.param_type {
                TemplateParameterType::String => value.is_string(),
                TemplateParameterType::Number => value.is_number(),
                TemplateParameterType::Boolean => value.is_boolean(),
                TemplateParameterType::Date => value.is_string(),
                TemplateParameterType::Array => value.is_array(),
            };

            if !type_ok {
                return Err(TemplateError::TypeMismatch {
                    name: def.name.clone(),
                    expected: format!("{:?}", def.param_type).to_lowercase(),
                    actual: value_type_name(value),
                });
            }
        }
        Ok(())
    }

    /// 占位符可解析性校验
    ///
    /// 模板中出现、但合并后的参数表中不存在的占位符全部列出。
    /// 未声明的占位符不会静默留在产出里。
    fn validate_placeholders(
        &self,
        template: &RuleTemplate,
        merged: &Map<String, Value>,
    ) -> Result<(), TemplateError> {
        let mut unresolved = BTreeSet::new();

        for ct in &template.condition_templates {
            self.collect_unresolved(&ct.value, merged, &mut unresolved);
            for value in ct.parameters.values() {
                self.collect_unresolved(value, merged, &mut unresolved);
            }
        }
        for at in &template.action_templates {
            for value in at.parameters.values() {
                self.collect_unresolved(value, merged, &mut unresolved);
            }
        }

        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(TemplateError::UnresolvedPlaceholders(
                unresolved.into_iter().collect(),
            ))
        }
    }

    fn collect_unresolved(
        &self,
        value: &Value,
        merged: &Map<String, Value>,
        unresolved: &mut BTreeSet<String>,
    ) {
        match value {
            Value::String(s) => {
                for caps in self.placeholder_regex.captures_iter(s) {
                    let name = &caps[1];
                    if !merged.contains_key(name) {
                        unresolved.insert(name.to_string());
                    }
                }
            }
            Value::Array(arr) => {
                for item in arr {
                    self.collect_unresolved(item, merged, unresolved);
                }
            }
            Value::Object(obj) => {
                for item in obj.values() {
                    self.collect_unresolved(item, merged, unresolved);
                }
            }
            _ => {}
        }
    }

    /// 递归代入占位符
    ///
    /// 纯占位符字符串（如 "{{amount}}"）直接替换为参数值以保留原始类型；
    /// 混合字符串（如 "limit: {{amount}}"）做文本插值。
    fn substitute(&self, template: &Value, params: &Map<String, Value>) -> Value {
        match template {
            Value::String(s) => {
                if let Some(caps) = self.placeholder_regex.captures(s)
                    && caps.get(0).map(|m| m.as_str()) == Some(s.as_str())
                    && let Some(value) = params.get(&caps[1])
                {
                    return value.clone();
                }

                let replaced = self
                    .placeholder_regex
                    .replace_all(s, |caps: &regex::Captures| {
                        params
                            .get(&caps[1])
                            .map(|v| match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .unwrap_or_else(|| caps[0].to_string())
                    });
                Value::String(replaced.into_owned())
            }
            Value::Array(arr) => Value::Array(
                arr.iter()
                    .map(|item| self.substitute(item, params))
                    .collect(),
            ),
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), self.substitute(v, params)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn substitute_map(
        &self,
        map: &Map<String, Value>,
        params: &Map<String, Value>,
    ) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.substitute(v, params)))
            .collect()
    }
}

fn value_type_name(v: &Value) -> String {
    match v {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::String(_) => "string".into(),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}
