//! 规则模板数据模型

use crate::models::ActionType;
use crate::operators::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 模板参数类型
///
/// 决定参数值的校验规则，代入时保留原始 JSON 类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateParameterType {
    String,
    Number,
    Boolean,
    Date,
    Array,
}

/// 模板参数声明
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    /// 参数名称，条件/动作模板中以 `{{name}}` 引用
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: TemplateParameterType,
    /// 用户可见的参数标签
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// 是否为必填参数
    #[serde(default)]
    pub required: bool,
    /// 未提供时使用的默认值
    #[serde(default)]
    pub default: Option<Value>,
}

impl TemplateParameter {
    pub fn required(name: impl Into<String>, param_type: TemplateParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            label: None,
            description: None,
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: TemplateParameterType,
        default: Value,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            label: None,
            description: None,
            required: false,
            default: Some(default),
        }
    }
}

/// 条件模板
///
/// 字段和操作符固定，`value` 与 `parameters` 可持有占位符。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTemplate {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// 动作模板
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub order: u32,
}

/// 规则模板
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTemplate {
    #[serde(default = "new_template_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub condition_templates: Vec<ConditionTemplate>,
    pub action_templates: Vec<ActionTemplate>,
    /// 模板参数声明列表
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn new_template_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_enabled() -> bool {
    true
}

impl RuleTemplate {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        condition_templates: Vec<ConditionTemplate>,
        action_templates: Vec<ActionTemplate>,
        parameters: Vec<TemplateParameter>,
    ) -> Self {
        Self {
            id: new_template_id(),
            name: name.into(),
            description: None,
            category: category.into(),
            condition_templates,
            action_templates,
            parameters,
            version: default_version(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
