//! 规则引擎领域模型

use crate::operators::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 条件值的数据类型标注
///
/// 用于定义侧标注字段的期望类型，评估时作为类型提示参与数值强制转换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

/// 规则条件
///
/// 单个谓词：对执行上下文中 `field` 路径指向的值应用 `operator`。
/// `parameters` 仅供业务操作符使用，承载实体之外的领域输入
/// （如信用检查所需的 currentBalance / creditLimit）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default = "new_id")]
    pub id: String,
    pub field: String,
    pub operator: Operator,
    /// 条件操作数；空值检查操作符不需要。between 要求 [min, max] 数组
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub data_type: DataType,
    /// 评估结果取反
    #[serde(default)]
    pub negate: bool,
    /// 业务操作符的参数包
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RuleCondition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            id: new_id(),
            field: field.into(),
            operator,
            value: value.into(),
            data_type: DataType::default(),
            negate: false,
            parameters: Map::new(),
        }
    }

    /// 构建空值检查条件
    pub fn nullity(field: impl Into<String>, operator: Operator) -> Self {
        Self {
            id: new_id(),
            field: field.into(),
            operator,
            value: Value::Null,
            data_type: DataType::default(),
            negate: false,
            parameters: Map::new(),
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// 动作类型
///
/// 封闭枚举。引擎本身只内置数据形态的处理器（set_field、log_event、
/// approve、reject、escalate、calculate），其余类型的处理器由宿主通过
/// 注册表提供，引擎对其背后的副作用不做任何假设。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SetField,
    SendNotification,
    TriggerWorkflow,
    CallApi,
    ExecuteScript,
    Approve,
    Reject,
    Escalate,
    LogEvent,
    UpdateDatabase,
    SendEmail,
    Calculate,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SetField => "set_field",
            Self::SendNotification => "send_notification",
            Self::TriggerWorkflow => "trigger_workflow",
            Self::CallApi => "call_api",
            Self::ExecuteScript => "execute_script",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Escalate => "escalate",
            Self::LogEvent => "log_event",
            Self::UpdateDatabase => "update_database",
            Self::SendEmail => "send_email",
            Self::Calculate => "calculate",
        };
        write!(f, "{}", s)
    }
}

/// 规则动作
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub parameters: Map<String, Value>,
    /// 执行顺序，动作批次按此字段升序执行
    pub order: u32,
    /// 动作级守卫条件：评估为 false 时跳过此动作（记为 skipped，不算失败）
    #[serde(default)]
    pub condition: Option<RuleCondition>,
    /// 单动作超时（毫秒），缺省使用引擎配置的默认超时
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RuleAction {
    pub fn new(action_type: ActionType, parameters: Map<String, Value>, order: u32) -> Self {
        Self {
            id: new_id(),
            action_type,
            parameters,
            order,
            condition: None,
            timeout_ms: None,
        }
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// 规则定义
///
/// 不变量：至少一个条件和一个动作；条件/动作 ID 在规则内唯一。
/// 由 `RuleValidator` 在创建/更新时强制。执行期间定义只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 数值越小优先级越高
    #[serde(default)]
    pub priority: u32,
    /// 同优先级时的平手裁决值，越小越靠前
    #[serde(default)]
    pub precedence: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl RuleDefinition {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        created_by: impl Into<String>,
        conditions: Vec<RuleCondition>,
        actions: Vec<RuleAction>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            version: "1.0.0".to_string(),
            category: category.into(),
            tags: Vec::new(),
            priority: 0,
            precedence: None,
            enabled: true,
            conditions,
            actions,
            created_by: created_by.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_precedence(mut self, precedence: u32) -> Self {
        self.precedence = Some(precedence);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 规则组执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// 按优先级顺序执行所有规则，聚合全部结果
    #[default]
    All,
    /// 按优先级顺序逐条评估，首条匹配的规则执行动作后立即返回
    FirstMatch,
    /// 评估所有规则的条件，仅优先级最高的匹配规则执行动作并作为唯一结果返回
    BestMatch,
    /// 与 All 行为相同，语义上表示调用方会自行合并多条结果
    Aggregate,
}

/// 规则组
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 组内规则 ID，有序
    pub rule_ids: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub stop_on_first_match: Option<bool>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RuleGroup {
    pub fn new(name: impl Into<String>, rule_ids: Vec<String>, execution_mode: ExecutionMode) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: None,
            rule_ids,
            execution_mode,
            stop_on_first_match: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
