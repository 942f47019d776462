//! 执行上下文与字段解析
//!
//! 上下文是一次执行的信封：被评估的实体数据、调用方元数据、
//! 以及业务操作符/动作处理器可能需要的辅助变量。
//! 字段解析支持点号路径和数组索引（如 `items[0].price`），
//! 任何一跳缺失都返回 None，绝不报错。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 规则执行上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub correlation_id: String,
    pub user_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// 被评估的实体数据图
    pub entity: Value,
    pub entity_type: String,
    pub entity_id: String,
    /// 辅助变量（非实体数据，如业务操作符需要的配置项）
    #[serde(default)]
    pub context: Map<String, Value>,
    /// 试运行标记；副作用型动作处理器应据此跳过真实副作用
    #[serde(default)]
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(entity: Value, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            user_id: String::new(),
            timestamp: Utc::now(),
            entity,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            context: Map::new(),
            dry_run: false,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// 解析字段路径
    ///
    /// 固定的信封字面量（correlationId、userId、timestamp、entityType、
    /// entityId）解析到上下文信封本身，其余路径解析到实体数据图。
    pub fn resolve(&self, path: &str) -> Option<Value> {
        match path {
            "correlationId" => return Some(Value::String(self.correlation_id.clone())),
            "userId" => return Some(Value::String(self.user_id.clone())),
            "timestamp" => return Some(Value::String(self.timestamp.to_rfc3339())),
            "entityType" => return Some(Value::String(self.entity_type.clone())),
            "entityId" => return Some(Value::String(self.entity_id.clone())),
            _ => {}
        }

        resolve_path(&self.entity, path).cloned()
    }

    /// 获取辅助变量
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

/// 在数据图中解析点号路径，每段可带 `name[idx]` 数组索引后缀
pub(crate) fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;

    for segment in path.split('.') {
        let (name, index) = parse_segment(segment)?;

        if !name.is_empty() {
            current = current.as_object()?.get(name)?;
        }

        if let Some(idx) = index {
            current = current.as_array()?.get(idx)?;
        }
    }

    Some(current)
}

/// 拆分路径段为字段名和可选数组索引
///
/// `items[0]` -> ("items", Some(0))；`price` -> ("price", None)。
/// 索引格式非法时整段解析失败。
fn parse_segment(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        Some(open) => {
            let close = segment.rfind(']')?;
            if close != segment.len() - 1 || close <= open {
                return None;
            }
            let idx: usize = segment[open + 1..close].parse().ok()?;
            Some((&segment[..open], Some(idx)))
        }
        None => Some((segment, None)),
    }
}
