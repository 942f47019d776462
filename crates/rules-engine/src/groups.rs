//! 规则组服务
//!
//! 规则组的 CRUD 与成员管理。组本身只持有规则 ID 的有序列表和
//! 执行模式策略，成员规则的存在性在执行解析阶段检查。

use crate::error::{Result, RuleError};
use crate::models::RuleGroup;
use crate::store::GroupRepository;
use chrono::Utc;
use rules_shared::events::{EngineEvent, EngineEventType, EventBus};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

/// 规则组服务
#[derive(Clone)]
pub struct RuleGroupService {
    repository: Arc<dyn GroupRepository>,
    events: EventBus,
}

impl RuleGroupService {
    pub fn new(repository: Arc<dyn GroupRepository>, events: EventBus) -> Self {
        Self { repository, events }
    }

    /// 创建规则组
    #[instrument(skip(self, group), fields(group_name = %group.name))]
    pub async fn create(&self, mut group: RuleGroup) -> Result<RuleGroup> {
        if group.name.trim().is_empty() {
            return Err(RuleError::InvalidRequest("规则组名称不能为空".to_string()));
        }

        group.created_at = Utc::now();
        group.updated_at = group.created_at;
        let saved = self.repository.save(group).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::GroupCreated,
            Some(saved.id.clone()),
            json!({"name": saved.name, "ruleCount": saved.rule_ids.len()}),
        ));
        Ok(saved)
    }

    /// 整体更新规则组
    #[instrument(skip(self, group), fields(group_id = %group.id))]
    pub async fn update(&self, mut group: RuleGroup) -> Result<RuleGroup> {
        group.updated_at = Utc::now();
        let updated = self.repository.update(group).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::GroupUpdated,
            Some(updated.id.clone()),
            json!({"name": updated.name}),
        ));
        Ok(updated)
    }

    /// 删除规则组
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(id).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::GroupDeleted,
            Some(id.to_string()),
            Value::Null,
        ));
        Ok(())
    }

    /// 获取规则组，不存在即错误
    pub async fn get(&self, id: &str) -> Result<RuleGroup> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| RuleError::GroupNotFound(id.to_string()))
    }

    /// 列出所有规则组
    pub async fn list(&self) -> Result<Vec<RuleGroup>> {
        self.repository.list().await
    }

    /// 向组内追加规则，已存在时不重复
    pub async fn add_rule(&self, group_id: &str, rule_id: &str) -> Result<RuleGroup> {
        let mut group = self.get(group_id).await?;

        if !group.rule_ids.iter().any(|id| id == rule_id) {
            group.rule_ids.push(rule_id.to_string());
        }
        self.update(group).await
    }

    /// 从组内移除规则
    pub async fn remove_rule(&self, group_id: &str, rule_id: &str) -> Result<RuleGroup> {
        let mut group = self.get(group_id).await?;
        group.rule_ids.retain(|id| id != rule_id);
        self.update(group).await
    }
}
