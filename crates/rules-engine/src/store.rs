//! 存储端口与内存参考实现
//!
//! 规则、规则组、模板各自对应一个仓储端口（trait）。引擎只依赖端口，
//! 生产部署可在同一契约后替换持久化存储。内存实现基于 DashMap，
//! 线程安全，同时充当测试替身。

use crate::error::{Result, RuleError};
use crate::models::{RuleDefinition, RuleGroup};
use crate::template::RuleTemplate;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ---------------------------------------------------------------------------
// 仓储端口
// ---------------------------------------------------------------------------

/// 规则定义仓储端口
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn save(&self, rule: RuleDefinition) -> Result<RuleDefinition>;
    async fn get(&self, id: &str) -> Result<Option<RuleDefinition>>;
    async fn get_many(&self, ids: &[String]) -> Result<Vec<RuleDefinition>>;
    async fn update(&self, rule: RuleDefinition) -> Result<RuleDefinition>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<RuleDefinition>>;
}

/// 规则组仓储端口
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn save(&self, group: RuleGroup) -> Result<RuleGroup>;
    async fn get(&self, id: &str) -> Result<Option<RuleGroup>>;
    async fn update(&self, group: RuleGroup) -> Result<RuleGroup>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<RuleGroup>>;
}

/// 规则模板仓储端口
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn save(&self, template: RuleTemplate) -> Result<RuleTemplate>;
    async fn get(&self, id: &str) -> Result<Option<RuleTemplate>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<RuleTemplate>>;
}

// ---------------------------------------------------------------------------
// 内存实现
// ---------------------------------------------------------------------------

/// 规则定义的内存仓储
#[derive(Clone, Default)]
pub struct InMemoryRuleRepository {
    rules: Arc<DashMap<String, RuleDefinition>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    async fn save(&self, rule: RuleDefinition) -> Result<RuleDefinition> {
        self.rules.insert(rule.id.clone(), rule.clone());
        info!("规则已保存");
        Ok(rule)
    }

    async fn get(&self, id: &str) -> Result<Option<RuleDefinition>> {
        Ok(self.rules.get(id).map(|r| r.clone()))
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<RuleDefinition>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.rules.get(id).map(|r| r.clone()))
            .collect())
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn update(&self, rule: RuleDefinition) -> Result<RuleDefinition> {
        if !self.rules.contains_key(&rule.id) {
            warn!("更新不存在的规则");
            return Err(RuleError::RuleNotFound(rule.id));
        }
        self.rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        if self.rules.remove(id).is_some() {
            info!("规则已删除: {}", id);
            Ok(())
        } else {
            warn!("删除不存在的规则: {}", id);
            Err(RuleError::RuleNotFound(id.to_string()))
        }
    }

    async fn list(&self) -> Result<Vec<RuleDefinition>> {
        Ok(self.rules.iter().map(|r| r.value().clone()).collect())
    }
}

/// 规则组的内存仓储
#[derive(Clone, Default)]
pub struct InMemoryGroupRepository {
    groups: Arc<DashMap<String, RuleGroup>>,
}

impl InMemoryGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    #[instrument(skip(self, group), fields(group_id = %group.id, group_name = %group.name))]
    async fn save(&self, group: RuleGroup) -> Result<RuleGroup> {
        self.groups.insert(group.id.clone(), group.clone());
        info!("规则组已保存");
        Ok(group)
    }

    async fn get(&self, id: &str) -> Result<Option<RuleGroup>> {
        Ok(self.groups.get(id).map(|g| g.clone()))
    }

    #[instrument(skip(self, group), fields(group_id = %group.id))]
    async fn update(&self, group: RuleGroup) -> Result<RuleGroup> {
        if !self.groups.contains_key(&group.id) {
            warn!("更新不存在的规则组");
            return Err(RuleError::GroupNotFound(group.id));
        }
        self.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        if self.groups.remove(id).is_some() {
            info!("规则组已删除: {}", id);
            Ok(())
        } else {
            Err(RuleError::GroupNotFound(id.to_string()))
        }
    }

    async fn list(&self) -> Result<Vec<RuleGroup>> {
        Ok(self.groups.iter().map(|g| g.value().clone()).collect())
    }
}

/// 规则模板的内存仓储
#[derive(Clone, Default)]
pub struct InMemoryTemplateRepository {
    templates: Arc<DashMap<String, RuleTemplate>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    #[instrument(skip(self, template), fields(template_id = %template.id, template_name = %template.name))]
    async fn save(&self, template: RuleTemplate) -> Result<RuleTemplate> {
        self.templates.insert(template.id.clone(), template.clone());
        info!("模板已保存");
        Ok(template)
    }

    async fn get(&self, id: &str) -> Result<Option<RuleTemplate>> {
        Ok(self.templates.get(id).map(|t| t.clone()))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        if self.templates.remove(id).is_some() {
            info!("模板已删除: {}", id);
            Ok(())
        } else {
            Err(RuleError::TemplateNotFound(id.to_string()))
        }
    }

    async fn list(&self) -> Result<Vec<RuleTemplate>> {
        Ok(self.templates.iter().map(|t| t.value().clone()).collect())
    }
}
