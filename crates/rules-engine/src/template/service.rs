//! 规则模板服务
//!
//! 模板的 CRUD 与实例化。实例化产出带模板来源元数据的规则定义，
//! 是否入库由调用方（引擎门面）决定。

use super::compiler::TemplateCompiler;
use super::models::RuleTemplate;
use crate::error::{Result, RuleError};
use crate::models::RuleDefinition;
use crate::store::TemplateRepository;
use chrono::Utc;
use rules_shared::events::{EngineEvent, EngineEventType, EventBus};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{info, instrument};

/// 规则模板服务
#[derive(Clone)]
pub struct RuleTemplateService {
    repository: Arc<dyn TemplateRepository>,
    compiler: Arc<TemplateCompiler>,
    events: EventBus,
}

impl RuleTemplateService {
    pub fn new(repository: Arc<dyn TemplateRepository>, events: EventBus) -> Self {
        Self {
            repository,
            compiler: Arc::new(TemplateCompiler::new()),
            events,
        }
    }

    /// 创建模板
    #[instrument(skip(self, template), fields(template_name = %template.name))]
    pub async fn create(&self, template: RuleTemplate) -> Result<RuleTemplate> {
        if template.name.trim().is_empty() {
            return Err(RuleError::InvalidRequest("模板名称不能为空".to_string()));
        }
        if template.condition_templates.is_empty() || template.action_templates.is_empty() {
            return Err(RuleError::InvalidRequest(
                "模板至少需要一个条件模板和一个动作模板".to_string(),
            ));
        }

        let saved = self.repository.save(template).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::TemplateCreated,
            Some(saved.id.clone()),
            json!({"name": saved.name, "category": saved.category}),
        ));
        Ok(saved)
    }

    /// 获取模板，不存在即错误
    pub async fn get(&self, id: &str) -> Result<RuleTemplate> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| RuleError::TemplateNotFound(id.to_string()))
    }

    /// 列出所有模板
    pub async fn list(&self) -> Result<Vec<RuleTemplate>> {
        self.repository.list().await
    }

    /// 删除模板
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(id).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::TemplateDeleted,
            Some(id.to_string()),
            Value::Null,
        ));
        Ok(())
    }

    /// 从模板实例化规则定义
    ///
    /// 编译失败（缺参、未声明占位符、类型不符）整体报错，所有问题
    /// 一次性列出。产出的规则带模板来源元数据：模板 ID/名称、
    /// 使用的参数和生成时间。
    #[instrument(skip(self, params))]
    pub async fn instantiate(
        &self,
        template_id: &str,
        params: &Map<String, Value>,
    ) -> Result<RuleDefinition> {
        let template = self.get(template_id).await?;

        let (conditions, actions) = self.compiler.compile(&template, params)?;

        let mut metadata = Map::new();
        metadata.insert("templateId".to_string(), json!(template.id));
        metadata.insert("templateName".to_string(), json!(template.name));
        metadata.insert("templateParameters".to_string(), Value::Object(params.clone()));
        metadata.insert("generatedAt".to_string(), json!(Utc::now().to_rfc3339()));

        let mut rule = RuleDefinition::new(
            template.name.clone(),
            template.category.clone(),
            format!("template:{}", template.id),
            conditions,
            actions,
        );
        rule.metadata = metadata;

        info!(rule_id = %rule.id, "模板实例化完成");

        self.events.publish(EngineEvent::new(
            EngineEventType::RuleInstantiated,
            Some(rule.id.clone()),
            json!({"templateId": template.id}),
        ));
        Ok(rule)
    }
}
