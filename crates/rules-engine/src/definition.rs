//! 规则定义服务
//!
//! 规则定义的 CRUD、启用/禁用、复制、搜索和 JSON 导入/导出。
//! 所有变更先通过结构化校验，校验失败时存储保持不变；
//! 变更成功后发布对应的生命周期事件。

use crate::error::{Result, RuleError};
use crate::models::RuleDefinition;
use crate::store::RuleRepository;
use crate::validation::{RuleValidator, ValidationReport};
use chrono::Utc;
use rules_shared::events::{EngineEvent, EngineEventType, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument};

/// 导出文档的格式版本
const EXPORT_FORMAT_VERSION: &str = "1.0.0";

/// 规则查询过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFilter {
    pub category: Option<String>,
    pub enabled: Option<bool>,
    pub tag: Option<String>,
}

/// 规则定义服务
#[derive(Clone)]
pub struct RuleDefinitionService {
    repository: Arc<dyn RuleRepository>,
    validator: RuleValidator,
    events: EventBus,
}

impl RuleDefinitionService {
    pub fn new(
        repository: Arc<dyn RuleRepository>,
        validator: RuleValidator,
        events: EventBus,
    ) -> Self {
        Self {
            repository,
            validator,
            events,
        }
    }

    /// 校验规则定义（供调用方预检）
    pub fn validate(&self, rule: &RuleDefinition) -> ValidationReport {
        self.validator.validate(rule)
    }

    /// 创建规则
    #[instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create(&self, mut rule: RuleDefinition) -> Result<RuleDefinition> {
        self.check_valid(&rule)?;

        rule.created_at = Utc::now();
        rule.updated_at = rule.created_at;
        let saved = self.repository.save(rule).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::RuleCreated,
            Some(saved.id.clone()),
            json!({"name": saved.name, "category": saved.category}),
        ));
        Ok(saved)
    }

    /// 整体更新规则（不支持部分更新）
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update(&self, mut rule: RuleDefinition) -> Result<RuleDefinition> {
        self.check_valid(&rule)?;

        rule.updated_at = Utc::now();
        let updated = self.repository.update(rule).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::RuleUpdated,
            Some(updated.id.clone()),
            json!({"name": updated.name}),
        ));
        Ok(updated)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repository.delete(id).await?;

        self.events.publish(EngineEvent::new(
            EngineEventType::RuleDeleted,
            Some(id.to_string()),
            Value::Null,
        ));
        Ok(())
    }

    /// 获取规则，不存在即错误
    pub async fn get(&self, id: &str) -> Result<RuleDefinition> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| RuleError::RuleNotFound(id.to_string()))
    }

    /// 按过滤器查询规则
    pub async fn get_rules(&self, filter: &RuleFilter) -> Result<Vec<RuleDefinition>> {
        let rules = self.repository.list().await?;
        Ok(rules
            .into_iter()
            .filter(|r| {
                filter
                    .category
                    .as_ref()
                    .is_none_or(|c| &r.category == c)
                    && filter.enabled.is_none_or(|e| r.enabled == e)
                    && filter.tag.as_ref().is_none_or(|t| r.tags.contains(t))
            })
            .collect())
    }

    /// 自由文本搜索
    ///
    /// 大小写不敏感，匹配名称、分类、标签及元数据中的描述。
    pub async fn search(&self, text: &str) -> Result<Vec<RuleDefinition>> {
        let needle = text.to_lowercase();
        let rules = self.repository.list().await?;

        Ok(rules
            .into_iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle)
                    || r.category.to_lowercase().contains(&needle)
                    || r.tags.iter().any(|t| t.to_lowercase().contains(&needle))
                    || r.metadata
                        .get("description")
                        .and_then(|v| v.as_str())
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .collect())
    }

    /// 启用规则
    pub async fn enable(&self, id: &str) -> Result<RuleDefinition> {
        self.set_enabled(id, true, EngineEventType::RuleEnabled).await
    }

    /// 禁用规则
    pub async fn disable(&self, id: &str) -> Result<RuleDefinition> {
        self.set_enabled(id, false, EngineEventType::RuleDisabled).await
    }

    async fn set_enabled(
        &self,
        id: &str,
        enabled: bool,
        event_type: EngineEventType,
    ) -> Result<RuleDefinition> {
        let mut rule = self.get(id).await?;
        rule.enabled = enabled;
        rule.updated_at = Utc::now();
        let updated = self.repository.update(rule).await?;

        self.events.publish(EngineEvent::new(
            event_type,
            Some(id.to_string()),
            json!({"enabled": enabled}),
        ));
        Ok(updated)
    }

    /// 复制规则
    ///
    /// 新规则获得新 ID、指定名称和补丁号加一的版本；
    /// 版本号无法解析时回退为 1.0.1。
    #[instrument(skip(self))]
    pub async fn duplicate(&self, id: &str, new_name: &str) -> Result<RuleDefinition> {
        let source = self.get(id).await?;

        let mut copy = source.clone();
        copy.id = crate::models::new_id();
        copy.name = new_name.to_string();
        copy.version = bump_patch_version(&source.version);
        copy.created_at = Utc::now();
        copy.updated_at = copy.created_at;

        let saved = self.repository.save(copy).await?;
        info!(source_id = id, new_id = %saved.id, "规则已复制");

        self.events.publish(EngineEvent::new(
            EngineEventType::RuleCreated,
            Some(saved.id.clone()),
            json!({"duplicatedFrom": id}),
        ));
        Ok(saved)
    }

    /// 导出规则为 JSON 文档
    ///
    /// ids 为空时导出全部规则；引用了不存在的规则时整体失败。
    pub async fn export(&self, ids: &[String]) -> Result<String> {
        let rules = if ids.is_empty() {
            self.repository.list().await?
        } else {
            let mut rules = Vec::with_capacity(ids.len());
            for id in ids {
                rules.push(self.get(id).await?);
            }
            rules
        };

        let document = json!({
            "exportedAt": Utc::now().to_rfc3339(),
            "version": EXPORT_FORMAT_VERSION,
            "rules": rules,
        });

        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// 从 JSON 文档导入规则
    ///
    /// 每条记录剥离 id/createdAt/updatedAt 后获得全新身份，避免与
    /// 已有规则冲突。全部记录先校验后入库：任何一条无效则整体失败，
    /// 存储保持不变。
    #[instrument(skip(self, document))]
    pub async fn import(&self, document: &str) -> Result<Vec<RuleDefinition>> {
        let parsed: Value = serde_json::from_str(document)
            .map_err(|e| RuleError::ImportFailed(format!("JSON 解析失败: {}", e)))?;

        let raw_rules = parsed
            .get("rules")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RuleError::ImportFailed("缺少 rules 数组".to_string()))?;

        // 先整体解析和校验，再入库
        let mut rules = Vec::with_capacity(raw_rules.len());
        for (i, raw) in raw_rules.iter().enumerate() {
            let mut record = raw.clone();
            if let Some(obj) = record.as_object_mut() {
                // 导入的规则获得全新身份
                obj.remove("id");
                obj.remove("createdAt");
                obj.remove("updatedAt");
            }

            let rule: RuleDefinition = serde_json::from_value(record)
                .map_err(|e| RuleError::ImportFailed(format!("第 {} 条规则无效: {}", i + 1, e)))?;

            let report = self.validator.validate(&rule);
            if !report.is_valid() {
                return Err(RuleError::ImportFailed(format!(
                    "第 {} 条规则校验失败: {} 个问题",
                    i + 1,
                    report.errors().len()
                )));
            }
            rules.push(rule);
        }

        let mut imported = Vec::with_capacity(rules.len());
        for rule in rules {
            imported.push(self.create(rule).await?);
        }

        info!(count = imported.len(), "规则导入完成");
        Ok(imported)
    }

    fn check_valid(&self, rule: &RuleDefinition) -> Result<()> {
        let report = self.validator.validate(rule);
        if !report.is_valid() {
            return Err(RuleError::Validation(report.into_errors()));
        }
        Ok(())
    }
}

/// 补丁号加一；版本号格式非法时回退为 1.0.1
fn bump_patch_version(version: &str) -> String {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() == 3
        && let (Ok(major), Ok(minor), Ok(patch)) = (
            parts[0].parse::<u64>(),
            parts[1].parse::<u64>(),
            parts[2].parse::<u64>(),
        )
    {
        return format!("{}.{}.{}", major, minor, patch + 1);
    }
    "1.0.1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionType, RuleAction, RuleCondition};
    use crate::operators::Operator;
    use crate::store::InMemoryRuleRepository;
    use serde_json::Map;

    fn service() -> RuleDefinitionService {
        RuleDefinitionService::new(
            Arc::new(InMemoryRuleRepository::new()),
            RuleValidator::default(),
            EventBus::new(),
        )
    }

    fn sample_rule(name: &str, category: &str) -> RuleDefinition {
        RuleDefinition::new(
            name,
            category,
            "tester",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(100))],
            vec![RuleAction::new(ActionType::Approve, Map::new(), 1)],
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let svc = service();
        let created = svc.create(sample_rule("r1", "orders")).await.unwrap();

        let loaded = svc.get(&created.id).await.unwrap();
        assert_eq!(loaded.name, "r1");
    }

    #[tokio::test]
    async fn test_create_invalid_rule_rejected() {
        let svc = service();
        let mut rule = sample_rule("r1", "orders");
        rule.actions.clear();

        let err = svc.create(rule).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(!err.validation_issues().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_by_category_and_enabled() {
        let svc = service();
        svc.create(sample_rule("r1", "orders")).await.unwrap();
        svc.create(sample_rule("r2", "customers")).await.unwrap();
        let disabled = svc.create(sample_rule("r3", "orders").disabled()).await.unwrap();

        let orders = svc
            .get_rules(&RuleFilter {
                category: Some("orders".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);

        let enabled_orders = svc
            .get_rules(&RuleFilter {
                category: Some("orders".into()),
                enabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(enabled_orders.len(), 1);
        assert_ne!(enabled_orders[0].id, disabled.id);
    }

    #[tokio::test]
    async fn test_search_case_insensitive() {
        let svc = service();
        svc.create(sample_rule("Premium Discount", "discounts"))
            .await
            .unwrap();
        svc.create(sample_rule("fraud_check", "risk")).await.unwrap();

        let hits = svc.search("PREMIUM").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Premium Discount");

        let hits = svc.search("risk").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_enable_disable() {
        let svc = service();
        let rule = svc.create(sample_rule("r1", "orders")).await.unwrap();

        let disabled = svc.disable(&rule.id).await.unwrap();
        assert!(!disabled.enabled);

        let enabled = svc.enable(&rule.id).await.unwrap();
        assert!(enabled.enabled);
    }

    #[tokio::test]
    async fn test_duplicate_bumps_patch_version() {
        let svc = service();
        let mut rule = sample_rule("r1", "orders");
        rule.version = "2.3.4".into();
        let source = svc.create(rule).await.unwrap();

        let copy = svc.duplicate(&source.id, "r1_copy").await.unwrap();

        assert_ne!(copy.id, source.id);
        assert_eq!(copy.name, "r1_copy");
        assert_eq!(copy.version, "2.3.5");
        assert_eq!(copy.conditions.len(), source.conditions.len());
    }

    #[tokio::test]
    async fn test_duplicate_malformed_version_falls_back() {
        let svc = service();
        let mut rule = sample_rule("r1", "orders");
        rule.version = "weird-version".into();
        let source = svc.create(rule).await.unwrap();

        let copy = svc.duplicate(&source.id, "copy").await.unwrap();
        assert_eq!(copy.version, "1.0.1");
    }

    #[tokio::test]
    async fn test_export_import_roundtrip_assigns_new_ids() {
        let svc = service();
        let r1 = svc.create(sample_rule("r1", "orders")).await.unwrap();
        let r2 = svc.create(sample_rule("r2", "orders")).await.unwrap();

        let document = svc.export(&[r1.id.clone(), r2.id.clone()]).await.unwrap();

        // 导出文档为带信封的 JSON
        let parsed: Value = serde_json::from_str(&document).unwrap();
        assert_eq!(parsed["version"], json!("1.0.0"));
        assert!(parsed["exportedAt"].is_string());
        assert_eq!(parsed["rules"].as_array().unwrap().len(), 2);

        let imported = svc.import(&document).await.unwrap();

        assert_eq!(imported.len(), 2);
        for rule in &imported {
            // 导入的规则获得新 ID
            assert_ne!(rule.id, r1.id);
            assert_ne!(rule.id, r2.id);
        }
        let names: Vec<&str> = imported.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"r1"));
        assert!(names.contains(&"r2"));
    }

    #[tokio::test]
    async fn test_import_invalid_document_fails() {
        let svc = service();
        assert!(svc.import("not json").await.is_err());
        assert!(svc.import(r#"{"version": "1.0.0"}"#).await.is_err());
    }

    #[test]
    fn test_bump_patch_version() {
        assert_eq!(bump_patch_version("1.0.0"), "1.0.1");
        assert_eq!(bump_patch_version("2.10.99"), "2.10.100");
        assert_eq!(bump_patch_version("1.0"), "1.0.1");
        assert_eq!(bump_patch_version("abc"), "1.0.1");
    }
}
