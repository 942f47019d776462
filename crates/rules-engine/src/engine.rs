//! 规则引擎门面
//!
//! 对外暴露完整的 CRUD/模板/统计/执行接口，内部负责：
//! 规则集解析（按 ID/规则组/分类，三者互斥）、优先级排序、
//! 四种组执行策略的编排，以及缓存/事件/统计的接线。

use crate::actions::{ActionHandler, ActionRegistry};
use crate::context::ExecutionContext;
use crate::definition::{RuleDefinitionService, RuleFilter};
use crate::error::{Result, RuleError};
use crate::evaluator::{BusinessOperator, ConditionEvaluator};
use crate::execution::RuleExecutionService;
use crate::executor::ActionExecutor;
use crate::groups::RuleGroupService;
use crate::models::{ActionType, ExecutionMode, RuleDefinition, RuleGroup};
use crate::operators::LogicalOperator;
use crate::result::{EngineResponse, RuleExecutionResult};
use crate::stats::{EngineMetrics, RuleStats, StatsCollector};
use crate::store::{
    GroupRepository, InMemoryGroupRepository, InMemoryRuleRepository, InMemoryTemplateRepository,
    RuleRepository, TemplateRepository,
};
use crate::template::{RuleTemplate, RuleTemplateService};
use crate::validation::{RuleValidator, ValidationReport};
use rules_shared::cache::TtlCache;
use rules_shared::config::AppConfig;
use rules_shared::events::{EngineEvent, EngineEventType, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 规则集执行请求
///
/// rule_ids / group_ids / categories 最多指定一个；
/// 全部为空表示"所有已启用规则"。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(default)]
    pub rule_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// 覆盖执行模式，缺省为 All
    #[serde(default)]
    pub execution_mode: Option<ExecutionMode>,
}

/// 规则引擎
#[derive(Clone)]
pub struct RulesEngine {
    definitions: RuleDefinitionService,
    groups: RuleGroupService,
    templates: RuleTemplateService,
    execution: RuleExecutionService,
    registry: ActionRegistry,
    stats: StatsCollector,
    cache: TtlCache,
    events: EventBus,
}

/// 引擎构建器
///
/// 缺省装配内存仓储和内置动作处理器；生产部署通过 *_repository
/// 方法替换为持久化实现，通过 action_registry 注入外部动作后端。
pub struct EngineBuilder {
    config: AppConfig,
    rule_repository: Option<Arc<dyn RuleRepository>>,
    group_repository: Option<Arc<dyn GroupRepository>>,
    template_repository: Option<Arc<dyn TemplateRepository>>,
    registry: Option<ActionRegistry>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            rule_repository: None,
            group_repository: None,
            template_repository: None,
            registry: None,
        }
    }

    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rule_repository(mut self, repository: Arc<dyn RuleRepository>) -> Self {
        self.rule_repository = Some(repository);
        self
    }

    pub fn group_repository(mut self, repository: Arc<dyn GroupRepository>) -> Self {
        self.group_repository = Some(repository);
        self
    }

    pub fn template_repository(mut self, repository: Arc<dyn TemplateRepository>) -> Self {
        self.template_repository = Some(repository);
        self
    }

    pub fn action_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> RulesEngine {
        let config = self.config;
        let rule_repository = self
            .rule_repository
            .unwrap_or_else(|| Arc::new(InMemoryRuleRepository::new()));
        let group_repository = self
            .group_repository
            .unwrap_or_else(|| Arc::new(InMemoryGroupRepository::new()));
        let template_repository = self
            .template_repository
            .unwrap_or_else(|| Arc::new(InMemoryTemplateRepository::new()));
        let registry = self.registry.unwrap_or_else(ActionRegistry::with_builtins);

        let events = EventBus::new();
        let evaluator = ConditionEvaluator::new();
        let executor = ActionExecutor::new(
            registry.clone(),
            evaluator.clone(),
            Duration::from_millis(config.engine.default_action_timeout_ms),
        );
        let validator = RuleValidator::new(
            config.engine.max_name_length,
            config.engine.max_conditions_warning,
        );

        RulesEngine {
            definitions: RuleDefinitionService::new(
                rule_repository,
                validator,
                events.clone(),
            ),
            groups: RuleGroupService::new(group_repository, events.clone()),
            templates: RuleTemplateService::new(template_repository, events.clone()),
            execution: RuleExecutionService::new(evaluator, executor),
            registry,
            stats: StatsCollector::new(),
            cache: TtlCache::new(Duration::from_secs(config.cache.default_ttl_seconds)),
            events,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesEngine {
    /// 内存仓储 + 内置动作处理器的缺省装配
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// 事件总线（供宿主注册订阅者）
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 注册业务操作符（应在评估开始前完成）
    pub fn register_operator(&self, operator: Arc<dyn BusinessOperator>) {
        self.execution.evaluator().register_operator(operator);
    }

    /// 注册动作处理器（应在评估开始前完成）
    pub fn register_action(&self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
        self.registry.register(action_type, handler);
    }

    // -----------------------------------------------------------------------
    // 规则定义
    // -----------------------------------------------------------------------

    pub async fn create_rule(&self, rule: RuleDefinition) -> Result<RuleDefinition> {
        self.definitions.create(rule).await
    }

    pub async fn update_rule(&self, rule: RuleDefinition) -> Result<RuleDefinition> {
        let updated = self.definitions.update(rule).await?;
        self.cache.delete(&rule_cache_key(&updated.id));
        Ok(updated)
    }

    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        self.definitions.delete(id).await?;
        self.cache.delete(&rule_cache_key(id));
        Ok(())
    }

    /// 获取规则（热点查询走 TTL 缓存）
    pub async fn get_rule(&self, id: &str) -> Result<RuleDefinition> {
        let key = rule_cache_key(id);
        if let Ok(Some(cached)) = self.cache.get::<RuleDefinition>(&key) {
            debug!(rule_id = id, "规则缓存命中");
            return Ok(cached);
        }

        let rule = self.definitions.get(id).await?;
        let _ = self.cache.set(&key, &rule);
        Ok(rule)
    }

    pub async fn get_rules(&self, filter: &RuleFilter) -> Result<Vec<RuleDefinition>> {
        self.definitions.get_rules(filter).await
    }

    pub async fn search_rules(&self, text: &str) -> Result<Vec<RuleDefinition>> {
        self.definitions.search(text).await
    }

    pub async fn enable_rule(&self, id: &str) -> Result<RuleDefinition> {
        let rule = self.definitions.enable(id).await?;
        self.cache.delete(&rule_cache_key(id));
        Ok(rule)
    }

    pub async fn disable_rule(&self, id: &str) -> Result<RuleDefinition> {
        let rule = self.definitions.disable(id).await?;
        self.cache.delete(&rule_cache_key(id));
        Ok(rule)
    }

    pub async fn duplicate_rule(&self, id: &str, new_name: &str) -> Result<RuleDefinition> {
        self.definitions.duplicate(id, new_name).await
    }

    pub fn validate_rule(&self, rule: &RuleDefinition) -> ValidationReport {
        self.definitions.validate(rule)
    }

    pub async fn export_rules(&self, ids: &[String]) -> Result<String> {
        self.definitions.export(ids).await
    }

    pub async fn import_rules(&self, document: &str) -> Result<Vec<RuleDefinition>> {
        self.definitions.import(document).await
    }

    // -----------------------------------------------------------------------
    // 规则组
    // -----------------------------------------------------------------------

    pub async fn create_rule_group(&self, group: RuleGroup) -> Result<RuleGroup> {
        self.groups.create(group).await
    }

    pub async fn update_rule_group(&self, group: RuleGroup) -> Result<RuleGroup> {
        let updated = self.groups.update(group).await?;
        self.cache.delete(&group_cache_key(&updated.id));
        Ok(updated)
    }

    pub async fn delete_rule_group(&self, id: &str) -> Result<()> {
        self.groups.delete(id).await?;
        self.cache.delete(&group_cache_key(id));
        Ok(())
    }

    pub async fn get_rule_group(&self, id: &str) -> Result<RuleGroup> {
        let key = group_cache_key(id);
        if let Ok(Some(cached)) = self.cache.get::<RuleGroup>(&key) {
            return Ok(cached);
        }

        let group = self.groups.get(id).await?;
        let _ = self.cache.set(&key, &group);
        Ok(group)
    }

    pub async fn add_rule_to_group(&self, group_id: &str, rule_id: &str) -> Result<RuleGroup> {
        let group = self.groups.add_rule(group_id, rule_id).await?;
        self.cache.delete(&group_cache_key(group_id));
        Ok(group)
    }

    pub async fn remove_rule_from_group(&self, group_id: &str, rule_id: &str) -> Result<RuleGroup> {
        let group = self.groups.remove_rule(group_id, rule_id).await?;
        self.cache.delete(&group_cache_key(group_id));
        Ok(group)
    }

    // -----------------------------------------------------------------------
    // 模板
    // -----------------------------------------------------------------------

    pub async fn create_rule_template(&self, template: RuleTemplate) -> Result<RuleTemplate> {
        self.templates.create(template).await
    }

    pub async fn get_rule_template(&self, id: &str) -> Result<RuleTemplate> {
        self.templates.get(id).await
    }

    pub async fn delete_rule_template(&self, id: &str) -> Result<()> {
        self.templates.delete(id).await
    }

    /// 从模板实例化规则并入库
    pub async fn create_rule_from_template(
        &self,
        template_id: &str,
        params: &Map<String, Value>,
    ) -> Result<RuleDefinition> {
        let rule = self.templates.instantiate(template_id, params).await?;
        self.definitions.create(rule).await
    }

    // -----------------------------------------------------------------------
    // 执行
    // -----------------------------------------------------------------------

    /// 按 ID 执行单条规则
    ///
    /// 规则不存在为请求级错误；已禁用的规则返回 skipped 结果。
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn execute_rule(&self, rule_id: &str, ctx: &ExecutionContext) -> Result<EngineResponse> {
        let rule = self.get_rule(rule_id).await?;

        let result = self.execution.execute_rule(&rule, ctx).await;
        self.record(&result);

        Ok(EngineResponse::from_results(vec![result]))
    }

    /// 按规则组执行
    ///
    /// 执行模式取组上配置的 execution_mode；
    /// stop_on_first_match 为 true 时 All 模式升级为 FirstMatch。
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn execute_rule_group(
        &self,
        group_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<EngineResponse> {
        let group = self.get_rule_group(group_id).await?;
        let rules = self.resolve_group_rules(&group).await?;

        let mode = match (group.execution_mode, group.stop_on_first_match) {
            (ExecutionMode::All, Some(true)) => ExecutionMode::FirstMatch,
            (mode, _) => mode,
        };

        Ok(self.execute_with_mode(rules, ctx, mode).await)
    }

    /// 按请求执行规则集
    #[instrument(skip(self, request, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn execute_rules(
        &self,
        request: &ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<EngineResponse> {
        let rules = self.resolve_rules(request).await?;
        let mode = request.execution_mode.unwrap_or_default();

        info!(
            resolved = rules.len(),
            mode = ?mode,
            "规则集解析完成"
        );

        Ok(self.execute_with_mode(rules, ctx, mode).await)
    }

    /// 试运行规则定义（不要求已入库）
    ///
    /// 上下文带 dry_run 标记传递给动作处理器，响应元数据标记 dryRun。
    /// 试运行不计入执行统计。
    pub async fn test_rule(&self, rule: &RuleDefinition, ctx: &ExecutionContext) -> EngineResponse {
        self.execution.dry_run(rule, ctx).await
    }

    // -----------------------------------------------------------------------
    // 统计
    // -----------------------------------------------------------------------

    /// 单规则执行统计；从未执行过的已存规则返回零值统计
    pub async fn get_rule_statistics(&self, rule_id: &str) -> Result<RuleStats> {
        if let Some(stats) = self.stats.rule_stats(rule_id) {
            return Ok(stats);
        }

        // 确认规则存在后返回零值，未知 ID 仍是 NotFound
        let rule = self.get_rule(rule_id).await?;
        Ok(RuleStats {
            rule_id: rule.id,
            ..Default::default()
        })
    }

    pub fn get_engine_metrics(&self) -> EngineMetrics {
        self.stats.engine_metrics()
    }

    // -----------------------------------------------------------------------
    // 解析与策略
    // -----------------------------------------------------------------------

    /// 解析请求指向的规则集
    ///
    /// 选择器互斥；全部缺省时返回所有已启用规则。被引用的已禁用规则
    /// 静默剔除；显式引用不存在的规则/规则组是请求级错误。
    async fn resolve_rules(&self, request: &ExecutionRequest) -> Result<Vec<RuleDefinition>> {
        let selectors = [
            !request.rule_ids.is_empty(),
            !request.group_ids.is_empty(),
            !request.categories.is_empty(),
        ]
        .iter()
        .filter(|s| **s)
        .count();

        if selectors > 1 {
            return Err(RuleError::InvalidRequest(
                "rule_ids / group_ids / categories 只能指定一个".to_string(),
            ));
        }

        let mut rules = if !request.rule_ids.is_empty() {
            let mut rules = Vec::with_capacity(request.rule_ids.len());
            for id in &request.rule_ids {
                rules.push(self.get_rule(id).await?);
            }
            rules
        } else if !request.group_ids.is_empty() {
            let mut rules = Vec::new();
            for group_id in &request.group_ids {
                let group = self.get_rule_group(group_id).await?;
                rules.extend(self.resolve_group_rules(&group).await?);
            }
            rules
        } else if !request.categories.is_empty() {
            let all = self.definitions.get_rules(&RuleFilter::default()).await?;
            all.into_iter()
                .filter(|r| request.categories.contains(&r.category))
                .collect()
        } else {
            self.definitions
                .get_rules(&RuleFilter {
                    enabled: Some(true),
                    ..Default::default()
                })
                .await?
        };

        // 解析阶段统一剔除已禁用规则
        rules.retain(|r| r.enabled);
        sort_by_precedence(&mut rules);
        Ok(rules)
    }

    /// 解析组内成员规则
    ///
    /// 保持组内定义顺序加载；悬空的成员 ID（规则已被删除）静默剔除。
    async fn resolve_group_rules(&self, group: &RuleGroup) -> Result<Vec<RuleDefinition>> {
        let mut rules = Vec::with_capacity(group.rule_ids.len());
        for rule_id in &group.rule_ids {
            match self.get_rule(rule_id).await {
                Ok(rule) if rule.enabled => rules.push(rule),
                Ok(_) | Err(RuleError::RuleNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        sort_by_precedence(&mut rules);
        Ok(rules)
    }

    /// 按执行模式编排规则集
    async fn execute_with_mode(
        &self,
        rules: Vec<RuleDefinition>,
        ctx: &ExecutionContext,
        mode: ExecutionMode,
    ) -> EngineResponse {
        let response = match mode {
            // aggregate 与 all 行为一致，差异只在调用方意图
            ExecutionMode::All | ExecutionMode::Aggregate => {
                let response = self.execution.execute_rules(&rules, ctx).await;
                for result in &response.results {
                    self.record(result);
                }
                response
            }
            ExecutionMode::FirstMatch => self.execute_first_match(&rules, ctx).await,
            ExecutionMode::BestMatch => self.execute_best_match(&rules, ctx).await,
        };

        response.with_metadata("executionMode", json!(mode))
    }

    /// first_match：按优先级逐条执行，首条匹配后立即停止
    ///
    /// 匹配规则之后的规则不再评估；无匹配时返回空响应。
    async fn execute_first_match(
        &self,
        rules: &[RuleDefinition],
        ctx: &ExecutionContext,
    ) -> EngineResponse {
        for rule in rules {
            let result = self.execution.execute_rule(rule, ctx).await;
            self.record(&result);

            if result.matched {
                debug!(rule_id = %rule.id, "first_match 命中，停止评估");
                return EngineResponse::from_results(vec![result]);
            }
        }

        EngineResponse::from_results(Vec::new())
    }

    /// best_match：评估所有规则的条件，仅最高优先级的匹配规则执行动作
    ///
    /// 列表已按 (priority, precedence) 排序，"最佳"即优先级最高的匹配，
    /// 不存在额外的打分维度。
    async fn execute_best_match(
        &self,
        rules: &[RuleDefinition],
        ctx: &ExecutionContext,
    ) -> EngineResponse {
        let evaluator = self.execution.evaluator();
        let mut best: Option<&RuleDefinition> = None;

        // 所有规则的条件都检查一遍，再回头执行第一个匹配者
        for rule in rules {
            let (matched, _) =
                evaluator.evaluate_conditions(&rule.conditions, ctx, LogicalOperator::And);
            if matched && best.is_none() {
                best = Some(rule);
            }
        }

        match best {
            Some(rule) => {
                let result = self.execution.execute_rule(rule, ctx).await;
                self.record(&result);
                EngineResponse::from_results(vec![result])
            }
            None => EngineResponse::from_results(Vec::new()),
        }
    }

    fn record(&self, result: &RuleExecutionResult) {
        self.stats.record(result);

        self.events.publish(EngineEvent::new(
            if result.error.is_some() {
                EngineEventType::RuleExecutionFailed
            } else {
                EngineEventType::RuleExecuted
            },
            Some(result.rule_id.clone()),
            json!({"matched": result.matched, "durationMs": result.duration_ms}),
        ));
    }
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn rule_cache_key(id: &str) -> String {
    format!("rule:{}", id)
}

fn group_cache_key(id: &str) -> String {
    format!("group:{}", id)
}

/// 按 (priority, 双方都设置时的 precedence) 升序排序，稳定
fn sort_by_precedence(rules: &mut [RuleDefinition]) {
    rules.sort_by(|a, b| {
        a.priority.cmp(&b.priority).then_with(|| match (a.precedence, b.precedence) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => std::cmp::Ordering::Equal,
        })
    });
}
