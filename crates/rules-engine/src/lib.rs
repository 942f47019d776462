//! 业务规则引擎
//!
//! 给定命名、带版本的规则（一组条件加一组有序动作），判定运行时实体
//! 是否满足规则，满足时执行规则的副作用动作，返回结构化、可检视的
//! 执行报告。支持：
//! - 点号/索引字段路径解析与操作符分发（含可注册的业务操作符）
//! - 动作守卫、超时控制与部分失败隔离
//! - 四种规则组执行策略（all / first_match / best_match / aggregate）
//! - 参数化规则模板实例化
//! - 规则定义的校验、复制、搜索与 JSON 导入/导出

pub mod actions;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod execution;
pub mod executor;
pub mod groups;
pub mod models;
pub mod operators;
pub mod result;
pub mod stats;
pub mod store;
pub mod template;
pub mod validation;

pub use actions::{ActionHandler, ActionRegistry};
pub use context::ExecutionContext;
pub use definition::{RuleDefinitionService, RuleFilter};
pub use engine::{EngineBuilder, ExecutionRequest, RulesEngine};
pub use error::{Result, RuleError};
pub use evaluator::{BusinessOperator, ConditionEvaluator};
pub use execution::RuleExecutionService;
pub use executor::ActionExecutor;
pub use groups::RuleGroupService;
pub use models::{
    ActionType, DataType, ExecutionMode, RuleAction, RuleCondition, RuleDefinition, RuleGroup,
};
pub use operators::{LogicalOperator, Operator};
pub use result::{
    ActionResult, ConditionTrace, EngineResponse, ExecutionSummary, RuleExecutionResult,
};
pub use stats::{EngineMetrics, RuleStats, StatsCollector};
pub use store::{
    GroupRepository, InMemoryGroupRepository, InMemoryRuleRepository, InMemoryTemplateRepository,
    RuleRepository, TemplateRepository,
};
pub use template::{
    ActionTemplate, ConditionTemplate, RuleTemplate, RuleTemplateService, TemplateCompiler,
    TemplateError, TemplateParameter, TemplateParameterType,
};
pub use validation::{RuleValidator, Severity, ValidationIssue, ValidationReport};
