//! 规则模板模块
//!
//! 提供参数化规则蓝图：模板中条件/动作的字段和操作符固定，
//! 值持有 `{{param}}` 占位符，实例化时按声明的参数类型代入具体值。
//!
//! # 主要组成
//!
//! - `RuleTemplate` / `TemplateParameter`: 模板与参数声明
//! - `TemplateCompiler`: 两遍式占位符编译器（先整体校验，再代入）
//! - `RuleTemplateService`: 模板 CRUD 与规则实例化

pub mod compiler;
pub mod models;
pub mod service;

pub use compiler::{TemplateCompiler, TemplateError};
pub use models::*;
pub use service::RuleTemplateService;
