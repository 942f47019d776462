//! 规则引擎错误类型
//!
//! 错误分层与引擎的隔离策略对应：
//! - 定义/解析类错误（`Validation`、`NotFound`）在请求边界抛出；
//! - 条件/动作级错误不走 `Err` 通道，而是内联记录在对应的评估追踪
//!   或动作结果中，保证执行类调用总是返回完整的响应对象。

use thiserror::Error;

use crate::validation::ValidationIssue;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则定义校验失败: {} 个问题", .0.len())]
    Validation(Vec<ValidationIssue>),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("规则组未找到: {0}")]
    GroupNotFound(String),

    #[error("模板未找到: {0}")]
    TemplateNotFound(String),

    #[error("执行请求无效: {0}")]
    InvalidRequest(String),

    #[error("模板实例化失败: {0}")]
    Template(#[from] crate::template::TemplateError),

    #[error("导入数据无效: {0}")]
    ImportFailed(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::GroupNotFound(_) => "GROUP_NOT_FOUND",
            Self::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::ImportFailed(_) => "IMPORT_FAILED",
            Self::JsonError(_) => "JSON_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 校验错误的问题明细
    pub fn validation_issues(&self) -> Option<&[ValidationIssue]> {
        match self {
            Self::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}

impl From<Vec<ValidationIssue>> for RuleError {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation(issues)
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(RuleError::RuleNotFound("r1".into()).code(), "RULE_NOT_FOUND");
        assert_eq!(
            RuleError::InvalidRequest("both ids and groups".into()).code(),
            "INVALID_REQUEST"
        );
    }
}
