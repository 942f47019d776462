//! 模板实例化集成测试
//!
//! 测试模板创建、参数代入、入库与实例化规则的端到端执行。

use rules_engine::{
    ActionTemplate, ActionType, ConditionTemplate, ExecutionContext, Operator, RuleTemplate,
    RulesEngine, TemplateParameter, TemplateParameterType,
};
use serde_json::{Map, Value, json};

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn minimum_order_template() -> RuleTemplate {
    RuleTemplate::new(
        "minimum_order_approval",
        "orders",
        vec![ConditionTemplate {
            field: "amount".into(),
            operator: Operator::GreaterThanOrEqual,
            value: json!("{{minimumOrderAmount}}"),
            negate: false,
            parameters: Map::new(),
        }],
        vec![ActionTemplate {
            action_type: ActionType::Approve,
            parameters: params(&[("reason", json!("amount over {{minimumOrderAmount}}"))]),
            order: 1,
        }],
        vec![TemplateParameter::required(
            "minimumOrderAmount",
            TemplateParameterType::Number,
        )],
    )
}

#[tokio::test]
async fn test_substitution_preserves_parameter_type() {
    let engine = RulesEngine::new();
    let template = engine
        .create_rule_template(minimum_order_template())
        .await
        .unwrap();

    let rule = engine
        .create_rule_from_template(&template.id, &params(&[("minimumOrderAmount", json!(100))]))
        .await
        .unwrap();

    // 纯占位符代入为数值 100，而非字符串 "100"
    assert_eq!(rule.conditions[0].value, json!(100));
    assert!(rule.conditions[0].value.is_number());
    // 混合字符串做文本插值
    assert_eq!(
        rule.actions[0].parameters["reason"],
        json!("amount over 100")
    );
}

#[tokio::test]
async fn test_instantiated_rule_carries_provenance() {
    let engine = RulesEngine::new();
    let template = engine
        .create_rule_template(minimum_order_template())
        .await
        .unwrap();

    let rule = engine
        .create_rule_from_template(&template.id, &params(&[("minimumOrderAmount", json!(250))]))
        .await
        .unwrap();

    assert_eq!(rule.metadata["templateId"], json!(template.id));
    assert_eq!(rule.metadata["templateName"], json!("minimum_order_approval"));
    assert_eq!(
        rule.metadata["templateParameters"]["minimumOrderAmount"],
        json!(250)
    );
    assert!(rule.metadata["generatedAt"].is_string());
}

#[tokio::test]
async fn test_instantiated_rule_executes() {
    let engine = RulesEngine::new();
    let template = engine
        .create_rule_template(minimum_order_template())
        .await
        .unwrap();

    let rule = engine
        .create_rule_from_template(&template.id, &params(&[("minimumOrderAmount", json!(500))]))
        .await
        .unwrap();

    let ctx = ExecutionContext::new(json!({"amount": 800}), "order", "order-001");
    let response = engine.execute_rule(&rule.id, &ctx).await.unwrap();
    assert!(response.results[0].matched);

    let ctx = ExecutionContext::new(json!({"amount": 200}), "order", "order-002");
    let response = engine.execute_rule(&rule.id, &ctx).await.unwrap();
    assert!(!response.results[0].matched);
}

#[tokio::test]
async fn test_missing_required_parameter_fails_with_names() {
    let engine = RulesEngine::new();
    let template = engine
        .create_rule_template(minimum_order_template())
        .await
        .unwrap();

    let err = engine
        .create_rule_from_template(&template.id, &Map::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("minimumOrderAmount"));
}

#[tokio::test]
async fn test_two_instantiations_are_independent() {
    let engine = RulesEngine::new();
    let template = engine
        .create_rule_template(minimum_order_template())
        .await
        .unwrap();

    let first = engine
        .create_rule_from_template(&template.id, &params(&[("minimumOrderAmount", json!(100))]))
        .await
        .unwrap();
    let second = engine
        .create_rule_from_template(&template.id, &params(&[("minimumOrderAmount", json!(900))]))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.conditions[0].id, second.conditions[0].id);
    assert_eq!(first.conditions[0].value, json!(100));
    assert_eq!(second.conditions[0].value, json!(900));
}
