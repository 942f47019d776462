//! 规则引擎集成测试
//!
//! 覆盖完整的规则创建、解析、执行工作流，以及各组执行策略的
//! 停止/聚合语义。

use rules_engine::{
    ActionType, ExecutionContext, ExecutionMode, ExecutionRequest, Operator, RuleAction,
    RuleCondition, RuleDefinition, RuleGroup, RulesEngine,
};
use serde_json::{Map, Value, json};

/// 创建测试上下文：模拟一笔订单
fn order_context(amount: i64) -> ExecutionContext {
    ExecutionContext::new(
        json!({
            "amount": amount,
            "currency": "CNY",
            "customer": {
                "name": "Alice Wang",
                "email": "alice@example.com",
                "level": "gold"
            },
            "items": [
                {"sku": "TICKET-001", "price": 500, "quantity": 2},
                {"sku": "FOOD-001", "price": 100, "quantity": 1}
            ]
        }),
        "order",
        "order-12345",
    )
    .with_user("user-67890")
}

fn customer_context(customer_type: &str) -> ExecutionContext {
    ExecutionContext::new(
        json!({"customerType": customer_type, "amount": 800}),
        "customer",
        "cust-42",
    )
}

fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn approve_action(order: u32) -> RuleAction {
    RuleAction::new(ActionType::Approve, Map::new(), order)
}

// ==================== 单规则执行 ====================

#[tokio::test]
async fn test_small_order_auto_approved() {
    let engine = RulesEngine::new();

    let rule = engine
        .create_rule(RuleDefinition::new(
            "auto_approve_small_orders",
            "orders",
            "system",
            vec![RuleCondition::new(
                "amount",
                Operator::LessThanOrEqual,
                json!(500),
            )],
            vec![approve_action(1)],
        ))
        .await
        .unwrap();

    // amount=300 <= 500 -> 匹配，approve 动作成功
    let response = engine
        .execute_rule(&rule.id, &order_context(300))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].matched);
    assert!(response.results[0].action_results[0].success);
    assert_eq!(
        response.results[0].action_results[0].output["decision"],
        json!("approved")
    );
}

#[tokio::test]
async fn test_large_order_not_matched_runs_no_actions() {
    let engine = RulesEngine::new();

    let rule = engine
        .create_rule(RuleDefinition::new(
            "auto_approve_small_orders",
            "orders",
            "system",
            vec![RuleCondition::new(
                "amount",
                Operator::LessThanOrEqual,
                json!(500),
            )],
            vec![approve_action(1)],
        ))
        .await
        .unwrap();

    // amount=900 > 500 -> 不匹配，零动作执行
    let response = engine
        .execute_rule(&rule.id, &order_context(900))
        .await
        .unwrap();

    assert!(!response.results[0].matched);
    assert!(response.results[0].action_results.is_empty());
    assert_eq!(response.summary.matched_rules, 0);
}

#[tokio::test]
async fn test_nested_field_and_array_index_conditions() {
    let engine = RulesEngine::new();

    let rule = engine
        .create_rule(RuleDefinition::new(
            "gold_ticket_buyer",
            "orders",
            "system",
            vec![
                RuleCondition::new("customer.level", Operator::Equals, json!("gold")),
                RuleCondition::new("items[0].price", Operator::GreaterThanOrEqual, json!(500)),
            ],
            vec![approve_action(1)],
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule(&rule.id, &order_context(1100))
        .await
        .unwrap();

    assert!(response.results[0].matched);
    assert_eq!(response.results[0].condition_traces.len(), 2);
}

// ==================== 动作顺序与失败隔离 ====================

#[tokio::test]
async fn test_actions_run_in_ascending_order() {
    let engine = RulesEngine::new();

    // 定义顺序 [3, 1, 2]，执行顺序必须是 [1, 2, 3]
    let rule = engine
        .create_rule(RuleDefinition::new(
            "ordered_actions",
            "orders",
            "system",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
            vec![
                RuleAction::new(
                    ActionType::SetField,
                    params(&[("field", json!("step")), ("value", json!("third"))]),
                    3,
                ),
                RuleAction::new(
                    ActionType::LogEvent,
                    params(&[("message", json!("first step"))]),
                    1,
                ),
                RuleAction::new(
                    ActionType::SetField,
                    params(&[("field", json!("step")), ("value", json!("second"))]),
                    2,
                ),
            ],
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule(&rule.id, &order_context(300))
        .await
        .unwrap();

    let types: Vec<ActionType> = response.results[0]
        .action_results
        .iter()
        .map(|a| a.action_type)
        .collect();
    assert_eq!(
        types,
        vec![ActionType::LogEvent, ActionType::SetField, ActionType::SetField]
    );
    assert_eq!(
        response.results[0].action_results[1].output["value"],
        json!("second")
    );
}

#[tokio::test]
async fn test_failing_action_does_not_abort_batch() {
    let engine = RulesEngine::new();

    // 动作 2 指向未注册的动作类型，必定失败；1 和 3 仍然成功
    let rule = engine
        .create_rule(RuleDefinition::new(
            "partial_failure",
            "orders",
            "system",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
            vec![
                RuleAction::new(
                    ActionType::LogEvent,
                    params(&[("message", json!("before"))]),
                    1,
                ),
                RuleAction::new(ActionType::CallApi, Map::new(), 2),
                approve_action(3),
            ],
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule(&rule.id, &order_context(300))
        .await
        .unwrap();

    let results = &response.results[0].action_results;
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(!results[1].error.as_deref().unwrap().is_empty());
    assert!(results[2].success);

    // 规则本身仍然匹配
    assert!(response.results[0].matched);
    assert_eq!(response.summary.actions_failed, 1);
    assert_eq!(response.summary.actions_succeeded, 2);
}

#[tokio::test]
async fn test_missing_action_parameter_fails_named() {
    let engine = RulesEngine::new();

    // set_field 缺少 field 参数
    let rule = engine
        .create_rule(RuleDefinition::new(
            "missing_param",
            "orders",
            "system",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
            vec![RuleAction::new(
                ActionType::SetField,
                params(&[("value", json!("x"))]),
                1,
            )],
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule(&rule.id, &order_context(300))
        .await
        .unwrap();

    let action = &response.results[0].action_results[0];
    assert!(!action.success);
    assert!(action.error.as_deref().unwrap().contains("field"));
    // 规则匹配标志不受动作失败影响
    assert!(response.results[0].matched);
}

#[tokio::test]
async fn test_guarded_action_skipped() {
    let engine = RulesEngine::new();

    let guarded = RuleAction::new(ActionType::SendNotification, Map::new(), 2).with_condition(
        RuleCondition::new("customer.email", Operator::IsNull, json!(null)),
    );

    let rule = engine
        .create_rule(RuleDefinition::new(
            "guarded_notification",
            "orders",
            "system",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
            vec![approve_action(1), guarded],
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule(&rule.id, &order_context(300))
        .await
        .unwrap();

    let results = &response.results[0].action_results;
    assert!(results[0].success && !results[0].skipped);
    // 守卫不满足：记为跳过而非失败（即便动作类型未注册也不会执行）
    assert!(results[1].success && results[1].skipped);
}

// ==================== 组执行策略 ====================

async fn seed_priority_rules(engine: &RulesEngine) -> (String, String) {
    let premium = engine
        .create_rule(
            RuleDefinition::new(
                "premium_discount",
                "discounts",
                "system",
                vec![RuleCondition::new(
                    "customerType",
                    Operator::Equals,
                    json!("premium"),
                )],
                vec![approve_action(1)],
            )
            .with_priority(1),
        )
        .await
        .unwrap();

    let regular = engine
        .create_rule(
            RuleDefinition::new(
                "regular_discount",
                "discounts",
                "system",
                vec![RuleCondition::new(
                    "customerType",
                    Operator::Equals,
                    json!("regular"),
                )],
                vec![approve_action(1)],
            )
            .with_priority(5),
        )
        .await
        .unwrap();

    (premium.id, regular.id)
}

#[tokio::test]
async fn test_first_match_stops_after_first_matching_rule() {
    let engine = RulesEngine::new();

    // 两条规则都匹配同一上下文，优先级 1 与 2
    let high = engine
        .create_rule(
            RuleDefinition::new(
                "high",
                "discounts",
                "system",
                vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
                vec![approve_action(1)],
            )
            .with_priority(1),
        )
        .await
        .unwrap();
    let low = engine
        .create_rule(
            RuleDefinition::new(
                "low",
                "discounts",
                "system",
                vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
                vec![approve_action(1)],
            )
            .with_priority(2),
        )
        .await
        .unwrap();

    let group = engine
        .create_rule_group(RuleGroup::new(
            "first_match_group",
            vec![low.id.clone(), high.id.clone()],
            ExecutionMode::FirstMatch,
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule_group(&group.id, &order_context(300))
        .await
        .unwrap();

    // 只有高优先级规则出现在结果中，低优先级规则的动作从未执行
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].rule_id, high.id);
    assert!(response.results[0].matched);

    let low_stats = engine.get_rule_statistics(&low.id).await.unwrap();
    assert_eq!(low_stats.executions, 0);
}

#[tokio::test]
async fn test_first_match_no_match_returns_empty() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let group = engine
        .create_rule_group(RuleGroup::new(
            "no_match",
            vec![premium_id, regular_id],
            ExecutionMode::FirstMatch,
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule_group(&group.id, &customer_context("guest"))
        .await
        .unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.summary.matched_rules, 0);
}

#[tokio::test]
async fn test_best_match_selects_highest_priority_match() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let group = engine
        .create_rule_group(RuleGroup::new(
            "best_match_group",
            vec![regular_id, premium_id.clone()],
            ExecutionMode::BestMatch,
        ))
        .await
        .unwrap();

    // premium 规则优先级 1，regular 规则优先级 5
    let response = engine
        .execute_rule_group(&group.id, &customer_context("premium"))
        .await
        .unwrap();

    // 恰好一个结果，且是优先级 1 的规则
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].rule_id, premium_id);
    assert!(response.results[0].matched);
}

#[tokio::test]
async fn test_all_mode_aggregates_every_result() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let group = engine
        .create_rule_group(RuleGroup::new(
            "all_group",
            vec![premium_id, regular_id],
            ExecutionMode::All,
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule_group(&group.id, &customer_context("premium"))
        .await
        .unwrap();

    // 两条规则都评估：一条匹配，一条不匹配
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.summary.matched_rules, 1);
    assert_eq!(response.summary.not_matched_rules, 1);
}

#[tokio::test]
async fn test_aggregate_behaves_like_all() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let group = engine
        .create_rule_group(RuleGroup::new(
            "aggregate_group",
            vec![premium_id, regular_id],
            ExecutionMode::Aggregate,
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rule_group(&group.id, &customer_context("premium"))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.metadata["executionMode"], json!("aggregate"));
}

#[tokio::test]
async fn test_execute_by_category() {
    let engine = RulesEngine::new();
    seed_priority_rules(&engine).await;
    engine
        .create_rule(RuleDefinition::new(
            "other_category",
            "risk",
            "system",
            vec![RuleCondition::new("amount", Operator::GreaterThan, json!(0))],
            vec![approve_action(1)],
        ))
        .await
        .unwrap();

    let response = engine
        .execute_rules(
            &ExecutionRequest {
                categories: vec!["discounts".into()],
                ..Default::default()
            },
            &customer_context("premium"),
        )
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
}

// ==================== 试运行 ====================

#[tokio::test]
async fn test_dry_run_flags_response() {
    let engine = RulesEngine::new();

    let rule = RuleDefinition::new(
        "candidate_rule",
        "orders",
        "author",
        vec![RuleCondition::new(
            "amount",
            Operator::LessThanOrEqual,
            json!(500),
        )],
        vec![approve_action(1)],
    );

    // 未入库的规则也可以试运行
    let response = engine.test_rule(&rule, &order_context(300)).await;

    assert_eq!(response.metadata.get("dryRun"), Some(&json!(true)));
    assert!(response.results[0].matched);
    // 试运行不计入统计
    assert_eq!(engine.get_engine_metrics().total_executions, 0);
}

// ==================== 导入/导出 ====================

#[tokio::test]
async fn test_export_import_assigns_fresh_identities() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let document = engine
        .export_rules(&[premium_id.clone(), regular_id.clone()])
        .await
        .unwrap();

    let imported = engine.import_rules(&document).await.unwrap();

    assert_eq!(imported.len(), 2);
    for rule in &imported {
        assert_ne!(rule.id, premium_id);
        assert_ne!(rule.id, regular_id);
    }

    // 名称与条件/动作结构保持一致
    let names: Vec<&str> = imported.iter().map(|r| r.name.as_str()).collect();
    assert!(names.contains(&"premium_discount"));
    assert!(names.contains(&"regular_discount"));
    assert!(imported.iter().all(|r| r.conditions.len() == 1 && r.actions.len() == 1));
}

// ==================== 统计 ====================

#[tokio::test]
async fn test_statistics_accumulate_across_executions() {
    let engine = RulesEngine::new();

    let rule = engine
        .create_rule(RuleDefinition::new(
            "stats_rule",
            "orders",
            "system",
            vec![RuleCondition::new(
                "amount",
                Operator::LessThanOrEqual,
                json!(500),
            )],
            vec![approve_action(1)],
        ))
        .await
        .unwrap();

    engine.execute_rule(&rule.id, &order_context(300)).await.unwrap();
    engine.execute_rule(&rule.id, &order_context(900)).await.unwrap();

    let stats = engine.get_rule_statistics(&rule.id).await.unwrap();
    assert_eq!(stats.executions, 2);
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.actions_succeeded, 1);

    let metrics = engine.get_engine_metrics();
    assert_eq!(metrics.total_executions, 2);
    assert_eq!(metrics.total_matches, 1);
    assert_eq!(metrics.rules_tracked, 1);
}

#[tokio::test]
async fn test_statistics_for_never_executed_rule_are_zero() {
    let engine = RulesEngine::new();
    let (premium_id, _) = seed_priority_rules(&engine).await;

    let stats = engine.get_rule_statistics(&premium_id).await.unwrap();
    assert_eq!(stats.executions, 0);

    assert!(engine.get_rule_statistics("missing").await.is_err());
}

// ==================== 生命周期管理 ====================

#[tokio::test]
async fn test_duplicate_and_search() {
    let engine = RulesEngine::new();
    let (premium_id, _) = seed_priority_rules(&engine).await;

    let copy = engine
        .duplicate_rule(&premium_id, "premium_discount_v2")
        .await
        .unwrap();
    assert_eq!(copy.version, "1.0.1");

    let hits = engine.search_rules("premium").await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_group_membership_management() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let group = engine
        .create_rule_group(RuleGroup::new(
            "managed",
            vec![premium_id.clone()],
            ExecutionMode::All,
        ))
        .await
        .unwrap();

    let updated = engine.add_rule_to_group(&group.id, &regular_id).await.unwrap();
    assert_eq!(updated.rule_ids.len(), 2);

    let updated = engine
        .remove_rule_from_group(&group.id, &premium_id)
        .await
        .unwrap();
    assert_eq!(updated.rule_ids, vec![regular_id]);
}

#[tokio::test]
async fn test_deleted_rule_silently_dropped_from_group() {
    let engine = RulesEngine::new();
    let (premium_id, regular_id) = seed_priority_rules(&engine).await;

    let group = engine
        .create_rule_group(RuleGroup::new(
            "dangling",
            vec![premium_id.clone(), regular_id],
            ExecutionMode::All,
        ))
        .await
        .unwrap();

    engine.delete_rule(&premium_id).await.unwrap();

    // 悬空成员静默剔除，组执行不报错
    let response = engine
        .execute_rule_group(&group.id, &customer_context("premium"))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
}
