//! 执行统计聚合
//!
//! 按规则累积执行计数与耗时，支撑规则级统计查询和引擎级指标。
//! 统计在每次规则执行后记录，多个在途执行并发写入。

use crate::result::RuleExecutionResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 单规则统计快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub rule_id: String,
    pub executions: u64,
    pub matches: u64,
    pub skips: u64,
    pub errors: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub total_duration_ms: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl RuleStats {
    /// 匹配率（不含 skipped 的执行）
    pub fn match_rate(&self) -> f64 {
        let effective = self.executions - self.skips;
        if effective == 0 {
            return 0.0;
        }
        self.matches as f64 / effective as f64
    }

    pub fn average_duration_ms(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.executions as f64
    }
}

/// 引擎级汇总指标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMetrics {
    pub total_executions: u64,
    pub total_matches: u64,
    pub total_action_failures: u64,
    pub rules_tracked: usize,
    pub average_duration_ms: f64,
}

#[derive(Default)]
struct Totals {
    executions: u64,
    matches: u64,
    action_failures: u64,
    duration_ms: u64,
}

/// 统计收集器
#[derive(Clone, Default)]
pub struct StatsCollector {
    per_rule: Arc<DashMap<String, RuleStats>>,
    totals: Arc<RwLock<Totals>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次规则执行
    pub fn record(&self, result: &RuleExecutionResult) {
        let actions_succeeded = result.action_results.iter().filter(|a| a.success).count() as u64;
        let actions_failed = result.action_results.len() as u64 - actions_succeeded;

        let mut entry = self
            .per_rule
            .entry(result.rule_id.clone())
            .or_insert_with(|| RuleStats {
                rule_id: result.rule_id.clone(),
                ..Default::default()
            });

        entry.executions += 1;
        if result.matched {
            entry.matches += 1;
        }
        if result.skipped {
            entry.skips += 1;
        }
        if result.error.is_some() {
            entry.errors += 1;
        }
        entry.actions_succeeded += actions_succeeded;
        entry.actions_failed += actions_failed;
        entry.total_duration_ms += result.duration_ms;
        entry.last_executed_at = Some(Utc::now());
        drop(entry);

        let mut totals = self.totals.write();
        totals.executions += 1;
        if result.matched {
            totals.matches += 1;
        }
        totals.action_failures += actions_failed;
        totals.duration_ms += result.duration_ms;
    }

    /// 查询单规则统计
    pub fn rule_stats(&self, rule_id: &str) -> Option<RuleStats> {
        self.per_rule.get(rule_id).map(|s| s.clone())
    }

    /// 引擎级指标
    pub fn engine_metrics(&self) -> EngineMetrics {
        let totals = self.totals.read();
        EngineMetrics {
            total_executions: totals.executions,
            total_matches: totals.matches,
            total_action_failures: totals.action_failures,
            rules_tracked: self.per_rule.len(),
            average_duration_ms: if totals.executions > 0 {
                totals.duration_ms as f64 / totals.executions as f64
            } else {
                0.0
            },
        }
    }

    /// 清空统计
    pub fn reset(&self) {
        self.per_rule.clear();
        *self.totals.write() = Totals::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionType;
    use crate::result::ActionResult;
    use serde_json::json;

    fn result(rule_id: &str, matched: bool, action_failures: usize) -> RuleExecutionResult {
        let mut action_results = vec![ActionResult::success(
            "a1".into(),
            ActionType::Approve,
            json!("ok"),
            1,
        )];
        for i in 0..action_failures {
            action_results.push(ActionResult::failure(
                format!("f{}", i),
                ActionType::CallApi,
                "boom",
                1,
            ));
        }

        RuleExecutionResult {
            rule_id: rule_id.into(),
            rule_name: "test".into(),
            matched,
            skipped: false,
            condition_traces: Vec::new(),
            action_results: if matched { action_results } else { Vec::new() },
            error: None,
            duration_ms: 10,
        }
    }

    #[test]
    fn test_record_accumulates() {
        let stats = StatsCollector::new();
        stats.record(&result("r1", true, 1));
        stats.record(&result("r1", false, 0));

        let s = stats.rule_stats("r1").unwrap();
        assert_eq!(s.executions, 2);
        assert_eq!(s.matches, 1);
        assert_eq!(s.actions_succeeded, 1);
        assert_eq!(s.actions_failed, 1);
        assert!((s.match_rate() - 0.5).abs() < f64::EPSILON);
        assert!((s.average_duration_ms() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_engine_metrics() {
        let stats = StatsCollector::new();
        stats.record(&result("r1", true, 0));
        stats.record(&result("r2", true, 2));
        stats.record(&result("r2", false, 0));

        let metrics = stats.engine_metrics();
        assert_eq!(metrics.total_executions, 3);
        assert_eq!(metrics.total_matches, 2);
        assert_eq!(metrics.total_action_failures, 2);
        assert_eq!(metrics.rules_tracked, 2);
    }

    #[test]
    fn test_unknown_rule_is_none() {
        let stats = StatsCollector::new();
        assert!(stats.rule_stats("missing").is_none());
    }

    #[test]
    fn test_reset() {
        let stats = StatsCollector::new();
        stats.record(&result("r1", true, 0));
        stats.reset();

        assert!(stats.rule_stats("r1").is_none());
        assert_eq!(stats.engine_metrics().total_executions, 0);
    }
}
