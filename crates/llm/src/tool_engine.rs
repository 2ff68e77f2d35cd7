//! Tool planner/executor: plan, validate, reserve, budget, circuit-break,
//! execute, and audit one tool call. The recursive "feed the tool response
//! back and continue" step lives in the call session runtime, which owns
//! the turn loop this engine's primitives are called from; `ToolLoopGuard`
//! here only tracks the per-call cap that step enforces.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use serde_json::Value;

use voice_agent_core::circuit::{CircuitBreaker, CircuitConfig};
use voice_agent_core::idempotency::{IdempotencyRecord, IdempotencyStatus, Reservation};
use voice_agent_core::tool_audit::{ToolAudit, ToolAuditStatus};
use voice_agent_core::traits::Store;
use voice_agent_core::{Error, Result};
use voice_agent_tools::{ToolClass, ToolExecutor, ToolOutput};

#[derive(Debug, Clone)]
pub struct ToolPlanMetadata {
    pub call_sid: String,
    pub step_id: String,
    pub attempt_id: String,
    pub input_hash: String,
}

#[derive(Debug, Clone)]
pub struct ToolPlan {
    pub tool_name: String,
    pub args: Value,
    pub tool_call_id: String,
    pub metadata: ToolPlanMetadata,
    pub idempotency_key: String,
}

fn stable_hash(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl ToolPlan {
    pub fn new(
        call_sid: impl Into<String>,
        step_id: impl Into<String>,
        attempt_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        let call_sid = call_sid.into();
        let step_id = step_id.into();
        let attempt_id = attempt_id.into();
        let input_hash = stable_hash(&args);
        let idempotency_key = format!("tool:{call_sid}:{step_id}:{attempt_id}:{input_hash}");
        Self {
            tool_name: tool_name.into(),
            args,
            tool_call_id: tool_call_id.into(),
            metadata: ToolPlanMetadata { call_sid, step_id, attempt_id, input_hash },
            idempotency_key,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolEngineConfig {
    pub tool_budget_per_interaction: u32,
    pub max_tool_loops: u32,
    pub circuit: CircuitConfig,
    pub base_backoff: Duration,
    /// Idempotency record lifetime.
    pub idempotency_ttl: Duration,
}

impl Default for ToolEngineConfig {
    fn default() -> Self {
        Self {
            tool_budget_per_interaction: 8,
            max_tool_loops: 4,
            circuit: CircuitConfig::default(),
            base_backoff: Duration::from_millis(200),
            idempotency_ttl: Duration::from_secs(300),
        }
    }
}

/// Tracks how many tool-call loops a single interaction has taken; once the
/// cap is hit the turn driver must disable tools and force a text-only
/// continuation.
#[derive(Default)]
pub struct ToolLoopGuard {
    counts: DashMap<String, u32>,
}

impl ToolLoopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if another tool loop is allowed for `call_sid`,
    /// incrementing its counter as a side effect.
    pub fn allow(&self, call_sid: &str, max_tool_loops: u32) -> bool {
        let mut count = self.counts.entry(call_sid.to_string()).or_insert(0);
        *count += 1;
        *count <= max_tool_loops
    }

    pub fn reset(&self, call_sid: &str) {
        self.counts.remove(call_sid);
    }
}

/// Executes one planned tool call through validate/reserve/budget/circuit/
/// execute/audit, given a tool registry and a durable store.
pub struct ToolEngine {
    store: Arc<dyn Store>,
    executor: Arc<dyn ToolExecutor>,
    config: ToolEngineConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    budgets: DashMap<String, AtomicU32>,
}

impl ToolEngine {
    pub fn new(store: Arc<dyn Store>, executor: Arc<dyn ToolExecutor>, config: ToolEngineConfig) -> Self {
        Self { store, executor, config, breakers: DashMap::new(), budgets: DashMap::new() }
    }

    fn breaker_for(&self, tool_name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(tool_name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.circuit.clone())))
            .clone()
    }

    fn check_and_consume_budget(&self, call_sid: &str) -> bool {
        let counter = self.budgets.entry(call_sid.to_string()).or_insert_with(|| AtomicU32::new(0));
        let used = counter.fetch_add(1, Ordering::SeqCst) + 1;
        used <= self.config.tool_budget_per_interaction
    }

    pub fn reset_budget(&self, call_sid: &str) {
        self.budgets.remove(call_sid);
    }

    /// Runs the full plan → validate → reserve → budget → circuit → execute
    /// → audit pipeline for one tool call. `fallback_tool` is invoked in
    /// place of `tool_name` when its circuit is open, if declared.
    pub async fn run(&self, plan: ToolPlan, fallback_tool: Option<&str>) -> Result<ToolOutput> {
        let tool = self
            .executor
            .get_tool(&plan.tool_name)
            .ok_or_else(|| Error::ToolValidation(format!("unknown tool: {}", plan.tool_name)))?;

        // 2. Validate
        let mut args = plan.args.clone();
        if plan.tool_name == "collect_digits" {
            clamp_collect_digits_args(&mut args);
        }
        tool.validate(&args).map_err(Error::from)?;

        // 3. Reserve (side-effect and capture tools only; reads skip reservation)
        let is_side_effecting = !matches!(tool.class(), ToolClass::Read);
        if is_side_effecting {
            let ttl = Utc::now() + chrono::Duration::from_std(self.config.idempotency_ttl).unwrap_or_default();
            match self.store.reserve_idempotency(&plan.idempotency_key, ttl).await? {
                Reservation::Reserved => {}
                Reservation::Existing(record) => {
                    return match record.status {
                        IdempotencyStatus::Ok => Ok(record
                            .response
                            .map(ToolOutput::json)
                            .unwrap_or_else(|| ToolOutput::text("cached"))),
                        IdempotencyStatus::Failed => {
                            Err(Error::ToolIdempotencyConflict("tool_idempotency_failed".to_string()))
                        }
                        IdempotencyStatus::InProgress => {
                            Err(Error::ToolIdempotencyConflict("tool_in_progress".to_string()))
                        }
                    };
                }
            }
        }

        // 4. Budget
        if !self.check_and_consume_budget(&plan.metadata.call_sid) {
            return Err(Error::ToolBudgetExceeded(plan.tool_name.clone()));
        }

        // 5. Circuit
        let breaker = self.breaker_for(&plan.tool_name);
        let now = Utc::now();
        if !breaker.allow(now) {
            if let Some(fallback) = fallback_tool {
                let fallback_plan = ToolPlan::new(
                    plan.metadata.call_sid.clone(),
                    plan.metadata.step_id.clone(),
                    plan.metadata.attempt_id.clone(),
                    plan.tool_call_id.clone(),
                    fallback.to_string(),
                    args.clone(),
                );
                return Box::pin(self.run(fallback_plan, None)).await;
            }
            return Err(Error::ToolCircuitOpen { tool_name: plan.tool_name.clone() });
        }

        // 6. Execute, with retry + jittered exponential backoff
        let start = std::time::Instant::now();
        let retry_limit = tool.retry_limit();
        let mut attempt = 0;
        let result = loop {
            match self.executor.execute(&plan.tool_name, args.clone()).await {
                Ok(output) => {
                    breaker.record_success(now);
                    break Ok(output);
                }
                Err(_e) if attempt < retry_limit => {
                    attempt += 1;
                    let jitter_ms = rand::thread_rng().gen_range(0..50);
                    let backoff = self.config.base_backoff * 2u32.pow(attempt.min(8)) + Duration::from_millis(jitter_ms);
                    tracing::warn!(tool = %plan.tool_name, attempt, "tool call failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    breaker.record_failure(now);
                    break Err(e);
                }
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        // 7. Audit
        let (status, response) = match &result {
            Ok(output) => (ToolAuditStatus::Ok, Some(serde_json::json!(output.as_text()))),
            Err(_) => (ToolAuditStatus::Failed, None),
        };
        let audit = ToolAudit {
            call_sid: plan.metadata.call_sid.clone(),
            trace_id: plan.tool_call_id.clone(),
            tool_name: plan.tool_name.clone(),
            idempotency_key: plan.idempotency_key.clone(),
            input_hash: plan.metadata.input_hash.clone(),
            request: args,
            response: response.clone(),
            status,
            duration_ms: Some(duration_ms),
            metadata: serde_json::json!({ "step_id": plan.metadata.step_id, "attempt_id": plan.metadata.attempt_id }),
            created_at: Utc::now(),
        };
        self.store.insert_tool_audit(&audit).await?;

        if is_side_effecting {
            let record = IdempotencyRecord {
                key: plan.idempotency_key.clone(),
                status: if result.is_ok() { IdempotencyStatus::Ok } else { IdempotencyStatus::Failed },
                response,
                expires_at: Utc::now() + chrono::Duration::from_std(self.config.idempotency_ttl).unwrap_or_default(),
            };
            self.store.complete_idempotency(&plan.idempotency_key, record).await?;
        }

        result.map_err(Error::from)
    }
}

fn clamp_collect_digits_args(args: &mut Value) {
    let Some(obj) = args.as_object_mut() else { return };
    let min = obj.get("min_digits").and_then(|v| v.as_u64()).unwrap_or(1).max(1);
    let max = obj.get("max_digits").and_then(|v| v.as_u64()).unwrap_or(min).max(min);
    obj.insert("min_digits".to_string(), serde_json::json!(min));
    obj.insert("max_digits".to_string(), serde_json::json!(max));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_for_same_input() {
        let plan_a = ToolPlan::new("CA1", "step1", "a1", "call1", "hangup_call", serde_json::json!({"call_sid": "CA1"}));
        let plan_b = ToolPlan::new("CA1", "step1", "a1", "call2", "hangup_call", serde_json::json!({"call_sid": "CA1"}));
        assert_eq!(plan_a.idempotency_key, plan_b.idempotency_key);
    }

    #[test]
    fn idempotency_key_changes_with_args() {
        let plan_a = ToolPlan::new("CA1", "step1", "a1", "call1", "hangup_call", serde_json::json!({"call_sid": "CA1"}));
        let plan_b = ToolPlan::new("CA1", "step1", "a1", "call1", "hangup_call", serde_json::json!({"call_sid": "CA2"}));
        assert_ne!(plan_a.idempotency_key, plan_b.idempotency_key);
    }

    #[test]
    fn clamp_fixes_inverted_digit_range() {
        let mut args = serde_json::json!({"min_digits": 6, "max_digits": 2});
        clamp_collect_digits_args(&mut args);
        assert_eq!(args["min_digits"], 6);
        assert_eq!(args["max_digits"], 6);
    }

    #[test]
    fn loop_guard_caps_at_configured_max() {
        let guard = ToolLoopGuard::new();
        assert!(guard.allow("CA1", 2));
        assert!(guard.allow("CA1", 2));
        assert!(!guard.allow("CA1", 2));
        guard.reset("CA1");
        assert!(guard.allow("CA1", 2));
    }
}
