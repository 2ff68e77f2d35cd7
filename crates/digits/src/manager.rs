//! Per-call expectation registry: one in-flight `DigitExpectation` per call,
//! with an optional `DigitPlan` driving a sequence of them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::expectation::{DigitExpectation, DigitPlan};
use crate::recorder::{record_digit, DigitOutcome, RecorderConfig};
use crate::vault::DigitVault;
use crate::error::DigitsError;

pub struct DigitManager {
    expectations: DashMap<String, DigitExpectation>,
    plans: DashMap<String, DigitPlan>,
    vault: Arc<dyn DigitVault>,
    recorder_config: RecorderConfig,
}

impl DigitManager {
    pub fn new(vault: Arc<dyn DigitVault>, recorder_config: RecorderConfig) -> Self {
        Self {
            expectations: DashMap::new(),
            plans: DashMap::new(),
            vault,
            recorder_config,
        }
    }

    /// Install a single-step expectation for `call_sid`. Replaces any
    /// existing expectation; a call has at most one in flight.
    pub fn set_expectation(&self, call_sid: &str, profile: &str, mask_for_gpt: bool) -> (&'static str, bool) {
        let (mut expectation, spec, downgraded) = DigitExpectation::for_profile(profile, mask_for_gpt);
        expectation.mark_prompted();
        self.expectations.insert(call_sid.to_string(), expectation);
        (spec.name, downgraded)
    }

    /// Install a multi-step plan; the first step becomes the active expectation.
    pub fn set_plan(&self, call_sid: &str, plan: DigitPlan, mask_for_gpt: bool) {
        if let Some(profile) = plan.current_profile() {
            let (mut expectation, _, _) = DigitExpectation::for_profile(profile, mask_for_gpt);
            expectation.plan_id = Some(plan.id.clone());
            expectation.plan_step_index = Some(plan.current_step);
            expectation.plan_total_steps = Some(plan.total_steps());
            expectation.mark_prompted();
            self.expectations.insert(call_sid.to_string(), expectation);
        }
        self.plans.insert(call_sid.to_string(), plan);
    }

    pub fn has_expectation(&self, call_sid: &str) -> bool {
        self.expectations.contains_key(call_sid)
    }

    /// A snapshot of the in-flight expectation, for rendering an IVR prompt.
    pub fn current_expectation(&self, call_sid: &str) -> Option<DigitExpectation> {
        self.expectations.get(call_sid).map(|e| e.clone())
    }

    /// Record one DTMF key-press. Returns the tokenized/masked outcome; on
    /// `Accepted`, advances the plan (if any) or clears the expectation.
    pub async fn record_key(
        &self,
        call_sid: &str,
        key: char,
        at: DateTime<Utc>,
        menu_options: &[&str],
    ) -> Result<RecordedOutcome, DigitsError> {
        let mut entry = self
            .expectations
            .get_mut(call_sid)
            .ok_or(DigitsError::NoExpectation)?;

        let profile_spec = crate::profile::resolve(&entry.profile).0;
        let sensitive = profile_spec.sensitive;
        let mask_show_last = profile_spec.mask_show_last;
        let end_call_on_success = entry.end_call_on_success;
        let mask_for_gpt = entry.mask_for_gpt;
        let profile = entry.profile.clone();
        let outcome = record_digit(&mut entry, key, at, self.recorder_config, menu_options);

        match outcome {
            DigitOutcome::Pending => Ok(RecordedOutcome::Pending),
            DigitOutcome::Rejected { reason } => {
                let retries = entry.retries;
                let max_retries = entry.max_retries;
                if retries > max_retries {
                    drop(entry);
                    self.expectations.remove(call_sid);
                    Ok(RecordedOutcome::Failed { profile, reason })
                } else {
                    Ok(RecordedOutcome::Rejected { profile, reason })
                }
            }
            DigitOutcome::Accepted { digits } => {
                let plan_advance = self.advance_plan_if_any(call_sid, entry.plan_id.clone());
                drop(entry);

                let (display, token) = if sensitive {
                    let token = self.vault.tokenize(call_sid, &digits).await;
                    let display = if mask_for_gpt {
                        crate::vault::mask(&digits, mask_show_last)
                    } else {
                        digits.clone()
                    };
                    (display, Some(token))
                } else {
                    (digits.clone(), None)
                };

                if !plan_advance.is_some_and(|complete| !complete) {
                    self.expectations.remove(call_sid);
                }

                Ok(RecordedOutcome::Accepted {
                    profile,
                    raw_len: digits.len(),
                    display,
                    token,
                    plan_complete: plan_advance.map(|more_steps| !more_steps),
                    end_call_on_success,
                })
            }
        }
    }

    /// Advances the plan for `call_sid` if the just-completed expectation
    /// belonged to one. Returns `Some(true)` if more steps remain, `Some(false)`
    /// if the plan is now complete, or `None` if there was no plan.
    fn advance_plan_if_any(&self, call_sid: &str, plan_id: Option<String>) -> Option<bool> {
        let plan_id = plan_id?;
        let mut plan = self.plans.get_mut(call_sid)?;
        if plan.id != plan_id {
            return None;
        }
        let complete = plan.advance();
        if !complete {
            if let Some(next_profile) = plan.current_profile() {
                let (mut expectation, _, _) = DigitExpectation::for_profile(next_profile, true);
                expectation.plan_id = Some(plan.id.clone());
                expectation.plan_step_index = Some(plan.current_step);
                expectation.plan_total_steps = Some(plan.total_steps());
                expectation.mark_prompted();
                self.expectations.insert(call_sid.to_string(), expectation);
            }
        } else {
            self.plans.remove(call_sid);
        }
        Some(!complete)
    }

    /// Fire on the per-call timeout timer. Increments retries or, past the
    /// retry budget, clears the expectation with `timeout_failure_message`.
    pub fn timeout(&self, call_sid: &str) -> Option<DigitsError> {
        let mut entry = self.expectations.get_mut(call_sid)?;
        entry.retries += 1;
        if entry.retries > entry.max_retries {
            drop(entry);
            self.expectations.remove(call_sid);
            Some(DigitsError::RetriesExhausted)
        } else {
            Some(DigitsError::Timeout)
        }
    }

    pub fn clear(&self, call_sid: &str) {
        self.expectations.remove(call_sid);
        self.plans.remove(call_sid);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOutcome {
    Pending,
    Rejected { profile: String, reason: String },
    Failed { profile: String, reason: String },
    Accepted {
        profile: String,
        raw_len: usize,
        display: String,
        token: Option<String>,
        plan_complete: Option<bool>,
        end_call_on_success: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::InMemoryDigitVault;

    #[tokio::test]
    async fn accepts_and_tokenizes_sensitive_profile() {
        let manager = DigitManager::new(
            Arc::new(InMemoryDigitVault::default()),
            RecorderConfig { min_dtmf_gap_ms: 0 },
        );
        manager.set_expectation("CA1", "otp", true);
        let t0 = Utc::now();
        let mut last = RecordedOutcome::Pending;
        for (i, c) in "1234".chars().enumerate() {
            last = manager
                .record_key("CA1", c, t0 + chrono::Duration::milliseconds(200 * i as i64), &[])
                .await
                .unwrap();
        }
        match last {
            RecordedOutcome::Accepted { token, display, profile, end_call_on_success, .. } => {
                assert!(token.is_some());
                assert_eq!(display, "**34");
                assert_eq!(profile, "otp");
                assert!(end_call_on_success);
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert!(!manager.has_expectation("CA1"));
    }

    #[tokio::test]
    async fn plan_advances_through_steps() {
        let manager = DigitManager::new(
            Arc::new(InMemoryDigitVault::default()),
            RecorderConfig { min_dtmf_gap_ms: 0 },
        );
        let plan = DigitPlan::new("p1", vec!["cvv".into(), "zip".into()], "done", false);
        manager.set_plan("CA2", plan, true);

        let t0 = Utc::now();
        let mut last = RecordedOutcome::Pending;
        for (i, c) in "123".chars().enumerate() {
            last = manager
                .record_key("CA2", c, t0 + chrono::Duration::milliseconds(200 * i as i64), &[])
                .await
                .unwrap();
        }
        assert!(matches!(last, RecordedOutcome::Accepted { plan_complete: Some(false), .. }));
        assert!(manager.has_expectation("CA2"));
    }
}
