//! Per-digit recording algorithm: gap/length guards, profile validation,
//! and spam-pattern rejection.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::expectation::{DigitExpectation, ExpectationStatus};
use crate::profile::validate;

static REPEAT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d)\1{5,}$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigitOutcome {
    /// Still collecting; nothing to report to the call yet.
    Pending,
    Accepted { digits: String },
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    pub min_dtmf_gap_ms: i64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { min_dtmf_gap_ms: 80 }
    }
}

fn is_ascending_run(buffer: &str) -> bool {
    "0123456789".contains(buffer) && buffer.len() >= 6
}

/// Feed one DTMF key-press into the expectation's buffer, returning the
/// outcome. `menu_options` is forwarded to the `menu` profile validator.
pub fn record_digit(
    expectation: &mut DigitExpectation,
    key: char,
    at: DateTime<Utc>,
    config: RecorderConfig,
    menu_options: &[&str],
) -> DigitOutcome {
    if expectation.allow_terminator && key == expectation.terminator_char {
        return finalize(expectation, menu_options);
    }

    if let Some(last) = expectation.last_key_at {
        let gap = (at - last).num_milliseconds();
        if gap < config.min_dtmf_gap_ms && expectation.buffer.len() == 1 {
            expectation.buffer.clear();
            expectation.last_key_at = Some(at);
            return DigitOutcome::Rejected {
                reason: "too_fast".into(),
            };
        }
    }
    expectation.last_key_at = Some(at);
    expectation.status = ExpectationStatus::Collecting;
    expectation.buffer.push(key);

    if expectation.buffer.len() > expectation.max_digits {
        expectation.buffer.clear();
        expectation.retries += 1;
        return DigitOutcome::Rejected {
            reason: "too_long".into(),
        };
    }

    // Fixed-length profiles (min == max) finalize as soon as the length is
    // reached; variable-length profiles (e.g. dob 6|8, card_expiry 4|6) stop
    // only at one of their named lengths or on an explicit terminator, so a
    // partial prefix within the valid range doesn't truncate the entry.
    let len = expectation.buffer.len();
    if len == expectation.min_digits || len == expectation.max_digits {
        return finalize(expectation, menu_options);
    }

    DigitOutcome::Pending
}

fn finalize(expectation: &mut DigitExpectation, menu_options: &[&str]) -> DigitOutcome {
    let buffer = expectation.buffer.clone();
    if buffer.len() < expectation.min_digits {
        return DigitOutcome::Pending;
    }

    if REPEAT_PATTERN.is_match(&buffer) {
        expectation.buffer.clear();
        expectation.retries += 1;
        return DigitOutcome::Rejected {
            reason: "repeat_pattern".into(),
        };
    }
    if is_ascending_run(&buffer) {
        expectation.buffer.clear();
        expectation.retries += 1;
        return DigitOutcome::Rejected {
            reason: "ascending_pattern".into(),
        };
    }

    match validate(&expectation.profile, &buffer, menu_options) {
        Ok(()) => {
            expectation.collected.push(buffer.clone());
            expectation.status = ExpectationStatus::Accepted;
            expectation.buffer.clear();
            DigitOutcome::Accepted { digits: buffer }
        }
        Err(reason) => {
            expectation.buffer.clear();
            expectation.retries += 1;
            DigitOutcome::Rejected { reason }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::DigitExpectation;

    fn otp() -> DigitExpectation {
        DigitExpectation::for_profile("otp", true).0
    }

    #[test]
    fn too_fast_rejects_second_key() {
        let mut exp = otp();
        let t0 = Utc::now();
        let o1 = record_digit(&mut exp, '1', t0, RecorderConfig::default(), &[]);
        assert_eq!(o1, DigitOutcome::Pending);
        let o2 = record_digit(&mut exp, '2', t0, RecorderConfig::default(), &[]);
        assert_eq!(o2, DigitOutcome::Rejected { reason: "too_fast".into() });
    }

    #[test]
    fn accepts_valid_otp() {
        let mut exp = otp();
        let t0 = Utc::now();
        let cfg = RecorderConfig { min_dtmf_gap_ms: 0 };
        let mut last = DigitOutcome::Pending;
        for (i, c) in "1357".chars().enumerate() {
            last = record_digit(&mut exp, c, t0 + chrono::Duration::milliseconds(200 * i as i64), cfg, &[]);
        }
        assert_eq!(last, DigitOutcome::Accepted { digits: "1357".into() });
    }

    #[test]
    fn rejects_ascending_pattern() {
        // bank_account's min_digits is 6, so the buffer finalizes exactly
        // when the ascending run is complete.
        let mut exp = DigitExpectation::for_profile("bank_account", true).0;
        let t0 = Utc::now();
        let cfg = RecorderConfig { min_dtmf_gap_ms: 0 };
        let mut last = DigitOutcome::Pending;
        for (i, c) in "012345".chars().enumerate() {
            last = record_digit(&mut exp, c, t0 + chrono::Duration::milliseconds(200 * i as i64), cfg, &[]);
        }
        assert_eq!(last, DigitOutcome::Rejected { reason: "ascending_pattern".into() });
    }

    #[test]
    fn rejects_repeat_pattern() {
        let mut exp = DigitExpectation::for_profile("bank_account", true).0;
        let t0 = Utc::now();
        let cfg = RecorderConfig { min_dtmf_gap_ms: 0 };
        let mut last = DigitOutcome::Pending;
        for (i, c) in "555555".chars().enumerate() {
            last = record_digit(&mut exp, c, t0 + chrono::Duration::milliseconds(200 * i as i64), cfg, &[]);
        }
        assert_eq!(last, DigitOutcome::Rejected { reason: "repeat_pattern".into() });
    }
}
