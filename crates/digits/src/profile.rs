//! Authoritative per-profile digit validators.

use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationStyle {
    None,
    ReadBack,
    MaskedReadBack,
}

#[derive(Debug, Clone)]
pub struct ProfileSpec {
    pub name: &'static str,
    pub min_digits: usize,
    pub max_digits: usize,
    pub timeout_s: u64,
    pub max_retries: u32,
    pub end_call_on_success: bool,
    pub confirmation_style: ConfirmationStyle,
    /// Digits must never leave the process un-tokenized (verification, card, ssn, ...).
    pub sensitive: bool,
    /// Trailing digits shown in the masked display of a sensitive profile
    /// (e.g. `2` for `****56`, `4` for card-style `****1234`).
    pub mask_show_last: usize,
}

#[allow(clippy::too_many_arguments)]
fn spec(
    name: &'static str,
    min_digits: usize,
    max_digits: usize,
    timeout_s: u64,
    max_retries: u32,
    end_call_on_success: bool,
    confirmation_style: ConfirmationStyle,
    sensitive: bool,
) -> ProfileSpec {
    spec_masked(name, min_digits, max_digits, timeout_s, max_retries, end_call_on_success, confirmation_style, sensitive, 4)
}

#[allow(clippy::too_many_arguments)]
fn spec_masked(
    name: &'static str,
    min_digits: usize,
    max_digits: usize,
    timeout_s: u64,
    max_retries: u32,
    end_call_on_success: bool,
    confirmation_style: ConfirmationStyle,
    sensitive: bool,
    mask_show_last: usize,
) -> ProfileSpec {
    ProfileSpec {
        name,
        min_digits,
        max_digits,
        timeout_s,
        max_retries,
        end_call_on_success,
        confirmation_style,
        sensitive,
        mask_show_last,
    }
}

pub static PROFILES: Lazy<HashMap<&'static str, ProfileSpec>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let mut add = |s: ProfileSpec| {
        m.insert(s.name, s);
    };
    add(spec_masked("verification", 4, 8, 60, 3, true, ConfirmationStyle::MaskedReadBack, true, 2));
    add(spec_masked("otp", 4, 8, 60, 3, true, ConfirmationStyle::MaskedReadBack, true, 2));
    add(spec("ssn", 9, 9, 60, 2, false, ConfirmationStyle::MaskedReadBack, true));
    add(spec("dob", 6, 8, 45, 2, false, ConfirmationStyle::ReadBack, false));
    add(spec("routing_number", 9, 9, 60, 2, false, ConfirmationStyle::MaskedReadBack, true));
    add(spec("bank_account", 6, 17, 60, 2, false, ConfirmationStyle::MaskedReadBack, true));
    add(spec("phone", 10, 10, 45, 2, false, ConfirmationStyle::ReadBack, false));
    add(spec("card_number", 13, 19, 60, 2, false, ConfirmationStyle::MaskedReadBack, true));
    add(spec("cvv", 3, 4, 30, 2, false, ConfirmationStyle::None, true));
    add(spec("card_expiry", 4, 6, 30, 2, false, ConfirmationStyle::ReadBack, false));
    add(spec("tax_id", 9, 9, 60, 2, false, ConfirmationStyle::MaskedReadBack, true));
    add(spec("ein", 9, 9, 60, 2, false, ConfirmationStyle::MaskedReadBack, true));
    add(spec("zip", 5, 9, 30, 2, false, ConfirmationStyle::ReadBack, false));
    add(spec("extension", 1, 6, 20, 1, false, ConfirmationStyle::None, false));
    add(spec("menu", 1, 1, 15, 2, false, ConfirmationStyle::None, false));
    add(spec("amount", 1, 9, 30, 2, false, ConfirmationStyle::ReadBack, false));
    add(spec("survey", 1, 1, 15, 1, false, ConfirmationStyle::None, false));
    add(spec("generic", 1, 20, 30, 2, false, ConfirmationStyle::None, false));
    m
});

/// Resolve a profile name, downgrading unknown names to `generic`.
/// Returns the resolved profile and whether it was a downgrade.
pub fn resolve(name: &str) -> (&'static ProfileSpec, bool) {
    match PROFILES.get(name) {
        Some(spec) => (spec, false),
        None => (PROFILES.get("generic").expect("generic profile always registered"), true),
    }
}

/// Run the profile-specific validator against a complete digit buffer.
/// `menu_options` is consulted only for the `menu` profile.
pub fn validate(profile: &str, digits: &str, menu_options: &[&str]) -> Result<(), String> {
    match profile {
        "dob" => validate_dob(digits),
        "routing_number" => validate_routing_number(digits),
        "card_number" => validate_luhn(digits),
        "card_expiry" => validate_card_expiry(digits),
        "menu" => validate_menu(digits, menu_options),
        "amount" => validate_amount(digits),
        _ => Ok(()),
    }
}

fn validate_dob(digits: &str) -> Result<(), String> {
    if digits.len() != 6 && digits.len() != 8 {
        return Err("dob must be 6 or 8 digits".into());
    }
    let month: u32 = digits[0..2].parse().map_err(|_| "invalid month".to_string())?;
    let day: u32 = digits[2..4].parse().map_err(|_| "invalid day".to_string())?;
    if !(1..=12).contains(&month) {
        return Err("month out of range".into());
    }
    if !(1..=31).contains(&day) {
        return Err("day out of range".into());
    }
    Ok(())
}

fn validate_routing_number(digits: &str) -> Result<(), String> {
    if digits.len() != 9 {
        return Err("routing number must be 9 digits".into());
    }
    let weights = [3, 7, 1, 3, 7, 1, 3, 7, 1];
    let sum: u32 = digits
        .bytes()
        .zip(weights.iter())
        .map(|(b, w)| (b - b'0') as u32 * w)
        .sum();
    if sum % 10 != 0 {
        return Err("routing number checksum failed".into());
    }
    Ok(())
}

fn validate_luhn(digits: &str) -> Result<(), String> {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let mut d = (b - b'0') as u32;
            if i % 2 == 1 {
                d *= 2;
                if d > 9 {
                    d -= 9;
                }
            }
            d
        })
        .sum();
    if sum % 10 != 0 {
        return Err("card number failed luhn check".into());
    }
    Ok(())
}

fn validate_card_expiry(digits: &str) -> Result<(), String> {
    if digits.len() != 4 && digits.len() != 6 {
        return Err("card expiry must be 4 or 6 digits".into());
    }
    let month: u32 = digits[0..2].parse().map_err(|_| "invalid month".to_string())?;
    if !(1..=12).contains(&month) {
        return Err("expiry month out of range".into());
    }
    Ok(())
}

fn validate_menu(digits: &str, menu_options: &[&str]) -> Result<(), String> {
    if menu_options.is_empty() || menu_options.contains(&digits) {
        Ok(())
    } else {
        Err("digit does not match any menu option".into())
    }
}

fn validate_amount(digits: &str) -> Result<(), String> {
    if digits.is_empty() || digits.len() > 9 {
        return Err("amount must be 1-9 digits".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_number_checksum() {
        assert!(validate_routing_number("021000021").is_ok());
        assert!(validate_routing_number("123456789").is_err());
    }

    #[test]
    fn luhn_card_number() {
        assert!(validate_luhn("4111111111111111").is_ok());
        assert!(validate_luhn("4111111111111112").is_err());
    }

    #[test]
    fn dob_range_checks() {
        assert!(validate_dob("021599").is_ok());
        assert!(validate_dob("131599").is_err());
    }

    #[test]
    fn unknown_profile_downgrades_to_generic() {
        let (resolved, downgraded) = resolve("frobnicate");
        assert_eq!(resolved.name, "generic");
        assert!(downgraded);
    }
}
