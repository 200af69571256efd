// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Longest iSCSI name accepted (RFC 3720 § 3.2.6.1).
pub const MAX_ISCSI_NAME_LEN: usize = 223;
/// Longest text value accepted for free-form keys such as aliases.
pub const MAX_TEXT_LEN: usize = 255;

/// Answers any key may carry instead of a regular value.
pub const NEGOTIATION_ANSWERS: &[&str] = &["Reject", "Irrelevant", "NotUnderstood"];

/// Value grammar of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Decimal or `0x` hexadecimal number within an inclusive range.
    Numeric { min: u64, max: u64 },
    /// Comma-separated list, each element one of the given words.
    List(&'static [&'static str]),
    /// Exactly one of the given words.
    Choice(&'static [&'static str]),
    /// `Yes` or `No`.
    Boolean,
    /// Alphanumerics plus `-`, `.` and `:`.
    IscsiName,
    /// Free-form UTF-8 text.
    Text,
    /// `address,tpgt`.
    TargetAddress,
    /// `All`, an iSCSI name, or nothing.
    SendTargets,
}

impl Grammar {
    /// Whether `value` is well-formed for this grammar.
    pub fn accepts(&self, value: &str) -> bool {
        if NEGOTIATION_ANSWERS.contains(&value) {
            return true;
        }
        match *self {
            Grammar::Numeric { min, max } => {
                parse_numeric(value).is_some_and(|n| (min..=max).contains(&n))
            },
            Grammar::List(words) => {
                !value.is_empty() && value.split(',').all(|v| words.contains(&v))
            },
            Grammar::Choice(words) => words.contains(&value),
            Grammar::Boolean => matches!(value, "Yes" | "No"),
            Grammar::IscsiName => is_iscsi_name(value),
            Grammar::Text => value.len() <= MAX_TEXT_LEN,
            Grammar::TargetAddress => split_target_address(value).is_some(),
            Grammar::SendTargets => {
                value.is_empty() || value == "All" || is_iscsi_name(value)
            },
        }
    }
}

/// Parses a numeric value, decimal or `0x`/`0X` hexadecimal.
pub fn parse_numeric(value: &str) -> Option<u64> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return u64::from_str_radix(hex, 16).ok();
    }
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Non-empty, at most 223 bytes, alphanumerics plus `-.:`.
pub fn is_iscsi_name(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ISCSI_NAME_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ':'))
}

/// Splits `address,tpgt` at the last comma.
///
/// The address part may itself hold a port or a bracketed IPv6 literal.
pub fn split_target_address(value: &str) -> Option<(&str, u16)> {
    let (address, tpgt) = value.rsplit_once(',')?;
    if address.is_empty() {
        return None;
    }
    let tpgt = parse_numeric(tpgt)?;
    Some((address, u16::try_from(tpgt).ok()?))
}
