// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::Result;
use tracing::warn;

use crate::{
    cfg::enums::AuthMethod,
    keys::{
        KeyError, KeyName,
        value::{parse_numeric, split_target_address},
    },
};

/// One `key=value` pair whose value has been checked against the key's
/// grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    key: KeyName,
    value: String,
}

impl KeyValue {
    pub fn new(key: KeyName, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !key.grammar().accepts(&value) {
            return Err(KeyError::InvalidValue {
                key: key.as_str(),
                value,
            }
            .into());
        }
        Ok(Self { key, value })
    }

    /// Builds a list value, joining the elements with `,`.
    pub fn list<I, S>(key: KeyName, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(",");
        Self::new(key, joined)
    }

    #[inline]
    pub fn key(&self) -> KeyName {
        self.key
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Elements of a comma-separated value.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.value.split(',')
    }

    fn invalid(&self) -> anyhow::Error {
        KeyError::InvalidValue {
            key: self.key.as_str(),
            value: self.value.clone(),
        }
        .into()
    }

    pub fn numeric(&self) -> Result<u64> {
        parse_numeric(&self.value).ok_or_else(|| self.invalid())
    }

    pub fn auth_methods(&self) -> Result<Vec<AuthMethod>> {
        if self.key != KeyName::AuthMethod {
            return Err(self.invalid());
        }
        self.values()
            .map(|v| AuthMethod::from_wire(v).ok_or_else(|| self.invalid()))
            .collect()
    }

    /// `(address, tpgt)` of a `TargetAddress` value.
    pub fn target_address(&self) -> Result<(String, u16)> {
        if self.key != KeyName::TargetAddress {
            return Err(self.invalid());
        }
        split_target_address(&self.value)
            .map(|(addr, tpgt)| (addr.to_owned(), tpgt))
            .ok_or_else(|| self.invalid())
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Serializes pairs as `key=value\0`, preserving order.
pub fn encode(entries: &[KeyValue]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        entries
            .iter()
            .map(|kv| kv.key.as_str().len() + kv.value.len() + 2)
            .sum(),
    );
    for kv in entries {
        out.extend_from_slice(kv.key.as_str().as_bytes());
        out.push(b'=');
        out.extend_from_slice(kv.value.as_bytes());
        out.push(0);
    }
    out
}

/// Parses a NUL-delimited payload.
///
/// Chunks that are not exactly `key=value` are dropped with a warning;
/// an unknown key or an ill-formed value fails the whole payload.
pub fn decode(bytes: &[u8]) -> Result<Vec<KeyValue>> {
    let mut out = Vec::new();
    for chunk in bytes.split(|b| *b == 0).filter(|c| !c.is_empty()) {
        let Ok(text) = std::str::from_utf8(chunk) else {
            warn!("dropping non UTF-8 key-value chunk: {}", hex::encode(chunk));
            continue;
        };
        let mut parts = text.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next())
        else {
            warn!("dropping malformed key-value chunk {text:?}");
            continue;
        };
        let key: KeyName = key.parse()?;
        out.push(KeyValue::new(key, value)?);
    }
    Ok(out)
}
