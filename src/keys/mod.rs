// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `key=value` text carried in the data segment of Login and Text PDUs.

/// SendTargets response grouping.
pub mod discovery;
/// Known key names and the grammar of their values.
pub mod name;
/// NUL-delimited payload encoding and decoding.
pub mod payload;
/// Value grammars (numeric, iSCSI name, lists, addresses).
pub mod value;

use thiserror::Error;

/// Failures while decoding or building key-value text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for key {key}")]
    InvalidValue { key: &'static str, value: String },
}

pub use discovery::{TargetInfo, TargetPortal, parse_send_targets};
pub use name::KeyName;
pub use payload::{KeyValue, decode, encode};
