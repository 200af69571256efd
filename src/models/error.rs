// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

use crate::models::opcode::Opcode;

/// Malformed-input errors raised by the wire codec.
///
/// The codec reports through `anyhow::Result`; callers that need to react to
/// a specific kind recover it with `err.downcast_ref::<CodecError>()`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: need {need} bytes, got {got}")]
    BufferTooShort { need: usize, got: usize },

    #[error("invalid opcode: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("opcode {0:?} is not handled by this initiator")]
    UnsupportedOpcode(Opcode),

    #[error("opcode mismatch: expected {expected:?}, got 0x{got:02x}")]
    OpcodeMismatch { expected: Opcode, got: u8 },

    #[error("{field}: value {value} does not fit (max {max})")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("{field}: invalid raw value 0x{value:02x}")]
    InvalidField { field: &'static str, value: u8 },

    #[error("data segment of {len} bytes exceeds MaxRecvDataSegmentLength {limit}")]
    PayloadTooLarge { len: usize, limit: usize },
}
