// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Helpers for encoding / decoding the very first byte of every iSCSI
//! **Basic-Header-Segment** (BHS).
//!
//! ```text
//!  7   6   5   4   3   2   1   0      bit position
//! +---+---+---------------------------+
//! | . | I |        OPCODE (6 bits)    |  <- first BHS octet
//! +---+---+---------------------------+
//! ```
//!
//! * **I** - *Immediate* flag. The target processes the PDU ahead of any
//!   queued commands and the PDU does not advance CmdSN.
//! * **OPCODE** - 6-bit operation code identifying the PDU type.

use core::fmt;
use std::convert::TryFrom;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::models::error::CodecError;

/// Mask that selects the lower 6 bits (**OPCODE**) from the first BHS byte.
const OPCODE_MASK: u8 = 0b0011_1111;
/// Mask that selects the **I** bit from the first BHS byte.
const I_MASK: u8 = 0b0100_0000;

/// All op-codes defined by RFC 3720 (§ 10.2.1.2).
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    #[default]
    NopOut = 0x00,
    ScsiCommandReq = 0x01,
    ScsiTaskMgmtReq = 0x02,
    LoginReq = 0x03,
    TextReq = 0x04,
    ScsiDataOut = 0x05,
    LogoutReq = 0x06,
    Snack = 0x10,
    /* 0x07–0x1F reserved */
    NopIn = 0x20,
    ScsiCommandResp = 0x21,
    ScsiTaskMgmtResp = 0x22,
    LoginResp = 0x23,
    TextResp = 0x24,
    ScsiDataIn = 0x25,
    LogoutResp = 0x26,
    ReadyToTransfer = 0x31,
    AsyncMessage = 0x32,
    /* 0x27–0x3E reserved */
    Reject = 0x3F,
}

impl Opcode {
    #[inline]
    pub fn from_u6(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::NopOut,
            0x01 => Self::ScsiCommandReq,
            0x02 => Self::ScsiTaskMgmtReq,
            0x03 => Self::LoginReq,
            0x04 => Self::TextReq,
            0x05 => Self::ScsiDataOut,
            0x06 => Self::LogoutReq,
            0x10 => Self::Snack,
            0x20 => Self::NopIn,
            0x21 => Self::ScsiCommandResp,
            0x22 => Self::ScsiTaskMgmtResp,
            0x23 => Self::LoginResp,
            0x24 => Self::TextResp,
            0x25 => Self::ScsiDataIn,
            0x26 => Self::LogoutResp,
            0x31 => Self::ReadyToTransfer,
            0x32 => Self::AsyncMessage,
            0x3F => Self::Reject,
            _ => return None,
        })
    }

    /// Target-to-initiator op-codes all carry bit 5.
    #[inline]
    pub fn is_response(self) -> bool {
        (self as u8) & 0x20 != 0
    }
}

/// Typed representation of the very first BHS byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BhsOpcode {
    /// Immediate delivery (**I** bit).
    pub immediate: bool,
    pub opcode: Opcode,
}

impl TryFrom<u8> for BhsOpcode {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let immediate = (byte & I_MASK) != 0;
        let code = byte & OPCODE_MASK;
        let opcode = Opcode::from_u6(code).ok_or(CodecError::UnknownOpcode(code))?;
        Ok(Self { immediate, opcode })
    }
}

impl From<&BhsOpcode> for u8 {
    fn from(b: &BhsOpcode) -> u8 {
        let mut raw = b.opcode as u8;
        if b.immediate {
            raw |= I_MASK;
        }
        raw
    }
}

/// Wire-safe, zero-copy first BHS octet.
/// Transparent over `u8`, so it can live inside a zerocopy BHS struct.
#[repr(transparent)]
#[derive(
    Copy, Clone, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawBhsOpcode(u8);

impl RawBhsOpcode {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub const fn i(&self) -> bool {
        (self.0 & I_MASK) != 0
    }

    #[inline]
    pub fn set_i(&mut self) {
        self.0 |= I_MASK
    }

    #[inline]
    pub const fn opcode_raw(&self) -> u8 {
        self.0 & OPCODE_MASK
    }

    #[inline]
    pub fn opcode_known(&self) -> Option<Opcode> {
        Opcode::from_u6(self.opcode_raw())
    }

    #[inline]
    pub fn set_opcode_known(&mut self, k: Opcode) {
        self.0 = (self.0 & !OPCODE_MASK) | (k as u8 & OPCODE_MASK)
    }

    /// Builds the byte for `opcode`, immediate or not.
    #[inline]
    pub fn new(opcode: Opcode, immediate: bool) -> Self {
        let mut raw = Self::default();
        raw.set_opcode_known(opcode);
        if immediate {
            raw.set_i();
        }
        raw
    }
}

impl fmt::Debug for RawBhsOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tmp = f.debug_struct("RawBhsOpcode");
        if self.i() {
            tmp.field("I", &true);
        }
        match self.opcode_known() {
            Some(op) => tmp.field("opcode", &op).finish(),
            None => tmp
                .field("opcode_raw", &format_args!("0x{:02X}", self.opcode_raw()))
                .finish(),
        }
    }
}
