// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::models::error::CodecError;

/// Byte 1 of a Logout Request always carries the Final bit.
const FINAL: u8 = 0x80;
const REASON_MASK: u8 = 0x7F;

/// iSCSI Logout Reason Code (RFC 3720 § 10.14.1)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogoutReason {
    /// Close the entire session (all connections)
    #[default]
    CloseSession = 0x00,
    /// Close a specific connection identified by CID
    CloseConnection = 0x01,
    /// Remove a connection for recovery purposes
    RemoveConnectionForRecovery = 0x02,
}

impl TryFrom<u8> for LogoutReason {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => LogoutReason::CloseSession,
            0x01 => LogoutReason::CloseConnection,
            0x02 => LogoutReason::RemoveConnectionForRecovery,
            other => {
                return Err(CodecError::InvalidField {
                    field: "logout reason",
                    value: other,
                }
                .into());
            },
        })
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Wire-safe, zero-copy wrapper for byte 1 of a Logout Request:
/// `F(1) | ReasonCode(7)`.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawLogoutReason(u8);

impl Default for RawLogoutReason {
    #[inline]
    fn default() -> Self {
        Self::from(LogoutReason::CloseSession)
    }
}

impl RawLogoutReason {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub fn decode(self) -> Result<LogoutReason> {
        LogoutReason::try_from(self.0 & REASON_MASK)
    }

    #[inline]
    pub fn encode(&mut self, r: LogoutReason) {
        self.0 = FINAL | r as u8;
    }
}

impl From<LogoutReason> for RawLogoutReason {
    #[inline]
    fn from(r: LogoutReason) -> Self {
        Self(FINAL | r as u8)
    }
}

impl fmt::Debug for RawLogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Ok(r) => write!(f, "RawLogoutReason({r})"),
            Err(_) => write!(f, "RawLogoutReason(0x{:02x})", self.0),
        }
    }
}

/// iSCSI Logout Response Code (RFC 3720 § 10.15.1)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogoutResponseCode {
    /// connection or session closed successfully
    #[default]
    Success = 0x00,
    /// CID not found
    CidNotFound = 0x01,
    /// connection recovery is not supported
    RecoveryNotSupported = 0x02,
    /// cleanup failed for various reasons
    CleanupFailed = 0x03,
}

impl TryFrom<u8> for LogoutResponseCode {
    type Error = anyhow::Error;

    fn try_from(v: u8) -> Result<Self> {
        Ok(match v {
            0x00 => LogoutResponseCode::Success,
            0x01 => LogoutResponseCode::CidNotFound,
            0x02 => LogoutResponseCode::RecoveryNotSupported,
            0x03 => LogoutResponseCode::CleanupFailed,
            other => {
                return Err(CodecError::InvalidField {
                    field: "logout response",
                    value: other,
                }
                .into());
            },
        })
    }
}

impl fmt::Display for LogoutResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Wire-safe, zero-copy wrapper for the Logout Response code (byte 2).
#[repr(transparent)]
#[derive(
    Copy, Clone, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawLogoutResponseCode(u8);

impl RawLogoutResponseCode {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub fn decode(self) -> Result<LogoutResponseCode> {
        LogoutResponseCode::try_from(self.0)
    }

    #[inline]
    pub fn encode(&mut self, c: LogoutResponseCode) {
        self.0 = c as u8;
    }
}

impl fmt::Debug for RawLogoutResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Ok(c) => write!(f, "RawLogoutResponseCode({c})"),
            Err(_) => write!(f, "RawLogoutResponseCode(0x{:02x})", self.0),
        }
    }
}
