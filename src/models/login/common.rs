// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::models::error::CodecError;

bitflags::bitflags! {
    #[derive(Default, Clone, Copy, PartialEq, Eq)]
    pub struct LoginFlags: u8 {
        /// Transit bit (next stage)
        const TRANSIT = 0x80;
        /// Continue bit (more text)
        const CONTINUE = 0x40;
        /// Current Stage bits (bits 3-2)
        const CSG_MASK = 0b0000_1100;
        /// Next Stage bits (bits 1-0)
        const NSG_MASK = 0b0000_0011;
    }
}

impl fmt::Debug for LoginFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if self.contains(LoginFlags::TRANSIT) {
            parts.push("TRANSIT");
        }
        if self.contains(LoginFlags::CONTINUE) {
            parts.push("CONTINUE");
        }

        parts.push(match (self.bits() & LoginFlags::CSG_MASK.bits()) >> 2 {
            0 => "CSG=Security",
            1 => "CSG=Operational",
            3 => "CSG=FullFeature",
            _ => "CSG=Reserved",
        });
        parts.push(match self.bits() & LoginFlags::NSG_MASK.bits() {
            0 => "NSG=Security",
            1 => "NSG=Operational",
            3 => "NSG=FullFeature",
            _ => "NSG=Reserved",
        });

        write!(f, "LoginFlags({})", parts.join("|"))
    }
}

/// Login stage. Ordered as the negotiation progresses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    #[default]
    Security = 0,
    Operational = 1,
    FullFeature = 3,
}

impl TryFrom<u8> for Stage {
    type Error = anyhow::Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Stage::Security),
            1 => Ok(Stage::Operational),
            3 => Ok(Stage::FullFeature),
            other => Err(CodecError::InvalidField {
                field: "login stage",
                value: other,
            }
            .into()),
        }
    }
}

/// Wire-safe, zero-copy wrapper for iSCSI Login Flags (one byte on the wire).
///
/// Layout (RFC 3720 § 10.12):
///   bit7: TRANSIT
///   bit6: CONTINUE
///   bits3..2: CSG (Current Stage)
///   bits1..0: NSG (Next Stage)
#[repr(transparent)]
#[derive(
    Copy, Clone, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawLoginFlags(u8);

impl RawLoginFlags {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub fn flags(self) -> LoginFlags {
        LoginFlags::from_bits_retain(self.0)
    }

    #[inline]
    pub fn transit(self) -> bool {
        self.flags().contains(LoginFlags::TRANSIT)
    }

    #[inline]
    pub fn set_transit(&mut self, on: bool) {
        let mut f = self.flags();
        f.set(LoginFlags::TRANSIT, on);
        self.0 = f.bits();
    }

    #[inline]
    pub fn cont(self) -> bool {
        self.flags().contains(LoginFlags::CONTINUE)
    }

    #[inline]
    pub fn set_cont(&mut self, on: bool) {
        let mut f = self.flags();
        f.set(LoginFlags::CONTINUE, on);
        self.0 = f.bits();
    }

    /// Current Stage (bits 3..2). The reserved encoding 2 is an error.
    #[inline]
    pub fn csg(self) -> Result<Stage> {
        Stage::try_from((self.0 & LoginFlags::CSG_MASK.bits()) >> 2)
    }

    #[inline]
    pub fn set_csg(&mut self, s: Stage) {
        self.0 = (self.0 & !LoginFlags::CSG_MASK.bits()) | ((s as u8) << 2);
    }

    /// Next Stage (bits 1..0). The reserved encoding 2 is an error.
    #[inline]
    pub fn nsg(self) -> Result<Stage> {
        Stage::try_from(self.0 & LoginFlags::NSG_MASK.bits())
    }

    #[inline]
    pub fn set_nsg(&mut self, s: Stage) {
        self.0 = (self.0 & !LoginFlags::NSG_MASK.bits()) | s as u8;
    }
}

impl From<LoginFlags> for RawLoginFlags {
    #[inline]
    fn from(f: LoginFlags) -> Self {
        Self(f.bits())
    }
}

impl fmt::Debug for RawLoginFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.flags())
    }
}
