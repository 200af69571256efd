// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Initiator Session ID (RFC 3720 § 10.12.5).
//!
//! ```text
//!  byte 0        bytes 1..3   byte 3   bytes 4..6
//! +--+--------+-------------+--------+-----------+
//! |T |   A    |      B      |   C    |     D     |
//! +--+--------+-------------+--------+-----------+
//! ```
//!
//! `T` (2 bits) selects how the remaining 46 bits are interpreted:
//! * OUI:    A+B hold a 22-bit IEEE OUI, C+D a 24-bit qualifier
//! * EN:     B+C hold a 24-bit IANA enterprise number, D a qualifier
//! * Random: B+C are random, D a qualifier
//!
//! The byte layout of A/B/C/D is identical for every type.

use std::fmt;

use anyhow::Result;

use crate::models::error::CodecError;

const TYPE_SHIFT: u8 = 6;
const A_MASK: u8 = 0b0011_1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IsidType {
    Oui = 0,
    Enterprise = 1,
    Random = 2,
    Reserved = 3,
}

impl IsidType {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => IsidType::Oui,
            1 => IsidType::Enterprise,
            2 => IsidType::Random,
            _ => IsidType::Reserved,
        }
    }
}

/// 6-byte ISID. Equality is raw-byte equality.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Isid([u8; 6]);

impl Isid {
    #[inline]
    pub const fn from_raw(raw: [u8; 6]) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> [u8; 6] {
        self.0
    }

    /// Builds an ISID from its sub-fields. `a` must fit in 6 bits.
    pub fn new(kind: IsidType, a: u8, b: u16, c: u8, d: u16) -> Result<Self> {
        let mut isid = Self::default();
        isid.set_type(kind);
        isid.set_a(a)?;
        isid.set_b(b);
        isid.set_c(c);
        isid.set_d(d);
        Ok(isid)
    }

    /// Random-type template: B and C drawn at random, D starting at 1.
    pub fn random_template() -> Self {
        let mut isid = Self::default();
        isid.set_type(IsidType::Random);
        isid.set_b(rand::random::<u16>());
        isid.set_c(rand::random::<u8>());
        isid.set_d(1);
        isid
    }

    #[inline]
    pub fn kind(&self) -> IsidType {
        IsidType::from_bits(self.0[0] >> TYPE_SHIFT)
    }

    #[inline]
    pub fn set_type(&mut self, kind: IsidType) {
        self.0[0] = (self.0[0] & A_MASK) | ((kind as u8) << TYPE_SHIFT);
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[0] & A_MASK
    }

    pub fn set_a(&mut self, a: u8) -> Result<()> {
        if a > A_MASK {
            return Err(CodecError::FieldOverflow {
                field: "ISID.A",
                value: a as u64,
                max: A_MASK as u64,
            }
            .into());
        }
        self.0[0] = (self.0[0] & !A_MASK) | a;
        Ok(())
    }

    #[inline]
    pub fn b(&self) -> u16 {
        u16::from_be_bytes([self.0[1], self.0[2]])
    }

    #[inline]
    pub fn set_b(&mut self, b: u16) {
        self.0[1..3].copy_from_slice(&b.to_be_bytes());
    }

    #[inline]
    pub fn c(&self) -> u8 {
        self.0[3]
    }

    #[inline]
    pub fn set_c(&mut self, c: u8) {
        self.0[3] = c;
    }

    #[inline]
    pub fn d(&self) -> u16 {
        u16::from_be_bytes([self.0[4], self.0[5]])
    }

    #[inline]
    pub fn set_d(&mut self, d: u16) {
        self.0[4..6].copy_from_slice(&d.to_be_bytes());
    }

    /// 22-bit IEEE OUI for [`IsidType::Oui`].
    pub fn oui(&self) -> Option<u32> {
        (self.kind() == IsidType::Oui)
            .then(|| ((self.a() as u32) << 16) | self.b() as u32)
    }

    /// 24-bit IANA enterprise number for [`IsidType::Enterprise`].
    pub fn enterprise_number(&self) -> Option<u32> {
        (self.kind() == IsidType::Enterprise)
            .then(|| ((self.b() as u32) << 8) | self.c() as u32)
    }

    /// Qualifier that distinguishes sessions sharing the same naming
    /// authority.
    pub fn qualifier(&self) -> u32 {
        match self.kind() {
            IsidType::Oui => ((self.c() as u32) << 16) | self.d() as u32,
            _ => self.d() as u32,
        }
    }
}

impl From<[u8; 6]> for Isid {
    fn from(raw: [u8; 6]) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Isid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Isid({:?}, {})", self.kind(), hex::encode(self.0))
    }
}

impl fmt::Display for Isid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Hands out one ISID per session from a template, bumping D each time.
#[derive(Debug, Clone)]
pub struct IsidAllocator {
    template: Isid,
}

impl IsidAllocator {
    pub fn new(template: Isid) -> Self {
        Self { template }
    }

    /// Returns the current template and advances its D sub-field.
    pub fn next_isid(&mut self) -> Isid {
        let isid = self.template;
        self.template.set_d(self.template.d().wrapping_add(1));
        isid
    }
}

impl Default for IsidAllocator {
    fn default() -> Self {
        Self::new(Isid::random_template())
    }
}
