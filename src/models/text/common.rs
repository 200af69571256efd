// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageFlags: u8 {
        const FINAL     = 0b1000_0000; // bit7
        const CONTINUE  = 0b0100_0000; // bit6
    }
}

/// Byte 1 of Text Request / Text Response.
#[repr(transparent)]
#[derive(
    Copy, Clone, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawStageFlags(u8);

impl RawStageFlags {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub fn flags(self) -> StageFlags {
        StageFlags::from_bits_retain(self.0)
    }

    #[inline]
    pub fn get_final_bit(self) -> bool {
        self.flags().contains(StageFlags::FINAL)
    }

    #[inline]
    pub fn set_final_bit(&mut self, on: bool) {
        let mut f = self.flags();
        f.set(StageFlags::FINAL, on);
        self.0 = f.bits();
    }

    #[inline]
    pub fn get_continue_bit(self) -> bool {
        self.flags().contains(StageFlags::CONTINUE)
    }

    #[inline]
    pub fn set_continue_bit(&mut self, on: bool) {
        let mut f = self.flags();
        f.set(StageFlags::CONTINUE, on);
        self.0 = f.bits();
    }
}

impl fmt::Debug for RawStageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.flags())
    }
}
