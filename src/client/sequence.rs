// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, warn};

/// `a < b` in 32-bit serial number arithmetic (RFC 1982).
#[inline]
pub fn sn_lt(a: u32, b: u32) -> bool {
    a != b && (b.wrapping_sub(a) as i32) > 0
}

/// CmdSN counter plus the ExpCmdSN/MaxCmdSN window reported by the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWindow {
    cmd_sn: u32,
    exp_cmd_sn: u32,
    max_cmd_sn: u32,
}

impl Default for CommandWindow {
    fn default() -> Self {
        Self {
            cmd_sn: 1,
            exp_cmd_sn: 0,
            max_cmd_sn: 1,
        }
    }
}

impl CommandWindow {
    #[inline]
    pub fn cmd_sn(&self) -> u32 {
        self.cmd_sn
    }

    #[inline]
    pub fn exp_cmd_sn(&self) -> u32 {
        self.exp_cmd_sn
    }

    #[inline]
    pub fn max_cmd_sn(&self) -> u32 {
        self.max_cmd_sn
    }

    /// CmdSN for a new command. Immediate commands carry the current value
    /// without consuming it.
    pub fn next_cmd_sn(&mut self, immediate: bool) -> u32 {
        let sn = self.cmd_sn;
        if !immediate {
            if sn_lt(self.max_cmd_sn, sn) {
                debug!(
                    "CmdSN {sn} is outside the window [{}, {}]",
                    self.exp_cmd_sn, self.max_cmd_sn
                );
            }
            self.cmd_sn = sn.wrapping_add(1);
        }
        sn
    }

    /// Applies the window carried by a response.
    ///
    /// Watermarks only move forward. A window with `MaxCmdSN < ExpCmdSN` is
    /// ignored; returns whether the update was applied.
    pub fn update(&mut self, exp_cmd_sn: u32, max_cmd_sn: u32) -> bool {
        if sn_lt(max_cmd_sn, exp_cmd_sn) {
            warn!("ignoring window update: MaxCmdSN {max_cmd_sn} < ExpCmdSN {exp_cmd_sn}");
            return false;
        }
        if sn_lt(self.exp_cmd_sn, exp_cmd_sn) {
            self.exp_cmd_sn = exp_cmd_sn;
        }
        if sn_lt(self.max_cmd_sn, max_cmd_sn) {
            self.max_cmd_sn = max_cmd_sn;
        }
        true
    }
}

/// Initiator Task Tags, unique for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IttAllocator {
    next: u32,
}

impl Default for IttAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IttAllocator {
    /// 0xFFFFFFFF is reserved and never handed out.
    pub const RESERVED: u32 = 0xFFFF_FFFF;

    pub fn next(&mut self) -> u32 {
        if self.next == Self::RESERVED {
            self.next = 0;
        }
        let itt = self.next;
        self.next = itt.wrapping_add(1);
        itt
    }

    #[inline]
    pub fn peek(&self) -> u32 {
        self.next
    }
}
