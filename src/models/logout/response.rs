// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, ResponseSequence, decode_data_length,
        encode_ahs_length, encode_data_length, ensure_opcode, write_header,
    },
    data_fromat::{PduRole, ZeroCopyType, response_sequence},
    logout::common::{LogoutResponseCode, RawLogoutResponseCode},
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
};

/// BHS for **Logout Response** (opcode `LogoutResp`).
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogoutResponse {
    pub opcode: RawBhsOpcode,               // 0
    flags: u8,                              // 1: always 0x80
    pub response: RawLogoutResponseCode,    // 2
    reserved1: u8,                          // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved2: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved3: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    reserved4: [u8; 4],                     // 36..40
    pub time2wait: U16<BigEndian>,          // 40..42
    pub time2retain: U16<BigEndian>,        // 42..44
    reserved5: [u8; 4],                     // 44..48
}

impl LogoutResponse {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        write_header(self.as_bytes(), buf)
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as ZFromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer LogoutResponse: {e}"))?;
        ensure_opcode(&hdr.opcode, Opcode::LogoutResp)?;
        Ok(hdr)
    }

    #[inline]
    pub fn response_code(&self) -> Result<LogoutResponseCode> {
        self.response.decode()
    }
}

/// Builds a LogoutResponse the way a target would.
#[derive(Debug)]
pub struct LogoutResponseBuilder {
    pub header: LogoutResponse,
}

impl LogoutResponseBuilder {
    pub fn new(code: LogoutResponseCode) -> Self {
        let mut header = LogoutResponse {
            opcode: RawBhsOpcode::new(Opcode::LogoutResp, false),
            flags: 0x80,
            ..Default::default()
        };
        header.response.encode(code);
        Self { header }
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn sequence(mut self, stat_sn: u32, exp_cmd_sn: u32, max_cmd_sn: u32) -> Self {
        self.header.stat_sn.set(stat_sn);
        self.header.exp_cmd_sn.set(exp_cmd_sn);
        self.header.max_cmd_sn.set(max_cmd_sn);
        self
    }

    pub fn timers(mut self, time2wait: u16, time2retain: u16) -> Self {
        self.header.time2wait.set(time2wait);
        self.header.time2retain.set(time2retain);
        self
    }
}

impl ResponseSequence for LogoutResponse {
    fn get_stat_sn(&self) -> u32 {
        self.stat_sn.get()
    }

    fn get_exp_cmd_sn(&self) -> u32 {
        self.exp_cmd_sn.get()
    }

    fn get_max_cmd_sn(&self) -> u32 {
        self.max_cmd_sn.get()
    }
}

impl FromBytes for LogoutResponse {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        LogoutResponse::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for LogoutResponse {
    #[inline]
    fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        self.to_bhs_bytes(buf)
    }

    #[inline]
    fn get_opcode(&self) -> Result<BhsOpcode> {
        BhsOpcode::try_from(self.opcode.raw())
    }

    #[inline]
    fn get_initiator_task_tag(&self) -> u32 {
        self.initiator_task_tag.get()
    }

    #[inline]
    fn get_ahs_length_bytes(&self) -> usize {
        self.total_ahs_length as usize * 4
    }

    #[inline]
    fn set_ahs_length_bytes(&mut self, len: usize) -> Result<()> {
        self.total_ahs_length = encode_ahs_length(len)?;
        Ok(())
    }

    #[inline]
    fn get_data_length_bytes(&self) -> usize {
        decode_data_length(self.data_segment_length)
    }

    #[inline]
    fn set_data_length_bytes(&mut self, len: u32) -> Result<()> {
        self.data_segment_length = encode_data_length(len)?;
        Ok(())
    }
}

impl PduRole for LogoutResponse {
    fn status_sequence(&self) -> Option<(u32, u32, u32)> {
        response_sequence(self)
    }
}

impl ZeroCopyType for LogoutResponse {}
