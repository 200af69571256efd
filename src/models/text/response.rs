// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, ResponseSequence, SendingData,
        decode_data_length, encode_ahs_length, encode_data_length, ensure_opcode,
        write_header,
    },
    data_fromat::{PduRole, ZeroCopyType, response_sequence},
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
    text::common::RawStageFlags,
};

/// BHS for TextResponse PDU
#[repr(C)]
#[derive(Default, Debug, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TextResponse {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: RawStageFlags,               // 1
    reserved1: [u8; 2],                     // 2..4
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub lun: U64<BigEndian>,                // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub target_task_tag: U32<BigEndian>,    // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    reserved2: [u8; 12],                    // 36..48
}

impl TextResponse {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        write_header(self.as_bytes(), buf)
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as ZFromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer TextResponse: {e}"))?;
        ensure_opcode(&hdr.opcode, Opcode::TextResp)?;
        Ok(hdr)
    }
}

/// Builds a TextResponse the way a target would.
#[derive(Debug)]
pub struct TextResponseBuilder {
    pub header: TextResponse,
}

impl Default for TextResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TextResponseBuilder {
    pub fn new() -> Self {
        let mut header = TextResponse {
            opcode: RawBhsOpcode::new(Opcode::TextResp, false),
            target_task_tag: U32::new(0xFFFF_FFFF),
            ..Default::default()
        };
        header.flags.set_final_bit(true);
        Self { header }
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn target_task_tag(mut self, tag: u32) -> Self {
        self.header.target_task_tag.set(tag);
        self
    }

    /// Marks a partial response: `C` set, `F` clear.
    pub fn continued(mut self) -> Self {
        self.header.flags.set_final_bit(false);
        self.header.flags.set_continue_bit(true);
        self
    }

    pub fn sequence(mut self, stat_sn: u32, exp_cmd_sn: u32, max_cmd_sn: u32) -> Self {
        self.header.stat_sn.set(stat_sn);
        self.header.exp_cmd_sn.set(exp_cmd_sn);
        self.header.max_cmd_sn.set(max_cmd_sn);
        self
    }
}

impl SendingData for TextResponse {
    fn get_final_bit(&self) -> bool {
        self.flags.get_final_bit()
    }

    fn set_final_bit(&mut self, on: bool) {
        self.flags.set_final_bit(on);
    }

    fn get_continue_bit(&self) -> bool {
        self.flags.get_continue_bit()
    }

    fn set_continue_bit(&mut self, on: bool) {
        self.flags.set_continue_bit(on);
    }
}

impl ResponseSequence for TextResponse {
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

impl FromBytes for TextResponse {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        TextResponse::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for TextResponse {
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

impl PduRole for TextResponse {
    fn status_sequence(&self) -> Option<(u32, u32, u32)> {
        response_sequence(self)
    }
}

impl ZeroCopyType for TextResponse {}
