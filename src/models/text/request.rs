// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, RequestSequence, SendingData, decode_data_length,
        encode_ahs_length, encode_data_length, ensure_opcode, write_header,
    },
    data_fromat::{PduRole, ZeroCopyType},
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
    text::common::RawStageFlags,
};

/// BHS for TextRequest PDU
#[repr(C)]
#[derive(Default, Debug, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TextRequest {
    /// Byte 0: I + 6-bit opcode (`Opcode::TextReq`).
    pub opcode: RawBhsOpcode,
    /// Byte 1: F/C
    pub flags: RawStageFlags,
    reserved1: [u8; 2],
    /// Byte 4
    pub total_ahs_length: u8,
    /// Bytes 5..8
    pub data_segment_length: [u8; 3],
    /// Bytes 8..16
    pub lun: U64<BigEndian>,
    /// Bytes 16..20
    pub initiator_task_tag: U32<BigEndian>,
    /// Bytes 20..24
    pub target_task_tag: U32<BigEndian>,
    /// Bytes 24..28
    pub cmd_sn: U32<BigEndian>,
    /// Bytes 28..32
    pub exp_stat_sn: U32<BigEndian>,
    reserved2: [u8; 16],
}

impl TextRequest {
    /// Target Transfer Tag of a request that starts a new exchange.
    pub const DEFAULT_TAG: u32 = 0xFFFF_FFFF;

    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        write_header(self.as_bytes(), buf)
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as ZFromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer TextRequest: {e}"))?;
        ensure_opcode(&hdr.opcode, Opcode::TextReq)?;
        Ok(hdr)
    }
}

/// Builder for an iSCSI **Text Request** PDU (`Opcode::TextReq`).
///
/// Starts out as a single-shot request: `F` set, `C` clear, and the Target
/// Transfer Tag at the reserved `0xFFFFFFFF`.
#[derive(Debug)]
pub struct TextRequestBuilder {
    pub header: TextRequest,
}

impl Default for TextRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRequestBuilder {
    pub fn new() -> Self {
        let mut header = TextRequest {
            opcode: RawBhsOpcode::new(Opcode::TextReq, false),
            target_task_tag: U32::new(TextRequest::DEFAULT_TAG),
            ..Default::default()
        };
        header.flags.set_final_bit(true);
        TextRequestBuilder { header }
    }

    /// Set Immediate bit (Immediate = bit6)
    pub fn immediate(mut self) -> Self {
        self.header.opcode.set_i();
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn target_task_tag(mut self, tag: u32) -> Self {
        self.header.target_task_tag.set(tag);
        self
    }

    pub fn cmd_sn(mut self, sn: u32) -> Self {
        self.header.cmd_sn.set(sn);
        self
    }

    pub fn exp_stat_sn(mut self, sn: u32) -> Self {
        self.header.exp_stat_sn.set(sn);
        self
    }

    /// Set the 8-byte Logical Unit Number (LUN) in the BHS header.
    pub fn lun(mut self, lun: u64) -> Self {
        self.header.lun.set(lun);
        self
    }
}

impl SendingData for TextRequest {
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

impl RequestSequence for TextRequest {
    fn set_initiator_task_tag(&mut self, itt: u32) {
        self.initiator_task_tag.set(itt);
    }

    fn get_cmd_sn(&self) -> u32 {
        self.cmd_sn.get()
    }

    fn set_cmd_sn(&mut self, sn: u32) {
        self.cmd_sn.set(sn);
    }

    fn get_exp_stat_sn(&self) -> u32 {
        self.exp_stat_sn.get()
    }

    fn set_exp_stat_sn(&mut self, sn: u32) {
        self.exp_stat_sn.set(sn);
    }
}

impl FromBytes for TextRequest {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        TextRequest::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for TextRequest {
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

impl PduRole for TextRequest {
    fn as_request_mut(&mut self) -> Option<&mut dyn RequestSequence> {
        Some(self)
    }
}

impl ZeroCopyType for TextRequest {}
