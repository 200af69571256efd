// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, RequestSequence, SendingData, decode_data_length,
        encode_ahs_length, encode_data_length, ensure_opcode, write_header,
    },
    data_fromat::{PduRole, ZeroCopyType},
    isid::Isid,
    login::common::{RawLoginFlags, Stage},
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
};

/// BHS for LoginRequest PDU
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LoginRequest {
    pub opcode: RawBhsOpcode,            // 0
    pub flags: RawLoginFlags,            // 1
    pub version_max: u8,                 // 2
    pub version_min: u8,                 // 3
    pub total_ahs_length: u8,            // 4
    pub data_segment_length: [u8; 3],    // 5..8
    pub isid: [u8; 6],                   // 8..14
    pub tsih: U16<BigEndian>,            // 14..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub cid: U16<BigEndian>,             // 20..22
    reserved1: [u8; 2],                  // 22..24
    pub cmd_sn: U32<BigEndian>,          // 24..28
    pub exp_stat_sn: U32<BigEndian>,     // 28..32
    reserved2: [u8; 16],                 // 32..48
}

impl LoginRequest {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        write_header(self.as_bytes(), buf)
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as ZFromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer LoginRequest: {e}"))?;
        ensure_opcode(&hdr.opcode, Opcode::LoginReq)?;
        Ok(hdr)
    }

    #[inline]
    pub fn isid(&self) -> Isid {
        Isid::from_raw(self.isid)
    }
}

/// Builder Login Request
///
/// Login requests are always sent with the Immediate bit set.
#[derive(Debug)]
pub struct LoginRequestBuilder {
    pub header: LoginRequest,
}

impl LoginRequestBuilder {
    pub fn new(isid: Isid, tsih: u16) -> Self {
        LoginRequestBuilder {
            header: LoginRequest {
                opcode: RawBhsOpcode::new(Opcode::LoginReq, true),
                isid: isid.raw(),
                tsih: U16::new(tsih),
                ..Default::default()
            },
        }
    }

    /// Set Transit (T = bit7)
    pub fn transit(mut self, on: bool) -> Self {
        self.header.flags.set_transit(on);
        self
    }

    /// Set Continue (C = bit6)
    pub fn cont(mut self, on: bool) -> Self {
        self.header.flags.set_cont(on);
        self
    }

    /// Set CSG (current stage: bits 3-2)
    pub fn csg(mut self, stage: Stage) -> Self {
        self.header.flags.set_csg(stage);
        self
    }

    /// Set NSG (next stage: bits 1-0)
    pub fn nsg(mut self, stage: Stage) -> Self {
        self.header.flags.set_nsg(stage);
        self
    }

    /// Maximum and minimum version of protocol
    pub fn versions(mut self, max: u8, min: u8) -> Self {
        self.header.version_max = max;
        self.header.version_min = min;
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn connection_id(mut self, cid: u16) -> Self {
        self.header.cid.set(cid);
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
}

impl SendingData for LoginRequest {
    fn get_final_bit(&self) -> bool {
        self.flags.transit()
    }

    fn set_final_bit(&mut self, on: bool) {
        self.flags.set_transit(on);
    }

    fn get_continue_bit(&self) -> bool {
        self.flags.cont()
    }

    fn set_continue_bit(&mut self, on: bool) {
        self.flags.set_cont(on);
    }
}

impl RequestSequence for LoginRequest {
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

impl FromBytes for LoginRequest {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        LoginRequest::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for LoginRequest {
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

impl PduRole for LoginRequest {
    fn as_request_mut(&mut self) -> Option<&mut dyn RequestSequence> {
        Some(self)
    }
}

impl ZeroCopyType for LoginRequest {}
