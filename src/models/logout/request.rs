// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, RequestSequence, decode_data_length,
        encode_ahs_length, encode_data_length, ensure_opcode, write_header,
    },
    data_fromat::{PduRole, ZeroCopyType},
    logout::common::{LogoutReason, RawLogoutReason},
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
};

/// BHS structure for **Logout Request** (opcode `LogoutReq`)
///
/// The Data Segment of a Logout Request is always empty.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogoutRequest {
    pub opcode: RawBhsOpcode,               // 0: I|0x06
    pub reason: RawLogoutReason,            // 1: F|Reason Code
    reserved0: [u8; 2],                     // 2..4
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved1: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub cid: U16<BigEndian>,                // 20..22
    reserved2: [u8; 2],                     // 22..24
    pub cmd_sn: U32<BigEndian>,             // 24..28
    pub exp_stat_sn: U32<BigEndian>,        // 28..32
    reserved3: [u8; 16],                    // 32..48
}

impl LogoutRequest {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        write_header(self.as_bytes(), buf)
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as ZFromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer LogoutRequest: {e}"))?;
        ensure_opcode(&hdr.opcode, Opcode::LogoutReq)?;
        Ok(hdr)
    }
}

/// Builder for **Logout Request**
#[derive(Debug, Default)]
pub struct LogoutRequestBuilder {
    pub header: LogoutRequest,
}

impl LogoutRequestBuilder {
    pub fn new(reason: LogoutReason, cid: u16) -> Self {
        Self {
            header: LogoutRequest {
                opcode: RawBhsOpcode::new(Opcode::LogoutReq, false),
                reason: reason.into(),
                cid: U16::new(cid),
                ..Default::default()
            },
        }
    }

    pub fn immediate(mut self) -> Self {
        self.header.opcode.set_i();
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
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

impl RequestSequence for LogoutRequest {
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

impl FromBytes for LogoutRequest {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        LogoutRequest::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for LogoutRequest {
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

impl PduRole for LogoutRequest {
    fn as_request_mut(&mut self) -> Option<&mut dyn RequestSequence> {
        Some(self)
    }
}

impl ZeroCopyType for LogoutRequest {}
