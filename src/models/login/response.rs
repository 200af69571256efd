// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, ResponseSequence, SendingData,
        decode_data_length, encode_ahs_length, encode_data_length, ensure_opcode,
        write_header,
    },
    data_fromat::{PduRole, ZeroCopyType, response_sequence},
    isid::Isid,
    login::{common::RawLoginFlags, status::LoginStatus},
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
};

/// Header LoginResponse PDU
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LoginResponse {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: RawLoginFlags,               // 1
    pub version_max: u8,                    // 2
    pub version_active: u8,                 // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub isid: [u8; 6],                      // 8..14
    pub tsih: U16<BigEndian>,               // 14..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved1: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub status_class: u8,                   // 36
    pub status_detail: u8,                  // 37
    reserved2: [u8; 10],                    // 38..48
}

impl LoginResponse {
    pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()> {
        write_header(self.as_bytes(), buf)
    }

    pub fn from_bhs_bytes(buf: &mut [u8]) -> Result<&mut Self> {
        let hdr = <Self as ZFromBytes>::mut_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("failed convert buffer LoginResponse: {e}"))?;
        ensure_opcode(&hdr.opcode, Opcode::LoginResp)?;
        Ok(hdr)
    }

    #[inline]
    pub fn isid(&self) -> Isid {
        Isid::from_raw(self.isid)
    }

    #[inline]
    pub fn status(&self) -> LoginStatus {
        LoginStatus::new(self.status_class, self.status_detail)
    }
}

/// Builds a LoginResponse the way a target would.
#[derive(Debug)]
pub struct LoginResponseBuilder {
    pub header: LoginResponse,
}

impl LoginResponseBuilder {
    pub fn new(isid: Isid, tsih: u16) -> Self {
        Self {
            header: LoginResponse {
                opcode: RawBhsOpcode::new(Opcode::LoginResp, false),
                isid: isid.raw(),
                tsih: U16::new(tsih),
                ..Default::default()
            },
        }
    }

    pub fn flags(mut self, flags: RawLoginFlags) -> Self {
        self.header.flags = flags;
        self
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

    pub fn status(mut self, class: u8, detail: u8) -> Self {
        self.header.status_class = class;
        self.header.status_detail = detail;
        self
    }
}

impl SendingData for LoginResponse {
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

impl ResponseSequence for LoginResponse {
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

impl FromBytes for LoginResponse {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self> {
        LoginResponse::from_bhs_bytes(bytes)
    }
}

impl BasicHeaderSegment for LoginResponse {
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

impl PduRole for LoginResponse {
    fn status_sequence(&self) -> Option<(u32, u32, u32)> {
        response_sequence(self)
    }
}

impl ZeroCopyType for LoginResponse {}
