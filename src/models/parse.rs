// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use enum_dispatch::enum_dispatch;

use crate::models::{
    common::{BasicHeaderSegment, FromBytes, HEADER_LEN, PduView, decode_bhs},
    data_fromat::{PDUWithData, ZeroCopyType},
    error::CodecError,
    login::{request::LoginRequest, response::LoginResponse},
    logout::{request::LogoutRequest, response::LogoutResponse},
    opcode::{BhsOpcode, Opcode},
    text::{request::TextRequest, response::TextResponse},
};

/// Every control PDU this initiator sends or understands.
#[enum_dispatch(PduView)]
#[derive(Debug, Clone)]
pub enum Pdu {
    LoginRequest(PDUWithData<LoginRequest>),
    LoginResponse(PDUWithData<LoginResponse>),
    TextRequest(PDUWithData<TextRequest>),
    TextResponse(PDUWithData<TextResponse>),
    LogoutRequest(PDUWithData<LogoutRequest>),
    LogoutResponse(PDUWithData<LogoutResponse>),
}

impl Pdu {
    /// Decodes a PDU from its 48-byte header and everything that followed it
    /// on the wire.
    pub fn from_parts(header: [u8; HEADER_LEN], body: &[u8]) -> Result<Self> {
        let opcode = decode_bhs(&header)?.get_opcode()?.opcode;

        fn typed<T>(header: [u8; HEADER_LEN], body: &[u8]) -> Result<PDUWithData<T>>
        where T: BasicHeaderSegment + FromBytes + ZeroCopyType {
            let mut header = header;
            T::from_bhs_bytes(&mut header)?;
            let mut pdu = PDUWithData::<T>::from_header_slice(header);
            pdu.parse_with_buff(body)?;
            Ok(pdu)
        }

        Ok(match opcode {
            Opcode::LoginReq => Pdu::LoginRequest(typed(header, body)?),
            Opcode::LoginResp => Pdu::LoginResponse(typed(header, body)?),
            Opcode::TextReq => Pdu::TextRequest(typed(header, body)?),
            Opcode::TextResp => Pdu::TextResponse(typed(header, body)?),
            Opcode::LogoutReq => Pdu::LogoutRequest(typed(header, body)?),
            Opcode::LogoutResp => Pdu::LogoutResponse(typed(header, body)?),
            other => return Err(CodecError::UnsupportedOpcode(other).into()),
        })
    }

    /// Whether the Immediate bit is set.
    pub fn is_immediate(&self) -> bool {
        self.opcode().map(|op| op.immediate).unwrap_or(false)
    }
}

/// Decodes one complete frame (BHS + AHS + padded data) into its variant.
///
/// The variant is chosen by the opcode in byte 0; the BHS must be complete.
pub fn decode_pdu(bytes: &[u8]) -> Result<Pdu> {
    decode_bhs(bytes)?;
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    Pdu::from_parts(header, &bytes[HEADER_LEN..])
}
