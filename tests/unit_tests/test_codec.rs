// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use hex_literal::hex;
use iscsi_initiator_rs::{
    keys::{self, KeyName, KeyValue},
    models::{
        common::{
            HEADER_LEN, PduView, decode_bhs, encode_ahs_length, encode_data_length, pad_len,
        },
        data_fromat::PDUWithData,
        error::CodecError,
        login::{
            common::{RawLoginFlags, Stage},
            request::{LoginRequest, LoginRequestBuilder},
            response::{LoginResponse, LoginResponseBuilder},
        },
        logout::{
            common::{LogoutReason, LogoutResponseCode},
            request::LogoutRequestBuilder,
            response::LogoutResponseBuilder,
        },
        opcode::Opcode,
        parse::{Pdu, decode_pdu},
        text::{request::TextRequestBuilder, response::TextResponseBuilder},
    },
};

use super::common::isid;

fn frame(header: [u8; HEADER_LEN], body: &[u8]) -> Vec<u8> {
    let mut out = header.to_vec();
    out.extend_from_slice(body);
    out
}

#[test]
fn test_login_request_layout() -> Result<()> {
    let header = LoginRequestBuilder::new(isid(), 0)
        .transit(true)
        .csg(Stage::Security)
        .nsg(Stage::Operational)
        .initiator_task_tag(0x0102_0304)
        .connection_id(1)
        .cmd_sn(1)
        .exp_stat_sn(0);

    let mut pdu = PDUWithData::<LoginRequest>::from_header(&header.header)?;
    let payload = keys::encode(&[KeyValue::new(KeyName::SessionType, "Discovery")?]);
    pdu.append_data(&payload)?;
    let (bhs, body) = pdu.build(8192)?;

    assert_eq!(bhs[0], 0x43, "immediate login request");
    assert_eq!(bhs[1], 0x81, "T=1 CSG=0 NSG=1");
    assert_eq!(bhs[4], 0, "no AHS");
    assert_eq!(&bhs[5..8], &[0, 0, payload.len() as u8]);
    assert_eq!(&bhs[8..14], &isid().raw());
    assert_eq!(&bhs[16..20], &[1, 2, 3, 4]);
    assert_eq!(&bhs[20..22], &[0, 1]);

    assert_eq!(body.len() % 4, 0);
    assert_eq!(&body[..payload.len()], payload.as_slice());
    assert!(body[payload.len()..].iter().all(|b| *b == 0));
    assert_eq!(decode_bhs(&bhs)?.trailing_len(), body.len());
    Ok(())
}

#[test]
fn test_login_request_decodes_back() -> Result<()> {
    let header = LoginRequestBuilder::new(isid(), 0x0a0b)
        .csg(Stage::Operational)
        .nsg(Stage::FullFeature)
        .initiator_task_tag(9)
        .cmd_sn(5);
    let mut pdu = PDUWithData::<LoginRequest>::from_header(&header.header)?;
    pdu.append_data(b"HeaderDigest=None\0")?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    let Pdu::LoginRequest(req) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = req.header_view()?;
    assert_eq!(hdr.isid(), isid());
    assert_eq!(hdr.tsih.get(), 0x0a0b);
    assert_eq!(hdr.flags.csg()?, Stage::Operational);
    assert_eq!(hdr.flags.nsg()?, Stage::FullFeature);
    assert_eq!(decoded.itt()?, 9);
    assert_eq!(decoded.data(), b"HeaderDigest=None\0");
    Ok(())
}

#[test]
fn test_login_response_status_bytes() -> Result<()> {
    let header = LoginResponseBuilder::new(isid(), 3)
        .initiator_task_tag(1)
        .sequence(7, 1, 8)
        .status(0x02, 0x03);
    let mut pdu = PDUWithData::from_header(&header.header)?;
    let (bhs, body) = pdu.build(8192)?;

    assert_eq!(bhs[0], 0x23);
    assert_eq!(bhs[36], 0x02);
    assert_eq!(bhs[37], 0x03);

    let Pdu::LoginResponse(resp) = decode_pdu(&frame(bhs, &body))? else {
        bail!("not a login response");
    };
    let status = resp.header_view()?.status();
    assert!(!status.is_success());
    assert_eq!(status.describe(), "target not found");
    assert_eq!(resp.status_sequence()?, Some((7, 1, 8)));
    Ok(())
}

#[test]
fn test_text_response_flags() -> Result<()> {
    let mut single = PDUWithData::from_header(&TextResponseBuilder::new().header)?;
    let (bhs, _) = single.build(8192)?;
    assert_eq!(bhs[0], 0x24);
    assert_eq!(bhs[1], 0x80);
    assert_eq!(&bhs[20..24], &[0xFF; 4], "TTT stays reserved");

    let mut partial =
        PDUWithData::from_header(&TextResponseBuilder::new().continued().header)?;
    let (bhs, _) = partial.build(8192)?;
    assert_eq!(bhs[1], 0x40);
    Ok(())
}

#[test]
fn test_logout_request_reason_byte() -> Result<()> {
    let header = LogoutRequestBuilder::new(LogoutReason::CloseConnection, 4)
        .initiator_task_tag(2)
        .cmd_sn(3);
    let mut pdu = PDUWithData::from_header(&header.header)?;
    let (bhs, body) = pdu.build(8192)?;

    assert_eq!(bhs[0], 0x06, "logout is not immediate by default");
    assert_eq!(bhs[1], 0x81);
    assert_eq!(&bhs[20..22], &[0, 4]);
    assert!(body.is_empty());
    Ok(())
}

#[test]
fn test_logout_response_from_wire() -> Result<()> {
    let bytes = hex!(
        "2680010000000000" "0000000000000000" "0000000500000000"
        "000000090000000a" "0000000b00000000" "0002001400000000"
    );
    let pdu = decode_pdu(&bytes)?;
    let Pdu::LogoutResponse(resp) = &pdu else {
        bail!("decoded as {pdu:?}");
    };
    let hdr = resp.header_view()?;
    assert_eq!(hdr.response_code()?, LogoutResponseCode::CidNotFound);
    assert_eq!(hdr.time2wait.get(), 2);
    assert_eq!(hdr.time2retain.get(), 20);
    assert_eq!(pdu.itt()?, 5);
    assert_eq!(pdu.status_sequence()?, Some((9, 10, 11)));
    Ok(())
}

#[test]
fn test_logout_response_code_out_of_range() -> Result<()> {
    let mut bytes = [0u8; HEADER_LEN];
    bytes[0] = 0x26;
    bytes[1] = 0x80;
    bytes[2] = 0x07;

    let Pdu::LogoutResponse(resp) = decode_pdu(&bytes)? else {
        bail!("not a logout response");
    };
    assert!(resp.header_view()?.response_code().is_err());
    Ok(())
}

#[test]
fn test_decode_rejects_bad_frames() {
    let short = decode_pdu(&[0u8; 10]).expect_err("short buffer");
    assert!(matches!(
        short.downcast_ref::<CodecError>(),
        Some(CodecError::BufferTooShort { need: 48, got: 10 })
    ));

    let empty = decode_pdu(&[]).expect_err("empty buffer");
    assert_eq!(
        empty.downcast_ref::<CodecError>(),
        Some(&CodecError::BufferTooShort { need: 48, got: 0 })
    );

    let mut nop_in = [0u8; HEADER_LEN];
    nop_in[0] = 0x20;
    let unsupported = decode_pdu(&nop_in).expect_err("NOP-In is not handled");
    assert_eq!(
        unsupported.downcast_ref::<CodecError>(),
        Some(&CodecError::UnsupportedOpcode(Opcode::NopIn))
    );

    let mut reserved = [0u8; HEADER_LEN];
    reserved[0] = 0x07;
    let unknown = decode_pdu(&reserved).expect_err("reserved opcode");
    assert_eq!(
        unknown.downcast_ref::<CodecError>(),
        Some(&CodecError::UnknownOpcode(0x07))
    );

    let mut truncated = [0u8; HEADER_LEN];
    truncated[0] = 0x24;
    truncated[7] = 16;
    assert!(decode_pdu(&truncated).is_err(), "data segment is missing");
}

#[test]
fn test_payload_limit_is_enforced() -> Result<()> {
    let mut pdu = PDUWithData::from_header(&TextResponseBuilder::new().header)?;
    pdu.append_data(&[b'x'; 600])?;

    let err = pdu.build(512).expect_err("600 bytes over a 512 limit");
    assert_eq!(
        err.downcast_ref::<CodecError>(),
        Some(&CodecError::PayloadTooLarge {
            len: 600,
            limit: 512
        })
    );
    Ok(())
}

#[test]
fn test_typed_header_checks_opcode() -> Result<()> {
    let mut text = PDUWithData::from_header(&TextResponseBuilder::new().header)?;
    let (mut bhs, _) = text.build(8192)?;

    let err = LoginResponse::from_bhs_bytes(&mut bhs).expect_err("text header as login");
    assert_eq!(
        err.downcast_ref::<CodecError>(),
        Some(&CodecError::OpcodeMismatch {
            expected: Opcode::LoginResp,
            got: 0x24
        })
    );
    Ok(())
}

#[test]
fn test_length_fields_refuse_overflow() {
    assert_eq!(encode_data_length(0x00FF_FFFF).ok(), Some([0xFF; 3]));
    let err = encode_data_length(0x0100_0000).expect_err("25 bits");
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::FieldOverflow {
            field: "DataSegmentLength",
            ..
        })
    ));

    assert_eq!(encode_ahs_length(8).ok(), Some(2));
    assert!(encode_ahs_length(6).is_err(), "not a multiple of 4");
    assert!(encode_ahs_length(4 * 256).is_err());
    assert_eq!(pad_len(5), 3);
    assert_eq!(pad_len(8), 0);
}

#[test]
fn test_login_request_round_trip() -> Result<()> {
    let header = LoginRequestBuilder::new(isid(), 0x0102)
        .transit(false)
        .cont(true)
        .csg(Stage::Security)
        .nsg(Stage::Operational)
        .versions(0x00, 0x00)
        .initiator_task_tag(0xdead_beef)
        .connection_id(7)
        .cmd_sn(0x1111_2222)
        .exp_stat_sn(0x3333_4444);
    let mut pdu = PDUWithData::<LoginRequest>::from_header(&header.header)?;
    pdu.append_data(b"InitiatorName=iqn.2024-01.com.example:init\0")?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    assert!(decoded.is_immediate());
    let Pdu::LoginRequest(req) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = req.header_view()?;
    assert_eq!(hdr, pdu.header_view()?);
    assert!(!hdr.flags.transit());
    assert!(hdr.flags.cont());
    assert_eq!(hdr.flags.csg()?, Stage::Security);
    assert_eq!(hdr.flags.nsg()?, Stage::Operational);
    assert_eq!((hdr.version_max, hdr.version_min), (0, 0));
    assert_eq!(hdr.isid(), isid());
    assert_eq!(hdr.tsih.get(), 0x0102);
    assert_eq!(hdr.initiator_task_tag.get(), 0xdead_beef);
    assert_eq!(hdr.cid.get(), 7);
    assert_eq!(hdr.cmd_sn.get(), 0x1111_2222);
    assert_eq!(hdr.exp_stat_sn.get(), 0x3333_4444);
    assert_eq!(req.data, pdu.data);
    Ok(())
}

#[test]
fn test_login_response_round_trip() -> Result<()> {
    let mut flags = RawLoginFlags::default();
    flags.set_transit(true);
    flags.set_csg(Stage::Operational);
    flags.set_nsg(Stage::FullFeature);
    let mut header = LoginResponseBuilder::new(isid(), 0x00aa)
        .flags(flags)
        .initiator_task_tag(0x0a0b_0c0d)
        .sequence(100, 5, 20)
        .status(0x01, 0x01);
    header.header.version_max = 0x00;
    header.header.version_active = 0x00;
    let mut pdu = PDUWithData::<LoginResponse>::from_header(&header.header)?;
    pdu.append_data(b"TargetAddress=10.0.0.1:3260,1\0")?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    assert!(!decoded.is_immediate());
    let Pdu::LoginResponse(resp) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = resp.header_view()?;
    assert_eq!(hdr, pdu.header_view()?);
    assert!(hdr.flags.transit());
    assert!(!hdr.flags.cont());
    assert_eq!(hdr.flags.csg()?, Stage::Operational);
    assert_eq!(hdr.flags.nsg()?, Stage::FullFeature);
    assert_eq!((hdr.version_max, hdr.version_active), (0, 0));
    assert_eq!(hdr.isid(), isid());
    assert_eq!(hdr.tsih.get(), 0x00aa);
    assert_eq!(hdr.initiator_task_tag.get(), 0x0a0b_0c0d);
    assert_eq!(hdr.stat_sn.get(), 100);
    assert_eq!(hdr.exp_cmd_sn.get(), 5);
    assert_eq!(hdr.max_cmd_sn.get(), 20);
    assert_eq!((hdr.status_class, hdr.status_detail), (0x01, 0x01));
    assert_eq!(resp.data, pdu.data);
    Ok(())
}

#[test]
fn test_text_request_round_trip() -> Result<()> {
    let header = TextRequestBuilder::new()
        .immediate()
        .initiator_task_tag(42)
        .target_task_tag(0x0000_1234)
        .cmd_sn(9)
        .exp_stat_sn(101)
        .lun(0x0001_0000_0000_0000);
    let mut pdu = PDUWithData::from_header(&header.header)?;
    pdu.append_data(&keys::encode(&[KeyValue::new(KeyName::SendTargets, "All")?]))?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    assert!(decoded.is_immediate());
    let Pdu::TextRequest(req) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = req.header_view()?;
    assert_eq!(hdr, pdu.header_view()?);
    assert!(hdr.flags.get_final_bit());
    assert!(!hdr.flags.get_continue_bit());
    assert_eq!(hdr.lun.get(), 0x0001_0000_0000_0000);
    assert_eq!(hdr.initiator_task_tag.get(), 42);
    assert_eq!(hdr.target_task_tag.get(), 0x0000_1234);
    assert_eq!(hdr.cmd_sn.get(), 9);
    assert_eq!(hdr.exp_stat_sn.get(), 101);
    assert_eq!(req.data, b"SendTargets=All\0");
    Ok(())
}

#[test]
fn test_text_response_round_trip() -> Result<()> {
    let mut header = TextResponseBuilder::new()
        .continued()
        .initiator_task_tag(42)
        .target_task_tag(0x0000_0077)
        .sequence(102, 10, 25);
    header.header.lun.set(3);
    let mut pdu = PDUWithData::from_header(&header.header)?;
    pdu.append_data(b"TargetName=iqn.2024-01.com.example:disk1\0")?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    assert!(!decoded.is_immediate());
    assert_eq!(decoded.status_sequence()?, Some((102, 10, 25)));
    let Pdu::TextResponse(resp) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = resp.header_view()?;
    assert_eq!(hdr, pdu.header_view()?);
    assert!(!hdr.flags.get_final_bit());
    assert!(hdr.flags.get_continue_bit());
    assert_eq!(hdr.lun.get(), 3);
    assert_eq!(hdr.initiator_task_tag.get(), 42);
    assert_eq!(hdr.target_task_tag.get(), 0x0000_0077);
    assert_eq!(hdr.stat_sn.get(), 102);
    assert_eq!(hdr.exp_cmd_sn.get(), 10);
    assert_eq!(hdr.max_cmd_sn.get(), 25);
    assert_eq!(resp.data, pdu.data);
    Ok(())
}

#[test]
fn test_logout_request_round_trip() -> Result<()> {
    let header = LogoutRequestBuilder::new(LogoutReason::RemoveConnectionForRecovery, 3)
        .immediate()
        .initiator_task_tag(0x0000_0100)
        .cmd_sn(12)
        .exp_stat_sn(104);
    let mut pdu = PDUWithData::from_header(&header.header)?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    assert!(decoded.is_immediate());
    let Pdu::LogoutRequest(req) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = req.header_view()?;
    assert_eq!(hdr, pdu.header_view()?);
    assert_eq!(hdr.reason.decode()?, LogoutReason::RemoveConnectionForRecovery);
    assert_eq!(hdr.reason.raw() & 0x80, 0x80, "final bit");
    assert_eq!(hdr.initiator_task_tag.get(), 0x0000_0100);
    assert_eq!(hdr.cid.get(), 3);
    assert_eq!(hdr.cmd_sn.get(), 12);
    assert_eq!(hdr.exp_stat_sn.get(), 104);
    assert!(req.data.is_empty());
    Ok(())
}

#[test]
fn test_logout_response_round_trip() -> Result<()> {
    let header = LogoutResponseBuilder::new(LogoutResponseCode::CleanupFailed)
        .initiator_task_tag(0x0000_0100)
        .sequence(105, 13, 28)
        .timers(2, 20);
    let mut pdu = PDUWithData::from_header(&header.header)?;
    let (bhs, body) = pdu.build(8192)?;

    let decoded = decode_pdu(&frame(bhs, &body))?;
    assert!(!decoded.is_immediate());
    let Pdu::LogoutResponse(resp) = &decoded else {
        bail!("decoded as {decoded:?}");
    };
    let hdr = resp.header_view()?;
    assert_eq!(hdr, pdu.header_view()?);
    assert_eq!(hdr.response_code()?, LogoutResponseCode::CleanupFailed);
    assert_eq!(hdr.initiator_task_tag.get(), 0x0000_0100);
    assert_eq!(hdr.stat_sn.get(), 105);
    assert_eq!(hdr.exp_cmd_sn.get(), 13);
    assert_eq!(hdr.max_cmd_sn.get(), 28);
    assert_eq!(hdr.time2wait.get(), 2);
    assert_eq!(hdr.time2retain.get(), 20);
    assert!(resp.data.is_empty());
    Ok(())
}
