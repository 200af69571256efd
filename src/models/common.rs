// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use enum_dispatch::enum_dispatch;
use zerocopy::{BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::models::{
    error::CodecError,
    opcode::{BhsOpcode, Opcode, RawBhsOpcode},
};

/// Length of every Basic Header Segment.
pub const HEADER_LEN: usize = 48;

/// Largest value representable by the 24-bit DataSegmentLength field.
pub const MAX_DATA_SEGMENT_LENGTH: u32 = 0x00FF_FFFF;

/// Bytes needed to pad `n` up to the next 4-byte boundary.
#[inline]
pub fn pad_len(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Reads the 24-bit DataSegmentLength (BHS bytes 5..8).
#[inline]
pub fn decode_data_length(raw: [u8; 3]) -> usize {
    u32::from_be_bytes([0, raw[0], raw[1], raw[2]]) as usize
}

/// Encodes a DataSegmentLength, refusing anything wider than 24 bits.
#[inline]
pub fn encode_data_length(len: u32) -> Result<[u8; 3]> {
    if len > MAX_DATA_SEGMENT_LENGTH {
        return Err(CodecError::FieldOverflow {
            field: "DataSegmentLength",
            value: len as u64,
            max: MAX_DATA_SEGMENT_LENGTH as u64,
        }
        .into());
    }
    let be = len.to_be_bytes();
    Ok([be[1], be[2], be[3]])
}

/// Encodes an AHS length given in bytes into TotalAHSLength (4-byte words).
#[inline]
pub fn encode_ahs_length(len: usize) -> Result<u8> {
    if len % 4 != 0 || len / 4 > u8::MAX as usize {
        return Err(CodecError::FieldOverflow {
            field: "TotalAHSLength",
            value: len as u64,
            max: (u8::MAX as u64) * 4,
        }
        .into());
    }
    Ok((len / 4) as u8)
}

/// Common functionality for any iSCSI PDU "Basic Header Segment" (BHS).
///
/// Setters for fields narrower than their Rust type are fallible: a value that
/// does not fit is rejected with [`CodecError::FieldOverflow`] instead of being
/// silently truncated.
pub trait BasicHeaderSegment {
    /// Serialize the header into a 48-byte buffer.
    fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()>;

    /// first u8 of BHS
    fn get_opcode(&self) -> Result<BhsOpcode>;

    fn get_initiator_task_tag(&self) -> u32;

    /// Number of AHS bytes (always a multiple of 4).
    fn get_ahs_length_bytes(&self) -> usize;

    fn set_ahs_length_bytes(&mut self, len: usize) -> Result<()>;

    /// Number of actual payload bytes in the DataSegment, padding excluded.
    fn get_data_length_bytes(&self) -> usize;

    fn set_data_length_bytes(&mut self, len: u32) -> Result<()>;
}

/// F/C bits of PDUs that can split their payload across several PDUs.
pub trait SendingData {
    fn get_final_bit(&self) -> bool;

    fn set_final_bit(&mut self, on: bool);

    fn get_continue_bit(&self) -> bool;

    fn set_continue_bit(&mut self, on: bool);
}

/// Sequence numbers stamped by the initiator on every request.
pub trait RequestSequence {
    fn set_initiator_task_tag(&mut self, itt: u32);

    fn get_cmd_sn(&self) -> u32;

    fn set_cmd_sn(&mut self, sn: u32);

    fn get_exp_stat_sn(&self) -> u32;

    fn set_exp_stat_sn(&mut self, sn: u32);
}

/// Sequence numbers reported by the target on every response.
pub trait ResponseSequence {
    fn get_stat_sn(&self) -> u32;

    fn get_exp_cmd_sn(&self) -> u32;

    fn get_max_cmd_sn(&self) -> u32;
}

/// Typed in-place view over a raw 48-byte buffer.
pub trait FromBytes: Sized {
    fn from_bhs_bytes(bytes: &mut [u8]) -> Result<&mut Self>;
}

/// Accessors shared by every decoded PDU, dispatched over
/// [`crate::models::parse::Pdu`].
#[enum_dispatch]
pub trait PduView {
    /// Typed opcode of the header.
    fn opcode(&self) -> Result<BhsOpcode>;

    fn itt(&self) -> Result<u32>;

    /// Data segment, padding excluded.
    fn data(&self) -> &[u8];

    /// `(StatSN, ExpCmdSN, MaxCmdSN)` for target responses.
    fn status_sequence(&self) -> Result<Option<(u32, u32, u32)>>;

    /// Stamp ExpStatSN; fails for target responses.
    fn set_exp_stat_sn(&mut self, sn: u32) -> Result<()>;

    /// Serialize to `(header, padded body)`.
    fn encode(&mut self, max_recv_data_segment_length: usize)
    -> Result<([u8; HEADER_LEN], Vec<u8>)>;
}

/// Opcode-agnostic view of a BHS: only the fields every PDU shares.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Bhs {
    /// Byte 0: I + opcode
    pub opcode: RawBhsOpcode,
    /// Byte 1: F + opcode-specific flags
    pub flags: u8,
    opcode_specific: [u8; 2],
    /// Byte 4: AHS length in 4-byte words
    pub total_ahs_length: u8,
    /// Bytes 5..8
    pub data_segment_length: [u8; 3],
    /// Bytes 8..16: LUN, or ISID + TSIH for Login
    pub lun_or_isid: [u8; 8],
    /// Bytes 16..20
    pub initiator_task_tag: U32<BigEndian>,
    specific: [u8; 28],
}

impl Bhs {
    pub const FINAL: u8 = 0x80;

    #[inline]
    pub fn get_opcode(&self) -> Result<BhsOpcode> {
        BhsOpcode::try_from(self.opcode.raw())
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.flags & Self::FINAL != 0
    }

    #[inline]
    pub fn ahs_length_bytes(&self) -> usize {
        self.total_ahs_length as usize * 4
    }

    #[inline]
    pub fn data_length_bytes(&self) -> usize {
        decode_data_length(self.data_segment_length)
    }

    /// Bytes that follow the BHS on the wire: AHS plus padded data segment.
    #[inline]
    pub fn trailing_len(&self) -> usize {
        let data = self.data_length_bytes();
        self.ahs_length_bytes() + data + pad_len(data)
    }
}

/// Decodes the common BHS fields from the first 48 bytes of `bytes`.
pub fn decode_bhs(bytes: &[u8]) -> Result<&Bhs> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::BufferTooShort {
            need: HEADER_LEN,
            got: bytes.len(),
        }
        .into());
    }
    Bhs::ref_from_bytes(&bytes[..HEADER_LEN])
        .map_err(|e| anyhow::anyhow!("failed convert buffer Bhs: {e}"))
}

/// Checks the opcode of a typed header against the expected one.
#[inline]
pub(crate) fn ensure_opcode(raw: &RawBhsOpcode, expected: Opcode) -> Result<()> {
    if raw.opcode_known() != Some(expected) {
        return Err(CodecError::OpcodeMismatch {
            expected,
            got: raw.opcode_raw(),
        }
        .into());
    }
    Ok(())
}

/// Copies a typed header into a 48-byte buffer.
#[inline]
pub(crate) fn write_header(bytes: &[u8], buf: &mut [u8]) -> Result<()> {
    if buf.len() != HEADER_LEN {
        anyhow::bail!("buffer length must be {HEADER_LEN}, got {}", buf.len());
    }
    buf.copy_from_slice(bytes);
    Ok(())
}
