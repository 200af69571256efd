// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{any::type_name, fmt, marker::PhantomData};

use anyhow::{Context, Result, anyhow, bail};
use zerocopy::{FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout};

use crate::models::{
    common::{
        BasicHeaderSegment, FromBytes, HEADER_LEN, PduView, RequestSequence,
        ResponseSequence, pad_len,
    },
    error::CodecError,
    opcode::BhsOpcode,
};

pub trait ZeroCopyType: KnownLayout + Immutable + IntoBytes + ZFromBytes {}

/// One PDU: a 48-byte header buffer plus its AHS and data segment.
///
/// The header is kept as raw bytes; `header_view()` / `header_view_mut()`
/// reinterpret it as `T` without copying.
#[derive(PartialEq)]
pub struct PDUWithData<T> {
    pub header_buf: [u8; HEADER_LEN],
    pub additional_header: Vec<u8>,
    pub data: Vec<u8>,

    _marker: PhantomData<T>,
}

impl<T> Clone for PDUWithData<T> {
    fn clone(&self) -> Self {
        Self {
            header_buf: self.header_buf,
            additional_header: self.additional_header.clone(),
            data: self.data.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PDUWithData<T> {
    pub fn from_header_slice(header_buf: [u8; HEADER_LEN]) -> Self {
        Self {
            header_buf,
            additional_header: Vec::new(),
            data: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T> PDUWithData<T>
where T: BasicHeaderSegment + FromBytes + ZeroCopyType
{
    /// Wraps a header produced by one of the request builders.
    pub fn from_header(header: &T) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        header.to_bhs_bytes(&mut buf)?;
        Ok(Self::from_header_slice(buf))
    }

    /// Header view (`&T`) backed by `self.header_buf`.
    #[inline]
    pub fn header_view(&self) -> Result<&T> {
        T::ref_from_bytes(self.header_buf.as_slice()).map_err(|e| anyhow!("{e}"))
    }

    /// Mutable header view (`&mut T`) backed by `self.header_buf`.
    #[inline]
    pub fn header_view_mut(&mut self) -> Result<&mut T> {
        T::mut_from_bytes(self.header_buf.as_mut_slice()).map_err(|e| anyhow!("{e}"))
    }

    /// Appends raw bytes to the Data Segment and updates its length field.
    pub fn append_data(&mut self, more: &[u8]) -> Result<()> {
        let len = u32::try_from(self.data.len() + more.len()).map_err(|_| {
            CodecError::FieldOverflow {
                field: "DataSegmentLength",
                value: (self.data.len() + more.len()) as u64,
                max: u32::MAX as u64,
            }
        })?;
        self.header_view_mut()?.set_data_length_bytes(len)?;
        self.data.extend_from_slice(more);
        Ok(())
    }

    /// Build the final PDU: `(BHS, AHS + Data + padding)`.
    pub fn build(
        &mut self,
        max_recv_data_segment_length: usize,
    ) -> Result<([u8; HEADER_LEN], Vec<u8>)> {
        if max_recv_data_segment_length < self.data.len() {
            return Err(CodecError::PayloadTooLarge {
                len: self.data.len(),
                limit: max_recv_data_segment_length,
            }
            .into());
        }

        let ahs_len = self.additional_header.len();
        let data_len = self.data.len() as u32;
        {
            let header = self.header_view_mut()?;
            header.set_ahs_length_bytes(ahs_len)?;
            header.set_data_length_bytes(data_len)?;
        }

        let padding = pad_len(self.data.len());
        let mut body = Vec::with_capacity(ahs_len + self.data.len() + padding);
        body.extend_from_slice(&self.additional_header);
        body.extend_from_slice(&self.data);
        body.extend(std::iter::repeat_n(0u8, padding));

        Ok((self.header_buf, body))
    }

    /// Parse everything after the BHS: AHS + Data + pad(Data).
    ///
    /// The data segment starts at `48 + TotalAHSLength * 4`.
    pub fn parse_with_buff(&mut self, buf: &[u8]) -> Result<()> {
        let tn = type_name::<T>();

        let header = self.header_view().context("parsing without header_buf")?;
        let ahs_len = header.get_ahs_length_bytes();
        let data_len = header.get_data_length_bytes();

        if buf.len() < ahs_len + data_len {
            bail!(
                "{tn}: buffer {} too small for AHS({ahs_len}) + Data({data_len})",
                buf.len()
            );
        }

        self.additional_header = buf[..ahs_len].to_vec();
        self.data = buf[ahs_len..ahs_len + data_len].to_vec();
        Ok(())
    }

    /// Whole frame (header + body) as a continuous hex string.
    pub fn to_hex(&mut self, max_recv_data_segment_length: usize) -> Result<String> {
        let (header, body) = self.build(max_recv_data_segment_length)?;
        Ok(format!("{}{}", hex::encode(header), hex::encode(body)))
    }

    /// Parses a frame from hex, ignoring whitespace.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&cleaned).context("hex decode error")?;
        Self::from_frame(&bytes)
    }

    /// Parses a complete frame, checking the opcode against `T`.
    pub fn from_frame(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::BufferTooShort {
                need: HEADER_LEN,
                got: bytes.len(),
            }
            .into());
        }
        let mut header_buf = [0u8; HEADER_LEN];
        header_buf.copy_from_slice(&bytes[..HEADER_LEN]);
        T::from_bhs_bytes(&mut header_buf)?;

        let mut pdu = Self::from_header_slice(header_buf);
        pdu.parse_with_buff(&bytes[HEADER_LEN..])?;
        Ok(pdu)
    }
}

impl<T> PduView for PDUWithData<T>
where T: BasicHeaderSegment + FromBytes + ZeroCopyType + PduRole
{
    fn opcode(&self) -> Result<BhsOpcode> {
        self.header_view()?.get_opcode()
    }

    fn itt(&self) -> Result<u32> {
        Ok(self.header_view()?.get_initiator_task_tag())
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn status_sequence(&self) -> Result<Option<(u32, u32, u32)>> {
        Ok(self.header_view()?.status_sequence())
    }

    fn set_exp_stat_sn(&mut self, sn: u32) -> Result<()> {
        match self.header_view_mut()?.as_request_mut() {
            Some(req) => {
                req.set_exp_stat_sn(sn);
                Ok(())
            },
            None => bail!("{} carries no ExpStatSN", type_name::<T>()),
        }
    }

    fn encode(
        &mut self,
        max_recv_data_segment_length: usize,
    ) -> Result<([u8; HEADER_LEN], Vec<u8>)> {
        self.build(max_recv_data_segment_length)
    }
}

/// Gives every header type a uniform answer to "does it carry StatSN".
pub trait PduRole {
    fn status_sequence(&self) -> Option<(u32, u32, u32)> {
        None
    }

    /// Mutable request sequencing, if this header is a request.
    fn as_request_mut(&mut self) -> Option<&mut dyn RequestSequence> {
        None
    }
}

/// Blanket helper for response headers.
pub(crate) fn response_sequence<R: ResponseSequence>(r: &R) -> Option<(u32, u32, u32)> {
    Some((r.get_stat_sn(), r.get_exp_cmd_sn(), r.get_max_cmd_sn()))
}

pub(crate) struct HexPreview<'a>(pub &'a [u8]);

impl fmt::Debug for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX: usize = 128;
        let slice = &self.0[..self.0.len().min(MAX)];
        write!(f, "\"")?;
        for (i, b) in slice.iter().enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02x}")?;
        }
        if self.0.len() > MAX {
            write!(f, " ... (+{} bytes)", self.0.len() - MAX)?;
        }
        write!(f, "\"")
    }
}

impl<T> fmt::Debug for PDUWithData<T>
where T: BasicHeaderSegment + FromBytes + fmt::Debug + ZeroCopyType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("PDUWithData");
        match self.header_view() {
            Ok(header) => ds.field("header", header),
            Err(_) => ds.field("header_raw", &HexPreview(&self.header_buf)),
        };
        ds.field("data_len", &self.data.len());
        if self.data.is_empty() {
            ds.field("data", &r"[]");
        } else {
            ds.field("data_preview", &HexPreview(&self.data));
        }
        ds.finish()
    }
}
