// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::models::{common::HEADER_LEN, parse::Pdu};

pub(crate) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context(label)),
                Err(_) => Err(anyhow!("{label} timeout")),
            }
        }
    }
}

/// Like [`io_with_timeout`] for reads that may legitimately idle.
pub(crate) async fn io_cancellable<F, T>(
    label: &'static str,
    fut: F,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(anyhow!("{label} cancelled")),
        res = fut => res.context(label),
    }
}

/// One framed PDU as read off the wire, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPdu {
    /// Basic Header Segment, exactly 48 bytes.
    pub header: Bytes,
    /// AHS + data segment + padding.
    pub payload: Bytes,
}

impl RawPdu {
    pub fn decode(&self) -> Result<Pdu> {
        let header: [u8; HEADER_LEN] = self
            .header
            .as_ref()
            .try_into()
            .context("BHS must be exactly 48 bytes")?;
        Pdu::from_parts(header, &self.payload)
    }
}

/// ExpStatSN of one connection.
///
/// Unset until the first status arrives; after that every stamped request
/// carries the current value and advances it.
#[derive(Debug)]
pub struct ExpStatSn(AtomicU64);

impl ExpStatSn {
    const UNSET: u64 = u64::MAX;

    /// First call wins; later calls are ignored. Returns whether it stored.
    pub fn set_once(&self, sn: u32) -> bool {
        self.0
            .compare_exchange(Self::UNSET, sn as u64, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn get(&self) -> Option<u32> {
        let v = self.0.load(Ordering::Acquire);
        (v != Self::UNSET).then_some(v as u32)
    }

    /// Current value, advancing it by one (wrapping). `None` while unset.
    pub fn stamp(&self) -> Option<u32> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v != Self::UNSET).then(|| (v as u32).wrapping_add(1) as u64)
            })
            .ok()
            .map(|prev| prev as u32)
    }
}

impl Default for ExpStatSn {
    fn default() -> Self {
        Self(AtomicU64::new(Self::UNSET))
    }
}
