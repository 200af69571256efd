// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, io, str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cfg::config::Config,
    client::{
        Failure,
        common::{ExpStatSn, RawPdu, io_cancellable, io_with_timeout},
    },
    events::{Control, EventSender, PduEvent},
    models::{
        common::{HEADER_LEN, MAX_DATA_SEGMENT_LENGTH, PduView, decode_bhs},
        parse::Pdu,
    },
    state_machine::connection_states::{ConnectionEvent, ConnectionMachine},
};

/// Well-known iSCSI port.
pub const DEFAULT_PORT: u16 = 3260;

/// `host[:port]` of a target portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Portal {
    pub host: String,
    pub port: u16,
}

impl FromStr for Portal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        ensure!(!s.is_empty(), "empty portal");

        let parse_port = |p: &str| -> Result<u16> {
            p.parse().with_context(|| format!("bad port {p:?} in portal {s:?}"))
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .with_context(|| format!("unterminated IPv6 literal in {s:?}"))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => parse_port(
                    tail.strip_prefix(':')
                        .with_context(|| format!("garbage after IPv6 literal in {s:?}"))?,
                )?,
            };
            (host, port)
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, parse_port(port)?),
                // bare IPv6 literal
                Some(_) => (s, DEFAULT_PORT),
                None => (s, DEFAULT_PORT),
            }
        };
        ensure!(!host.is_empty(), "empty host in portal {s:?}");

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Opens the byte stream a connection runs over.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    fn connect(&self, portal: &Portal) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, portal: &Portal) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let host = portal.host.clone();
        let port = portal.port;
        async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        }
    }
}

/// Timeouts and limits a connection runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    /// Ceiling for outgoing data segments. The session checks the limit the
    /// target negotiated before it queues a request.
    pub max_send_data_segment_length: usize,
}

impl ConnectionOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            connect_timeout: cfg.runtime.timeout_connection,
            io_timeout: cfg.runtime.timeout_io,
            max_send_data_segment_length: MAX_DATA_SEGMENT_LENGTH as usize,
        }
    }
}

/// Running connection: a sender task draining the outbound queue and a
/// receiver task framing inbound PDUs onto the session's PDU bus.
///
/// The protocol state of the connection lives with the session; this handle
/// only owns the I/O.
#[derive(Debug)]
pub struct Connection {
    cid: u16,
    exp_stat_sn: Arc<ExpStatSn>,
    outbound: UnboundedSender<Pdu>,
    control: UnboundedSender<Control>,
    cancel: CancellationToken,
    sender: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
}

impl Connection {
    /// Connects to `portal`, driving `machine` through TransportWait to
    /// InLogin, or back to Free when the transport cannot be set up.
    pub async fn establish<C: Connector>(
        cid: u16,
        machine: &mut ConnectionMachine,
        connector: &C,
        portal: &Portal,
        bus: EventSender<PduEvent>,
        opts: ConnectionOptions,
    ) -> Result<Self> {
        machine.apply(ConnectionEvent::ConnectionRequested);

        let failure = match timeout(opts.connect_timeout, connector.connect(portal)).await {
            Ok(Ok(stream)) => {
                machine.apply(ConnectionEvent::ConnectionEstablished);
                info!("cid={cid} connected to {portal}");
                return Ok(Self::spawn(cid, stream, bus, opts));
            },
            Ok(Err(e)) => Failure::Transport(format!("connect to {portal}: {e}")),
            Err(_) => Failure::Transport(format!(
                "connect to {portal} timed out after {:?}",
                opts.connect_timeout
            )),
        };
        machine.apply(ConnectionEvent::ConnectionEstablishFailed);
        Err(failure.into())
    }

    /// Starts the sender and receiver tasks over an already open stream.
    pub fn spawn<S>(cid: u16, stream: S, bus: EventSender<PduEvent>, opts: ConnectionOptions) -> Self
    where S: AsyncRead + AsyncWrite + Send + 'static {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let exp_stat_sn = Arc::new(ExpStatSn::default());

        let sender = tokio::spawn(run_sender(SenderCtx {
            cid,
            writer,
            pdus: outbound_rx,
            control: control_rx,
            exp_stat_sn: exp_stat_sn.clone(),
            opts,
            cancel: cancel.clone(),
            bus: bus.clone(),
        }));
        let receiver = tokio::spawn(run_receiver(cid, reader, bus, cancel.clone()));

        Self {
            cid,
            exp_stat_sn,
            outbound,
            control,
            cancel,
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    #[inline]
    pub fn cid(&self) -> u16 {
        self.cid
    }

    /// Shared ExpStatSN cell stamped by the sender task.
    pub fn exp_stat_sn(&self) -> Arc<ExpStatSn> {
        self.exp_stat_sn.clone()
    }

    /// Queues a PDU; sends are strictly FIFO.
    pub fn send(&self, pdu: Pdu) -> Result<()> {
        self.outbound
            .send(pdu)
            .map_err(|_| Failure::Transport(format!("cid={} sender has stopped", self.cid)))?;
        Ok(())
    }

    /// Lets the sender drain its queue, then stops the receiver.
    pub async fn shutdown(mut self) {
        let _ = self.control.send(Control::Exit);
        if let Some(sender) = self.sender.take() {
            if let Err(e) = sender.await {
                warn!("cid={} sender task failed: {e}", self.cid);
            }
        }
        self.cancel.cancel();
        if let Some(receiver) = self.receiver.take() {
            if let Err(e) = receiver.await {
                warn!("cid={} receiver task failed: {e}", self.cid);
            }
        }
        debug!("cid={} shut down", self.cid);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SenderCtx<W> {
    cid: u16,
    writer: W,
    pdus: UnboundedReceiver<Pdu>,
    control: UnboundedReceiver<Control>,
    exp_stat_sn: Arc<ExpStatSn>,
    opts: ConnectionOptions,
    cancel: CancellationToken,
    bus: EventSender<PduEvent>,
}

impl<W: AsyncWrite + Unpin> SenderCtx<W> {
    /// Stamps ExpStatSN and serializes. Errors here are local to the PDU.
    fn encode(&self, mut pdu: Pdu) -> Result<([u8; HEADER_LEN], Vec<u8>)> {
        if let Some(sn) = self.exp_stat_sn.stamp() {
            pdu.set_exp_stat_sn(sn)?;
        }
        let frame = pdu.encode(self.opts.max_send_data_segment_length)?;
        debug!("cid={} -> {pdu:?}", self.cid);
        Ok(frame)
    }

    async fn write(&mut self, pdu: Pdu) -> Result<()> {
        let itt = pdu.itt().ok();
        let (header, body) = match self.encode(pdu) {
            Ok(frame) => frame,
            Err(e) => {
                error!("cid={} dropping PDU that cannot be encoded: {e:#}", self.cid);
                self.bus.notify(PduEvent::SendFailed {
                    cid: self.cid,
                    itt,
                    reason: format!("{e:#}"),
                });
                return Ok(());
            },
        };

        let io = self.opts.io_timeout;
        io_with_timeout("write BHS", self.writer.write_all(&header), io, &self.cancel).await?;
        if !body.is_empty() {
            io_with_timeout("write data", self.writer.write_all(&body), io, &self.cancel)
                .await?;
        }
        io_with_timeout("flush", self.writer.flush(), io, &self.cancel).await
    }
}

async fn run_sender<W: AsyncWrite + Unpin>(mut ctx: SenderCtx<W>) {
    loop {
        let pdu = tokio::select! {
            biased;
            pdu = ctx.pdus.recv() => match pdu {
                Some(pdu) => pdu,
                None => break,
            },
            _ = ctx.control.recv() => {
                while let Ok(pdu) = ctx.pdus.try_recv() {
                    if let Err(e) = ctx.write(pdu).await {
                        warn!("cid={} dropping queued PDU on exit: {e:#}", ctx.cid);
                        break;
                    }
                }
                break;
            },
        };

        if let Err(e) = ctx.write(pdu).await {
            error!("cid={} send failed: {e:#}", ctx.cid);
            if !ctx.cancel.is_cancelled() {
                ctx.bus.notify(PduEvent::TransportClosed {
                    cid: ctx.cid,
                    reason: format!("{e:#}"),
                });
            }
            break;
        }
    }
    if let Err(e) = ctx.writer.shutdown().await {
        debug!("cid={} write side already closed: {e}", ctx.cid);
    }
}

/// Reads one frame: the BHS, then AHS + data + padding as announced by it.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    cancel: &CancellationToken,
) -> Result<RawPdu> {
    let mut header = [0u8; HEADER_LEN];
    io_cancellable("read BHS", reader.read_exact(&mut header), cancel).await?;

    let trailing = decode_bhs(&header)?.trailing_len();
    let mut payload = vec![0u8; trailing];
    if trailing > 0 {
        io_cancellable("read data segment", reader.read_exact(&mut payload), cancel).await?;
    }

    Ok(RawPdu {
        header: Bytes::copy_from_slice(&header),
        payload: Bytes::from(payload),
    })
}

async fn run_receiver<R: AsyncRead + Unpin>(
    cid: u16,
    mut reader: R,
    bus: EventSender<PduEvent>,
    cancel: CancellationToken,
) {
    let reason = loop {
        match read_frame(&mut reader, &cancel).await {
            Ok(frame) => {
                if !bus.notify(PduEvent::Received { cid, frame }) {
                    debug!("cid={cid} session is gone, receiver exits");
                    return;
                }
            },
            Err(e) => break format!("{e:#}"),
        }
    };

    if cancel.is_cancelled() {
        debug!("cid={cid} receiver cancelled");
        return;
    }
    info!("cid={cid} transport closed: {reason}");
    bus.notify(PduEvent::TransportClosed { cid, reason });
}
