// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session negotiation and its two worker tasks.
//!
//! [`SessionCore`] does not touch the network: it turns intents and
//! received PDUs into [`Action`]s. [`Session`] owns the tasks that feed it
//! and carry those actions out.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use anyhow::Result;
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, UnboundedReceiver, UnboundedSender},
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    cfg::config::{Config, DEFAULT_MAX_RECV_DATA_SEGMENT_LENGTH},
    client::{
        Failure,
        common::{ExpStatSn, RawPdu},
        connection::{Connection, ConnectionOptions, Connector, Portal},
        sequence::{CommandWindow, IttAllocator},
    },
    events::{Control, EventBus, EventListener, EventSender, InitiatorEvent, PduEvent},
    keys::{self, KeyName, KeyValue},
    models::{
        common::{PduView, SendingData},
        data_fromat::PDUWithData,
        isid::Isid,
        login::{common::RawLoginFlags, common::Stage, request::LoginRequestBuilder, response::LoginResponse},
        logout::{
            common::{LogoutReason, LogoutResponseCode},
            request::LogoutRequestBuilder,
            response::LogoutResponse,
        },
        parse::Pdu,
        text::{request::TextRequestBuilder, response::TextResponse},
    },
    state_machine::{
        connection_states::{ConnectionEvent, ConnectionMachine, ConnectionState},
        session_states::{SessionEvent, SessionMachine, SessionState},
    },
};

/// CID of the leading connection.
pub const FIRST_CID: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Login,
    Text,
    Logout,
}

impl CommandKind {
    /// The event reporting that a command of this kind did not complete.
    pub fn failed(self, failure: Failure) -> InitiatorEvent {
        match self {
            CommandKind::Login => InitiatorEvent::LoginFailed(failure),
            CommandKind::Text => InitiatorEvent::TextFailed(failure),
            CommandKind::Logout => InitiatorEvent::LogoutFailed(failure),
        }
    }
}

/// A request that is waiting for its response, keyed by ITT.
#[derive(Debug, Clone)]
pub struct Command {
    pub itt: u32,
    pub cid: u16,
    pub kind: CommandKind,
    pub request: Pdu,
    pub response: Option<Pdu>,
}

/// Session-side view of one connection.
#[derive(Debug)]
pub struct ConnectionSlot {
    pub cid: u16,
    pub machine: ConnectionMachine,
    pub exp_stat_sn: Arc<ExpStatSn>,
    /// Keys the target answered with during login. Its
    /// MaxRecvDataSegmentLength bounds what is sent once logged in.
    pub negotiated: Vec<KeyValue>,
    /// The I/O side has been handed back for teardown.
    pub released: bool,
}

impl ConnectionSlot {
    pub fn new(cid: u16, machine: ConnectionMachine, exp_stat_sn: Arc<ExpStatSn>) -> Self {
        Self {
            cid,
            machine,
            exp_stat_sn,
            negotiated: Vec::new(),
            released: false,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Largest data segment the target accepts on this connection.
    ///
    /// Login PDUs stay within 8192 bytes; afterwards the target's declared
    /// MaxRecvDataSegmentLength applies, or 8192 when it declared none.
    pub fn send_limit(&self) -> usize {
        let default = DEFAULT_MAX_RECV_DATA_SEGMENT_LENGTH as usize;
        if self.state() == ConnectionState::InLogin {
            return default;
        }
        self.negotiated
            .iter()
            .find(|kv| kv.key() == KeyName::MaxRecvDataSegmentLength)
            .and_then(|kv| kv.numeric().ok())
            .map_or(default, |n| n as usize)
    }

    fn remember(&mut self, answered: Vec<KeyValue>) {
        for kv in answered {
            self.negotiated.retain(|known| known.key() != kv.key());
            self.negotiated.push(kv);
        }
    }
}

/// Side effects requested by [`SessionCore`], in the order they must run.
#[derive(Debug)]
pub enum Action {
    Send { cid: u16, pdu: Pdu },
    Notify(InitiatorEvent),
    /// Stop the connection's tasks and drop its socket.
    Release { cid: u16 },
}

/// Work the façade asks the session to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIntent {
    Login { cid: u16 },
    SendText { cid: u16, keys: Vec<KeyValue> },
    Logout { cid: u16 },
}

/// Login negotiation, text and logout bookkeeping for one session.
#[derive(Debug)]
pub struct SessionCore {
    config: Arc<Config>,
    isid: Isid,
    tsih: u16,
    window: CommandWindow,
    itts: IttAllocator,
    machine: SessionMachine,
    connections: BTreeMap<u16, ConnectionSlot>,
    commands: HashMap<u32, Command>,
}

impl SessionCore {
    pub fn new(config: Arc<Config>, isid: Isid) -> Self {
        Self {
            config,
            isid,
            tsih: 0,
            window: CommandWindow::default(),
            itts: IttAllocator::default(),
            machine: SessionMachine::default(),
            connections: BTreeMap::new(),
            commands: HashMap::new(),
        }
    }

    #[inline]
    pub fn isid(&self) -> Isid {
        self.isid
    }

    #[inline]
    pub fn tsih(&self) -> u16 {
        self.tsih
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn window(&self) -> &CommandWindow {
        &self.window
    }

    pub fn connection(&self, cid: u16) -> Option<&ConnectionSlot> {
        self.connections.get(&cid)
    }

    pub fn connection_state(&self, cid: u16) -> Option<ConnectionState> {
        self.connections.get(&cid).map(ConnectionSlot::state)
    }

    /// Number of requests still waiting for a response.
    pub fn outstanding(&self) -> usize {
        self.commands.len()
    }

    pub fn command(&self, itt: u32) -> Option<&Command> {
        self.commands.get(&itt)
    }

    pub fn attach(&mut self, slot: ConnectionSlot) {
        debug!("session {} attached cid={}", self.isid, slot.cid);
        self.connections.insert(slot.cid, slot);
    }

    fn ensure_session(&self, expected: SessionState, what: &str) -> Result<()> {
        let state = self.machine.state();
        if state != expected {
            return Err(Failure::InvalidState(format!(
                "{what} needs session {expected:?}, session is {state:?}"
            ))
            .into());
        }
        Ok(())
    }

    fn ensure_connection(&self, cid: u16, allowed: &[ConnectionState], what: &str) -> Result<()> {
        let Some(slot) = self.connections.get(&cid) else {
            return Err(Failure::InvalidState(format!("{what}: no connection cid={cid}")).into());
        };
        if slot.released || !allowed.contains(&slot.state()) {
            return Err(Failure::InvalidState(format!(
                "{what} not allowed on cid={cid} in {:?}",
                slot.state()
            ))
            .into());
        }
        Ok(())
    }

    /// Refuses a data segment the target on `cid` would not accept.
    fn ensure_fits(&self, cid: u16, len: usize, what: &str) -> Result<()> {
        let limit = self
            .connections
            .get(&cid)
            .map_or(DEFAULT_MAX_RECV_DATA_SEGMENT_LENGTH as usize, ConnectionSlot::send_limit);
        if len > limit {
            return Err(Failure::Protocol(format!(
                "{what} carries {len} bytes, cid={cid} accepts at most {limit}"
            ))
            .into());
        }
        Ok(())
    }

    fn register(&mut self, itt: u32, cid: u16, kind: CommandKind, request: &Pdu) {
        self.commands.insert(itt, Command {
            itt,
            cid,
            kind,
            request: request.clone(),
            response: None,
        });
    }

    /// Starts an intent, turning a refusal into the matching failure event.
    pub fn on_intent(&mut self, intent: SessionIntent) -> Vec<Action> {
        let (kind, started) = match intent {
            SessionIntent::Login { cid } => (CommandKind::Login, self.start_login(cid)),
            SessionIntent::SendText { cid, keys } => {
                (CommandKind::Text, self.start_text(cid, keys))
            },
            SessionIntent::Logout { cid } => (CommandKind::Logout, self.start_logout(cid)),
        };
        started.unwrap_or_else(|e| {
            warn!("{kind:?} refused: {e:#}");
            vec![Action::Notify(kind.failed(Failure::from_error(&e)))]
        })
    }

    /// Builds the first Login Request on `cid`.
    ///
    /// It is immediate, starts in the security stage and asks for the
    /// operational one. Transit is set only when no authentication is
    /// offered.
    pub fn start_login(&mut self, cid: u16) -> Result<Vec<Action>> {
        self.ensure_session(SessionState::Free, "login")?;
        self.ensure_connection(cid, &[ConnectionState::InLogin], "login")?;
        if self
            .commands
            .values()
            .any(|c| c.cid == cid && c.kind == CommandKind::Login)
        {
            return Err(
                Failure::InvalidState(format!("login already in progress on cid={cid}")).into(),
            );
        }

        let mut payload = self.config.session_keys()?;
        payload.extend(self.config.connection_keys()?);
        let data = keys::encode(&payload);
        self.ensure_fits(cid, data.len(), "login request")?;

        let itt = self.itts.next();
        let header = LoginRequestBuilder::new(self.isid, self.tsih)
            .transit(self.config.login.auth.is_none_only())
            .csg(Stage::Security)
            .nsg(Stage::Operational)
            .versions(0, 0)
            .initiator_task_tag(itt)
            .connection_id(cid)
            .cmd_sn(self.window.next_cmd_sn(true));

        let mut pdu = PDUWithData::from_header(&header.header)?;
        pdu.append_data(&data)?;
        let pdu = Pdu::LoginRequest(pdu);

        self.register(itt, cid, CommandKind::Login, &pdu);
        info!("session {} cid={cid} login started, ITT={itt:#010x}", self.isid);
        Ok(vec![Action::Send { cid, pdu }])
    }

    /// Builds a single-shot, non-immediate Text Request carrying `keys`.
    pub fn start_text(&mut self, cid: u16, keys: Vec<KeyValue>) -> Result<Vec<Action>> {
        self.ensure_session(SessionState::LoggedIn, "text request")?;
        self.ensure_connection(cid, &[ConnectionState::LoggedIn], "text request")?;
        let data = keys::encode(&keys);
        self.ensure_fits(cid, data.len(), "text request")?;

        let itt = self.itts.next();
        let header = TextRequestBuilder::new()
            .initiator_task_tag(itt)
            .cmd_sn(self.window.next_cmd_sn(false))
            .lun(0);

        let mut pdu = PDUWithData::from_header(&header.header)?;
        pdu.append_data(&data)?;
        let pdu = Pdu::TextRequest(pdu);

        self.register(itt, cid, CommandKind::Text, &pdu);
        debug!("cid={cid} text request ITT={itt:#010x} keys={keys:?}");
        Ok(vec![Action::Send { cid, pdu }])
    }

    /// Builds a Logout Request that closes the whole session.
    pub fn start_logout(&mut self, cid: u16) -> Result<Vec<Action>> {
        self.ensure_session(SessionState::LoggedIn, "logout")?;
        self.ensure_connection(
            cid,
            &[ConnectionState::LoggedIn, ConnectionState::LogoutRequested],
            "logout",
        )?;
        if self
            .commands
            .values()
            .any(|c| c.cid == cid && c.kind == CommandKind::Logout)
        {
            return Err(
                Failure::InvalidState(format!("logout already in progress on cid={cid}")).into(),
            );
        }

        let itt = self.itts.next();
        let header = LogoutRequestBuilder::new(LogoutReason::CloseSession, cid)
            .initiator_task_tag(itt)
            .cmd_sn(self.window.next_cmd_sn(false));
        let pdu = Pdu::LogoutRequest(PDUWithData::from_header(&header.header)?);

        if let Some(slot) = self.connections.get_mut(&cid) {
            slot.machine.apply(ConnectionEvent::LogoutRequested);
        }
        self.register(itt, cid, CommandKind::Logout, &pdu);
        info!("session {} cid={cid} logout requested", self.isid);
        Ok(vec![Action::Send { cid, pdu }])
    }

    /// Decodes a frame read on `cid`; undecodable frames are dropped.
    pub fn on_frame(&mut self, cid: u16, frame: &RawPdu) -> Vec<Action> {
        match frame.decode() {
            Ok(pdu) => self.on_pdu(cid, pdu),
            Err(e) => {
                warn!("cid={cid} dropping undecodable PDU: {e:#}");
                Vec::new()
            },
        }
    }

    pub fn on_pdu(&mut self, cid: u16, pdu: Pdu) -> Vec<Action> {
        match pdu {
            Pdu::LoginResponse(resp) => self.on_login_response(cid, resp),
            Pdu::TextResponse(resp) => self.on_text_response(cid, resp),
            Pdu::LogoutResponse(resp) => self.on_logout_response(cid, resp),
            other => {
                warn!("cid={cid} unexpected {:?} from target, dropped", other.opcode());
                Vec::new()
            },
        }
    }

    /// True when `itt` names an outstanding command of `kind`. Callers apply
    /// the response's window before asking.
    fn expects(&self, cid: u16, itt: u32, kind: CommandKind) -> bool {
        match self.commands.get(&itt) {
            Some(cmd) if cmd.kind == kind => true,
            Some(cmd) => {
                error!("cid={cid} {kind:?} response for {:?} ITT={itt:#010x}, dropped", cmd.kind);
                false
            },
            None => {
                error!("cid={cid} {kind:?} response for unknown ITT={itt:#010x}, dropped");
                false
            },
        }
    }

    fn on_login_response(&mut self, cid: u16, resp: PDUWithData<LoginResponse>) -> Vec<Action> {
        let hdr = match resp.header_view() {
            Ok(h) => h,
            Err(e) => {
                warn!("cid={cid} malformed login response: {e:#}");
                return Vec::new();
            },
        };
        let itt = hdr.initiator_task_tag.get();
        let stat_sn = hdr.stat_sn.get();
        let (exp_cmd_sn, max_cmd_sn) = (hdr.exp_cmd_sn.get(), hdr.max_cmd_sn.get());
        let status = hdr.status();
        let isid = hdr.isid();
        let tsih = hdr.tsih.get();
        let flags = hdr.flags;

        self.window.update(exp_cmd_sn, max_cmd_sn);
        if !self.expects(cid, itt, CommandKind::Login) {
            return Vec::new();
        }

        if !status.is_success() {
            return self.fail_login(cid, itt, Failure::LoginStatus(status));
        }
        if isid != self.isid {
            let why = format!("login response for ISID {isid}, session is {}", self.isid);
            return self.fail_login(cid, itt, Failure::Protocol(why));
        }
        if self.tsih == 0 {
            self.tsih = tsih;
        } else if tsih != self.tsih {
            let why = format!("TSIH changed from {} to {tsih}", self.tsih);
            return self.fail_login(cid, itt, Failure::Protocol(why));
        }
        let (csg, nsg) = match next_stages(flags) {
            Ok(stages) => stages,
            Err(e) => return self.fail_login(cid, itt, Failure::Protocol(format!("{e:#}"))),
        };

        if let Some(slot) = self.connections.get_mut(&cid) {
            slot.exp_stat_sn.set_once(stat_sn);
            match keys::decode(&resp.data) {
                Ok(answered) => slot.remember(answered),
                Err(e) => warn!("cid={cid} ignoring login keys: {e:#}"),
            }
        }
        if let Some(cmd) = self.commands.get_mut(&itt) {
            cmd.response = Some(Pdu::LoginResponse(resp));
        }

        if csg == Stage::FullFeature {
            return self.complete_login(cid, itt);
        }

        match self.follow_up_login(cid, itt, csg, nsg) {
            Ok(pdu) => {
                if let Some(cmd) = self.commands.get_mut(&itt) {
                    cmd.request = pdu.clone();
                    cmd.response = None;
                }
                debug!("cid={cid} login continues in {csg:?} towards {nsg:?}");
                vec![Action::Send { cid, pdu }]
            },
            Err(e) => self.fail_login(cid, itt, Failure::from_error(&e)),
        }
    }

    fn follow_up_login(&mut self, cid: u16, itt: u32, csg: Stage, nsg: Stage) -> Result<Pdu> {
        let header = LoginRequestBuilder::new(self.isid, self.tsih)
            .transit(true)
            .csg(csg)
            .nsg(nsg)
            .versions(0, 0)
            .initiator_task_tag(itt)
            .connection_id(cid)
            .cmd_sn(self.window.next_cmd_sn(true));

        let mut pdu = PDUWithData::from_header(&header.header)?;
        if csg == Stage::Operational {
            let data = keys::encode(&self.config.operational_keys()?);
            self.ensure_fits(cid, data.len(), "login request")?;
            pdu.append_data(&data)?;
        }
        Ok(Pdu::LoginRequest(pdu))
    }

    fn complete_login(&mut self, cid: u16, itt: u32) -> Vec<Action> {
        if let Some(slot) = self.connections.get_mut(&cid) {
            slot.machine.apply(ConnectionEvent::LoginFinalSuccess);
        }
        self.machine.apply(SessionEvent::LoginSucceeded);
        self.commands.remove(&itt);
        info!("session {} logged in, TSIH={}", self.isid, self.tsih);
        vec![Action::Notify(InitiatorEvent::LoggedIn { tsih: self.tsih })]
    }

    fn fail_login(&mut self, cid: u16, itt: u32, failure: Failure) -> Vec<Action> {
        error!("session {} cid={cid} login failed: {failure}", self.isid);
        self.commands.remove(&itt);

        let mut actions = Vec::new();
        if let Some(slot) = self.connections.get_mut(&cid) {
            slot.machine.apply(ConnectionEvent::CloseSession);
            if !slot.released {
                slot.released = true;
                actions.push(Action::Release { cid });
            }
        }
        self.machine.apply(SessionEvent::LoginFailed);
        actions.push(Action::Notify(InitiatorEvent::LoginFailed(failure)));
        actions
    }

    fn on_text_response(&mut self, cid: u16, resp: PDUWithData<TextResponse>) -> Vec<Action> {
        let hdr = match resp.header_view() {
            Ok(h) => h,
            Err(e) => {
                warn!("cid={cid} malformed text response: {e:#}");
                return Vec::new();
            },
        };
        let itt = hdr.initiator_task_tag.get();
        let (exp_cmd_sn, max_cmd_sn) = (hdr.exp_cmd_sn.get(), hdr.max_cmd_sn.get());
        let (fin, cont) = (hdr.get_final_bit(), hdr.get_continue_bit());

        self.window.update(exp_cmd_sn, max_cmd_sn);
        if !self.expects(cid, itt, CommandKind::Text) {
            return Vec::new();
        }
        self.commands.remove(&itt);

        if !fin || cont {
            warn!("cid={cid} ITT={itt:#010x} multi-part text response (F={fin} C={cont}) is not supported");
            let failure = Failure::Protocol("multi-part text responses are not supported".into());
            return vec![Action::Notify(InitiatorEvent::TextFailed(failure))];
        }

        match keys::decode(&resp.data) {
            Ok(answered) => {
                debug!("cid={cid} text response ITT={itt:#010x}: {} keys", answered.len());
                vec![Action::Notify(InitiatorEvent::TextResponse(answered))]
            },
            Err(e) => {
                let failure = Failure::Protocol(format!("undecodable text response: {e:#}"));
                vec![Action::Notify(InitiatorEvent::TextFailed(failure))]
            },
        }
    }

    fn on_logout_response(&mut self, cid: u16, resp: PDUWithData<LogoutResponse>) -> Vec<Action> {
        let hdr = match resp.header_view() {
            Ok(h) => h,
            Err(e) => {
                warn!("cid={cid} malformed logout response: {e:#}");
                return Vec::new();
            },
        };
        let itt = hdr.initiator_task_tag.get();
        let (exp_cmd_sn, max_cmd_sn) = (hdr.exp_cmd_sn.get(), hdr.max_cmd_sn.get());
        let (time2wait, time2retain) = (hdr.time2wait.get(), hdr.time2retain.get());
        let code = hdr.response_code();

        self.window.update(exp_cmd_sn, max_cmd_sn);
        if !self.expects(cid, itt, CommandKind::Logout) {
            return Vec::new();
        }
        self.commands.remove(&itt);
        debug!("cid={cid} logout response Time2Wait={time2wait} Time2Retain={time2retain}");

        let mut actions = Vec::new();
        match code {
            Ok(LogoutResponseCode::Success) => {
                self.machine.apply(SessionEvent::LogoutSucceeded);
                if let Some(slot) = self.connections.get_mut(&cid) {
                    slot.released = true;
                }
                actions.push(Action::Release { cid });
                info!("session {} logged out", self.isid);
                actions.push(Action::Notify(InitiatorEvent::LoggedOut));
            },
            other => {
                let failure = match other {
                    Ok(code) => Failure::LogoutResponse(code),
                    Err(e) => Failure::Protocol(format!("{e:#}")),
                };
                if let Some(slot) = self.connections.get_mut(&cid) {
                    slot.machine.apply(ConnectionEvent::LogoutFailure);
                    slot.released = true;
                }
                actions.push(Action::Release { cid });
                error!("session {} logout failed: {failure}", self.isid);
                actions.push(Action::Notify(InitiatorEvent::LogoutFailed(failure)));
            },
        }
        actions
    }

    /// A request queued on `cid` never made it onto the wire: its command
    /// fails like a rejected one.
    pub fn on_send_failed(&mut self, cid: u16, itt: Option<u32>, reason: &str) -> Vec<Action> {
        let Some((itt, kind)) = itt
            .and_then(|itt| self.commands.get(&itt))
            .map(|cmd| (cmd.itt, cmd.kind))
        else {
            warn!("cid={cid} unsent PDU belongs to no command: {reason}");
            return Vec::new();
        };

        let failure = Failure::Protocol(format!("request not sent: {reason}"));
        if kind == CommandKind::Login {
            return self.fail_login(cid, itt, failure);
        }
        self.commands.remove(&itt);
        error!("cid={cid} {kind:?} ITT={itt:#010x} not sent: {reason}");
        vec![Action::Notify(kind.failed(failure))]
    }

    /// The transport under `cid` went away: every command still waiting on
    /// it fails.
    pub fn on_transport_closed(&mut self, cid: u16, reason: &str) -> Vec<Action> {
        let Some(slot) = self.connections.get_mut(&cid) else {
            debug!("transport closed on unknown cid={cid}: {reason}");
            return Vec::new();
        };

        let mut actions = Vec::new();
        if slot.released {
            debug!("cid={cid} closed after release: {reason}");
        } else {
            warn!("cid={cid} transport closed: {reason}");
            slot.machine.apply(ConnectionEvent::TransportDisconnect);
            slot.released = true;
            actions.push(Action::Release { cid });
        }

        let stranded: Vec<u32> = self
            .commands
            .values()
            .filter(|c| c.cid == cid)
            .map(|c| c.itt)
            .collect();
        for itt in stranded {
            if let Some(cmd) = self.commands.remove(&itt) {
                let failure = Failure::Transport(format!("cid={cid}: {reason}"));
                actions.push(Action::Notify(cmd.kind.failed(failure)));
            }
        }
        actions
    }
}

/// Stages for the next Login Request, derived from the target's flags.
fn next_stages(flags: RawLoginFlags) -> Result<(Stage, Stage)> {
    if flags.transit() {
        Ok((flags.nsg()?, Stage::FullFeature))
    } else {
        Ok((flags.csg()?, flags.nsg()?))
    }
}

/// Carries out [`Action`]s against the live connections.
#[derive(Debug, Clone)]
struct Dispatcher {
    links: Arc<Mutex<HashMap<u16, Connection>>>,
    notify: EventSender<InitiatorEvent>,
}

impl Dispatcher {
    async fn run(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { cid, pdu } => {
                    let queued = match self.links.lock().await.get(&cid) {
                        Some(conn) => conn.send(pdu),
                        None => Err(Failure::Transport(format!("cid={cid} is not connected")).into()),
                    };
                    if let Err(e) = queued {
                        error!("cid={cid} cannot queue PDU: {e:#}");
                    }
                },
                Action::Notify(event) => {
                    if !self.notify.notify(event) {
                        debug!("nobody listens for session events");
                    }
                },
                Action::Release { cid } => {
                    let conn = self.links.lock().await.remove(&cid);
                    if let Some(conn) = conn {
                        conn.shutdown().await;
                    }
                },
            }
        }
    }
}

/// A running session: the core plus its generator and processor tasks.
pub struct Session {
    isid: Isid,
    core: Arc<Mutex<SessionCore>>,
    dispatcher: Dispatcher,
    intents: UnboundedSender<SessionIntent>,
    generator_ctl: UnboundedSender<Control>,
    processor_ctl: UnboundedSender<Control>,
    generator: Option<JoinHandle<()>>,
    processor: Option<JoinHandle<()>>,
}

impl Session {
    /// Opens the leading connection to `portal` and starts the session tasks.
    pub async fn open<C: Connector>(
        config: Arc<Config>,
        isid: Isid,
        connector: &C,
        portal: &Portal,
        notify: EventSender<InitiatorEvent>,
    ) -> Result<Self> {
        let (bus, pdus) = EventBus::channel::<PduEvent>();
        let opts = ConnectionOptions::from_config(&config);
        let mut machine = ConnectionMachine::default();
        let conn = Connection::establish(FIRST_CID, &mut machine, connector, portal, bus, opts).await?;

        let mut core = SessionCore::new(config, isid);
        core.attach(ConnectionSlot::new(FIRST_CID, machine, conn.exp_stat_sn()));
        Ok(Self::start(core, vec![conn], pdus, notify))
    }

    /// Runs the session tasks over connections already attached to `core`.
    pub fn start(
        core: SessionCore,
        connections: Vec<Connection>,
        pdus: EventListener<PduEvent>,
        notify: EventSender<InitiatorEvent>,
    ) -> Self {
        let isid = core.isid();
        let core = Arc::new(Mutex::new(core));
        let links = connections.into_iter().map(|c| (c.cid(), c)).collect();
        let dispatcher = Dispatcher {
            links: Arc::new(Mutex::new(links)),
            notify,
        };

        let (intents, intents_rx) = mpsc::unbounded_channel();
        let (generator_ctl, generator_ctl_rx) = mpsc::unbounded_channel();
        let (processor_ctl, processor_ctl_rx) = mpsc::unbounded_channel();

        let generator = tokio::spawn(run_generator(
            core.clone(),
            dispatcher.clone(),
            intents_rx,
            generator_ctl_rx,
        ));
        let processor = tokio::spawn(run_processor(
            core.clone(),
            dispatcher.clone(),
            pdus,
            processor_ctl_rx,
        ));

        Self {
            isid,
            core,
            dispatcher,
            intents,
            generator_ctl,
            processor_ctl,
            generator: Some(generator),
            processor: Some(processor),
        }
    }

    #[inline]
    pub fn isid(&self) -> Isid {
        self.isid
    }

    pub async fn state(&self) -> SessionState {
        self.core.lock().await.state()
    }

    pub async fn tsih(&self) -> u16 {
        self.core.lock().await.tsih()
    }

    pub async fn connection_state(&self, cid: u16) -> Option<ConnectionState> {
        self.core.lock().await.connection_state(cid)
    }

    pub fn submit(&self, intent: SessionIntent) -> Result<()> {
        self.intents
            .send(intent)
            .map_err(|_| Failure::InvalidState(format!("session {} has shut down", self.isid)))?;
        Ok(())
    }

    pub fn login(&self) -> Result<()> {
        self.submit(SessionIntent::Login { cid: FIRST_CID })
    }

    pub fn send_text(&self, keys: Vec<KeyValue>) -> Result<()> {
        self.submit(SessionIntent::SendText { cid: FIRST_CID, keys })
    }

    pub fn logout(&self) -> Result<()> {
        self.submit(SessionIntent::Logout { cid: FIRST_CID })
    }

    /// Stops both tasks once their queues are drained, then closes every
    /// remaining connection.
    pub async fn shutdown(mut self) {
        let _ = self.generator_ctl.send(Control::Exit);
        let _ = self.processor_ctl.send(Control::Exit);
        for handle in [self.generator.take(), self.processor.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = handle.await {
                warn!("session {} task failed: {e}", self.isid);
            }
        }

        let links: Vec<Connection> = self
            .dispatcher
            .links
            .lock()
            .await
            .drain()
            .map(|(_, conn)| conn)
            .collect();
        for conn in links {
            conn.shutdown().await;
        }
        info!("session {} shut down", self.isid);
    }
}

/// Turns façade intents into requests, one at a time.
async fn run_generator(
    core: Arc<Mutex<SessionCore>>,
    dispatcher: Dispatcher,
    mut intents: UnboundedReceiver<SessionIntent>,
    mut control: UnboundedReceiver<Control>,
) {
    loop {
        let intent = tokio::select! {
            biased;
            intent = intents.recv() => match intent {
                Some(intent) => intent,
                None => break,
            },
            _ = control.recv() => break,
        };
        let actions = core.lock().await.on_intent(intent);
        dispatcher.run(actions).await;
    }
    debug!("session generator exits");
}

/// Feeds received PDUs and transport events into the core in arrival order.
async fn run_processor(
    core: Arc<Mutex<SessionCore>>,
    dispatcher: Dispatcher,
    mut pdus: EventListener<PduEvent>,
    mut control: UnboundedReceiver<Control>,
) {
    loop {
        let event = tokio::select! {
            biased;
            event = pdus.wait(None) => match event {
                Some(event) => event,
                None => break,
            },
            _ = control.recv() => break,
        };
        let actions = {
            let mut core = core.lock().await;
            match event {
                PduEvent::Received { cid, frame } => core.on_frame(cid, &frame),
                PduEvent::SendFailed { cid, itt, reason } => {
                    core.on_send_failed(cid, itt, &reason)
                },
                PduEvent::TransportClosed { cid, reason } => {
                    core.on_transport_closed(cid, &reason)
                },
            }
        };
        dispatcher.run(actions).await;
    }
    debug!("session processor exits");
}
