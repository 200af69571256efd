// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-connection state machine (RFC 3720 § 7.1.3, initiator side).

use crate::state_machine::common::{Machine, StateMachine, Transition};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Free,
    TransportWait,
    TransportUp,
    InLogin,
    LoggedIn,
    InLogout,
    LogoutRequested,
    /// Terminal: the stream is closed and the tasks are stopped.
    CleanupWait,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 8] = [
        ConnectionState::Free,
        ConnectionState::TransportWait,
        ConnectionState::TransportUp,
        ConnectionState::InLogin,
        ConnectionState::LoggedIn,
        ConnectionState::InLogout,
        ConnectionState::LogoutRequested,
        ConnectionState::CleanupWait,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    ConnectionRequested,
    ConnectionEstablished,
    ConnectionEstablishFailed,
    CloseSession,
    TransportTimeout,
    TransportDisconnect,
    AsyncDropConnection,
    AsyncDropAllConnections,
    AsyncLogoutRequest,
    LogoutSuccess,
    LogoutFailure,
    /// Logout initiated locally.
    LogoutRequested,
    LoginFinalSuccess,
    LoginFinalFailure,
}

impl ConnectionEvent {
    pub const ALL: [ConnectionEvent; 14] = [
        ConnectionEvent::ConnectionRequested,
        ConnectionEvent::ConnectionEstablished,
        ConnectionEvent::ConnectionEstablishFailed,
        ConnectionEvent::CloseSession,
        ConnectionEvent::TransportTimeout,
        ConnectionEvent::TransportDisconnect,
        ConnectionEvent::AsyncDropConnection,
        ConnectionEvent::AsyncDropAllConnections,
        ConnectionEvent::AsyncLogoutRequest,
        ConnectionEvent::LogoutSuccess,
        ConnectionEvent::LogoutFailure,
        ConnectionEvent::LogoutRequested,
        ConnectionEvent::LoginFinalSuccess,
        ConnectionEvent::LoginFinalFailure,
    ];
}

/// Transition table of a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionFsm;

impl StateMachine for ConnectionFsm {
    type Event = ConnectionEvent;
    type State = ConnectionState;

    const NAME: &'static str = "connection";

    fn transition(state: ConnectionState, event: ConnectionEvent) -> Transition<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (state, event) {
            (S::Free, E::ConnectionRequested) => Transition::Next(S::TransportWait),

            (S::TransportWait, E::ConnectionEstablishFailed | E::CloseSession) => {
                Transition::Next(S::Free)
            },
            (S::TransportWait, E::ConnectionEstablished) => Transition::Next(S::InLogin),

            (
                S::InLogin,
                E::CloseSession | E::TransportTimeout | E::TransportDisconnect,
            ) => Transition::Next(S::Free),
            (S::InLogin, E::LoginFinalSuccess) => Transition::Next(S::LoggedIn),

            (S::LoggedIn, E::CloseSession) => Transition::Next(S::Free),
            (S::LoggedIn, E::AsyncLogoutRequest) => Transition::Next(S::LogoutRequested),
            (
                S::LoggedIn,
                E::TransportDisconnect | E::AsyncDropConnection | E::AsyncDropAllConnections,
            ) => Transition::Next(S::CleanupWait),
            (S::LoggedIn, E::LogoutRequested) => Transition::Next(S::InLogout),

            (
                S::InLogout,
                E::LogoutFailure
                | E::TransportTimeout
                | E::TransportDisconnect
                | E::AsyncDropConnection
                | E::AsyncDropAllConnections,
            ) => Transition::Next(S::CleanupWait),
            (S::InLogout, E::AsyncLogoutRequest) => Transition::Stay,

            (S::LogoutRequested, E::LogoutRequested) => Transition::Next(S::InLogout),
            (
                S::LogoutRequested,
                E::TransportDisconnect | E::AsyncDropConnection | E::AsyncDropAllConnections,
            ) => Transition::Next(S::CleanupWait),
            (S::LogoutRequested, E::AsyncLogoutRequest) => Transition::Stay,

            (S::CleanupWait, _) => Transition::Stay,

            _ => Transition::Violation,
        }
    }
}

pub type ConnectionMachine = Machine<ConnectionFsm>;

impl Default for ConnectionMachine {
    fn default() -> Self {
        Machine::new(ConnectionState::Free)
    }
}
