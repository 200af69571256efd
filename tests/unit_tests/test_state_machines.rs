// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use iscsi_initiator_rs::state_machine::{
    common::{StateMachine, Transition},
    connection_states::{
        ConnectionEvent as E, ConnectionFsm, ConnectionMachine, ConnectionState as S,
    },
    session_states::{SessionEvent, SessionFsm, SessionMachine, SessionState},
};

const NEXT: [(S, E, S); 23] = [
    (S::Free, E::ConnectionRequested, S::TransportWait),
    (S::TransportWait, E::ConnectionEstablished, S::InLogin),
    (S::TransportWait, E::ConnectionEstablishFailed, S::Free),
    (S::TransportWait, E::CloseSession, S::Free),
    (S::InLogin, E::LoginFinalSuccess, S::LoggedIn),
    (S::InLogin, E::CloseSession, S::Free),
    (S::InLogin, E::TransportTimeout, S::Free),
    (S::InLogin, E::TransportDisconnect, S::Free),
    (S::LoggedIn, E::LogoutRequested, S::InLogout),
    (S::LoggedIn, E::CloseSession, S::Free),
    (S::LoggedIn, E::AsyncLogoutRequest, S::LogoutRequested),
    (S::LoggedIn, E::TransportDisconnect, S::CleanupWait),
    (S::LoggedIn, E::AsyncDropConnection, S::CleanupWait),
    (S::LoggedIn, E::AsyncDropAllConnections, S::CleanupWait),
    (S::InLogout, E::LogoutFailure, S::CleanupWait),
    (S::InLogout, E::TransportTimeout, S::CleanupWait),
    (S::InLogout, E::TransportDisconnect, S::CleanupWait),
    (S::InLogout, E::AsyncDropConnection, S::CleanupWait),
    (S::InLogout, E::AsyncDropAllConnections, S::CleanupWait),
    (S::LogoutRequested, E::LogoutRequested, S::InLogout),
    (S::LogoutRequested, E::TransportDisconnect, S::CleanupWait),
    (S::LogoutRequested, E::AsyncDropConnection, S::CleanupWait),
    (S::LogoutRequested, E::AsyncDropAllConnections, S::CleanupWait),
];

const STAY: [(S, E); 2] = [
    (S::InLogout, E::AsyncLogoutRequest),
    (S::LogoutRequested, E::AsyncLogoutRequest),
];

#[test]
fn test_connection_happy_path() {
    let mut m = ConnectionMachine::default();
    assert_eq!(m.state(), S::Free);

    for (event, expected) in [
        (E::ConnectionRequested, S::TransportWait),
        (E::ConnectionEstablished, S::InLogin),
        (E::LoginFinalSuccess, S::LoggedIn),
        (E::LogoutRequested, S::InLogout),
        (E::LogoutFailure, S::CleanupWait),
    ] {
        assert_eq!(m.apply(event), Transition::Next(expected), "{event:?}");
        assert_eq!(m.state(), expected);
    }
}

#[test]
fn test_connection_table_entries() {
    for (from, event, to) in NEXT {
        assert_eq!(
            ConnectionFsm::transition(from, event),
            Transition::Next(to),
            "{from:?} + {event:?}"
        );
    }
    for (from, event) in STAY {
        assert_eq!(ConnectionFsm::transition(from, event), Transition::Stay);
    }
}

#[test]
fn test_cleanup_wait_absorbs_everything() {
    for event in E::ALL {
        assert_eq!(ConnectionFsm::transition(S::CleanupWait, event), Transition::Stay);
    }
}

#[test]
fn test_unlisted_pairs_are_violations() {
    let mut violations = 0;
    for state in S::ALL {
        if state == S::CleanupWait {
            continue;
        }
        for event in E::ALL {
            let listed = NEXT.iter().any(|(s, e, _)| *s == state && *e == event)
                || STAY.contains(&(state, event));
            if !listed {
                assert_eq!(
                    ConnectionFsm::transition(state, event),
                    Transition::Violation,
                    "{state:?} + {event:?}"
                );
                violations += 1;
            }
        }
    }
    assert_eq!(violations, 7 * 14 - NEXT.len() - STAY.len());
}

#[test]
fn test_violation_keeps_state() {
    let mut m = ConnectionMachine::default();
    assert_eq!(m.apply(E::LoginFinalSuccess), Transition::Violation);
    assert_eq!(m.state(), S::Free);

    m.apply(E::ConnectionRequested);
    assert_eq!(m.apply(E::LogoutSuccess), Transition::Violation);
    assert_eq!(m.state(), S::TransportWait);
}

#[test]
fn test_session_machine() {
    let mut m = SessionMachine::default();
    assert_eq!(m.state(), SessionState::Free);
    assert_eq!(m.apply(SessionEvent::LogoutSucceeded), Transition::Violation);

    m.apply(SessionEvent::LoginSucceeded);
    assert_eq!(m.state(), SessionState::LoggedIn);
    m.apply(SessionEvent::LogoutSucceeded);
    assert_eq!(m.state(), SessionState::Free);

    assert_eq!(
        SessionFsm::transition(SessionState::Free, SessionEvent::LoginFailed),
        Transition::Next(SessionState::Failed)
    );
    assert_eq!(
        SessionFsm::transition(SessionState::Failed, SessionEvent::LoginSucceeded),
        Transition::Violation
    );
}
