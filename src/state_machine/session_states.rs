// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::state_machine::common::{Machine, StateMachine, Transition};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Free,
    LoggedIn,
    /// Login was rejected; the session accepts no further intents.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    LoginSucceeded,
    LoginFailed,
    LogoutSucceeded,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionFsm;

impl StateMachine for SessionFsm {
    type Event = SessionEvent;
    type State = SessionState;

    const NAME: &'static str = "session";

    fn transition(state: SessionState, event: SessionEvent) -> Transition<SessionState> {
        match (state, event) {
            (SessionState::Free, SessionEvent::LoginSucceeded) => {
                Transition::Next(SessionState::LoggedIn)
            },
            (SessionState::Free, SessionEvent::LoginFailed) => {
                Transition::Next(SessionState::Failed)
            },
            (SessionState::LoggedIn, SessionEvent::LogoutSucceeded) => {
                Transition::Next(SessionState::Free)
            },
            _ => Transition::Violation,
        }
    }
}

pub type SessionMachine = Machine<SessionFsm>;

impl Default for SessionMachine {
    fn default() -> Self {
        Machine::new(SessionState::Free)
    }
}
