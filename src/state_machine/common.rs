// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt::Debug, marker::PhantomData};

use tracing::{debug, warn};

/// Outcome of feeding one event to a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// Move to the given state.
    Next(S),
    /// Event accepted, state unchanged.
    Stay,
    /// Event not allowed in the current state; state unchanged.
    Violation,
}

/// Pure transition table of a state machine.
pub trait StateMachine {
    type State: Copy + Debug + PartialEq;
    type Event: Copy + Debug;

    /// Used in log lines.
    const NAME: &'static str;

    fn transition(state: Self::State, event: Self::Event) -> Transition<Self::State>;
}

/// Current state of one machine plus the logging around each step.
#[derive(Debug, Clone)]
pub struct Machine<M: StateMachine> {
    state: M::State,
    _table: PhantomData<M>,
}

impl<M: StateMachine> Machine<M> {
    pub fn new(initial: M::State) -> Self {
        Self {
            state: initial,
            _table: PhantomData,
        }
    }

    #[inline]
    pub fn state(&self) -> M::State {
        self.state
    }

    /// Applies `event`, logging violations with `warn!`.
    pub fn apply(&mut self, event: M::Event) -> Transition<M::State> {
        let from = self.state;
        let t = M::transition(from, event);
        match t {
            Transition::Next(to) => {
                debug!("{}: {from:?} --{event:?}--> {to:?}", M::NAME);
                self.state = to;
            },
            Transition::Stay => debug!("{}: {event:?} ignored in {from:?}", M::NAME),
            Transition::Violation => {
                warn!("{}: protocol violation, {event:?} in {from:?}", M::NAME)
            },
        }
        t
    }
}
