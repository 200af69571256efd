//! Connection and session state machines.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Transition plumbing shared by every machine.
pub mod common;
/// Per-connection state machine (RFC 3720 section 7.1.3).
pub mod connection_states;
/// Session state: Free, LoggedIn, Failed.
pub mod session_states;
