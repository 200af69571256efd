//! A client-side implementation of the iSCSI protocol: login negotiation,
//! SendTargets discovery and logout over async TCP.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, command-line parsing, and logging.
pub mod cfg;
/// Connections, sessions and the initiator façade.
pub mod client;
/// Event buses between the connection tasks, the session and the façade.
pub mod events;
/// Login and Text key-value negotiation text.
pub mod keys;
/// Defines the data structures for iSCSI PDUs.
pub mod models;
/// Connection and session state machines.
pub mod state_machine;
