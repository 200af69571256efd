// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connection and session runtime plus the initiator façade.

/// Framing helpers shared by the connection tasks.
pub mod common;
/// One TCP connection: sender and receiver tasks.
pub mod connection;
/// Façade: connect, login, discover, logout.
pub mod initiator;
/// CmdSN window and ITT allocation.
pub mod sequence;
/// Session negotiation core and its tasks.
pub mod session;

use thiserror::Error;

use crate::models::{login::status::LoginStatus, logout::common::LogoutResponseCode};

/// Why an exchange with the target did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("login rejected: {0}")]
    LoginStatus(LoginStatus),

    #[error("logout rejected: {0}")]
    LogoutResponse(LogoutResponseCode),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Failure {
    /// Recovers a `Failure` carried by `err`, or files it as a protocol
    /// violation.
    pub fn from_error(err: &anyhow::Error) -> Self {
        err.downcast_ref::<Failure>()
            .cloned()
            .unwrap_or_else(|| Failure::Protocol(format!("{err:#}")))
    }
}
