//! Wire codec: the 48-byte Basic Header Segment and the control PDUs built
//! on top of it.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines common structures and traits for iSCSI models.
pub mod common;
/// Defines the generic PDU container and related traits.
pub mod data_fromat;
/// Malformed-input errors of the codec.
pub mod error;
/// Initiator Session ID.
pub mod isid;
/// Defines the structures for Login PDUs.
pub mod login;
/// Defines the structures for Logout PDUs.
pub mod logout;
/// Defines the iSCSI opcode enumeration.
pub mod opcode;
/// Defines parsing utilities for iSCSI PDUs.
pub mod parse;
/// Defines the structures for Text PDUs.
pub mod text;
