//! This module defines the structures for iSCSI Text PDUs.
//! It includes submodules for common definitions, requests, and responses.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines common structures for iSCSI Text PDUs.
pub mod common;
/// Defines the structures for iSCSI Text Request PDUs.
pub mod request;
/// Defines the structures for iSCSI Text Response PDUs.
pub mod response;
