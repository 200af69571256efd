// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Configuration, command-line parsing, and logging.

/// Command-line arguments and path resolution.
pub mod cli;
/// Configuration file parsing and validation.
pub mod config;
/// Enumerations used in configuration.
pub mod enums;
/// Logger initialization.
pub mod logger;
