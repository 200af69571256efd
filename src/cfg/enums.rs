// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// iSCSI session type
///
/// Discovery sessions only list targets; Normal sessions attach to one.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    #[serde(rename = "Discovery", alias = "discovery", alias = "DISCOVERY")]
    Discovery,
    #[serde(rename = "Normal", alias = "normal", alias = "NORMAL")]
    Normal,
}

impl SessionType {
    pub fn is_discovery(&self) -> bool {
        matches!(self, SessionType::Discovery)
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, SessionType::Normal)
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionType::Discovery => "Discovery",
            SessionType::Normal => "Normal",
        })
    }
}

/// Digest algorithm advertised via HeaderDigest/DataDigest.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Digest {
    #[default]
    #[serde(rename = "None", alias = "none", alias = "NONE")]
    None,
    #[serde(rename = "CRC32C", alias = "crc32c")]
    CRC32C,
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Digest::None => "None",
            Digest::CRC32C => "CRC32C",
        })
    }
}

/// Authentication methods of the AuthMethod key (RFC 3720 § 11.1).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    #[serde(rename = "KRB5")]
    Krb5,
    #[serde(rename = "SPKM1")]
    Spkm1,
    #[serde(rename = "SPKM2")]
    Spkm2,
    #[serde(rename = "SRP")]
    Srp,
    #[serde(rename = "CHAP", alias = "chap")]
    Chap,
    #[serde(rename = "None", alias = "none", alias = "NONE")]
    None,
}

impl AuthMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Krb5 => "KRB5",
            AuthMethod::Spkm1 => "SPKM1",
            AuthMethod::Spkm2 => "SPKM2",
            AuthMethod::Srp => "SRP",
            AuthMethod::Chap => "CHAP",
            AuthMethod::None => "None",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "KRB5" => AuthMethod::Krb5,
            "SPKM1" => AuthMethod::Spkm1,
            "SPKM2" => AuthMethod::Spkm2,
            "SRP" => AuthMethod::Srp,
            "CHAP" => AuthMethod::Chap,
            "None" => AuthMethod::None,
            _ => return None,
        })
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
