// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, str::FromStr};

use crate::keys::{KeyError, value::Grammar};

macro_rules! key_names {
    ($($variant:ident => $text:literal : $grammar:expr),+ $(,)?) => {
        /// Every key this initiator can send or understand.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum KeyName {
            $($variant),+
        }

        impl KeyName {
            pub const ALL: &'static [KeyName] = &[$(KeyName::$variant),+];

            /// Wire spelling of the key.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(KeyName::$variant => $text),+
                }
            }

            /// Grammar a value of this key has to follow.
            pub const fn grammar(&self) -> Grammar {
                match self {
                    $(KeyName::$variant => $grammar),+
                }
            }
        }

        impl FromStr for KeyName {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(KeyName::$variant),)+
                    other => Err(KeyError::UnknownKey(other.to_string())),
                }
            }
        }
    };
}

const AUTH_METHODS: &[&str] = &["KRB5", "SPKM1", "SPKM2", "SRP", "CHAP", "None"];
const DIGESTS: &[&str] = &["None", "CRC32C"];
const SESSION_TYPES: &[&str] = &["Discovery", "Normal"];

key_names! {
    AuthMethod => "AuthMethod": Grammar::List(AUTH_METHODS),
    InitiatorName => "InitiatorName": Grammar::IscsiName,
    InitiatorAlias => "InitiatorAlias": Grammar::Text,
    TargetName => "TargetName": Grammar::IscsiName,
    TargetAlias => "TargetAlias": Grammar::Text,
    TargetAddress => "TargetAddress": Grammar::TargetAddress,
    TargetPortalGroupTag => "TargetPortalGroupTag": Grammar::Numeric { min: 0, max: 65_535 },
    SessionType => "SessionType": Grammar::Choice(SESSION_TYPES),
    SendTargets => "SendTargets": Grammar::SendTargets,
    MaxRecvDataSegmentLength => "MaxRecvDataSegmentLength":
        Grammar::Numeric { min: 512, max: 0x00FF_FFFF },
    HeaderDigest => "HeaderDigest": Grammar::List(DIGESTS),
    DataDigest => "DataDigest": Grammar::List(DIGESTS),
    MaxConnections => "MaxConnections": Grammar::Numeric { min: 1, max: 65_535 },
    InitialR2T => "InitialR2T": Grammar::Boolean,
    ImmediateData => "ImmediateData": Grammar::Boolean,
    MaxBurstLength => "MaxBurstLength": Grammar::Numeric { min: 512, max: 0x00FF_FFFF },
    FirstBurstLength => "FirstBurstLength": Grammar::Numeric { min: 512, max: 0x00FF_FFFF },
    DefaultTime2Wait => "DefaultTime2Wait": Grammar::Numeric { min: 0, max: 3600 },
    DefaultTime2Retain => "DefaultTime2Retain": Grammar::Numeric { min: 0, max: 3600 },
    MaxOutstandingR2T => "MaxOutstandingR2T": Grammar::Numeric { min: 1, max: 65_535 },
    DataPDUInOrder => "DataPDUInOrder": Grammar::Boolean,
    DataSequenceInOrder => "DataSequenceInOrder": Grammar::Boolean,
    ErrorRecoveryLevel => "ErrorRecoveryLevel": Grammar::Numeric { min: 0, max: 2 },
    OFMarker => "OFMarker": Grammar::Boolean,
    IFMarker => "IFMarker": Grammar::Boolean,
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
