// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{AuthMethod, Digest, SessionType},
    keys::{KeyName, KeyValue, value::is_iscsi_name},
};

/// Default MaxRecvDataSegmentLength (RFC 3720 § 12.12).
pub const DEFAULT_MAX_RECV_DATA_SEGMENT_LENGTH: u32 = 8192;
const MIN_MAX_RECV_DATA_SEGMENT_LENGTH: u32 = 512;
const MAX_MAX_RECV_DATA_SEGMENT_LENGTH: u32 = 0x00FF_FFFF;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Keys sent during the Security and Operational login stages.
    pub login: LoginConfig,
    /// Timeouts that never travel over the wire.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoginConfig {
    pub identity: Identity,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub negotiation: Negotiation,
}

/// Identity keys reported during Login.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Identity {
    #[serde(rename = "SessionType")]
    pub session_type: SessionType,

    #[serde(rename = "InitiatorName")]
    /// Initiator IQN (mandatory).
    pub initiator_name: String,

    #[serde(default, rename = "InitiatorAlias")]
    pub initiator_alias: String,

    #[serde(default, rename = "TargetName")]
    /// Required for Normal sessions; ignored during Discovery.
    pub target_name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AuthConfig {
    /// Offered in order of preference.
    #[serde(rename = "AuthMethod")]
    pub methods: Vec<AuthMethod>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            methods: vec![AuthMethod::None],
        }
    }
}

impl AuthConfig {
    /// Security negotiation can be skipped only when nothing but `None` is
    /// offered.
    pub fn is_none_only(&self) -> bool {
        self.methods == [AuthMethod::None]
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Negotiation {
    #[serde(
        default = "default_max_recv_data_segment_length",
        rename = "MaxRecvDataSegmentLength"
    )]
    pub max_recv_data_segment_length: u32,
    #[serde(default, rename = "HeaderDigest")]
    pub header_digest: Digest,
    #[serde(default, rename = "DataDigest")]
    pub data_digest: Digest,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self {
            max_recv_data_segment_length: DEFAULT_MAX_RECV_DATA_SEGMENT_LENGTH,
            header_digest: Digest::None,
            data_digest: Digest::None,
        }
    }
}

fn default_max_recv_data_segment_length() -> u32 {
    DEFAULT_MAX_RECV_DATA_SEGMENT_LENGTH
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "TimeoutConnection", with = "serde_secs")]
    /// Timeout for establishing the TCP connection.
    pub timeout_connection: Duration,

    #[serde(rename = "TimeoutIo", with = "serde_secs")]
    /// Timeout for a single socket write.
    pub timeout_io: Duration,

    #[serde(rename = "TimeoutEvent", with = "serde_secs")]
    /// How long the façade waits for a login/text/logout outcome.
    pub timeout_event: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout_connection: Duration::from_secs(10),
            timeout_io: Duration::from_secs(10),
            timeout_event: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Discovery session with default negotiation and timeouts.
    pub fn discovery(initiator_name: impl Into<String>) -> Self {
        Self {
            login: LoginConfig {
                identity: Identity {
                    session_type: SessionType::Discovery,
                    initiator_name: initiator_name.into(),
                    initiator_alias: String::new(),
                    target_name: String::new(),
                },
                auth: AuthConfig::default(),
                negotiation: Negotiation::default(),
            },
            runtime: RuntimeConfig::default(),
        }
    }

    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config {:?}", path.as_ref()))?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        let mut cfg: Config =
            serde_yaml::from_str(s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        let id = &mut self.login.identity;
        ensure!(
            is_iscsi_name(&id.initiator_name),
            "InitiatorName {:?} is not a valid iSCSI name",
            id.initiator_name
        );
        if id.session_type.is_normal() {
            ensure!(
                is_iscsi_name(&id.target_name),
                "TargetName is required for Normal session"
            );
        } else {
            id.target_name.clear();
        }

        ensure!(
            !self.login.auth.methods.is_empty(),
            "AuthMethod must list at least one method"
        );

        let n = &self.login.negotiation;
        ensure!(
            (MIN_MAX_RECV_DATA_SEGMENT_LENGTH..=MAX_MAX_RECV_DATA_SEGMENT_LENGTH)
                .contains(&n.max_recv_data_segment_length),
            "MaxRecvDataSegmentLength must be within 512..=16777215"
        );
        ensure!(
            n.header_digest == Digest::None && n.data_digest == Digest::None,
            "only HeaderDigest/DataDigest = None are supported"
        );

        let rt = &self.runtime;
        ensure!(
            !rt.timeout_connection.is_zero(),
            "TimeoutConnection must be > 0"
        );
        ensure!(!rt.timeout_io.is_zero(), "TimeoutIo must be > 0");
        ensure!(!rt.timeout_event.is_zero(), "TimeoutEvent must be > 0");

        Ok(())
    }

    /// Session keys of the first Login PDU, in wire order.
    pub fn session_keys(&self) -> Result<Vec<KeyValue>> {
        let id = &self.login.identity;
        let mut keys = vec![
            KeyValue::new(KeyName::InitiatorName, id.initiator_name.as_str())?,
            KeyValue::new(KeyName::SessionType, id.session_type.to_string())?,
        ];
        if !id.initiator_alias.is_empty() {
            keys.push(KeyValue::new(
                KeyName::InitiatorAlias,
                id.initiator_alias.as_str(),
            )?);
        }
        if id.session_type.is_normal() {
            keys.push(KeyValue::new(KeyName::TargetName, id.target_name.as_str())?);
        }
        Ok(keys)
    }

    /// Connection keys of the first Login PDU.
    pub fn connection_keys(&self) -> Result<Vec<KeyValue>> {
        Ok(vec![KeyValue::list(
            KeyName::AuthMethod,
            self.login.auth.methods.iter().map(AuthMethod::as_str),
        )?])
    }

    /// Keys offered during the Operational stage.
    pub fn operational_keys(&self) -> Result<Vec<KeyValue>> {
        let n = &self.login.negotiation;
        Ok(vec![
            KeyValue::new(KeyName::HeaderDigest, n.header_digest.to_string())?,
            KeyValue::new(KeyName::DataDigest, n.data_digest.to_string())?,
            KeyValue::new(
                KeyName::MaxRecvDataSegmentLength,
                n.max_recv_data_segment_length.to_string(),
            )?,
        ])
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
