// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::Serialize;
use tracing::{debug, warn};

use crate::keys::{KeyName, KeyValue};

/// One portal through which a target is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetPortal {
    pub address: String,
    pub tpgt: u16,
}

/// A target reported by `SendTargets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    pub name: String,
    pub portals: Vec<TargetPortal>,
}

/// Groups a SendTargets response into targets.
///
/// Every `TargetName` opens a new target; each `TargetAddress` belongs to the
/// most recent one.
pub fn parse_send_targets(keys: &[KeyValue]) -> Vec<TargetInfo> {
    let mut targets: Vec<TargetInfo> = Vec::new();
    for kv in keys {
        match kv.key() {
            KeyName::TargetName => targets.push(TargetInfo {
                name: kv.value().to_owned(),
                portals: Vec::new(),
            }),
            KeyName::TargetAddress => {
                let Some(current) = targets.last_mut() else {
                    warn!("TargetAddress {} precedes any TargetName, skipped", kv.value());
                    continue;
                };
                match kv.target_address() {
                    Ok((address, tpgt)) => {
                        current.portals.push(TargetPortal { address, tpgt })
                    },
                    Err(e) => warn!("skipping TargetAddress: {e}"),
                }
            },
            other => debug!("ignoring {other} in SendTargets response"),
        }
    }
    targets
}
