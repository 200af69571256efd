// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_initiator_rs::client::connection::{DEFAULT_PORT, Portal};

#[test]
fn test_host_and_port() -> Result<()> {
    let p: Portal = "10.0.0.1:3261".parse()?;
    assert_eq!(p.host, "10.0.0.1");
    assert_eq!(p.port, 3261);

    let p: Portal = "target.example".parse()?;
    assert_eq!(p.port, DEFAULT_PORT);
    assert_eq!(p.to_string(), "target.example:3260");
    Ok(())
}

#[test]
fn test_ipv6_forms() -> Result<()> {
    let p: Portal = "[fe80::1]:3262".parse()?;
    assert_eq!(p.host, "fe80::1");
    assert_eq!(p.port, 3262);
    assert_eq!(p.to_string(), "[fe80::1]:3262");

    let p: Portal = "[::1]".parse()?;
    assert_eq!((p.host.as_str(), p.port), ("::1", DEFAULT_PORT));

    let p: Portal = "fe80::2".parse()?;
    assert_eq!((p.host.as_str(), p.port), ("fe80::2", DEFAULT_PORT));
    Ok(())
}

#[test]
fn test_bad_portals() {
    for bad in ["", "   ", "host:port", "host:70000", "[fe80::1", "[fe80::1]3260"] {
        assert!(bad.parse::<Portal>().is_err(), "accepted {bad:?}");
    }
}
