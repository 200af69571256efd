// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Turns a possibly relative path into a canonical absolute one.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    abs.canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))
}

/// Demo arguments: `<portal> [config.yaml] [logger.yaml]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoArgs {
    pub portal: String,
    pub config: PathBuf,
    pub logger: PathBuf,
}

impl DemoArgs {
    pub const DEFAULT_CONFIG: &'static str = "tests/config.yaml";
    pub const DEFAULT_LOGGER: &'static str = "tests/config_logger.yaml";

    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut it = args.into_iter().skip(1);
        let portal = it
            .next()
            .context("usage: iscsi-initiator-rs <host[:port]> [config] [logger]")?;
        let config = it.next().unwrap_or_else(|| Self::DEFAULT_CONFIG.to_string());
        let logger = it.next().unwrap_or_else(|| Self::DEFAULT_LOGGER.to_string());
        Ok(Self {
            portal,
            config: resolve_config_path(&config)?,
            logger: resolve_config_path(&logger)?,
        })
    }
}
