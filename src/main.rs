// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use iscsi_initiator_rs::{
    cfg::{cli::DemoArgs, config::Config, logger::init_logger},
    client::initiator::Initiator,
    keys::TargetInfo,
};
use tokio::main;
use tracing::{error, info};

#[main]
async fn main() -> Result<()> {
    let args = DemoArgs::parse(std::env::args())?;
    let _init_logger = init_logger(&args.logger.to_string_lossy())?;

    let config = Config::load_from_file(&args.config).context("failed to load config")?;
    let mut initiator = Initiator::new(config);

    let isid = initiator.connect(&args.portal).await?;
    info!("Connected to {} with ISID {isid}", args.portal);

    let outcome = run(&mut initiator).await;
    initiator.shutdown().await;

    let targets = outcome.inspect_err(|e| error!("discovery failed: {e:#}"))?;
    println!("{}", serde_json::to_string_pretty(&targets)?);
    Ok(())
}

async fn run(initiator: &mut Initiator) -> Result<Vec<TargetInfo>> {
    initiator.login().await.context("login")?;
    let targets = initiator.discover().await.context("SendTargets")?;
    info!("Discovered {} target(s)", targets.len());
    initiator.logout().await.context("logout")?;
    Ok(targets)
}
