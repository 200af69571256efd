// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    cfg::config::Config,
    client::{
        Failure,
        connection::{Connector, Portal, TcpConnector},
        session::Session,
    },
    events::{EventBus, EventListener, InitiatorEvent},
    keys::{KeyName, KeyValue, TargetInfo, parse_send_targets},
    models::isid::{Isid, IsidAllocator},
};

struct Active {
    session: Session,
    events: EventListener<InitiatorEvent>,
}

/// Blocking-style façade over one session: every call waits for the
/// matching outcome or for the configured event timeout.
pub struct Initiator<C: Connector = TcpConnector> {
    config: Arc<Config>,
    connector: C,
    isids: IsidAllocator,
    active: Option<Active>,
}

impl Initiator<TcpConnector> {
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Initiator<C> {
    pub fn with_connector(config: Config, connector: C) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            isids: IsidAllocator::default(),
            active: None,
        }
    }

    /// Replaces the ISID source, e.g. to pin the qualifier.
    pub fn with_isids(mut self, isids: IsidAllocator) -> Self {
        self.isids = isids;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Opens a session with its leading connection to `portal`
    /// (`host[:port]`, IPv6 hosts in brackets).
    pub async fn connect(&mut self, portal: &str) -> Result<Isid> {
        if let Some(active) = &self.active {
            return Err(Failure::InvalidState(format!(
                "session {} is still open",
                active.session.isid()
            ))
            .into());
        }
        let portal: Portal = portal
            .parse()
            .map_err(|e: anyhow::Error| Failure::Transport(format!("{e:#}")))?;

        let isid = self.isids.next_isid();
        let (notify, events) = EventBus::channel();
        let session =
            Session::open(self.config.clone(), isid, &self.connector, &portal, notify).await?;
        info!("session {isid} opened to {portal}");

        self.active = Some(Active { session, events });
        Ok(isid)
    }

    pub async fn login(&mut self) -> Result<()> {
        let limit = self.config.runtime.timeout_event;
        let active = self.active_mut()?;
        discard_stale(&mut active.events);
        active.session.login()?;
        wait_for(&mut active.events, limit, "login", |ev| match ev {
            InitiatorEvent::LoggedIn { tsih } => {
                debug!("logged in with TSIH={tsih}");
                Some(Ok(()))
            },
            InitiatorEvent::LoginFailed(f) => Some(Err(f)),
            _ => None,
        })
        .await
    }

    /// Sends `SendTargets=All` and groups the answer per target.
    pub async fn discover(&mut self) -> Result<Vec<TargetInfo>> {
        let limit = self.config.runtime.timeout_event;
        let request = vec![KeyValue::new(KeyName::SendTargets, "All")?];
        let active = self.active_mut()?;
        discard_stale(&mut active.events);
        active.session.send_text(request)?;
        let answer = wait_for(&mut active.events, limit, "SendTargets", |ev| match ev {
            InitiatorEvent::TextResponse(keys) => Some(Ok(keys)),
            InitiatorEvent::TextFailed(f) => Some(Err(f)),
            _ => None,
        })
        .await?;
        Ok(parse_send_targets(&answer))
    }

    pub async fn logout(&mut self) -> Result<()> {
        let limit = self.config.runtime.timeout_event;
        let active = self.active_mut()?;
        discard_stale(&mut active.events);
        active.session.logout()?;
        wait_for(&mut active.events, limit, "logout", |ev| match ev {
            InitiatorEvent::LoggedOut => Some(Ok(())),
            InitiatorEvent::LogoutFailed(f) => Some(Err(f)),
            _ => None,
        })
        .await
    }

    /// Stops the session tasks and closes its connections. A no-op when
    /// nothing is open.
    pub async fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.session.shutdown().await;
        }
    }

    fn active_mut(&mut self) -> Result<&mut Active> {
        self.active
            .as_mut()
            .ok_or_else(|| Failure::InvalidState("not connected".into()).into())
    }
}

/// Drops outcomes of earlier calls that arrived after those calls gave up.
fn discard_stale(events: &mut EventListener<InitiatorEvent>) {
    while let Some(event) = events.try_next() {
        debug!("discarding late {event:?}");
    }
}

/// Waits for the first event `pick` recognises, skipping the others.
async fn wait_for<T>(
    events: &mut EventListener<InitiatorEvent>,
    limit: Duration,
    what: &'static str,
    mut pick: impl FnMut(InitiatorEvent) -> Option<Result<T, Failure>>,
) -> Result<T> {
    let deadline = Instant::now() + limit;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let Some(event) = events.wait(Some(left)).await else {
            return Err(Failure::Timeout(what).into());
        };
        let shown = format!("{event:?}");
        match pick(event) {
            Some(outcome) => return outcome.map_err(Into::into),
            None => debug!("waiting for {what}, skipped {shown}"),
        }
    }
}
