// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use iscsi_initiator_rs::{
    client::{Failure, connection::Portal, initiator::Initiator, session::Session},
    events::{EventBus, InitiatorEvent},
    keys::{KeyName, KeyValue},
    models::{
        login::status::{LoginStatus, StatusClass},
        logout::common::LogoutResponseCode,
    },
    state_machine::{connection_states::ConnectionState, session_states::SessionState},
};

use crate::integration_tests::common::{
    DISK1, DISK2, FakeTarget, RefusingConnector, SLOW_REPLY, Script, failure_of, initiator,
    initiator_with_event_timeout, load_config, test_isid,
};

#[tokio::test]
async fn login_rejected_by_target() -> Result<()> {
    let target = FakeTarget::new(Script::RejectLogin);
    let mut init = initiator(&target)?;
    init.connect("192.0.2.10").await?;

    let failure = failure_of(init.login().await)?;
    assert_eq!(failure, Failure::LoginStatus(LoginStatus::new(0x02, 0x01)));
    if let Failure::LoginStatus(status) = &failure {
        assert_eq!(status.class, StatusClass::InitiatorError);
        assert_eq!(status.describe(), "authentication failure");
    }

    let session = init.session().context("no session")?;
    assert_eq!(session.state().await, SessionState::Failed);
    assert_eq!(session.connection_state(1).await, Some(ConnectionState::Free));

    let again = failure_of(init.login().await)?;
    assert!(matches!(again, Failure::InvalidState(_)), "{again:?}");

    init.shutdown().await;
    assert_eq!(target.requests().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unanswered_text_times_out() -> Result<()> {
    let target = FakeTarget::new(Script::SilentText);
    let mut init = initiator_with_event_timeout(&target, Duration::from_millis(300))?;
    init.connect("192.0.2.10").await?;
    init.login().await?;

    let failure = failure_of(init.discover().await)?;
    assert_eq!(failure, Failure::Timeout("SendTargets"));

    init.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn late_answer_is_not_taken_for_the_next_request() -> Result<()> {
    let target = FakeTarget::new(Script::SlowFirstText);
    let mut init = initiator_with_event_timeout(&target, Duration::from_millis(300))?;
    init.connect("192.0.2.10").await?;
    init.login().await?;

    let failure = failure_of(init.discover().await)?;
    assert_eq!(failure, Failure::Timeout("SendTargets"));

    // The first answer lands while nobody waits for it.
    tokio::time::sleep(SLOW_REPLY + Duration::from_millis(200)).await;

    let targets = init.discover().await?;
    let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, [DISK1, DISK2]);

    init.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn hangup_fails_pending_text() -> Result<()> {
    let target = FakeTarget::new(Script::DropOnText);
    let mut init = initiator(&target)?;
    init.connect("192.0.2.10").await?;
    init.login().await?;

    let failure = failure_of(init.discover().await)?;
    assert!(matches!(failure, Failure::Transport(_)), "{failure:?}");

    let session = init.session().context("no session")?;
    assert_eq!(
        session.connection_state(1).await,
        Some(ConnectionState::CleanupWait)
    );

    init.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn refused_logout_is_reported() -> Result<()> {
    let target = FakeTarget::new(Script::RefuseLogout);
    let mut init = initiator(&target)?;
    init.connect("192.0.2.10").await?;
    init.login().await?;

    let failure = failure_of(init.logout().await)?;
    assert_eq!(
        failure,
        Failure::LogoutResponse(LogoutResponseCode::RecoveryNotSupported)
    );
    let session = init.session().context("no session")?;
    assert_eq!(session.state().await, SessionState::LoggedIn);
    assert_eq!(
        session.connection_state(1).await,
        Some(ConnectionState::CleanupWait)
    );

    init.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn second_connect_is_refused() -> Result<()> {
    let target = FakeTarget::new(Script::Happy);
    let mut init = initiator(&target)?;
    init.connect("192.0.2.10").await?;

    let failure = failure_of(init.connect("192.0.2.11").await)?;
    assert!(matches!(failure, Failure::InvalidState(_)), "{failure:?}");

    init.shutdown().await;
    init.connect("192.0.2.11").await?;
    init.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn calls_before_connect_are_refused() -> Result<()> {
    let mut init = initiator(&FakeTarget::new(Script::Happy))?;
    for res in [init.login().await, init.logout().await] {
        assert!(matches!(failure_of(res)?, Failure::InvalidState(_)));
    }
    assert!(matches!(
        failure_of(init.discover().await)?,
        Failure::InvalidState(_)
    ));
    init.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn bad_portal_and_refused_connection() -> Result<()> {
    let mut init = initiator(&FakeTarget::new(Script::Happy))?;
    let failure = failure_of(init.connect("[fe80::1").await)?;
    assert!(matches!(failure, Failure::Transport(_)), "{failure:?}");
    assert!(init.session().is_none());

    let mut refused = Initiator::with_connector(load_config()?, RefusingConnector);
    let failure = failure_of(refused.connect("192.0.2.10").await)?;
    assert!(matches!(failure, Failure::Transport(_)), "{failure:?}");
    assert!(refused.session().is_none());
    Ok(())
}

#[tokio::test]
async fn oversized_text_fails_without_reaching_target() -> Result<()> {
    let target = FakeTarget::new(Script::Happy);
    let portal: Portal = "192.0.2.10".parse()?;
    let (notify, mut events) = EventBus::channel();
    let session = Session::open(
        Arc::new(load_config()?),
        test_isid(),
        &target,
        &portal,
        notify,
    )
    .await?;

    session.login()?;
    match events.wait(Some(Duration::from_secs(5))).await {
        Some(InitiatorEvent::LoggedIn { .. }) => {},
        other => bail!("login ended with {other:?}"),
    }

    // The target declared 65536 bytes during login.
    let keys = (0..300)
        .map(|_| KeyValue::new(KeyName::TargetAlias, "a".repeat(250)))
        .collect::<Result<Vec<_>>>()?;
    session.send_text(keys)?;
    match events.wait(Some(Duration::from_secs(2))).await {
        Some(InitiatorEvent::TextFailed(Failure::Protocol(_))) => {},
        other => bail!("oversized text ended with {other:?}"),
    }

    session.shutdown().await;
    assert_eq!(target.requests().await.len(), 2, "only the two login PDUs");
    Ok(())
}
