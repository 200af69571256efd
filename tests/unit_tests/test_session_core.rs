// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail};
use iscsi_initiator_rs::{
    client::{
        Failure,
        session::{Action, CommandKind, SessionIntent},
    },
    events::InitiatorEvent,
    keys::{self, KeyName, KeyValue},
    models::{
        common::PduView,
        isid::{Isid, IsidType},
        login::{common::Stage, status::LoginStatus},
        logout::common::{LogoutReason, LogoutResponseCode},
        opcode::Opcode,
        parse::Pdu,
    },
    state_machine::{
        connection_states::ConnectionState, session_states::SessionState,
    },
};

use super::common::{
    LoginReply, core_in_login, logged_in_core, logout_reply, only_send, text_reply,
};

fn key_names(pdu: &Pdu) -> Result<Vec<KeyName>> {
    Ok(keys::decode(pdu.data())?.iter().map(KeyValue::key).collect())
}

#[test]
fn test_first_login_request() -> Result<()> {
    let (mut core, _) = core_in_login();
    let pdu = only_send(core.start_login(1)?)?;

    let Pdu::LoginRequest(req) = &pdu else {
        bail!("expected a login request, got {pdu:?}");
    };
    let hdr = req.header_view()?;
    assert_eq!(pdu.opcode()?.opcode, Opcode::LoginReq);
    assert!(pdu.is_immediate());
    assert!(hdr.flags.transit(), "AuthMethod=None alone skips security");
    assert!(!hdr.flags.cont());
    assert_eq!(hdr.flags.csg()?, Stage::Security);
    assert_eq!(hdr.flags.nsg()?, Stage::Operational);
    assert_eq!(hdr.isid(), core.isid());
    assert_eq!(hdr.tsih.get(), 0);
    assert_eq!(hdr.initiator_task_tag.get(), 1);
    assert_eq!(hdr.cid.get(), 1);
    assert_eq!(hdr.cmd_sn.get(), 1);

    assert_eq!(key_names(&pdu)?, vec![
        KeyName::InitiatorName,
        KeyName::SessionType,
        KeyName::AuthMethod
    ]);
    assert_eq!(core.outstanding(), 1);
    assert_eq!(core.window().cmd_sn(), 1, "immediate login keeps CmdSN");
    Ok(())
}

#[test]
fn test_second_login_rejected_while_pending() -> Result<()> {
    let (mut core, _) = core_in_login();
    core.start_login(1)?;

    let err = match core.start_login(1) {
        Ok(actions) => bail!("second login accepted: {actions:?}"),
        Err(e) => e,
    };
    assert!(matches!(
        err.downcast_ref::<Failure>(),
        Some(Failure::InvalidState(_))
    ));
    assert_eq!(core.outstanding(), 1);
    Ok(())
}

#[test]
fn test_login_negotiates_to_full_feature() -> Result<()> {
    let (mut core, exp_stat_sn) = core_in_login();
    only_send(core.start_login(1)?)?;

    let second = only_send(core.on_pdu(
        1,
        LoginReply::new(1, true, Stage::Security, Stage::Operational).build()?,
    ))?;
    let Pdu::LoginRequest(req) = &second else {
        bail!("expected a login request, got {second:?}");
    };
    let hdr = req.header_view()?;
    assert!(hdr.flags.transit());
    assert_eq!(hdr.flags.csg()?, Stage::Operational);
    assert_eq!(hdr.flags.nsg()?, Stage::FullFeature);
    assert_eq!(hdr.initiator_task_tag.get(), 1, "login keeps its ITT");
    assert_eq!(hdr.cmd_sn.get(), 1);
    assert_eq!(key_names(&second)?, vec![
        KeyName::HeaderDigest,
        KeyName::DataDigest,
        KeyName::MaxRecvDataSegmentLength
    ]);
    assert_eq!(exp_stat_sn.get(), Some(100));
    assert_eq!(core.state(), SessionState::Free);

    let done = core.on_pdu(
        1,
        LoginReply::new(1, true, Stage::Operational, Stage::FullFeature)
            .tsih(7)
            .build()?,
    );
    assert!(matches!(
        done.as_slice(),
        [Action::Notify(InitiatorEvent::LoggedIn { tsih: 7 })]
    ));
    assert_eq!(core.state(), SessionState::LoggedIn);
    assert_eq!(core.connection_state(1), Some(ConnectionState::LoggedIn));
    assert_eq!(core.tsih(), 7);
    assert_eq!(core.outstanding(), 0);
    Ok(())
}

#[test]
fn test_login_without_transit_repeats_stage() -> Result<()> {
    let (mut core, _) = core_in_login();
    only_send(core.start_login(1)?)?;

    let next = only_send(core.on_pdu(
        1,
        LoginReply::new(1, false, Stage::Operational, Stage::FullFeature).build()?,
    ))?;
    let Pdu::LoginRequest(req) = &next else {
        bail!("expected a login request, got {next:?}");
    };
    let hdr = req.header_view()?;
    assert!(hdr.flags.transit());
    assert_eq!(hdr.flags.csg()?, Stage::Operational);
    assert_eq!(hdr.flags.nsg()?, Stage::FullFeature);
    Ok(())
}

#[test]
fn test_login_keys_are_remembered() -> Result<()> {
    let (mut core, _) = core_in_login();
    only_send(core.start_login(1)?)?;

    let mut reply = LoginReply::new(1, true, Stage::Security, Stage::Operational);
    reply.keys = vec![
        KeyValue::new(KeyName::TargetPortalGroupTag, "1")?,
        KeyValue::new(KeyName::AuthMethod, "None")?,
    ];
    only_send(core.on_pdu(1, reply.build()?))?;

    let slot = core.connection(1).expect("cid 1 attached");
    assert_eq!(slot.negotiated.len(), 2);
    assert_eq!(slot.negotiated[0].value(), "1");
    Ok(())
}

#[test]
fn test_login_rejected_by_status() -> Result<()> {
    let (mut core, _) = core_in_login();
    only_send(core.start_login(1)?)?;

    let mut reply = LoginReply::new(1, false, Stage::Security, Stage::Operational);
    reply.status = (0x02, 0x01);
    let actions = core.on_pdu(1, reply.build()?);

    let expected = Failure::LoginStatus(LoginStatus::new(0x02, 0x01));
    match actions.as_slice() {
        [Action::Release { cid: 1 }, Action::Notify(InitiatorEvent::LoginFailed(f))] => {
            assert_eq!(f, &expected)
        },
        other => bail!("unexpected actions {other:?}"),
    }
    assert_eq!(core.state(), SessionState::Failed);
    assert_eq!(core.connection_state(1), Some(ConnectionState::Free));
    assert_eq!(core.outstanding(), 0);

    let retry = core.on_intent(SessionIntent::Login { cid: 1 });
    assert!(matches!(
        retry.as_slice(),
        [Action::Notify(InitiatorEvent::LoginFailed(Failure::InvalidState(_)))]
    ));
    Ok(())
}

#[test]
fn test_login_response_for_other_isid() -> Result<()> {
    let (mut core, _) = core_in_login();
    only_send(core.start_login(1)?)?;

    let mut reply = LoginReply::new(1, true, Stage::Security, Stage::Operational);
    reply.isid = Isid::new(IsidType::Random, 0, 0x9999, 0x01, 1)?;
    let actions = core.on_pdu(1, reply.build()?);

    assert!(matches!(
        actions.last(),
        Some(Action::Notify(InitiatorEvent::LoginFailed(Failure::Protocol(_))))
    ));
    assert_eq!(core.state(), SessionState::Failed);
    Ok(())
}

#[test]
fn test_tsih_change_fails_login() -> Result<()> {
    let (mut core, _) = core_in_login();
    only_send(core.start_login(1)?)?;

    only_send(core.on_pdu(
        1,
        LoginReply::new(1, true, Stage::Security, Stage::Operational)
            .tsih(5)
            .build()?,
    ))?;
    let actions = core.on_pdu(
        1,
        LoginReply::new(1, true, Stage::Operational, Stage::FullFeature)
            .tsih(6)
            .build()?,
    );
    assert!(matches!(
        actions.last(),
        Some(Action::Notify(InitiatorEvent::LoginFailed(Failure::Protocol(_))))
    ));
    Ok(())
}

#[test]
fn test_unknown_itt_is_dropped() -> Result<()> {
    let (mut core, exp_stat_sn) = core_in_login();
    only_send(core.start_login(1)?)?;

    let actions = core.on_pdu(
        1,
        LoginReply::new(42, true, Stage::Operational, Stage::FullFeature).build()?,
    );
    assert!(actions.is_empty());
    assert_eq!(core.state(), SessionState::Free);
    assert_eq!(core.outstanding(), 1);
    assert_eq!(exp_stat_sn.get(), None);
    // The window still moves.
    assert_eq!((core.window().exp_cmd_sn(), core.window().max_cmd_sn()), (1, 16));

    let (mut core, _) = logged_in_core()?;
    assert_eq!((core.window().exp_cmd_sn(), core.window().max_cmd_sn()), (1, 16));
    let keys = vec![KeyValue::new(KeyName::TargetName, "iqn.2024-01.com.example:t")?];
    assert!(core.on_pdu(1, text_reply(99, &keys, false)?).is_empty());
    assert_eq!((core.window().exp_cmd_sn(), core.window().max_cmd_sn()), (2, 17));
    Ok(())
}

#[test]
fn test_text_before_login_is_refused() -> Result<()> {
    let (mut core, _) = core_in_login();
    let keys = vec![KeyValue::new(KeyName::SendTargets, "All")?];

    let actions = core.on_intent(SessionIntent::SendText { cid: 1, keys });
    assert!(matches!(
        actions.as_slice(),
        [Action::Notify(InitiatorEvent::TextFailed(Failure::InvalidState(_)))]
    ));
    assert_eq!(core.outstanding(), 0);
    Ok(())
}

#[test]
fn test_send_targets_round() -> Result<()> {
    let (mut core, _) = logged_in_core()?;
    let request = vec![KeyValue::new(KeyName::SendTargets, "All")?];

    let pdu = only_send(core.start_text(1, request.clone())?)?;
    let Pdu::TextRequest(req) = &pdu else {
        bail!("expected a text request, got {pdu:?}");
    };
    let hdr = req.header_view()?;
    assert!(!pdu.is_immediate());
    assert_eq!(hdr.initiator_task_tag.get(), 2);
    assert_eq!(hdr.target_task_tag.get(), 0xFFFF_FFFF);
    assert_eq!(hdr.cmd_sn.get(), 1);
    assert_eq!(hdr.lun.get(), 0);
    assert_eq!(keys::decode(pdu.data())?, request);
    assert_eq!(core.window().cmd_sn(), 2);
    assert_eq!(core.command(2).map(|c| c.kind), Some(CommandKind::Text));

    let answer = vec![
        KeyValue::new(KeyName::TargetName, "iqn.2024-01.com.example:disk1")?,
        KeyValue::new(KeyName::TargetAddress, "10.0.0.1:3260,1")?,
    ];
    let actions = core.on_pdu(1, text_reply(2, &answer, false)?);
    match actions.as_slice() {
        [Action::Notify(InitiatorEvent::TextResponse(got))] => assert_eq!(got, &answer),
        other => bail!("unexpected actions {other:?}"),
    }
    assert_eq!(core.window().exp_cmd_sn(), 2);
    assert_eq!(core.window().max_cmd_sn(), 17);
    assert_eq!(core.outstanding(), 0);
    Ok(())
}

#[test]
fn test_continued_text_response_fails() -> Result<()> {
    let (mut core, _) = logged_in_core()?;
    only_send(core.start_text(1, vec![KeyValue::new(KeyName::SendTargets, "All")?])?)?;

    let actions = core.on_pdu(1, text_reply(2, &[], true)?);
    assert!(matches!(
        actions.as_slice(),
        [Action::Notify(InitiatorEvent::TextFailed(Failure::Protocol(_)))]
    ));
    assert_eq!(core.outstanding(), 0);
    Ok(())
}

#[test]
fn test_logout_success() -> Result<()> {
    let (mut core, _) = logged_in_core()?;

    let pdu = only_send(core.start_logout(1)?)?;
    let Pdu::LogoutRequest(req) = &pdu else {
        bail!("expected a logout request, got {pdu:?}");
    };
    let hdr = req.header_view()?;
    assert_eq!(hdr.reason.decode()?, LogoutReason::CloseSession);
    assert_eq!(hdr.reason.raw(), 0x80);
    assert_eq!(hdr.cid.get(), 1);
    assert_eq!(hdr.cmd_sn.get(), 1);
    assert_eq!(core.connection_state(1), Some(ConnectionState::InLogout));

    let actions = core.on_pdu(1, logout_reply(2, LogoutResponseCode::Success)?);
    assert!(matches!(actions.as_slice(), [
        Action::Release { cid: 1 },
        Action::Notify(InitiatorEvent::LoggedOut)
    ]));
    assert_eq!(core.state(), SessionState::Free);
    assert_eq!(core.outstanding(), 0);
    Ok(())
}

#[test]
fn test_logout_failure_code() -> Result<()> {
    let (mut core, _) = logged_in_core()?;
    only_send(core.start_logout(1)?)?;

    let actions = core.on_pdu(1, logout_reply(2, LogoutResponseCode::CleanupFailed)?);
    match actions.as_slice() {
        [Action::Release { cid: 1 }, Action::Notify(InitiatorEvent::LogoutFailed(f))] => {
            assert_eq!(f, &Failure::LogoutResponse(LogoutResponseCode::CleanupFailed))
        },
        other => bail!("unexpected actions {other:?}"),
    }
    assert_eq!(core.state(), SessionState::LoggedIn);
    assert_eq!(core.connection_state(1), Some(ConnectionState::CleanupWait));
    Ok(())
}

#[test]
fn test_transport_loss_fails_pending_login() -> Result<()> {
    let (mut core, _) = core_in_login();
    only_send(core.start_login(1)?)?;

    let actions = core.on_transport_closed(1, "connection reset");
    match actions.as_slice() {
        [Action::Release { cid: 1 }, Action::Notify(InitiatorEvent::LoginFailed(f))] => {
            assert!(matches!(f, Failure::Transport(_)))
        },
        other => bail!("unexpected actions {other:?}"),
    }
    assert_eq!(core.connection_state(1), Some(ConnectionState::Free));
    assert_eq!(core.outstanding(), 0);

    assert!(core.on_transport_closed(1, "again").is_empty());
    assert!(core.on_transport_closed(9, "unknown cid").is_empty());
    Ok(())
}

#[test]
fn test_transport_loss_fails_pending_text() -> Result<()> {
    let (mut core, _) = logged_in_core()?;
    only_send(core.start_text(1, vec![KeyValue::new(KeyName::SendTargets, "All")?])?)?;

    let actions = core.on_transport_closed(1, "eof");
    assert!(matches!(actions.as_slice(), [
        Action::Release { cid: 1 },
        Action::Notify(InitiatorEvent::TextFailed(Failure::Transport(_)))
    ]));
    assert_eq!(core.connection_state(1), Some(ConnectionState::CleanupWait));
    Ok(())
}

#[test]
fn test_request_pdus_from_target_are_ignored() -> Result<()> {
    let (mut core, _) = core_in_login();
    let request = only_send(core.start_login(1)?)?;

    assert!(core.on_pdu(1, request).is_empty());
    assert_eq!(core.outstanding(), 1);
    Ok(())
}

fn aliases(count: usize) -> Result<Vec<KeyValue>> {
    (0..count)
        .map(|_| KeyValue::new(KeyName::TargetAlias, "a".repeat(250)))
        .collect()
}

#[test]
fn test_oversized_text_is_refused() -> Result<()> {
    let (mut core, _) = logged_in_core()?;
    assert_eq!(core.connection(1).map(|c| c.send_limit()), Some(8192));

    let actions = core.on_intent(SessionIntent::SendText {
        cid: 1,
        keys: aliases(40)?,
    });
    assert!(matches!(
        actions.as_slice(),
        [Action::Notify(InitiatorEvent::TextFailed(Failure::Protocol(_)))]
    ));
    assert_eq!(core.outstanding(), 0);
    assert_eq!(core.window().cmd_sn(), 1, "refused request takes no CmdSN");
    Ok(())
}

#[test]
fn test_text_limit_follows_target_declaration() -> Result<()> {
    let (mut core, _) = core_in_login();
    assert_eq!(core.connection(1).map(|c| c.send_limit()), Some(8192));

    let first = only_send(core.start_login(1)?)?;
    let itt = first.itt()?;
    only_send(core.on_pdu(
        1,
        LoginReply::new(itt, true, Stage::Security, Stage::Operational).build()?,
    ))?;
    let mut last = LoginReply::new(itt, true, Stage::Operational, Stage::FullFeature).tsih(7);
    last.keys = vec![KeyValue::new(KeyName::MaxRecvDataSegmentLength, "16384")?];
    core.on_pdu(1, last.build()?);
    assert_eq!(core.state(), SessionState::LoggedIn);
    assert_eq!(core.connection(1).map(|c| c.send_limit()), Some(16384));

    let pdu = only_send(core.start_text(1, aliases(40)?)?)?;
    assert!(pdu.data().len() > 8192);

    assert!(core.start_text(1, aliases(80)?).is_err());
    assert_eq!(core.outstanding(), 1);
    Ok(())
}

#[test]
fn test_unsent_request_fails_its_command() -> Result<()> {
    let (mut core, _) = logged_in_core()?;
    let keys = vec![KeyValue::new(KeyName::SendTargets, "All")?];
    let itt = only_send(core.start_text(1, keys)?)?.itt()?;

    assert!(core.on_send_failed(1, None, "no tag").is_empty());
    assert_eq!(core.outstanding(), 1);

    let actions = core.on_send_failed(1, Some(itt), "data segment too large");
    assert!(matches!(
        actions.as_slice(),
        [Action::Notify(InitiatorEvent::TextFailed(Failure::Protocol(_)))]
    ));
    assert_eq!(core.outstanding(), 0);
    assert_eq!(core.connection_state(1), Some(ConnectionState::LoggedIn));
    Ok(())
}

#[test]
fn test_unsent_login_fails_the_session() -> Result<()> {
    let (mut core, _) = core_in_login();
    let itt = only_send(core.start_login(1)?)?.itt()?;

    let actions = core.on_send_failed(1, Some(itt), "encode failed");
    assert!(matches!(
        actions.as_slice(),
        [
            Action::Release { cid: 1 },
            Action::Notify(InitiatorEvent::LoginFailed(Failure::Protocol(_)))
        ]
    ));
    assert_eq!(core.state(), SessionState::Failed);
    assert_eq!(core.connection_state(1), Some(ConnectionState::Free));
    Ok(())
}
