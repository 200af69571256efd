// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FIFO buses between the connection tasks, the session and the façade.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::{client::{Failure, common::RawPdu}, keys::KeyValue};

/// Constructor for the many-producer, single-consumer buses.
pub struct EventBus;

impl EventBus {
    pub fn channel<T>() -> (EventSender<T>, EventListener<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender(tx), EventListener(rx))
    }
}

#[derive(Debug)]
pub struct EventSender<T>(UnboundedSender<T>);

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> EventSender<T> {
    /// Queues `event`; `false` once the listener is gone.
    pub fn notify(&self, event: T) -> bool {
        self.0.send(event).is_ok()
    }
}

#[derive(Debug)]
pub struct EventListener<T>(UnboundedReceiver<T>);

impl<T> EventListener<T> {
    /// Next event in arrival order.
    ///
    /// `None` on timeout, or once every sender has been dropped and the queue
    /// is empty.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Option<T> {
        match timeout {
            Some(t) => tokio::time::timeout(t, self.0.recv()).await.ok().flatten(),
            None => self.0.recv().await,
        }
    }

    /// Already queued event, without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        match self.0.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// What a connection receiver reports to its session.
#[derive(Debug, Clone)]
pub enum PduEvent {
    Received { cid: u16, frame: RawPdu },
    /// A queued request could not be serialized and never left the sender.
    SendFailed {
        cid: u16,
        itt: Option<u32>,
        reason: String,
    },
    TransportClosed { cid: u16, reason: String },
}

/// Outcomes the session reports to the façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatorEvent {
    LoggedIn { tsih: u16 },
    LoginFailed(Failure),
    TextResponse(Vec<KeyValue>),
    TextFailed(Failure),
    LoggedOut,
    LogoutFailed(Failure),
}

/// Task-control sentinel, carried on its own channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Exit,
}
