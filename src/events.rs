// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Channel Event Listeners
//!
//! A small synchronous registry of listeners for the four channel events:
//! `close`, `error`, `return` and `drain`. Emitting an event calls every
//! listener of that kind, in registration order, in the caller's turn.
//!
//! The listeners of a kind are snapshotted before they run, so a listener may
//! register further listeners on the same registry. Those only see later events.

use crate::channel::ReturnedMessage;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

pub type CloseListener = Box<dyn Fn() + Send + Sync>;
pub type ErrorListener = Box<dyn Fn(&lapin::Error) + Send + Sync>;
pub type ReturnListener = Box<dyn Fn(&ReturnedMessage) + Send + Sync>;
pub type DrainListener = Box<dyn Fn() + Send + Sync>;

/// The kinds of events a channel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEventKind {
    Close,
    Error,
    Return,
    Drain,
}

/// Listeners registered on one channel, grouped by event kind.
#[derive(Default)]
pub struct ChannelEvents {
    close: RwLock<Vec<Arc<dyn Fn() + Send + Sync>>>,
    error: RwLock<Vec<Arc<dyn Fn(&lapin::Error) + Send + Sync>>>,
    returned: RwLock<Vec<Arc<dyn Fn(&ReturnedMessage) + Send + Sync>>>,
    drain: RwLock<Vec<Arc<dyn Fn() + Send + Sync>>>,
}

impl ChannelEvents {
    /// Creates a registry without any listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener called every time the channel closes.
    ///
    /// # Parameters
    /// * `listener` - The callback to run on `close`
    pub fn on_close(&self, listener: CloseListener) {
        push(&self.close, Arc::from(listener));
    }

    /// Registers a listener called with the error the channel was closed with.
    ///
    /// # Parameters
    /// * `listener` - The callback to run on `error`
    pub fn on_error(&self, listener: ErrorListener) {
        push(&self.error, Arc::from(listener));
    }

    /// Registers a listener called with every message the broker returns.
    ///
    /// # Parameters
    /// * `listener` - The callback to run on `return`
    pub fn on_return(&self, listener: ReturnListener) {
        push(&self.returned, Arc::from(listener));
    }

    /// Registers a listener called when the channel is ready for writes again.
    ///
    /// # Parameters
    /// * `listener` - The callback to run on `drain`
    pub fn on_drain(&self, listener: DrainListener) {
        push(&self.drain, Arc::from(listener));
    }

    /// Calls every `close` listener.
    pub fn emit_close(&self) {
        trace!("emitting channel close");
        snapshot(&self.close).iter().for_each(|l| l());
    }

    /// Calls every `error` listener with `err`.
    ///
    /// # Parameters
    /// * `err` - The error reported for the channel
    pub fn emit_error(&self, err: &lapin::Error) {
        trace!(error = err.to_string(), "emitting channel error");
        snapshot(&self.error).iter().for_each(|l| l(err));
    }

    /// Calls every `return` listener with `msg`.
    ///
    /// # Parameters
    /// * `msg` - The message handed back by the broker
    pub fn emit_return(&self, msg: &ReturnedMessage) {
        trace!(
            exchange = %msg.exchange,
            routing_key = %msg.routing_key,
            "emitting channel return"
        );
        snapshot(&self.returned).iter().for_each(|l| l(msg));
    }

    /// Calls every `drain` listener.
    pub fn emit_drain(&self) {
        trace!("emitting channel drain");
        snapshot(&self.drain).iter().for_each(|l| l());
    }

    /// Reports a channel the broker closed: `error` with `err`, then `close`.
    ///
    /// # Parameters
    /// * `err` - The reason the broker gave for closing the channel
    pub fn emit_broker_close(&self, err: &lapin::Error) {
        self.emit_error(err);
        self.emit_close();
    }

    /// Emits `return` once per message, in the order given.
    ///
    /// # Parameters
    /// * `msgs` - Messages handed back by the broker
    ///
    /// # Returns
    /// The number of messages emitted
    pub fn emit_returns(&self, msgs: &[ReturnedMessage]) -> usize {
        msgs.iter().for_each(|msg| self.emit_return(msg));
        msgs.len()
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: ChannelEventKind) -> usize {
        match kind {
            ChannelEventKind::Close => len(&self.close),
            ChannelEventKind::Error => len(&self.error),
            ChannelEventKind::Return => len(&self.returned),
            ChannelEventKind::Drain => len(&self.drain),
        }
    }
}

fn push<T>(slot: &RwLock<Vec<T>>, listener: T) {
    slot.write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(listener);
}

// The guard is released before any listener runs.
fn snapshot<T: Clone>(slot: &RwLock<Vec<T>>) -> Vec<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn len<T>(slot: &RwLock<Vec<T>>) -> usize {
    slot.read().unwrap_or_else(PoisonError::into_inner).len()
}
