// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Seam
//!
//! [`ExchangeChannel`] is the set of channel primitives an exchange delegates to,
//! together with the registration of listeners for the channel's events.
//! [`LapinChannel`] implements it on top of a `lapin::Channel`.

use crate::{
    events::{ChannelEvents, CloseListener, DrainListener, ErrorListener, ReturnListener},
    exchange::ExchangeKind,
    otel,
    publisher::PublishOptions,
};
use async_trait::async_trait;
use lapin::{
    message::BasicReturnMessage,
    options::{
        ExchangeBindOptions, ExchangeDeclareOptions, ExchangeDeleteOptions, ExchangeUnbindOptions,
        QueueBindOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
    BasicProperties, Channel,
};
#[cfg(any(test, feature = "mocks"))]
use mockall::automock;
use opentelemetry::Context;
use std::sync::Arc;
use tracing::{debug, error};

/// Reply code sent to the broker when the channel is closed on purpose
pub const REPLY_SUCCESS: u16 = 200;

/// A message the broker handed back because it could not be routed.
#[derive(Debug, Clone)]
pub struct ReturnedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub reply_code: u16,
    pub reply_text: String,
    pub properties: BasicProperties,
    pub data: Vec<u8>,
}

impl ReturnedMessage {
    /// The trace context the message was published with, if any.
    pub fn trace_context(&self) -> Context {
        otel::extract(self.properties.headers().as_ref())
    }
}

impl From<&BasicReturnMessage> for ReturnedMessage {
    fn from(msg: &BasicReturnMessage) -> Self {
        ReturnedMessage {
            exchange: msg.delivery.exchange.as_str().to_owned(),
            routing_key: msg.delivery.routing_key.as_str().to_owned(),
            reply_code: msg.reply_code,
            reply_text: msg.reply_text.as_str().to_owned(),
            properties: msg.delivery.properties.clone(),
            data: msg.delivery.data.clone(),
        }
    }
}

/// The channel primitives an exchange delegates to.
///
/// Every operation returns the client library's result unchanged. Listeners
/// registered through the `on_*` methods are called by the implementation for
/// each matching event, in the order the transport delivers them.
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait ExchangeChannel: Send + Sync + 'static {
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error>;

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: &[u8],
        options: PublishOptions,
    ) -> Result<Confirmation, lapin::Error>;

    async fn exchange_delete(
        &self,
        name: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<(), lapin::Error>;

    async fn exchange_bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error>;

    async fn exchange_unbind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error>;

    async fn close(&self) -> Result<(), lapin::Error>;

    fn on_close(&self, listener: CloseListener);

    fn on_error(&self, listener: ErrorListener);

    fn on_return(&self, listener: ReturnListener);

    fn on_drain(&self, listener: DrainListener);
}

/// Returned message carried by a publisher confirmation, if any.
///
/// Only channels in confirm mode attach returned messages to confirmations;
/// [`Confirmation::NotRequested`] never carries one.
pub fn returned_message(confirmation: &Confirmation) -> Option<ReturnedMessage> {
    match confirmation {
        Confirmation::Ack(Some(msg)) | Confirmation::Nack(Some(msg)) => {
            Some(ReturnedMessage::from(msg.as_ref()))
        }
        _ => None,
    }
}

/// [`ExchangeChannel`] backed by a lapin channel.
///
/// Events are derived from what lapin reports:
/// - `error` followed by `close` whenever the broker closes the channel, through
///   lapin's channel error handler, whether or not an operation was awaiting
/// - `close` after the channel was closed through [`ExchangeChannel::close`]
/// - `return` for every message the broker hands back. In confirm mode it comes
///   with the publisher confirmation; otherwise returns collected by lapin are
///   emitted after each publish, or when [`LapinChannel::flush_returns`] is called
///
/// lapin applies write backpressure inside `basic_publish` itself and never
/// signals a drained buffer, so `drain` listeners are not called by this type.
pub struct LapinChannel {
    inner: Channel,
    events: Arc<ChannelEvents>,
}

impl LapinChannel {
    /// Wraps `channel` and starts listening for the broker closing it.
    ///
    /// # Parameters
    /// * `channel` - An open lapin channel
    ///
    /// # Returns
    /// A new LapinChannel instance
    pub fn new(channel: Channel) -> Self {
        let events = Arc::new(ChannelEvents::new());

        let listener = events.clone();
        let id = channel.id();
        channel.on_error(move |err: lapin::Error| {
            error!(error = err.to_string(), channel = id, "channel closed by the broker");
            listener.emit_broker_close(&err);
        });

        LapinChannel {
            inner: channel,
            events,
        }
    }

    /// The underlying lapin channel.
    pub fn inner(&self) -> &Channel {
        &self.inner
    }

    pub fn events(&self) -> &ChannelEvents {
        &self.events
    }

    /// Emits `return` for every message lapin collected outside confirm mode.
    ///
    /// On a channel in confirm mode this waits for the pending confirmations.
    ///
    /// # Returns
    /// The number of returned messages emitted
    pub async fn flush_returns(&self) -> Result<usize, lapin::Error> {
        let returned = self
            .inner
            .wait_for_confirms()
            .await?
            .iter()
            .map(ReturnedMessage::from)
            .collect::<Vec<_>>();

        if !returned.is_empty() {
            debug!(
                channel = self.inner.id(),
                count = returned.len(),
                "messages returned by the broker"
            );
        }

        Ok(self.events.emit_returns(&returned))
    }
}

#[async_trait]
impl ExchangeChannel for LapinChannel {
    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error> {
        self.inner
            .exchange_declare(name, kind.into(), options, arguments)
            .await
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: &[u8],
        options: PublishOptions,
    ) -> Result<Confirmation, lapin::Error> {
        let confirmation = self
            .inner
            .basic_publish(
                exchange,
                routing_key,
                options.basic_options(),
                content,
                options.properties,
            )
            .await?
            .await?;

        match returned_message(&confirmation) {
            Some(msg) => {
                debug!(exchange, routing_key, "message returned by the broker");
                self.events.emit_return(&msg);
            }
            None if matches!(confirmation, Confirmation::NotRequested) => {
                if let Err(err) = self.flush_returns().await {
                    error!(error = err.to_string(), "failure to collect returned messages");
                }
            }
            None => {}
        }

        Ok(confirmation)
    }

    async fn exchange_delete(
        &self,
        name: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<(), lapin::Error> {
        self.inner.exchange_delete(name, options).await
    }

    async fn exchange_bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error> {
        self.inner
            .exchange_bind(
                destination,
                source,
                routing_key,
                ExchangeBindOptions::default(),
                arguments,
            )
            .await
    }

    async fn exchange_unbind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error> {
        self.inner
            .exchange_unbind(
                destination,
                source,
                routing_key,
                ExchangeUnbindOptions::default(),
                arguments,
            )
            .await
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<(), lapin::Error> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                arguments,
            )
            .await
    }

    async fn close(&self) -> Result<(), lapin::Error> {
        debug!(channel = self.inner.id(), "closing channel...");
        let result = self.inner.close(REPLY_SUCCESS, "OK").await;
        if result.is_ok() {
            debug!(channel = self.inner.id(), "channel closed");
            self.events.emit_close();
        }
        result
    }

    fn on_close(&self, listener: CloseListener) {
        self.events.on_close(listener);
    }

    fn on_error(&self, listener: ErrorListener) {
        self.events.on_error(listener);
    }

    fn on_return(&self, listener: ReturnListener) {
        self.events.on_return(listener);
    }

    fn on_drain(&self, listener: DrainListener) {
        self.events.on_drain(listener);
    }
}
