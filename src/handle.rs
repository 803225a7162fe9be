// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Handle
//!
//! An [`ExchangeHandle`] ties an [`Exchange`] declaration to an open channel.
//! Creating one registers a listener for each channel event that forwards to
//! the declaration's hooks. Every operation is handed straight to the channel
//! and its result comes back unchanged.

use crate::{
    channel::{ExchangeChannel, ReturnedMessage},
    errors::AmqpError,
    exchange::Exchange,
    publisher::PublishOptions,
};
use lapin::{options::ExchangeDeleteOptions, publisher_confirm::Confirmation, types::FieldTable};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

/// A declared exchange bound to a channel.
///
/// The channel is shared: the handle never closes it unless asked to through
/// [`ExchangeHandle::close_channel`].
pub struct ExchangeHandle<D, C>
where
    D: Exchange,
    C: ExchangeChannel + ?Sized,
{
    channel: Arc<C>,
    name: String,
    declaration: Arc<D>,
}

impl<D, C> ExchangeHandle<D, C>
where
    D: Exchange,
    C: ExchangeChannel + ?Sized,
{
    /// Binds `declaration` to `channel` under `name`.
    ///
    /// Registers exactly one listener per event kind on the channel. No I/O is
    /// performed; asserting the exchange is left to [`crate::topology::declare`].
    pub fn new(channel: Arc<C>, name: &str, declaration: Arc<D>) -> Self {
        let decl = declaration.clone();
        channel.on_close(Box::new(move || decl.on_close()));

        let decl = declaration.clone();
        channel.on_error(Box::new(move |err: &lapin::Error| decl.on_error(err)));

        let decl = declaration.clone();
        channel.on_return(Box::new(move |msg: &ReturnedMessage| decl.on_return(msg)));

        let decl = declaration.clone();
        channel.on_drain(Box::new(move || decl.on_drain()));

        ExchangeHandle {
            channel,
            name: name.to_owned(),
            declaration,
        }
    }

    /// The channel this exchange delegates to, shared with its other users.
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// The exchange's name on the broker, fixed for the handle's lifetime.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaration whose hooks receive the channel events.
    pub fn declaration(&self) -> &Arc<D> {
        &self.declaration
    }

    /// Publishes `content` to this exchange.
    ///
    /// The confirmation is whatever the channel reports; delivery is only
    /// acknowledged when the channel runs in confirm mode.
    pub async fn publish(
        &self,
        content: &[u8],
        routing_key: &str,
        options: PublishOptions,
    ) -> Result<Confirmation, lapin::Error> {
        debug!(exchange = %self.name, routing_key, "publishing message");

        self.channel
            .basic_publish(&self.name, routing_key, content, options)
            .await
            .inspect_err(|err| error!(error = err.to_string(), "error publishing message"))
    }

    /// Serializes `payload` as JSON and publishes it.
    ///
    /// `options` is merged with the JSON preset through [`PublishOptions::as_json`].
    ///
    /// # Parameters
    /// * `payload` - Any serializable value
    /// * `routing_key` - The routing key of the message
    /// * `options` - Flags and properties of the publish
    ///
    /// # Returns
    /// The channel's confirmation, or `ParsePayloadError` when serialization fails
    pub async fn publish_json<T>(
        &self,
        payload: &T,
        routing_key: &str,
        options: PublishOptions,
    ) -> Result<Confirmation, AmqpError>
    where
        T: Serialize + Sync,
    {
        let content = serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::ParsePayloadError
        })?;

        Ok(self
            .publish(&content, routing_key, options.as_json())
            .await?)
    }

    /// Deletes the exchange from the broker.
    ///
    /// With `if_unused` set the broker refuses to delete an exchange that still
    /// has bindings and closes the channel; that error is returned as is.
    pub async fn destroy(&self, options: ExchangeDeleteOptions) -> Result<(), lapin::Error> {
        debug!(exchange = %self.name, if_unused = options.if_unused, "deleting exchange");

        self.channel
            .exchange_delete(&self.name, options)
            .await
            .inspect_err(|err| error!(error = err.to_string(), "error deleting the exchange"))
    }

    /// Removes the binding that routes messages from `exchange_name` to this exchange.
    ///
    /// This is the opposite direction of the exchange bindings applied by
    /// [`crate::topology::apply_bindings`]; those are removed with
    /// [`ExchangeHandle::unbind_to`].
    ///
    /// # Parameters
    /// * `exchange_name` - The source exchange
    /// * `pattern` - The routing key pattern of the binding
    /// * `args` - The binding arguments
    ///
    /// # Returns
    /// The channel's result, unchanged
    pub async fn unbind_from(
        &self,
        exchange_name: &str,
        pattern: &str,
        args: FieldTable,
    ) -> Result<(), lapin::Error> {
        debug!(
            exchange = %self.name,
            source = exchange_name,
            pattern,
            "unbinding exchange"
        );

        self.channel
            .exchange_unbind(&self.name, exchange_name, pattern, args)
            .await
            .inspect_err(|err| error!(error = err.to_string(), "error unbinding the exchange"))
    }

    /// Removes the binding that routes messages from this exchange to `destination`.
    ///
    /// Undoes an exchange [`Binding`](crate::exchange::Binding) whose `source`
    /// is `destination`.
    pub async fn unbind_to(
        &self,
        destination: &str,
        pattern: &str,
        args: FieldTable,
    ) -> Result<(), lapin::Error> {
        debug!(
            exchange = %self.name,
            destination,
            pattern,
            "unbinding exchange"
        );

        self.channel
            .exchange_unbind(destination, &self.name, pattern, args)
            .await
            .inspect_err(|err| error!(error = err.to_string(), "error unbinding the exchange"))
    }

    /// [`ExchangeHandle::unbind_from`] that also hands the outcome to `callback`.
    pub async fn unbind_from_with<F>(
        &self,
        exchange_name: &str,
        pattern: &str,
        args: FieldTable,
        callback: F,
    ) -> Result<(), lapin::Error>
    where
        F: FnOnce(Option<&lapin::Error>) + Send,
    {
        let result = self.unbind_from(exchange_name, pattern, args).await;
        callback(result.as_ref().err());
        result
    }

    /// Closes the underlying channel, for every exchange sharing it.
    pub async fn close_channel(&self) -> Result<(), lapin::Error> {
        debug!(exchange = %self.name, "closing the exchange channel");

        self.channel
            .close()
            .await
            .inspect_err(|err| error!(error = err.to_string(), "error closing the channel"))
    }

    /// [`ExchangeHandle::close_channel`] that also hands the outcome to `callback`.
    pub async fn close_channel_with<F>(&self, callback: F) -> Result<(), lapin::Error>
    where
        F: FnOnce(Option<&lapin::Error>) + Send,
    {
        let result = self.close_channel().await;
        callback(result.as_ref().err());
        result
    }
}
