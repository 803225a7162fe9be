// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Management
//!
//! Opens the connection and channel for a declared exchange. The declaration's
//! `before_create_channel` hook runs between the two, and is awaited before
//! the channel is created.

use crate::{channel::LapinChannel, errors::AmqpError, exchange::Exchange, handle::ExchangeHandle};
use lapin::{options::ConfirmSelectOptions, Connection};
use std::{future::Future, sync::Arc};
use tracing::{debug, error};

/// Connects to the declaration's broker with its socket options.
///
/// # Parameters
/// * `declaration` - The exchange declaration providing url and socket options
///
/// # Returns
/// The open connection, or the client library's error unchanged
pub async fn connect<D>(declaration: &D) -> Result<Connection, AmqpError>
where
    D: Exchange,
{
    debug!("creating amqp connection...");
    let options = declaration
        .socket_options()
        .unwrap_or_default()
        .into_properties();

    match Connection::connect(&declaration.url(), options).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(conn)
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::Broker(err))
        }
    }
}

/// Runs the `before_create_channel` hook, then opens a channel on `conn`.
///
/// The channel is put in confirm mode when the declaration asks for
/// publisher confirms.
///
/// # Parameters
/// * `declaration` - The exchange declaration owning the hook
/// * `conn` - The connection shared by every channel of the process
///
/// # Returns
/// The new channel, or the hook's error when it refused to continue
pub async fn create_channel<D>(
    declaration: &D,
    conn: &Connection,
) -> Result<LapinChannel, AmqpError>
where
    D: Exchange,
{
    after_hook(declaration.before_create_channel(conn), || async {
        debug!("creating amqp channel...");
        let channel = conn.create_channel().await.map_err(|err| {
            error!(error = err.to_string(), "error to create the channel");
            AmqpError::Broker(err)
        })?;

        if declaration.publisher_confirms() {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|err| {
                    error!(error = err.to_string(), "error to enable publisher confirms");
                    AmqpError::Broker(err)
                })?;
        }

        debug!(channel = channel.id(), "channel created");
        Ok::<_, AmqpError>(LapinChannel::new(channel))
    })
    .await
}

/// Awaits `hook` to completion and only then runs `create`.
async fn after_hook<H, C, F, T>(hook: H, create: C) -> Result<T, AmqpError>
where
    H: Future<Output = Result<(), AmqpError>>,
    C: FnOnce() -> F,
    F: Future<Output = Result<T, AmqpError>>,
{
    hook.await
        .inspect_err(|err| error!(error = err.to_string(), "before create channel hook failed"))?;

    create().await
}

/// Opens a connection and a channel for `declaration` and binds them under `name`.
///
/// The exchange is not asserted and no binding is applied; see
/// [`crate::topology::install`]. No step is retried.
///
/// # Example
/// ```no_run
/// # use amqp_exchange::{connection::open_exchange, exchange::{Exchange, ExchangeKind}, topology};
/// # use std::sync::Arc;
/// # struct Foo;
/// # impl Exchange for Foo {
/// #     fn url(&self) -> String { "amqp://localhost".to_owned() }
/// #     fn kind(&self) -> ExchangeKind { ExchangeKind::FANOUT }
/// # }
/// # async fn run() -> Result<(), amqp_exchange::errors::AmqpError> {
/// let (conn, exchange) = open_exchange(Arc::new(Foo), "Foo").await?;
/// topology::declare(&exchange).await?;
/// exchange.close_channel().await?;
/// conn.close(200, "OK").await?;
/// # Ok(())
/// # }
/// ```
pub async fn open_exchange<D>(
    declaration: Arc<D>,
    name: &str,
) -> Result<(Arc<Connection>, ExchangeHandle<D, LapinChannel>), AmqpError>
where
    D: Exchange,
{
    let conn = connect(declaration.as_ref()).await?;
    let channel = create_channel(declaration.as_ref(), &conn).await?;

    Ok((
        Arc::new(conn),
        ExchangeHandle::new(Arc::new(channel), name, declaration),
    ))
}
