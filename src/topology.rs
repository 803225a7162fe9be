// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Topology
//!
//! Asserting an exchange and applying its declared bindings. Nothing here runs
//! on its own: creating an [`ExchangeHandle`] never touches the broker, the
//! owner of the handle decides when to call these.

use crate::{
    channel::ExchangeChannel,
    exchange::{BindingTarget, Exchange},
    handle::ExchangeHandle,
};
use tracing::{debug, error};

/// Asserts the exchange on the broker with the declared type and options.
///
/// A declaration without options is asserted with the broker defaults.
pub async fn declare<D, C>(handle: &ExchangeHandle<D, C>) -> Result<(), lapin::Error>
where
    D: Exchange,
    C: ExchangeChannel + ?Sized,
{
    let decl = handle.declaration();
    let kind = decl.kind();
    let options = decl.options().unwrap_or_default();

    debug!(name = handle.name(), kind = kind.as_str(), "creating exchange");

    match handle
        .channel()
        .exchange_declare(
            handle.name(),
            kind,
            options.declare_options(),
            options.arguments().clone(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = handle.name(),
                "error to declare the exchange"
            );
            Err(err)
        }
        _ => {
            debug!("exchange: {} was created", handle.name());
            Ok(())
        }
    }
}

/// Applies the declared bindings in order, stopping at the first failure.
///
/// A queue binding binds the queue named by `source` to this exchange; an
/// exchange binding makes `source` receive from this exchange.
pub async fn apply_bindings<D, C>(handle: &ExchangeHandle<D, C>) -> Result<(), lapin::Error>
where
    D: Exchange,
    C: ExchangeChannel + ?Sized,
{
    for binding in handle.declaration().bindings() {
        debug!(
            "binding {:?}: {} to the exchange: {} with the key: {}",
            binding.to,
            binding.source,
            handle.name(),
            binding.routing_key
        );

        let channel = handle.channel();
        let result = match binding.to {
            BindingTarget::Queue => {
                channel
                    .queue_bind(
                        &binding.source,
                        handle.name(),
                        &binding.routing_key,
                        binding.args.clone(),
                    )
                    .await
            }
            BindingTarget::Exchange => {
                channel
                    .exchange_bind(
                        &binding.source,
                        handle.name(),
                        &binding.routing_key,
                        binding.args.clone(),
                    )
                    .await
            }
        };

        if let Err(err) = result {
            error!(
                error = err.to_string(),
                source = %binding.source,
                exchange = handle.name(),
                "error to apply the binding"
            );
            return Err(err);
        }
    }

    Ok(())
}

/// Asserts the exchange, then applies its bindings.
pub async fn install<D, C>(handle: &ExchangeHandle<D, C>) -> Result<(), lapin::Error>
where
    D: Exchange,
    C: ExchangeChannel + ?Sized,
{
    declare(handle).await?;
    apply_bindings(handle).await
}
