// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for AMQP Exchanges
//!
//! Only a handful of failures originate in this crate: missing declarations,
//! missing configuration and payload serialization. Everything the broker or
//! the client library reports is carried through untouched.

use thiserror::Error;

/// Represents errors that can occur while declaring or opening an exchange.
///
/// Operations on an already opened exchange return `lapin::Error` directly;
/// this enum shows up where local validation or orchestration is involved.
#[derive(Error, Debug)]
pub enum AmqpError {
    /// A required declaration (`name`, `url` or `type`) was never provided
    #[error("you must provide `{0}` for the exchange declaration")]
    MissingOverride(&'static str),

    /// No broker url could be found in the environment
    #[error("missing configuration `{0}`")]
    MissingConfig(String),

    /// A declarative exchange configuration could not be read
    #[error("invalid exchange configuration: {0}")]
    InvalidConfig(String),

    /// The given text is not one of `direct`, `fanout` or `topic`
    #[error("invalid exchange type `{0}`")]
    InvalidExchangeKind(String),

    /// Error serializing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// The `before_create_channel` hook refused to continue
    #[error("before create channel hook failed: {0}")]
    HookError(String),

    /// Any error reported by the broker or the client library, unchanged
    #[error(transparent)]
    Broker(#[from] lapin::Error),
}
