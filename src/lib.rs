// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod channel;
pub mod config;
pub mod connection;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod handle;
pub mod publisher;
pub mod topology;

#[cfg(feature = "mocks")]
pub use channel::MockExchangeChannel;
