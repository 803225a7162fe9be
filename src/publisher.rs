// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publish Options
//!
//! The options handed to the channel with every publish. The presets and
//! header helpers here are opt-in: an exchange forwards whatever options it is
//! given without adding anything.

use crate::otel;
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, ShortString},
    BasicProperties,
};
use opentelemetry::Context;
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Flags and message properties for a single publish.
///
/// `mandatory` asks the broker to return the message when it cannot be routed;
/// returned messages surface through the exchange's `on_return` hook.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub mandatory: bool,
    pub immediate: bool,
    pub properties: BasicProperties,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a JSON payload: JSON content type and a fresh message id.
    pub fn json() -> Self {
        Self::default().as_json()
    }

    /// Marks the payload as JSON, keeping every other flag and property.
    ///
    /// A message id is generated only when none was set.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn as_json(mut self) -> Self {
        let mut properties = self
            .properties
            .with_content_type(ShortString::from(JSON_CONTENT_TYPE));
        if properties.message_id().is_none() {
            properties =
                properties.with_message_id(ShortString::from(Uuid::new_v4().to_string()));
        }
        self.properties = properties;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn properties(mut self, properties: BasicProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Adds a single header, keeping the ones already set.
    pub fn with_header(mut self, key: &str, value: AMQPValue) -> Self {
        let mut headers = self.properties.headers().clone().unwrap_or_default();
        headers.insert(ShortString::from(key), value);
        self.properties = self.properties.with_headers(headers);
        self
    }

    /// Propagates `ctx` through the headers using the global text map propagator.
    pub fn with_trace_context(mut self, ctx: &Context) -> Self {
        let headers = otel::inject(ctx, self.properties.headers().as_ref());
        self.properties = self.properties.with_headers(headers);
        self
    }

    pub(crate) fn basic_options(&self) -> BasicPublishOptions {
        BasicPublishOptions {
            mandatory: self.mandatory,
            immediate: self.immediate,
        }
    }
}
