// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Context in AMQP Headers
//!
//! Carries trace context in message headers: injected into outgoing messages on
//! request and read back from messages the broker returns as unroutable.

use lapin::types::{AMQPValue, FieldTable, ShortString};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use std::collections::BTreeMap;
use tracing::error;

/// Adapter letting OpenTelemetry propagators read and write AMQP headers.
pub(crate) struct HeadersPropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> HeadersPropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for HeadersPropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

impl Extractor for HeadersPropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Writes the fields of the global text map propagator for `ctx` into `headers`.
pub(crate) fn inject(ctx: &Context, headers: Option<&FieldTable>) -> FieldTable {
    let mut btree = headers.map(|h| h.inner().clone()).unwrap_or_default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut HeadersPropagator::new(&mut btree))
    });

    FieldTable::from(btree)
}

/// Reads a trace context back out of `headers` with the global text map propagator.
pub(crate) fn extract(headers: Option<&FieldTable>) -> Context {
    let mut btree = headers.map(|h| h.inner().clone()).unwrap_or_default();

    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeadersPropagator::new(&mut btree))
    })
}
