// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Runs against a live broker when `AMQP_URL` or `CLOUDAMQP_URL` is set.

use amqp_exchange::{
    config::AmqpConfig,
    connection::open_exchange,
    errors::AmqpError,
    exchange::{Exchange, ExchangeKind},
    publisher::PublishOptions,
    topology,
};
use async_trait::async_trait;
use lapin::{options::ExchangeDeleteOptions, Connection};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

struct Foo {
    url: String,
    refuse_channel: bool,
    before_create: AtomicUsize,
    closed: AtomicUsize,
    errors: AtomicUsize,
}

impl Foo {
    fn new(url: String, refuse_channel: bool) -> Arc<Self> {
        Arc::new(Foo {
            url,
            refuse_channel,
            before_create: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Exchange for Foo {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn kind(&self) -> ExchangeKind {
        ExchangeKind::FANOUT
    }

    fn on_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _err: &lapin::Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    async fn before_create_channel(&self, conn: &Connection) -> Result<(), AmqpError> {
        assert!(conn.status().connected());
        self.before_create.fetch_add(1, Ordering::SeqCst);

        if self.refuse_channel {
            return Err(AmqpError::HookError("not ready".to_owned()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn fanout_without_bindings_is_destroyed_and_channel_stays_open() {
    let Ok(cfg) = AmqpConfig::from_env() else {
        return;
    };
    let foo = Foo::new(cfg.url, false);

    let (conn, exchange) = open_exchange(foo.clone(), "Foo").await.unwrap();
    assert_eq!(foo.before_create.load(Ordering::SeqCst), 1);
    assert_eq!(exchange.name(), "Foo");

    topology::declare(&exchange).await.unwrap();
    exchange
        .destroy(ExchangeDeleteOptions {
            if_unused: true,
            nowait: false,
        })
        .await
        .unwrap();
    assert!(exchange.channel().inner().status().connected());

    exchange.close_channel().await.unwrap();
    assert_eq!(foo.closed.load(Ordering::SeqCst), 1);
    assert_eq!(foo.errors.load(Ordering::SeqCst), 0);

    conn.close(200, "OK").await.unwrap();
}

#[tokio::test]
async fn refusing_hook_stops_before_the_channel_exists() {
    let Ok(cfg) = AmqpConfig::from_env() else {
        return;
    };
    let foo = Foo::new(cfg.url, true);

    let result = open_exchange(foo.clone(), "Foo").await;

    assert!(matches!(result, Err(AmqpError::HookError(msg)) if msg == "not ready"));
    assert_eq!(foo.before_create.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broker_closing_the_channel_reaches_error_then_close_hooks_once() {
    let Ok(cfg) = AmqpConfig::from_env() else {
        return;
    };
    let foo = Foo::new(cfg.url, false);

    let (conn, exchange) = open_exchange(foo.clone(), "amqp-exchange.never-declared")
        .await
        .unwrap();

    // the broker answers the publish to an unknown exchange with channel.close 404
    let _ = exchange
        .publish(b"lost", "", PublishOptions::new())
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(foo.errors.load(Ordering::SeqCst), 1);
    assert_eq!(foo.closed.load(Ordering::SeqCst), 1);

    conn.close(200, "OK").await.unwrap();
}
