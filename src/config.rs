// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Configuration
//!
//! Broker settings read from the environment and exchanges declared as data
//! instead of code. A [`ConfiguredExchange`] behaves exactly like a hand written
//! [`Exchange`] implementation once its configuration has been validated.

use crate::{
    channel::ReturnedMessage,
    errors::AmqpError,
    exchange::{Binding, Exchange, ExchangeKind, ExchangeOptions, SocketOptions},
};
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

/// Environment variable holding the broker url
pub const AMQP_URL_ENV: &str = "AMQP_URL";
/// Fallback environment variable, as set by hosted brokers
pub const CLOUDAMQP_URL_ENV: &str = "CLOUDAMQP_URL";

/// Broker settings shared by the exchanges of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmqpConfig {
    pub url: String,
}

impl AmqpConfig {
    /// Loads `.env` when present, then reads `AMQP_URL` or `CLOUDAMQP_URL`.
    pub fn from_env() -> Result<Self, AmqpError> {
        if dotenv::dotenv().is_err() {
            debug!("no .env file loaded");
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, AmqpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        [AMQP_URL_ENV, CLOUDAMQP_URL_ENV]
            .into_iter()
            .find_map(|key| lookup(key).filter(|url| !url.is_empty()))
            .map(|url| AmqpConfig { url })
            .ok_or_else(|| AmqpError::MissingConfig(AMQP_URL_ENV.to_owned()))
    }
}

/// An exchange declared as data, e.g. in a JSON file.
///
/// ```json
/// {
///   "name": "Orders",
///   "type": "topic",
///   "options": { "durable": true, "arguments": { "alternate-exchange": "unrouted" } },
///   "bindings": [{ "routing_key": "orders.#", "source": "audit", "to": "queue" }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub name: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ExchangeKind>,
    pub socket_options: Option<SocketOptions>,
    pub options: Option<ExchangeOptions>,
    pub bindings: Vec<Binding>,
    pub publisher_confirms: bool,
}

impl ExchangeConfig {
    pub fn from_json(text: &str) -> Result<Self, AmqpError> {
        serde_json::from_str(text).map_err(|err| {
            error!(error = err.to_string(), "failure to read exchange configuration");
            AmqpError::InvalidConfig(err.to_string())
        })
    }

    /// Uses the broker url from `cfg` when the declaration has none.
    pub fn with_default_url(mut self, cfg: &AmqpConfig) -> Self {
        self.url.get_or_insert_with(|| cfg.url.clone());
        self
    }

    /// Checks that `name`, `url` and `type` are all declared.
    pub fn validate(self) -> Result<ConfiguredExchange, AmqpError> {
        let name = self.name.ok_or(AmqpError::MissingOverride("name"))?;
        let url = self.url.ok_or(AmqpError::MissingOverride("url"))?;
        let kind = self.kind.ok_or(AmqpError::MissingOverride("type"))?;

        Ok(ConfiguredExchange {
            name,
            url,
            kind,
            socket_options: self.socket_options,
            options: self.options,
            bindings: self.bindings,
            publisher_confirms: self.publisher_confirms,
        })
    }
}

/// A validated [`ExchangeConfig`]. Its hooks log the channel events.
#[derive(Debug, Clone)]
pub struct ConfiguredExchange {
    name: String,
    url: String,
    kind: ExchangeKind,
    socket_options: Option<SocketOptions>,
    options: Option<ExchangeOptions>,
    bindings: Vec<Binding>,
    publisher_confirms: bool,
}

impl ConfiguredExchange {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Exchange for ConfiguredExchange {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn kind(&self) -> ExchangeKind {
        self.kind
    }

    fn socket_options(&self) -> Option<SocketOptions> {
        self.socket_options.clone()
    }

    fn options(&self) -> Option<ExchangeOptions> {
        self.options.clone()
    }

    fn bindings(&self) -> Vec<Binding> {
        self.bindings.clone()
    }

    fn publisher_confirms(&self) -> bool {
        self.publisher_confirms
    }

    fn on_close(&self) {
        debug!(exchange = %self.name, "channel closed");
    }

    fn on_error(&self, err: &lapin::Error) {
        error!(error = err.to_string(), exchange = %self.name, "channel error");
    }

    fn on_return(&self, msg: &ReturnedMessage) {
        warn!(
            exchange = %self.name,
            routing_key = %msg.routing_key,
            reply_code = msg.reply_code,
            "message returned as unroutable"
        );
    }

    fn on_drain(&self) {
        debug!(exchange = %self.name, "channel drained");
    }
}

/// Converts a JSON value into the closest AMQP field value.
pub fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AMQPValue::LongLongInt(i),
            None => AMQPValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        Value::Array(items) => {
            AMQPValue::FieldArray(FieldArray::from(items.iter().map(amqp_value).collect::<Vec<_>>()))
        }
        Value::Object(map) => AMQPValue::FieldTable(field_table(map)),
    }
}

/// Converts a JSON object into an AMQP argument table.
pub fn field_table(map: &Map<String, Value>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in map {
        table.insert(ShortString::from(key.as_str()), amqp_value(value));
    }
    table
}

pub(crate) fn deserialize_arguments<'de, D>(deserializer: D) -> Result<FieldTable, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<Map<String, Value>>::deserialize(deserializer)?;
    Ok(map.as_ref().map(field_table).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::BindingTarget;
    use serde_json::json;

    #[test]
    fn url_prefers_amqp_url() {
        let cfg = AmqpConfig::from_lookup(|key| match key {
            AMQP_URL_ENV => Some("amqp://primary".to_owned()),
            CLOUDAMQP_URL_ENV => Some("amqp://cloud".to_owned()),
            _ => None,
        });

        assert_eq!(cfg.unwrap().url, "amqp://primary");
    }

    #[test]
    fn url_falls_back_to_cloudamqp() {
        let cfg = AmqpConfig::from_lookup(|key| match key {
            AMQP_URL_ENV => Some(String::new()),
            CLOUDAMQP_URL_ENV => Some("amqp://cloud".to_owned()),
            _ => None,
        });

        assert_eq!(cfg.unwrap().url, "amqp://cloud");
    }

    #[test]
    fn url_missing_everywhere_is_an_error() {
        assert!(matches!(
            AmqpConfig::from_lookup(|_| None),
            Err(AmqpError::MissingConfig(key)) if key == AMQP_URL_ENV
        ));
    }

    #[test]
    fn full_declaration_validates() {
        let cfg = ExchangeConfig::from_json(
            r#"{
                "name": "Orders",
                "url": "amqp://localhost",
                "type": "topic",
                "publisher_confirms": true,
                "socket_options": { "connection_name": "orders-service" },
                "options": { "durable": true, "arguments": { "alternate-exchange": "unrouted" } },
                "bindings": [
                    { "routing_key": "orders.#", "source": "audit", "to": "queue" },
                    { "routing_key": "orders.closed", "source": "Archive", "to": "exchange",
                      "args": { "x-priority": 3 } }
                ]
            }"#,
        )
        .unwrap();

        let exchange = cfg.validate().unwrap();

        assert_eq!(exchange.name(), "Orders");
        assert_eq!(exchange.url(), "amqp://localhost");
        assert_eq!(exchange.kind(), ExchangeKind::Topic);
        assert!(exchange.publisher_confirms());
        assert_eq!(
            exchange.socket_options().and_then(|o| o.connection_name),
            Some("orders-service".to_owned())
        );

        let options = exchange.options().unwrap();
        assert!(options.is_durable());
        assert_eq!(
            options
                .arguments()
                .inner()
                .get(&ShortString::from("alternate-exchange")),
            Some(&AMQPValue::LongString(LongString::from("unrouted")))
        );

        let bindings = exchange.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].to, BindingTarget::Queue);
        assert!(bindings[0].args.inner().is_empty());
        assert_eq!(bindings[1].to, BindingTarget::Exchange);
        assert_eq!(
            bindings[1].args.inner().get(&ShortString::from("x-priority")),
            Some(&AMQPValue::LongLongInt(3))
        );
    }

    #[test]
    fn optional_declarations_default_to_empty() {
        let exchange = ExchangeConfig::from_json(
            r#"{ "name": "Foo", "url": "amqp://localhost", "type": "fanout" }"#,
        )
        .unwrap()
        .validate()
        .unwrap();

        assert!(exchange.socket_options().is_none());
        assert!(exchange.options().is_none());
        assert!(exchange.bindings().is_empty());
        assert!(!exchange.publisher_confirms());
    }

    #[test]
    fn missing_type_is_a_missing_override() {
        let cfg = ExchangeConfig::from_json(r#"{ "name": "Foo", "url": "amqp://localhost" }"#)
            .unwrap();

        assert!(matches!(
            cfg.validate(),
            Err(AmqpError::MissingOverride("type"))
        ));
    }

    #[test]
    fn missing_url_is_a_missing_override_unless_defaulted() {
        let cfg = ExchangeConfig::from_json(r#"{ "name": "Foo", "type": "direct" }"#).unwrap();

        assert!(matches!(
            cfg.clone().validate(),
            Err(AmqpError::MissingOverride("url"))
        ));

        let defaults = AmqpConfig {
            url: "amqp://from-env".to_owned(),
        };
        let exchange = cfg.with_default_url(&defaults).validate().unwrap();
        assert_eq!(exchange.url(), "amqp://from-env");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(matches!(
            ExchangeConfig::from_json(r#"{ "name": "Foo", "type": "headers" }"#),
            Err(AmqpError::InvalidConfig(_))
        ));
    }

    #[test]
    fn json_values_map_to_amqp_values() {
        assert_eq!(amqp_value(&json!(null)), AMQPValue::Void);
        assert_eq!(amqp_value(&json!(true)), AMQPValue::Boolean(true));
        assert_eq!(amqp_value(&json!(-4)), AMQPValue::LongLongInt(-4));
        assert_eq!(amqp_value(&json!(1.5)), AMQPValue::Double(1.5));
        assert_eq!(
            amqp_value(&json!(["a"])),
            AMQPValue::FieldArray(FieldArray::from(vec![AMQPValue::LongString(
                LongString::from("a")
            )]))
        );

        let nested = amqp_value(&json!({ "inner": { "ttl": 10 } }));
        let AMQPValue::FieldTable(table) = nested else {
            panic!("expected a table");
        };
        assert!(matches!(
            table.inner().get(&ShortString::from("inner")),
            Some(AMQPValue::FieldTable(_))
        ));
    }
}
