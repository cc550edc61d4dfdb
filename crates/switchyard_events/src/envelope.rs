//! # Message Envelope
//!
//! The unit of exchange on the wire: an event name plus an optional body.
//!
//! ```json
//! { "event": "chat.join", "body": { "room": "lobby" } }
//! ```
//!
//! The body is captured as an opaque JSON document when the envelope is
//! parsed and is only decoded into a concrete type when a handler asks for
//! it. Decoding can happen any number of times and into different types.
//! PascalCase field names (`Event`, `Body`, `Headers`) are accepted on input
//! so peers that serialize with .NET conventions interoperate.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Event name plus lazily decoded payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing key used by the dispatcher
    #[serde(alias = "Event", default)]
    pub event: String,

    #[serde(alias = "Body", default)]
    body: Option<Value>,

    /// Free-form metadata carried alongside the payload
    #[serde(
        alias = "Headers",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub headers: HashMap<String, String>,
}

impl Envelope {
    /// Creates an envelope for `event` with no body.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            body: None,
            headers: HashMap::new(),
        }
    }

    /// Creates an envelope for `event` carrying `body`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if `body` cannot be represented as JSON.
    pub fn with_body<T: Serialize>(event: impl Into<String>, body: &T) -> Result<Self, serde_json::Error> {
        let mut envelope = Self::new(event);
        envelope.set_body(body)?;
        Ok(envelope)
    }

    /// Parses an envelope from its JSON text form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serializes the envelope to its JSON text form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Replaces the body with the JSON form of `body`.
    pub fn set_body<T: Serialize>(&mut self, body: &T) -> Result<(), serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(())
    }

    pub fn clear_body(&mut self) {
        self.body = None;
    }

    /// The raw captured body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Decodes the body into `T`.
    ///
    /// Returns `Ok(None)` when no body has been set (a JSON `null` body
    /// counts as absent), so callers can tell "nothing sent" apart from a
    /// payload that failed to decode.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.body {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some),
        }
    }

    /// Decodes the body into `T`, treating an absent body as JSON `null`.
    ///
    /// This is what handler arguments use: `Option<T>` arguments see `None`.
    /// Types that reject `null` get a second attempt against an empty
    /// object, so `#[serde(default)]` structs decode to their defaults.
    pub fn decode_or_null<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.body {
            Some(value) => T::deserialize(value),
            None => T::deserialize(&Value::Null).or_else(|null_error| {
                T::deserialize(&Value::Object(Map::new())).map_err(|_| null_error)
            }),
        }
    }

    /// Whether the envelope names an event the dispatcher can route.
    pub fn is_dispatchable(&self) -> bool {
        !self.event.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn ping_payload_survives_the_wire() {
        let envelope = Envelope::with_body("ping", &Ping { n: 1 }).unwrap();
        let text = envelope.to_json().unwrap();
        assert_eq!(text, r#"{"event":"ping","body":{"n":1}}"#);

        let parsed = Envelope::from_json(&text).unwrap();
        assert_eq!(parsed.event, "ping");
        assert_eq!(parsed.decode::<Ping>().unwrap(), Some(Ping { n: 1 }));
    }

    #[test]
    fn decoding_without_body_yields_absence() {
        let envelope = Envelope::new("ping");
        assert_eq!(envelope.decode::<Ping>().unwrap(), None);

        let nulled = Envelope::from_json(r#"{"event":"ping","body":null}"#).unwrap();
        assert_eq!(nulled.decode::<Ping>().unwrap(), None);
        assert_eq!(nulled.decode_or_null::<Option<Ping>>().unwrap(), None);
    }

    #[test]
    fn absent_body_falls_back_to_defaults() {
        #[derive(Debug, Default, PartialEq, Deserialize)]
        #[serde(default)]
        struct Settings {
            volume: u8,
            muted: bool,
        }

        let envelope = Envelope::new("settings");
        assert_eq!(envelope.decode_or_null::<Settings>().unwrap(), Settings::default());
        assert!(envelope.decode_or_null::<Ping>().is_err());
        assert!(envelope.decode_or_null::<u32>().is_err());
    }

    #[test]
    fn body_decodes_into_several_types() {
        let envelope = Envelope::from_json(r#"{"event":"ping","body":{"n":7}}"#).unwrap();
        assert_eq!(envelope.decode::<Ping>().unwrap(), Some(Ping { n: 7 }));
        assert_eq!(envelope.decode::<Value>().unwrap(), Some(json!({"n": 7})));
        assert!(envelope.decode::<Vec<u8>>().is_err());
    }

    #[test]
    fn accepts_pascal_case_fields() {
        let envelope =
            Envelope::from_json(r#"{"Event":"join","Body":{"n":2},"Headers":{"trace":"abc"}}"#).unwrap();
        assert_eq!(envelope.event, "join");
        assert_eq!(envelope.decode::<Ping>().unwrap(), Some(Ping { n: 2 }));
        assert_eq!(envelope.headers.get("trace").map(String::as_str), Some("abc"));
    }

    #[test]
    fn blank_event_is_not_dispatchable() {
        assert!(!Envelope::new("").is_dispatchable());
        assert!(!Envelope::new("   ").is_dispatchable());
        assert!(!Envelope::from_json(r#"{"body":{}}"#).unwrap().is_dispatchable());
        assert!(Envelope::new("ping").is_dispatchable());
    }
}
