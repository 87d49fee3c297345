use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Address;

/// A scalar header value. Headers carry bookkeeping (e.g. broadcast's `from`/`seq_no`)
/// and never participate in message equality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Str(String),
    UInt(u64),
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Str(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Str(s)
    }
}

impl From<u64> for HeaderValue {
    fn from(n: u64) -> Self {
        HeaderValue::UInt(n)
    }
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            HeaderValue::UInt(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            HeaderValue::UInt(n) => Some(*n),
            HeaderValue::Str(_) => None,
        }
    }
}

/// A message exchanged between processes, over the network or through the local mailbox.
///
/// Two messages are equal iff their type tag and body are equal; headers and sender
/// are deliberately excluded so that a broadcast peer can rewrite the `sender` header
/// on a forwarded message without it being mistaken for a new message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub body: Value,
    #[serde(default)]
    pub headers: HashMap<String, HeaderValue>,
    pub sender: Address,
    #[serde(skip, default)]
    pub local: bool,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, body: Value, sender: Address) -> Self {
        Self {
            msg_type: msg_type.into(),
            body,
            headers: HashMap::new(),
            sender,
            local: false,
        }
    }

    /// Convenience constructor for a text-bodied message, the common case in the
    /// delivery-guarantee and RPC protocols.
    pub fn text(msg_type: impl Into<String>, body: impl Into<String>, sender: Address) -> Self {
        Self::new(msg_type, Value::String(body.into()), sender)
    }

    pub fn empty(msg_type: impl Into<String>, sender: Address) -> Self {
        Self::new(msg_type, Value::Null, sender)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body.as_str()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.msg_type == other.msg_type && self.body == other.body
    }
}

impl Eq for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn equality_ignores_headers_and_sender() {
        let a = Message::text("INFO-1", "a", addr()).with_header("seq_no", 1u64);
        let b = Message::text("INFO-1", "a", "127.0.0.1:9001".parse().unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn different_body_is_not_equal() {
        let a = Message::text("INFO-1", "a", addr());
        let b = Message::text("INFO-1", "b", addr());
        assert_ne!(a, b);
    }
}
