use std::fmt;

use serde_json::Number;
use wirerpc_codec::{Map, Value};

use crate::failure::{is_failure_error, FailureError};

/// Protocol tag field.
pub const PROTOCOL_FIELD: &str = "jsonrpc";

/// Protocol tag value every message carries.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Request/response correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum Id {
    Number(Number),
    String(String),
}

impl Id {
    /// Read an id from a value. Only numbers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Id::Number(n.clone())),
            Value::String(s) => Some(Id::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Id::Number(n) => Value::Number(n.clone()),
            Id::String(s) => Value::String(s.clone()),
        }
    }

    /// Numeric id as issued by a provider's transaction counter.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Id::Number(n) => n.as_u64(),
            Id::String(_) => None,
        }
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Self {
        Id::Number(Number::from(id))
    }
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Id::Number(Number::from(id))
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Id::String(id.to_string())
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Id::String(id)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A decoded protocol message.
///
/// Inbound values are classified once by [`Message::from_value`]; anything
/// that is none of the four valid shapes is kept as `Malformed`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        method: String,
        params: Option<Value>,
        id: Id,
    },
    Signal {
        method: String,
        params: Option<Value>,
    },
    Success {
        result: Value,
        id: Option<Id>,
    },
    Failure {
        error: FailureError,
        id: Option<Id>,
    },
    Malformed {
        value: Value,
        id: Option<Id>,
    },
}

impl Message {
    pub fn request(method: impl Into<String>, params: Option<Value>, id: impl Into<Id>) -> Self {
        Message::Request {
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    pub fn signal(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Signal {
            method: method.into(),
            params,
        }
    }

    pub fn success(result: Value, id: Option<Id>) -> Self {
        Message::Success { result, id }
    }

    pub fn failure(error: FailureError, id: Option<Id>) -> Self {
        Message::Failure { error, id }
    }

    /// Classify a decoded value.
    ///
    /// Precedence: signal, request, success, failure; everything else is
    /// malformed, keeping whatever id could be recovered.
    pub fn from_value(value: Value) -> Self {
        let id = value.get("id").and_then(Id::from_value);
        let shape = if is_request(&value) {
            Shape::Request
        } else if is_success(&value) {
            Shape::Success
        } else if is_failure(&value) {
            Shape::Failure
        } else {
            Shape::Malformed
        };

        let mut map = match value {
            Value::Object(map) => map,
            other => return Message::Malformed { value: other, id },
        };
        match shape {
            Shape::Request => {
                if let Some(Value::String(method)) = map.remove("method") {
                    let params = map.remove("params");
                    return match id {
                        Some(id) => Message::Request { method, params, id },
                        None => Message::Signal { method, params },
                    };
                }
            }
            Shape::Success => {
                let result = map.remove("result").unwrap_or_default();
                return Message::Success { result, id };
            }
            Shape::Failure => {
                if let Some(error) = map.get("error").and_then(FailureError::from_value) {
                    return Message::Failure { error, id };
                }
            }
            Shape::Malformed => {}
        }
        Message::Malformed {
            value: Value::Object(map),
            id,
        }
    }

    /// Wire form of the message.
    pub fn to_value(&self) -> Value {
        match self {
            Message::Request { method, params, id } => {
                make_request(method, params.clone(), Some(id.clone()))
            }
            Message::Signal { method, params } => make_request(method, params.clone(), None),
            Message::Success { result, id } => make_success(result.clone(), id.clone()),
            Message::Failure { error, id } => make_failure(error, id.clone()),
            Message::Malformed { value, .. } => value.clone(),
        }
    }

    /// Correlation id, if the message carries one.
    pub fn id(&self) -> Option<&Id> {
        match self {
            Message::Request { id, .. } => Some(id),
            Message::Signal { .. } => None,
            Message::Success { id, .. }
            | Message::Failure { id, .. }
            | Message::Malformed { id, .. } => id.as_ref(),
        }
    }

    /// Short name of the message kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::Signal { .. } => "signal",
            Message::Success { .. } => "success",
            Message::Failure { .. } => "failure",
            Message::Malformed { .. } => "malformed",
        }
    }
}

enum Shape {
    Request,
    Success,
    Failure,
    Malformed,
}

fn has_protocol_tag(value: &Value) -> bool {
    value.get(PROTOCOL_FIELD).and_then(Value::as_str) == Some(PROTOCOL_VERSION)
}

/// `id` absent, a number or a string.
fn is_request_id(id: Option<&Value>) -> bool {
    matches!(id, None | Some(Value::Number(_)) | Some(Value::String(_)))
}

/// `id` a number, a string or null. An absent id reads as null.
fn is_response_id(id: Option<&Value>) -> bool {
    matches!(
        id,
        None | Some(Value::Null) | Some(Value::Number(_)) | Some(Value::String(_))
    )
}

pub fn is_request(value: &Value) -> bool {
    has_protocol_tag(value)
        && value.get("method").and_then(Value::as_str).is_some()
        && is_request_id(value.get("id"))
}

pub fn is_signal(value: &Value) -> bool {
    is_request(value) && value.get("id").is_none()
}

pub fn is_success(value: &Value) -> bool {
    has_protocol_tag(value) && value.get("result").is_some() && is_response_id(value.get("id"))
}

pub fn is_failure(value: &Value) -> bool {
    has_protocol_tag(value)
        && value.get("error").is_some_and(is_failure_error)
        && is_response_id(value.get("id"))
}

pub fn is_response(value: &Value) -> bool {
    is_success(value) || is_failure(value)
}

fn envelope() -> Map {
    let mut map = Map::new();
    map.insert(PROTOCOL_FIELD.to_string(), Value::from(PROTOCOL_VERSION));
    map
}

/// Build a request, or a signal when `id` is `None`. Absent fields are omitted.
pub fn make_request(method: &str, params: Option<Value>, id: Option<Id>) -> Value {
    let mut map = envelope();
    map.insert("method".to_string(), Value::from(method));
    if let Some(params) = params {
        map.insert("params".to_string(), params);
    }
    if let Some(id) = id {
        map.insert("id".to_string(), id.to_value());
    }
    Value::Object(map)
}

/// Build a success response. A missing id is written as null.
pub fn make_success(result: Value, id: Option<Id>) -> Value {
    let mut map = envelope();
    map.insert("result".to_string(), result);
    map.insert("id".to_string(), id.map_or(Value::Null, |id| id.to_value()));
    Value::Object(map)
}

/// Build a failure response. A missing id is written as null.
pub fn make_failure(error: &FailureError, id: Option<Id>) -> Value {
    let mut map = envelope();
    map.insert("error".to_string(), error.to_value());
    map.insert("id".to_string(), id.map_or(Value::Null, |id| id.to_value()));
    Value::Object(map)
}
