use std::fmt;

use wirerpc_codec::{Map, Value};

/// Invalid payload encoding.
pub const PARSE_ERROR: i64 = -32700;
/// Well-formed payload that is not a valid message.
pub const INVALID_REQUEST: i64 = -32600;
/// No method registered under the requested name.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Parameters rejected by the method.
pub const INVALID_PARAMS: i64 = -32602;
/// Catch-all for errors raised while executing a method.
pub const INTERNAL_ERROR: i64 = -32603;

/// Error object carried by failure responses.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct FailureError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl FailureError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, "Invalid params")
    }

    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }

    pub fn is_parse_error(&self) -> bool {
        self.code == PARSE_ERROR
    }

    pub fn is_invalid_request(&self) -> bool {
        self.code == INVALID_REQUEST
    }

    pub fn is_method_not_found(&self) -> bool {
        self.code == METHOD_NOT_FOUND
    }

    pub fn is_invalid_params(&self) -> bool {
        self.code == INVALID_PARAMS
    }

    pub fn is_internal(&self) -> bool {
        self.code == INTERNAL_ERROR
    }

    /// Wire form: `{code, message, data?}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::from(self.code));
        map.insert("message".to_string(), Value::from(self.message.as_str()));
        if let Some(data) = &self.data {
            map.insert("data".to_string(), data.clone());
        }
        Value::Object(map)
    }

    /// Read the wire form back. `None` unless `value` is failure-shaped.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !is_failure_error(value) {
            return None;
        }
        Some(Self {
            code: value.get("code")?.as_i64()?,
            message: value.get("message")?.as_str()?.to_string(),
            data: value.get("data").cloned(),
        })
    }
}

/// Whether `value` has the `{code: integer, message: string}` shape.
pub fn is_failure_error(value: &Value) -> bool {
    value.get("code").and_then(Value::as_i64).is_some()
        && value.get("message").and_then(Value::as_str).is_some()
}

/// What a method handler raised.
///
/// Normalized into a [`FailureError`] by [`make_failure_error_from`] before it
/// crosses the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodError {
    /// A protocol or application failure, sent as-is.
    Failure(FailureError),
    /// An exception-like error: a kind name, a message and extra fields.
    Exception {
        name: String,
        message: String,
        fields: Map,
    },
    /// Any other raised value.
    Raw(Value),
}

impl MethodError {
    pub fn exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        MethodError::Exception {
            name: name.into(),
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// Attach an extra field to an exception. Other variants are unchanged.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let MethodError::Exception { fields, .. } = &mut self {
            fields.insert(key.into(), value.into());
        }
        self
    }

    pub fn raw(value: impl Into<Value>) -> Self {
        MethodError::Raw(value.into())
    }

    /// Exception from any `std::error::Error`, named after its type.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self::exception(name, error.to_string())
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodError::Failure(error) => write!(f, "{error}"),
            MethodError::Exception { name, message, .. } => write!(f, "{name}: {message}"),
            MethodError::Raw(value) => write!(f, "raised {} value", value.kind()),
        }
    }
}

impl std::error::Error for MethodError {}

impl From<FailureError> for MethodError {
    fn from(error: FailureError) -> Self {
        MethodError::Failure(error)
    }
}

/// Normalize whatever a method raised into a wire error.
///
/// - failures and failure-shaped raw values pass through as copies;
/// - exceptions become internal errors with `{name, message, ..fields}` as data;
/// - anything else becomes an internal error with the raw value as data.
pub fn make_failure_error_from(error: MethodError) -> FailureError {
    match error {
        MethodError::Failure(error) => error,
        MethodError::Exception {
            name,
            message,
            fields,
        } => {
            let mut data = Map::new();
            data.insert("name".to_string(), Value::from(name));
            data.insert("message".to_string(), Value::from(message));
            data.extend(fields);
            FailureError::internal().with_data(data)
        }
        MethodError::Raw(value) => match FailureError::from_value(&value) {
            Some(error) => error,
            None => FailureError::internal().with_data(value),
        },
    }
}
