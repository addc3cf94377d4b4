use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use wirerpc_codec::Value;

use crate::failure::{FailureError, MethodError};
use crate::message::Id;
use crate::provider::{Context, Provider};

/// Boxed future returned by method handlers.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Value, MethodError>> + Send>>;

type Handler = dyn Fn(MethodContext, Vec<Value>) -> MethodFuture + Send + Sync;

/// Per-call view handed to a method handler.
#[derive(Clone)]
pub struct MethodContext {
    provider: Provider,
    method: String,
    id: Option<Id>,
    context: Option<Context>,
}

impl MethodContext {
    pub(crate) fn new(
        provider: Provider,
        method: impl Into<String>,
        id: Option<Id>,
        context: Option<Context>,
    ) -> Self {
        Self {
            provider,
            method: method.into(),
            id,
            context,
        }
    }

    /// Build an application error to return from the handler.
    pub fn error(&self, code: i64, message: impl Into<String>, data: Option<Value>) -> MethodError {
        let mut error = FailureError::new(code, message);
        error.data = data;
        MethodError::Failure(error)
    }

    /// Provider executing this call; use it to call back into the peer.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Id of the inbound request. `None` for local calls.
    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    /// Transport context the request arrived with.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }
}

impl fmt::Debug for MethodContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodContext")
            .field("method", &self.method)
            .field("id", &self.id)
            .field("context", &self.context)
            .finish()
    }
}

/// Free-form method metadata.
#[derive(Debug, Clone, Default)]
pub struct MethodOptions {
    pub description: Option<String>,
}

/// A registered method: handler plus options.
#[derive(Clone)]
pub struct Method {
    handler: Arc<Handler>,
    options: MethodOptions,
}

impl Method {
    /// Method backed by an async handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(MethodContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, MethodError>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx: MethodContext, params: Vec<Value>| -> MethodFuture {
                Box::pin(handler(ctx, params))
            }),
            options: MethodOptions::default(),
        }
    }

    /// Method backed by a synchronous handler.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(MethodContext, Vec<Value>) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(move |ctx: MethodContext, params: Vec<Value>| -> MethodFuture {
                let result = handler(ctx, params);
                Box::pin(async move { result })
            }),
            options: MethodOptions::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.options.description = Some(description.into());
        self
    }

    pub fn options(&self) -> &MethodOptions {
        &self.options
    }

    /// Invoke the handler with normalized parameters.
    pub async fn execute(
        &self,
        ctx: MethodContext,
        params: Option<Value>,
    ) -> Result<Value, MethodError> {
        (self.handler)(ctx, normalize_params(params)).await
    }
}

/// A bare synchronous handler registers as-is.
impl<F> From<F> for Method
where
    F: Fn(MethodContext, Vec<Value>) -> Result<Value, MethodError> + Send + Sync + 'static,
{
    fn from(handler: F) -> Self {
        Method::sync(handler)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Positional parameter list for a call.
///
/// Absent or null params give an empty list, a list passes through, any
/// other value becomes a single-element list.
pub fn normalize_params(params: Option<Value>) -> Vec<Value> {
    match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

/// Deserialize positional parameters into a typed tuple or struct.
///
/// Shape mismatches become an invalid-params error.
pub fn parse_params<T: DeserializeOwned>(params: Vec<Value>) -> Result<T, MethodError> {
    Value::Array(params).deserialize_into().map_err(|err| {
        MethodError::Failure(FailureError::invalid_params().with_data(err.to_string()))
    })
}
