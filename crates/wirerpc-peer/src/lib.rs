//! RPC engine for wirerpc.
//!
//! [`Provider`] is the transaction core: it correlates responses to
//! outstanding requests, runs registered methods for inbound requests and
//! fans inbound signals out to listeners. [`Transport`] turns a byte channel
//! into messages, and [`Rpc`] wires the two together over one connection.

pub mod connector;
pub mod error;
pub mod failure;
mod listeners;
pub mod listener;
pub mod message;
pub mod method;
pub mod provider;
pub mod rpc;
pub mod transport;

pub use connector::{connect, connect_with_config};
pub use error::{PeerError, RequestError, Result};
pub use failure::{
    is_failure_error, make_failure_error_from, FailureError, MethodError, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use listener::RpcListener;
pub use message::{
    is_failure, is_request, is_response, is_signal, is_success, make_failure, make_request,
    make_success, Id, Message, PROTOCOL_FIELD, PROTOCOL_VERSION,
};
pub use method::{normalize_params, parse_params, Method, MethodContext, MethodFuture, MethodOptions};
pub use provider::{
    Context, Dispatch, PendingRequest, Provider, ProviderConfig, ProviderEvent, RequestOptions,
    Subscription, RESERVED_PREFIX,
};
pub use rpc::{Rpc, RpcConfig};
pub use transport::{Transport, TransportEvent, TransportSender};
