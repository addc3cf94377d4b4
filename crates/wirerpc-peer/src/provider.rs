use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::Poll;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use wirerpc_codec::{DecodeError, Value};

use crate::error::{PeerError, RequestError, Result};
use crate::failure::{make_failure_error_from, FailureError, MethodError};
use crate::listeners::Listeners;
use crate::message::{Id, Message};
use crate::method::{Method, MethodContext};

/// Method names starting with this prefix are reserved.
pub const RESERVED_PREFIX: &str = "rpc.";

/// Transport metadata attached to inbound messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Identifier of the local connection.
    pub connection: Option<String>,
    /// Remote address, when the channel has one.
    pub peer: Option<String>,
}

/// Outbound sink for provider messages.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, message: Message, context: Option<&Context>) -> Result<()>;
}

impl<F> Dispatch for F
where
    F: Fn(Message, Option<&Context>) -> Result<()> + Send + Sync,
{
    fn dispatch(&self, message: Message, context: Option<&Context>) -> Result<()> {
        self(message, context)
    }
}

/// Provider behavior configuration.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Timeout applied to requests that do not set their own.
    pub default_timeout: Option<Duration>,
}

impl ProviderConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

/// Per-request options.
///
/// A bare `Duration` converts into options with that timeout. A zero timeout
/// disables the provider default for that request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
}

impl From<Duration> for RequestOptions {
    fn from(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl From<Option<Duration>> for RequestOptions {
    fn from(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl From<()> for RequestOptions {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

/// Observable provider side effects.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// Protocol-level error, local or reported by the remote.
    Error {
        error: FailureError,
        context: Option<Context>,
    },
    /// Signal nobody subscribed to.
    Signal {
        name: String,
        payload: Value,
        context: Option<Context>,
    },
    /// Response whose id matches no pending request.
    ResponseInvalidId {
        response: Message,
        context: Option<Context>,
    },
    /// The underlying channel terminated.
    Exit {
        code: Option<i32>,
        signal: Option<String>,
    },
}

impl ProviderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::Error { .. } => "error",
            ProviderEvent::Signal { .. } => "signal",
            ProviderEvent::ResponseInvalidId { .. } => "response:invalid-id",
            ProviderEvent::Exit { .. } => "exit",
        }
    }
}

type SignalListener = dyn Fn(&Value, Option<&Context>) + Send + Sync;
type EventListener = dyn Fn(&ProviderEvent) + Send + Sync;

struct Transaction {
    method: String,
    sender: oneshot::Sender<std::result::Result<Value, RequestError>>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    next_id: AtomicU64,
    config: ProviderConfig,
    methods: RwLock<HashMap<String, Method>>,
    signals: Mutex<Listeners<String, SignalListener>>,
    events: Mutex<Listeners<(), EventListener>>,
    transactions: Mutex<HashMap<u64, Transaction>>,
    dispatcher: RwLock<Option<Arc<dyn Dispatch>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, transaction) in self.transactions.get_mut().drain() {
            if let Some(timer) = transaction.timer {
                timer.abort();
            }
        }
    }
}

/// The RPC engine for one side of a connection.
///
/// Tracks outbound requests as transactions keyed by a per-instance counter,
/// routes inbound requests to registered methods and inbound signals to
/// listeners. Cloning yields another handle to the same provider.
///
/// Inbound requests are executed on spawned Tokio tasks, so
/// [`handle`](Self::handle) and [`request`](Self::request) with a timeout
/// must be called from within a runtime.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<Inner>,
}

impl Provider {
    /// Create a provider with no dispatcher attached.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                config,
                methods: RwLock::new(HashMap::new()),
                signals: Mutex::new(Listeners::new()),
                events: Mutex::new(Listeners::new()),
                transactions: Mutex::new(HashMap::new()),
                dispatcher: RwLock::new(None),
            }),
        }
    }

    pub fn with_dispatcher(config: ProviderConfig, dispatcher: impl Dispatch + 'static) -> Self {
        let provider = Self::new(config);
        provider.set_dispatcher(dispatcher);
        provider
    }

    /// Attach or replace the outbound dispatcher.
    pub fn set_dispatcher(&self, dispatcher: impl Dispatch + 'static) {
        *self.inner.dispatcher.write() = Some(Arc::new(dispatcher));
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    /// Send a message through the attached dispatcher.
    pub fn dispatch(&self, message: Message, context: Option<&Context>) -> Result<()> {
        let dispatcher = self.inner.dispatcher.read().clone();
        match dispatcher {
            Some(dispatcher) => dispatcher.dispatch(message, context),
            None => Err(PeerError::NoDispatcher),
        }
    }

    /// Register a method or a bare handler closure. Names in the reserved
    /// namespace are rejected.
    pub fn method(&self, name: impl Into<String>, method: impl Into<Method>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(PeerError::EmptyMethodName);
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(PeerError::ReservedMethod(name));
        }
        debug!(method = %name, "registered method");
        self.inner.methods.write().insert(name, method.into());
        Ok(())
    }

    /// Register several methods, stopping at the first invalid name.
    pub fn methods<I, S>(&self, methods: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Method)>,
        S: Into<String>,
    {
        for (name, method) in methods {
            self.method(name, method)?;
        }
        Ok(())
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.read().contains_key(name)
    }

    /// Remove a method. Returns whether it was registered.
    pub fn remove_method(&self, name: &str) -> bool {
        self.inner.methods.write().remove(name).is_some()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.methods.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn method_entries(&self) -> Vec<(String, Method)> {
        self.inner
            .methods
            .read()
            .iter()
            .map(|(name, method)| (name.clone(), method.clone()))
            .collect()
    }

    /// Subscribe to a signal. Every listener for the name fires, in
    /// registration order.
    pub fn on_signal<F>(&self, name: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Value, Option<&Context>) + Send + Sync + 'static,
    {
        let name = name.into();
        let id = self
            .inner
            .signals
            .lock()
            .add(name.clone(), Arc::new(listener));
        Subscription {
            id,
            target: Target::Signal(name),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Remove one signal listener.
    pub fn off_signal(&self, name: &str, subscription: &Subscription) -> bool {
        let owned = Weak::ptr_eq(&subscription.inner, &Arc::downgrade(&self.inner));
        match &subscription.target {
            Target::Signal(subscribed) if owned && subscribed == name => {
                self.inner.signals.lock().remove(subscription.id)
            }
            _ => false,
        }
    }

    /// Remove every listener for `name`, or every signal listener when `None`.
    pub fn off_all_signals(&self, name: Option<&str>) -> usize {
        let mut signals = self.inner.signals.lock();
        match name {
            Some(name) => signals.remove_key(&name.to_string()),
            None => signals.clear(),
        }
    }

    /// Number of listeners subscribed to `name`.
    pub fn signal_listeners(&self, name: &str) -> usize {
        self.inner.signals.lock().count(&name.to_string())
    }

    /// Subscribe to provider events.
    pub fn on_event<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ProviderEvent) + Send + Sync + 'static,
    {
        let id = self.inner.events.lock().add((), Arc::new(listener));
        Subscription {
            id,
            target: Target::Event,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every event listener, synchronously.
    pub fn emit(&self, event: ProviderEvent) {
        let listeners = self.inner.events.lock().snapshot(&());
        if listeners.is_empty() {
            if let ProviderEvent::Error { error, .. } = &event {
                debug!(%error, "unobserved provider error");
            }
            return;
        }
        for listener in listeners {
            listener(&event);
        }
    }

    /// Invoke a registered method locally.
    pub async fn call(
        &self,
        name: &str,
        params: impl Into<Value>,
    ) -> std::result::Result<Value, MethodError> {
        let method = self.inner.methods.read().get(name).cloned();
        let Some(method) = method else {
            return Err(FailureError::method_not_found().with_data(name).into());
        };
        let ctx = MethodContext::new(self.clone(), name, None, None);
        method.execute(ctx, Some(params.into())).await
    }

    /// Route one inbound message.
    ///
    /// Never fails: protocol problems turn into outbound failures or events.
    pub fn handle(&self, message: Message, context: Option<Context>) {
        match message {
            Message::Signal { method, params } => {
                self.handle_signal(method, params.unwrap_or_default(), context)
            }
            Message::Request { method, params, id } => {
                self.handle_request(method, params, id, context)
            }
            Message::Success { result, id } => self.handle_response(id, Ok(result), context),
            Message::Failure { error, id } => self.handle_response(id, Err(error), context),
            Message::Malformed { id, .. } => {
                let error = FailureError::parse_error();
                warn!(?id, "malformed message");
                self.emit(ProviderEvent::Error {
                    error: error.clone(),
                    context: context.clone(),
                });
                self.reply(Message::failure(error, id), context.as_ref());
            }
        }
    }

    /// Classify and route a decoded value.
    pub fn handle_value(&self, value: Value, context: Option<Context>) {
        self.handle(Message::from_value(value), context);
    }

    /// Report a payload that could not be decoded.
    pub fn handle_decode_error(&self, error: &DecodeError, context: Option<Context>) {
        let error = FailureError::parse_error().with_data(error.to_string());
        warn!(%error, "undecodable payload");
        self.emit(ProviderEvent::Error {
            error: error.clone(),
            context: context.clone(),
        });
        self.reply(Message::failure(error, None), context.as_ref());
    }

    /// Issue an outbound request.
    ///
    /// The request is dispatched before this returns; the returned future
    /// settles when the transaction completes, fails or times out.
    pub fn request(
        &self,
        method: &str,
        params: impl Into<Value>,
        options: impl Into<RequestOptions>,
    ) -> PendingRequest {
        let options = options.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        self.inner.transactions.lock().insert(
            id,
            Transaction {
                method: method.to_string(),
                sender,
                timer: None,
            },
        );

        let timeout = options
            .timeout
            .or(self.inner.config.default_timeout)
            .filter(|timeout| !timeout.is_zero());
        if let Some(after) = timeout {
            let timer = self.arm_timeout(id, after);
            if let Some(transaction) = self.inner.transactions.lock().get_mut(&id) {
                transaction.timer = Some(timer);
            }
        }

        let params = Some(params.into()).filter(|params| !params.is_null());
        debug!(id, method, ?timeout, "request issued");
        if let Err(source) = self.dispatch(Message::request(method, params, id), None) {
            if let Some(transaction) = self.claim(id) {
                if let Some(timer) = transaction.timer {
                    timer.abort();
                }
            }
            return PendingRequest {
                id,
                state: PendingState::Failed(Some(RequestError::Dispatch { id, source })),
            };
        }

        PendingRequest {
            id,
            state: PendingState::Waiting(receiver),
        }
    }

    /// Send a fire-and-forget signal.
    pub fn signal(&self, name: &str, payload: impl Into<Value>) -> Result<()> {
        let payload = Some(payload.into()).filter(|payload| !payload.is_null());
        trace!(signal = name, "signal sent");
        self.dispatch(Message::signal(name, payload), None)
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.transactions.lock().len()
    }

    fn claim(&self, id: u64) -> Option<Transaction> {
        self.inner.transactions.lock().remove(&id)
    }

    fn arm_timeout(&self, id: u64, after: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let transaction = inner.transactions.lock().remove(&id);
            if let Some(transaction) = transaction {
                warn!(id, method = %transaction.method, ?after, "request timed out");
                let _ = transaction
                    .sender
                    .send(Err(RequestError::Timeout { id, after }));
            }
        })
    }

    fn reply(&self, message: Message, context: Option<&Context>) {
        if let Err(error) = self.dispatch(message, context) {
            warn!(%error, "failed to dispatch response");
        }
    }

    fn handle_signal(&self, name: String, payload: Value, context: Option<Context>) {
        let listeners = self.inner.signals.lock().snapshot(&name);
        trace!(signal = %name, listeners = listeners.len(), "signal received");
        if listeners.is_empty() {
            self.emit(ProviderEvent::Signal {
                name,
                payload,
                context,
            });
            return;
        }
        for listener in listeners {
            listener(&payload, context.as_ref());
        }
    }

    fn handle_request(&self, name: String, params: Option<Value>, id: Id, context: Option<Context>) {
        let method = self.inner.methods.read().get(&name).cloned();
        let Some(method) = method else {
            debug!(method = %name, %id, "method not found");
            self.reply(
                Message::failure(FailureError::method_not_found(), Some(id)),
                context.as_ref(),
            );
            return;
        };

        let provider = self.clone();
        tokio::spawn(async move {
            let ctx = MethodContext::new(provider.clone(), name.as_str(), Some(id.clone()), context.clone());
            let outcome = AssertUnwindSafe(method.execute(ctx, params))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(MethodError::exception("panic", panic_message(&*panic))));
            match outcome {
                Ok(result) => provider.reply_success(&name, result, id, context),
                Err(error) => {
                    let error = make_failure_error_from(error);
                    debug!(method = %name, %id, %error, "method failed");
                    provider.reply(Message::failure(error, Some(id)), context.as_ref());
                }
            }
        });
    }

    /// Send a method's result. A result with no wire form, or one above the
    /// payload limit, is answered with an internal error for the same id.
    fn reply_success(&self, method: &str, result: Value, id: Id, context: Option<Context>) {
        let response = Message::success(result, Some(id.clone()));
        let reason = match self.dispatch(response, context.as_ref()) {
            Ok(()) => return,
            Err(error) if is_unsendable(&error) => error,
            Err(error) => {
                warn!(%error, "failed to dispatch response");
                return;
            }
        };

        let error = FailureError::internal().with_data(reason.to_string());
        warn!(%method, %id, %reason, "method result could not be sent");
        self.emit(ProviderEvent::Error {
            error: error.clone(),
            context: context.clone(),
        });
        match self.dispatch(Message::failure(error, Some(id.clone())), context.as_ref()) {
            // The detailed error can itself exceed the payload limit.
            Err(error) if is_unsendable(&error) => self.reply(
                Message::failure(FailureError::internal(), Some(id)),
                context.as_ref(),
            ),
            Err(error) => warn!(%error, "failed to dispatch response"),
            Ok(()) => {}
        }
    }

    fn handle_response(
        &self,
        id: Option<Id>,
        outcome: std::result::Result<Value, FailureError>,
        context: Option<Context>,
    ) {
        let transaction = id.as_ref().and_then(Id::as_u64).and_then(|id| self.claim(id));
        let Some(transaction) = transaction else {
            match (outcome, id) {
                (Err(error), None) => self.emit(ProviderEvent::Error { error, context }),
                (outcome, id) => {
                    warn!(?id, "response does not match a pending request");
                    let response = match outcome {
                        Ok(result) => Message::success(result, id),
                        Err(error) => Message::failure(error, id),
                    };
                    self.emit(ProviderEvent::ResponseInvalidId { response, context });
                }
            }
            return;
        };

        if let Some(timer) = transaction.timer {
            timer.abort();
        }
        trace!(?id, method = %transaction.method, ok = outcome.is_ok(), "request settled");
        let _ = transaction
            .sender
            .send(outcome.map_err(RequestError::Failure));
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new(ProviderConfig::default())
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("methods", &self.method_names())
            .field("pending", &self.pending_requests())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// The message itself cannot go on the wire, as opposed to the channel being gone.
fn is_unsendable(error: &PeerError) -> bool {
    matches!(error, PeerError::Encode(_) | PeerError::Frame(_))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "method panicked".to_string()
    }
}

#[derive(Debug, Clone)]
enum Target {
    Signal(String),
    Event,
}

/// Handle returned by [`Provider::on_signal`] and [`Provider::on_event`].
///
/// Dropping the handle keeps the listener registered; call
/// [`dispose`](Self::dispose) to remove it.
pub struct Subscription {
    id: u64,
    target: Target,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Unsubscribe exactly this listener. Returns whether it was still registered.
    pub fn dispose(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        match &self.target {
            Target::Signal(_) => inner.signals.lock().remove(self.id),
            Target::Event => inner.events.lock().remove(self.id),
        }
    }

    /// Signal name, for signal subscriptions.
    pub fn signal(&self) -> Option<&str> {
        match &self.target {
            Target::Signal(name) => Some(name),
            Target::Event => None,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish()
    }
}

/// Future for an outbound request.
#[derive(Debug)]
pub struct PendingRequest {
    id: u64,
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Waiting(oneshot::Receiver<std::result::Result<Value, RequestError>>),
    Failed(Option<RequestError>),
}

impl PendingRequest {
    /// Transaction id assigned to this request.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingRequest {
    type Output = std::result::Result<Value, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match &mut self.state {
            PendingState::Waiting(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(RequestError::Abandoned { id }))),
            PendingState::Failed(error) => {
                Poll::Ready(Err(error.take().unwrap_or(RequestError::Abandoned { id })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn recording() -> (Provider, Arc<Mutex<Vec<Message>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let provider = Provider::with_dispatcher(
            ProviderConfig::default(),
            move |message: Message, _: Option<&Context>| {
                sink.lock().push(message);
                Ok(())
            },
        );
        (provider, sent)
    }

    fn events(provider: &Provider) -> Arc<Mutex<Vec<ProviderEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        provider.on_event(move |event| sink.lock().push(event.clone()));
        seen
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        let provider = Provider::default();
        let err = provider
            .method("rpc.discover", Method::sync(|_, _| Ok(Value::Null)))
            .unwrap_err();
        assert!(matches!(err, PeerError::ReservedMethod(name) if name == "rpc.discover"));
        assert!(matches!(
            provider.method("", Method::sync(|_, _| Ok(Value::Null))),
            Err(PeerError::EmptyMethodName)
        ));
        assert!(provider.method_names().is_empty());
    }

    #[tokio::test]
    async fn bare_closures_register_as_methods() {
        let provider = Provider::default();
        provider
            .method(
                "double",
                |_: MethodContext, params: Vec<Value>| -> std::result::Result<Value, MethodError> {
                    let n = params.first().and_then(Value::as_i64).unwrap_or_default();
                    Ok(Value::from(n * 2))
                },
            )
            .unwrap();

        assert!(provider.has_method("double"));
        assert_eq!(provider.call("double", 21).await.unwrap(), Value::from(42));
    }

    #[test]
    fn method_table_operations() {
        let provider = Provider::default();
        provider
            .methods([
                ("b", Method::sync(|_, _| Ok(Value::Null))),
                ("a", Method::sync(|_, _| Ok(Value::Null))),
            ])
            .unwrap();
        assert_eq!(provider.method_names(), vec!["a", "b"]);
        assert!(provider.has_method("a"));
        assert!(provider.remove_method("a"));
        assert!(!provider.remove_method("a"));
        assert!(!provider.has_method("a"));
    }

    #[test]
    fn transaction_ids_are_distinct_and_increasing() {
        let (provider, sent) = recording();
        let pending: Vec<PendingRequest> =
            (0..10).map(|_| provider.request("m", Value::Null, ())).collect();

        let ids: Vec<u64> = pending.iter().map(PendingRequest::id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        let wire_ids: Vec<Option<u64>> = sent
            .lock()
            .iter()
            .map(|m| m.id().and_then(Id::as_u64))
            .collect();
        assert_eq!(wire_ids, (0..10).map(Some).collect::<Vec<_>>());
        assert_eq!(provider.pending_requests(), 10);
    }

    #[test]
    fn ids_are_per_instance() {
        let (a, _) = recording();
        let (b, _) = recording();
        assert_eq!(a.request("m", Value::Null, ()).id(), 0);
        assert_eq!(b.request("m", Value::Null, ()).id(), 0);
        assert_eq!(a.request("m", Value::Null, ()).id(), 1);
    }

    #[test]
    fn request_omits_null_params() {
        let (provider, sent) = recording();
        let _pending = provider.request("noArgs", Value::Null, ());
        let _pending = provider.request("add", vec![1, 2], ());
        let sent = sent.lock();
        assert!(matches!(&sent[0], Message::Request { params: None, .. }));
        assert!(matches!(&sent[1], Message::Request { params: Some(Value::Array(_)), .. }));
    }

    #[tokio::test]
    async fn response_resolves_exactly_once() {
        let (provider, _) = recording();
        let events = events(&provider);
        let pending = provider.request("m", Value::Null, ());
        let id = Some(Id::from(pending.id()));

        provider.handle(Message::success(Value::from(1), id.clone()), None);
        provider.handle(Message::success(Value::from(2), id), None);

        assert_eq!(pending.await.unwrap(), Value::from(1));
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "response:invalid-id");
    }

    #[tokio::test]
    async fn failure_response_rejects_with_remote_error() {
        let (provider, _) = recording();
        let pending = provider.request("m", Value::Null, ());
        let error = FailureError::new(-1000, "An error message");
        provider.handle(Message::failure(error.clone(), Some(Id::from(pending.id()))), None);

        let err = pending.await.unwrap_err();
        assert_eq!(err.failure(), Some(&error));
    }

    #[tokio::test]
    async fn timeout_rejects_and_late_response_is_unmatched() {
        let (provider, _) = recording();
        let events = events(&provider);
        let pending = provider.request("slow", Value::Null, Duration::from_millis(20));
        let id = pending.id();

        let err = pending.await.unwrap_err();
        assert!(matches!(err, RequestError::Timeout { id: timed_out, .. } if timed_out == id));
        assert_eq!(provider.pending_requests(), 0);

        provider.handle(Message::success(Value::from(1), Some(Id::from(id))), None);
        assert_eq!(events.lock()[0].name(), "response:invalid-id");
    }

    #[tokio::test]
    async fn zero_timeout_overrides_default() {
        let provider = Provider::with_dispatcher(
            ProviderConfig::default().with_default_timeout(Duration::from_millis(10)),
            |_: Message, _: Option<&Context>| Ok(()),
        );
        let pending = provider.request("m", Value::Null, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(provider.pending_requests(), 1);
        drop(pending);
    }

    #[tokio::test]
    async fn missing_dispatcher_fails_the_request() {
        let provider = Provider::default();
        let err = provider.request("m", Value::Null, ()).await.unwrap_err();
        assert!(matches!(
            err,
            RequestError::Dispatch {
                source: PeerError::NoDispatcher,
                ..
            }
        ));
        assert_eq!(provider.pending_requests(), 0);
    }

    #[tokio::test]
    async fn dropped_provider_abandons_requests() {
        let (provider, _) = recording();
        let pending = provider.request("m", Value::Null, ());
        drop(provider);
        assert!(matches!(pending.await, Err(RequestError::Abandoned { id: 0 })));
    }

    #[tokio::test]
    async fn unregistered_method_replies_method_not_found() {
        let (provider, sent) = recording();
        provider.handle(Message::request("ghost", None, 4u64), None);

        let sent = sent.lock();
        match &sent[0] {
            Message::Failure { error, id } => {
                assert!(error.is_method_not_found());
                assert_eq!(error.message, "Method not found");
                assert_eq!(id, &Some(Id::from(4u64)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_method_still_gets_a_response() {
        let (provider, sent) = recording();
        provider
            .method("boom", Method::sync(|_, _| panic!("kaboom")))
            .unwrap();
        provider.handle(Message::request("boom", None, 1u64), None);

        for _ in 0..50 {
            if !sent.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let sent = sent.lock();
        match &sent[0] {
            Message::Failure { error, .. } => {
                assert!(error.is_internal());
                assert_eq!(
                    error.data.as_ref().and_then(|d| d.get("message")).and_then(Value::as_str),
                    Some("kaboom")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_message_replies_parse_error_with_recovered_id() {
        let (provider, sent) = recording();
        let events = events(&provider);
        provider.handle_value(
            Value::from(serde_json::json!({"jsonrpc": "2.0", "id": 3})),
            None,
        );

        match &sent.lock()[0] {
            Message::Failure { error, id } => {
                assert!(error.is_parse_error());
                assert_eq!(id, &Some(Id::from(3u64)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events.lock()[0].name(), "error");
    }

    #[test]
    fn decode_error_replies_with_null_id() {
        let (provider, sent) = recording();
        let err = serde_json::from_slice::<serde_json::Value>(b"{")
            .map(|_| ())
            .unwrap_err();
        provider.handle_decode_error(&DecodeError::Json(err), None);

        let sent = sent.lock();
        match &sent[0] {
            Message::Failure { error, id } => {
                assert!(error.is_parse_error());
                assert!(id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn orphan_failure_is_reported_as_error_event() {
        let (provider, sent) = recording();
        let events = events(&provider);
        provider.handle(Message::failure(FailureError::parse_error(), None), None);

        assert!(sent.lock().is_empty());
        let events = events.lock();
        assert!(matches!(&events[0], ProviderEvent::Error { error, .. } if error.is_parse_error()));
    }

    #[test]
    fn unmatched_signal_goes_to_catch_all() {
        let provider = Provider::default();
        let events = events(&provider);
        provider.handle(Message::signal("nobody", Some(Value::from(1))), None);

        let events = events.lock();
        match &events[0] {
            ProviderEvent::Signal { name, payload, .. } => {
                assert_eq!(name, "nobody");
                assert_eq!(payload, &Value::from(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn signal_subscriptions() {
        let provider = Provider::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let first = provider.on_signal("tick", move |_, _| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = Arc::clone(&hits);
        let second = provider.on_signal("tick", move |_, _| {
            h2.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(provider.signal_listeners("tick"), 2);

        provider.handle(Message::signal("tick", None), None);
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        assert!(first.dispose());
        assert!(!first.dispose());
        provider.handle(Message::signal("tick", None), None);
        assert_eq!(hits.load(Ordering::SeqCst), 21);

        assert!(!provider.off_signal("tock", &second));
        assert!(provider.off_signal("tick", &second));
        assert_eq!(second.signal(), Some("tick"));

        provider.on_signal("a", |_, _| {});
        provider.on_signal("b", |_, _| {});
        assert_eq!(provider.off_all_signals(Some("a")), 1);
        assert_eq!(provider.off_all_signals(None), 1);
    }

    #[tokio::test]
    async fn local_call_normalizes_params() {
        let provider = Provider::default();
        provider
            .method(
                "count",
                Method::sync(|_, params| Ok(Value::from(params.len() as u64))),
            )
            .unwrap();

        assert_eq!(provider.call("count", Value::Null).await.unwrap(), Value::from(0u64));
        assert_eq!(provider.call("count", 7).await.unwrap(), Value::from(1u64));
        assert_eq!(
            provider.call("count", vec![1, 2, 3]).await.unwrap(),
            Value::from(3u64)
        );
        assert!(matches!(
            provider.call("ghost", Value::Null).await,
            Err(MethodError::Failure(error)) if error.is_method_not_found()
        ));
    }
}
