use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use wirerpc_channel::Channel;
use wirerpc_codec::{Framer, JsonFramer};
use wirerpc_frame::ParserConfig;

use crate::failure::FailureError;
use crate::message::Message;
use crate::provider::{Context, Provider, ProviderConfig, ProviderEvent};
use crate::transport::{Transport, TransportEvent, TransportSender};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Connection configuration.
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    /// Connection identifier used in logs and inbound contexts. Generated
    /// when absent.
    pub id: Option<String>,
    /// Remote address reported in inbound contexts.
    pub peer: Option<String>,
    pub provider: ProviderConfig,
    pub parser: ParserConfig,
}

impl RpcConfig {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Default timeout for outbound requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.provider.default_timeout = Some(timeout);
        self
    }

    /// Largest payload accepted or sent, in bytes.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.parser.max_payload = max_payload;
        self
    }
}

/// A provider wired to a channel.
///
/// Owns a background task that feeds inbound messages to the provider in
/// arrival order. Dereferences to the [`Provider`] for registering methods
/// and issuing requests. Dropping the handle stops the task and releases the
/// channel.
pub struct Rpc {
    id: String,
    provider: Provider,
    framer: Arc<dyn Framer>,
    sender: TransportSender,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Rpc {
    /// Wire a channel with the default JSON framer.
    pub fn new<C: Channel>(channel: C, config: RpcConfig) -> Self {
        Self::with_framer(channel, config, Arc::new(JsonFramer::new()))
    }

    /// Wire a channel with an explicit framer.
    pub fn with_framer<C: Channel>(channel: C, config: RpcConfig, framer: Arc<dyn Framer>) -> Self {
        let provider = Provider::new(config.provider.clone());
        Self::start(channel, config, framer, provider)
    }

    /// Wire a channel to an already configured provider.
    ///
    /// Methods registered on `provider` beforehand are reachable from the
    /// first inbound message on.
    pub fn with_provider<C: Channel>(
        channel: C,
        config: RpcConfig,
        framer: Arc<dyn Framer>,
        provider: Provider,
    ) -> Self {
        Self::start(channel, config, framer, provider)
    }

    fn start<C: Channel>(
        channel: C,
        config: RpcConfig,
        framer: Arc<dyn Framer>,
        provider: Provider,
    ) -> Self {
        let id = config
            .id
            .unwrap_or_else(|| format!("rpc-{}", NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)));
        let context = Context {
            connection: Some(id.clone()),
            peer: config.peer,
        };

        let mut transport =
            Transport::new(Arc::clone(&framer), config.parser).with_context(context);
        transport.bind(channel);
        let sender = transport.sender();

        let outbound = sender.clone();
        provider.set_dispatcher(move |message: Message, _: Option<&Context>| outbound.send(&message));

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(transport, provider.clone(), shutdown_rx, id.clone()));
        info!(connection = %id, "rpc started");

        Self {
            id,
            provider,
            framer,
            sender,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Framer shared by both directions.
    ///
    /// Custom types cannot be added through this handle: register their
    /// codecs on the [`JsonFramer`] before passing it to
    /// [`with_framer`](Self::with_framer).
    pub fn framer(&self) -> &Arc<dyn Framer> {
        &self.framer
    }

    /// Whether outbound messages can still be sent.
    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }

    /// Stop reading, flush queued messages and release the channel.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.closed().await;
    }

    /// Wait until the connection ends on its own or through [`close`](Self::close).
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                debug!(connection = %self.id, %error, "rpc task ended abnormally");
            }
        }
    }
}

impl Deref for Rpc {
    type Target = Provider;

    fn deref(&self) -> &Provider {
        &self.provider
    }
}

impl fmt::Debug for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpc")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("provider", &self.provider)
            .finish()
    }
}

async fn run(
    mut transport: Transport,
    provider: Provider,
    mut shutdown: oneshot::Receiver<()>,
    id: String,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!(connection = %id, "rpc closing");
                break;
            }
            event = transport.recv() => match event {
                Some(TransportEvent::Message { message, context }) => provider.handle(message, context),
                Some(TransportEvent::DecodeError { error, context, .. }) => {
                    provider.handle_decode_error(&error, context)
                }
                Some(TransportEvent::Closed { error }) => {
                    if let Some(error) = error {
                        provider.emit(ProviderEvent::Error {
                            error: FailureError::internal().with_data(error.to_string()),
                            context: transport.context().cloned(),
                        });
                    }
                    break;
                }
                None => break,
            },
        }
    }

    transport.close().await;
    info!(connection = %id, "rpc closed");
    provider.emit(ProviderEvent::Exit {
        code: None,
        signal: None,
    });
}
