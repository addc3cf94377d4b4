use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;
use wirerpc_channel::{ChannelListener, Endpoint};
use wirerpc_codec::{Framer, JsonFramer};

use crate::error::Result;
use crate::method::Method;
use crate::provider::Provider;
use crate::rpc::{Rpc, RpcConfig};

/// Listens for and accepts RPC connections.
///
/// Methods registered on the listener are installed on every accepted
/// connection before it starts reading.
pub struct RpcListener {
    listener: ChannelListener,
    config: RpcConfig,
    framer: Arc<dyn Framer>,
    template: Provider,
    next_connection_id: AtomicU64,
}

impl RpcListener {
    /// Bind to a TCP address or socket path.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = ChannelListener::bind(endpoint).await?;
        Ok(Self {
            listener,
            config: RpcConfig::default(),
            framer: Arc::new(JsonFramer::new()),
            template: Provider::default(),
            next_connection_id: AtomicU64::new(1),
        })
    }

    /// Override the per-connection config. The id is assigned per connection.
    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Framer shared by every accepted connection.
    pub fn with_framer(mut self, framer: Arc<dyn Framer>) -> Self {
        self.framer = framer;
        self
    }

    /// Register a method for all future connections.
    pub fn method(&self, name: impl Into<String>, method: impl Into<Method>) -> Result<()> {
        self.template.method(name, method)
    }

    /// Method names installed on accepted connections.
    pub fn method_names(&self) -> Vec<String> {
        self.template.method_names()
    }

    /// Accept the next connection and assign an auto-generated id.
    pub async fn accept(&self) -> Result<Rpc> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_id(&format!("conn-{id}")).await
    }

    /// Accept the next connection and use an explicit id.
    pub async fn accept_with_id(&self, id: &str) -> Result<Rpc> {
        let stream = self.listener.accept().await?;
        let mut config = self.config.clone().with_id(id);
        config.peer = stream.peer_addr();
        info!(connection = id, kind = stream.kind(), peer = ?config.peer, "accepted connection");

        let provider = Provider::new(config.provider.clone());
        provider.methods(self.template.method_entries())?;
        Ok(Rpc::with_provider(
            stream,
            config,
            Arc::clone(&self.framer),
            provider,
        ))
    }

    /// The endpoint actually bound.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(self.listener.local_endpoint()?)
    }
}
