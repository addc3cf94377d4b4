use std::sync::Arc;

use wirerpc_channel::Endpoint;
use wirerpc_codec::{Framer, JsonFramer};

use crate::error::Result;
use crate::rpc::{Rpc, RpcConfig};

/// Connect to a listening peer with default configuration.
pub async fn connect(endpoint: &Endpoint) -> Result<Rpc> {
    connect_with_config(endpoint, RpcConfig::default(), None).await
}

/// Connect with explicit configuration and, optionally, a custom framer.
pub async fn connect_with_config(
    endpoint: &Endpoint,
    mut config: RpcConfig,
    framer: Option<Arc<dyn Framer>>,
) -> Result<Rpc> {
    let stream = wirerpc_channel::connect(endpoint).await?;
    if config.peer.is_none() {
        config.peer = stream.peer_addr().or_else(|| Some(endpoint.to_string()));
    }
    let framer = framer.unwrap_or_else(|| Arc::new(JsonFramer::new()));
    Ok(Rpc::with_framer(stream, config, framer))
}
