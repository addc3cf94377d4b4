//! Transport-agnostic RPC over length-prefixed byte channels.
//!
//! Two peers exchange requests, responses and one-way signals over any
//! ordered byte channel: TCP, Unix domain sockets, in-process pipes.
//!
//! # Crate Structure
//!
//! - [`channel`]: byte channel contract, listeners and connectors
//! - [`frame`]: length-prefixed framing and the stream parser
//! - [`codec`]: value model, custom type registry and payload framers
//! - [`peer`]: message protocol, provider, transport and connections (behind `peer` feature)

/// Re-export channel types.
pub mod channel {
    pub use wirerpc_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wirerpc_frame::*;
}

/// Re-export codec types.
pub mod codec {
    pub use wirerpc_codec::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use wirerpc_peer::*;
}
