//! Client configuration

use std::net::SocketAddr;

use crate::codec::DEFAULT_MAX_FRAME_LENGTH;

/// Client connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay address
    pub server_addr: SocketAddr,

    /// Display name stamped on outgoing messages
    pub username: String,

    /// Longest line accepted in either direction; should match the relay
    pub max_frame_length: usize,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl ClientConfig {
    /// Create a config for the given relay and username
    pub fn new(server_addr: SocketAddr, username: impl Into<String>) -> Self {
        Self {
            server_addr,
            username: username.into(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            tcp_nodelay: true,
        }
    }

    /// Set the maximum line length
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len.max(1);
        self
    }
}
