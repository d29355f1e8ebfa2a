//! Write-path configuration, built with the same `self -> Self`
//! chaining style as `rama-ws`'s `WebSocketConfig`.

use std::time::Duration;

use crate::conn::ProtocolLimits;

/// Tunables for the write pipeline, set once when a connection (or the
/// listener that spawns it) is configured.
#[derive(Debug, Clone, Copy)]
pub struct WriteConfig {
    pub tx_packet_size: Option<usize>,
    pub rx_buffer_size: usize,
    pub pt_serv_buf_size: usize,
    pub ietf_spec_revision: u8,
    pub http_content_timeout: Duration,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            tx_packet_size: None,
            rx_buffer_size: 4096,
            pt_serv_buf_size: 4096,
            ietf_spec_revision: 13,
            http_content_timeout: Duration::from_secs(30),
        }
    }
}

impl WriteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_packet_size(mut self, size: usize) -> Self {
        self.tx_packet_size = Some(size);
        self
    }

    pub fn rx_buffer_size(mut self, size: usize) -> Self {
        self.rx_buffer_size = size;
        self
    }

    pub fn pt_serv_buf_size(mut self, size: usize) -> Self {
        self.pt_serv_buf_size = size;
        self
    }

    pub fn http_content_timeout(mut self, timeout: Duration) -> Self {
        self.http_content_timeout = timeout;
        self
    }

    pub(crate) fn limits(&self) -> ProtocolLimits {
        ProtocolLimits {
            tx_packet_size: self.tx_packet_size,
            rx_buffer_size: self.rx_buffer_size,
            pt_serv_buf_size: self.pt_serv_buf_size,
        }
    }
}
