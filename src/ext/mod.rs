//! Extension chain.
//!
//! The core only ever sees one callback surface per extension:
//! `on_packet_tx_do_send` (an extension may take over the actual wire
//! write) and `on_payload_tx` (an extension may transform, split, or
//! withhold the payload). Modelled as a capability trait rather than
//! intrusive callback dispatch, to avoid shared mutable state between
//! extensions.

use crate::dispatch::WriteProtocol;
use crate::error::{BoxError, WriteError};

#[cfg(feature = "compression")]
pub mod deflate;

/// Result of offering a packet directly to the wire via an extension
/// (e.g. an alternative transport multiplexed over the same connection).
pub enum PacketTxResult {
    /// The extension wrote `n` bytes itself; the core must not touch the
    /// socket for this payload.
    Wrote(usize),
    /// The extension does not want to handle this packet.
    Passthrough,
}

/// Result of running a payload through one extension's `PAYLOAD_TX` pass.
pub struct PayloadTxResult {
    /// The (possibly replaced) payload to hand to the next stage.
    pub buf: Vec<u8>,
    /// Whether this extension replaced the buffer identity (returned a
    /// different allocation than it was given). When true, `clean_buffer`
    /// must be cleared on the connection: short writes can no longer be
    /// expressed in caller-buffer units.
    pub buffer_identity_changed: bool,
    /// The extension has more output queued for this logical write and
    /// must be offered another drain pass.
    pub more_to_drain: bool,
    /// RSV bits the extension wants OR'd into the WS frame header's byte
    /// 0. Zero unless an extension sets them.
    pub rsv: u8,
}

/// One extension in the chain. Control frames never traverse
/// `on_payload_tx`; the dispatcher enforces that by simply not calling
/// into the chain for control opcodes.
pub trait Extension: Send {
    fn name(&self) -> &str;

    fn on_packet_tx_do_send(&mut self, _buf: &[u8]) -> Result<PacketTxResult, BoxError> {
        Ok(PacketTxResult::Passthrough)
    }

    fn on_payload_tx(
        &mut self,
        input: &[u8],
        wp: WriteProtocol,
    ) -> Result<PayloadTxResult, BoxError>;
}

/// Ordered pipeline of extensions attached to a connection.
#[derive(Default)]
pub struct ExtensionChain {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ext: Box<dyn Extension>) {
        self.extensions.push(ext);
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Offer `buf` to every extension's `PACKET_TX_DO_SEND` in order; the
    /// first extension to claim it wins.
    pub fn packet_tx_do_send(&mut self, buf: &[u8]) -> Result<PacketTxResult, WriteError> {
        for ext in &mut self.extensions {
            match ext
                .on_packet_tx_do_send(buf)
                .map_err(WriteError::Extension)?
            {
                PacketTxResult::Wrote(n) => return Ok(PacketTxResult::Wrote(n)),
                PacketTxResult::Passthrough => continue,
            }
        }
        Ok(PacketTxResult::Passthrough)
    }

    /// Run `input` through every extension's `PAYLOAD_TX` pass, feeding
    /// each extension's output to the next.
    pub fn payload_tx(
        &mut self,
        input: &[u8],
        wp: WriteProtocol,
    ) -> Result<PayloadTxResult, WriteError> {
        let mut current = input.to_vec();
        let mut identity_changed = false;
        let mut more = false;
        let mut rsv = 0u8;
        for ext in &mut self.extensions {
            let result = ext
                .on_payload_tx(&current, wp)
                .map_err(WriteError::Extension)?;
            identity_changed |= result.buffer_identity_changed;
            more |= result.more_to_drain;
            rsv |= result.rsv;
            current = result.buf;
        }
        Ok(PayloadTxResult {
            buf: current,
            buffer_identity_changed: identity_changed,
            more_to_drain: more,
            rsv,
        })
    }
}
