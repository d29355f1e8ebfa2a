//! Per-connection state relevant to the write pipeline.

use std::pin::Pin;
use std::task::Context;

use tokio::io::AsyncWrite;

use crate::config::WriteConfig;
use crate::error::Result;
use crate::ext::ExtensionChain;
use crate::h2::{H2Substate, H2_FRAME_HEADER_LEN};
use crate::stats::WriteStats;
use crate::trunc::{DrainOutcome, Trunc};
use crate::ws::{Role, WsSubstate, LWS_PRE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    WsClient,
    WsServer,
    Http1Serving,
    Http2Serving,
    Http2WsServing,
}

impl Mode {
    pub fn is_ws(self) -> bool {
        matches!(self, Self::WsClient | Self::WsServer | Self::Http2WsServing)
    }

    pub fn is_h2(self) -> bool {
        matches!(self, Self::Http2Serving | Self::Http2WsServing)
    }

    pub fn role(self) -> Role {
        match self {
            Self::WsClient => Role::Client,
            _ => Role::Server,
        }
    }

    /// Headroom a [`crate::ws::FramedBuf`] must carry before it can be
    /// handed to `dispatch::write` in this mode. WS-over-HTTP/2 stacks a
    /// WS header and an HTTP/2 frame header into the same buffer, so it
    /// needs more room than either framer alone.
    pub fn required_headroom(self) -> usize {
        if self == Self::Http2WsServing {
            LWS_PRE + H2_FRAME_HEADER_LEN
        } else {
            LWS_PRE
        }
    }
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Http,
    WsEstablished,
    ReturnedCloseAlready,
    WaitingToSendCloseNotification,
    AwaitingCloseAck,
    FlushingSendBeforeClose,
}

impl ConnState {
    pub fn accepts_ws_write(self) -> bool {
        matches!(
            self,
            Self::WsEstablished | Self::WaitingToSendCloseNotification
        )
    }

    /// True once the local side has started or finished its half of the
    /// close handshake, in any of the ways that can happen: the local
    /// CLOSE is still being framed, already fully sent, or already
    /// answered by the peer's own closing frame elsewhere.
    pub fn is_close_handshake(self) -> bool {
        matches!(
            self,
            Self::WaitingToSendCloseNotification
                | Self::AwaitingCloseAck
                | Self::ReturnedCloseAlready
                | Self::FlushingSendBeforeClose
        )
    }
}

/// Byte range for a multipart/byteranges response.
#[derive(Debug, Clone, Copy)]
pub struct RangeDescriptor {
    pub start: u64,
    pub end: u64,
    pub budget: usize,
    pub inside: bool,
}

/// File-serving substate.
#[derive(Default)]
pub struct HttpSubstate {
    pub filepos: u64,
    pub filelen: u64,
    pub tx_content_length: u64,
    pub tx_content_remain: u64,
    pub range: Option<RangeDescriptor>,
    pub range_queue: Vec<RangeDescriptor>,
    pub sending_chunked: bool,
    pub multipart_content_type: Option<String>,
    pub multipart_total_len: u64,
    /// Set for the duration of a range (single or multi-range) transfer.
    /// Completion and the final-fragment flag are driven by range
    /// exhaustion rather than by `filepos == filelen`, since a ranged
    /// transfer legitimately stops short of the file's end.
    pub ranged: bool,
}

/// Per-protocol write limits feeding the size ceiling the raw issuer
/// enforces.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolLimits {
    pub tx_packet_size: Option<usize>,
    pub rx_buffer_size: usize,
    pub pt_serv_buf_size: usize,
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self {
            tx_packet_size: None,
            rx_buffer_size: 4096,
            pt_serv_buf_size: 4096,
        }
    }
}

/// Outcome of draining residue through a connection that may be partway
/// into a graceful close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainResult {
    /// Residue remains; re-arm the writable callback.
    Partial,
    /// Residue fully drained; normal operation continues.
    Done,
    /// Residue fully drained while flushing the last bytes before
    /// close; the caller should close the connection now instead of
    /// waiting for a further writable event.
    ReadyToClose,
}

pub struct Conn {
    pub mode: Mode,
    pub state: ConnState,
    pub ws: Option<WsSubstate>,
    pub h2: Option<H2Substate>,
    pub http: HttpSubstate,
    pub trunc: Trunc,
    pub limits: ProtocolLimits,
    pub extensions: ExtensionChain,
    pub stats: WriteStats,
    /// Set after any write attempt; the event loop (here: the caller
    /// driving `poll_write`) must reset it after servicing the writable
    /// event.
    pub could_have_pending: bool,
    pub socket_is_permanently_unusable: bool,
    /// Exposed for the caller's own file-content timer. This crate does
    /// not schedule timeouts itself; timeout scheduling is the event
    /// loop's concern.
    pub http_content_timeout: std::time::Duration,
}

impl Conn {
    pub fn new(mode: Mode) -> Self {
        Self::with_config(mode, &WriteConfig::default())
    }

    pub fn with_config(mode: Mode, config: &WriteConfig) -> Self {
        let ws = mode.is_ws().then(|| WsSubstate {
            ietf_spec_revision: config.ietf_spec_revision,
            ..WsSubstate::default()
        });
        let h2 = mode.is_h2().then(|| H2Substate::new(1, 65_535));
        let state = if mode.is_ws() {
            ConnState::WsEstablished
        } else {
            ConnState::Http
        };
        Self {
            mode,
            state,
            ws,
            h2,
            http: HttpSubstate::default(),
            trunc: Trunc::new(),
            limits: config.limits(),
            extensions: ExtensionChain::new(),
            stats: WriteStats::new(),
            could_have_pending: false,
            socket_is_permanently_unusable: false,
            http_content_timeout: config.http_content_timeout,
        }
    }

    /// The event loop calls this once per writable event has been fully
    /// serviced, to allow the next one.
    pub fn end_writable_event(&mut self) {
        self.could_have_pending = false;
    }

    pub fn role(&self) -> Role {
        self.mode.role()
    }

    /// Record that an inbound-parsing layer (out of scope here) has
    /// already returned the peer's own CLOSE frame, so the write path
    /// knows not to expect one from this side anymore.
    pub fn mark_close_already_returned(&mut self) {
        self.state = ConnState::ReturnedCloseAlready;
    }

    /// Enter the "flush residue, then close" phase: further writes
    /// become no-ops once the truncation buffer empties.
    pub fn begin_flush_before_close(&mut self) {
        self.state = ConnState::FlushingSendBeforeClose;
    }

    /// Drain any stashed residue, reporting whether the connection
    /// should close now because it was waiting to flush its last bytes
    /// before tearing down.
    pub fn drain_residue<T: AsyncWrite + Unpin + ?Sized>(
        &mut self,
        transport: Pin<&mut T>,
        cx: &mut Context<'_>,
    ) -> Result<DrainResult> {
        match self.trunc.drain_one(transport, cx, &self.stats)? {
            DrainOutcome::Partial => Ok(DrainResult::Partial),
            DrainOutcome::Done => {
                if self.state == ConnState::FlushingSendBeforeClose {
                    Ok(DrainResult::ReadyToClose)
                } else {
                    Ok(DrainResult::Done)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{noop_context, MockTransport};

    #[test]
    fn ws_over_h2_needs_more_headroom_than_plain_ws() {
        assert_eq!(Mode::WsServer.required_headroom(), LWS_PRE);
        assert_eq!(
            Mode::Http2WsServing.required_headroom(),
            LWS_PRE + H2_FRAME_HEADER_LEN
        );
    }

    #[test]
    fn mark_close_already_returned_sets_state() {
        let mut conn = Conn::new(Mode::WsServer);
        conn.mark_close_already_returned();
        assert_eq!(conn.state, ConnState::ReturnedCloseAlready);
    }

    #[test]
    fn draining_residue_while_flushing_before_close_signals_ready_to_close() {
        let mut conn = Conn::new(Mode::WsServer);
        conn.trunc.stash(b"tail");
        conn.begin_flush_before_close();
        let mut sink = MockTransport::new();

        let outcome =
            noop_context(|cx| conn.drain_residue(Pin::new(&mut sink), cx).unwrap());
        assert_eq!(outcome, DrainResult::ReadyToClose);
        assert!(!conn.trunc.has_residue());
    }

    #[test]
    fn draining_residue_outside_close_reports_done_not_ready_to_close() {
        let mut conn = Conn::new(Mode::WsServer);
        conn.trunc.stash(b"tail");
        let mut sink = MockTransport::new();

        let outcome =
            noop_context(|cx| conn.drain_residue(Pin::new(&mut sink), cx).unwrap());
        assert_eq!(outcome, DrainResult::Done);
    }

    #[test]
    fn draining_residue_partial_write_stays_partial() {
        let mut conn = Conn::new(Mode::WsServer);
        conn.trunc.stash(b"0123456789");
        conn.begin_flush_before_close();
        let mut sink = MockTransport::new();
        sink.accept_at_most(4);

        let outcome =
            noop_context(|cx| conn.drain_residue(Pin::new(&mut sink), cx).unwrap());
        assert_eq!(outcome, DrainResult::Partial);
        assert!(conn.trunc.has_residue());
    }
}
