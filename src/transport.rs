//! Transport write primitive.
//!
//! The write pipeline is parameterized over any `AsyncWrite` rather than
//! a trait object: a plain socket and a TLS stream differ only in which
//! concrete transport type the caller plugs in, so no separate
//! transport-capability trait is needed here (see DESIGN.md).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

/// Outcome of a single best-effort write attempt: a three-way result in
/// place of a sentinel/negative-errno return.
#[derive(Debug)]
pub enum TransportWrite {
    /// `n` bytes were accepted by the transport. `n` may be less than the
    /// attempted length: partial writes are legal and expected.
    Written(usize),
    /// The transport cannot accept any bytes right now (`EAGAIN` /
    /// `EWOULDBLOCK` / `EINTR`, or, in the `Poll` world, not-yet-ready).
    WouldBlock,
    /// The transport is broken; the connection must be torn down.
    Error(io::Error),
}

/// Perform one non-blocking write attempt against `transport`.
///
/// This never blocks: a not-yet-ready transport surfaces as
/// [`TransportWrite::WouldBlock`], and `EINTR`/`EWOULDBLOCK` collapse
/// into the same variant so callers have one branch to handle.
pub fn poll_transport_write<T: AsyncWrite + Unpin + ?Sized>(
    transport: Pin<&mut T>,
    cx: &mut Context<'_>,
    buf: &[u8],
) -> TransportWrite {
    match transport.poll_write(cx, buf) {
        Poll::Ready(Ok(n)) => TransportWrite::Written(n),
        Poll::Ready(Err(e))
            if matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            TransportWrite::WouldBlock
        }
        Poll::Ready(Err(e)) => TransportWrite::Error(e),
        Poll::Pending => TransportWrite::WouldBlock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{noop_context, MockTransport};

    #[test]
    fn maps_full_write() {
        let mut sink = MockTransport::new();
        noop_context(|cx| {
            let out = poll_transport_write(Pin::new(&mut sink), cx, b"hello");
            assert!(matches!(out, TransportWrite::Written(5)));
        });
        assert_eq!(sink.written, b"hello");
    }

    #[test]
    fn maps_would_block() {
        let mut sink = MockTransport::new();
        sink.block_next(1);
        noop_context(|cx| {
            let out = poll_transport_write(Pin::new(&mut sink), cx, b"hello");
            assert!(matches!(out, TransportWrite::WouldBlock));
        });
    }

    #[test]
    fn maps_partial_write() {
        let mut sink = MockTransport::new();
        sink.accept_at_most(2);
        noop_context(|cx| {
            let out = poll_transport_write(Pin::new(&mut sink), cx, b"hello");
            assert!(matches!(out, TransportWrite::Written(2)));
        });
        assert_eq!(sink.written, b"he");
    }
}
