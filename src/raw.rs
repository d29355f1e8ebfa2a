//! Raw frame issuer.
//!
//! Takes a fully framed byte range (header(s) already prepended) and gets
//! as much of it onto the wire as the transport will accept right now,
//! stashing whatever doesn't fit in the truncation buffer.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;
use tracing::{error, trace, warn};

use crate::conn::{Conn, ConnState};
use crate::error::{Result, WriteError};
use crate::transport::{poll_transport_write, TransportWrite};
use crate::ws::LWS_PRE;

/// Attempt to write `framed` to `transport`, capping the attempt at the
/// connection's configured packet size ceiling and stashing any unsent
/// tail in the truncation buffer.
///
/// Returns the number of bytes actually handed to the transport this
/// call. If that is less than `framed.len()`, the caller finds residue in
/// `conn.trunc` and must arrange to drain it before any further progress
/// on this connection.
pub fn issue_raw<T: AsyncWrite + Unpin + ?Sized>(
    conn: &mut Conn,
    mut transport: Pin<&mut T>,
    cx: &mut Context<'_>,
    framed: &[u8],
) -> Result<Poll<i32>> {
    if conn.socket_is_permanently_unusable {
        return Err(WriteError::Transport(std::io::Error::from(
            std::io::ErrorKind::NotConnected,
        )));
    }

    if framed.is_empty() {
        return Ok(Poll::Ready(0));
    }

    if conn.state == ConnState::FlushingSendBeforeClose && !conn.trunc.has_residue() {
        return Ok(Poll::Ready(framed.len() as i32));
    }

    let ceiling = match conn.limits.tx_packet_size {
        Some(configured) => configured,
        None => conn.limits.rx_buffer_size.max(conn.limits.pt_serv_buf_size) + LWS_PRE + 4,
    }
    .min(framed.len());
    let attempt = &framed[..ceiling];

    match poll_transport_write(transport.as_mut(), cx, attempt) {
        TransportWrite::Written(n) => {
            trace!(n, attempted = attempt.len(), "wrote bytes to transport");
            conn.stats.bump_bytes_written(n as u64);
            if n < framed.len() {
                let residue = &framed[n..];
                warn!(residue = residue.len(), "short write, stashing residue");
                conn.trunc.stash(residue);
                conn.stats.bump_partial(residue.len() as u64);
            }
            Ok(Poll::Ready(n as i32))
        }
        TransportWrite::WouldBlock => {
            trace!(len = framed.len(), "transport would block, stashing whole frame");
            conn.trunc.stash(framed);
            conn.stats.bump_partial(framed.len() as u64);
            Ok(Poll::Ready(0))
        }
        TransportWrite::Error(e) => {
            error!(%e, "transport write failed, connection unusable");
            conn.socket_is_permanently_unusable = true;
            Err(WriteError::Transport(e))
        }
    }
}
