//! File-fragment pump.
//!
//! Reads from a caller-supplied file provider, optionally wraps each
//! fragment in HTTP/1.1 chunked transfer-encoding and/or a
//! `multipart/byteranges` boundary, and feeds the result to the ordinary
//! write dispatcher. Loops until the transport chokes or the file is
//! fully sent.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;
use tracing::{debug, trace};

use crate::conn::{Conn, ConnState, RangeDescriptor};
use crate::dispatch::{self, Kind, WriteProtocol};
use crate::error::{BoxError, ErrorExt, Result, WriteError};
use crate::pt::{ConnId, Pt};
use crate::ws::FramedBuf;

/// Fixed multipart boundary token. Servers using this layer advertise
/// `multipart/byteranges; boundary=_lws` in the response headers.
pub const MULTIPART_BOUNDARY: &str = "_lws";

/// Source of file bytes for the pump. Reads and seeks are modelled as
/// synchronous: the library never suspends mid-read.
pub trait FileProvider {
    fn len(&self) -> u64;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: u64) -> io::Result<()>;
}

/// Optional HTML-rewriting hook run over each fragment before it is
/// handed to the dispatcher. May grow the fragment by up to 128 bytes.
pub trait HtmlInterpreter {
    fn process(
        &mut self,
        buf: &mut Vec<u8>,
        max_len: usize,
        is_final: bool,
        chunked: bool,
    ) -> std::result::Result<(), BoxError>;
}

/// What to do with the connection once a file transfer has fully
/// drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAction {
    /// Keep the connection open for a further HTTP/1.1 pipelined
    /// request.
    KeepAlive,
    /// Tear the connection down.
    Close,
}

/// Fired exactly once, when a file transfer (all ranges included) has
/// been fully handed to the dispatcher. Lets the caller decide between
/// keep-alive and drop: that decision depends on request-level state
/// (`Connection: close`, HTTP version, pipelining policy) this crate
/// never parses.
pub trait FileCompletion {
    fn on_complete(&mut self, conn: &Conn) -> CompletionAction;
}

const H2_HEADER_HEADROOM: usize = crate::ws::LWS_PRE;
const CHUNK_SLACK: usize = 10 + 128;
const TRAILING_BOUNDARY_SLACK: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The transport choked; the caller must re-arm the writable
    /// callback and resume on the next writable event.
    Choked,
    /// The whole file (all ranges) has been sent; the connection has
    /// transitioned back to plain HTTP state. Carries the caller's
    /// keep-alive decision from the completion callback.
    Complete(CompletionAction),
}

fn is_multipart(conn: &Conn) -> bool {
    conn.http.multipart_content_type.is_some()
}

fn send_pipe_choked(_conn: &Conn, last_poll_was_partial: bool) -> bool {
    last_poll_was_partial
}

/// Run the pump loop until the transport chokes or the file completes.
#[allow(clippy::too_many_arguments)]
pub fn pump_file<T, F>(
    conn: &mut Conn,
    pt: &mut Pt,
    conn_id: ConnId,
    mut transport: Pin<&mut T>,
    cx: &mut Context<'_>,
    provider: &mut F,
    mut interpreter: Option<&mut dyn HtmlInterpreter>,
    mut completion: Option<&mut dyn FileCompletion>,
) -> Poll<Result<PumpOutcome>>
where
    T: AsyncWrite + Unpin + ?Sized,
    F: FileProvider,
{
    loop {
        if conn.trunc.has_residue() {
            let Conn { trunc, stats, .. } = &mut *conn;
            match trunc.drain_one(transport.as_mut(), cx, stats)? {
                crate::trunc::DrainOutcome::Done => continue,
                crate::trunc::DrainOutcome::Partial => return Poll::Ready(Ok(PumpOutcome::Choked)),
            }
        }

        let transfer_done = if conn.http.ranged {
            conn.http.range.is_none() && conn.http.range_queue.is_empty()
        } else {
            conn.http.filepos == conn.http.filelen && conn.http.range_queue.is_empty()
        };
        if transfer_done {
            debug!(filepos = conn.http.filepos, "file pump complete");
            conn.http.sending_chunked = false;
            conn.http.multipart_content_type = None;
            conn.http.ranged = false;
            conn.state = ConnState::Http;
            let action = completion
                .as_deref_mut()
                .map(|c| c.on_complete(conn))
                .unwrap_or(CompletionAction::KeepAlive);
            return Poll::Ready(Ok(PumpOutcome::Complete(action)));
        }

        let mut fragment: Vec<u8> = Vec::new();
        let multipart = is_multipart(conn);

        // Ranges: enter the next one if we're not already inside it.
        let entering_range = match &conn.http.range {
            Some(r) if r.inside => false,
            _ => !conn.http.range_queue.is_empty(),
        };
        if entering_range {
            let next = conn.http.range_queue.remove(0);
            provider
                .seek(next.start)
                .map_err(|e| WriteError::FilePump(e.context("file provider seek failed")))?;
            conn.http.filepos = next.start;
            if multipart {
                let ct = conn
                    .http
                    .multipart_content_type
                    .clone()
                    .unwrap_or_default();
                fragment.extend_from_slice(
                    format!(
                        "{MULTIPART_BOUNDARY}\r\nContent-Type: {ct}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
                        next.start, next.end, conn.http.multipart_total_len
                    )
                    .as_bytes(),
                );
            }
            conn.http.range = Some(RangeDescriptor {
                budget: (next.end - next.start + 1) as usize,
                inside: true,
                ..next
            });
        }

        let boundary_len = fragment.len();
        let mut poss = conn
            .limits
            .pt_serv_buf_size
            .saturating_sub(H2_HEADER_HEADROOM)
            .saturating_sub(boundary_len);
        if conn.http.tx_content_remain > 0 {
            poss = poss.min(conn.http.tx_content_remain as usize);
        }
        if let Some(ceiling) = conn.limits.tx_packet_size {
            poss = poss.min(ceiling);
        }
        if let Some(h2) = &conn.h2 {
            if h2.tx_credit <= 0 {
                return Poll::Ready(Ok(PumpOutcome::Choked));
            }
            poss = poss.min(h2.tx_credit as usize);
        }
        // Only reserve the trailing-boundary slack when the workspace
        // budget computed so far could otherwise swallow the entire last
        // queued range in one read, leaving no room to append the
        // boundary to this same fragment. Checking before the range
        // clamp (rather than after) means a small range well within the
        // workspace's capacity is never starved down to one-byte reads
        // just because it happens to be the last one queued.
        let last_range_may_finish_here = multipart
            && conn.http.range_queue.is_empty()
            && conn
                .http
                .range
                .as_ref()
                .is_some_and(|r| poss >= r.budget + TRAILING_BOUNDARY_SLACK);
        if last_range_may_finish_here {
            poss -= TRAILING_BOUNDARY_SLACK;
        }
        if let Some(range) = &conn.http.range {
            poss = poss.min(range.budget);
        }
        if conn.http.sending_chunked {
            poss = poss.saturating_sub(CHUNK_SLACK);
        }
        poss = poss.max(1);

        let amount = provider
            .read(pt.scratch_buf(poss))
            .map_err(|e| WriteError::FilePump(e.context("file provider read failed")))?;
        fragment.extend_from_slice(&pt.scratch_buf(poss)[..amount]);

        if let Some(range) = &mut conn.http.range {
            range.budget -= amount;
        }

        let range_finished = conn
            .http
            .range
            .as_ref()
            .map(|r| r.budget == 0)
            .unwrap_or(false);
        let last_range = conn.http.range_queue.is_empty();
        let is_final = if conn.http.ranged {
            range_finished && last_range
        } else {
            amount == 0
        };

        if let Some(interp) = interpreter.as_deref_mut() {
            interp
                .process(&mut fragment, poss + 128, is_final, conn.http.sending_chunked)
                .map_err(WriteError::FilePump)?;
        }

        if conn.http.sending_chunked {
            let mut chunked = format!("{:x}\r\n", fragment.len()).into_bytes();
            chunked.extend_from_slice(&fragment);
            chunked.extend_from_slice(b"\r\n");
            fragment = chunked;
        }

        if multipart && range_finished && last_range {
            fragment.extend_from_slice(format!("{MULTIPART_BOUNDARY}\r\n").as_bytes());
        }

        if range_finished {
            if conn.http.range_queue.is_empty() {
                conn.http.range = None;
            } else if let Some(range) = &mut conn.http.range {
                range.inside = false;
            }
        }

        let wp = if is_final {
            WriteProtocol::new(Kind::HttpFinal)
        } else {
            WriteProtocol::new(Kind::Http)
        };

        let buf = FramedBuf::new(H2_HEADER_HEADROOM, &fragment);
        conn.could_have_pending = false; // pump owns the writable event, not the public API caller
        let n = match dispatch::write(conn, pt, conn_id, transport.as_mut(), cx, buf, wp) {
            Poll::Ready(Ok(n)) => n as usize,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        };

        conn.http.filepos += amount as u64;
        if n < fragment.len() {
            let short = fragment.len() - n;
            provider
                .seek(conn.http.filepos - short as u64)
                .map_err(|e| WriteError::FilePump(e.context("file provider seek failed")))?;
            conn.http.filepos -= short as u64;
        }

        if is_final && !conn.http.ranged && conn.http.range_queue.is_empty() {
            conn.http.filepos = conn.http.filelen;
        }

        if send_pipe_choked(conn, n < fragment.len()) {
            trace!(filepos = conn.http.filepos, "file pump choked, re-arming");
            return Poll::Ready(Ok(PumpOutcome::Choked));
        }
    }
}
