//! Write dispatcher: the public write entry point.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;
use tracing::{debug, trace};

use crate::conn::{Conn, ConnState, Mode};
use crate::error::{Result, WriteError};
use crate::ext::PacketTxResult;
use crate::h2::{self, FrameKind};
use crate::pt::{ConnId, Pt};
use crate::raw::issue_raw;
use crate::ws::{self, FramedBuf, OpCode, Role};

/// What a single write call means, beyond the raw payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Text,
    Binary,
    Continuation,
    Close,
    Ping,
    Pong,
    Http,
    HttpFinal,
    HttpHeaders,
    HttpHeadersContinuation,
}

/// `{kind, no_fin, h2_stream_end}`. Kept as a small struct rather than a
/// packed byte: there is no FFI boundary here to serialize it across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteProtocol {
    pub kind: Kind,
    pub no_fin: bool,
    pub h2_stream_end: bool,
}

impl WriteProtocol {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            no_fin: false,
            h2_stream_end: false,
        }
    }

    pub fn no_fin(mut self) -> Self {
        self.no_fin = true;
        self
    }

    pub fn h2_stream_end(mut self) -> Self {
        self.h2_stream_end = true;
        self
    }

    pub fn is_control(&self) -> bool {
        matches!(self.kind, Kind::Close | Kind::Ping | Kind::Pong)
    }

    pub fn is_http(&self) -> bool {
        matches!(
            self.kind,
            Kind::Http | Kind::HttpFinal | Kind::HttpHeaders | Kind::HttpHeadersContinuation
        )
    }

    pub fn opcode(&self) -> Option<OpCode> {
        match self.kind {
            Kind::Text => Some(OpCode::Text),
            Kind::Binary => Some(OpCode::Binary),
            Kind::Continuation => Some(OpCode::Continuation),
            Kind::Close => Some(OpCode::Close),
            Kind::Ping => Some(OpCode::Ping),
            Kind::Pong => Some(OpCode::Pong),
            Kind::Http | Kind::HttpFinal | Kind::HttpHeaders | Kind::HttpHeadersContinuation => {
                None
            }
        }
    }

    /// Force the low bits to CONTINUATION, preserving the high-bit
    /// modifiers, as the forced-draining and stash/recover paths require.
    fn as_continuation_preserving_high_bits(self) -> Self {
        Self {
            kind: Kind::Continuation,
            no_fin: self.no_fin,
            h2_stream_end: self.h2_stream_end,
        }
    }
}

/// Public write entry point.
///
/// `buf` already carries its reserved headroom (it is a [`FramedBuf`]),
/// a bounds-checked value type in place of a raw pointer at a fixed
/// offset into caller scratch.
///
/// Returns the number of bytes of user payload the library has taken
/// custody of (fully sent or stashed for retry). The caller must not
/// call `write` again for this connection until the current writable
/// event has been fully serviced and any residue drained. Attempting to
/// do so returns [`WriteError::Reentrant`] or
/// [`WriteError::ResiduePending`].
#[allow(clippy::too_many_arguments)]
pub fn write<T: AsyncWrite + Unpin + ?Sized>(
    conn: &mut Conn,
    pt: &mut Pt,
    conn_id: ConnId,
    transport: Pin<&mut T>,
    cx: &mut Context<'_>,
    mut buf: FramedBuf,
    mut wp: WriteProtocol,
) -> Poll<Result<i32>> {
    conn.stats.bump_api_call();

    if let Err(e) = check_length(buf.payload_len()) {
        return Poll::Ready(Err(e));
    }

    // One write per writable event: a second call before the caller has
    // serviced and reset the connection is a programming error, not a
    // condition to paper over.
    if conn.could_have_pending {
        debug!("write() called twice within one writable event");
        return Poll::Ready(Err(WriteError::Reentrant));
    }
    conn.could_have_pending = true;

    // Residue is always drained at higher priority than fresh payload.
    // Making the residue check structural rather than a runtime
    // pointer-aliasing guard: a caller with outstanding residue must
    // drain it first instead of re-issuing `write` with a fresh buffer.
    if conn.trunc.has_residue() {
        return Poll::Ready(Err(WriteError::ResiduePending));
    }

    // Forced draining: an extension asked for another pass last time.
    if pt.is_draining(conn_id) {
        pt.unmark_draining(conn_id);
        if let Some(ws) = &conn.ws {
            if let Some(stashed) = ws.tx_draining_stashed_wp {
                wp = stashed.as_continuation_preserving_high_bits();
            }
        }
    }

    if wp.is_http() {
        return write_http_fast_path(conn, transport, cx, buf, wp);
    }

    let role = conn.role();

    // State filter: drop WS writes outside an established/close-handshake
    // state.
    let in_close_handshake = conn.state.is_close_handshake();
    if !conn.state.accepts_ws_write() && !(wp.kind == Kind::Close && in_close_handshake) {
        return Poll::Ready(Ok(0));
    }

    let opcode = wp.opcode().expect("non-HTTP write always carries an opcode");

    if opcode == OpCode::Close && conn.state == ConnState::WsEstablished {
        conn.state = ConnState::WaitingToSendCloseNotification;
    }

    let mut rsv = 0u8;
    let mut fin = !wp.no_fin;

    if !wp.is_control() {
        let ws_state = conn.ws.as_mut().expect("ws substate present for ws write");
        let effective_wp = if ws_state.stashed_write_pending {
            ws_state.stashed_write_pending = false;
            ws_state.stashed_write_type.take().unwrap_or(wp)
        } else {
            wp
        };

        let result = conn.extensions.payload_tx(buf.payload(), effective_wp)?;

        if result.buf.is_empty() && !buf.payload().is_empty() {
            // Extension consumed the input but emitted nothing this pass;
            // remember the original write type so FIN/opcode semantics
            // survive to the next pass.
            let ws_state = conn.ws.as_mut().unwrap();
            ws_state.stashed_write_pending = true;
            ws_state.stashed_write_type = Some(effective_wp);
            return Poll::Ready(Ok(buf.payload_len() as i32));
        }

        if result.more_to_drain {
            trace!("extension chain requested another drain pass");
            pt.mark_draining(conn_id);
            let ws_state = conn.ws.as_mut().unwrap();
            ws_state.tx_draining_ext = true;
            ws_state.tx_draining_stashed_wp = Some(effective_wp);
            fin = false; // more coming: FIN suppressed until the final pass
        }

        if result.buffer_identity_changed {
            buf.replace_payload(&result.buf, buf.headroom());
            let ws_state = conn.ws.as_mut().unwrap();
            ws_state.clean_buffer = false;
        }
        rsv = result.rsv;
    }

    let orig_payload_len = buf.payload_len();

    match conn.mode {
        Mode::Http2WsServing => {
            let ws_state = conn.ws.as_mut().unwrap();
            ws::frame_and_mask(&mut buf, ws_state, opcode, fin, rsv, role)?;
            let h2 = conn.h2.as_mut().expect("h2 substate present");
            let end_stream = wp.h2_stream_end;
            h2::wrap_frame(&mut buf, FrameKind::Data, h2.stream_id, end_stream, false);
            if end_stream {
                h2.send_end_stream = true;
            }
        }
        Mode::Http2Serving => unreachable!("non-HTTP write path requires a WS-capable mode"),
        _ => {
            let ws_state = conn.ws.as_mut().unwrap();
            ws::frame_and_mask(&mut buf, ws_state, opcode, fin, rsv, role)?;
        }
    }

    let pre = buf.framed().len() - orig_payload_len;

    let result = finish_issue(conn, transport, cx, buf, pre, orig_payload_len, fin);
    if opcode == OpCode::Close
        && matches!(result, Poll::Ready(Ok(_)))
        && !conn.trunc.has_residue()
        && conn.state == ConnState::WaitingToSendCloseNotification
    {
        conn.state = ConnState::AwaitingCloseAck;
    }
    result
}

/// Reject a payload whose length can't survive the `as i32` casts the
/// rest of the pipeline uses to report byte counts back to the caller.
fn check_length(len: usize) -> Result<()> {
    if len > i32::MAX as usize {
        Err(WriteError::InvalidLength)
    } else {
        Ok(())
    }
}

fn write_http_fast_path<T: AsyncWrite + Unpin + ?Sized>(
    conn: &mut Conn,
    transport: Pin<&mut T>,
    cx: &mut Context<'_>,
    mut buf: FramedBuf,
    wp: WriteProtocol,
) -> Poll<Result<i32>> {
    let orig_payload_len = buf.payload_len();

    // Content-length accounting: the moment tx_content_remain reaches
    // zero, promote to HTTP_FINAL.
    let promote_final = conn.http.tx_content_remain > 0
        && (conn.http.tx_content_remain as usize) <= orig_payload_len;
    let is_final = wp.kind == Kind::HttpFinal || promote_final;

    if conn.http.tx_content_remain > 0 {
        conn.http.tx_content_remain = conn
            .http
            .tx_content_remain
            .saturating_sub(orig_payload_len as u64);
    }

    if conn.mode.is_h2() {
        let h2 = conn.h2.as_mut().expect("h2 substate present for h2 mode");
        let credit = h2.tx_credit;
        let Some(clamped) = h2::clamp_to_credit(orig_payload_len, credit) else {
            return Poll::Ready(Ok(0));
        };
        if clamped < orig_payload_len {
            // re-truncate the framed buffer's payload to the clamped
            // length; the caller resumes with the remainder later.
            let headroom = buf.headroom();
            let truncated = buf.payload()[..clamped].to_vec();
            buf.replace_payload(&truncated, headroom);
        }
        let kind = match wp.kind {
            Kind::HttpHeaders => FrameKind::Headers,
            Kind::HttpHeadersContinuation => FrameKind::Continuation,
            _ => FrameKind::Data,
        };
        let end_headers = matches!(kind, FrameKind::Headers | FrameKind::Continuation) && !wp.no_fin;
        let end_stream = is_final || wp.h2_stream_end;
        h2::wrap_frame(&mut buf, kind, h2.stream_id, end_stream, end_headers);
        h2.tx_credit -= clamped as i32;
        if end_stream {
            h2.send_end_stream = true;
        }
        let pre = buf.framed().len() - clamped;
        return finish_issue(conn, transport, cx, buf, pre, clamped, true);
    }

    finish_issue(conn, transport, cx, buf, 0, orig_payload_len, true)
}

fn finish_issue<T: AsyncWrite + Unpin + ?Sized>(
    conn: &mut Conn,
    transport: Pin<&mut T>,
    cx: &mut Context<'_>,
    buf: FramedBuf,
    pre: usize,
    orig_payload_len: usize,
    fin: bool,
) -> Poll<Result<i32>> {
    let framed = buf.framed();

    // Offer the whole framed buffer to the extension chain's raw-send
    // hook first; only fall through to the raw issuer if no extension
    // claims it.
    match conn.extensions.packet_tx_do_send(framed)? {
        PacketTxResult::Wrote(n) => {
            conn.stats.bump_bytes_written(n as u64);
            return Poll::Ready(Ok(orig_payload_len as i32));
        }
        PacketTxResult::Passthrough => {}
    }

    match issue_raw(conn, transport, cx, framed)? {
        Poll::Ready(n) => {
            if conn.trunc.has_residue() {
                // Whole frame didn't make it; keep `inside_frame` so the
                // caller knows not to start a new logical message until
                // this one's residue is flushed.
                if let Some(ws) = &mut conn.ws {
                    ws.inside_frame = true;
                }
                Poll::Ready(Ok(orig_payload_len as i32))
            } else {
                // A frame whose extension replaced the payload buffer
                // outright can't be measured in caller-buffer units by
                // `n - pre`: that arithmetic describes the transformed
                // frame, not the original payload. Report full custody
                // instead, and reset the flag for the next frame.
                let clean = conn.ws.as_ref().map_or(true, |w| w.clean_buffer);
                if let Some(ws) = &mut conn.ws {
                    ws.inside_frame = false;
                    ws.clean_buffer = true;
                }
                let bytes_of_user_payload = if !clean {
                    orig_payload_len
                } else if n as usize >= pre {
                    (n as usize - pre).min(orig_payload_len)
                } else {
                    // Short write against a buffer an extension rebuilt
                    // from scratch; clamp to 0 instead of going negative.
                    0
                };
                let _ = fin;
                Poll::Ready(Ok(bytes_of_user_payload as i32))
            }
        }
        Poll::Pending => Poll::Pending,
    }
}
