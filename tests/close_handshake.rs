//! Close-handshake state transitions driven through the public
//! dispatcher: writing a CLOSE frame advances `ConnState` from
//! established, through "waiting to send", to "awaiting the peer's ack"
//! once the frame (and any residue) has fully cleared.

mod common;

use std::pin::Pin;
use std::task::Poll;

use common::{noop_context, MockTransport};
use outwire::conn::ConnState;
use outwire::ws::LWS_PRE;
use outwire::{Conn, FramedBuf, Kind, Mode, Pt, WriteProtocol};

#[test]
fn close_frame_fully_sent_reaches_awaiting_close_ack() {
    let mut conn = Conn::new(Mode::WsServer);
    assert_eq!(conn.state, ConnState::WsEstablished);
    let mut pt = Pt::new(4096);
    let conn_id = pt.register();
    let mut sink = MockTransport::new();

    let buf = FramedBuf::new(LWS_PRE, b"");
    let wp = WriteProtocol::new(Kind::Close);
    let n = noop_context(|cx| {
        outwire::write(&mut conn, &mut pt, conn_id, Pin::new(&mut sink), cx, buf, wp)
    });

    assert!(matches!(n, Poll::Ready(Ok(0))));
    assert!(!conn.trunc.has_residue());
    assert_eq!(conn.state, ConnState::AwaitingCloseAck);
}

#[test]
fn short_write_of_close_frame_stays_waiting_until_drained() {
    let mut conn = Conn::new(Mode::WsServer);
    let mut pt = Pt::new(4096);
    let conn_id = pt.register();
    let mut sink = MockTransport::new();
    sink.accept_at_most(1);

    let buf = FramedBuf::new(LWS_PRE, b"");
    let wp = WriteProtocol::new(Kind::Close);
    let n = noop_context(|cx| {
        outwire::write(&mut conn, &mut pt, conn_id, Pin::new(&mut sink), cx, buf, wp)
    });

    assert!(matches!(n, Poll::Ready(Ok(0))));
    assert!(conn.trunc.has_residue(), "2-byte close header only partly accepted");
    assert_eq!(
        conn.state,
        ConnState::WaitingToSendCloseNotification,
        "not yet acked while residue remains"
    );

    conn.end_writable_event();
    let outcome = noop_context(|cx| conn.drain_residue(Pin::new(&mut sink), cx).unwrap());
    assert_eq!(outcome, outwire::conn::DrainResult::Done);
}

#[test]
fn flushing_before_close_no_ops_fresh_writes_once_residue_is_gone() {
    let mut conn = Conn::new(Mode::WsServer);
    conn.begin_flush_before_close();
    let mut pt = Pt::new(4096);
    let conn_id = pt.register();
    let mut sink = MockTransport::new();

    let buf = FramedBuf::new(LWS_PRE, b"ignored");
    let wp = WriteProtocol::new(Kind::Binary);
    let n = noop_context(|cx| {
        outwire::write(&mut conn, &mut pt, conn_id, Pin::new(&mut sink), cx, buf, wp)
    });

    // WsEstablished only accepts WS writes, and `FlushingSendBeforeClose`
    // is not that state, so the dispatcher's state filter drops this
    // write entirely before it ever reaches `issue_raw`'s no-op shortcut.
    assert!(matches!(n, Poll::Ready(Ok(0))));
    assert!(sink.written.is_empty());
}
