//! Unit-test-only helpers: a minimal `AsyncWrite` double that can cap or
//! block writes, plus a no-op `Context` for polling outside a runtime.
#![cfg(test)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use tokio::io::AsyncWrite;

pub fn noop_context<R>(f: impl FnOnce(&mut Context<'_>) -> R) -> R {
    fn clone(_: *const ()) -> RawWaker {
        raw()
    }
    fn noop(_: *const ()) {}
    fn raw() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    let waker = unsafe { Waker::from_raw(raw()) };
    let mut cx = Context::from_waker(&waker);
    f(&mut cx)
}

#[derive(Default)]
pub struct MockTransport {
    pub written: Vec<u8>,
    pub write_count: usize,
    accept_cap: Option<usize>,
    block_next_n: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_next(&mut self, n: usize) {
        self.block_next_n = n;
    }

    pub fn accept_at_most(&mut self, n: usize) {
        self.accept_cap = Some(n);
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.block_next_n > 0 {
            self.block_next_n -= 1;
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::WouldBlock)));
        }
        self.write_count += 1;
        let n = self.accept_cap.map_or(buf.len(), |cap| cap.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
