//! Shared `AsyncWrite` test double for the integration test binaries.
//! Duplicated from `src/test_support.rs`: that module is
//! `#[cfg(test)]`-gated inside the library crate and invisible to these
//! separately compiled integration test binaries.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use tokio::io::AsyncWrite;

/// Install a `tracing` subscriber for test output. Safe to call from
/// every test: a subscriber already installed by an earlier test is
/// left alone.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

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

/// Simple in-memory file provider for file-pump integration tests.
pub struct VecFile {
    data: Vec<u8>,
    pos: usize,
}

impl VecFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl outwire::FileProvider for VecFile {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = pos as usize;
        Ok(())
    }
}
