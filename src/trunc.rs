//! Partial-send ("truncation") buffer.
//!
//! One owned, monotonically-grown allocation per connection. No implicit
//! sharing with the caller's buffer: `stash` always copies.

use std::pin::Pin;
use std::task::Context;

use tokio::io::AsyncWrite;

use crate::error::{Result, WriteError};
use crate::stats::WriteStats;
use crate::transport::{poll_transport_write, TransportWrite};

/// Outcome of one attempt to drain the truncation buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// All residue has been written; the buffer is now empty.
    Done,
    /// Some residue remains; the writable callback must be re-armed.
    Partial,
}

#[derive(Debug, Default)]
pub struct Trunc {
    alloc: Option<Box<[u8]>>,
    offset: usize,
    len: usize,
}

impl Trunc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_residue(&self) -> bool {
        self.len > 0
    }

    pub fn residue_len(&self) -> usize {
        self.len
    }

    /// Copy `residue` into the truncation allocation, growing (never
    /// shrinking) the backing allocation if needed.
    pub fn stash(&mut self, residue: &[u8]) {
        if residue.is_empty() {
            return;
        }
        let need_new_alloc = match &self.alloc {
            Some(a) => a.len() < residue.len(),
            None => true,
        };
        if need_new_alloc {
            self.alloc = Some(vec![0u8; residue.len()].into_boxed_slice());
        }
        let alloc = self.alloc.as_mut().expect("allocated above");
        alloc[..residue.len()].copy_from_slice(residue);
        self.offset = 0;
        self.len = residue.len();
    }

    /// Write as much of the stashed residue as the transport will accept.
    /// The residue is always drained before any fresh caller payload is
    /// considered.
    pub fn drain_one<T: AsyncWrite + Unpin + ?Sized>(
        &mut self,
        transport: Pin<&mut T>,
        cx: &mut Context<'_>,
        stats: &WriteStats,
    ) -> Result<DrainOutcome> {
        if self.len == 0 {
            return Ok(DrainOutcome::Done);
        }
        let alloc = self.alloc.as_ref().expect("residue implies allocation");
        let slice = &alloc[self.offset..self.offset + self.len];
        match poll_transport_write(transport, cx, slice) {
            TransportWrite::Written(n) => {
                stats.bump_bytes_written(n as u64);
                self.offset += n;
                self.len -= n;
                if self.len == 0 {
                    Ok(DrainOutcome::Done)
                } else {
                    Ok(DrainOutcome::Partial)
                }
            }
            TransportWrite::WouldBlock => Ok(DrainOutcome::Partial),
            TransportWrite::Error(e) => Err(WriteError::Transport(e)),
        }
    }
}
