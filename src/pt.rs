//! Per-thread context (`Pt`).
//!
//! Tracks which connections are mid-drain using an arena+index scheme:
//! the per-thread state holds a small vector of connection indices
//! currently draining, rather than a link field threaded through `Conn`
//! itself.

use slab::Slab;

/// Opaque handle identifying a connection registered with a `Pt`. Stable
/// across pushes/removals of other connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(usize);

pub struct Pt {
    pub serv_buf_size: usize,
    scratch: Vec<u8>,
    draining: Slab<()>,
    draining_order: Vec<usize>,
}

impl Pt {
    pub fn new(serv_buf_size: usize) -> Self {
        Self {
            serv_buf_size,
            scratch: vec![0u8; serv_buf_size],
            draining: Slab::new(),
            draining_order: Vec::new(),
        }
    }

    /// Shared per-thread read scratch buffer, reused across file-pump
    /// iterations instead of allocating fresh each time. Grows (never
    /// shrinks) to fit the largest request.
    pub fn scratch_buf(&mut self, len: usize) -> &mut [u8] {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        &mut self.scratch[..len]
    }

    /// Append a connection to the draining list. A no-op if already
    /// present.
    pub fn mark_draining(&mut self, id: ConnId) {
        if !self.draining_order.contains(&id.0) {
            self.draining_order.push(id.0);
        }
    }

    pub fn unmark_draining(&mut self, id: ConnId) {
        self.draining_order.retain(|&x| x != id.0);
    }

    pub fn is_draining(&self, id: ConnId) -> bool {
        self.draining_order.contains(&id.0)
    }

    pub fn draining_connections(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.draining_order.iter().map(|&x| ConnId(x))
    }

    pub fn register(&mut self) -> ConnId {
        ConnId(self.draining.insert(()))
    }

    pub fn unregister(&mut self, id: ConnId) {
        if self.draining.contains(id.0) {
            self.draining.remove(id.0);
        }
        self.unmark_draining(id);
    }
}
