//! The per-worker scratch arena (component A, §2, §5).
//!
//! The original keeps a `cp_pool_t` cleared with `cp_pool_clear()` between
//! layer iterations so memory is reused rather than repeatedly
//! malloc'd/freed (see `process_stack_csg`/`process_stack_diff` in the
//! original driver). `Arena` reproduces that bulk-reset behavior with a
//! plain growable buffer: `reset` truncates length but keeps capacity, so
//! the backing allocation survives across layers. It is never shared
//! across threads — each worker owns one for the lifetime of a pass.
//!
//! Per the redesign note on bump arenas, this is plumbed explicitly into
//! [`crate::boolean`]'s engine entry points rather than kept as global
//! state.

pub struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    pub fn new() -> Self {
        Arena { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Arena { buf: Vec::with_capacity(capacity) }
    }

    /// Bulk-reset: drops all scratch content but keeps the backing
    /// allocation for the next layer.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Reserves and returns a zeroed scratch region of `len` bytes, valid
    /// until the next `reset`.
    pub fn alloc_bytes(&mut self, len: usize) -> &mut [u8] {
        let start = self.buf.len();
        self.buf.resize(start + len, 0);
        &mut self.buf[start..]
    }

    pub fn used(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reset_keeps_capacity() {
        let mut arena = Arena::new();
        arena.alloc_bytes(4096);
        let cap = arena.capacity();
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.capacity(), cap);
    }
}
