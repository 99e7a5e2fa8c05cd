// SPDX-License-Identifier: GPL-2.0

//! Buffer pool: a logical infinite byte array realized as fixed-size blocks.
//!
//! Offsets are absolute byte positions from the start of input. Block `k`
//! holds bytes `[k*block_size, (k+1)*block_size)`. Blocks are allocated
//! lazily as higher offsets are touched and released, in order, from the
//! front once every active cursor has passed them.

use std::collections::VecDeque;

use crate::error::EngineError;

pub struct Pool {
    block_size: usize,
    /// Index of the first block still held in `blocks`.
    base_block: u64,
    blocks: VecDeque<Box<[u8]>>,
}

impl Pool {
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "block size must be non-zero");
        Self { block_size, base_block: 0, blocks: VecDeque::new() }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_index(&self, pos: u64) -> u64 {
        pos / self.block_size as u64
    }

    /// Ensure the block holding `pos` exists, allocating every block
    /// between the current tail and it.
    fn ensure_block(&mut self, pos: u64) -> Result<(), EngineError> {
        let idx = self.block_index(pos);
        if self.blocks.is_empty() {
            self.base_block = idx;
        }
        let next = self.base_block + self.blocks.len() as u64;
        if idx < self.base_block {
            // Every live cursor is >= base_block; a request below it would be
            // a bug in the caller, not a resource condition.
            unreachable!("pool requested for an already-freed offset");
        }
        for _ in next..=idx {
            let block = vec![0u8; self.block_size].into_boxed_slice();
            self.blocks.push_back(block);
            if self.blocks.len() > (1 << 20) {
                // A directory this large (~1M blocks) means something upstream
                // is not draining; treat unbounded growth as exhaustion
                // rather than letting the process OOM silently.
                return Err(EngineError::Alloc("buffer pool directory grew without bound"));
            }
        }
        Ok(())
    }

    fn block_mut(&mut self, idx: u64) -> &mut [u8] {
        let slot = (idx - self.base_block) as usize;
        &mut self.blocks[slot]
    }

    fn block(&self, idx: u64) -> &[u8] {
        let slot = (idx - self.base_block) as usize;
        &self.blocks[slot]
    }

    /// Writable region starting at `pos`, never spanning a block boundary.
    pub fn source_buffer(&mut self, pos: u64) -> Result<&mut [u8], EngineError> {
        self.ensure_block(pos)?;
        let idx = self.block_index(pos);
        let off = (pos % self.block_size as u64) as usize;
        Ok(&mut self.block_mut(idx)[off..])
    }

    /// Readable region for a sink starting at `pos`, of length
    /// `min(block remainder, pos_to_write - pos)`. Caller guarantees the
    /// block is resident (it must be, since `pos` is a live cursor).
    pub fn sink_buffer(&self, pos: u64, pos_to_write: u64) -> &[u8] {
        let idx = self.block_index(pos);
        let off = (pos % self.block_size as u64) as usize;
        let in_block = self.block_size - off;
        let pending = (pos_to_write - pos) as usize;
        let len = in_block.min(pending);
        &self.block(idx)[off..off + len]
    }

    /// Raw byte access at a committed offset, used by newline scanning.
    pub fn byte_at(&self, pos: u64) -> u8 {
        let idx = self.block_index(pos);
        let off = (pos % self.block_size as u64) as usize;
        self.block(idx)[off]
    }

    /// Release every block strictly below `floor(min_pos / block_size)`.
    pub fn memory_free(&mut self, min_pos: u64) {
        let keep_from = min_pos / self.block_size as u64;
        while self.base_block < keep_from && !self.blocks.is_empty() {
            self.blocks.pop_front();
            self.base_block += 1;
        }
    }

    /// Number of blocks currently resident; used by tests asserting the
    /// bounded-memory property.
    pub fn resident_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_buffer_never_spans_a_block() {
        let mut pool = Pool::new(16);
        let buf = pool.source_buffer(10).unwrap();
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn sink_buffer_respects_pending_window() {
        let mut pool = Pool::new(16);
        pool.source_buffer(0).unwrap();
        let buf = pool.sink_buffer(2, 5);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn memory_free_releases_only_fully_passed_blocks() {
        let mut pool = Pool::new(4);
        pool.source_buffer(20).unwrap();
        assert_eq!(pool.resident_blocks(), 6);
        pool.memory_free(9);
        // blocks 0 and 1 (covering [0,8)) are fully below offset 9
        assert_eq!(pool.resident_blocks(), 4);
        pool.memory_free(9);
        assert_eq!(pool.resident_blocks(), 4, "memory_free is idempotent");
    }

    #[test]
    fn byte_at_reads_resident_byte() {
        let mut pool = Pool::new(8);
        {
            let buf = pool.source_buffer(0).unwrap();
            buf[3] = b'\n';
        }
        assert_eq!(pool.byte_at(3), b'\n');
    }

    #[test]
    fn resident_blocks_stay_bounded_as_a_lagging_cursor_advances() {
        let block_size = 64usize;
        let mut pool = Pool::new(block_size);
        let mut min_active_pos_written = 0u64;

        for step in 1..=200u64 {
            let pos = step * 17;
            pool.source_buffer(pos).unwrap();
            if step % 3 == 0 {
                min_active_pos_written = pos.saturating_sub(block_size as u64);
                pool.memory_free(min_active_pos_written);
            }
            let source_pos_read = pos + 1;
            let bound = (source_pos_read - min_active_pos_written)
                .div_ceil(block_size as u64) as usize
                + 1;
            assert!(
                pool.resident_blocks() <= bound,
                "resident={} exceeds bound={} at step {step}",
                pool.resident_blocks(),
                bound,
            );
        }
    }
}
