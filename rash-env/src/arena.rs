// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Region allocator for transient strings
//!
//! The shell allocates most short-lived byte strings (partially expanded
//! words, glob candidates, token scratch space) from a stack of blocks.
//! A [`Mark`] taken before a parse or expansion cycle brackets a lifetime:
//! [`Arena::release`] drops every allocation made since the mark in one
//! step, so the per-command cleanup path never walks individual strings.
//!
//! Allocations are addressed by index into the block list rather than by
//! pointer, which keeps the interface entirely safe: a stale reference
//! after `release` is a logic error caught by the generation check in
//! debug builds, not undefined behavior.
//!
//! The [`StackString`] builder implements the classic grow-in-place
//! protocol: bytes are appended to the open end of the current block, and
//! when the block runs out the partial string is copied to a block at
//! least twice as large.

/// Minimum byte capacity of a block.
///
/// Small allocations share one block; only oversized requests get a block
/// of their own.
const MIN_BLOCK: usize = 504;

#[derive(Debug)]
struct Block {
    buf: Vec<u8>,
}

impl Block {
    fn with_capacity(capacity: usize) -> Self {
        Block {
            buf: Vec::with_capacity(capacity.max(MIN_BLOCK)),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }
}

/// Snapshot of the allocator state
///
/// Obtained from [`Arena::mark`] and consumed by [`Arena::release`].
/// Releasing a mark invalidates every mark taken after it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mark {
    block: usize,
    len: usize,
    generation: u64,
}

/// Stack-of-blocks arena
///
/// See the [module documentation](self).
#[derive(Debug)]
pub struct Arena {
    blocks: Vec<Block>,
    /// Bumped on every release so stale marks can be detected.
    generation: u64,
}

impl Default for Arena {
    fn default() -> Self {
        Arena {
            blocks: vec![Block::with_capacity(MIN_BLOCK)],
            generation: 0,
        }
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of the current allocation state.
    #[must_use]
    pub fn mark(&self) -> Mark {
        let block = self.blocks.len() - 1;
        Mark {
            block,
            len: self.blocks[block].buf.len(),
            generation: self.generation,
        }
    }

    /// Releases every allocation made since the mark was taken.
    ///
    /// Blocks allocated since are freed; the block the mark points into is
    /// rewound to its marked length.
    pub fn release(&mut self, mark: Mark) {
        debug_assert!(
            mark.generation == self.generation,
            "arena mark released out of order"
        );
        debug_assert!(mark.block < self.blocks.len());
        self.blocks.truncate(mark.block + 1);
        self.blocks[mark.block].buf.truncate(mark.len);
        self.generation += 1;
    }

    /// Number of live bytes currently allocated.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.buf.len()).sum()
    }

    /// Copies a byte string into the arena and returns its text.
    ///
    /// The returned slice lives until the enclosing mark is released (the
    /// borrow checker additionally pins it to the next `&mut` use of the
    /// arena).
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> &[u8] {
        self.reserve(bytes.len());
        let block = self.blocks.last_mut().unwrap();
        let start = block.buf.len();
        block.buf.extend_from_slice(bytes);
        &block.buf[start..]
    }

    /// Makes sure the current block can hold `n` more contiguous bytes.
    fn reserve(&mut self, n: usize) {
        let current = self.blocks.last().unwrap();
        if current.remaining() < n {
            // Grow geometrically so repeated small spills stay cheap.
            let next_size = n.max(current.buf.capacity() * 2);
            self.blocks.push(Block::with_capacity(next_size));
        }
    }

    /// Opens a string builder appending at the top of the arena.
    pub fn builder(&mut self) -> StackString<'_> {
        let block = self.blocks.len() - 1;
        let start = self.blocks[block].buf.len();
        StackString {
            arena: self,
            block,
            start,
        }
    }
}

/// Byte-string builder backed by the arena
///
/// Bytes are pushed one at a time or in slices; the string stays
/// contiguous, moving to a larger block when the current one fills up.
/// [`finish`](Self::finish) returns the built text; dropping the builder
/// instead rewinds the arena to where the builder started, which is the
/// equivalent of the original allocator's in-block rewind.
#[derive(Debug)]
pub struct StackString<'a> {
    arena: &'a mut Arena,
    block: usize,
    start: usize,
}

impl StackString<'_> {
    /// Appends one byte.
    pub fn push(&mut self, byte: u8) {
        self.push_slice(&[byte]);
    }

    /// Appends a byte slice.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        let block = &mut self.arena.blocks[self.block];
        if block.remaining() >= bytes.len() {
            block.buf.extend_from_slice(bytes);
            return;
        }
        self.grow(bytes.len());
        self.arena.blocks[self.block]
            .buf
            .extend_from_slice(bytes);
    }

    /// Length of the string built so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.blocks[self.block].buf.len() - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes built so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.arena.blocks[self.block].buf[self.start..]
    }

    /// Finishes the string, leaving it allocated in the arena.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let result = self.as_bytes().to_vec();
        std::mem::forget(self);
        result
    }

    /// Moves the partial string into a block with at least `extra` more
    /// bytes of room.
    fn grow(&mut self, extra: usize) {
        let len = self.len();
        let needed = len + extra;
        let current_capacity = self.arena.blocks[self.block].buf.capacity();
        let new_capacity = needed.max(current_capacity * 2);

        let mut moved = Vec::with_capacity(new_capacity.max(MIN_BLOCK));
        moved.extend_from_slice(self.as_bytes());
        self.arena.blocks[self.block].buf.truncate(self.start);
        self.arena.blocks.push(Block { buf: moved });
        self.block = self.arena.blocks.len() - 1;
        self.start = 0;
    }
}

impl Drop for StackString<'_> {
    fn drop(&mut self) {
        // Abandoned builder: rewind so the bytes do not leak until the
        // next mark release.
        if self.block < self.arena.blocks.len() {
            self.arena.blocks[self.block].buf.truncate(self.start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_release_restore_live_bytes() {
        let mut arena = Arena::new();
        arena.alloc_bytes(b"persistent");
        let before = arena.live_bytes();

        let mark = arena.mark();
        arena.alloc_bytes(b"transient one");
        arena.alloc_bytes(&[b'x'; 2000]);
        arena.alloc_bytes(b"transient two");
        assert!(arena.live_bytes() > before);
        arena.release(mark);

        assert_eq!(arena.live_bytes(), before);
    }

    #[test]
    fn nested_marks() {
        let mut arena = Arena::new();
        let outer = arena.mark();
        arena.alloc_bytes(b"outer data");
        let middle = arena.live_bytes();

        let inner = arena.mark();
        arena.alloc_bytes(&[0u8; 5000]);
        arena.release(inner);
        assert_eq!(arena.live_bytes(), middle);

        arena.release(outer);
        assert_eq!(arena.live_bytes(), 0);
    }

    #[test]
    fn allocation_contents_survive_until_release() {
        let mut arena = Arena::new();
        let copied = arena.alloc_bytes(b"hello").to_vec();
        assert_eq!(copied, b"hello");
    }

    #[test]
    fn large_allocations_get_their_own_block() {
        let mut arena = Arena::new();
        let mark = arena.mark();
        let big = vec![7u8; MIN_BLOCK * 4];
        assert_eq!(arena.alloc_bytes(&big), &big[..]);
        arena.release(mark);
        assert_eq!(arena.live_bytes(), 0);
    }

    #[test]
    fn builder_grows_across_blocks() {
        let mut arena = Arena::new();
        // Nearly fill the first block so the builder must relocate.
        arena.alloc_bytes(&vec![0u8; MIN_BLOCK - 10]);
        let mark = arena.mark();

        let mut builder = arena.builder();
        for i in 0..1000u32 {
            builder.push((i % 251) as u8);
        }
        let text = builder.finish();
        assert_eq!(text.len(), 1000);
        assert!(text.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));

        arena.release(mark);
        assert_eq!(arena.live_bytes(), MIN_BLOCK - 10);
    }

    #[test]
    fn dropped_builder_rewinds() {
        let mut arena = Arena::new();
        let before = arena.live_bytes();
        {
            let mut builder = arena.builder();
            builder.push_slice(b"abandoned");
            assert_eq!(builder.as_bytes(), b"abandoned");
        }
        assert_eq!(arena.live_bytes(), before);
    }

    #[test]
    fn builder_push_slice_spanning_growth() {
        let mut arena = Arena::new();
        let mut builder = arena.builder();
        let chunk = vec![9u8; 400];
        builder.push_slice(&chunk);
        builder.push_slice(&chunk);
        builder.push_slice(&chunk);
        assert_eq!(builder.len(), 1200);
        assert_eq!(builder.finish(), [9u8; 1200]);
    }
}
