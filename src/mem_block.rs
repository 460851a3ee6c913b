// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

//! The memory block: a pair of appendable regions (§3 "Memory block").
//!
//! TOC entries are fixed 28 bytes: `u32 dataOffset, u64 A, u64 B, u64
//! seq`. Data entries are `u32 len ‖ value`. Both the memory writer's
//! index publish and the clearer's TOC-rewrite publish use the entry's
//! *start* offset (the position of the `u32 len`/`u32 dataOffset`
//! field) — see spec.md §9 Open Question 1; the two paths must agree
//! or `Get` reads garbage.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use crate::key::{BlockId, Key};
use crate::request::ReadValue;

pub const TOC_ENTRY_SIZE: usize = 4 + 8 + 8 + 8;

pub struct TocEntry {
	pub data_offset: u32,
	pub a: u64,
	pub b: u64,
	pub seq: u64,
}

pub struct MemoryBlock {
	pub id: BlockId,
	toc: RwLock<Vec<u8>>,
	data: RwLock<Vec<u8>>,
	toc_cap: usize,
	data_cap: usize,
	/// Set by the disk writer once this block's payload has been
	/// written; read by the clearer to compute each entry's disk
	/// location. `0` means "not yet flushed."
	disk_id: AtomicU16,
	disk_offset: AtomicU32,
}

impl MemoryBlock {
	pub fn new(id: BlockId, toc_cap: usize, data_cap: usize) -> MemoryBlock {
		MemoryBlock {
			id,
			toc: RwLock::new(Vec::with_capacity(toc_cap)),
			data: RwLock::new(Vec::with_capacity(data_cap)),
			toc_cap,
			data_cap,
			disk_id: AtomicU16::new(0),
			disk_offset: AtomicU32::new(0),
		}
	}

	pub fn fits(&self, value_len: usize) -> bool {
		let toc_len = self.toc.read().len();
		let data_len = self.data.read().len();
		toc_len + TOC_ENTRY_SIZE <= self.toc_cap && data_len + 4 + value_len <= self.data_cap
	}

	pub fn is_empty(&self) -> bool {
		self.toc.read().is_empty()
	}

	/// Appends one entry. Returns the entry's *start* offset in the
	/// data region — the value the index must be pointed at.
	pub fn append(&self, key: &Key, seq: u64, value: &[u8]) -> u32 {
		let mut data = self.data.write();
		let mut toc = self.toc.write();
		let entry_start = data.len() as u32;

		data.extend_from_slice(&(value.len() as u32).to_le_bytes());
		data.extend_from_slice(value);

		toc.extend_from_slice(&entry_start.to_le_bytes());
		toc.extend_from_slice(&key.a.to_le_bytes());
		toc.extend_from_slice(&key.b.to_le_bytes());
		toc.extend_from_slice(&seq.to_le_bytes());

		entry_start
	}

	/// Decodes every TOC record currently in the block, in append
	/// order. Called by the clearer; nothing else mutates the TOC
	/// region once a block has left the memory writer's hands.
	pub fn toc_entries(&self) -> Vec<TocEntry> {
		let toc = self.toc.read();
		let mut out = Vec::with_capacity(toc.len() / TOC_ENTRY_SIZE);
		let mut i = 0;
		while i + TOC_ENTRY_SIZE <= toc.len() {
			let data_offset = u32::from_le_bytes(toc[i..i + 4].try_into().unwrap());
			let a = u64::from_le_bytes(toc[i + 4..i + 12].try_into().unwrap());
			let b = u64::from_le_bytes(toc[i + 12..i + 20].try_into().unwrap());
			let seq = u64::from_le_bytes(toc[i + 20..i + 28].try_into().unwrap());
			out.push(TocEntry { data_offset, a, b, seq });
			i += TOC_ENTRY_SIZE;
		}
		out
	}

	/// The raw payload stream the disk writer appends to the value
	/// file verbatim.
	pub fn data_snapshot(&self) -> Vec<u8> {
		self.data.read().clone()
	}

	pub fn set_disk_location(&self, disk_id: BlockId, disk_offset: u32) {
		self.disk_id.store(disk_id, Ordering::Release);
		self.disk_offset.store(disk_offset, Ordering::Release);
	}

	pub fn disk_id(&self) -> BlockId {
		self.disk_id.load(Ordering::Acquire)
	}

	pub fn disk_offset(&self) -> u32 {
		self.disk_offset.load(Ordering::Acquire)
	}

	/// Wipes both regions and clears the post-flush disk location.
	/// Takes the write lock on `data`, which blocks until any read
	/// holding the read lock has finished — but only for reads already
	/// in progress; a reader that hasn't yet acquired the lock can
	/// still be resolving a now-stale `(block_id, offset)` pair it read
	/// from the index before this reset started. See
	/// [`read_if_current`](Self::read_if_current), which is what
	/// closes that window.
	pub fn reset(&self) {
		self.data.write().clear();
		self.toc.write().clear();
		self.disk_id.store(0, Ordering::Release);
		self.disk_offset.store(0, Ordering::Release);
	}

	/// `Get` against a memory-resident location: read the `u32` length
	/// at `offset`, copy `len` bytes from `offset + 4` into the
	/// caller's buffer. Unchecked — the caller must already know
	/// `offset` is current (used directly only by this module's unit
	/// tests); production reads go through
	/// [`read_if_current`](Self::read_if_current) instead.
	pub fn get(&self, offset: u32, req: &mut ReadValue) -> crate::error::Result<()> {
		let data = self.data.read();
		let offset = offset as usize;
		let len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
		req.value.clear();
		req.value.extend_from_slice(&data[offset + 4..offset + 4 + len]);
		Ok(())
	}

	/// Same as [`get`](Self::get), but first re-resolves `key` against
	/// `index` while already holding the read lock, and proceeds only
	/// if the index still names this exact `(block_id, offset)` pair.
	///
	/// Closes the race between `Store::get`'s index lookup and this
	/// read: between those two steps the memory clearer can redirect
	/// every entry in this block to disk and call [`reset`](Self::reset),
	/// reusing the block for unrelated writes before the stale read
	/// ever takes its lock. Re-resolving under the lock means either
	/// the index still agrees (so `reset` cannot be mid-flight — it
	/// needs the write lock this call is holding as a read lock) and
	/// the bytes read are exactly the ones the index names, or the
	/// index has moved on and `None` is returned so the caller retries
	/// the dispatch from a fresh index lookup (§5, §8 invariant 1).
	pub fn read_if_current(
		&self,
		offset: u32,
		key: &Key,
		index: &crate::index::Index,
		req: &mut ReadValue,
	) -> Option<crate::error::Result<()>> {
		let data = self.data.read();
		let current = index.get(key);
		if current.block_id != self.id || current.offset != offset {
			return None;
		}
		let offset = offset as usize;
		let len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
		req.value.clear();
		req.value.extend_from_slice(&data[offset + 4..offset + 4 + len]);
		Some(Ok(()))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn append_returns_entry_start_and_round_trips() {
		let block = MemoryBlock::new(1, 4096, 4096);
		let key = Key::new(1, 2);
		let off = block.append(&key, 10, b"hello");
		assert_eq!(off, 0);
		let mut req = ReadValue::new(Key::new(1, 2), 16);
		block.get(off, &mut req).unwrap();
		assert_eq!(req.value, b"hello");
	}

	#[test]
	fn second_entry_starts_after_first() {
		let block = MemoryBlock::new(1, 4096, 4096);
		let key = Key::new(1, 2);
		let off1 = block.append(&key, 1, b"aa");
		let off2 = block.append(&key, 2, b"bbb");
		assert_eq!(off1, 0);
		assert_eq!(off2, 4 + 2); // len-prefix + "aa"
		let mut req = ReadValue::new(key, 16);
		block.get(off2, &mut req).unwrap();
		assert_eq!(req.value, b"bbb");
	}

	#[test]
	fn toc_entries_decode_in_order() {
		let block = MemoryBlock::new(1, 4096, 4096);
		let k1 = Key::new(1, 2);
		let k2 = Key::new(3, 4);
		block.append(&k1, 10, b"x");
		block.append(&k2, 20, b"yy");
		let entries = block.toc_entries();
		assert_eq!(entries.len(), 2);
		assert_eq!((entries[0].a, entries[0].b, entries[0].seq), (1, 2, 10));
		assert_eq!((entries[1].a, entries[1].b, entries[1].seq), (3, 4, 20));
	}

	#[test]
	fn fits_respects_capacity() {
		let block = MemoryBlock::new(1, TOC_ENTRY_SIZE, 4 + 3);
		assert!(block.fits(3));
		assert!(!block.fits(4));
		block.append(&Key::new(1, 1), 1, b"abc");
		assert!(!block.fits(0));
	}

	#[test]
	fn reset_clears_regions_and_disk_location() {
		let block = MemoryBlock::new(1, 4096, 4096);
		block.append(&Key::new(1, 1), 1, b"abc");
		block.set_disk_location(7, 42);
		block.reset();
		assert!(block.is_empty());
		assert_eq!(block.disk_id(), 0);
		assert_eq!(block.disk_offset(), 0);
	}

	#[test]
	fn read_if_current_succeeds_when_index_still_agrees() {
		let block = MemoryBlock::new(3, 4096, 4096);
		let key = Key::new(1, 2);
		let off = block.append(&key, 10, b"hello");

		let index = crate::index::Index::new(1);
		index.set(3, off, &key, 10);

		let mut req = ReadValue::new(key, 16);
		let result = block.read_if_current(off, &key, &index, &mut req);
		assert!(result.is_some());
		result.unwrap().unwrap();
		assert_eq!(req.value, b"hello");
	}

	#[test]
	fn read_if_current_returns_none_when_index_has_moved_on() {
		let block = MemoryBlock::new(3, 4096, 4096);
		let key = Key::new(1, 2);
		let off = block.append(&key, 10, b"hello");

		let index = crate::index::Index::new(1);
		// The clearer redirected this key to a disk block before the
		// caller's stale `(block_id, offset)` read could take the lock.
		// A higher `seq` mirrors the clearer publishing the same entry
		// again at its final (disk) location.
		index.set(9, 123, &key, 11);

		let mut req = ReadValue::new(key, 16);
		assert!(block.read_if_current(off, &key, &index, &mut req).is_none());
	}

	#[test]
	fn read_if_current_returns_none_after_reset_recycles_the_block() {
		let block = MemoryBlock::new(3, 4096, 4096);
		let key = Key::new(1, 2);
		let off = block.append(&key, 10, b"hello");

		let index = crate::index::Index::new(1);
		index.set(3, off, &key, 10);
		// Simulate the clearer redirecting then resetting the block for
		// reuse, without the index ever hearing about this exact key again.
		index.set(9, 999, &key, 11);
		block.reset();
		block.append(&Key::new(5, 6), 1, b"unrelated");

		let mut req = ReadValue::new(key, 16);
		assert!(block.read_if_current(off, &key, &index, &mut req).is_none());
	}
}
