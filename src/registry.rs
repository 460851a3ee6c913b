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

//! The block registry: a process-wide, write-once table of every block
//! (memory or disk) ever created, addressed by `BlockId` (§3).
//!
//! A block, once published, is never removed or replaced — callers
//! that have already resolved an id through the index can keep using
//! the reference indefinitely. `OnceLock` gives exactly that contract
//! per slot with no locking on the read path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use crate::block::Block;
use crate::error::{Error, Result};
use crate::key::{BlockId, OFFSET};

const CAPACITY: usize = 1 << 16;

pub struct BlockRegistry {
	slots: Vec<OnceLock<Block>>,
	next_id: AtomicU32,
}

impl BlockRegistry {
	pub fn new() -> BlockRegistry {
		let mut slots = Vec::with_capacity(CAPACITY);
		for _ in 0..CAPACITY {
			slots.push(OnceLock::new());
		}
		BlockRegistry { slots, next_id: AtomicU32::new(OFFSET as u32) }
	}

	/// Reserves the next id. Fatal once the 16-bit id space is
	/// exhausted — callers must surface this to the embedder rather
	/// than silently wrapping back into live ids.
	pub fn reserve_id(&self) -> Result<BlockId> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		if id as usize >= CAPACITY {
			return Err(Error::Overflow);
		}
		Ok(id as BlockId)
	}

	/// Publishes `block` under `id`, reserved earlier via
	/// [`reserve_id`]. Panics if called twice for the same id — that
	/// would be a bug in the pipeline wiring, not a runtime condition.
	pub fn publish(&self, id: BlockId, block: Block) {
		self.slots[id as usize]
			.set(block)
			.unwrap_or_else(|_| panic!("block id {} published twice", id));
	}

	pub fn get(&self, id: BlockId) -> Option<&Block> {
		self.slots[id as usize].get()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::mem_block::MemoryBlock;

	#[test]
	fn reserve_assigns_increasing_ids_from_offset() {
		let registry = BlockRegistry::new();
		let a = registry.reserve_id().unwrap();
		let b = registry.reserve_id().unwrap();
		assert_eq!(a, OFFSET);
		assert_eq!(b, OFFSET + 1);
	}

	#[test]
	fn publish_then_get_round_trips() {
		let registry = BlockRegistry::new();
		let id = registry.reserve_id().unwrap();
		registry.publish(id, Block::Memory(MemoryBlock::new(id, 4096, 4096)));
		assert!(registry.get(id).is_some());
		assert!(registry.get(id + 1).is_none());
	}

	#[test]
	#[should_panic(expected = "published twice")]
	fn publish_twice_panics() {
		let registry = BlockRegistry::new();
		let id = registry.reserve_id().unwrap();
		registry.publish(id, Block::Memory(MemoryBlock::new(id, 4096, 4096)));
		registry.publish(id, Block::Memory(MemoryBlock::new(id, 4096, 4096)));
	}
}
