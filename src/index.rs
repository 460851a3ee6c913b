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

//! The key-location index: a concurrent hash table mapping a 128-bit
//! key to its current `(blockId, offset, seq)`.
//!
//! Striped over `N` shards, each an `RwLock<HashMap<...>>`. A shard's
//! `HashMap` resizes synchronously under its own write lock, so there
//! is never an externally-observable "mid resize" state; `is_resizing`
//! is therefore always `false` (see SPEC_FULL.md / DESIGN.md).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::key::{BlockId, Key, Location};

const MIN_SHARDS: usize = 16;

pub struct Index {
	shards: Vec<RwLock<HashMap<(u64, u64), Location>>>,
}

impl Index {
	/// `cores` is used only to size the striping; it has no bearing on
	/// correctness.
	pub fn new(cores: usize) -> Index {
		let want = (cores * 4).max(1);
		let n = want.next_power_of_two().max(MIN_SHARDS);
		let mut shards = Vec::with_capacity(n);
		for _ in 0..n {
			shards.push(RwLock::new(HashMap::new()));
		}
		Index { shards }
	}

	fn shard_for(&self, key: &Key) -> &RwLock<HashMap<(u64, u64), Location>> {
		&self.shards[key.shard(self.shards.len())]
	}

	/// Returns `Location::absent()` when the key has never been
	/// written.
	pub fn get(&self, key: &Key) -> Location {
		let shard = self.shard_for(key).read();
		shard.get(&(key.a, key.b)).copied().unwrap_or_else(Location::absent)
	}

	/// Inserts or updates. A no-op if the stored `seq` is already `>=`
	/// the incoming `seq` — conflict resolution is by `seq`, not by
	/// arrival order.
	pub fn set(&self, block_id: BlockId, offset: u32, key: &Key, seq: u64) {
		let mut shard = self.shard_for(key).write();
		match shard.get(&(key.a, key.b)) {
			Some(existing) if existing.seq >= seq => {
				log::trace!(
					target: "brimstore",
					"index: stale set for {:?} (existing seq {} >= incoming {})",
					key, existing.seq, seq,
				);
			}
			_ => {
				shard.insert((key.a, key.b), Location { block_id, offset, seq });
			}
		}
	}

	/// Always `false`: see module docs.
	pub fn is_resizing(&self) -> bool {
		false
	}

	pub fn len(&self) -> usize {
		self.shards.iter().map(|s| s.read().len()).sum()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn absent_key_reads_absent() {
		let index = Index::new(1);
		let key = Key::new(99, 99);
		assert!(!index.get(&key).is_present());
	}

	#[test]
	fn set_then_get_round_trips() {
		let index = Index::new(1);
		let key = Key::new(1, 2);
		index.set(5, 10, &key, 10);
		let loc = index.get(&key);
		assert_eq!(loc, Location { block_id: 5, offset: 10, seq: 10 });
	}

	#[test]
	fn lower_seq_does_not_override() {
		let index = Index::new(1);
		let key = Key::new(1, 2);
		index.set(5, 10, &key, 10);
		index.set(6, 20, &key, 5);
		assert_eq!(index.get(&key).seq, 10);
		assert_eq!(index.get(&key).block_id, 5);
	}

	#[test]
	fn higher_seq_overrides() {
		let index = Index::new(1);
		let key = Key::new(1, 2);
		index.set(5, 10, &key, 10);
		index.set(6, 20, &key, 20);
		let loc = index.get(&key);
		assert_eq!(loc, Location { block_id: 6, offset: 20, seq: 20 });
	}

	#[test]
	fn never_resizing() {
		let index = Index::new(4);
		assert!(!index.is_resizing());
	}

	#[test]
	fn concurrent_writers_distinct_keys() {
		use std::sync::Arc;
		let index = Arc::new(Index::new(4));
		let mut handles = Vec::new();
		for t in 0..8u64 {
			let index = index.clone();
			handles.push(std::thread::spawn(move || {
				for i in 0..1000u64 {
					let key = Key::new(t * 100_000 + i, i);
					index.set(1, i as u32, &key, 1);
				}
			}));
		}
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(index.len(), 8000);
	}
}
