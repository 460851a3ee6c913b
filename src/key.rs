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

/// `blockId == 0` means "not present" — id 0 is reserved in the block
/// registry so a default-initialized `Location` reads as absent.
pub const OFFSET: u16 = 1;

/// A 128-bit key, carried as two 64-bit halves. Both halves are
/// assumed to already be well-distributed hashes.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Key {
	pub a: u64,
	pub b: u64,
}

impl Key {
	pub fn new(a: u64, b: u64) -> Key {
		Key { a, b }
	}

	/// Memory-writer shard / index stripe selector, per spec §4.2.
	pub fn shard(&self, modulus: usize) -> usize {
		((self.a >> 1) as usize) % modulus
	}
}

pub type BlockId = u16;

/// `(blockId, offset, seq)`: where a key's current value lives and its
/// version. `block_id < OFFSET` means absent.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct Location {
	pub block_id: BlockId,
	pub offset: u32,
	pub seq: u64,
}

impl Location {
	pub fn absent() -> Location {
		Location { block_id: 0, offset: 0, seq: 0 }
	}

	pub fn is_present(&self) -> bool {
		self.block_id >= OFFSET
	}
}
