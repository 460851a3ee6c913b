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

//! The two block variants the registry holds (§3, §9 "Polymorphic
//! blocks"): a tagged enum rather than a trait object, since exactly
//! two variants will ever exist.

use crate::disk_block::DiskBlock;
use crate::index::Index;
use crate::key::{Key, Location};
use crate::mem_block::MemoryBlock;
use crate::request::ReadValue;

pub enum Block {
	Memory(MemoryBlock),
	Disk(DiskBlock),
}

impl Block {
	/// A memory block's timestamp is `+∞` so the memory clearer's page
	/// rotation logic (keyed by disk-block timestamp) treats
	/// memory-tagged pages as a distinct bucket (§3 Invariant 4).
	pub fn timestamp(&self) -> i64 {
		match self {
			Block::Memory(_) => i64::MAX,
			Block::Disk(d) => d.timestamp(),
		}
	}

	/// Resolves `req` against this block at `location`, given `key` and
	/// the `index` that produced `location` (§4.6).
	///
	/// A disk-block read is handed off to one of the block's four
	/// reader threads, chosen by key; the payload at `location.offset`
	/// is permanent once appended, so no staleness check is needed.
	/// `req` is consumed and its channel is signaled later, from that
	/// thread; this call returns `None`.
	///
	/// A memory-block read re-resolves `key` against `index` while
	/// holding the block's read lock, because the block's data region
	/// can be redirected-then-reset by the memory clearer between the
	/// caller's index lookup and this call — see
	/// [`MemoryBlock::read_if_current`]. If the location is still
	/// current, the read is satisfied inline and this returns `None`.
	/// If it is stale, `req` is handed back unmodified so the caller
	/// can retry with a fresh index lookup.
	pub fn get(&self, location: Location, key: &Key, index: &Index, mut req: ReadValue) -> Option<ReadValue> {
		match self {
			Block::Memory(m) => match m.read_if_current(location.offset, key, index, &mut req) {
				Some(result) => {
					req.complete(result);
					None
				}
				None => Some(req),
			},
			Block::Disk(d) => {
				d.dispatch_get(location.offset, req);
				None
			}
		}
	}
}
