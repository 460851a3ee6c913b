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

//! The single disk-writer worker (§4.3): consumes filled memory
//! blocks in arrival order, writes their payload into the active
//! value file, and rotates to a fresh file when the logical offset
//! would overflow a `u32`.

use std::sync::atomic::Ordering;

use crate::block::Block;
use crate::disk_block::{self, DiskBlock};
use crate::key::BlockId;
use crate::store::Shared;

pub(crate) fn run(shared: &Shared, disk_writable_rx: flume::Receiver<BlockId>, clearable_tx: flume::Sender<BlockId>) {
	let mut current: Option<BlockId> = None;

	while let Ok(mb_id) = disk_writable_rx.recv() {
		if let Err(e) = handle_block(shared, &mut current, mb_id, &clearable_tx) {
			log::error!(target: "brimstore", "disk writer: fatal io error: {}", e);
			shared.stats.record_fatal();
			break;
		}
	}

	if let Some(id) = current {
		if let Some(Block::Disk(d)) = shared.registry.get(id) {
			if let Err(e) = d.finalize() {
				log::error!(target: "brimstore", "disk writer: fatal io error on shutdown flush: {}", e);
				shared.stats.record_fatal();
			}
		}
	}
}

fn handle_block(
	shared: &Shared,
	current: &mut Option<BlockId>,
	mb_id: BlockId,
	clearable_tx: &flume::Sender<BlockId>,
) -> crate::error::Result<()> {
	let mb = match shared.registry.get(mb_id) {
		Some(Block::Memory(m)) => m,
		_ => unreachable!("disk-writable queue carries only memory block ids"),
	};
	let payload = mb.data_snapshot();

	let disk_id = current_disk_block(shared, current, payload.len())?;
	let disk_block = match shared.registry.get(disk_id) {
		Some(Block::Disk(d)) => d,
		_ => unreachable!("current always names a disk block"),
	};

	let disk_offset = disk_block.append(&payload)?;
	mb.set_disk_location(disk_id, disk_offset);
	shared.stats.bytes_written.fetch_add(payload.len() as u64, Ordering::Relaxed);

	log::trace!(
		target: "brimstore",
		"disk writer: flushed block {} -> disk {} @ {} ({} bytes)",
		mb_id, disk_id, disk_offset, payload.len(),
	);

	clearable_tx.send(mb_id).ok();
	Ok(())
}

/// Returns the id of the disk block payloads should go to, rotating
/// to a freshly created one if none is open yet or the write would
/// push the logical offset past `u32::MAX` (§4.3 step 1-2).
fn current_disk_block(shared: &Shared, current: &mut Option<BlockId>, payload_len: usize) -> crate::error::Result<BlockId> {
	let needs_rotation = match *current {
		None => true,
		Some(id) => {
			let d = match shared.registry.get(id) {
				Some(Block::Disk(d)) => d,
				_ => unreachable!(),
			};
			d.logical_offset() + payload_len as u64 > u32::MAX as u64
		}
	};

	if !needs_rotation {
		return Ok(current.unwrap());
	}

	if let Some(old_id) = current.take() {
		if let Some(Block::Disk(d)) = shared.registry.get(old_id) {
			d.finalize()?;
		}
	}

	let timestamp = now_nanos();
	let path = disk_block::values_path(&shared.dir, timestamp);
	let id = shared.registry.reserve_id()?;
	let block = DiskBlock::create(id, &path, timestamp, shared.options.checksum_interval)?;
	shared.registry.publish(id, Block::Disk(block));
	shared.stats.disk_blocks.fetch_add(1, Ordering::Relaxed);
	*current = Some(id);
	Ok(id)
}

fn now_nanos() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.expect("system clock before unix epoch")
		.as_nanos() as i64
}
