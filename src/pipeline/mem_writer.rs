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

//! One memory-writer worker (§4.2). `Cores` of these run, each
//! sharded by `(A >> 1) mod Cores`; each owns exactly one in-flight
//! memory block at a time, borrowed from the shared cleared pool.

use std::sync::atomic::Ordering;

use crate::block::Block;
use crate::error::Error;
use crate::key::BlockId;
use crate::request::WriteValue;
use crate::store::Shared;

pub(crate) fn run(
	shared: &Shared,
	put_rx: flume::Receiver<WriteValue>,
	cleared_rx: flume::Receiver<BlockId>,
	cleared_tx: flume::Sender<BlockId>,
	disk_writable_tx: flume::Sender<BlockId>,
) {
	let mut current: Option<BlockId> = None;

	while let Ok(wv) = put_rx.recv() {
		handle_put(shared, &mut current, &cleared_rx, &disk_writable_tx, wv);
	}

	// Shutdown: hand off the partial block if it holds anything,
	// otherwise return it untouched to the cleared pool so every
	// buffer is accounted for (§8 invariant 5).
	if let Some(id) = current.take() {
		let mb = match shared.registry.get(id) {
			Some(Block::Memory(m)) => m,
			_ => unreachable!(),
		};
		if mb.is_empty() {
			let _ = cleared_tx.send(id);
		} else {
			let _ = disk_writable_tx.send(id);
		}
	}
}

fn handle_put(
	shared: &Shared,
	current: &mut Option<BlockId>,
	cleared_rx: &flume::Receiver<BlockId>,
	disk_writable_tx: &flume::Sender<BlockId>,
	wv: WriteValue,
) {
	let value_len = wv.value.len();
	if value_len > shared.options.max_value_size {
		shared.stats.value_too_large.fetch_add(1, Ordering::Relaxed);
		log::trace!(target: "brimstore", "mem writer: rejecting oversized put ({} bytes)", value_len);
		wv.complete(Err(Error::ValueTooLarge { len: value_len, max: shared.options.max_value_size }));
		return;
	}

	loop {
		let id = match *current {
			Some(id) => id,
			None => {
				let id = cleared_rx.recv().expect("cleared pool closed while store is running");
				*current = Some(id);
				id
			}
		};
		let mb = match shared.registry.get(id) {
			Some(Block::Memory(m)) => m,
			_ => unreachable!("cleared pool carries only memory block ids"),
		};

		if mb.fits(wv.value.len()) {
			let entry_start = mb.append(&wv.key, wv.seq, &wv.value);
			shared.index.set(id, entry_start, &wv.key, wv.seq);
			shared.stats.puts.fetch_add(1, Ordering::Relaxed);
			log::trace!(
				target: "brimstore",
				"mem writer: put {}{} seq {} -> block {} @ {}",
				crate::display::hex(&wv.key.a.to_le_bytes()), crate::display::hex(&wv.key.b.to_le_bytes()),
				wv.seq, id, entry_start,
			);
			wv.complete(Ok(()));
			return;
		}

		// Full: hand off to the disk writer and take a fresh block.
		let _ = disk_writable_tx.send(id);
		*current = None;
	}
}
