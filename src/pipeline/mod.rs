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

//! Pipeline wiring: the bounded queues between stages and the worker
//! threads that consume them (§5).
//!
//! Shutdown is driven by dropping senders, not by a hand-rolled
//! sentinel: a `flume` channel reports closed once every clone of its
//! `Sender` is gone, which happens to line up exactly with the
//! five-stage sequence in §5 once workers are joined in order —
//! joining the memory writers drops their `disk_writable` senders,
//! which lets the disk writer finish and drop its `clearable` sender,
//! and so on down the chain.

mod disk_writer;
mod mem_clearer;
mod mem_writer;
mod toc_writer;

use std::thread::JoinHandle;

use crate::key::BlockId;
use crate::mem_block::MemoryBlock;
use crate::request::WriteValue;
use crate::store::Shared;
use toc_writer::TocPage;

pub(crate) struct Pipeline {
	put_txs: Vec<flume::Sender<WriteValue>>,
	mem_writers: Vec<JoinHandle<()>>,
	disk_writer: Option<JoinHandle<()>>,
	mem_clearers: Vec<JoinHandle<()>>,
	toc_writer: Option<JoinHandle<()>>,
}

impl Pipeline {
	pub(crate) fn spawn(shared: std::sync::Arc<Shared>) -> Pipeline {
		let cores = shared.options.cores.max(1);

		// Buffer pools are sized to hold every buffer at once (§5
		// "Buffer pools"); the hand-off queues between stages are
		// sized `Cores` (§5 "Queue capacities").
		let (cleared_tx, cleared_rx) = flume::bounded::<BlockId>(2 * cores);
		let (disk_writable_tx, disk_writable_rx) = flume::bounded::<BlockId>(cores);
		let (clearable_tx, clearable_rx) = flume::bounded::<BlockId>(cores);
		let (pending_toc_tx, pending_toc_rx) = flume::bounded::<TocPage>(cores);
		let (free_toc_tx, free_toc_rx) = flume::bounded::<TocPage>(cores);

		preload_buffer_pools(&shared, &cleared_tx, &free_toc_tx, cores);

		let mut put_txs = Vec::with_capacity(cores);
		let mut mem_writers = Vec::with_capacity(cores);
		for shard in 0..cores {
			let (put_tx, put_rx) = flume::bounded::<WriteValue>(1);
			put_txs.push(put_tx);
			let shared = shared.clone();
			let cleared_rx = cleared_rx.clone();
			let cleared_tx = cleared_tx.clone();
			let disk_writable_tx = disk_writable_tx.clone();
			let handle = std::thread::Builder::new()
				.name(format!("brimstore-mem-writer-{}", shard))
				.spawn(move || mem_writer::run(&shared, put_rx, cleared_rx, cleared_tx, disk_writable_tx))
				.expect("failed to spawn memory writer thread");
			mem_writers.push(handle);
		}
		drop(disk_writable_tx);

		let disk_writer = {
			let shared = shared.clone();
			let clearable_tx = clearable_tx.clone();
			std::thread::Builder::new()
				.name("brimstore-disk-writer".to_string())
				.spawn(move || disk_writer::run(&shared, disk_writable_rx, clearable_tx))
				.expect("failed to spawn disk writer thread")
		};
		drop(clearable_tx);

		let mut mem_clearers = Vec::with_capacity(cores);
		for shard in 0..cores {
			let shared = shared.clone();
			let clearable_rx = clearable_rx.clone();
			let cleared_tx = cleared_tx.clone();
			let free_toc_rx = free_toc_rx.clone();
			let pending_toc_tx = pending_toc_tx.clone();
			let handle = std::thread::Builder::new()
				.name(format!("brimstore-mem-clearer-{}", shard))
				.spawn(move || mem_clearer::run(&shared, clearable_rx, cleared_tx, free_toc_rx, pending_toc_tx))
				.expect("failed to spawn memory clearer thread");
			mem_clearers.push(handle);
		}
		drop(cleared_tx);
		drop(pending_toc_tx);

		let toc_writer = {
			let shared = shared.clone();
			std::thread::Builder::new()
				.name("brimstore-toc-writer".to_string())
				.spawn(move || toc_writer::run(&shared, pending_toc_rx, free_toc_tx))
				.expect("failed to spawn toc writer thread")
		};

		Pipeline { put_txs, mem_writers, disk_writer: Some(disk_writer), mem_clearers, toc_writer: Some(toc_writer) }
	}

	pub(crate) fn put(&self, shard: usize, wv: WriteValue) {
		// A full shard queue means that shard's writer is wedged on a
		// downstream hand-off; propagating the blocking send here is
		// the natural back-pressure §5 describes, not an error.
		let _ = self.put_txs[shard].send(wv);
	}

	pub(crate) fn shard_count(&self) -> usize {
		self.put_txs.len()
	}

	/// Drives the five-stage shutdown in §5 by dropping senders and
	/// joining threads in dependency order.
	pub(crate) fn stop(mut self) {
		self.put_txs.clear();
		for h in self.mem_writers.drain(..) {
			let _ = h.join();
		}
		if let Some(h) = self.disk_writer.take() {
			let _ = h.join();
		}
		for h in self.mem_clearers.drain(..) {
			let _ = h.join();
		}
		if let Some(h) = self.toc_writer.take() {
			let _ = h.join();
		}
	}
}

/// Pre-creates `2 * Cores` memory blocks and `Cores` TOC page buffers
/// at startup (§5 "Buffer pools") — no allocation in the steady-state
/// path.
fn preload_buffer_pools(
	shared: &std::sync::Arc<Shared>,
	cleared_tx: &flume::Sender<BlockId>,
	free_toc_tx: &flume::Sender<TocPage>,
	cores: usize,
) {
	for _ in 0..2 * cores {
		let id = shared.registry.reserve_id().expect("block registry exhausted during startup");
		let block = MemoryBlock::new(id, shared.options.mem_toc_page_size, shared.options.mem_values_page_size);
		shared.registry.publish(id, crate::block::Block::Memory(block));
		let _ = cleared_tx.send(id);
	}
	for _ in 0..cores {
		let _ = free_toc_tx.send(TocPage { buf: Vec::with_capacity(shared.options.mem_toc_page_size), timestamp: 0 });
	}
}
