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

//! The memory-clearer pool (§4.4): folds a flushed memory block's TOC
//! entries into the index and the TOC-page stream, then returns the
//! buffer to the cleared pool.

use crate::block::Block;
use crate::key::Key;
use crate::pipeline::toc_writer::{self, TocPage};
use crate::store::Shared;

pub(crate) fn run(
	shared: &Shared,
	clearable_rx: flume::Receiver<u16>,
	cleared_tx: flume::Sender<u16>,
	free_toc_rx: flume::Receiver<TocPage>,
	pending_toc_tx: flume::Sender<TocPage>,
) {
	let mut in_flight: Option<TocPage> = None;

	while let Ok(mb_id) = clearable_rx.recv() {
		let mb = match shared.registry.get(mb_id) {
			Some(Block::Memory(m)) => m,
			_ => unreachable!("clearable queue carries only memory block ids"),
		};
		let disk_id = mb.disk_id();
		let disk_offset = mb.disk_offset();
		let disk_timestamp = match shared.registry.get(disk_id) {
			Some(d) => d.timestamp(),
			None => unreachable!("memory block flushed to an unregistered disk block"),
		};

		if let Some(page) = &in_flight {
			if page.timestamp != disk_timestamp {
				flush(&mut in_flight, &pending_toc_tx);
			}
		}

		for entry in mb.toc_entries() {
			let key = Key::new(entry.a, entry.b);
			shared.index.set(disk_id, disk_offset + entry.data_offset, &key, entry.seq);

			if let Some(page) = &in_flight {
				if !toc_writer::has_capacity_for_entry(page, shared.options.mem_toc_page_size) {
					flush(&mut in_flight, &pending_toc_tx);
				}
			}
			if in_flight.is_none() {
				let buf = free_toc_rx.recv().expect("free toc pool closed while store running");
				in_flight = Some(toc_writer::open_page(buf.buf, disk_timestamp));
			}
			let page = in_flight.as_mut().unwrap();
			toc_writer::append_entry(page, disk_offset + entry.data_offset, entry.a, entry.b, entry.seq);
		}

		mb.reset();
		let _ = cleared_tx.send(mb_id);
	}

	flush(&mut in_flight, &pending_toc_tx);
}

fn flush(in_flight: &mut Option<TocPage>, pending_toc_tx: &flume::Sender<TocPage>) {
	if let Some(mut page) = in_flight.take() {
		toc_writer::finalize_page(&mut page);
		let _ = pending_toc_tx.send(page);
	}
}
