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

//! TOC page encoding (shared with the memory clearer) and the single
//! TOC-writer worker (§4.4 page layout, §4.5).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::framing::{self, ChecksumWriter};
use crate::mem_block::TOC_ENTRY_SIZE;
use crate::store::Shared;

/// `u32 pageByteLength-4, u64 timestamp` reserved up front; entries are
/// appended after (§4.4).
pub const PAGE_HEADER_LEN: usize = 4 + 8;
const TOC_HEADER_TAG: &str = "BRIMSTORE TOC v0";

/// A TOC page buffer cycling through the free pool. Carries its own
/// timestamp so the clearer and the TOC writer agree on which disk
/// block it belongs to without re-parsing the header on every check.
pub struct TocPage {
	pub buf: Vec<u8>,
	pub timestamp: i64,
}

/// Allocates a fresh page, already carrying its 12-byte header (length
/// field zeroed, patched in on `finalize`) — §4.4 step 2d.
pub fn open_page(mut buf: Vec<u8>, timestamp: i64) -> TocPage {
	buf.clear();
	buf.extend_from_slice(&0u32.to_le_bytes());
	buf.extend_from_slice(&(timestamp as u64).to_le_bytes());
	TocPage { buf, timestamp }
}

pub fn has_capacity_for_entry(page: &TocPage, capacity: usize) -> bool {
	page.buf.len() + TOC_ENTRY_SIZE <= capacity
}

pub fn append_entry(page: &mut TocPage, disk_offset: u32, a: u64, b: u64, seq: u64) {
	page.buf.extend_from_slice(&disk_offset.to_le_bytes());
	page.buf.extend_from_slice(&a.to_le_bytes());
	page.buf.extend_from_slice(&b.to_le_bytes());
	page.buf.extend_from_slice(&seq.to_le_bytes());
}

/// Patches the length prefix now that the page's final size is known.
pub fn finalize_page(page: &mut TocPage) {
	let len = (page.buf.len() - 4) as u32;
	page.buf[0..4].copy_from_slice(&len.to_le_bytes());
}

pub fn toc_path(dir: &Path, timestamp_ns: i64) -> PathBuf {
	dir.join(format!("{}.toc", timestamp_ns))
}

struct OpenFile {
	timestamp: i64,
	writer: ChecksumWriter<File>,
}

fn open_new(dir: &Path, timestamp: i64, checksum_interval: u32) -> std::io::Result<OpenFile> {
	let path = toc_path(dir, timestamp);
	let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
	let mut writer = ChecksumWriter::new(file, checksum_interval);
	writer.write_all(&framing::header(TOC_HEADER_TAG))?;
	log::debug!(target: "brimstore", "toc writer: opened {:?}", path);
	Ok(OpenFile { timestamp, writer })
}

fn close(mut f: OpenFile) -> std::io::Result<()> {
	let term = framing::terminator(f.writer.logical_offset());
	f.writer.write_all(&term)?;
	f.writer.flush()
}

/// The single TOC-writer worker loop (§4.5). Keeps at most two open
/// files — `a` the newest, `b` the previous — so a page for a
/// just-retired timestamp can still land in the right file if it
/// arrives slightly out of order relative to the next rotation.
pub(crate) fn run(shared: &Shared, pending_toc_rx: flume::Receiver<TocPage>, free_toc_tx: flume::Sender<TocPage>) {
	let mut a: Option<OpenFile> = None;
	let mut b: Option<OpenFile> = None;

	while let Ok(page) = pending_toc_rx.recv() {
		if let Err(e) = handle_page(shared, &mut a, &mut b, &page) {
			log::error!(target: "brimstore", "toc writer: fatal io error: {}", e);
			shared.stats.record_fatal();
			break;
		}
		shared.stats.toc_pages_written.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
		let _ = free_toc_tx.send(TocPage { buf: page.buf, timestamp: 0 });
	}

	for f in [a, b] {
		if let Some(f) = f {
			if let Err(e) = close(f) {
				log::error!(target: "brimstore", "toc writer: fatal io error closing on shutdown: {}", e);
				shared.stats.record_fatal();
			}
		}
	}
}

fn handle_page(
	shared: &Shared,
	a: &mut Option<OpenFile>,
	b: &mut Option<OpenFile>,
	page: &TocPage,
) -> std::io::Result<()> {
	if let Some(f) = a.as_mut() {
		if f.timestamp == page.timestamp {
			return f.writer.write_all(&page.buf);
		}
	}
	if let Some(f) = b.as_mut() {
		if f.timestamp == page.timestamp {
			return f.writer.write_all(&page.buf);
		}
	}
	// New timestamp: retire `b`, shift a -> b, open a fresh `a`.
	if let Some(old_b) = b.take() {
		close(old_b)?;
	}
	*b = a.take();
	let mut fresh = open_new(&shared.dir, page.timestamp, shared.options.checksum_interval)?;
	fresh.writer.write_all(&page.buf)?;
	*a = Some(fresh);
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn page_round_trips_header_and_entries() {
		let mut page = open_page(Vec::with_capacity(256), 1234);
		append_entry(&mut page, 10, 1, 2, 3);
		append_entry(&mut page, 20, 4, 5, 6);
		finalize_page(&mut page);

		assert_eq!(page.buf.len(), PAGE_HEADER_LEN + 2 * TOC_ENTRY_SIZE);
		let len_field = u32::from_le_bytes(page.buf[0..4].try_into().unwrap());
		assert_eq!(len_field as usize, page.buf.len() - 4);
		let ts = u64::from_le_bytes(page.buf[4..12].try_into().unwrap());
		assert_eq!(ts, 1234);
	}

	#[test]
	fn capacity_check_respects_configured_page_size() {
		let page = open_page(Vec::with_capacity(PAGE_HEADER_LEN + TOC_ENTRY_SIZE), 1);
		assert!(has_capacity_for_entry(&page, PAGE_HEADER_LEN + TOC_ENTRY_SIZE));
		let mut page = page;
		append_entry(&mut page, 1, 1, 1, 1);
		assert!(!has_capacity_for_entry(&page, PAGE_HEADER_LEN + TOC_ENTRY_SIZE));
	}
}
