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

//! The disk block: one append-only `.values` file plus a fixed pool of
//! four reader threads for random GETs (§3 "Disk block", §4.6).
//!
//! The writer side is owned by the disk-writer worker, which is the
//! only thread that ever calls [`DiskBlock::append`]/[`finalize`], so
//! the mutex around it is for the type's internal consistency rather
//! than contended access. The reader side fans a GET out to one of
//! four private file handles by key, matching "4 reader tasks per disk
//! block" in §5.

use std::fs::{File, OpenOptions};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::framing::{self, ChecksumWriter};
use crate::key::BlockId;
use crate::request::ReadValue;

const READER_COUNT: usize = 4;
const VALUES_HEADER_TAG: &str = "BRIMSTORE VALUES v0";

struct ReaderThread {
	tx: flume::Sender<ReadValue>,
	handle: Option<std::thread::JoinHandle<()>>,
}

pub struct DiskBlock {
	pub id: BlockId,
	timestamp_ns: i64,
	checksum_interval: u32,
	writer: Mutex<ChecksumWriter<File>>,
	readers: Vec<ReaderThread>,
}

impl DiskBlock {
	/// Creates `path`, writes the 32-byte header, and spawns the
	/// reader pool on independent read handles to the same file (§4.3
	/// step 2).
	pub fn create(id: BlockId, path: &Path, timestamp_ns: i64, checksum_interval: u32) -> Result<DiskBlock> {
		let file = OpenOptions::new().create(true).write(true).truncate(true).read(true).open(path)?;
		let mut writer = ChecksumWriter::new(file, checksum_interval);
		writer.write_all(&framing::header(VALUES_HEADER_TAG))?;

		let mut readers = Vec::with_capacity(READER_COUNT);
		for shard in 0..READER_COUNT {
			let reader_file = File::open(path)?;
			let (tx, rx) = flume::unbounded::<ReadValue>();
			let interval = checksum_interval;
			let handle = std::thread::Builder::new()
				.name(format!("brimstore-disk-reader-{}-{}", id, shard))
				.spawn(move || reader_loop(reader_file, interval, rx))
				.map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
			readers.push(ReaderThread { tx, handle: Some(handle) });
		}

		log::debug!(target: "brimstore", "disk block {}: opened {:?}", id, path);
		Ok(DiskBlock { id, timestamp_ns, checksum_interval, writer: Mutex::new(writer), readers })
	}

	pub fn timestamp(&self) -> i64 {
		self.timestamp_ns
	}

	/// Appends `payload` (one memory block's entire data region) as a
	/// single write. Returns the logical offset the payload starts
	/// at — the value the clearer adds each entry's in-block offset to
	/// (§4.3 step 4).
	pub fn append(&self, payload: &[u8]) -> Result<u32> {
		let mut writer = self.writer.lock();
		let start = writer.logical_offset();
		writer.write_all(payload)?;
		Ok(start as u32)
	}

	pub fn logical_offset(&self) -> u64 {
		self.writer.lock().logical_offset()
	}

	/// Writes the 16-byte terminator at the current logical offset.
	/// Called by the disk writer when rotating away from this block
	/// and on final shutdown (§4.3 step 1, §5 shutdown stage 2).
	pub fn finalize(&self) -> Result<()> {
		let mut writer = self.writer.lock();
		let term = framing::terminator(writer.logical_offset());
		writer.write_all(&term)?;
		writer.flush()?;
		Ok(())
	}

	/// Dispatches `req` to the reader thread selected by
	/// `(A >> 1) mod 4` (§4.6). Consumes `req`; the reader thread
	/// signals its completion channel.
	pub fn dispatch_get(&self, offset: u32, mut req: ReadValue) {
		req.offset = offset;
		let shard = ((req.key.a >> 1) as usize) % self.readers.len();
		if let Err(flume::SendError(req)) = self.readers[shard].tx.send(req) {
			req.complete(Err(Error::Io(std::io::Error::new(
				std::io::ErrorKind::BrokenPipe,
				"disk block reader thread is gone",
			))));
		}
	}
}

impl Drop for DiskBlock {
	fn drop(&mut self) {
		for reader in &mut self.readers {
			drop(reader.tx.clone());
		}
		for reader in &mut self.readers {
			if let Some(handle) = reader.handle.take() {
				let _ = handle.join();
			}
		}
	}
}

fn reader_loop(file: File, interval: u32, rx: flume::Receiver<ReadValue>) {
	while let Ok(mut req) = rx.recv() {
		let result = read_value(&file, interval, req.offset, &mut req.value);
		req.complete(result);
	}
}

fn read_value(file: &File, interval: u32, offset: u32, out: &mut Vec<u8>) -> Result<()> {
	let mut len_buf = [0u8; 4];
	framing::read_at_logical(file, interval, offset as u64, &mut len_buf)?;
	let len = u32::from_le_bytes(len_buf) as usize;
	out.clear();
	out.resize(len, 0);
	framing::read_at_logical(file, interval, offset as u64 + 4, out)?;
	Ok(())
}

/// Convenience for callers (the disk writer) that need a fresh
/// timestamp-named path inside the store's directory.
pub fn values_path(dir: &Path, timestamp_ns: i64) -> std::path::PathBuf {
	dir.join(format!("{}.values", timestamp_ns))
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::key::Key;

	fn temp_dir(tag: &str) -> std::path::PathBuf {
		let dir = std::env::temp_dir().join(format!("brimstore-disk-block-test-{}-{}", tag, std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		dir
	}

	#[test]
	fn append_returns_pre_write_logical_offset() {
		let dir = temp_dir("append");
		let path = values_path(&dir, 1);
		let block = DiskBlock::create(1, &path, 1, 65532).unwrap();
		assert_eq!(block.logical_offset(), 32);
		let off1 = block.append(b"\x05\x00\x00\x00hello").unwrap();
		assert_eq!(off1, 32);
		let off2 = block.append(b"\x03\x00\x00\x00abc").unwrap();
		assert_eq!(off2, 32 + 9);
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn get_round_trips_through_reader_thread() {
		let dir = temp_dir("get");
		let path = values_path(&dir, 2);
		let block = DiskBlock::create(2, &path, 2, 65532).unwrap();
		let off = block.append(b"\x05\x00\x00\x00world").unwrap();
		block.finalize().unwrap();

		let (mut req, rx) = ReadValue::with_channel(Key::new(7, 8), 16);
		req.seq = 42;
		block.dispatch_get(off, req);
		let completed = rx.recv().unwrap().unwrap();
		assert_eq!(completed.value, b"world");
		assert_eq!(completed.seq, 42);
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn get_on_unknown_offset_reports_error_not_panic() {
		let dir = temp_dir("get-err");
		let path = values_path(&dir, 3);
		let block = DiskBlock::create(3, &path, 3, 65532).unwrap();
		block.append(b"\x02\x00\x00\x00hi").unwrap();
		block.finalize().unwrap();

		let (req, rx) = ReadValue::with_channel(Key::new(1, 1), 16);
		block.dispatch_get(9999, req);
		assert!(rx.recv().unwrap().is_err());
		std::fs::remove_dir_all(&dir).ok();
	}
}
