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

//! `Store`: the crate's single public entry point (§6).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::key::Key;
use crate::options::Options;
use crate::pipeline::Pipeline;
use crate::registry::BlockRegistry;
use crate::request::{ReadValue, WriteValue};

/// State shared by every pipeline worker, wrapped once in an `Arc` at
/// `Store::open` and cloned per thread (§5 "Shared resources").
pub(crate) struct Shared {
	pub index: Index,
	pub registry: BlockRegistry,
	pub options: Options,
	pub stats: StatsInner,
	pub dir: PathBuf,
}

/// Hot-path counters, independent atomics with no ordering between
/// them — a supplemented, ambient feature (not in spec.md), grounded
/// in `parity-db`'s `Column::histogram` (SPEC_FULL.md §2).
pub(crate) struct StatsInner {
	pub puts: AtomicU64,
	pub gets: AtomicU64,
	pub key_not_found: AtomicU64,
	pub value_too_large: AtomicU64,
	pub bytes_written: AtomicU64,
	pub disk_blocks: AtomicU64,
	pub toc_pages_written: AtomicU64,
	fatal: AtomicBool,
}

impl StatsInner {
	fn new() -> StatsInner {
		StatsInner {
			puts: AtomicU64::new(0),
			gets: AtomicU64::new(0),
			key_not_found: AtomicU64::new(0),
			value_too_large: AtomicU64::new(0),
			bytes_written: AtomicU64::new(0),
			disk_blocks: AtomicU64::new(0),
			toc_pages_written: AtomicU64::new(0),
			fatal: AtomicBool::new(false),
		}
	}

	/// Marks the store as having hit a writer-side I/O error or a
	/// block-registry overflow — both fatal per spec.md §7. Recorded
	/// rather than aborting the process directly: an embedding binary
	/// decides what "fatal" means for itself (SPEC_FULL.md §7).
	pub fn record_fatal(&self) {
		self.fatal.store(true, Ordering::SeqCst);
	}

	pub fn is_fatal(&self) -> bool {
		self.fatal.load(Ordering::SeqCst)
	}

	fn snapshot(&self) -> Stats {
		Stats {
			puts: self.puts.load(Ordering::Relaxed),
			gets: self.gets.load(Ordering::Relaxed),
			key_not_found: self.key_not_found.load(Ordering::Relaxed),
			value_too_large: self.value_too_large.load(Ordering::Relaxed),
			bytes_written: self.bytes_written.load(Ordering::Relaxed),
			disk_blocks: self.disk_blocks.load(Ordering::Relaxed),
			toc_pages_written: self.toc_pages_written.load(Ordering::Relaxed),
			fatal: self.is_fatal(),
		}
	}
}

/// A point-in-time snapshot returned by [`Store::stats`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
	pub puts: u64,
	pub gets: u64,
	pub key_not_found: u64,
	pub value_too_large: u64,
	pub bytes_written: u64,
	pub disk_blocks: u64,
	pub toc_pages_written: u64,
	/// Set once a writer thread has hit an unrecoverable I/O error or
	/// the block registry has overflowed. The pipeline does not stop
	/// itself on this — the embedder decides whether/when to call
	/// [`Store::stop`].
	pub fatal: bool,
}

/// The embedded key-value store (§6 "Programmatic surface").
pub struct Store {
	shared: Arc<Shared>,
	pipeline: Option<Pipeline>,
}

impl Store {
	/// Validates `opts`, creates the working directory if needed, and
	/// constructs the store without starting its workers — mirroring
	/// the teacher's `new` / `start` split (`Options` built, nothing
	/// running yet).
	pub fn new(opts: Options) -> Result<Store> {
		let opts = opts.clamped();
		opts.validate()?;
		std::fs::create_dir_all(&opts.path)?;
		let dir = opts.path.clone();
		let shared = Arc::new(Shared {
			index: Index::new(opts.cores),
			registry: BlockRegistry::new(),
			options: opts,
			stats: StatsInner::new(),
			dir,
		});
		Ok(Store { shared, pipeline: None })
	}

	/// Spawns every worker thread and pre-creates the buffer pools
	/// (§5). A no-op if already started.
	pub fn start(&mut self) {
		if self.pipeline.is_none() {
			self.pipeline = Some(Pipeline::spawn(self.shared.clone()));
		}
	}

	/// Runs the five-stage shutdown (§5) and returns the total bytes
	/// written to value files over the store's lifetime.
	pub fn stop(&mut self) -> u64 {
		if let Some(pipeline) = self.pipeline.take() {
			pipeline.stop();
		}
		self.shared.stats.bytes_written.load(Ordering::Relaxed)
	}

	pub fn max_value_size(&self) -> usize {
		self.shared.options.max_value_size
	}

	/// Pre-allocates a [`ReadValue`] buffer sized to `max_value_size`.
	pub fn new_read_value(&self, key: Key) -> ReadValue {
		ReadValue::new(key, self.max_value_size())
	}

	/// Non-blocking enqueue (§6): routes to the memory-writer shard
	/// selected by `key.shard`, per §4.2.
	pub fn put(&self, wv: WriteValue) {
		let pipeline = self.pipeline.as_ref().expect("Store::start must be called before put");
		let shard = wv.key.shard(pipeline.shard_count());
		pipeline.put(shard, wv);
	}

	/// Resolves `req` against the index and dispatches to the owning
	/// block (§4.6). A memory-block hit completes inline; a disk-block
	/// hit is handed off to that block's reader pool and completes from
	/// another thread — either way `req`'s channel is signaled exactly
	/// once.
	///
	/// A memory-block hit can be stale: the clearer may redirect and
	/// reset the block between this index lookup and the block's own
	/// read. `Block::get` detects that under its read lock and hands
	/// `req` back instead of completing it; this loops and re-resolves
	/// from a fresh index lookup rather than risk reading recycled
	/// bytes (§5, §8 invariant 1).
	pub fn get(&self, mut req: ReadValue) {
		self.shared.stats.gets.fetch_add(1, Ordering::Relaxed);
		loop {
			let location = self.shared.index.get(&req.key);
			if !location.is_present() {
				self.shared.stats.key_not_found.fetch_add(1, Ordering::Relaxed);
				req.complete(Err(Error::KeyNotFound));
				return;
			}
			req.seq = location.seq;
			let key = req.key;
			let block = match self.shared.registry.get(location.block_id) {
				Some(block) => block,
				None => {
					req.complete(Err(Error::KeyNotFound));
					return;
				}
			};
			match block.get(location, &key, &self.shared.index, req) {
				None => return,
				Some(stale_req) => req = stale_req,
			}
		}
	}

	pub fn stats(&self) -> Stats {
		self.shared.stats.snapshot()
	}
}

impl Drop for Store {
	fn drop(&mut self) {
		if self.pipeline.is_some() {
			self.stop();
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn temp_store(tag: &str) -> (Store, PathBuf) {
		env_logger::try_init().ok();
		let dir = std::env::temp_dir().join(format!("brimstore-store-test-{}-{}", tag, std::process::id()));
		std::fs::remove_dir_all(&dir).ok();
		let mut opts = Options::with_path(dir.clone());
		opts.cores = 1;
		let mut store = Store::new(opts).unwrap();
		store.start();
		(store, dir)
	}

	fn put_and_wait(store: &Store, key: Key, seq: u64, value: &[u8]) -> Result<()> {
		let (wv, done) = WriteValue::new(key, seq, value.to_vec());
		store.put(wv);
		done.recv().unwrap()
	}

	fn get(store: &Store, key: Key) -> Result<ReadValue> {
		let (rv, done) = ReadValue::with_channel(key, store.max_value_size());
		store.get(rv);
		done.recv().unwrap()
	}

	#[test]
	fn scenario_1_put_then_get() {
		let (mut store, dir) = temp_store("scenario1");
		put_and_wait(&store, Key::new(1, 2), 10, &[0x61]).unwrap();
		let rv = get(&store, Key::new(1, 2)).unwrap();
		assert_eq!(rv.value, vec![0x61]);
		assert_eq!(rv.seq, 10);
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn scenario_2_lower_seq_after_does_not_override() {
		let (mut store, dir) = temp_store("scenario2");
		put_and_wait(&store, Key::new(1, 2), 10, &[0x61]).unwrap();
		put_and_wait(&store, Key::new(1, 2), 5, &[0x62]).unwrap();
		let rv = get(&store, Key::new(1, 2)).unwrap();
		assert_eq!(rv.value, vec![0x61]);
		assert_eq!(rv.seq, 10);
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn scenario_3_higher_seq_overrides() {
		let (mut store, dir) = temp_store("scenario3");
		put_and_wait(&store, Key::new(1, 2), 10, &[0x61]).unwrap();
		put_and_wait(&store, Key::new(1, 2), 20, &[0x62]).unwrap();
		let rv = get(&store, Key::new(1, 2)).unwrap();
		assert_eq!(rv.value, vec![0x62]);
		assert_eq!(rv.seq, 20);
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn scenario_4_unwritten_key_is_not_found() {
		let (mut store, dir) = temp_store("scenario4");
		let err = get(&store, Key::new(99, 99)).unwrap_err();
		assert!(matches!(err, Error::KeyNotFound));
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn scenario_5_oversized_value_rejected_and_key_stays_absent() {
		let (mut store, dir) = temp_store("scenario5");
		let oversized = vec![0u8; store.max_value_size() + 1];
		let err = put_and_wait(&store, Key::new(1, 2), 10, &oversized).unwrap_err();
		assert!(matches!(err, Error::ValueTooLarge { .. }));
		let err = get(&store, Key::new(1, 2)).unwrap_err();
		assert!(matches!(err, Error::KeyNotFound));
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn zero_length_value_round_trips() {
		let (mut store, dir) = temp_store("zero-len");
		put_and_wait(&store, Key::new(5, 6), 1, &[]).unwrap();
		let rv = get(&store, Key::new(5, 6)).unwrap();
		assert!(rv.value.is_empty());
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn max_value_size_round_trips_and_plus_one_rejected() {
		let (mut store, dir) = temp_store("max-value");
		let max = store.max_value_size();
		let exact = vec![0x42u8; max];
		put_and_wait(&store, Key::new(7, 8), 1, &exact).unwrap();
		let rv = get(&store, Key::new(7, 8)).unwrap();
		assert_eq!(rv.value.len(), max);

		let over = vec![0x42u8; max + 1];
		let err = put_and_wait(&store, Key::new(9, 10), 1, &over).unwrap_err();
		assert!(matches!(err, Error::ValueTooLarge { len, max: m } if len == max + 1 && m == max));
		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn many_small_values_force_rotation_all_round_trip() {
		let dir = std::env::temp_dir().join(format!("brimstore-store-test-rotation-{}", std::process::id()));
		std::fs::remove_dir_all(&dir).ok();
		let mut opts = Options::with_path(dir.clone());
		opts.cores = 1;
		opts.max_value_size = 64;
		opts.mem_toc_page_size = 4096;
		opts.mem_values_page_size = 4096;
		let mut store = Store::new(opts).unwrap();
		store.start();

		const N: u64 = 1000;
		for i in 0..N {
			put_and_wait(&store, Key::new(i, i), i, &[i as u8; 4]).unwrap();
		}
		for i in 0..N {
			let rv = get(&store, Key::new(i, i)).unwrap();
			assert_eq!(rv.value, vec![i as u8; 4]);
			assert_eq!(rv.seq, i);
		}

		let stats = store.stats();
		assert!(stats.disk_blocks >= 1);
		assert!(!stats.fatal);

		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn stop_is_idempotent_and_reports_bytes_written() {
		let (mut store, dir) = temp_store("stop-idempotent");
		put_and_wait(&store, Key::new(1, 1), 1, b"hello").unwrap();
		let first = store.stop();
		assert!(first > 0);
		let second = store.stop();
		assert_eq!(second, first);
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn stats_count_puts_and_gets() {
		let (mut store, dir) = temp_store("stats");
		put_and_wait(&store, Key::new(1, 1), 1, b"a").unwrap();
		put_and_wait(&store, Key::new(2, 2), 1, b"b").unwrap();
		let _ = get(&store, Key::new(1, 1)).unwrap();
		let _ = get(&store, Key::new(404, 404)); // miss

		let stats = store.stats();
		assert_eq!(stats.puts, 2);
		assert_eq!(stats.gets, 2);
		assert_eq!(stats.key_not_found, 1);

		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}

	fn random_value(size: usize) -> Vec<u8> {
		use rand::RngCore;
		let mut result = Vec::with_capacity(size);
		result.resize(size, 0);
		rand::thread_rng().fill_bytes(&mut result);
		result
	}

	#[test]
	fn random_puts_round_trip_and_unwritten_key_is_not_found() {
		use rand::Rng;

		let dir = std::env::temp_dir().join(format!("brimstore-store-test-random-{}", std::process::id()));
		std::fs::remove_dir_all(&dir).ok();
		let mut opts = Options::with_path(dir.clone());
		opts.cores = 4;
		opts.max_value_size = 256;
		opts.mem_toc_page_size = 4096;
		opts.mem_values_page_size = 4096;
		let mut store = Store::new(opts).unwrap();
		store.start();

		let mut rng = rand::thread_rng();
		let mut written = Vec::new();
		for i in 0..500u64 {
			let key = Key::new(i, i.wrapping_mul(0x9e3779b97f4a7c15));
			let len = rng.gen_range(0..=256);
			let value = random_value(len);
			put_and_wait(&store, key, i + 1, &value).unwrap();
			written.push((key, i + 1, value));
		}

		for (key, seq, value) in &written {
			let rv = get(&store, *key).unwrap();
			assert_eq!(&rv.value, value);
			assert_eq!(rv.seq, *seq);
		}

		let err = get(&store, Key::new(u64::MAX, u64::MAX)).unwrap_err();
		assert!(matches!(err, Error::KeyNotFound));

		store.stop();
		std::fs::remove_dir_all(&dir).ok();
	}
}
