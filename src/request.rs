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

//! Request objects carried through the pipeline (§6).
//!
//! Each carries its own single-slot completion channel: `put`/`get`
//! enqueue and return immediately, the caller learns the outcome by
//! waiting on the paired receiver.

use crate::error::Result;
use crate::key::Key;

pub struct WriteValue {
	pub key: Key,
	pub value: Vec<u8>,
	pub seq: u64,
	written_tx: flume::Sender<Result<()>>,
}

impl WriteValue {
	pub fn new(key: Key, seq: u64, value: Vec<u8>) -> (WriteValue, flume::Receiver<Result<()>>) {
		let (written_tx, rx) = flume::bounded(1);
		(WriteValue { key, value, seq, written_tx }, rx)
	}

	pub(crate) fn complete(self, result: Result<()>) {
		let _ = self.written_tx.send(result);
	}
}

pub struct ReadValue {
	pub key: Key,
	/// Pre-allocated output buffer; overwritten (not appended to) by
	/// each read, truncated to the actual value length.
	pub value: Vec<u8>,
	/// Populated by a successful read.
	pub seq: u64,
	/// The location offset to read from. Set by the GET path once the
	/// index lookup resolves; carried alongside the request when it's
	/// handed off to a disk block's reader pool (§6 "internal").
	pub(crate) offset: u32,
	/// On success the completed request (with `value`/`seq` filled
	/// in) is sent back whole, since a disk read populates it from a
	/// different thread than the one holding the receiver.
	read_tx: Option<flume::Sender<Result<ReadValue>>>,
}

impl ReadValue {
	/// Standalone constructor for internal/unit-test use — no
	/// completion channel is attached, so `complete` is a no-op.
	pub fn new(key: Key, max_value_size: usize) -> ReadValue {
		ReadValue { key, value: Vec::with_capacity(max_value_size), seq: 0, offset: 0, read_tx: None }
	}

	/// The constructor `Store::get` actually uses: returns the request
	/// paired with the receiver the caller waits on.
	pub fn with_channel(key: Key, max_value_size: usize) -> (ReadValue, flume::Receiver<Result<ReadValue>>) {
		let (read_tx, rx) = flume::bounded(1);
		(ReadValue { key, value: Vec::with_capacity(max_value_size), seq: 0, offset: 0, read_tx: Some(read_tx) }, rx)
	}

	/// Signals exactly once — the reader-side fix for spec.md §9 Open
	/// Question 3 (the Go source could signal twice on the I/O-error
	/// path). Consuming `self` makes a second call impossible; on
	/// success the receiver gets `self` back populated, on failure
	/// just the error.
	pub(crate) fn complete(mut self, result: Result<()>) {
		if let Some(tx) = self.read_tx.take() {
			let outcome = match result {
				Ok(()) => Ok(self),
				Err(e) => Err(e),
			};
			let _ = tx.send(outcome);
		}
	}
}
