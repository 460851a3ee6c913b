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

//! `brimstore`: an embedded, append-only, log-structured key-value
//! storage engine.
//!
//! Keys are 128-bit hashes carried as two `u64` halves plus a
//! caller-supplied 64-bit sequence number; values are opaque byte
//! blobs up to [`Options::max_value_size`]. Writes are buffered in
//! memory, flushed to append-only `.values` files, and indexed both
//! in memory (for `get`) and on disk (`.toc` files, for external
//! recovery tooling this crate doesn't itself implement).
//!
//! ```no_run
//! use brimstore::{Options, Store, WriteValue, ReadValue};
//!
//! let opts = Options::from_env(Options::with_path("./data".into()));
//! let mut store = Store::new(opts).unwrap();
//! store.start();
//!
//! let (wv, done) = WriteValue::new(brimstore::Key::new(1, 2), 10, b"hello".to_vec());
//! store.put(wv);
//! done.recv().unwrap().unwrap();
//!
//! let (rv, done) = ReadValue::with_channel(brimstore::Key::new(1, 2), store.max_value_size());
//! store.get(rv);
//! let rv = done.recv().unwrap().unwrap();
//! assert_eq!(rv.value, b"hello");
//!
//! store.stop();
//! ```

mod block;
mod disk_block;
mod display;
mod error;
mod framing;
mod index;
mod key;
mod mem_block;
mod options;
mod pipeline;
mod registry;
mod request;
mod store;

pub use error::{Error, Result};
pub use key::Key;
pub use options::Options;
pub use request::{ReadValue, WriteValue};
pub use store::{Stats, Store};
