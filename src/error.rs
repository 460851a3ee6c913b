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

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
	/// `get` on a key that has never been written, or whose only writes
	/// were rejected.
	KeyNotFound,
	/// `put` with a value longer than `Options::max_value_size`.
	ValueTooLarge { len: usize, max: usize },
	/// A file create/write/close error in the disk or TOC writer, or a
	/// read error in a disk-block reader.
	Io(io::Error),
	/// More than 65,536 location blocks were registered.
	Overflow,
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::KeyNotFound => write!(f, "key not found"),
			Error::ValueTooLarge { len, max } =>
				write!(f, "value length exceeds max ({} > {})", len, max),
			Error::Io(e) => write!(f, "io error: {}", e),
			Error::Overflow => write!(f, "block registry overflow"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(e)
	}
}
