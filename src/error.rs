//! Errors aborting a conversion.

use std::io;
use std::path::PathBuf;

use crate::{h5::ContainerError, table::DecodeError};

/// Errors aborting a conversion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// An archive argument is no valid glob pattern.
	#[error("Invalid glob pattern {pattern:?}")]
	Usage {
		/// Pattern as passed on the command line.
		pattern: String,
		/// Reason of rejection.
		source: glob::PatternError,
	},
	/// An archive is missing or no ZIP archive.
	#[error("Cannot open input ZIP archive {path:?}")]
	ArchiveOpen {
		/// Path of the archive.
		path: PathBuf,
		/// Underlying ZIP error.
		source: zip::result::ZipError,
	},
	/// An archive entry cannot be read or decompressed.
	#[error("Cannot read {entry:?} in input ZIP archive {path:?}")]
	ArchiveRead {
		/// Path of the archive.
		path: PathBuf,
		/// Name of the entry.
		entry: String,
		/// Underlying I/O error.
		source: io::Error,
	},
	/// A CSV entry is not uniformly numeric or not rectangular.
	#[error("Cannot decode {entry:?}")]
	Decode {
		/// Name of the CSV entry.
		entry: String,
		/// Reason of rejection.
		source: DecodeError,
	},
	/// The container cannot be opened, modified or written.
	#[error("Cannot write {path:?}")]
	Write {
		/// Path of the container or of the dataset.
		path: String,
		/// Underlying container error.
		source: ContainerError,
	},
}

impl Error {
	/// Process exit code reporting this error.
	pub fn exit_code(&self) -> u8 {
		match self {
			Self::Usage { .. }
			| Self::ArchiveOpen { .. }
			| Self::ArchiveRead { .. }
			| Self::Decode { .. }
			| Self::Write { .. } => 2,
		}
	}
}

/// Result of conversion steps.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_error_exits_with_two() {
		let usage = Error::Usage {
			pattern: "[".into(),
			source: glob::Pattern::new("[").unwrap_err(),
		};
		let decode = Error::Decode {
			entry: "bad.csv".into(),
			source: DecodeError::Ragged {
				line: 3,
				expected: 2,
				found: 1,
			},
		};
		assert_eq!(usage.exit_code(), 2);
		assert_eq!(decode.exit_code(), 2);
		assert_eq!(decode.to_string(), "Cannot decode \"bad.csv\"");
	}
}
