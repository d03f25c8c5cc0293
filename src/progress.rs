//! Progress lines per converted entry.

use std::io::{self, Write};

/// Writes one `"{percent:.1}% {name}"` line per converted entry.
pub struct Progress<W: Write> {
	out: W,
}

impl<W: Write> Progress<W> {
	/// Reports progress to `out`.
	pub fn new(out: W) -> Self {
		Self { out }
	}
	/// Reports entry `name` at zero-based `index` of `total` entries as converted.
	pub fn report(&mut self, index: usize, total: usize, name: &str) -> io::Result<()> {
		let percent = 100.0 * (index + 1) as f64 / total.max(1) as f64;
		writeln!(self.out, "{percent:.1}% {name}")?;
		self.out.flush()
	}
	/// Returns the underlying sink.
	pub fn into_inner(self) -> W {
		self.out
	}
}
