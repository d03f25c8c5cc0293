//! Enumeration and extraction of ZIP archive entries.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use log::debug;
use zip::{ZipArchive, result::ZipError};

use crate::{Error, Result};

/// File type bits of a Unix mode.
const S_IFMT: u32 = 0o170_000;
/// File type of regular files.
const S_IFREG: u32 = 0o100_000;

/// Entry of a ZIP archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
	/// Path of the entry inside the archive.
	pub name: String,
	/// Whether the entry is a regular file.
	///
	/// Directories and entries whose Unix mode marks another file type like a symbolic link are
	/// not. Entries without file type bits count as regular files unless they are directories.
	pub is_file: bool,
	/// Uncompressed size in bytes.
	pub size: u64,
}

impl ArchiveEntry {
	/// Whether the entry is a regular file with a case-sensitive `.csv` extension.
	pub fn is_csv(&self) -> bool {
		self.is_file && self.name.ends_with(".csv")
	}
}

/// ZIP archive read entry by entry.
pub struct Archive<R: Read + Seek> {
	path: PathBuf,
	zip: ZipArchive<R>,
}

impl Archive<BufReader<File>> {
	/// Opens the ZIP archive at `path`.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		File::open(path)
			.map_err(ZipError::from)
			.and_then(|file| Self::new(BufReader::new(file), path))
			.map_err(|source| Error::ArchiveOpen {
				path: path.to_path_buf(),
				source,
			})
	}
}

impl<R: Read + Seek> Archive<R> {
	/// Reads the central directory of the ZIP archive in `reader` labelled by `path`.
	pub fn new<P: Into<PathBuf>>(reader: R, path: P) -> std::result::Result<Self, ZipError> {
		let path = path.into();
		let zip = ZipArchive::new(reader)?;
		debug!(
			"{:?}: indexing {} file{}",
			path,
			zip.len(),
			if zip.len() == 1 { "" } else { "s" }
		);
		Ok(Self { path, zip })
	}
	/// Path the archive was opened from.
	pub fn path(&self) -> &Path {
		&self.path
	}
	/// All entries in central directory order.
	pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
		(0..self.zip.len())
			.map(|index| {
				let file = self.zip.by_index_raw(index).map_err(|source| Error::ArchiveRead {
					path: self.path.clone(),
					entry: format!("file[{index}]"),
					source: source.into(),
				})?;
				let is_dir = file.is_dir();
				let is_file = !is_dir
					&& match file.unix_mode().map(|mode| mode & S_IFMT) {
						Some(0) | None => true,
						Some(kind) => kind == S_IFREG,
					};
				Ok(ArchiveEntry {
					name: file.name().to_string(),
					is_file,
					size: file.size(),
				})
			})
			.collect()
	}
	/// Names of the regular `.csv` files in central directory order.
	pub fn csv_entries(&mut self) -> Result<Vec<String>> {
		let entries = self.entries()?;
		let mut size = 0;
		let names = entries
			.into_iter()
			.filter(ArchiveEntry::is_csv)
			.map(|entry| {
				size += entry.size;
				entry.name
			})
			.collect::<Vec<_>>();
		debug!(
			"{:?}: selecting {} CSV file(s) of {} bytes",
			self.path,
			names.len(),
			size
		);
		Ok(names)
	}
	/// Reads the uncompressed content of entry `name`.
	pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
		let read = |source: io::Error| Error::ArchiveRead {
			path: self.path.clone(),
			entry: name.to_string(),
			source,
		};
		let mut file = self.zip.by_name(name).map_err(|err| read(err.into()))?;
		let mut bytes = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
		file.read_to_end(&mut bytes).map_err(read)?;
		Ok(bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{Cursor, Write};
	use zip::{ZipWriter, write::SimpleFileOptions};

	fn archive(files: &[(&str, &str)]) -> Archive<Cursor<Vec<u8>>> {
		let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
		let options = SimpleFileOptions::default();
		for (name, content) in files {
			if name.ends_with('/') {
				zip.add_directory(*name, options).unwrap();
			} else {
				zip.start_file(*name, options).unwrap();
				zip.write_all(content.as_bytes()).unwrap();
			}
		}
		Archive::new(zip.finish().unwrap(), "memory.zip").unwrap()
	}

	#[test]
	fn selects_regular_csv_files() {
		let mut zip = archive(&[
			("a.csv", "x\n1\n"),
			("b.txt", ""),
			("c.CSV", ""),
			("dir/", ""),
		]);
		assert_eq!(zip.csv_entries().unwrap(), ["a.csv"]);
		let entries = zip.entries().unwrap();
		assert_eq!(entries.len(), 4);
		assert_eq!(entries[0].size, 4);
		assert!(!entries[3].is_file);
	}

	#[test]
	fn skips_symbolic_links() {
		let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
		let options = SimpleFileOptions::default();
		zip.start_file("a.csv", options).unwrap();
		zip.add_symlink("b.csv", "a.csv", options).unwrap();
		let mut zip = Archive::new(zip.finish().unwrap(), "memory.zip").unwrap();
		assert_eq!(zip.csv_entries().unwrap(), ["a.csv"]);
	}

	#[test]
	fn keeps_nested_names_in_order() {
		let mut zip = archive(&[("z/b.csv", ""), ("a.csv", ""), ("z/a.csv", "")]);
		assert_eq!(zip.csv_entries().unwrap(), ["z/b.csv", "a.csv", "z/a.csv"]);
	}

	#[test]
	fn reads_entry_content() {
		let mut zip = archive(&[("x.csv", "a,b\n1.0,2.0\n")]);
		assert_eq!(zip.read("x.csv").unwrap(), b"a,b\n1.0,2.0\n");
		assert!(matches!(
			zip.read("missing.csv"),
			Err(Error::ArchiveRead { entry, .. }) if entry == "missing.csv"
		));
	}

	#[test]
	fn rejects_missing_and_invalid_archives() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("none.zip");
		assert!(matches!(Archive::open(&path), Err(Error::ArchiveOpen { .. })));
		std::fs::write(&path, "no zip").unwrap();
		assert!(matches!(Archive::open(&path), Err(Error::ArchiveOpen { .. })));
	}
}
