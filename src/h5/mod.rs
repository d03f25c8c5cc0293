//! HDF5 output container holding two-dimensional `f64` datasets.
//!
//! A [`Container`] is opened once, collects datasets addressed by `/`-separated paths and writes
//! the complete file when closed. Datasets are stored chunked and deflate-compressed at
//! [`GZIP_LEVEL`] with the chunk shape chosen by [`guess_chunk`]. Values are always stored as
//! little-endian IEEE 754 doubles.
//!
//! Reopening a file loads its groups and datasets back, so successive runs append to the same
//! container and replace datasets of the same path. Deflated chunks are kept as stored. Only the
//! subset of HDF5 written here is read back, that is a version 2 or 3 superblock, version 2 object
//! headers, compact groups of hard links and two-dimensional little-endian doubles stored
//! contiguously or chunked with a single chunk or fixed array index. Files holding anything else,
//! like attributes or soft links, are refused instead of being rewritten without it.

mod checksum;
mod chunk;
mod message;
mod reader;
mod writer;

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use ndarray::Array2;

pub use chunk::{CHUNK_BASE, CHUNK_MAX, CHUNK_MIN, guess_chunk};

/// Deflate effort applied to every dataset.
pub const GZIP_LEVEL: u32 = 7;

/// Errors of opening, modifying or writing a container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
	/// The container file cannot be opened, created or read.
	#[error("cannot open {path:?}")]
	Open {
		/// Path of the container file.
		path: PathBuf,
		/// Underlying I/O error.
		source: io::Error,
	},
	/// The container file cannot be written.
	#[error("cannot write {path:?}")]
	Save {
		/// Path of the container file.
		path: PathBuf,
		/// Underlying I/O error.
		source: io::Error,
	},
	/// A dataset path is empty or has `.` or `..` components.
	#[error("invalid dataset path {0:?}")]
	InvalidPath(String),
	/// A group is required where a dataset exists.
	#[error("{component:?} of {path:?} is a dataset, not a group")]
	NotAGroup {
		/// Dataset path being written.
		path: String,
		/// Component naming the existing dataset.
		component: String,
	},
	/// A dataset is required where a group exists.
	#[error("{0:?} is a group, not a dataset")]
	NotADataset(String),
	/// No dataset exists at the path.
	#[error("no dataset {0:?}")]
	NotFound(String),
	/// Chunks cannot be compressed or decompressed.
	#[error("cannot deflate chunks of {path:?}")]
	Deflate {
		/// Dataset path.
		path: String,
		/// Underlying I/O error.
		source: io::Error,
	},
	/// The existing file is not a well-formed container.
	#[error("malformed container: {0}")]
	Malformed(String),
	/// The existing file uses HDF5 features this container does not read.
	#[error("unsupported container feature: {0}")]
	Unsupported(String),
}

/// Result of container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[derive(Debug, Default)]
struct Group {
	links: IndexMap<String, Node>,
}

#[derive(Debug)]
enum Node {
	Group(Group),
	Dataset(Dataset),
}

#[derive(Debug)]
struct Dataset {
	shape: [usize; 2],
	storage: Storage,
}

#[derive(Debug)]
enum Storage {
	/// Datasets without elements cannot be chunked.
	Empty,
	Chunked {
		chunk: [usize; 2],
		level: u32,
		/// Deflated chunks in row-major chunk order.
		chunks: Vec<Vec<u8>>,
	},
}

impl Dataset {
	fn encode(table: &Array2<f64>, level: u32) -> io::Result<Self> {
		let (rows, cols) = table.dim();
		let storage = if rows == 0 || cols == 0 {
			Storage::Empty
		} else {
			let chunk = guess_chunk([rows, cols], chunk::ELEMENT_SIZE);
			let chunks = chunk::split(table, chunk)
				.iter()
				.map(|raw| chunk::deflate(raw, level))
				.collect::<io::Result<_>>()?;
			Storage::Chunked {
				chunk,
				level,
				chunks,
			}
		};
		Ok(Self {
			shape: [rows, cols],
			storage,
		})
	}
	fn decode(&self) -> io::Result<Array2<f64>> {
		match &self.storage {
			Storage::Empty => Ok(Array2::zeros((self.shape[0], self.shape[1]))),
			Storage::Chunked { chunk, chunks, .. } => {
				let expected = chunk[0] * chunk[1] * chunk::ELEMENT_SIZE;
				let raw = chunks
					.iter()
					.map(|bytes| chunk::inflate(bytes, expected).map(Some))
					.collect::<io::Result<Vec<_>>>()?;
				chunk::assemble(self.shape, *chunk, raw)
					.map_err(|reason| io::Error::new(io::ErrorKind::InvalidData, reason))
			}
		}
	}
}

/// Splits a dataset path into its group and dataset names.
fn components(path: &str) -> Result<Vec<&str>> {
	let parts = path
		.split('/')
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>();
	if parts.is_empty() || parts.iter().any(|part| matches!(*part, "." | "..")) {
		return Err(ContainerError::InvalidPath(path.to_string()));
	}
	Ok(parts)
}

/// HDF5 file collecting two-dimensional `f64` datasets.
#[derive(Debug)]
pub struct Container {
	path: PathBuf,
	file: File,
	root: Group,
}

impl Container {
	/// Opens the container at `path` for appending, creating it when missing.
	///
	/// Groups and datasets of an existing container are loaded. An empty file counts as a new
	/// container.
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref().to_path_buf();
		let open = |source| ContainerError::Open {
			path: path.clone(),
			source,
		};
		let mut file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(&path)
			.map_err(open)?;
		let mut bytes = Vec::new();
		file.read_to_end(&mut bytes).map_err(open)?;
		let root = if bytes.is_empty() {
			debug!("{:?}: creating container", path);
			Group::default()
		} else {
			reader::read(&bytes)?
		};
		let container = Self { path, file, root };
		if !bytes.is_empty() {
			debug!(
				"{:?}: loading {} existing dataset(s)",
				container.path,
				container.len()
			);
		}
		Ok(container)
	}
	/// Path of the container file.
	pub fn path(&self) -> &Path {
		&self.path
	}
	/// Creates or replaces the dataset at `path` with the values of `table`.
	///
	/// Groups named by leading path components are created as needed.
	pub fn write_dataset(&mut self, path: &str, table: &Array2<f64>) -> Result<()> {
		let parts = components(path)?;
		let dataset = Dataset::encode(table, GZIP_LEVEL).map_err(|source| ContainerError::Deflate {
			path: path.to_string(),
			source,
		})?;
		debug!(
			"{:?}: storing {}x{} in {}",
			path,
			dataset.shape[0],
			dataset.shape[1],
			match &dataset.storage {
				Storage::Empty => "no chunks".to_string(),
				Storage::Chunked { chunk, chunks, .. } =>
					format!("{} chunk(s) of {}x{}", chunks.len(), chunk[0], chunk[1]),
			}
		);
		let Some((name, groups)) = parts.split_last() else {
			return Err(ContainerError::InvalidPath(path.to_string()));
		};
		let mut group = &mut self.root;
		for component in groups {
			let node = group
				.links
				.entry(component.to_string())
				.or_insert_with(|| Node::Group(Group::default()));
			group = match node {
				Node::Group(group) => group,
				Node::Dataset(_) => {
					return Err(ContainerError::NotAGroup {
						path: path.to_string(),
						component: component.to_string(),
					});
				}
			};
		}
		if let Some(Node::Group(_)) = group.links.get(*name) {
			return Err(ContainerError::NotADataset(path.to_string()));
		}
		group.links.insert(name.to_string(), Node::Dataset(dataset));
		Ok(())
	}
	fn find(&self, path: &str) -> Result<&Node> {
		let parts = components(path)?;
		let mut group = &self.root;
		let mut found = None;
		for (index, component) in parts.iter().enumerate() {
			match group.links.get(*component) {
				Some(Node::Group(next)) if index + 1 < parts.len() => group = next,
				Some(node) if index + 1 == parts.len() => found = Some(node),
				_ => break,
			}
		}
		found.ok_or_else(|| ContainerError::NotFound(path.to_string()))
	}
	/// Whether a dataset exists at `path`.
	pub fn contains(&self, path: &str) -> bool {
		matches!(self.find(path), Ok(Node::Dataset(_)))
	}
	/// Reads the dataset at `path`.
	pub fn read_dataset(&self, path: &str) -> Result<Array2<f64>> {
		match self.find(path)? {
			Node::Dataset(dataset) => dataset.decode().map_err(|source| ContainerError::Deflate {
				path: path.to_string(),
				source,
			}),
			Node::Group(_) => Err(ContainerError::NotADataset(path.to_string())),
		}
	}
	/// Paths of all datasets, depth-first in insertion order.
	pub fn dataset_names(&self) -> Vec<String> {
		fn visit(group: &Group, prefix: &str, names: &mut Vec<String>) {
			for (name, node) in &group.links {
				let path = if prefix.is_empty() {
					name.clone()
				} else {
					format!("{prefix}/{name}")
				};
				match node {
					Node::Group(group) => visit(group, &path, names),
					Node::Dataset(_) => names.push(path),
				}
			}
		}
		let mut names = Vec::new();
		visit(&self.root, "", &mut names);
		names
	}
	/// Number of datasets.
	pub fn len(&self) -> usize {
		self.dataset_names().len()
	}
	/// Whether the container holds no dataset.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
	/// Writes the container file and flushes it to disk.
	pub fn close(mut self) -> Result<()> {
		let save = |source| ContainerError::Save {
			path: self.path.clone(),
			source,
		};
		let eof = {
			let mut out = BufWriter::new(&mut self.file);
			let eof = writer::write(&mut out, &self.root).map_err(save)?;
			out.flush().map_err(save)?;
			eof
		};
		self.file.set_len(eof).map_err(save)?;
		self.file.sync_all().map_err(save)?;
		debug!("{:?}: wrote {} bytes", self.path, eof);
		Ok(())
	}
}
