//! Parsing of existing containers.
//!
//! A container is rewritten from what is read here, so anything the tree cannot hold is refused
//! rather than skipped: attributes, soft and external links, objects linked twice and header
//! messages outside the written subset.

use std::collections::HashSet;

use ndarray::Array2;

use super::checksum::lookup3;
use super::chunk::{self, ELEMENT_SIZE};
use super::message::{FILTER_DEFLATE, SIGNATURE, kind};
use super::{ContainerError, Dataset, GZIP_LEVEL, Group, Node, Result, Storage};

/// Messages kept when rewriting a group.
const GROUP_MESSAGES: [u8; 4] = [kind::NIL, kind::LINK_INFO, kind::GROUP_INFO, kind::LINK];
/// Messages kept when rewriting a dataset.
const DATASET_MESSAGES: [u8; 6] = [
	kind::NIL,
	kind::DATATYPE,
	kind::DATASPACE,
	kind::FILL_VALUE,
	kind::LAYOUT,
	kind::FILTER_PIPELINE,
];

fn malformed(reason: impl Into<String>) -> ContainerError {
	ContainerError::Malformed(reason.into())
}

fn unsupported(feature: impl Into<String>) -> ContainerError {
	ContainerError::Unsupported(feature.into())
}

struct Cursor<'a> {
	data: &'a [u8],
	position: usize,
}

impl<'a> Cursor<'a> {
	fn new(data: &'a [u8]) -> Self {
		Self { data, position: 0 }
	}
	/// Bytes read so far.
	fn consumed(&self) -> &'a [u8] {
		&self.data[..self.position]
	}
	fn remaining(&self) -> usize {
		self.data.len() - self.position
	}
	fn take(&mut self, len: usize) -> Result<&'a [u8]> {
		let end = self
			.position
			.checked_add(len)
			.filter(|&end| end <= self.data.len())
			.ok_or_else(|| malformed("truncated metadata"))?;
		let bytes = &self.data[self.position..end];
		self.position = end;
		Ok(bytes)
	}
	fn u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}
	fn u16(&mut self) -> Result<u16> {
		Ok(self.uint(2)? as u16)
	}
	fn u32(&mut self) -> Result<u32> {
		Ok(self.uint(4)? as u32)
	}
	fn uint(&mut self, width: usize) -> Result<u64> {
		if width > 8 {
			return Err(malformed(format!("{width}-byte integer")));
		}
		let mut value = [0u8; 8];
		value[..width].copy_from_slice(self.take(width)?);
		Ok(u64::from_le_bytes(value))
	}
	fn signature(&mut self, signature: &[u8]) -> Result<()> {
		if self.take(signature.len())? == signature {
			Ok(())
		} else {
			Err(malformed(format!(
				"missing {:?} signature",
				String::from_utf8_lossy(signature)
			)))
		}
	}
}

struct Message<'a> {
	kind: u8,
	data: &'a [u8],
}

fn find<'m, 'a>(messages: &'m [Message<'a>], kind: u8) -> Option<&'m Message<'a>> {
	messages.iter().find(|message| message.kind == kind)
}

/// Rejects messages outside `known`.
fn permit(path: &str, messages: &[Message<'_>], known: &[u8]) -> Result<()> {
	let Some(message) = messages.iter().find(|message| !known.contains(&message.kind)) else {
		return Ok(());
	};
	Err(unsupported(match message.kind {
		kind::ATTRIBUTE | kind::ATTRIBUTE_INFO => format!("attributes of {path:?}"),
		kind::SYMBOL_TABLE => format!("symbol table group {path:?}"),
		other => format!("message type {other:#04x} of {path:?}"),
	}))
}

struct Link {
	name: String,
	address: Option<u64>,
}

/// Filter of a pipeline with its client data.
struct Filter {
	id: u16,
	values: Vec<u32>,
}

enum Index {
	Contiguous(Option<u64>),
	Compact(Vec<u8>),
	Single {
		address: Option<u64>,
		filtered_size: Option<u64>,
		filter_mask: u32,
	},
	FixedArray(Option<u64>),
}

struct File<'a> {
	data: &'a [u8],
	base: u64,
	offset_size: usize,
	length_size: usize,
}

/// Reads the group tree of a container.
pub(super) fn read(data: &[u8]) -> Result<Group> {
	let (file, root) = File::open(data)?;
	let mut visited = HashSet::new();
	match file.read_object(root, "/", &mut visited)? {
		Node::Group(group) => Ok(group),
		Node::Dataset(_) => Err(malformed("root object is a dataset")),
	}
}

impl<'a> File<'a> {
	fn open(data: &'a [u8]) -> Result<(Self, u64)> {
		let start = std::iter::once(0)
			.chain((9..).map(|bits| 1usize << bits))
			.take_while(|&at| at + SIGNATURE.len() <= data.len())
			.find(|&at| data[at..at + SIGNATURE.len()] == SIGNATURE)
			.ok_or_else(|| malformed("no HDF5 signature"))?;
		let mut cursor = Cursor::new(&data[start..]);
		cursor.take(SIGNATURE.len())?;
		match cursor.u8()? {
			2 | 3 => {}
			version => return Err(unsupported(format!("superblock version {version}"))),
		}
		let offset_size = cursor.u8()? as usize;
		let length_size = cursor.u8()? as usize;
		if !matches!(offset_size, 2 | 4 | 8) || !matches!(length_size, 2 | 4 | 8) {
			return Err(malformed("invalid address or length size"));
		}
		cursor.u8()?;
		let mut file = Self {
			data,
			base: 0,
			offset_size,
			length_size,
		};
		file.base = cursor.uint(offset_size)?;
		let _extension = file.address(&mut cursor)?;
		let _eof = cursor.uint(offset_size)?;
		let root = file
			.address(&mut cursor)?
			.ok_or_else(|| malformed("undefined root group"))?;
		verify(&data[start..start + cursor.position], cursor.u32()?, "superblock")?;
		Ok((file, root))
	}
	/// Reads an address, `None` if undefined.
	fn address(&self, cursor: &mut Cursor<'_>) -> Result<Option<u64>> {
		let value = cursor.uint(self.offset_size)?;
		let undefined = u64::MAX >> (64 - 8 * self.offset_size);
		Ok((value != undefined).then_some(value))
	}
	fn length(&self, cursor: &mut Cursor<'_>) -> Result<u64> {
		cursor.uint(self.length_size)
	}
	fn at(&self, address: u64) -> Result<Cursor<'a>> {
		usize::try_from(self.base.saturating_add(address))
			.ok()
			.filter(|&at| at < self.data.len())
			.map(|at| Cursor::new(&self.data[at..]))
			.ok_or_else(|| malformed(format!("address {address:#x} beyond end of file")))
	}
	fn bytes(&self, address: u64, len: u64) -> Result<&'a [u8]> {
		let len = usize::try_from(len).map_err(|_| malformed("oversized block"))?;
		self.at(address)?.take(len)
	}
	fn object_header(&self, address: u64) -> Result<Vec<Message<'a>>> {
		let mut cursor = self.at(address)?;
		if cursor.data.first() == Some(&1) {
			return Err(unsupported("version 1 object headers"));
		}
		cursor.signature(b"OHDR")?;
		match cursor.u8()? {
			2 => {}
			version => return Err(unsupported(format!("object header version {version}"))),
		}
		let flags = cursor.u8()?;
		if flags & 0x20 != 0 {
			cursor.take(16)?;
		}
		if flags & 0x10 != 0 {
			cursor.take(4)?;
		}
		let size = cursor.uint(1 << (flags & 0x03))?;
		let size = usize::try_from(size).map_err(|_| malformed("oversized object header"))?;
		let area = cursor.take(size)?;
		verify(cursor.consumed(), cursor.u32()?, "object header")?;
		let order = flags & 0x04 != 0;
		let mut messages = Vec::new();
		let mut pending = Vec::new();
		self.messages(area, order, &mut messages, &mut pending)?;
		let mut next = 0;
		while let Some(&(address, len)) = pending.get(next) {
			next += 1;
			let block = self.bytes(address, len)?;
			if block.len() < 8 {
				return Err(malformed("short continuation block"));
			}
			let (body, checksum) = block.split_at(block.len() - 4);
			let mut cursor = Cursor::new(checksum);
			verify(body, cursor.u32()?, "continuation block")?;
			let mut cursor = Cursor::new(body);
			cursor.signature(b"OCHK")?;
			self.messages(&body[4..], order, &mut messages, &mut pending)?;
		}
		Ok(messages)
	}
	fn messages(
		&self,
		area: &'a [u8],
		order: bool,
		messages: &mut Vec<Message<'a>>,
		pending: &mut Vec<(u64, u64)>,
	) -> Result<()> {
		let prefix = if order { 6 } else { 4 };
		let mut cursor = Cursor::new(area);
		while cursor.remaining() >= prefix {
			let kind = cursor.u8()?;
			let size = cursor.u16()? as usize;
			let _flags = cursor.u8()?;
			if order {
				cursor.u16()?;
			}
			let data = cursor.take(size)?;
			if kind == kind::CONTINUATION {
				let mut continuation = Cursor::new(data);
				let address = self
					.address(&mut continuation)?
					.ok_or_else(|| malformed("undefined continuation block"))?;
				let len = self.length(&mut continuation)?;
				pending.push((address, len));
			} else {
				messages.push(Message { kind, data });
			}
		}
		Ok(())
	}
	/// Reads the object at `address`, which must not have been reached before.
	fn read_object(&self, address: u64, path: &str, visited: &mut HashSet<u64>) -> Result<Node> {
		if !visited.insert(address) {
			return Err(unsupported(format!("{path:?} links an object linked before")));
		}
		let messages = self.object_header(address)?;
		if find(&messages, kind::LAYOUT).is_some() {
			permit(path, &messages, &DATASET_MESSAGES)?;
			Ok(Node::Dataset(self.read_dataset(path, &messages)?))
		} else {
			permit(path, &messages, &GROUP_MESSAGES)?;
			Ok(Node::Group(self.read_group(path, &messages, visited)?))
		}
	}
	fn read_group(
		&self,
		path: &str,
		messages: &[Message<'a>],
		visited: &mut HashSet<u64>,
	) -> Result<Group> {
		if let Some(info) = find(messages, kind::LINK_INFO) {
			let mut cursor = Cursor::new(info.data);
			cursor.u8()?;
			if cursor.u8()? & 0x01 != 0 {
				cursor.take(8)?;
			}
			if self.address(&mut cursor)?.is_some() {
				return Err(unsupported(format!("dense link storage of {path:?}")));
			}
		}
		let mut group = Group::default();
		for message in messages.iter().filter(|message| message.kind == kind::LINK) {
			let link = self.link(message.data)?;
			let child = if path == "/" {
				link.name.clone()
			} else {
				format!("{path}/{}", link.name)
			};
			let Some(address) = link.address else {
				return Err(unsupported(format!("soft or external link {child:?}")));
			};
			let node = self.read_object(address, &child, visited)?;
			if group.links.insert(link.name, node).is_some() {
				return Err(malformed(format!("duplicate link {child:?}")));
			}
		}
		Ok(group)
	}
	fn link(&self, data: &[u8]) -> Result<Link> {
		let mut cursor = Cursor::new(data);
		if cursor.u8()? != 1 {
			return Err(unsupported("link message version"));
		}
		let flags = cursor.u8()?;
		let hard = if flags & 0x08 != 0 {
			cursor.u8()? == 0
		} else {
			true
		};
		if flags & 0x04 != 0 {
			cursor.take(8)?;
		}
		if flags & 0x10 != 0 {
			cursor.u8()?;
		}
		let len = cursor.uint(1 << (flags & 0x03))? as usize;
		let name = String::from_utf8_lossy(cursor.take(len)?).into_owned();
		let address = if hard {
			Some(
				self.address(&mut cursor)?
					.ok_or_else(|| malformed(format!("undefined link {name:?}")))?,
			)
		} else {
			None
		};
		Ok(Link { name, address })
	}
	fn read_dataset(&self, path: &str, messages: &[Message<'a>]) -> Result<Dataset> {
		let required = |kind, what: &str| {
			find(messages, kind).ok_or_else(|| malformed(format!("{path:?} has no {what}")))
		};
		check_datatype(path, required(kind::DATATYPE, "datatype")?.data)?;
		let shape = self.dataspace(path, required(kind::DATASPACE, "dataspace")?.data)?;
		let filters = match find(messages, kind::FILTER_PIPELINE) {
			Some(pipeline) => pipeline_filters(pipeline.data)?,
			None => Vec::new(),
		};
		let (deflate, level) = match filters.as_slice() {
			[] => (false, None),
			[filter] if filter.id == FILTER_DEFLATE => (true, filter.values.first().copied()),
			filters => {
				let ids = filters.iter().map(|filter| filter.id).collect::<Vec<_>>();
				return Err(unsupported(format!("filters {ids:?} of {path:?}")));
			}
		};
		let (chunk, index) = self.layout(path, required(kind::LAYOUT, "layout")?.data)?;
		if shape.contains(&0) {
			return Ok(Dataset {
				shape,
				storage: Storage::Empty,
			});
		}
		let [rows, cols] = chunk::grid(shape, chunk);
		let chunk_bytes = chunk[0] * chunk[1] * ELEMENT_SIZE;
		if let Some(level) = level {
			if let Some(chunks) = self.stored_chunks(&index, rows * cols, chunk_bytes as u64)? {
				return Ok(Dataset {
					shape,
					storage: Storage::Chunked {
						chunk,
						level,
						chunks,
					},
				});
			}
		}
		let table = self.read_table(path, shape, chunk, index, deflate)?;
		Dataset::encode(&table, GZIP_LEVEL).map_err(|source| ContainerError::Deflate {
			path: path.to_string(),
			source,
		})
	}
	/// Deflated chunks as stored, `None` unless every chunk is allocated and was deflated.
	fn stored_chunks(
		&self,
		index: &Index,
		count: usize,
		chunk_bytes: u64,
	) -> Result<Option<Vec<Vec<u8>>>> {
		let entries = match *index {
			Index::Single {
				address: Some(address),
				filtered_size: Some(size),
				filter_mask,
			} => vec![Some((address, size, filter_mask))],
			Index::FixedArray(Some(address)) => self.fixed_array(address, chunk_bytes)?,
			_ => return Ok(None),
		};
		if entries.len() != count {
			return Ok(None);
		}
		entries
			.into_iter()
			.map(|entry| match entry {
				Some((address, size, 0)) => Ok(Some(self.bytes(address, size)?.to_vec())),
				_ => Ok(None),
			})
			.collect()
	}
	fn read_table(
		&self,
		path: &str,
		shape: [usize; 2],
		chunk: [usize; 2],
		index: Index,
		deflate: bool,
	) -> Result<Array2<f64>> {
		let elements = shape[0]
			.checked_mul(shape[1])
			.and_then(|elements| elements.checked_mul(ELEMENT_SIZE))
			.ok_or_else(|| malformed(format!("{path:?} is oversized")))?;
		let contiguous = |raw: &[u8]| {
			if raw.len() != elements {
				return Err(malformed(format!("{path:?} holds {} bytes", raw.len())));
			}
			let values = raw
				.chunks_exact(ELEMENT_SIZE)
				.map(|value| f64::from_le_bytes([
					value[0], value[1], value[2], value[3], value[4], value[5], value[6], value[7],
				]))
				.collect();
			Array2::from_shape_vec((shape[0], shape[1]), values)
				.map_err(|err| malformed(format!("{path:?}: {err}")))
		};
		let chunk_bytes = chunk[0] * chunk[1] * ELEMENT_SIZE;
		let unfilter = |bytes: &[u8], mask: u32| {
			if deflate && mask & 0x01 == 0 {
				chunk::inflate(bytes, chunk_bytes).map_err(|source| ContainerError::Deflate {
					path: path.to_string(),
					source,
				})
			} else {
				Ok(bytes.to_vec())
			}
		};
		let chunks = match index {
			Index::Compact(raw) => return contiguous(&raw),
			Index::Contiguous(None) => return contiguous(&vec![0; elements]),
			Index::Contiguous(Some(address)) => {
				return contiguous(self.bytes(address, elements as u64)?);
			}
			Index::Single { address: None, .. } => vec![None],
			Index::Single {
				address: Some(address),
				filtered_size,
				filter_mask,
			} => {
				let size = filtered_size.unwrap_or(chunk_bytes as u64);
				vec![Some(unfilter(self.bytes(address, size)?, filter_mask)?)]
			}
			Index::FixedArray(None) => Vec::new(),
			Index::FixedArray(Some(address)) => self
				.fixed_array(address, chunk_bytes as u64)?
				.into_iter()
				.map(|entry| {
					entry
						.map(|(address, size, mask)| unfilter(self.bytes(address, size)?, mask))
						.transpose()
				})
				.collect::<Result<Vec<_>>>()?,
		};
		let [rows, cols] = chunk::grid(shape, chunk);
		if !chunks.is_empty() && chunks.len() != rows * cols {
			return Err(malformed(format!(
				"{path:?} indexes {} of {} chunks",
				chunks.len(),
				rows * cols
			)));
		}
		let chunks = if chunks.is_empty() {
			vec![None; rows * cols]
		} else {
			chunks
		};
		chunk::assemble(shape, chunk, chunks).map_err(|reason| malformed(format!("{path:?}: {reason}")))
	}
	fn dataspace(&self, path: &str, data: &[u8]) -> Result<[usize; 2]> {
		let mut cursor = Cursor::new(data);
		let version = cursor.u8()?;
		let rank = cursor.u8()?;
		let _flags = cursor.u8()?;
		match version {
			1 => {
				cursor.take(5)?;
			}
			2 => {
				if cursor.u8()? != 1 {
					return Err(unsupported(format!("scalar or null dataspace of {path:?}")));
				}
			}
			version => return Err(unsupported(format!("dataspace version {version}"))),
		}
		if rank != 2 {
			return Err(unsupported(format!("rank {rank} dataset {path:?}")));
		}
		let mut shape = [0; 2];
		for dim in &mut shape {
			*dim = usize::try_from(self.length(&mut cursor)?)
				.map_err(|_| malformed(format!("{path:?} is oversized")))?;
		}
		Ok(shape)
	}
	fn layout(&self, path: &str, data: &[u8]) -> Result<([usize; 2], Index)> {
		let mut cursor = Cursor::new(data);
		let version = cursor.u8()?;
		if !matches!(version, 3 | 4) {
			return Err(unsupported(format!("layout version {version} of {path:?}")));
		}
		match cursor.u8()? {
			0 => {
				let size = cursor.u16()? as usize;
				Ok(([1, 1], Index::Compact(cursor.take(size)?.to_vec())))
			}
			1 => {
				let address = self.address(&mut cursor)?;
				let _size = self.length(&mut cursor)?;
				Ok(([1, 1], Index::Contiguous(address)))
			}
			2 if version == 4 => {
				let flags = cursor.u8()?;
				if flags & 0x01 != 0 {
					return Err(unsupported(format!("unfiltered edge chunks of {path:?}")));
				}
				let rank = cursor.u8()?;
				let width = cursor.u8()? as usize;
				if rank != 3 {
					return Err(unsupported(format!("chunk rank of {path:?}")));
				}
				let mut dims = [0usize; 3];
				for dim in &mut dims {
					*dim = cursor.uint(width)? as usize;
				}
				if dims[2] != ELEMENT_SIZE || dims[0] == 0 || dims[1] == 0 {
					return Err(malformed(format!("chunk dimensions of {path:?}")));
				}
				let index = match cursor.u8()? {
					1 => {
						let (filtered_size, filter_mask) = if flags & 0x02 != 0 {
							(Some(self.length(&mut cursor)?), cursor.u32()?)
						} else {
							(None, 0)
						};
						Index::Single {
							address: self.address(&mut cursor)?,
							filtered_size,
							filter_mask,
						}
					}
					3 => {
						cursor.u8()?;
						Index::FixedArray(self.address(&mut cursor)?)
					}
					index => {
						return Err(unsupported(format!("chunk index type {index} of {path:?}")));
					}
				};
				Ok(([dims[0], dims[1]], index))
			}
			class => Err(unsupported(format!("layout class {class} version {version} of {path:?}"))),
		}
	}
	/// Reads `(address, size, filter mask)` per chunk, `None` for unallocated chunks.
	fn fixed_array(&self, address: u64, chunk_bytes: u64) -> Result<Vec<Option<(u64, u64, u32)>>> {
		let mut header = self.at(address)?;
		header.signature(b"FAHD")?;
		header.u8()?;
		let filtered = header.u8()? == chunk::FILTERED_CHUNKS;
		let entry_size = header.u8()? as usize;
		let page_bits = header.u8()?;
		let len = self.length(&mut header)?;
		let block = self.address(&mut header)?;
		verify(header.consumed(), header.u32()?, "fixed array header")?;
		if page_bits < 64 && len > 1 << page_bits {
			return Err(unsupported("paged fixed array"));
		}
		let Some(block) = block else {
			return Ok(Vec::new());
		};
		let len = usize::try_from(len).map_err(|_| malformed("oversized fixed array"))?;
		let size_width = entry_size
			.checked_sub(self.offset_size + if filtered { 4 } else { 0 })
			.ok_or_else(|| malformed("fixed array entry size"))?;
		let mut cursor = self.at(block)?;
		cursor.signature(b"FADB")?;
		cursor.take(2)?;
		self.address(&mut cursor)?;
		let mut entries = Vec::with_capacity(len.min(cursor.remaining() / entry_size.max(1)));
		for _ in 0..len {
			let address = self.address(&mut cursor)?;
			let (size, mask) = if filtered {
				(cursor.uint(size_width)?, cursor.u32()?)
			} else {
				(chunk_bytes, 0)
			};
			entries.push(address.map(|address| (address, size, mask)));
		}
		verify(cursor.consumed(), cursor.u32()?, "fixed array data block")?;
		Ok(entries)
	}
}

fn verify(bytes: &[u8], stored: u32, what: &str) -> Result<()> {
	if lookup3(bytes) == stored {
		Ok(())
	} else {
		Err(malformed(format!("{what} checksum mismatch")))
	}
}

fn check_datatype(path: &str, data: &[u8]) -> Result<()> {
	let mut cursor = Cursor::new(data);
	let class = cursor.u8()? & 0x0f;
	let order = cursor.u8()? & 0x01;
	cursor.take(2)?;
	let size = cursor.u32()?;
	if class == 1 && order == 0 && size == ELEMENT_SIZE as u32 {
		Ok(())
	} else {
		Err(unsupported(format!("non-f64 datatype of {path:?}")))
	}
}

/// Filters of a filter pipeline message in application order.
fn pipeline_filters(data: &[u8]) -> Result<Vec<Filter>> {
	let mut cursor = Cursor::new(data);
	let version = cursor.u8()?;
	let count = cursor.u8()?;
	if version == 1 {
		cursor.take(6)?;
	} else if version != 2 {
		return Err(unsupported(format!("filter pipeline version {version}")));
	}
	let mut filters = Vec::with_capacity(count as usize);
	for _ in 0..count {
		let id = cursor.u16()?;
		let name_len = if version == 1 || id >= 256 {
			cursor.u16()? as usize
		} else {
			0
		};
		let _flags = cursor.u16()?;
		let values_len = cursor.u16()? as usize;
		cursor.take(if version == 1 {
			name_len.next_multiple_of(8)
		} else {
			name_len
		})?;
		let values = (0..values_len)
			.map(|_| cursor.u32())
			.collect::<Result<Vec<_>>>()?;
		if version == 1 && values_len % 2 == 1 {
			cursor.take(4)?;
		}
		filters.push(Filter { id, values });
	}
	Ok(filters)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::h5::Container;
	use crate::h5::message::{self, Layout, ObjectHeader, SUPERBLOCK_SIZE};
	use tempfile::TempDir;

	fn written(build: impl FnOnce(&mut Container)) -> Vec<u8> {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("out.h5");
		let mut container = Container::open(&path).unwrap();
		build(&mut container);
		container.close().unwrap();
		std::fs::read(path).unwrap()
	}

	fn dataset_messages<'a>(file: &File<'a>, root: u64, name: &str) -> Vec<Message<'a>> {
		let messages = file.object_header(root).unwrap();
		let link = messages
			.iter()
			.filter(|message| message.kind == kind::LINK)
			.map(|message| file.link(message.data).unwrap())
			.find(|link| link.name == name)
			.unwrap();
		file.object_header(link.address.unwrap()).unwrap()
	}

	#[test]
	fn datasets_are_deflated_at_fixed_level() {
		let table = Array2::from_shape_fn((300, 300), |(r, c)| (r + c) as f64);
		let bytes = written(|c| c.write_dataset("big.csv", &table).unwrap());
		let (file, root) = File::open(&bytes).unwrap();
		let messages = dataset_messages(&file, root, "big.csv");
		let pipeline = find(&messages, kind::FILTER_PIPELINE).unwrap();
		let filters = pipeline_filters(pipeline.data).unwrap();
		assert_eq!(filters.len(), 1);
		assert_eq!(filters[0].id, FILTER_DEFLATE);
		assert_eq!(filters[0].values, [GZIP_LEVEL]);
		assert_eq!(&pipeline.data[pipeline.data.len() - 4..], &GZIP_LEVEL.to_le_bytes());
		let layout = find(&messages, kind::LAYOUT).unwrap();
		let (chunk, index) = file.layout("big.csv", layout.data).unwrap();
		assert_eq!(chunk, [38, 38]);
		assert!(matches!(index, Index::FixedArray(Some(_))));
	}

	#[test]
	fn small_datasets_use_single_chunk_index() {
		let table = Array2::from_elem((2, 2), 1.5);
		let bytes = written(|c| c.write_dataset("x.csv", &table).unwrap());
		let (file, root) = File::open(&bytes).unwrap();
		let messages = dataset_messages(&file, root, "x.csv");
		let layout = find(&messages, kind::LAYOUT).unwrap();
		let (chunk, index) = file.layout("x.csv", layout.data).unwrap();
		assert_eq!(chunk, [2, 2]);
		assert!(matches!(
			index,
			Index::Single { address: Some(_), filtered_size: Some(_), filter_mask: 0 }
		));
	}

	#[test]
	fn detects_corrupted_metadata() {
		let mut bytes = written(|c| c.write_dataset("x.csv", &Array2::zeros((1, 1))).unwrap());
		assert_eq!(read(&bytes).unwrap().links.len(), 1);
		// Inside the address of the root group link.
		let last = bytes.len() - 10;
		bytes[last] ^= 0xff;
		assert!(matches!(read(&bytes), Err(ContainerError::Malformed(_))));
		bytes[last] ^= 0xff;
		// Inside the superblock extension address.
		bytes[20] ^= 0x01;
		assert!(matches!(read(&bytes), Err(ContainerError::Malformed(_))));
	}

	#[test]
	fn rejects_old_superblocks() {
		let mut bytes = written(|_| {});
		bytes[8] = 0;
		assert!(matches!(read(&bytes), Err(ContainerError::Unsupported(_))));
	}

	/// File whose root group links `x.csv` to a small dataset, extended by `extend` with the
	/// dataset and root addresses.
	fn with_root(extend: impl FnOnce(&mut ObjectHeader, u64, u64)) -> Vec<u8> {
		let mut bytes = vec![0; SUPERBLOCK_SIZE as usize];
		let data = bytes.len() as u64;
		bytes.extend_from_slice(&[1.0f64, 2.0].map(f64::to_le_bytes).concat());
		let dataset = bytes.len() as u64;
		bytes.extend_from_slice(&message::dataset_header(
			[1, 2],
			&Layout::Contiguous {
				address: data,
				size: 16,
			},
			None,
		));
		let root = bytes.len() as u64;
		let mut header = ObjectHeader::default();
		header
			.add(kind::LINK_INFO, message::link_info())
			.add(kind::GROUP_INFO, message::group_info())
			.add(kind::LINK, message::hard_link("x.csv", dataset));
		extend(&mut header, dataset, root);
		bytes.extend_from_slice(&header.encode());
		let eof = bytes.len() as u64;
		bytes[..SUPERBLOCK_SIZE as usize].copy_from_slice(&message::superblock(root, eof));
		bytes
	}

	fn refusal(bytes: &[u8]) -> String {
		match read(bytes) {
			Err(ContainerError::Unsupported(feature)) => feature,
			other => panic!("expected refusal, got {other:?}"),
		}
	}

	#[test]
	fn contiguous_datasets_are_rechunked() {
		let root = read(&with_root(|_, _, _| {})).unwrap();
		let Some(Node::Dataset(dataset)) = root.links.get("x.csv") else {
			panic!("no dataset x.csv");
		};
		assert!(matches!(
			dataset.storage,
			Storage::Chunked { chunk: [1, 2], level: GZIP_LEVEL, .. }
		));
		assert_eq!(dataset.decode().unwrap(), ndarray::array![[1.0, 2.0]]);
	}

	#[test]
	fn refuses_soft_links() {
		let bytes = with_root(|header, _, _| {
			// Soft link "s" to "/x.csv".
			let mut link = vec![1, 0x08, 1, 1, b's'];
			link.extend_from_slice(&6u16.to_le_bytes());
			link.extend_from_slice(b"/x.csv");
			header.add(kind::LINK, link);
		});
		assert!(refusal(&bytes).contains("soft or external link \"s\""));
	}

	#[test]
	fn refuses_attributes() {
		let bytes = with_root(|header, _, _| {
			header.add(kind::ATTRIBUTE, vec![3, 0, 2, 0, 0, 0, 0, 0]);
		});
		assert!(refusal(&bytes).contains("attributes"));
		let bytes = with_root(|header, _, _| {
			header.add(0x12, vec![1, 0, 0, 0, 0, 0, 0, 0]);
		});
		assert!(refusal(&bytes).contains("message type 0x12"));
	}

	#[test]
	fn refuses_objects_linked_twice() {
		let bytes = with_root(|header, dataset, _| {
			header.add(kind::LINK, message::hard_link("y.csv", dataset));
		});
		assert!(refusal(&bytes).contains("\"y.csv\" links an object linked before"));
		let bytes = with_root(|header, _, root| {
			header.add(kind::LINK, message::hard_link("loop", root));
		});
		assert!(refusal(&bytes).contains("\"loop\""));
	}

	#[test]
	fn keeps_deflated_chunks_as_stored() {
		let table = Array2::from_shape_fn((300, 300), |(r, c)| (r * c) as f64);
		let dataset = Dataset::encode(&table, 1).unwrap();
		let Storage::Chunked { chunks: stored, .. } = &dataset.storage else {
			panic!("empty storage");
		};
		let stored = stored.clone();
		let mut root = Group::default();
		root.links.insert("t.csv".to_string(), Node::Dataset(dataset));
		let mut out = std::io::Cursor::new(Vec::new());
		super::super::writer::write(&mut out, &root).unwrap();
		let root = read(out.get_ref()).unwrap();
		let Some(Node::Dataset(dataset)) = root.links.get("t.csv") else {
			panic!("no dataset t.csv");
		};
		let Storage::Chunked { level, chunks, .. } = &dataset.storage else {
			panic!("empty storage");
		};
		assert_eq!(*level, 1);
		assert!(chunks == &stored);
		assert_eq!(dataset.decode().unwrap(), table);
	}

	#[test]
	fn follows_continuation_blocks() {
		// Root group whose only link lives in a continuation block.
		let mut bytes = vec![0; SUPERBLOCK_SIZE as usize];
		let data = bytes.len() as u64;
		bytes.extend_from_slice(&2.5f64.to_le_bytes());
		let dataset_address = bytes.len() as u64;
		bytes.extend_from_slice(&message::dataset_header(
			[1, 1],
			&Layout::Contiguous {
				address: data,
				size: 8,
			},
			None,
		));
		let mut block = b"OCHK".to_vec();
		let link = message::hard_link("c.csv", dataset_address);
		block.push(kind::LINK);
		block.extend_from_slice(&(link.len() as u16).to_le_bytes());
		block.push(0);
		block.extend_from_slice(&link);
		message::seal(&mut block);
		let block_address = bytes.len() as u64;
		bytes.extend_from_slice(&block);
		let mut continuation = block_address.to_le_bytes().to_vec();
		continuation.extend_from_slice(&(block.len() as u64).to_le_bytes());
		let mut root = ObjectHeader::default();
		root.add(kind::LINK_INFO, message::link_info())
			.add(kind::CONTINUATION, continuation);
		let root_address = bytes.len() as u64;
		bytes.extend_from_slice(&root.encode());
		let eof = bytes.len() as u64;
		bytes[..SUPERBLOCK_SIZE as usize].copy_from_slice(&message::superblock(root_address, eof));
		let root = read(&bytes).unwrap();
		let Some(Node::Dataset(dataset)) = root.links.get("c.csv") else {
			panic!("no dataset c.csv");
		};
		assert_eq!(dataset.decode().unwrap(), Array2::from_elem((1, 1), 2.5));
	}
}
