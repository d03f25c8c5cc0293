//! Encoders for the HDF5 metadata the container writes.
//!
//! Every address and length is eight bytes wide, object headers are version 2 and groups keep
//! their links compactly inside their object header.

use super::checksum::lookup3;

/// File signature opening the superblock.
pub(crate) const SIGNATURE: [u8; 8] = *b"\x89HDF\r\n\x1a\n";
/// Encoded size of a version 3 superblock.
pub(crate) const SUPERBLOCK_SIZE: u64 = 48;
/// Undefined address.
pub(crate) const UNDEF: u64 = u64::MAX;
/// Width of file addresses.
pub(crate) const OFFSET_SIZE: usize = 8;
/// Width of file lengths.
pub(crate) const LENGTH_SIZE: usize = 8;
/// HDF5 identifier of the deflate filter.
pub(crate) const FILTER_DEFLATE: u16 = 1;

/// Header message types.
pub(crate) mod kind {
	pub(crate) const NIL: u8 = 0x00;
	pub(crate) const DATASPACE: u8 = 0x01;
	pub(crate) const LINK_INFO: u8 = 0x02;
	pub(crate) const DATATYPE: u8 = 0x03;
	pub(crate) const FILL_VALUE: u8 = 0x05;
	pub(crate) const LINK: u8 = 0x06;
	pub(crate) const LAYOUT: u8 = 0x08;
	pub(crate) const GROUP_INFO: u8 = 0x0a;
	pub(crate) const FILTER_PIPELINE: u8 = 0x0b;
	pub(crate) const ATTRIBUTE: u8 = 0x0c;
	pub(crate) const CONTINUATION: u8 = 0x10;
	pub(crate) const SYMBOL_TABLE: u8 = 0x11;
	pub(crate) const ATTRIBUTE_INFO: u8 = 0x15;
}

/// Message flag marking a message as constant.
const CONSTANT: u8 = 0x01;

/// Version 2 object header under construction.
#[derive(Default)]
pub(crate) struct ObjectHeader {
	messages: Vec<(u8, Vec<u8>, u8)>,
}

impl ObjectHeader {
	pub(crate) fn add(&mut self, kind: u8, data: Vec<u8>) -> &mut Self {
		self.messages.push((kind, data, 0));
		self
	}
	pub(crate) fn add_constant(&mut self, kind: u8, data: Vec<u8>) -> &mut Self {
		self.messages.push((kind, data, CONSTANT));
		self
	}
	/// Encodes `OHDR`, the chunk #0 size, all messages and the trailing checksum.
	pub(crate) fn encode(&self) -> Vec<u8> {
		let size = self
			.messages
			.iter()
			.map(|(_, data, _)| 4 + data.len())
			.sum::<usize>();
		let (flags, width) = match size {
			0..=0xff => (0u8, 1),
			0x100..=0xffff => (1, 2),
			_ => (2, 4),
		};
		let mut buf = Vec::with_capacity(6 + width + size + 4);
		buf.extend_from_slice(b"OHDR");
		buf.push(2);
		buf.push(flags);
		put_uint(&mut buf, size as u64, width);
		for (kind, data, flags) in &self.messages {
			buf.push(*kind);
			buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
			buf.push(*flags);
			buf.extend_from_slice(data);
		}
		seal(&mut buf);
		buf
	}
}

/// Appends the lookup3 checksum of everything in `buf`.
pub(crate) fn seal(buf: &mut Vec<u8>) {
	let checksum = lookup3(buf);
	buf.extend_from_slice(&checksum.to_le_bytes());
}

/// Appends the `width` low bytes of `value` in little-endian order.
pub(crate) fn put_uint(buf: &mut Vec<u8>, value: u64, width: usize) {
	buf.extend_from_slice(&value.to_le_bytes()[..width]);
}

/// Version 3 superblock pointing at the root group.
pub(crate) fn superblock(root: u64, eof: u64) -> Vec<u8> {
	let mut buf = Vec::with_capacity(SUPERBLOCK_SIZE as usize);
	buf.extend_from_slice(&SIGNATURE);
	buf.push(3);
	buf.push(OFFSET_SIZE as u8);
	buf.push(LENGTH_SIZE as u8);
	buf.push(0);
	buf.extend_from_slice(&0u64.to_le_bytes());
	buf.extend_from_slice(&UNDEF.to_le_bytes());
	buf.extend_from_slice(&eof.to_le_bytes());
	buf.extend_from_slice(&root.to_le_bytes());
	seal(&mut buf);
	buf
}

/// Little-endian IEEE 754 double.
pub(crate) fn f64_datatype() -> Vec<u8> {
	let mut buf = vec![0x11, 0x20, 63, 0x00];
	buf.extend_from_slice(&8u32.to_le_bytes());
	buf.extend_from_slice(&0u16.to_le_bytes());
	buf.extend_from_slice(&64u16.to_le_bytes());
	buf.extend_from_slice(&[52, 11, 0, 52]);
	buf.extend_from_slice(&1023u32.to_le_bytes());
	buf
}

/// Simple dataspace whose maximum dimensions equal its dimensions.
pub(crate) fn dataspace(shape: &[u64]) -> Vec<u8> {
	let mut buf = vec![2, shape.len() as u8, 0, 1];
	for &dim in shape {
		buf.extend_from_slice(&dim.to_le_bytes());
	}
	buf
}

/// When storage of a dataset is allocated.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Allocation {
	Late = 2,
	Incremental = 3,
}

/// Version 3 fill value message without a user-defined fill value.
pub(crate) fn fill_value(allocation: Allocation) -> Vec<u8> {
	// Fill value written only if set by the user, which it never is.
	vec![3, allocation as u8 | 2 << 2]
}

/// Version 2 filter pipeline holding the optional deflate filter.
pub(crate) fn deflate_pipeline(level: u32) -> Vec<u8> {
	let mut buf = vec![2, 1];
	buf.extend_from_slice(&FILTER_DEFLATE.to_le_bytes());
	buf.extend_from_slice(&1u16.to_le_bytes());
	buf.extend_from_slice(&1u16.to_le_bytes());
	buf.extend_from_slice(&level.to_le_bytes());
	buf
}

/// Storage layout of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Layout {
	Contiguous {
		address: u64,
		size: u64,
	},
	SingleChunk {
		chunk: [u64; 2],
		address: u64,
		filtered_size: u64,
	},
	FixedArray {
		chunk: [u64; 2],
		address: u64,
		page_bits: u8,
	},
}

impl Layout {
	/// Version 4 data layout message for `f64` elements.
	pub(crate) fn encode(&self) -> Vec<u8> {
		let mut buf = vec![4];
		match *self {
			Self::Contiguous { address, size } => {
				buf.push(1);
				buf.extend_from_slice(&address.to_le_bytes());
				buf.extend_from_slice(&size.to_le_bytes());
			}
			Self::SingleChunk {
				chunk,
				address,
				filtered_size,
			} => {
				buf.push(2);
				// Single chunk index with filters.
				buf.push(0x02);
				chunk_dims(&mut buf, chunk);
				buf.push(1);
				buf.extend_from_slice(&filtered_size.to_le_bytes());
				buf.extend_from_slice(&0u32.to_le_bytes());
				buf.extend_from_slice(&address.to_le_bytes());
			}
			Self::FixedArray {
				chunk,
				address,
				page_bits,
			} => {
				buf.push(2);
				buf.push(0);
				chunk_dims(&mut buf, chunk);
				buf.push(3);
				buf.push(page_bits);
				buf.extend_from_slice(&address.to_le_bytes());
			}
		}
		buf
	}
}

/// Chunk dimensions followed by the element size, all in the narrowest common width.
fn chunk_dims(buf: &mut Vec<u8>, chunk: [u64; 2]) {
	let dims = [chunk[0], chunk[1], 8];
	let width = dims.iter().map(|&dim| encoded_width(dim)).max().unwrap_or(1);
	buf.push(dims.len() as u8);
	buf.push(width as u8);
	for dim in dims {
		put_uint(buf, dim, width);
	}
}

/// Bytes needed to encode `value` as the HDF5 library computes it, `floor(log2(value)) / 8 + 1`.
pub(crate) fn encoded_width(value: u64) -> usize {
	let log2 = 63 - value.max(1).leading_zeros() as usize;
	((log2 + 8) / 8).min(8)
}

/// Link info of a compactly stored group without creation order tracking.
pub(crate) fn link_info() -> Vec<u8> {
	let mut buf = vec![0, 0];
	buf.extend_from_slice(&UNDEF.to_le_bytes());
	buf.extend_from_slice(&UNDEF.to_le_bytes());
	buf
}

/// Group info with default storage thresholds.
pub(crate) fn group_info() -> Vec<u8> {
	vec![0, 0]
}

/// Hard link with a UTF-8 name.
pub(crate) fn hard_link(name: &str, address: u64) -> Vec<u8> {
	let name = name.as_bytes();
	let width = match name.len() {
		0..=0xff => 1,
		0x100..=0xffff => 2,
		_ => 4,
	};
	let size_bits = match width {
		1 => 0,
		2 => 1,
		_ => 2,
	};
	let mut buf = vec![1, size_bits | 0x10, 1];
	put_uint(&mut buf, name.len() as u64, width);
	buf.extend_from_slice(name);
	buf.extend_from_slice(&address.to_le_bytes());
	buf
}

/// Object header of a group linking to `links`.
pub(crate) fn group_header<'a>(links: impl IntoIterator<Item = (&'a str, u64)>) -> Vec<u8> {
	let mut header = ObjectHeader::default();
	header
		.add(kind::LINK_INFO, link_info())
		.add(kind::GROUP_INFO, group_info());
	for (name, address) in links {
		header.add(kind::LINK, hard_link(name, address));
	}
	header.encode()
}

/// Object header of a two-dimensional `f64` dataset.
pub(crate) fn dataset_header(shape: [u64; 2], layout: &Layout, deflate: Option<u32>) -> Vec<u8> {
	let allocation = match layout {
		Layout::Contiguous { .. } => Allocation::Late,
		_ => Allocation::Incremental,
	};
	let mut header = ObjectHeader::default();
	header
		.add_constant(kind::DATATYPE, f64_datatype())
		.add(kind::DATASPACE, dataspace(&shape))
		.add_constant(kind::FILL_VALUE, fill_value(allocation))
		.add(kind::LAYOUT, layout.encode());
	if let Some(level) = deflate {
		header.add(kind::FILTER_PIPELINE, deflate_pipeline(level));
	}
	header.encode()
}
