//! Serialization of a container tree into an HDF5 file.
//!
//! Objects are written depth-first after a placeholder superblock: chunks and chunk indices
//! first, then dataset headers, then the header of the group linking to them. Each address is
//! known by the time it is referenced, so the superblock is the only thing written twice.

use std::io::{self, Seek, SeekFrom, Write};

use super::chunk::{self, ChunkEntry, ELEMENT_SIZE};
use super::message::{self, Layout, SUPERBLOCK_SIZE, UNDEF};
use super::{Dataset, Group, Node, Storage};

struct Sink<'a, W: Write> {
	out: &'a mut W,
	position: u64,
}

impl<W: Write> Sink<'_, W> {
	fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
		let address = self.position;
		self.out.write_all(bytes)?;
		self.position += bytes.len() as u64;
		Ok(address)
	}
}

/// Writes the file rooted at `root` from the start of `out` and returns the end-of-file address.
pub(super) fn write<W: Write + Seek>(out: &mut W, root: &Group) -> io::Result<u64> {
	out.seek(SeekFrom::Start(0))?;
	out.write_all(&[0; SUPERBLOCK_SIZE as usize])?;
	let mut sink = Sink {
		out: &mut *out,
		position: SUPERBLOCK_SIZE,
	};
	let root = write_group(&mut sink, root)?;
	let eof = sink.position;
	out.seek(SeekFrom::Start(0))?;
	out.write_all(&message::superblock(root, eof))?;
	out.seek(SeekFrom::Start(eof))?;
	Ok(eof)
}

fn write_group<W: Write>(sink: &mut Sink<'_, W>, group: &Group) -> io::Result<u64> {
	let mut links = Vec::with_capacity(group.links.len());
	for (name, node) in &group.links {
		let address = match node {
			Node::Group(group) => write_group(sink, group)?,
			Node::Dataset(dataset) => write_dataset(sink, dataset)?,
		};
		links.push((name.as_str(), address));
	}
	sink.append(&message::group_header(links))
}

fn write_dataset<W: Write>(sink: &mut Sink<'_, W>, dataset: &Dataset) -> io::Result<u64> {
	let shape = dataset.shape.map(|dim| dim as u64);
	let (layout, deflate) = match &dataset.storage {
		Storage::Empty => (
			Layout::Contiguous {
				address: UNDEF,
				size: 0,
			},
			None,
		),
		Storage::Chunked {
			chunk,
			level,
			chunks,
		} => {
			let mut entries = Vec::with_capacity(chunks.len());
			for bytes in chunks {
				let address = sink.append(bytes)?;
				entries.push(ChunkEntry {
					address,
					size: bytes.len() as u64,
				});
			}
			let chunk = chunk.map(|dim| dim as u64);
			let layout = if let [entry] = entries.as_slice() {
				Layout::SingleChunk {
					chunk,
					address: entry.address,
					filtered_size: entry.size,
				}
			} else {
				let address = sink.position;
				let index = chunk::fixed_array(address, &entries, chunk[0] * chunk[1] * ELEMENT_SIZE as u64);
				sink.append(&index.bytes)?;
				Layout::FixedArray {
					chunk,
					address,
					page_bits: index.page_bits,
				}
			};
			(layout, Some(*level))
		}
	};
	sink.append(&message::dataset_header(shape, &layout, deflate))
}
