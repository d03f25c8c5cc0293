//! Chunking of two-dimensional tables and the fixed array chunk index.

use std::io::{self, Read, Write};

use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use ndarray::Array2;

use super::message::{OFFSET_SIZE, LENGTH_SIZE, UNDEF, encoded_width, put_uint, seal};

/// Chunk size the heuristic aims at for a 1 MiB dataset.
pub const CHUNK_BASE: f64 = 16.0 * 1024.0;
/// Lower bound of the targeted chunk size.
pub const CHUNK_MIN: f64 = 8.0 * 1024.0;
/// Upper bound of any chunk size.
pub const CHUNK_MAX: f64 = 1024.0 * 1024.0;

/// Size of one stored element.
pub(crate) const ELEMENT_SIZE: usize = 8;

/// Guesses a chunk shape for a dataset of `shape` with elements of `type_size` bytes.
///
/// The targeted chunk size grows by a factor of two for every tenfold increase of the dataset
/// size and is clamped to `[CHUNK_MIN, CHUNK_MAX]`. Starting from the full shape, dimensions are
/// halved round-robin until the chunk is smaller than or within 50% of that target, and smaller
/// than `CHUNK_MAX`. Zero-sized dimensions are assumed to hold 1024 elements.
pub fn guess_chunk(shape: [usize; 2], type_size: usize) -> [usize; 2] {
	let shape = shape.map(|dim| if dim == 0 { 1024 } else { dim });
	let size = (shape[0] * shape[1] * type_size) as f64;
	let target = (CHUNK_BASE * 2f64.powf((size / (1024.0 * 1024.0)).log10())).clamp(CHUNK_MIN, CHUNK_MAX);
	let mut chunk = shape;
	let mut index = 0;
	loop {
		let bytes = (chunk[0] * chunk[1] * type_size) as f64;
		let close = bytes < target || (bytes - target).abs() / target < 0.5;
		if close && bytes < CHUNK_MAX {
			break;
		}
		if chunk[0] * chunk[1] == 1 {
			break;
		}
		chunk[index % 2] = chunk[index % 2].div_ceil(2);
		index += 1;
	}
	chunk
}

/// Number of chunks along each dimension.
pub(crate) fn grid(shape: [usize; 2], chunk: [usize; 2]) -> [usize; 2] {
	[shape[0].div_ceil(chunk[0]), shape[1].div_ceil(chunk[1])]
}

/// Splits `table` into row-major ordered chunks of little-endian bytes, zero-padding edge chunks.
pub(crate) fn split(table: &Array2<f64>, chunk: [usize; 2]) -> Vec<Vec<u8>> {
	let (rows, cols) = table.dim();
	let [grid_rows, grid_cols] = grid([rows, cols], chunk);
	let mut chunks = Vec::with_capacity(grid_rows * grid_cols);
	for grid_row in 0..grid_rows {
		for grid_col in 0..grid_cols {
			let mut bytes = vec![0u8; chunk[0] * chunk[1] * ELEMENT_SIZE];
			for r in 0..chunk[0] {
				let row = grid_row * chunk[0] + r;
				if row >= rows {
					break;
				}
				for c in 0..chunk[1] {
					let col = grid_col * chunk[1] + c;
					if col >= cols {
						break;
					}
					let at = (r * chunk[1] + c) * ELEMENT_SIZE;
					bytes[at..at + ELEMENT_SIZE].copy_from_slice(&table[[row, col]].to_le_bytes());
				}
			}
			chunks.push(bytes);
		}
	}
	chunks
}

/// Reassembles a table of `shape` from row-major ordered raw chunks.
///
/// Missing chunks leave their elements at zero.
pub(crate) fn assemble(
	shape: [usize; 2],
	chunk: [usize; 2],
	chunks: impl IntoIterator<Item = Option<Vec<u8>>>,
) -> Result<Array2<f64>, String> {
	let [grid_rows, grid_cols] = grid(shape, chunk);
	let expected = chunk[0] * chunk[1] * ELEMENT_SIZE;
	let mut table = Array2::zeros((shape[0], shape[1]));
	let mut chunks = chunks.into_iter();
	for grid_row in 0..grid_rows {
		for grid_col in 0..grid_cols {
			let Some(bytes) = chunks.next().ok_or("chunk index too short")? else {
				continue;
			};
			if bytes.len() != expected {
				return Err(format!("chunk holds {} bytes, expected {}", bytes.len(), expected));
			}
			for r in 0..chunk[0] {
				let row = grid_row * chunk[0] + r;
				if row >= shape[0] {
					break;
				}
				for c in 0..chunk[1] {
					let col = grid_col * chunk[1] + c;
					if col >= shape[1] {
						break;
					}
					let at = (r * chunk[1] + c) * ELEMENT_SIZE;
					let mut value = [0u8; ELEMENT_SIZE];
					value.copy_from_slice(&bytes[at..at + ELEMENT_SIZE]);
					table[[row, col]] = f64::from_le_bytes(value);
				}
			}
		}
	}
	Ok(table)
}

/// Compresses a raw chunk with the zlib stream format of the HDF5 deflate filter.
pub(crate) fn deflate(raw: &[u8], level: u32) -> io::Result<Vec<u8>> {
	let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(level));
	encoder.write_all(raw)?;
	encoder.finish()
}

/// Decompresses a chunk written by the deflate filter.
pub(crate) fn inflate(bytes: &[u8], expected: usize) -> io::Result<Vec<u8>> {
	let mut raw = Vec::with_capacity(expected);
	ZlibDecoder::new(bytes).read_to_end(&mut raw)?;
	Ok(raw)
}

/// Location of one filtered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkEntry {
	pub(crate) address: u64,
	pub(crate) size: u64,
}

/// Encoded fixed array header and data block.
pub(crate) struct FixedArray {
	pub(crate) bytes: Vec<u8>,
	pub(crate) page_bits: u8,
}

/// Client identifier of a fixed array indexing filtered chunks.
pub(crate) const FILTERED_CHUNKS: u8 = 1;

/// Width of the chunk size field of filtered fixed array entries.
///
/// One more byte than needed for the unfiltered chunk size, leaving room for chunks growing when
/// compressed.
pub(crate) fn chunk_size_width(chunk_bytes: u64) -> usize {
	(1 + encoded_width(chunk_bytes)).min(8)
}

/// Encodes the fixed array header (`FAHD`) at `address` directly followed by its data block
/// (`FADB`).
///
/// The page size is raised to cover all entries so that the data block is never paged.
pub(crate) fn fixed_array(address: u64, entries: &[ChunkEntry], chunk_bytes: u64) -> FixedArray {
	let size_width = chunk_size_width(chunk_bytes);
	let entry_size = OFFSET_SIZE + size_width + 4;
	let page_bits = (usize::BITS - entries.len().saturating_sub(1).leading_zeros()).max(10) as u8;
	let header_size = 4 + 4 + LENGTH_SIZE + OFFSET_SIZE + 4;
	let block = if entries.is_empty() {
		UNDEF
	} else {
		address + header_size as u64
	};
	let mut bytes = Vec::with_capacity(header_size + 18 + OFFSET_SIZE + entries.len() * entry_size);
	bytes.extend_from_slice(b"FAHD");
	bytes.extend_from_slice(&[0, FILTERED_CHUNKS, entry_size as u8, page_bits]);
	put_uint(&mut bytes, entries.len() as u64, LENGTH_SIZE);
	put_uint(&mut bytes, block, OFFSET_SIZE);
	seal(&mut bytes);
	if !entries.is_empty() {
		let mut data = Vec::with_capacity(10 + OFFSET_SIZE + entries.len() * entry_size);
		data.extend_from_slice(b"FADB");
		data.extend_from_slice(&[0, FILTERED_CHUNKS]);
		put_uint(&mut data, address, OFFSET_SIZE);
		for entry in entries {
			put_uint(&mut data, entry.address, OFFSET_SIZE);
			put_uint(&mut data, entry.size, size_width);
			data.extend_from_slice(&0u32.to_le_bytes());
		}
		seal(&mut data);
		bytes.extend_from_slice(&data);
	}
	FixedArray { bytes, page_bits }
}
