//! Decoding of CSV text into numeric tables.

use csv::{ReaderBuilder, Trim};
use ndarray::Array2;

use crate::{Error, Result};

/// Two-dimensional table of doubles, rows by columns.
pub type Table = Array2<f64>;

/// Reasons a CSV entry does not decode into a table.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	/// The text is no valid CSV or no valid UTF-8.
	#[error("Invalid CSV")]
	Csv(#[from] csv::Error),
	/// A field is empty or does not parse as a number.
	#[error("Non-numeric field {field:?} in line {line}, column {column}")]
	NotNumeric {
		/// Line of the row, starting at 1.
		line: u64,
		/// Column of the field, starting at 1.
		column: usize,
		/// Field as found.
		field: String,
	},
	/// A row has another number of fields than the first data row.
	#[error("{found} instead of {expected} fields in line {line}")]
	Ragged {
		/// Line of the row, starting at 1.
		line: u64,
		/// Number of fields of the first data row.
		expected: usize,
		/// Number of fields of this row.
		found: usize,
	},
	/// The decoded values do not fill the table.
	#[error("Inconsistent table shape")]
	Shape(#[from] ndarray::ShapeError),
}

/// Decodes the CSV text of `entry` into a table, skipping its header row.
///
/// The first line is the header, whatever it holds. Fields are comma-separated and trimmed. Empty
/// lines and lines starting with `#` are ignored after the header. The first data row defines the
/// number of columns. Without data rows, the table is `0 × 0`.
pub fn decode_table(entry: &str, bytes: &[u8]) -> Result<Table> {
	decode(bytes).map_err(|source| Error::Decode {
		entry: entry.to_string(),
		source,
	})
}

fn decode(bytes: &[u8]) -> std::result::Result<Table, DecodeError> {
	let body = bytes
		.iter()
		.position(|&byte| byte == b'\n')
		.map_or(&[][..], |end| &bytes[end + 1..]);
	let mut reader = ReaderBuilder::new()
		.has_headers(false)
		.flexible(true)
		.trim(Trim::All)
		.comment(Some(b'#'))
		.from_reader(body);
	let mut values = Vec::new();
	let mut rows = 0;
	let mut cols = None;
	for record in reader.records() {
		let record = record?;
		// Header line precedes the body.
		let line = record.position().map_or(0, |position| position.line() + 1);
		let expected = *cols.get_or_insert(record.len());
		if record.len() != expected {
			return Err(DecodeError::Ragged {
				line,
				expected,
				found: record.len(),
			});
		}
		for (index, field) in record.iter().enumerate() {
			let value = field.parse::<f64>().map_err(|_| DecodeError::NotNumeric {
				line,
				column: index + 1,
				field: field.to_string(),
			})?;
			values.push(value);
		}
		rows += 1;
	}
	Ok(Array2::from_shape_vec((rows, cols.unwrap_or(0)), values)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;

	#[test]
	fn skips_header_row() {
		let table = decode(b"a,b\n1.0,2.0\n3.0,4.0\n").unwrap();
		assert_eq!(table, array![[1.0, 2.0], [3.0, 4.0]]);
	}

	#[test]
	fn rejects_ragged_rows() {
		let err = decode_table("bad.csv", b"h\n1,2\n3\n").unwrap_err();
		assert!(matches!(
			err,
			Error::Decode {
				ref entry,
				source: DecodeError::Ragged {
					line: 3,
					expected: 2,
					found: 1
				},
			} if entry == "bad.csv"
		));
	}

	#[test]
	fn rejects_non_numeric_and_empty_fields() {
		assert!(matches!(
			decode(b"a,b\n1,x\n"),
			Err(DecodeError::NotNumeric { line: 2, column: 2, ref field }) if field == "x"
		));
		assert!(matches!(
			decode(b"a,b\n1,\n"),
			Err(DecodeError::NotNumeric { column: 2, .. })
		));
	}

	#[test]
	fn header_only_is_empty() {
		assert_eq!(decode(b"a,b,c\n").unwrap().dim(), (0, 0));
		assert_eq!(decode(b"").unwrap().dim(), (0, 0));
	}

	#[test]
	fn keeps_two_dimensions() {
		assert_eq!(decode(b"a,b,c\n1,2,3\n").unwrap().dim(), (1, 3));
		assert_eq!(decode(b"a\n1\n2\n3\n").unwrap().dim(), (3, 1));
	}

	#[test]
	fn ignores_comments_blank_lines_and_padding() {
		let text = b"x , y\n\n 1 ,\t2\n# skipped\n\n-inf, nan\n";
		let table = decode(text).unwrap();
		assert_eq!(table.dim(), (2, 2));
		assert_eq!(table.row(0).to_vec(), [1.0, 2.0]);
		assert_eq!(table[[1, 0]], f64::NEG_INFINITY);
		assert!(table[[1, 1]].is_nan());
	}

	#[test]
	fn skips_first_line_whatever_it_holds() {
		let expected = array![[1.0, 2.0], [3.0, 4.0]];
		assert_eq!(decode(b"#id,value\n1,2\n3,4\n").unwrap(), expected);
		assert_eq!(decode(b"\n1,2\n3,4\n").unwrap(), expected);
		assert_eq!(decode(b"id,value\r\n1,2\r\n3,4\r\n").unwrap(), expected);
		assert_eq!(decode(b"a,b").unwrap().dim(), (0, 0));
	}

	#[test]
	fn whitespace_only_line_is_empty_field() {
		assert!(matches!(
			decode(b"a\n1\n   \n"),
			Err(DecodeError::NotNumeric { line: 3, column: 1, ref field }) if field.is_empty()
		));
	}

	#[test]
	fn header_may_differ_in_width() {
		assert_eq!(decode(b"only\n1,2\n3,4\n").unwrap(), array![[1.0, 2.0], [3.0, 4.0]]);
	}
}
