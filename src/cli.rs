//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;
use glob::glob;
use log::debug;
use zip::result::ZipError;

use crate::config::RunConfig;
use crate::{Error, Result};

/// Converts zipped CSV files into chunked and compressed HDF5 datasets
///
/// Every regular file ending in .csv in the input ZIP archives is decoded as a table of numbers
/// with its first row skipped as header and written to the output HDF5 container as dataset named
/// after the file's path inside its archive. Datasets are chunked and gzip-compressed at level 7.
#[derive(Parser, Debug)]
#[command(version, arg_required_else_help = true)]
pub struct Cli {
	/// Writes output HDF5 container.
	///
	/// Creates the container or appends to an existing one, replacing datasets of the same name.
	#[arg(value_name = "outfile")]
	pub outfile: PathBuf,
	/// Converts CSV files in input ZIP archives.
	///
	/// Archives are glob patterns expanded in sorted order, taken literally when matching nothing.
	/// Datasets of later archives replace identically named datasets of former archives.
	#[arg(value_name = "archive", required = true)]
	pub archives: Vec<String>,
	/// Prints status information.
	#[arg(short, long)]
	pub debug: bool,
	/// Prints time spent per stage.
	#[arg(short, long)]
	pub profile: bool,
}

impl Cli {
	/// Returns the output path and the archive paths with glob patterns expanded.
	pub fn collect(&self) -> Result<(PathBuf, Vec<PathBuf>)> {
		let mut archives = Vec::new();
		for pattern in &self.archives {
			let matches = glob(pattern).map_err(|source| Error::Usage {
				pattern: pattern.clone(),
				source,
			})?;
			let count = archives.len();
			for path in matches {
				let path = path.map_err(|err| Error::ArchiveOpen {
					path: err.path().to_path_buf(),
					source: ZipError::Io(err.into_error()),
				})?;
				archives.push(path);
			}
			if archives.len() == count {
				debug!("{:?}: matching nothing, taken literally", pattern);
				archives.push(PathBuf::from(pattern));
			}
		}
		Ok((self.outfile.clone(), archives))
	}
	/// Switches of this run.
	pub fn config(&self) -> RunConfig {
		RunConfig {
			debug: self.debug,
			profile: self.profile,
		}
	}
}
