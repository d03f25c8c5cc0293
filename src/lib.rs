//! Converts zipped CSV files into chunked and compressed HDF5 datasets
//!
//! The conversion is a sequential pipeline. The [`cli`] collects the output container and the
//! input ZIP archives, an [`archive::Archive`] selects the regular `.csv` files, the
//! [`table::decode_table`] function turns their text into a [`table::Table`] of doubles and the
//! [`h5::Container`] stores each table as chunked and deflate-compressed dataset named after its
//! entry. The [`convert::convert`] function drives these steps and reports [`progress`] per entry.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use zcsv2h5::{config::RunConfig, convert::convert, progress::Progress};
//!
//! let summary = convert(
//! 	Path::new("out.h5"),
//! 	&["data.zip".into()],
//! 	&RunConfig::default(),
//! 	&AtomicBool::new(false),
//! 	&mut Progress::new(std::io::stdout()),
//! )?;
//! println!("{} datasets", summary.datasets);
//! # Ok::<(), zcsv2h5::Error>(())
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod h5;
pub mod profile;
pub mod progress;
pub mod table;

pub use error::{Error, Result};
