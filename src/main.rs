//! Converts zipped CSV files into chunked and compressed HDF5 datasets
//!
//! # Installation
//!
//! ```sh
//! cargo install zcsv2h5
//! ```
//!
//! # Command-line Interface
//!
//! ```text
//! Converts zipped CSV files into chunked and compressed HDF5 datasets
//!
//! Every regular file ending in .csv in the input ZIP archives is decoded as a
//! table of numbers with its first row skipped as header and written to the
//! output HDF5 container as dataset named after the file's path inside its
//! archive. Datasets are chunked and gzip-compressed at level 7.
//!
//! Usage: zcsv2h5 [OPTIONS] <outfile> <archive>...
//!
//! Arguments:
//!   <outfile>
//!           Writes output HDF5 container.
//!
//!           Creates the container or appends to an existing one, replacing
//!           datasets of the same name.
//!
//!   <archive>...
//!           Converts CSV files in input ZIP archives.
//!
//!           Archives are glob patterns expanded in sorted order, taken literally
//!           when matching nothing. Datasets of later archives replace
//!           identically named datasets of former archives.
//!
//! Options:
//!   -d, --debug
//!           Prints status information
//!
//!   -p, --profile
//!           Prints time spent per stage
//!
//!   -h, --help
//!           Print help (see a summary with '-h')
//!
//!   -V, --version
//!           Print version
//! ```
//!
//! Prints one `<percent>% <entry>` line per converted CSV file, relative to the CSV files of its
//! archive. Exits with 2 on errors and with 0 on success or when interrupted, in which case the
//! datasets converted so far are kept. The `RUST_LOG` environment variable overrides the log
//! level selected by `--debug` and `--profile`.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use zcsv2h5::{Error, cli::Cli, convert::convert, progress::Progress};

fn main() -> ExitCode {
	let cli = Cli::parse();
	env_logger::Builder::new()
		.filter_level(cli.config().log_level())
		.parse_default_env()
		.init();
	match run(&cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("{}: {:#}", env!("CARGO_BIN_NAME"), err);
			eprintln!("  for help use --help");
			ExitCode::from(err.downcast_ref::<Error>().map_or(2, Error::exit_code))
		}
	}
}

fn run(cli: &Cli) -> Result<()> {
	let interrupt = Arc::new(AtomicBool::new(false));
	let handler = Arc::clone(&interrupt);
	ctrlc::set_handler(move || handler.store(true, Ordering::SeqCst))
		.context("Cannot install interrupt handler")?;
	let (outfile, archives) = cli.collect()?;
	let summary = convert(
		&outfile,
		&archives,
		&cli.config(),
		&interrupt,
		&mut Progress::new(io::stdout().lock()),
	)?;
	if summary.interrupted {
		eprintln!(
			"{}: interrupted after {} dataset(s)",
			env!("CARGO_BIN_NAME"),
			summary.datasets
		);
	}
	Ok(())
}
