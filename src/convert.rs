//! Conversion of the CSV entries of ZIP archives into container datasets.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::archive::Archive;
use crate::config::RunConfig;
use crate::h5::{Container, ContainerError};
use crate::profile::Timings;
use crate::progress::Progress;
use crate::table::decode_table;
use crate::{Error, Result};

/// Outcome of a conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
	/// Number of archives opened.
	pub archives: usize,
	/// Number of datasets written.
	pub datasets: usize,
	/// Whether the conversion stopped early on an interrupt.
	pub interrupted: bool,
}

fn write_error(path: impl Into<String>) -> impl FnOnce(ContainerError) -> Error {
	let path = path.into();
	move |source| Error::Write { path, source }
}

/// Converts the CSV entries of `archives` into datasets of the container at `outfile`.
///
/// Archives are processed one after another in the given order, each dataset named after its
/// entry. Datasets of former runs or of former archives with the same name are replaced. Once
/// `interrupt` is set, no further entry is converted but the container is still closed, keeping
/// the datasets converted so far. On errors, the container file is left as it was.
pub fn convert<W: Write>(
	outfile: &Path,
	archives: &[PathBuf],
	config: &RunConfig,
	interrupt: &AtomicBool,
	progress: &mut Progress<W>,
) -> Result<Summary> {
	let mut timings = Timings::new(config.profile);
	let mut summary = Summary::default();
	debug!("{:?}: opening output container", outfile);
	let mut container = timings
		.time("open", || Container::open(outfile))
		.map_err(write_error(outfile.display().to_string()))?;
	'archives: for path in archives {
		if interrupt.load(Ordering::SeqCst) {
			summary.interrupted = true;
			break;
		}
		debug!("{:?}: opening input ZIP archive", path);
		let mut archive = timings.time("open", || Archive::open(path))?;
		summary.archives += 1;
		let names = timings.time("scan", || archive.csv_entries())?;
		for (index, name) in names.iter().enumerate() {
			if interrupt.load(Ordering::SeqCst) {
				summary.interrupted = true;
				break 'archives;
			}
			debug!("{:?}: converting from {:?}", name, archive.path());
			let bytes = timings.time("read", || archive.read(name))?;
			let table = timings.time("decode", || decode_table(name, &bytes))?;
			timings
				.time("write", || container.write_dataset(name, &table))
				.map_err(write_error(name.as_str()))?;
			summary.datasets += 1;
			if let Err(err) = progress.report(index, names.len(), name) {
				warn!("Cannot report progress: {err}");
			}
		}
		debug!("{:?}: closing input ZIP archive", path);
	}
	if summary.interrupted {
		warn!("Interrupted, keeping {} converted dataset(s)", summary.datasets);
	}
	debug!("{:?}: closing output container", outfile);
	timings
		.time("close", || container.close())
		.map_err(write_error(outfile.display().to_string()))?;
	info!(
		"{:?}: {} dataset(s) from {} archive(s)",
		outfile, summary.datasets, summary.archives
	);
	timings.report();
	Ok(summary)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::array;
	use std::fs;
	use std::io::Cursor;
	use tempfile::TempDir;
	use zip::{ZipWriter, write::SimpleFileOptions};

	fn zip(dir: &TempDir, name: &str, files: &[(&str, &str)]) -> PathBuf {
		let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
		for (entry, content) in files {
			zip.start_file(*entry, SimpleFileOptions::default()).unwrap();
			zip.write_all(content.as_bytes()).unwrap();
		}
		let path = dir.path().join(name);
		fs::write(&path, zip.finish().unwrap().into_inner()).unwrap();
		path
	}

	fn run(outfile: &Path, archives: &[PathBuf], interrupt: bool) -> (Result<Summary>, String) {
		let mut progress = Progress::new(Vec::new());
		let summary = convert(
			outfile,
			archives,
			&RunConfig::default(),
			&AtomicBool::new(interrupt),
			&mut progress,
		);
		(summary, String::from_utf8(progress.into_inner()).unwrap())
	}

	#[test]
	fn converts_every_csv_entry() {
		let dir = TempDir::new().unwrap();
		let data = zip(
			&dir,
			"data.zip",
			&[("x.csv", "a,b\n1.0,2.0\n3.0,4.0\n"), ("notes.txt", "n"), ("d/y.csv", "c\n5\n")],
		);
		let out = dir.path().join("out.h5");
		let (summary, printed) = run(&out, &[data], false);
		assert_eq!(
			summary.unwrap(),
			Summary {
				archives: 1,
				datasets: 2,
				interrupted: false
			}
		);
		assert_eq!(printed, "50.0% x.csv\n100.0% d/y.csv\n");
		let container = Container::open(&out).unwrap();
		assert_eq!(container.dataset_names(), ["x.csv", "d/y.csv"]);
		assert_eq!(container.read_dataset("x.csv").unwrap(), array![[1.0, 2.0], [3.0, 4.0]]);
		assert_eq!(container.read_dataset("d/y.csv").unwrap(), array![[5.0]]);
	}

	#[test]
	fn later_archives_replace_same_names() {
		let dir = TempDir::new().unwrap();
		let first = zip(&dir, "1.zip", &[("x.csv", "a\n1\n")]);
		let second = zip(&dir, "2.zip", &[("x.csv", "a,b\n2,3\n")]);
		let out = dir.path().join("out.h5");
		let (summary, _) = run(&out, &[first, second], false);
		assert_eq!(summary.unwrap().archives, 2);
		let container = Container::open(&out).unwrap();
		assert_eq!(container.len(), 1);
		assert_eq!(container.read_dataset("x.csv").unwrap(), array![[2.0, 3.0]]);
	}

	#[test]
	fn errors_leave_container_untouched() {
		let dir = TempDir::new().unwrap();
		let good = zip(&dir, "good.zip", &[("x.csv", "a\n1\n")]);
		let bad = zip(&dir, "bad.zip", &[("y.csv", "a\n2\n"), ("bad.csv", "h\n1,2\n3\n")]);
		let out = dir.path().join("out.h5");
		run(&out, &[good], false).0.unwrap();
		let (summary, printed) = run(&out, &[bad], false);
		assert!(matches!(summary, Err(Error::Decode { entry, .. }) if entry == "bad.csv"));
		assert_eq!(printed, "50.0% y.csv\n");
		assert_eq!(Container::open(&out).unwrap().dataset_names(), ["x.csv"]);
	}

	#[test]
	fn missing_archive_names_its_path() {
		let dir = TempDir::new().unwrap();
		let missing = dir.path().join("missing.zip");
		let (summary, _) = run(&dir.path().join("out.h5"), &[missing.clone()], false);
		assert!(matches!(summary, Err(Error::ArchiveOpen { path, .. }) if path == missing));
	}

	#[test]
	fn interrupt_still_closes_container() {
		let dir = TempDir::new().unwrap();
		let data = zip(&dir, "data.zip", &[("x.csv", "a\n1\n")]);
		let out = dir.path().join("out.h5");
		let (summary, printed) = run(&out, &[data], true);
		assert_eq!(
			summary.unwrap(),
			Summary {
				archives: 0,
				datasets: 0,
				interrupted: true
			}
		);
		assert!(printed.is_empty());
		assert!(Container::open(&out).unwrap().is_empty());
	}
}
