//! Command-line behavior of the compiled binary.

use std::process::Command;

fn zcsv2h5(args: &[&str]) -> std::process::Output {
	Command::new(env!("CARGO_BIN_EXE_zcsv2h5"))
		.args(args)
		.output()
		.unwrap()
}

#[test]
fn prints_version() {
	let output = zcsv2h5(&["--version"]);
	assert!(output.status.success());
	assert_eq!(
		String::from_utf8_lossy(&output.stdout).trim(),
		format!("zcsv2h5 {}", env!("CARGO_PKG_VERSION"))
	);
}

#[test]
fn prints_help() {
	let output = zcsv2h5(&["--help"]);
	assert!(output.status.success());
	let stdout = String::from_utf8_lossy(&output.stdout);
	assert!(stdout.contains("<outfile>"));
	assert!(stdout.contains("<archive>..."));
	let text = stdout.split_whitespace().collect::<Vec<_>>().join(" ");
	assert!(text.contains("Datasets of later archives replace identically named datasets"));
}

#[test]
fn requires_archives() {
	assert_eq!(zcsv2h5(&["out.h5"]).status.code(), Some(2));
	assert_eq!(zcsv2h5(&[]).status.code(), Some(2));
}

#[test]
fn rejects_invalid_patterns() {
	let dir = tempfile::TempDir::new().unwrap();
	let out = dir.path().join("out.h5");
	let output = zcsv2h5(&[out.to_str().unwrap(), "[.zip"]);
	assert_eq!(output.status.code(), Some(2));
	assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid glob pattern"));
	assert!(!out.exists());
}
