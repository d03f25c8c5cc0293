//! Wall time accounting per pipeline stage.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::info;

/// Accumulated wall time per stage in order of first use.
#[derive(Debug, Default)]
pub struct Timings {
	enabled: bool,
	stages: IndexMap<&'static str, Duration>,
}

impl Timings {
	/// Creates timings measuring only if `enabled`.
	pub fn new(enabled: bool) -> Self {
		Self {
			enabled,
			stages: IndexMap::new(),
		}
	}
	/// Runs `f`, adding its wall time to `stage`.
	pub fn time<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
		if !self.enabled {
			return f();
		}
		let start = Instant::now();
		let value = f();
		*self.stages.entry(stage).or_default() += start.elapsed();
		value
	}
	/// Accumulated time of `stage`.
	pub fn get(&self, stage: &str) -> Option<Duration> {
		self.stages.get(stage).copied()
	}
	/// Logs the accumulated time per stage and in total.
	pub fn report(&self) {
		if !self.enabled {
			return;
		}
		for (stage, elapsed) in &self.stages {
			info!("{stage:>6}: {:.3}s", elapsed.as_secs_f64());
		}
		let total = self.stages.values().sum::<Duration>();
		info!(" total: {:.3}s", total.as_secs_f64());
	}
}
