//! Run configuration derived from command-line flags.

/// Switches passed explicitly through a conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunConfig {
	/// Logs every step.
	pub debug: bool,
	/// Measures and logs the time spent per stage.
	pub profile: bool,
}

impl RunConfig {
	/// Least severe level worth logging, unless overridden by `RUST_LOG`.
	pub fn log_level(&self) -> log::LevelFilter {
		if self.debug {
			log::LevelFilter::Debug
		} else if self.profile {
			log::LevelFilter::Info
		} else {
			log::LevelFilter::Warn
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use log::LevelFilter;

	#[test]
	fn debug_outranks_profile() {
		assert_eq!(RunConfig::default().log_level(), LevelFilter::Warn);
		let profile = RunConfig {
			profile: true,
			..RunConfig::default()
		};
		assert_eq!(profile.log_level(), LevelFilter::Info);
		let both = RunConfig {
			debug: true,
			profile: true,
		};
		assert_eq!(both.log_level(), LevelFilter::Debug);
	}
}
