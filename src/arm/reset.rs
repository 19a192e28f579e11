//! Sources of configuration reset commands.

use crate::error::{Error, ResetFileError};
use std::path::PathBuf;

/// The reset commands bundled with the crate.
const BUNDLED: &str = include_str!("../../resources/reset.txt");

/// Where [`Arm::reset_configuration`](super::Arm::reset_configuration) reads
/// its commands from.
///
/// Each source yields one variable command (`$N=value`) per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResetSource {
	/// The factory settings bundled with the crate.
	#[default]
	Bundled,
	/// A text file.
	Path(PathBuf),
	/// Text with one command per line.
	Text(String),
	/// A list of commands.
	Lines(Vec<String>),
}

impl ResetSource {
	/// The commands of the source, trimmed, with blank lines removed.
	pub fn lines(&self) -> Result<Vec<String>, Error> {
		let lines = match self {
			ResetSource::Bundled => split(BUNDLED),
			ResetSource::Path(path) => {
				let text = std::fs::read_to_string(path)
					.map_err(|e| ResetFileError::new(path.clone(), e))?;
				split(&text)
			}
			ResetSource::Text(text) => split(text),
			ResetSource::Lines(lines) => lines
				.iter()
				.map(|line| line.trim())
				.filter(|line| !line.is_empty())
				.map(str::to_string)
				.collect(),
		};
		Ok(lines)
	}
}

impl From<PathBuf> for ResetSource {
	fn from(path: PathBuf) -> Self {
		ResetSource::Path(path)
	}
}

impl From<Vec<String>> for ResetSource {
	fn from(lines: Vec<String>) -> Self {
		ResetSource::Lines(lines)
	}
}

fn split(text: &str) -> Vec<String> {
	text.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.map(str::to_string)
		.collect()
}
