//! Finding the serial port a device is connected to.

use crate::error::{Error, NoPortFoundError};
use serialport as sp;
use std::time::Duration;

/// List the names of the serial ports on this machine.
pub fn available_ports() -> Result<Vec<String>, Error> {
	Ok(sp::available_ports()?
		.into_iter()
		.map(|info| info.port_name)
		.collect())
}

/// Pick the port a device is most likely connected to.
///
/// On Unix this is the first listed port that can be opened at `baud_rate`.
/// Elsewhere the first listed port is returned without probing it.
pub fn find_port(baud_rate: u32) -> Result<String, Error> {
	let names = available_ports()?;
	log::debug!("found serial ports: {names:?}");
	choose_port(names, |name| can_open(name, baud_rate))
}

fn can_open(name: &str, baud_rate: u32) -> bool {
	match sp::new(name, baud_rate)
		.timeout(Duration::from_millis(100))
		.open()
	{
		Ok(_) => true,
		Err(e) => {
			log::debug!("skipping {name}: {e}");
			false
		}
	}
}

/// Choose among `names`, probing each with `can_open` where ports must be probed.
pub(crate) fn choose_port<F>(names: Vec<String>, mut can_open: F) -> Result<String, Error>
where
	F: FnMut(&str) -> bool,
{
	if names.is_empty() {
		return Err(NoPortFoundError::new("no ports found").into());
	}
	if !cfg!(unix) {
		return names
			.into_iter()
			.next()
			.ok_or_else(|| NoPortFoundError::new("no ports found").into());
	}
	names
		.into_iter()
		.find(|name| can_open(name))
		.ok_or_else(|| NoPortFoundError::new("no open ports found").into())
}

#[cfg(test)]
mod test {
	use super::*;

	fn names(list: &[&str]) -> Vec<String> {
		list.iter().map(ToString::to_string).collect()
	}

	#[test]
	fn empty_list() {
		let err = choose_port(Vec::new(), |_| true).unwrap_err();
		assert!(matches!(err, Error::NoPortFound(_)));
	}

	#[test]
	#[cfg(unix)]
	fn first_port_that_opens() {
		let mut probed = Vec::new();
		let chosen = choose_port(names(&["/dev/ttyS0", "/dev/ttyUSB0", "/dev/ttyUSB1"]), |name| {
			probed.push(name.to_string());
			name.contains("USB")
		})
		.unwrap();
		assert_eq!(chosen, "/dev/ttyUSB0");
		assert_eq!(probed, names(&["/dev/ttyS0", "/dev/ttyUSB0"]));
	}

	#[test]
	#[cfg(unix)]
	fn none_open() {
		let err = choose_port(names(&["/dev/ttyS0"]), |_| false).unwrap_err();
		assert!(err.to_string().ends_with("no open ports found"));
	}

	#[test]
	#[cfg(not(unix))]
	fn first_listed_port() {
		let chosen = choose_port(names(&["COM3", "COM4"]), |_| false).unwrap();
		assert_eq!(chosen, "COM3");
	}
}
