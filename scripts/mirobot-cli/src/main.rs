use anyhow::Context as _;
use argh::FromArgs;
use mirobot::{
	arm::{Arm, ResetSource},
	backend::Serial,
	gcode::{discover, CommandOutcome, OpenSerialOptions, Port, Wait},
};
use std::path::PathBuf;

/// Control a Mirobot arm from the command line.
#[derive(Debug, FromArgs)]
struct App {
	/// the serial port the arm is connected to (found automatically if omitted)
	#[argh(option, short = 'p')]
	port: Option<String>,
	/// the baud rate
	#[argh(option, default = "OpenSerialOptions::DEFAULT_BAUD_RATE")]
	baud: u32,
	/// do not wait for the arm to boot after opening the port
	#[argh(switch)]
	no_handshake: bool,
	#[argh(subcommand)]
	command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
	Ports(Ports),
	Status(Status),
	Send(SendLine),
	Home(Home),
	Reset(Reset),
}

/// List the serial ports on this machine.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "ports")]
struct Ports {}

/// Print the arm's status.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "status")]
struct Status {}

/// Send a raw command line.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "send")]
struct SendLine {
	/// the command, e.g. "M21 G90 X10 F2000"
	#[argh(positional)]
	line: String,
	/// wait for the arm to become idle
	#[argh(switch)]
	idle: bool,
	/// do not wait for the acknowledgement
	#[argh(switch)]
	no_wait: bool,
}

/// Home the arm.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "home")]
struct Home {
	/// also home the rail
	#[argh(switch)]
	slider: bool,
}

/// Reset the arm's stored configuration.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "reset")]
struct Reset {
	/// a file with one `$N=value` command per line (the bundled defaults if omitted)
	#[argh(positional)]
	file: Option<PathBuf>,
}

impl App {
	fn open(&self) -> anyhow::Result<Port<'static, Serial>> {
		let mut options = OpenSerialOptions::new();
		options
			.baud_rate(self.baud)
			.handshake(!self.no_handshake, Some(std::time::Duration::from_secs(10)));
		let port = match &self.port {
			Some(path) => options
				.open(path)
				.with_context(|| format!("cannot open {path}"))?,
			None => options.open_auto().context("cannot find an arm")?,
		};
		log::info!(
			"connected to {}",
			port.name().as_deref().unwrap_or("<unnamed port>")
		);
		Ok(port)
	}
}

fn print_lines(outcome: &CommandOutcome) {
	for line in outcome.lines() {
		println!("{line}");
	}
}

fn main() -> anyhow::Result<()> {
	env_logger::init();

	let app: App = argh::from_env();

	match &app.command {
		Command::Ports(_) => {
			for name in discover::available_ports()? {
				println!("{name}");
			}
		}
		Command::Status(_) => {
			let mut port = app.open()?;
			let status = port.update_status()?;
			println!("{status}");
			println!("state:     {}", status.state);
			println!("angles:    {:?}", status.angles);
			println!("cartesian: {:?}", status.cartesian);
		}
		Command::Send(send) => {
			let mut port = app.open()?;
			let wait = if send.no_wait {
				Wait::None
			} else {
				Wait::from_flags(true, send.idle)
			};
			let outcome = port.send(&send.line, wait)?;
			print_lines(&outcome);
		}
		Command::Home(home) => {
			let mut arm = Arm::new(app.open()?);
			let status = arm.home(home.slider)?;
			println!("{status}");
		}
		Command::Reset(reset) => {
			let source = reset
				.file
				.clone()
				.map_or(ResetSource::Bundled, ResetSource::Path);
			let mut arm = Arm::new(app.open()?);
			for (line, outcome) in arm.reset_configuration(&source)? {
				println!("{line}");
				print_lines(&outcome);
			}
		}
	}
	Ok(())
}
