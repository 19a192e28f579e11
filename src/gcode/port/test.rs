use std::{
	io,
	sync::{Arc, Mutex},
	time::Duration,
};

use crate::{
	error::*,
	gcode::{CommandOutcome, Direction, Port, ResponseLine, Wait, RESET_BANNER},
};

const IDLE_REPORT: &str = "<Idle,Angle(ABCDXYZ):0.0,0.0,0.0,0.0,0.0,0.0,0.0,Cartesian coordinate(XYZ RxRyRz):198.670,0.0,230.720,0.0,0.0,0.0,Pump PWM:0,Valve PWM:0,Motion_MODE:0>";
const RUN_REPORT: &str = "<Run,Angle(ABCDXYZ):10.0,0.0,0.0,0.0,0.0,0.0,0.0,Cartesian coordinate(XYZ RxRyRz):198.670,0.0,230.720,0.0,0.0,0.0,Pump PWM:0,Valve PWM:0,Motion_MODE:0>";

/// Generate code to check that sending a command with the given scripted
/// replies fails with the expected error type.
///
/// The syntax is `<port>, <case>...` where each `<case>` is
/// `<reply>... via <method> => <expected_error_type>,`.
macro_rules! check_err_cases {
    (
        $port:ident, $($reply:literal),* via $method:expr => $err_type:ident, $($rest:tt)*
    ) => {
        $port.backend.clear_buffer();
        $(
            $port.backend.push_reply($reply);
        )*
        let m: fn(&mut Port<'_, _>) -> Result<_, Error> = $method;
        match (m)(&mut $port) {
            Err(e) => {
                if let Err(e) = $err_type::try_from(e) {
                    panic!("unexpected error for {} via {}:\n\texpected:\t{}\n\tgot:\t\t{}\n\t\t\t{:?}\n",
                        stringify!($($reply),*),
                        stringify!($method),
                        stringify!($err_type),
                        e,
                        e);
                }
            }
            Ok(_) => panic!("unexpected Ok for {} via {}", stringify!($($reply),*), stringify!($method)),
        };
        check_err_cases!($port, $($rest)*)
    };

    ($port:ident, ) => {};
}

#[test]
fn send_wait_ack_returns_lines() {
	let mut port = Port::open_mock();
	port.backend.push_reply("Recv G-code\r\nhoming moving...ok\r\n");
	let lines = port.send_wait_ack("$H").unwrap();
	assert_eq!(lines, ["Recv G-code", "homing moving...ok"]);
	assert_eq!(port.backend.written_lines(), ["$H"]);
}

#[test]
fn send_outcomes() {
	let mut port = Port::open_mock();
	port.backend.push_reply("ok\r\n");
	let outcome = port.send("M50", Wait::Ack).unwrap();
	assert_eq!(outcome, CommandOutcome::Lines(vec!["ok".to_string()]));

	let outcome = port.send("M3S0", Wait::None).unwrap();
	assert_eq!(outcome, CommandOutcome::Sent);
	assert!(outcome.lines().is_empty());
}

#[test]
fn command_is_trimmed_and_terminated() {
	let mut port = Port::open_mock();
	port.options_mut().line_ending(crate::gcode::LineEnding::CrLf);
	port.command("  M50 \n").unwrap();
	assert_eq!(port.backend.written(), b"M50\r\n");
}

#[test]
fn errors() {
	let mut port = Port::open_mock();
	check_err_cases!(port,
		"Recv G-code\r\nUsing reset pos!\r\n" via |p| p.send_wait_ack("M50") => UnexpectedResetError,
		via |p| p.send_wait_ack("M50") => DeadlineExceededError,
		via |p| p.send("$21=true", Wait::Ack) => VariableCommandError,
		"ok\r\n" via |p| p.send("$21=-1", Wait::Ack) => VariableCommandError,
		"ok\r\n" via |p| p.update_status() => DeadlineExceededError,
	);
}

#[test]
fn malformed_variable_command_is_not_transmitted() {
	let mut port = Port::open_mock();
	let err = port.send("$21=true", Wait::Ack).unwrap_err();
	assert!(matches!(err, Error::VariableCommand(_)));
	assert!(port.backend.written().is_empty());

	port.backend.push_reply("ok\r\n");
	port.send("$21=1", Wait::Ack).unwrap();
	assert_eq!(port.backend.written_lines(), ["$21=1"]);
}

#[test]
fn unexpected_reset_keeps_lines() {
	let mut port = Port::open_mock();
	port.backend.push_reply(format!("Recv G-code\r\n{RESET_BANNER}\r\n"));
	let err = port.send_wait_ack("M50").unwrap_err();
	assert!(err.is_unexpected_reset());
	let Error::UnexpectedReset(err) = err else {
		unreachable!()
	};
	assert_eq!(err.lines(), ["Recv G-code", RESET_BANNER]);
}

#[test]
fn wait_for_boot_accepts_the_banner() {
	let mut port = Port::open_mock();
	port.backend
		.append_data(format!("Qinnew Robot\r\n{RESET_BANNER}\r\n"));
	let lines = port.wait_for_boot(Some(Duration::from_secs(1))).unwrap();
	assert_eq!(lines, ["Qinnew Robot", RESET_BANNER]);
}

#[test]
fn stale_input_is_drained() {
	let mut port = Port::open_mock();
	port.backend.append_data("ok\r\nleftover from an earlier command\r\n");
	port.backend.push_reply("fresh\r\nok\r\n");
	let lines = port.send_wait_ack("M50").unwrap();
	assert_eq!(lines, ["fresh", "ok"]);
}

#[test]
fn anomalies_do_not_end_the_response() {
	let mut port = Port::open_mock();
	let anomalies = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&anomalies);
	port.set_anomaly_handler(move |line| sink.lock().unwrap().push(line.clone()));

	port.backend
		.push_reply("error: Bad number format\r\nALARM: Hard limit\r\nok\r\n");
	let lines = port.send_wait_ack("M21 G90 X1000").unwrap();
	assert_eq!(lines.len(), 3);
	assert_eq!(
		*anomalies.lock().unwrap(),
		[
			ResponseLine::ErrorReport("Bad number format".to_string()),
			ResponseLine::AlarmReport("Hard limit".to_string()),
		]
	);
	assert!(port.clear_anomaly_handler().is_some());
}

#[test]
fn line_handler_sees_both_directions() {
	let mut port = Port::open_mock();
	let transcript = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&transcript);
	port.set_line_handler(move |line, direction| {
		sink.lock().unwrap().push((line.to_string(), direction));
	});
	port.backend.push_reply("ok\r\n");
	port.send_wait_ack("M50").unwrap();
	assert_eq!(
		*transcript.lock().unwrap(),
		[
			("M50".to_string(), Direction::Tx),
			("ok".to_string(), Direction::Recv),
		]
	);
	assert!(port.clear_line_handler().is_some());
	assert!(port.clear_line_handler().is_none());
}

#[test]
fn update_status_publishes_snapshot() {
	let mut port = Port::open_mock();
	let handle = port.status_handle();
	assert_eq!(handle.load().state, "");

	port.backend.push_reply(format!("{RUN_REPORT}\r\nok\r\n"));
	let status = port.update_status().unwrap();
	assert_eq!(status.state, "Run");
	assert_eq!(status.angles.joint1, Some(10.0));
	assert_eq!(handle.load().state, "Run");
	assert_eq!(port.status().state, "Run");
}

#[test]
fn unparsable_status_is_retried() {
	let mut port = Port::open_mock();
	port.backend.push_reply("<Idle,garbled>\r\nok\r\n");
	port.backend.push_reply(format!("{IDLE_REPORT}\r\nok\r\n"));
	assert!(port.update_status().unwrap().is_idle());
	assert_eq!(port.backend.written_lines(), ["?", "?"]);
}

#[test]
fn send_wait_idle_polls_until_idle() {
	let mut port = Port::open_mock();
	port.backend.push_reply("ok\r\n");
	port.backend.push_reply(format!("{RUN_REPORT}\r\nok\r\n"));
	port.backend.push_reply(format!("{RUN_REPORT}\r\nok\r\n"));
	port.backend.push_reply(format!("{IDLE_REPORT}\r\nok\r\n"));

	let status = port.send_wait_idle("M21 G90 X10.0 F2000").unwrap();
	assert!(status.is_idle());
	let written = port.backend.written_lines();
	assert_eq!(written[0], "M21 G90 X10.0 F2000");
	assert_eq!(written.iter().filter(|line| *line == "?").count(), 3);
	assert!(port.status().is_idle());
}

#[test]
fn idle_deadline() {
	let mut port = Port::open_mock();
	port.options_mut().idle_deadline(Some(Duration::ZERO));
	port.backend.push_reply("ok\r\n");
	port.backend.push_reply(format!("{RUN_REPORT}\r\nok\r\n"));
	let err = port.send("M21 G90 X10.0", Wait::Idle).unwrap_err();
	assert!(matches!(err, Error::DeadlineExceeded(_)));
}

#[test]
fn cancellation_is_reported_once() {
	let mut port = Port::open_mock();
	let token = port.cancel_token();
	token.cancel();
	assert!(token.is_cancelled());
	let err = port.send_wait_ack("M50").unwrap_err();
	assert!(matches!(err, Error::Cancelled(_)));
	assert!(!token.is_cancelled());

	port.backend.push_reply("ok\r\n");
	port.send_wait_ack("M50").unwrap();
}

#[test]
fn cancel_from_another_thread() {
	let mut port = Port::open_mock();
	port.options_mut().ack_deadline(None);
	let token = port.cancel_token();
	let canceller = std::thread::spawn(move || {
		std::thread::sleep(Duration::from_millis(50));
		token.cancel();
	});
	let err = port.send_wait_ack("M50").unwrap_err();
	assert!(matches!(err, Error::Cancelled(_)));
	canceller.join().unwrap();
}

#[test]
fn poison_is_reported_once() {
	let mut port = Port::open_mock();
	port.poison(io::Error::new(io::ErrorKind::Other, "failed to stop"));
	let err = port.send_wait_ack("M50").unwrap_err();
	assert!(matches!(err, Error::Io(_)));
	assert!(port.backend.written().is_empty());

	port.backend.push_reply("ok\r\n");
	port.send_wait_ack("M50").unwrap();
}

#[test]
fn close_is_idempotent() {
	let mut port = Port::open_mock();
	assert!(port.is_open());
	port.close().unwrap();
	port.close().unwrap();
	assert!(!port.is_open());
	assert_eq!(port.backend.close_calls(), 2);

	let err = port.send_wait_ack("M50").unwrap_err();
	assert!(matches!(err, Error::NotConnected(_)));
}

#[test]
fn io_errors_propagate() {
	let mut port = Port::open_mock();
	port.backend
		.write_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
	let err = port.send("M50", Wait::None).unwrap_err();
	assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
}

#[test]
fn timeout_guard_restores_deadlines() {
	let mut port = Port::open_mock();
	let before = port.options().ack_deadline;
	{
		let mut guard = port.timeout_guard(None).unwrap();
		assert_eq!(guard.options().ack_deadline, None);
		guard.backend.push_reply("ok\r\n");
		guard.send_wait_ack("$HH").unwrap();
	}
	assert_eq!(port.options().ack_deadline, before);
}
