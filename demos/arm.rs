#![allow(missing_docs)]

use mirobot::{
    arm::{Arm, ToolType},
    gcode::{Angles, Cartesian},
};
use simple_logger::SimpleLogger;
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new().init().unwrap();

    // Open the port, wait for the arm to boot, and home it.
    let mut arm = Arm::open_serial("/dev/ttyUSB0")?;
    arm.home_simultaneous()?;

    // Watch the arm's status from another thread while it moves.
    let status = arm.port().status_handle();
    let watcher = thread::spawn(move || {
        for _ in 0..20 {
            let snapshot = status.load();
            println!("{} at {:?}", snapshot.state, snapshot.cartesian);
            thread::sleep(Duration::from_millis(250));
        }
    });

    // Swing joint 1 out and back, then draw a small square with the tool.
    arm.go_to_axis(&Angles { joint1: Some(45.0), ..Angles::default() }, Some(1000))?;
    arm.increment_axis(&Angles { joint1: Some(-45.0), ..Angles::default() }, None)?;
    let start = arm.update_status()?.cartesian;
    for (dx, dy) in [(20.0, 0.0), (0.0, 20.0), (-20.0, 0.0), (0.0, -20.0)] {
        arm.increment_cartesian_lin(
            &Cartesian { x: Some(dx), y: Some(dy), ..Cartesian::default() },
            None,
        )?;
    }
    arm.go_to_cartesian_ptp(&start, None)?;

    // Pick something up with the suction cup.
    arm.set_tool_type(ToolType::SuctionCup)?;
    arm.pump_suction()?;
    arm.increment_cartesian_ptp(&Cartesian { z: Some(50.0), ..Cartesian::default() }, None)?;
    arm.pump_off()?;

    watcher.join().unwrap();
    Ok(())
}
