#![allow(missing_docs)]

use mirobot::arm::{rover::RoverMotion, Arm};
use simple_logger::SimpleLogger;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new().init().unwrap();

    let mut arm = Arm::open_auto()?;
    arm.home_simultaneous()?;

    // Timed moves stop on their own.
    arm.rover_forward(Some(Duration::from_secs(1)))?;
    arm.rover_rotate_left(Some(Duration::from_millis(500)))?;

    // Open-ended moves stop when the guard goes out of scope, even on error.
    {
        let mut guard = arm.rover_start(RoverMotion::Backward)?;
        while guard.update_status()?.cartesian.x.unwrap_or(0.0) > 150.0 {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    // Ctrl-C style cancellation from another thread also stops the arm.
    let token = arm.port().cancel_token();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(2));
        token.cancel();
    });
    match arm.rover_left(Some(Duration::from_secs(60))) {
        Err(mirobot::error::Error::Cancelled(_)) => println!("stopped early"),
        other => {
            other?;
        }
    }
    Ok(())
}
