//! Continuously print distances from two VL6180X sensors sharing the
//! Raspberry Pi's I²C bus.
//!
//! Wiring: both sensors on i2c-1, XSHUT lines on BCM 17 and 27. Run with
//! `RUST_LOG=debug` to watch the address assignment.

use std::thread;
use std::time::{Duration, Instant};

use rppal::{gpio::Gpio, hal::Delay, i2c::I2c};
use tracing_subscriber::EnvFilter;
use vl6180x_multi::{MultiSensor, SensorConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let gpio = Gpio::new()?;
    let mut delay = Delay::new();

    let mut sensors = MultiSensor::new(
        [
            SensorConfig {
                i2c: I2c::new()?,
                xshut: gpio.get(17)?.into_output_low(),
                address: 0x2a,
                offset_mm: 0,
            },
            SensorConfig {
                i2c: I2c::new()?,
                xshut: gpio.get(27)?.into_output_low(),
                address: 0x2b,
                offset_mm: 0,
            },
        ],
        &mut delay,
    )?;

    loop {
        let start = Instant::now();

        for (i, sensor) in sensors.sensors_mut().enumerate() {
            let distance = sensor.range(&mut delay)?;
            print!("sensor {i} ({:#04x}): {distance:3} mm   ", sensor.address());
        }
        println!("({:.0?})", start.elapsed());

        thread::sleep(Duration::from_millis(40));
    }
}
