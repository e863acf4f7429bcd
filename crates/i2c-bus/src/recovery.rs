use embedded_hal::digital::PinState;

use crate::config::BusConfig;
use crate::hal::{BusHardware, Direction};

/// Free a bus whose data line is held low by a slave.
///
/// Detaches the engine, releases SDA, and clocks SCL
/// `config.unstick_cycles` times at one bit time per half-period so that a
/// slave stuck mid-transfer can shift out its remaining bits and let go
/// of SDA. The engine is then reconfigured with `config`. No verification
/// read is done.
///
/// Any failure here leaves the bus in an unknown state and must be treated
/// as fatal by the caller.
pub fn unstick<H: BusHardware>(
    hw: &mut H,
    config: &BusConfig,
) -> Result<(), H::Error> {
    hw.release(config.port)?;

    // Don't fight the slave on SDA.
    hw.set_direction(config.sda, Direction::Input)?;
    hw.set_direction(config.scl, Direction::Output)?;

    let half_period_us = config.bit_time_us();
    for _ in 0..config.unstick_cycles {
        hw.set_level(config.scl, PinState::Low)?;
        hw.delay_us(half_period_us);
        hw.set_level(config.scl, PinState::High)?;
        hw.delay_us(half_period_us);
    }

    debug!(
        "I2C bus {=u8}: {=u32} SCL pulses issued, reinitialising",
        config.port,
        config.unstick_cycles
    );

    hw.configure(config)
}
