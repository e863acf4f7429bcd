#![no_std]
//! Shared I2C bus transaction engine.
//!
//! One [`Bus`] owns the physical two-wire bus: its configuration, a mutex
//! and a fixed-size command arena. Sensor and actuator drivers share it by
//! reference and issue register-level transactions through it. Every
//! transaction holds the bus lock from command-link construction to
//! teardown, so a write-then-read with a repeated START (or a full address
//! scan) is never interleaved with another caller.
//!
//! When the hardware engine reports a timeout, usually because a slave is
//! holding SDA low, the bus is recovered in place before the lock is
//! released: SCL is clocked by hand and the engine is reinitialised. The
//! failed transaction is reported as [`BusError::Timeout`] and is never
//! retried here.
//!
//! ```ignore
//! static BUS: StaticCell<Bus<CriticalSectionRawMutex, Twim0>> = StaticCell::new();
//!
//! let bus = BUS.init(Bus::new(twim, BusConfig::new(0, 0, 2, 100_000))?);
//! bus.detect_and_log().await;
//! let status = bus.read_byte(CHARGER_ADDR, REG_STATUS).await?;
//! ```

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod bus;
mod config;
mod device;
mod error;
mod hal;
mod link;
mod recovery;
mod scan;

pub use bus::Bus;
pub use config::{
    BusConfig, DEFAULT_SPEED_HZ, TRANSACTION_TIMEOUT, UNSTICK_CYCLES,
};
pub use device::I2cDevice;
pub use error::BusError;
pub use hal::{BusHardware, Direction, PinId, Port, SubmitError};
pub use link::{
    link_size, Command, CommandLink, Commands, LinkError, ReadAck,
    DEFAULT_LINK_SIZE, PROBE_LINK_SIZE,
};
pub use recovery::unstick;
pub use scan::{AddressSet, MAX_ADDRESS};

pub use embedded_hal::digital::PinState;
