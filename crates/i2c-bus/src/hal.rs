use embassy_time::Duration;
use embedded_hal::digital::PinState;

use crate::config::BusConfig;
use crate::link::Commands;

/// Hardware engine instance identifier.
pub type Port = u8;

/// GPIO number of a bus line.
pub type PinId = u8;

/// GPIO direction used while the engine is detached during recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Input,
    Output,
}

/// Outcome of a failed command-link submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubmitError<E> {
    /// A slave did not acknowledge an ack-checked byte.
    Nack,
    /// The engine did not finish before the timeout elapsed.
    Timeout,
    /// The engine rejected the submission.
    Fault(E),
}

/// Narrow interface to the platform's I2C engine and GPIO block.
///
/// Implementors own whatever peripheral handles the platform needs. The
/// bus only ever calls into it while holding its lock, so methods take
/// `&mut self` and need no internal synchronisation.
#[allow(async_fn_in_trait)]
pub trait BusHardware {
    /// Error type for engine and GPIO failures.
    type Error: core::fmt::Debug;

    /// Configure the engine in master mode with the pins and clock speed
    /// from `config`.
    fn configure(&mut self, config: &BusConfig) -> Result<(), Self::Error>;

    /// Tear down the engine, returning its pins to plain GPIO.
    fn release(&mut self, port: Port) -> Result<(), Self::Error>;

    /// Execute `commands` as one atomic transaction.
    ///
    /// Bytes produced by `Read` commands are written to `rx` back to back,
    /// in command order. `rx` is at least as long as the sum of all read
    /// lengths.
    async fn submit(
        &mut self,
        port: Port,
        commands: Commands<'_>,
        rx: &mut [u8],
        timeout: Duration,
    ) -> Result<(), SubmitError<Self::Error>>;

    fn set_direction(
        &mut self,
        pin: PinId,
        direction: Direction,
    ) -> Result<(), Self::Error>;

    fn set_level(
        &mut self,
        pin: PinId,
        level: PinState,
    ) -> Result<(), Self::Error>;

    /// Busy-wait for `us` microseconds.
    fn delay_us(&mut self, us: u32);
}
