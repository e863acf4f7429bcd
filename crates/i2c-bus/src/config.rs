use embassy_time::Duration;

use crate::error::BusError;
use crate::hal::{PinId, Port};

/// Standard-mode clock speed.
pub const DEFAULT_SPEED_HZ: u32 = 100_000;

/// Hardware completion timeout applied to every transaction.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(100);

/// SCL pulses issued when unsticking the bus.
///
/// Nine pulses free a slave stuck mid-byte; 32 also covers a slave that is
/// partway through a multi-byte handshake.
pub const UNSTICK_CYCLES: u32 = 32;

/// Static configuration of one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// Hardware engine instance.
    pub port: Port,
    /// Data line.
    pub sda: PinId,
    /// Clock line.
    pub scl: PinId,
    /// Clock speed in Hz.
    pub speed_hz: u32,
    /// Hardware completion timeout for each transaction.
    pub timeout: Duration,
    /// Number of SCL low/high cycles issued during recovery.
    pub unstick_cycles: u32,
}

impl BusConfig {
    /// A configuration with the default timeout and unstick cycle count.
    pub const fn new(
        port: Port,
        sda: PinId,
        scl: PinId,
        speed_hz: u32,
    ) -> Self {
        Self {
            port,
            sda,
            scl,
            speed_hz,
            timeout: TRANSACTION_TIMEOUT,
            unstick_cycles: UNSTICK_CYCLES,
        }
    }

    /// Override the per-transaction hardware timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the number of SCL cycles issued during recovery.
    pub const fn with_unstick_cycles(mut self, cycles: u32) -> Self {
        self.unstick_cycles = cycles;
        self
    }

    /// One bit time at the configured clock speed, rounded up to whole
    /// microseconds. Used as the half-period of each recovery pulse.
    pub const fn bit_time_us(&self) -> u32 {
        if self.speed_hz == 0 {
            return 0;
        }
        1_000_000u32.div_ceil(self.speed_hz)
    }

    pub(crate) fn validate<E: core::fmt::Debug>(
        &self,
    ) -> Result<(), BusError<E>> {
        if self.speed_hz == 0
            || self.sda == self.scl
            || self.unstick_cycles == 0
        {
            return Err(BusError::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new(0, 0, 2, DEFAULT_SPEED_HZ)
    }
}
