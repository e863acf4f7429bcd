/// Errors that can occur during bus operations.
///
/// `E` is the error type of the [`BusHardware`](crate::BusHardware)
/// implementation backing the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError<E: core::fmt::Debug> {
    /// A slave did not acknowledge its address or a written byte.
    Nack,
    /// The hardware engine did not complete within the timeout. The bus
    /// has already been recovered when this is returned.
    Timeout,
    /// The transaction does not fit in the command arena. Nothing was put
    /// on the wire.
    NoMemory,
    /// The address does not fit in 7 bits.
    InvalidAddress(u8),
    /// The bus configuration was rejected before touching the hardware.
    InvalidConfig,
    /// Engine or GPIO configuration failed, during init or recovery.
    Config(E),
    /// The engine rejected a submission. No recovery was attempted and the
    /// bus stays usable.
    Fault(E),
    /// An earlier recovery failed; the bus can no longer be trusted.
    Poisoned,
}

impl<E: core::fmt::Debug> BusError<E> {
    /// Short, allocation-free description used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            BusError::Nack => "nack",
            BusError::Timeout => "timeout",
            BusError::NoMemory => "command link exceeds arena",
            BusError::InvalidAddress(_) => "invalid 7-bit address",
            BusError::InvalidConfig => "invalid bus configuration",
            BusError::Config(_) => "hardware configuration fault",
            BusError::Fault(_) => "submission rejected by engine",
            BusError::Poisoned => "bus poisoned",
        }
    }

    /// Whether this error leaves the bus unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BusError::Config(_) | BusError::Poisoned)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for BusError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::InvalidAddress(address) => {
                write!(f, "Invalid 7-bit address: {:#04x}", address)
            }
            BusError::Config(err) => {
                write!(f, "Hardware configuration fault: {:?}", err)
            }
            BusError::Fault(err) => {
                write!(f, "Submission rejected by engine: {:?}", err)
            }
            other => f.write_str(other.as_str()),
        }
    }
}

impl<E: core::fmt::Debug> embedded_hal::i2c::Error for BusError<E> {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            BusError::Nack => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
            }
            BusError::Timeout => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}
