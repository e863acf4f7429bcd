use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use heapless::Vec;

use crate::bus::{check_address, Bus};
use crate::error::BusError;
use crate::hal::BusHardware;
use crate::link::{CommandLink, LinkError, ReadAck};

/// `embedded-hal-async` I2C device backed by a shared [`Bus`].
///
/// Each [`I2c::transaction`] becomes one command link executed under one
/// hold of the bus lock. Reads are staged in an `N`-byte buffer, so a
/// transaction can read at most as many bytes as the command arena holds.
pub struct I2cDevice<'a, M: RawMutex, H: BusHardware, const N: usize> {
    bus: &'a Bus<M, H, N>,
}

impl<'a, M: RawMutex, H: BusHardware, const N: usize> I2cDevice<'a, M, H, N> {
    pub(crate) fn new(bus: &'a Bus<M, H, N>) -> Self {
        Self { bus }
    }

    /// Returns a reference to the underlying bus.
    #[inline]
    pub fn bus(&self) -> &'a Bus<M, H, N> {
        self.bus
    }
}

impl<M: RawMutex, H: BusHardware, const N: usize> Clone
    for I2cDevice<'_, M, H, N>
{
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<M: RawMutex, H: BusHardware, const N: usize> ErrorType
    for I2cDevice<'_, M, H, N>
{
    type Error = BusError<H::Error>;
}

impl<M: RawMutex, H: BusHardware, const N: usize> I2c<SevenBitAddress>
    for I2cDevice<'_, M, H, N>
{
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        check_address::<H::Error>(address)?;
        if operations.iter().all(is_empty_read) {
            return Ok(());
        }

        let read_len = operations
            .iter()
            .map(|op| match op {
                Operation::Read(buf) => buf.len(),
                Operation::Write(_) => 0,
            })
            .sum();
        let mut staging: Vec<u8, N> = Vec::new();
        if staging.resize(read_len, 0).is_err() {
            return Err(BusError::NoMemory);
        }

        let timeout = self.bus.config().timeout;
        self.bus
            .execute(timeout, &mut staging[..], |link| {
                build_transaction(link, address, operations)
            })
            .await?;

        let mut staged = &staging[..];
        for op in operations.iter_mut() {
            if let Operation::Read(buf) = op {
                let (head, tail) = staged.split_at(buf.len());
                buf.copy_from_slice(head);
                staged = tail;
            }
        }
        Ok(())
    }
}

fn is_empty_read(op: &Operation<'_>) -> bool {
    matches!(op, Operation::Read(buf) if buf.is_empty())
}

/// Consecutive operations of the same direction share one addressed
/// phase. The final byte before a direction change or STOP is NACKed.
/// Empty reads put nothing on the wire and are skipped entirely.
fn build_transaction(
    link: &mut CommandLink<'_>,
    address: u8,
    operations: &[Operation<'_>],
) -> Result<(), LinkError> {
    let mut previous_read = None;

    for (i, op) in operations.iter().enumerate() {
        let is_read = match op {
            Operation::Read(buf) if buf.is_empty() => continue,
            Operation::Read(_) => true,
            Operation::Write(_) => false,
        };
        if previous_read != Some(is_read) {
            link.start()?;
            link.write_byte((address << 1) | u8::from(is_read), true)?;
        }

        match op {
            Operation::Write(bytes) => link.write(bytes, true)?,
            Operation::Read(buf) => {
                let next = operations[i + 1..]
                    .iter()
                    .find(|op| !is_empty_read(op));
                let ack = match next {
                    Some(Operation::Read(_)) => ReadAck::Ack,
                    _ => ReadAck::LastNack,
                };
                link.read(buf.len(), ack)?;
            }
        }
        previous_read = Some(is_read);
    }

    link.stop()
}
