use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Duration;

use crate::config::BusConfig;
use crate::device::I2cDevice;
use crate::error::BusError;
use crate::hal::{BusHardware, SubmitError};
use crate::link::{CommandLink, LinkError, ReadAck, DEFAULT_LINK_SIZE};
use crate::recovery;
use crate::scan::MAX_ADDRESS;

/// Health state of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Engine configured; transactions may be submitted.
    Ready,
    /// Recovery hit a configuration fault. Nothing is submitted anymore.
    Poisoned,
}

/// Everything guarded by the bus lock.
pub(crate) struct Inner<H, const N: usize> {
    pub(crate) hw: H,
    pub(crate) phase: Phase,
    pub(crate) arena: [u8; N],
}

impl<H, const N: usize> Inner<H, N> {
    pub(crate) fn ensure_ready<E: core::fmt::Debug>(
        &self,
    ) -> Result<(), BusError<E>> {
        match self.phase {
            Phase::Ready => Ok(()),
            Phase::Poisoned => Err(BusError::Poisoned),
        }
    }
}

/// A shared I2C bus.
///
/// Created once at startup and handed to every driver by reference. `M`
/// selects the lock flavour (`CriticalSectionRawMutex` when drivers run on
/// different executors, `NoopRawMutex` when they share one). `N` is the
/// size of the command arena and bounds the largest transaction the bus
/// can carry; see [`link_size`](crate::link_size).
pub struct Bus<M: RawMutex, H: BusHardware, const N: usize = DEFAULT_LINK_SIZE>
{
    pub(crate) config: BusConfig,
    pub(crate) state: Mutex<M, Inner<H, N>>,
}

impl<M: RawMutex, H: BusHardware, const N: usize> Bus<M, H, N> {
    /// Configure the engine in master mode and create the bus.
    pub fn new(
        mut hw: H,
        config: BusConfig,
    ) -> Result<Self, BusError<H::Error>> {
        config.validate::<H::Error>()?;
        hw.configure(&config).map_err(BusError::Config)?;

        info!(
            "I2C bus {=u8} up: sda={=u8} scl={=u8} {=u32} Hz",
            config.port,
            config.sda,
            config.scl,
            config.speed_hz
        );

        Ok(Self {
            config,
            state: Mutex::new(Inner { hw, phase: Phase::Ready, arena: [0; N] }),
        })
    }

    /// The configuration the bus was created with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Tear down the engine and hand the hardware back.
    ///
    /// On failure the hardware is returned alongside the error so it is
    /// not lost.
    pub fn release(self) -> Result<H, (BusError<H::Error>, H)> {
        let port = self.config.port;
        let mut inner = self.state.into_inner();
        match inner.hw.release(port) {
            Ok(()) => Ok(inner.hw),
            Err(err) => Err((BusError::Config(err), inner.hw)),
        }
    }

    /// Returns `Some(true)` if poisoned, `Some(false)` if usable, `None`
    /// if the bus is busy.
    ///
    /// This is a non-blocking best-effort check using `try_lock`.
    pub fn is_poisoned(&self) -> Option<bool> {
        self.state
            .try_lock()
            .ok()
            .map(|inner| inner.phase == Phase::Poisoned)
    }

    /// An `embedded-hal-async` view of the bus for off-the-shelf drivers.
    pub fn device(&self) -> I2cDevice<'_, M, H, N> {
        I2cDevice::new(self)
    }

    /// Build a command link in the bus arena and run it.
    ///
    /// The lock is held from construction to teardown. `build` failing
    /// means the link did not fit: the link is torn down and
    /// [`BusError::NoMemory`] returned without touching the hardware. On a
    /// hardware timeout the bus is recovered before the lock is released
    /// and [`BusError::Timeout`] is returned.
    pub async fn execute<F>(
        &self,
        timeout: Duration,
        rx: &mut [u8],
        build: F,
    ) -> Result<(), BusError<H::Error>>
    where
        F: FnOnce(&mut CommandLink<'_>) -> Result<(), LinkError>,
    {
        let mut guard = self.state.lock().await;
        let inner = &mut *guard;
        inner.ensure_ready::<H::Error>()?;

        let mut link = CommandLink::new(&mut inner.arena);
        build(&mut link).map_err(|_| {
            warn!("command link does not fit in {=usize} bytes", N);
            BusError::<H::Error>::NoMemory
        })?;
        if link.read_len() > rx.len() {
            return Err(BusError::NoMemory);
        }

        dispatch(
            &mut inner.hw,
            &mut inner.phase,
            &self.config,
            &link,
            rx,
            timeout,
        )
        .await
    }

    /// Write `write` to `address`, then, if `read` is not empty, read into
    /// it after a repeated START. The last byte read is NACKed.
    pub async fn write_then_read(
        &self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), BusError<H::Error>> {
        check_address::<H::Error>(address)?;
        let read_len = read.len();

        self.execute(self.config.timeout, read, |link| {
            link.start()?;
            link.write_byte(address << 1, true)?;
            link.write(write, true)?;
            if read_len > 0 {
                link.start()?;
                link.write_byte((address << 1) | 1, true)?;
                link.read(read_len, ReadAck::LastNack)?;
            }
            link.stop()
        })
        .await
    }

    /// Read one register.
    pub async fn read_byte(
        &self,
        address: u8,
        register: u8,
    ) -> Result<u8, BusError<H::Error>> {
        let mut value = [0u8];
        self.write_then_read(address, &[register], &mut value).await?;
        Ok(value[0])
    }

    /// Write one register. A single write phase, no repeated START.
    pub async fn write_byte(
        &self,
        address: u8,
        register: u8,
        value: u8,
    ) -> Result<(), BusError<H::Error>> {
        self.write_then_read(address, &[register, value], &mut []).await
    }

    /// Burst-read consecutive registers starting at `register`.
    pub async fn read_bytes(
        &self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), BusError<H::Error>> {
        self.write_then_read(address, &[register], buf).await
    }

    /// Burst-write consecutive registers starting at `register`.
    pub async fn write_bytes(
        &self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<(), BusError<H::Error>> {
        check_address::<H::Error>(address)?;
        self.execute(self.config.timeout, &mut [], |link| {
            link.start()?;
            link.write_byte(address << 1, true)?;
            link.write(&[register], true)?;
            link.write(data, true)?;
            link.stop()
        })
        .await
    }
}

pub(crate) fn check_address<E: core::fmt::Debug>(
    address: u8,
) -> Result<(), BusError<E>> {
    if address > MAX_ADDRESS {
        return Err(BusError::InvalidAddress(address));
    }
    Ok(())
}

/// Submit a built link and interpret the result. Caller holds the lock.
pub(crate) async fn dispatch<H: BusHardware>(
    hw: &mut H,
    phase: &mut Phase,
    config: &BusConfig,
    link: &CommandLink<'_>,
    rx: &mut [u8],
    timeout: Duration,
) -> Result<(), BusError<H::Error>> {
    match hw.submit(config.port, link.commands(), rx, timeout).await {
        Ok(()) => Ok(()),
        Err(SubmitError::Nack) => Err(BusError::Nack),
        Err(SubmitError::Fault(err)) => Err(BusError::Fault(err)),
        Err(SubmitError::Timeout) => {
            error!(
                "I2C bus {=u8} timeout, trying to unstick bus",
                config.port
            );
            if let Err(err) = recovery::unstick(hw, config) {
                error!(
                    "I2C bus {=u8} recovery failed, poisoning",
                    config.port
                );
                *phase = Phase::Poisoned;
                return Err(BusError::Config(err));
            }
            warn!("I2C bus {=u8} recovered", config.port);
            Err(BusError::Timeout)
        }
    }
}
