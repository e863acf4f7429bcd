use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::bus::{dispatch, Bus};
use crate::error::BusError;
use crate::hal::BusHardware;
use crate::link::{CommandLink, LinkError, PROBE_LINK_SIZE};

/// Highest 7-bit address.
pub const MAX_ADDRESS: u8 = 0x7F;

/// Membership record over the 7-bit address space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressSet(u128);

impl AddressSet {
    /// An empty set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Returns `false` if `address` is not a 7-bit address.
    pub fn insert(&mut self, address: u8) -> bool {
        if address > MAX_ADDRESS {
            return false;
        }
        self.0 |= 1u128 << address;
        true
    }

    /// Addresses above the 7-bit range are ignored.
    pub fn remove(&mut self, address: u8) {
        if address <= MAX_ADDRESS {
            self.0 &= !(1u128 << address);
        }
    }

    /// Whether `address` acknowledged its probe.
    pub fn contains(&self, address: u8) -> bool {
        address <= MAX_ADDRESS && self.0 & (1u128 << address) != 0
    }

    /// Number of present addresses.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Present addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_ADDRESS).filter(move |&address| self.contains(address))
    }
}

impl FromIterator<u8> for AddressSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = AddressSet::new();
        for address in iter {
            set.insert(address);
        }
        set
    }
}

fn probe(link: &mut CommandLink<'_>, address: u8) -> Result<(), LinkError> {
    link.start()?;
    link.write_byte(address << 1, true)?;
    link.stop()
}

impl<M: RawMutex, H: BusHardware, const N: usize> Bus<M, H, N> {
    /// Probe every 7-bit address with an empty write.
    ///
    /// The bus lock is held for the whole scan. An address is present iff
    /// its probe is acknowledged. A timeout aborts the scan: the bus has
    /// already been recovered by then, and the remaining results would not
    /// mean anything.
    pub async fn scan(&self) -> Result<AddressSet, BusError<H::Error>> {
        let mut guard = self.state.lock().await;
        let inner = &mut *guard;
        inner.ensure_ready::<H::Error>()?;

        let mut arena = [0u8; PROBE_LINK_SIZE];
        let mut found = AddressSet::new();

        for address in 0..=MAX_ADDRESS {
            let mut link = CommandLink::new(&mut arena);
            if probe(&mut link, address).is_err() {
                continue;
            }

            match dispatch(
                &mut inner.hw,
                &mut inner.phase,
                &self.config,
                &link,
                &mut [],
                self.config.timeout,
            )
            .await
            {
                Ok(()) => {
                    found.insert(address);
                }
                Err(BusError::Nack) => {}
                Err(err) => {
                    error!(
                        "scan of bus {=u8} aborted at {=u8:#x}: {=str}",
                        self.config.port,
                        address,
                        err.as_str()
                    );
                    return Err(err);
                }
            }
        }

        Ok(found)
    }

    /// Scan the bus and log what answered. Diagnostic only.
    pub async fn detect_and_log(
        &self,
    ) -> Result<AddressSet, BusError<H::Error>> {
        info!("Scanning i2c bus {=u8} for devices", self.config.port);

        let result = self.scan().await;
        match &result {
            Ok(devices) => {
                info!("=== Detected devices ===");
                for address in devices.iter() {
                    info!("  {=u8:#x}", address);
                }
                info!("========================");
            }
            Err(err) => {
                error!(
                    "Failed to scan bus {=u8}: {=str}",
                    self.config.port,
                    err.as_str()
                );
            }
        }
        result
    }
}
