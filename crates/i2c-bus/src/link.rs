//! Command links: pre-built operation sequences submitted as one
//! transaction.
//!
//! A [`CommandLink`] encodes its operations into a caller-provided byte
//! arena, so building a link never allocates. Running out of arena is a
//! [`LinkError`]; the bus reports it as
//! [`BusError::NoMemory`](crate::BusError::NoMemory) before anything
//! reaches the wire. Dropping the link clears the bytes it used.
//!
//! Encoding, one record per operation:
//!
//! | op         | bytes                        |
//! |------------|------------------------------|
//! | START      | `01`                         |
//! | STOP       | `02`                         |
//! | WRITE-BYTE | `03\|ack` byte               |
//! | WRITE      | `04\|ack` len_lo len_hi data |
//! | READ       | `05` ack_mode len_lo len_hi  |

const OP_START: u8 = 0x01;
const OP_STOP: u8 = 0x02;
const OP_WRITE_BYTE: u8 = 0x03;
const OP_WRITE: u8 = 0x04;
const OP_READ: u8 = 0x05;
const ACK_CHECK: u8 = 0x80;

const START_SIZE: usize = 1;
const STOP_SIZE: usize = 1;
const WRITE_BYTE_SIZE: usize = 2;
const WRITE_HEADER_SIZE: usize = 3;
const READ_SIZE: usize = 4;

/// Arena size of the bus-owned command buffer unless chosen otherwise.
pub const DEFAULT_LINK_SIZE: usize = 32;

/// Arena size of one address probe: START, address byte, STOP.
pub const PROBE_LINK_SIZE: usize = START_SIZE + WRITE_BYTE_SIZE + STOP_SIZE;

/// Arena bytes needed by a write-then-read with `write_len` payload bytes,
/// with or without a read phase.
pub const fn link_size(write_len: usize, read: bool) -> usize {
    let mut size = START_SIZE + WRITE_BYTE_SIZE + STOP_SIZE;
    if write_len > 0 {
        size += WRITE_HEADER_SIZE + write_len;
    }
    if read {
        size += START_SIZE + WRITE_BYTE_SIZE + READ_SIZE;
    }
    size
}

/// The operation did not fit in the remaining arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkError;

/// Acknowledge policy for the bytes of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadAck {
    /// ACK every byte.
    Ack,
    /// NACK every byte.
    Nack,
    /// ACK every byte except the last, which is NACKed.
    LastNack,
}

impl ReadAck {
    fn encode(self) -> u8 {
        match self {
            ReadAck::Ack => 0,
            ReadAck::Nack => 1,
            ReadAck::LastNack => 2,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ReadAck::Ack),
            1 => Some(ReadAck::Nack),
            2 => Some(ReadAck::LastNack),
            _ => None,
        }
    }
}

/// One decoded bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    /// START, or repeated START when not first.
    Start,
    /// A single byte, usually the address byte.
    WriteByte { byte: u8, ack_check: bool },
    /// A payload.
    Write { bytes: &'a [u8], ack_check: bool },
    /// Clock in `len` bytes.
    Read { len: usize, ack: ReadAck },
    Stop,
}

/// Builder for one transaction, backed by a fixed arena.
pub struct CommandLink<'a> {
    arena: &'a mut [u8],
    len: usize,
}

impl<'a> CommandLink<'a> {
    /// An empty link writing into `arena`.
    pub fn new(arena: &'a mut [u8]) -> Self {
        Self { arena, len: 0 }
    }

    /// Append a START, or a repeated START after earlier records.
    pub fn start(&mut self) -> Result<(), LinkError> {
        self.reserve(START_SIZE)?[0] = OP_START;
        Ok(())
    }

    /// Append a STOP.
    pub fn stop(&mut self) -> Result<(), LinkError> {
        self.reserve(STOP_SIZE)?[0] = OP_STOP;
        Ok(())
    }

    /// Append a single byte, typically the address byte.
    pub fn write_byte(
        &mut self,
        byte: u8,
        ack_check: bool,
    ) -> Result<(), LinkError> {
        let record = self.reserve(WRITE_BYTE_SIZE)?;
        record[0] = OP_WRITE_BYTE | ack_flag(ack_check);
        record[1] = byte;
        Ok(())
    }

    /// Append a payload. An empty payload adds nothing.
    pub fn write(
        &mut self,
        bytes: &[u8],
        ack_check: bool,
    ) -> Result<(), LinkError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let len = u16::try_from(bytes.len()).map_err(|_| LinkError)?;
        let record = self.reserve(WRITE_HEADER_SIZE + bytes.len())?;
        record[0] = OP_WRITE | ack_flag(ack_check);
        record[1..3].copy_from_slice(&len.to_le_bytes());
        record[3..].copy_from_slice(bytes);
        Ok(())
    }

    /// Append a read of `len` bytes. A zero-length read adds nothing.
    pub fn read(&mut self, len: usize, ack: ReadAck) -> Result<(), LinkError> {
        if len == 0 {
            return Ok(());
        }
        let len = u16::try_from(len).map_err(|_| LinkError)?;
        let record = self.reserve(READ_SIZE)?;
        record[0] = OP_READ;
        record[1] = ack.encode();
        record[2..4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }

    /// Arena bytes used so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing arena.
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Total number of bytes the link's reads will produce.
    pub fn read_len(&self) -> usize {
        self.commands()
            .map(|command| match command {
                Command::Read { len, .. } => len,
                _ => 0,
            })
            .sum()
    }

    /// Decode the records appended so far.
    pub fn commands(&self) -> Commands<'_> {
        Commands { bytes: &self.arena[..self.len] }
    }

    fn reserve(&mut self, size: usize) -> Result<&mut [u8], LinkError> {
        let end = self
            .len
            .checked_add(size)
            .filter(|&end| end <= self.arena.len())
            .ok_or(LinkError)?;
        let record = &mut self.arena[self.len..end];
        self.len = end;
        Ok(record)
    }
}

impl Drop for CommandLink<'_> {
    fn drop(&mut self) {
        self.arena[..self.len].fill(0);
        trace!("command link torn down ({=usize} bytes)", self.len);
        self.len = 0;
    }
}

fn ack_flag(ack_check: bool) -> u8 {
    if ack_check {
        ACK_CHECK
    } else {
        0
    }
}

/// Iterator over the operations of a [`CommandLink`].
#[derive(Debug, Clone)]
pub struct Commands<'a> {
    bytes: &'a [u8],
}

impl<'a> Iterator for Commands<'a> {
    type Item = Command<'a>;

    fn next(&mut self) -> Option<Command<'a>> {
        let (&op, rest) = self.bytes.split_first()?;
        let ack_check = op & ACK_CHECK != 0;

        let (command, rest) = match op & !ACK_CHECK {
            OP_START => (Command::Start, rest),
            OP_STOP => (Command::Stop, rest),
            OP_WRITE_BYTE => {
                let (&byte, rest) = rest.split_first()?;
                (Command::WriteByte { byte, ack_check }, rest)
            }
            OP_WRITE => {
                let (len, rest) = split_len(rest)?;
                if rest.len() < len {
                    return None;
                }
                let (bytes, rest) = rest.split_at(len);
                (Command::Write { bytes, ack_check }, rest)
            }
            OP_READ => {
                let (&raw_ack, rest) = rest.split_first()?;
                let ack = ReadAck::decode(raw_ack)?;
                let (len, rest) = split_len(rest)?;
                (Command::Read { len, ack }, rest)
            }
            _ => return None,
        };

        self.bytes = rest;
        Some(command)
    }
}

fn split_len(bytes: &[u8]) -> Option<(usize, &[u8])> {
    if bytes.len() < 2 {
        return None;
    }
    let (len, rest) = bytes.split_at(2);
    Some((u16::from_le_bytes([len[0], len[1]]) as usize, rest))
}
