//! Simulated bus hardware shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Duration;
use i2c_bus::{
    Bus, BusConfig, BusHardware, Command, Commands, Direction, PinId,
    PinState, Port, ReadAck, SubmitError,
};

pub type TestBus = Bus<NoopRawMutex, MockHardware>;

pub const SDA: PinId = 21;
pub const SCL: PinId = 22;

pub fn config() -> BusConfig {
    BusConfig::new(0, SDA, SCL, 100_000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// What the simulated wire saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Start,
    Address(u8),
    Write(Vec<u8>),
    Read(usize, ReadAck),
    Stop,
}

/// Everything that is not wire traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hw {
    Configure(BusConfig),
    Release(Port),
    Direction(PinId, Direction),
    Level(PinId, PinState),
    Delay(u32),
}

/// Wire and hardware events in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Wire(Wire),
    Hw(Hw),
}

/// A register-file slave with an auto-incrementing register pointer.
struct Slave {
    registers: [u8; 256],
    pointer: u8,
}

#[derive(Default)]
struct SimState {
    slaves: HashMap<u8, Slave>,
    wire: Vec<Wire>,
    hw: Vec<Hw>,
    timeline: Vec<Event>,
    submits: usize,
    timeouts: Vec<Duration>,
    /// Addressing this slave makes the engine time out.
    wedged: Option<u8>,
    fail_configure: bool,
    fail_gpio: bool,
    /// Make the engine reject every submission.
    fail_submit: bool,
    /// Yield to the executor after every command.
    yield_between_commands: bool,
}

/// Handle used by tests to set up and inspect the simulation.
#[derive(Clone, Default)]
pub struct Sim {
    state: Rc<RefCell<SimState>>,
}

impl Sim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hardware(&self) -> MockHardware {
        MockHardware { state: self.state.clone() }
    }

    pub fn add_slave(&self, address: u8) -> &Self {
        self.state
            .borrow_mut()
            .slaves
            .insert(address, Slave { registers: [0; 256], pointer: 0 });
        self
    }

    pub fn set_register(&self, address: u8, register: u8, value: u8) {
        let mut state = self.state.borrow_mut();
        let slave = state.slaves.get_mut(&address).expect("no such slave");
        slave.registers[register as usize] = value;
    }

    pub fn register(&self, address: u8, register: u8) -> u8 {
        self.state.borrow().slaves[&address].registers[register as usize]
    }

    pub fn wedge(&self, address: u8) {
        self.state.borrow_mut().wedged = Some(address);
    }

    pub fn unwedge(&self) {
        self.state.borrow_mut().wedged = None;
    }

    pub fn fail_configure(&self, fail: bool) {
        self.state.borrow_mut().fail_configure = fail;
    }

    pub fn fail_gpio(&self, fail: bool) {
        self.state.borrow_mut().fail_gpio = fail;
    }

    pub fn fail_submit(&self, fail: bool) {
        self.state.borrow_mut().fail_submit = fail;
    }

    pub fn yield_between_commands(&self, enable: bool) {
        self.state.borrow_mut().yield_between_commands = enable;
    }

    pub fn wire(&self) -> Vec<Wire> {
        self.state.borrow().wire.clone()
    }

    pub fn hw(&self) -> Vec<Hw> {
        self.state.borrow().hw.clone()
    }

    pub fn timeline(&self) -> Vec<Event> {
        self.state.borrow().timeline.clone()
    }

    pub fn submits(&self) -> usize {
        self.state.borrow().submits
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.state.borrow().timeouts.clone()
    }

    pub fn configure_count(&self) -> usize {
        self.hw()
            .iter()
            .filter(|event| matches!(event, Hw::Configure(_)))
            .count()
    }

    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.wire.clear();
        state.hw.clear();
        state.timeline.clear();
        state.submits = 0;
        state.timeouts.clear();
    }
}

/// Count of `Start` conditions on the wire.
pub fn starts(wire: &[Wire]) -> usize {
    wire.iter().filter(|w| **w == Wire::Start).count()
}

pub struct MockHardware {
    state: Rc<RefCell<SimState>>,
}

/// Outcome of feeding one command to the simulated slaves.
enum Step {
    Continue,
    Nack,
    Timeout,
}

/// Per-submission decoding state.
#[derive(Default)]
struct Transfer {
    /// Next command is the address byte.
    expect_address: bool,
    /// Selected slave and read intent.
    target: Option<(u8, bool)>,
    /// The next written byte sets the register pointer.
    expect_register: bool,
    rx_pos: usize,
}

impl SimState {
    fn push_wire(&mut self, event: Wire) {
        self.timeline.push(Event::Wire(event.clone()));
        self.wire.push(event);
    }

    fn push_hw(&mut self, event: Hw) {
        self.timeline.push(Event::Hw(event.clone()));
        self.hw.push(event);
    }

    fn step(
        &mut self,
        command: Command<'_>,
        transfer: &mut Transfer,
        rx: &mut [u8],
    ) -> Step {
        match command {
            Command::Start => {
                self.push_wire(Wire::Start);
                transfer.expect_address = true;
            }
            Command::Stop => {
                self.push_wire(Wire::Stop);
                transfer.target = None;
            }
            Command::WriteByte { byte, .. } if transfer.expect_address => {
                self.push_wire(Wire::Address(byte));
                transfer.expect_address = false;
                let address = byte >> 1;
                if self.wedged == Some(address) {
                    return Step::Timeout;
                }
                if !self.slaves.contains_key(&address) {
                    return Step::Nack;
                }
                transfer.target = Some((address, byte & 1 == 1));
                transfer.expect_register = byte & 1 == 0;
            }
            Command::WriteByte { byte, .. } => {
                self.push_wire(Wire::Write(vec![byte]));
                self.write_data(&[byte], transfer);
            }
            Command::Write { bytes, .. } => {
                self.push_wire(Wire::Write(bytes.to_vec()));
                self.write_data(bytes, transfer);
            }
            Command::Read { len, ack } => {
                self.push_wire(Wire::Read(len, ack));
                if let Some((address, true)) = transfer.target {
                    let slave = self.slaves.get_mut(&address).unwrap();
                    for _ in 0..len {
                        rx[transfer.rx_pos] =
                            slave.registers[slave.pointer as usize];
                        slave.pointer = slave.pointer.wrapping_add(1);
                        transfer.rx_pos += 1;
                    }
                }
            }
        }
        Step::Continue
    }

    fn write_data(&mut self, bytes: &[u8], transfer: &mut Transfer) {
        let Some((address, false)) = transfer.target else {
            return;
        };
        let slave = self.slaves.get_mut(&address).unwrap();
        for &byte in bytes {
            if transfer.expect_register {
                slave.pointer = byte;
                transfer.expect_register = false;
            } else {
                slave.registers[slave.pointer as usize] = byte;
                slave.pointer = slave.pointer.wrapping_add(1);
            }
        }
    }
}

impl BusHardware for MockHardware {
    type Error = MockError;

    fn configure(&mut self, config: &BusConfig) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.push_hw(Hw::Configure(*config));
        if state.fail_configure {
            return Err(MockError);
        }
        Ok(())
    }

    fn release(&mut self, port: Port) -> Result<(), MockError> {
        self.state.borrow_mut().push_hw(Hw::Release(port));
        Ok(())
    }

    async fn submit(
        &mut self,
        _port: Port,
        commands: Commands<'_>,
        rx: &mut [u8],
        timeout: Duration,
    ) -> Result<(), SubmitError<MockError>> {
        let yield_between = {
            let mut state = self.state.borrow_mut();
            state.submits += 1;
            state.timeouts.push(timeout);
            if state.fail_submit {
                return Err(SubmitError::Fault(MockError));
            }
            state.yield_between_commands
        };

        let mut transfer = Transfer::default();
        for command in commands {
            let step = self.state.borrow_mut().step(command, &mut transfer, rx);
            match step {
                Step::Continue => {}
                Step::Nack => {
                    self.state.borrow_mut().push_wire(Wire::Stop);
                    return Err(SubmitError::Nack);
                }
                Step::Timeout => return Err(SubmitError::Timeout),
            }
            if yield_between {
                yield_now().await;
            }
        }
        Ok(())
    }

    fn set_direction(
        &mut self,
        pin: PinId,
        direction: Direction,
    ) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.push_hw(Hw::Direction(pin, direction));
        if state.fail_gpio {
            return Err(MockError);
        }
        Ok(())
    }

    fn set_level(&mut self, pin: PinId, level: PinState) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.push_hw(Hw::Level(pin, level));
        if state.fail_gpio {
            return Err(MockError);
        }
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.state.borrow_mut().push_hw(Hw::Delay(us));
    }
}
