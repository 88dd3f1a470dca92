//! Mock transports for driver testing
//!
//! Two mocks, one per protocol family:
//!
//! - [`MockRegisterBus`] models a register-mapped device (BME280): writes
//!   update a register map, repeated-start write+read serves burst reads
//!   from it.
//! - [`MockCommandBus`] models a command-word device (SHT3x): writes are
//!   logged verbatim, bare reads are served from a scripted response queue,
//!   and repeated-start transactions are rejected like the real bus
//!   adapter does.
//!
//! Both share state behind `Rc<RefCell<_>>` so a clone held by the test can
//! inspect and inject after the driver has taken ownership.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use enviro_drivers::status::{Error, ErrorKind, Result};
use enviro_drivers::transport::{Capabilities, Transport};

/// Records operations performed on a mock bus
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Plain write
    Write {
        /// Target address
        address: u8,
        /// Full payload
        bytes: Vec<u8>,
    },
    /// Write+read (registers) or bare read (commands)
    Read {
        /// Target address
        address: u8,
        /// Command/register bytes, empty for a bare read
        tx: Vec<u8>,
        /// Requested length
        rx_len: usize,
    },
}

#[derive(Debug, Default)]
struct ResetHooks {
    /// None = hook not provided (reports UNSUPPORTED)
    bus_reset: Option<Result<()>>,
    hard_reset: Option<Result<()>>,
    bus_resets: u32,
    hard_resets: u32,
}

fn take_reset(hook: &mut Option<Result<()>>, counter: &mut u32, what: &'static str) -> Result<()> {
    match hook {
        Some(result) => {
            *counter += 1;
            *result
        }
        None => Err(Error::new(ErrorKind::Unsupported, what)),
    }
}

// ============================================================================
// Register-mapped mock (BME280)
// ============================================================================

#[derive(Debug)]
struct RegisterState {
    registers: HashMap<u8, u8>,
    operations: Vec<Operation>,
    fail_writes: VecDeque<Error>,
    fail_reads: VecDeque<Error>,
    resets: ResetHooks,
}

/// Shared-state register-model bus
#[derive(Clone)]
pub struct MockRegisterBus {
    state: Rc<RefCell<RegisterState>>,
}

impl MockRegisterBus {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RegisterState {
                registers: HashMap::new(),
                operations: Vec::new(),
                fail_writes: VecDeque::new(),
                fail_reads: VecDeque::new(),
                resets: ResetHooks::default(),
            })),
        }
    }

    pub fn set_register(&self, reg: u8, value: u8) {
        self.state.borrow_mut().registers.insert(reg, value);
    }

    pub fn set_registers(&self, start: u8, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        for (i, &byte) in bytes.iter().enumerate() {
            state.registers.insert(start.wrapping_add(i as u8), byte);
        }
    }

    pub fn register(&self, reg: u8) -> u8 {
        *self.state.borrow().registers.get(&reg).unwrap_or(&0)
    }

    /// Queue an error for the next write
    pub fn fail_next_write(&self, err: Error) {
        self.state.borrow_mut().fail_writes.push_back(err);
    }

    /// Queue an error for the next write+read
    pub fn fail_next_read(&self, err: Error) {
        self.state.borrow_mut().fail_reads.push_back(err);
    }

    pub fn provide_bus_reset(&self, result: Result<()>) {
        self.state.borrow_mut().resets.bus_reset = Some(result);
    }

    pub fn provide_hard_reset(&self, result: Result<()>) {
        self.state.borrow_mut().resets.hard_reset = Some(result);
    }

    pub fn bus_reset_count(&self) -> u32 {
        self.state.borrow().resets.bus_resets
    }

    pub fn hard_reset_count(&self) -> u32 {
        self.state.borrow().resets.hard_resets
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state.borrow_mut().operations.clear();
    }

    /// Payloads of every plain write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write { bytes, .. } => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Addresses targeted by plain writes, in order
    pub fn write_addresses(&self) -> Vec<u8> {
        self.state
            .borrow()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write { address, .. } => Some(*address),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockRegisterBus {
    fn write(&mut self, address: u8, bytes: &[u8], _timeout_ms: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.operations.push(Operation::Write {
            address,
            bytes: bytes.to_vec(),
        });
        if let Some(err) = state.fail_writes.pop_front() {
            return Err(err);
        }

        let start = bytes[0];
        for (i, &byte) in bytes[1..].iter().enumerate() {
            state.registers.insert(start.wrapping_add(i as u8), byte);
        }
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        tx: &[u8],
        rx: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.operations.push(Operation::Read {
            address,
            tx: tx.to_vec(),
            rx_len: rx.len(),
        });
        if let Some(err) = state.fail_reads.pop_front() {
            return Err(err);
        }

        let start = tx[0];
        for (i, slot) in rx.iter_mut().enumerate() {
            *slot = *state
                .registers
                .get(&start.wrapping_add(i as u8))
                .unwrap_or(&0);
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BUS_ERROR
    }

    fn bus_reset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let ResetHooks {
            bus_reset,
            bus_resets,
            ..
        } = &mut state.resets;
        take_reset(bus_reset, bus_resets, "bus reset not available")
    }

    fn hard_reset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let ResetHooks {
            hard_reset,
            hard_resets,
            ..
        } = &mut state.resets;
        take_reset(hard_reset, hard_resets, "hard reset not available")
    }
}

// ============================================================================
// Command-word mock (SHT3x)
// ============================================================================

#[derive(Debug)]
struct CommandState {
    operations: Vec<Operation>,
    read_queue: VecDeque<Result<Vec<u8>>>,
    fail_writes: VecDeque<Error>,
    capabilities: Capabilities,
    resets: ResetHooks,
}

/// Shared-state command/scripted-read bus
#[derive(Clone)]
pub struct MockCommandBus {
    state: Rc<RefCell<CommandState>>,
}

impl MockCommandBus {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(CommandState {
                operations: Vec::new(),
                read_queue: VecDeque::new(),
                fail_writes: VecDeque::new(),
                capabilities: Capabilities::READ_HEADER_NACK
                    | Capabilities::TIMEOUT
                    | Capabilities::BUS_ERROR,
                resets: ResetHooks::default(),
            })),
        }
    }

    pub fn set_capabilities(&self, caps: Capabilities) {
        self.state.borrow_mut().capabilities = caps;
    }

    /// Script the next bare read to return these bytes
    pub fn push_read(&self, bytes: Vec<u8>) {
        self.state.borrow_mut().read_queue.push_back(Ok(bytes));
    }

    /// Script the next bare read to fail
    pub fn push_read_error(&self, err: Error) {
        self.state.borrow_mut().read_queue.push_back(Err(err));
    }

    /// Queue an error for the next write
    pub fn fail_next_write(&self, err: Error) {
        self.state.borrow_mut().fail_writes.push_back(err);
    }

    pub fn provide_bus_reset(&self, result: Result<()>) {
        self.state.borrow_mut().resets.bus_reset = Some(result);
    }

    pub fn provide_hard_reset(&self, result: Result<()>) {
        self.state.borrow_mut().resets.hard_reset = Some(result);
    }

    pub fn bus_reset_count(&self) -> u32 {
        self.state.borrow().resets.bus_resets
    }

    pub fn hard_reset_count(&self) -> u32 {
        self.state.borrow().resets.hard_resets
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state.borrow_mut().operations.clear();
    }

    /// Payloads of every plain write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write { bytes, .. } => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Addresses targeted by plain writes, in order
    pub fn write_addresses(&self) -> Vec<u8> {
        self.state
            .borrow()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write { address, .. } => Some(*address),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MockCommandBus {
    fn write(&mut self, address: u8, bytes: &[u8], _timeout_ms: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.operations.push(Operation::Write {
            address,
            bytes: bytes.to_vec(),
        });
        if let Some(err) = state.fail_writes.pop_front() {
            return Err(err);
        }
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        tx: &[u8],
        rx: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<()> {
        if !tx.is_empty() {
            // The SHT3x bus adapter cannot do repeated-start transactions.
            return Err(Error::new(
                ErrorKind::InvalidParam,
                "combined write+read not supported",
            ));
        }

        let mut state = self.state.borrow_mut();
        state.operations.push(Operation::Read {
            address,
            tx: Vec::new(),
            rx_len: rx.len(),
        });

        match state.read_queue.pop_front() {
            Some(Ok(bytes)) => {
                assert_eq!(
                    bytes.len(),
                    rx.len(),
                    "scripted read length does not match the driver's request"
                );
                rx.copy_from_slice(&bytes);
                Ok(())
            }
            Some(Err(err)) => Err(err),
            None => Err(Error::new(ErrorKind::I2cError, "unscripted read")),
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.state.borrow().capabilities
    }

    fn bus_reset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let ResetHooks {
            bus_reset,
            bus_resets,
            ..
        } = &mut state.resets;
        take_reset(bus_reset, bus_resets, "bus reset not available")
    }

    fn hard_reset(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let ResetHooks {
            hard_reset,
            hard_resets,
            ..
        } = &mut state.resets;
        take_reset(hard_reset, hard_resets, "hard reset not available")
    }
}
