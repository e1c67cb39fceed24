//! Mock hardware adapters for integration tests.
//!
//! `SimChip` is a register-file SPI device the real sensor drivers talk
//! to; tests poke its data registers to script what the next burst read
//! returns.  `RecordingGate` remembers every interrupt enable/disable and
//! `CollectingSink` keeps every emitted event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};

use impack::app::events::SessionEvent;
use impack::app::ports::{EventSink, InterruptPort};
use impack::capture::{CaptureRing, SlotArray};
use impack::sensors::{Adxl37x, Iis3dwb, Lsm6dsx, LsmChannel, RegisterEncoding, SensorBank, SharedSpi};

// ── SimChip ───────────────────────────────────────────────────

struct ChipState {
    encoding: RegisterEncoding,
    registers: HashMap<u8, u8>,
    writes: Vec<(u8, u8)>,
    fail: bool,
}

/// Register-file SPI device.  Clones share the same registers.
#[derive(Clone)]
pub struct SimChip(Arc<Mutex<ChipState>>);

#[allow(dead_code)]
impl SimChip {
    pub fn new(encoding: RegisterEncoding) -> Self {
        Self(Arc::new(Mutex::new(ChipState {
            encoding,
            registers: HashMap::new(),
            writes: Vec::new(),
            fail: false,
        })))
    }

    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.0.lock().expect("chip state poisoned")
    }

    pub fn set(&self, reg: u8, value: u8) {
        self.state().registers.insert(reg, value);
    }

    pub fn get(&self, reg: u8) -> u8 {
        self.state().registers.get(&reg).copied().unwrap_or(0)
    }

    /// Three little-endian axes starting at `reg` (ST layout).
    pub fn set_axes_le(&self, reg: u8, axes: [i16; 3]) {
        for (i, v) in axes.iter().enumerate() {
            let [lo, hi] = v.to_le_bytes();
            self.set(reg + 2 * i as u8, lo);
            self.set(reg + 2 * i as u8 + 1, hi);
        }
    }

    /// Every `(register, value)` write so far.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state().writes.clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.state().fail = fail;
    }
}

impl ErrorType for SimChip {
    type Error = ErrorKind;
}

impl SpiDevice for SimChip {
    fn transaction(&mut self, ops: &mut [Operation<'_, u8>]) -> Result<(), ErrorKind> {
        let mut chip = self.state();
        if chip.fail {
            return Err(ErrorKind::Other);
        }
        let mut read_from = None;
        for op in ops.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    let (reg, is_read) = match chip.encoding {
                        RegisterEncoding::St => (bytes[0] & 0x7F, bytes[0] & 0x80 != 0),
                        RegisterEncoding::Adxl => (bytes[0] >> 1, bytes[0] & 0x01 != 0),
                    };
                    if is_read {
                        read_from = Some(reg);
                    } else if let Some(&value) = bytes.get(1) {
                        chip.registers.insert(reg, value);
                        chip.writes.push((reg, value));
                    }
                }
                Operation::Read(buf) => {
                    let start = read_from.unwrap_or(0);
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = chip.registers.get(&(start + i as u8)).copied().unwrap_or(0);
                    }
                }
                _ => return Err(ErrorKind::Other),
            }
        }
        Ok(())
    }
}

// ── Board ─────────────────────────────────────────────────────

pub const LSM_WHO_AM_I: u8 = 0x0F;
pub const LSM_OUTX_L_G: u8 = 0x22;
pub const LSM_OUTX_L_XL: u8 = 0x28;
pub const IIS_WHO_AM_I: u8 = 0x0F;
pub const ADXL_PARTID: u8 = 0x02;

/// The three simulated chips of the logger board.
pub struct SimBoard {
    pub lsm: SimChip,
    pub iis: SimChip,
    pub adxl: SimChip,
}

impl SimBoard {
    /// Chips answering with their correct identities.
    pub fn new() -> Self {
        let board = Self {
            lsm: SimChip::new(RegisterEncoding::St),
            iis: SimChip::new(RegisterEncoding::St),
            adxl: SimChip::new(RegisterEncoding::Adxl),
        };
        board.lsm.set(LSM_WHO_AM_I, 0x6C);
        board.iis.set(IIS_WHO_AM_I, 0x7B);
        board.adxl.set(ADXL_PARTID, 0xFA);
        board
    }

    /// Sensor table with the real drivers over the simulated chips.
    pub fn bank(&self) -> SensorBank {
        let lsm = SharedSpi::new(self.lsm.clone());
        let mut bank = SensorBank::new();
        bank.insert(Box::new(Lsm6dsx::new(lsm.clone(), LsmChannel::Accel)));
        bank.insert(Box::new(Lsm6dsx::new(lsm, LsmChannel::Gyro)));
        bank.insert(Box::new(Iis3dwb::new(self.iis.clone())));
        bank.insert(Box::new(Adxl37x::new(self.adxl.clone())));
        bank
    }
}

// ── RecordingGate ─────────────────────────────────────────────

/// Interrupt gate that records every change.
#[derive(Debug, Default)]
pub struct RecordingGate {
    pub enabled: bool,
    pub history: Vec<bool>,
}

impl InterruptPort for RecordingGate {
    fn enable_capture(&mut self) {
        self.enabled = true;
        self.history.push(true);
    }

    fn disable_capture(&mut self) {
        self.enabled = false;
        self.history.push(false);
    }
}

// ── CollectingSink ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<SessionEvent>,
}

#[allow(dead_code)]
impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &SessionEvent) -> bool {
        self.events.contains(event)
    }

    pub fn faults(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Fault(_)))
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&mut self, event: &SessionEvent) {
        self.events.push(event.clone());
    }
}

/// Capture ring capacity used throughout the integration tests.
pub const TEST_SLOTS: usize = 8;

pub fn slots() -> SlotArray<TEST_SLOTS> {
    SlotArray::new()
}

pub fn ring(slots: &SlotArray<TEST_SLOTS>) -> CaptureRing<'_> {
    CaptureRing::new(slots)
}
