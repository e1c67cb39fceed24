//! Register access over an `embedded_hal` SPI device.
//!
//! Both sensor families use one address byte followed by data, but encode
//! the read/write direction differently:
//!
//! | family        | read          | write      |
//! |---------------|---------------|------------|
//! | ST (LSM, IIS) | `reg \| 0x80` | `reg`      |
//! | ADXL37x       | `reg << 1 \| 1` | `reg << 1` |

use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::spi::{ErrorType, Operation, SpiDevice};

use crate::capture::PAYLOAD_LEN;
use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterEncoding {
    St,
    Adxl,
}

impl RegisterEncoding {
    pub const fn read_address(self, reg: u8) -> u8 {
        match self {
            Self::St => reg | 0x80,
            Self::Adxl => (reg << 1) | 0x01,
        }
    }

    pub const fn write_address(self, reg: u8) -> u8 {
        match self {
            Self::St => reg,
            Self::Adxl => reg << 1,
        }
    }
}

/// A chip's SPI device together with its address encoding.
pub struct RegisterBus<D> {
    dev: D,
    encoding: RegisterEncoding,
}

impl<D: SpiDevice> RegisterBus<D> {
    pub fn new(dev: D, encoding: RegisterEncoding) -> Self {
        Self { dev, encoding }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn read(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.dev
            .transaction(&mut [
                Operation::Write(&[self.encoding.read_address(reg)]),
                Operation::Read(&mut value),
            ])
            .map_err(|_| SensorError::Bus)?;
        Ok(value[0])
    }

    pub fn write(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.dev
            .write(&[self.encoding.write_address(reg), value])
            .map_err(|_| SensorError::Bus)
    }

    /// Write a configuration block register by register, stopping at the
    /// first failure.
    pub fn write_block(&mut self, block: &[(u8, u8)]) -> Result<(), SensorError> {
        block.iter().try_for_each(|&(reg, value)| self.write(reg, value))
    }

    /// Auto-incrementing read of the three 16-bit axes starting at `reg`.
    pub fn burst(&mut self, reg: u8) -> Result<[u8; PAYLOAD_LEN], SensorError> {
        let mut payload = [0u8; PAYLOAD_LEN];
        self.dev
            .transaction(&mut [
                Operation::Write(&[self.encoding.read_address(reg)]),
                Operation::Read(&mut payload),
            ])
            .map_err(|_| SensorError::Bus)?;
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// Shared device
// ---------------------------------------------------------------------------

/// One SPI device shared by several channels of the same chip (the LSM6DSx
/// accelerometer and gyroscope).  Each transaction holds the lock, so the
/// channels may be driven from different tasks.
pub struct SharedSpi<D>(Arc<Mutex<D>>);

impl<D> SharedSpi<D> {
    pub fn new(dev: D) -> Self {
        Self(Arc::new(Mutex::new(dev)))
    }
}

impl<D> Clone for SharedSpi<D> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<D: ErrorType> ErrorType for SharedSpi<D> {
    type Error = D::Error;
}

impl<D: SpiDevice> SpiDevice for SharedSpi<D> {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transaction(operations)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Three little-endian signed 16-bit axes (ST parts).
pub fn decode_le16(raw: &[u8; PAYLOAD_LEN], units_per_bit: f32) -> [f32; 3] {
    let [x0, x1, y0, y1, z0, z1] = *raw;
    [[x0, x1], [y0, y1], [z0, z1]].map(|b| f32::from(i16::from_le_bytes(b)) * units_per_bit)
}

/// Three big-endian, left-justified 12-bit axes (ADXL37x).
pub fn decode_be12(raw: &[u8; PAYLOAD_LEN], units_per_bit: f32) -> [f32; 3] {
    let [x0, x1, y0, y1, z0, z1] = *raw;
    [[x0, x1], [y0, y1], [z0, z1]].map(|b| f32::from(i16::from_be_bytes(b) >> 4) * units_per_bit)
}

/// Signed user offset register value: `mg` converted to g and divided by
/// the register weight (g per LSB), truncated toward zero.
pub(crate) fn offset_register(mg: i16, weight_g: f32) -> u8 {
    (f32::from(mg) * 0.001 / weight_g) as i8 as u8
}
