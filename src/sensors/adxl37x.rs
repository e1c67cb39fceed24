//! ADXL37x high-g accelerometer: ±400 g, 12-bit, up to 5120 Hz.

use embedded_hal::spi::SpiDevice;

use crate::capture::PAYLOAD_LEN;
use crate::config::{ChannelId, SessionConfig};
use crate::error::SensorError;

use super::spi::{RegisterBus, RegisterEncoding, decode_be12};
use super::{SensorPort, range_per_bit};

const REG_PARTID: u8 = 0x02;
const REG_XDATA_H: u8 = 0x08;
const REG_OFFSET_X: u8 = 0x20;
const REG_OFFSET_Y: u8 = 0x21;
const REG_OFFSET_Z: u8 = 0x22;
const REG_HPF: u8 = 0x38;
const REG_INT1_MAP: u8 = 0x3B;
const REG_TIMING: u8 = 0x3D;
const REG_MEASURE: u8 = 0x3E;
const REG_POWER_CTL: u8 = 0x3F;

const PARTID: u8 = 0xFA;
const RESOLUTION_BITS: u32 = 12;
/// The full-scale range is fixed by the part.
const RANGE_G: f32 = 400.0;
/// User offset weight, g per LSB.
const OFFSET_WEIGHT_G: f32 = 1.464_843_75;

/// POWER_CTL: measurement mode / standby, both with the LPF enabled.
const MODE_ENABLE: u8 = 0x07;
const MODE_STANDBY: u8 = 0x04;
/// MEASURE: low-noise operation.
const LOW_NOISE: u8 = 0x08;

pub struct Adxl37x<D> {
    bus: RegisterBus<D>,
}

impl<D: SpiDevice> Adxl37x<D> {
    pub fn new(dev: D) -> Self {
        Self {
            bus: RegisterBus::new(dev, RegisterEncoding::Adxl),
        }
    }
}

/// MEASURE bandwidth field.
fn lpf_bits(lpf: u16) -> u8 {
    match lpf {
        4 => 3,
        8 => 2,
        16 => 1,
        32 => 0,
        _ => 4,
    }
}

/// TIMING ODR field.
fn odr_bits(odr_hz: u16) -> u8 {
    match odr_hz {
        640 => 0x20,
        1280 => 0x40,
        2560 => 0x60,
        5120 => 0x80,
        _ => 0x00,
    }
}

/// 4-bit signed offset register value.
fn offset_bits(mg: i16) -> u8 {
    ((f32::from(mg) * 0.001 / OFFSET_WEIGHT_G) as i8 as u8) & 0x0F
}

impl<D: SpiDevice + Send> SensorPort for Adxl37x<D> {
    fn channel(&self) -> ChannelId {
        ChannelId::AdxlAccel
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, SensorError> {
        self.bus.read(reg)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus.write(reg, value)
    }

    fn identity(&self) -> Option<(u8, u8)> {
        Some((REG_PARTID, PARTID))
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), SensorError> {
        let s = &config.adxl_accel;
        let [ox, oy, oz] = s.offset_mg.map(offset_bits);
        self.bus.write_block(&[
            (REG_POWER_CTL, MODE_STANDBY),
            (REG_HPF, 0x03),
            (REG_MEASURE, lpf_bits(s.lpf) | LOW_NOISE),
            (REG_INT1_MAP, 0x01),
            (REG_TIMING, odr_bits(s.odr_hz)),
            (REG_OFFSET_X, ox),
            (REG_OFFSET_Y, oy),
            (REG_OFFSET_Z, oz),
        ])
    }

    fn enable(&mut self) -> Result<(), SensorError> {
        self.bus.write(REG_POWER_CTL, MODE_ENABLE)
    }

    fn disable(&mut self) -> Result<(), SensorError> {
        self.bus.write(REG_POWER_CTL, MODE_STANDBY)
    }

    fn burst_read(&mut self) -> Result<[u8; PAYLOAD_LEN], SensorError> {
        self.bus.burst(REG_XDATA_H)
    }

    fn units_per_bit(&self, _config: &SessionConfig) -> f32 {
        range_per_bit(RANGE_G, RESOLUTION_BITS)
    }

    fn decode(&self, raw: &[u8; PAYLOAD_LEN], units_per_bit: f32) -> [f32; 3] {
        decode_be12(raw, units_per_bit)
    }
}
