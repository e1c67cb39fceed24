//! IIS3DWB wideband vibration accelerometer: fixed 26.7 kHz ODR, ±2..16 g,
//! 16-bit.

use embedded_hal::spi::SpiDevice;

use crate::capture::PAYLOAD_LEN;
use crate::config::{ChannelId, SessionConfig};
use crate::error::SensorError;

use super::spi::{RegisterBus, RegisterEncoding, decode_le16, offset_register};
use super::{SensorPort, range_per_bit};

const REG_COUNTER_BDR_REG1: u8 = 0x0B;
const REG_INT1_CTRL: u8 = 0x0D;
const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1_XL: u8 = 0x10;
const REG_CTRL4_C: u8 = 0x13;
const REG_CTRL6_C: u8 = 0x15;
const REG_CTRL7_C: u8 = 0x16;
const REG_CTRL8_XL: u8 = 0x17;
const REG_OUTX_L_XL: u8 = 0x28;
const REG_X_OFS_USR: u8 = 0x73;
const REG_Y_OFS_USR: u8 = 0x74;
const REG_Z_OFS_USR: u8 = 0x75;

const WHO_AM_I: u8 = 0x7B;
const RESOLUTION_BITS: u32 = 16;
const OFFSET_WEIGHT_G: f32 = 0.000_976_562_5;
/// CTRL1_XL: XL_EN (3 axes, 26.7 kHz) with the LPF2 output selected.
const ENABLE_BASE: u8 = 0xA2;

pub struct Iis3dwb<D> {
    bus: RegisterBus<D>,
    enable_word: u8,
}

impl<D: SpiDevice> Iis3dwb<D> {
    pub fn new(dev: D) -> Self {
        Self {
            bus: RegisterBus::new(dev, RegisterEncoding::St),
            enable_word: 0,
        }
    }
}

fn lpf_bits(lpf: u16) -> u8 {
    match lpf {
        4 => 0x00,
        10 => 0x20,
        20 => 0x40,
        45 => 0x60,
        100 => 0x80,
        200 => 0xA0,
        400 => 0xC0,
        800 => 0xE0,
        _ => 0x40,
    }
}

fn enable_word(range_g: u16) -> u8 {
    let fs = match range_g {
        4 => 0x08,
        8 => 0x0C,
        16 => 0x04,
        _ => 0x00,
    };
    ENABLE_BASE | fs
}

impl<D: SpiDevice + Send> SensorPort for Iis3dwb<D> {
    fn channel(&self) -> ChannelId {
        ChannelId::IisAccel
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, SensorError> {
        self.bus.read(reg)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus.write(reg, value)
    }

    fn identity(&self) -> Option<(u8, u8)> {
        Some((REG_WHO_AM_I, WHO_AM_I))
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), SensorError> {
        let s = &config.iis_accel;
        let [ox, oy, oz] = s.offset_mg.map(|mg| offset_register(mg, OFFSET_WEIGHT_G));
        // Standby, I2C off, pulsed data-ready on INT1, LPF2 bandwidth,
        // user offsets applied to the output.
        self.bus.write_block(&[
            (REG_CTRL1_XL, 0x00),
            (REG_CTRL4_C, 0x04),
            (REG_CTRL6_C, 0x00),
            (REG_COUNTER_BDR_REG1, 0x80),
            (REG_INT1_CTRL, 0x01),
            (REG_CTRL8_XL, lpf_bits(s.lpf)),
            (REG_CTRL7_C, 0x02),
            (REG_X_OFS_USR, ox),
            (REG_Y_OFS_USR, oy),
            (REG_Z_OFS_USR, oz),
        ])?;
        self.enable_word = enable_word(s.range);
        Ok(())
    }

    fn enable(&mut self) -> Result<(), SensorError> {
        self.bus.write(REG_CTRL1_XL, self.enable_word)
    }

    fn disable(&mut self) -> Result<(), SensorError> {
        self.bus.write(REG_CTRL1_XL, 0x00)
    }

    fn burst_read(&mut self) -> Result<[u8; PAYLOAD_LEN], SensorError> {
        self.bus.burst(REG_OUTX_L_XL)
    }

    fn units_per_bit(&self, config: &SessionConfig) -> f32 {
        range_per_bit(f32::from(config.iis_accel.range), RESOLUTION_BITS)
    }

    fn decode(&self, raw: &[u8; PAYLOAD_LEN], units_per_bit: f32) -> [f32; 3] {
        decode_le16(raw, units_per_bit)
    }
}
