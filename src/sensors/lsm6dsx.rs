//! LSM6DSx (LSM6DSO32-class) 6-axis IMU: accelerometer up to ±32 g and
//! gyroscope up to ±2000 dps, 16-bit, two data-ready lines.
//!
//! The chip is split into two channels sharing one SPI device.  The
//! accelerometer channel owns the chip-level duties (identity check and
//! configuration block); the gyroscope channel only switches its own ODR.

use embedded_hal::spi::SpiDevice;

use crate::capture::PAYLOAD_LEN;
use crate::config::{ChannelId, SessionConfig};
use crate::error::SensorError;

use super::spi::{RegisterBus, RegisterEncoding, decode_le16, offset_register};
use super::{SensorPort, range_per_bit};

const REG_INT1_CTRL: u8 = 0x0D;
const REG_INT2_CTRL: u8 = 0x0E;
const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1_XL: u8 = 0x10;
const REG_CTRL2_G: u8 = 0x11;
const REG_CTRL4_C: u8 = 0x13;
const REG_CTRL6_C: u8 = 0x15;
const REG_CTRL8_XL: u8 = 0x17;
const REG_OUTX_L_G: u8 = 0x22;
const REG_OUTX_L_XL: u8 = 0x28;
const REG_X_OFS_USR: u8 = 0x73;
const REG_Y_OFS_USR: u8 = 0x74;
const REG_Z_OFS_USR: u8 = 0x75;

const WHO_AM_I: u8 = 0x6C;
const RESOLUTION_BITS: u32 = 16;
/// User offset weight, g per LSB (2^-10).
const OFFSET_WEIGHT_G: f32 = 0.000_976_562_5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsmChannel {
    Accel,
    Gyro,
}

pub struct Lsm6dsx<D> {
    bus: RegisterBus<D>,
    channel: LsmChannel,
    enable_word: u8,
}

impl<D: SpiDevice> Lsm6dsx<D> {
    pub fn new(dev: D, channel: LsmChannel) -> Self {
        Self {
            bus: RegisterBus::new(dev, RegisterEncoding::St),
            channel,
            enable_word: 0,
        }
    }

    const fn control_register(&self) -> u8 {
        match self.channel {
            LsmChannel::Accel => REG_CTRL1_XL,
            LsmChannel::Gyro => REG_CTRL2_G,
        }
    }
}

/// Both ODRs standby, INT1 = accel data ready, INT2 = gyro data ready,
/// data-ready masked until the filters settle, I2C off, gyro LPF1
/// bandwidth, user offsets, accel LPF2 bandwidth.
fn configuration_block(config: &SessionConfig) -> [(u8, u8); 10] {
    let accel = &config.lsm_accel;
    let [ox, oy, oz] = accel.offset_mg.map(|mg| offset_register(mg, OFFSET_WEIGHT_G));
    [
        (REG_CTRL1_XL, 0x00),
        (REG_CTRL2_G, 0x00),
        (REG_INT1_CTRL, 0x01),
        (REG_INT2_CTRL, 0x02),
        (REG_CTRL4_C, 0x0C),
        (REG_CTRL6_C, config.lsm_gyro.lpf as u8),
        (REG_X_OFS_USR, ox),
        (REG_Y_OFS_USR, oy),
        (REG_Z_OFS_USR, oz),
        (REG_CTRL8_XL, accel_lpf_bits(accel.lpf)),
    ]
}

fn accel_lpf_bits(lpf: u16) -> u8 {
    let sel = match lpf {
        10 => 1,
        20 => 2,
        45 => 3,
        100 => 4,
        200 => 5,
        400 => 6,
        800 => 7,
        _ => 0,
    };
    sel << 5
}

/// ODR field shared by CTRL1_XL and CTRL2_G.
fn odr_bits(odr_hz: u16) -> u8 {
    match odr_hz {
        13 => 0x10,
        26 => 0x20,
        52 => 0x30,
        104 => 0x40,
        208 => 0x50,
        416 => 0x60,
        833 => 0x70,
        1660 => 0x80,
        3330 => 0x90,
        6660 => 0xA0,
        _ => 0x00,
    }
}

/// CTRL1_XL: ODR, full scale, and LPF2 selection unless the LPF setting is 2.
fn accel_enable_word(odr_hz: u16, range_g: u16, lpf: u16) -> u8 {
    let fs = match range_g {
        8 => 0x08,
        16 => 0x0C,
        32 => 0x04,
        _ => 0x00,
    };
    let lpf2 = if lpf == 2 { 0x00 } else { 0x02 };
    odr_bits(odr_hz) | fs | lpf2
}

/// CTRL2_G: ODR and full scale.
fn gyro_enable_word(odr_hz: u16, range_dps: u16) -> u8 {
    let fs = match range_dps {
        125 => 0x02,
        500 => 0x04,
        1000 => 0x08,
        2000 => 0x0C,
        _ => 0x00,
    };
    odr_bits(odr_hz) | fs
}

impl<D: SpiDevice + Send> SensorPort for Lsm6dsx<D> {
    fn channel(&self) -> ChannelId {
        match self.channel {
            LsmChannel::Accel => ChannelId::LsmAccel,
            LsmChannel::Gyro => ChannelId::LsmGyro,
        }
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, SensorError> {
        self.bus.read(reg)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus.write(reg, value)
    }

    fn identity(&self) -> Option<(u8, u8)> {
        match self.channel {
            LsmChannel::Accel => Some((REG_WHO_AM_I, WHO_AM_I)),
            LsmChannel::Gyro => None,
        }
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), SensorError> {
        match self.channel {
            LsmChannel::Accel => {
                self.bus.write_block(&configuration_block(config))?;
                let s = &config.lsm_accel;
                self.enable_word = accel_enable_word(s.odr_hz, s.range, s.lpf);
            }
            LsmChannel::Gyro => {
                let s = &config.lsm_gyro;
                self.enable_word = gyro_enable_word(s.odr_hz, s.range);
            }
        }
        Ok(())
    }

    fn enable(&mut self) -> Result<(), SensorError> {
        self.bus.write(self.control_register(), self.enable_word)
    }

    fn disable(&mut self) -> Result<(), SensorError> {
        self.bus.write(self.control_register(), 0x00)
    }

    fn burst_read(&mut self) -> Result<[u8; PAYLOAD_LEN], SensorError> {
        let reg = match self.channel {
            LsmChannel::Accel => REG_OUTX_L_XL,
            LsmChannel::Gyro => REG_OUTX_L_G,
        };
        self.bus.burst(reg)
    }

    fn units_per_bit(&self, config: &SessionConfig) -> f32 {
        let range = match self.channel {
            LsmChannel::Accel => config.lsm_accel.range,
            LsmChannel::Gyro => config.lsm_gyro.range,
        };
        range_per_bit(f32::from(range), RESOLUTION_BITS)
    }

    fn decode(&self, raw: &[u8; PAYLOAD_LEN], units_per_bit: f32) -> [f32; 3] {
        decode_le16(raw, units_per_bit)
    }
}
