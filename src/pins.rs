//! GPIO / peripheral pin assignments for the IMpack logger board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.
//!
//! The data-ready line identities double as the `source_id` stamped into
//! every captured sample, so they must never change between firmware
//! versions that share recorded files.

use crate::capture::record::SourceId;

// ---------------------------------------------------------------------------
// Shared SPI bus (SPI2 / FSPI)
// ---------------------------------------------------------------------------

pub const SPI_SCLK_GPIO: i32 = 12;
pub const SPI_MOSI_GPIO: i32 = 11;
pub const SPI_MISO_GPIO: i32 = 13;
/// SPI clock for all three sensor families (each tolerates 10 MHz).
pub const SPI_BAUD_HZ: u32 = 10_000_000;

// ---------------------------------------------------------------------------
// Chip selects (active low)
// ---------------------------------------------------------------------------

pub const LSM6DSX_CS_GPIO: i32 = 10;
pub const IIS3DWB_CS_GPIO: i32 = 9;
pub const ADXL37X_CS_GPIO: i32 = 46;

// ---------------------------------------------------------------------------
// Data-ready interrupt lines
// ---------------------------------------------------------------------------

/// LSM6DSx INT1: accelerometer data ready.
pub const LSM6DSX_INT1_GPIO: i32 = 4;
/// LSM6DSx INT2: gyroscope data ready.
pub const LSM6DSX_INT2_GPIO: i32 = 5;
/// IIS3DWB INT1: accelerometer data ready.
pub const IIS3DWB_INT1_GPIO: i32 = 6;
/// ADXL37x INT1: accelerometer data ready.
pub const ADXL37X_INT1_GPIO: i32 = 7;

/// Every data-ready line, in the order the ISR service registers them.
pub const DATA_READY_GPIOS: [i32; 4] = [
    LSM6DSX_INT1_GPIO,
    LSM6DSX_INT2_GPIO,
    IIS3DWB_INT1_GPIO,
    ADXL37X_INT1_GPIO,
];

// ---------------------------------------------------------------------------
// Source identities (written into every RawSample)
// ---------------------------------------------------------------------------

pub const SOURCE_LSM6DSX_ACCEL: SourceId = 0x1000;
pub const SOURCE_LSM6DSX_GYRO: SourceId = 0x0020;
pub const SOURCE_IIS3DWB_ACCEL: SourceId = 0x8000;
pub const SOURCE_ADXL37X_ACCEL: SourceId = 0x0010;

// ---------------------------------------------------------------------------
// SD card (SDMMC, 4-bit)
// ---------------------------------------------------------------------------

pub const SD_CLK_GPIO: i32 = 39;
pub const SD_CMD_GPIO: i32 = 38;
pub const SD_D0_GPIO: i32 = 40;
pub const SD_D1_GPIO: i32 = 41;
pub const SD_D2_GPIO: i32 = 42;
pub const SD_D3_GPIO: i32 = 47;
/// VFS mount point of the card.
pub const SD_MOUNT_POINT: &str = "/sdcard";

// ---------------------------------------------------------------------------
// User interface
// ---------------------------------------------------------------------------

/// Momentary push-button, active high with external pull-down.
pub const BUTTON_GPIO: i32 = 16;
/// Single status LED, active high.
pub const STATUS_LED_GPIO: i32 = 15;
