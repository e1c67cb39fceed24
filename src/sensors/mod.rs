//! Sensor subsystem — the [`SensorPort`] capability, three chip drivers and
//! the [`SensorBank`] channel table the recorder works through.
//!
//! Every channel is reached through the same capability set (read/write a
//! register, configure, enable, disable, burst-read, decode), so the capture
//! path never needs to know which chip a sample came from beyond its
//! source id.

pub mod adxl37x;
pub mod iis3dwb;
pub mod lsm6dsx;
pub mod spi;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::capture::{CaptureRing, PAYLOAD_LEN, SampleDecoder, SourceId};
use crate::config::{ChannelId, SessionConfig};
use crate::error::SensorError;

pub use adxl37x::Adxl37x;
pub use iis3dwb::Iis3dwb;
pub use lsm6dsx::{Lsm6dsx, LsmChannel};
pub use spi::{RegisterEncoding, SharedSpi};

/// Uniform capability set of one sensor channel.
///
/// `Send` because the bank is shared with the transfer task.
pub trait SensorPort: Send {
    fn channel(&self) -> ChannelId;

    fn read_register(&mut self, reg: u8) -> Result<u8, SensorError>;

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), SensorError>;

    /// Identity register and its expected value, if this channel is the
    /// one responsible for checking its chip.
    fn identity(&self) -> Option<(u8, u8)>;

    /// Read the identity register and compare it.
    fn test_identity(&mut self) -> Result<(), SensorError> {
        let Some((register, expected)) = self.identity() else {
            return Ok(());
        };
        let found = self.read_register(register)?;
        if found == expected {
            Ok(())
        } else {
            Err(SensorError::IdentityMismatch {
                register,
                expected,
                found,
            })
        }
    }

    /// Write the chip configuration block (left in standby) and compute
    /// the word `enable` will write.
    fn configure(&mut self, config: &SessionConfig) -> Result<(), SensorError>;

    /// Start producing data-ready edges.
    fn enable(&mut self) -> Result<(), SensorError>;

    /// Return to standby.
    fn disable(&mut self) -> Result<(), SensorError>;

    /// Read one raw sample (three axes, six bytes).
    fn burst_read(&mut self) -> Result<[u8; PAYLOAD_LEN], SensorError>;

    /// Physical units per LSB under `config` (g or dps).
    fn units_per_bit(&self, config: &SessionConfig) -> f32;

    fn decode(&self, raw: &[u8; PAYLOAD_LEN], units_per_bit: f32) -> [f32; 3];
}

/// Full-scale range over the positive half of a signed `bits`-bit reading.
pub(crate) fn range_per_bit(range: f32, bits: u32) -> f32 {
    range / (1u32 << (bits - 1)) as f32
}

// ---------------------------------------------------------------------------
// SensorBank
// ---------------------------------------------------------------------------

struct SensorChannel {
    port: Box<dyn SensorPort>,
    enabled: bool,
    units_per_bit: f32,
}

/// Channel table indexed by [`ChannelId`].
pub struct SensorBank {
    channels: [Option<SensorChannel>; ChannelId::COUNT],
}

impl Default for SensorBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBank {
    pub fn new() -> Self {
        Self {
            channels: core::array::from_fn(|_| None),
        }
    }

    /// Install a driver in its channel's slot, replacing any previous one.
    pub fn insert(&mut self, port: Box<dyn SensorPort>) {
        let idx = port.channel().index();
        self.channels[idx] = Some(SensorChannel {
            port,
            enabled: false,
            units_per_bit: 0.0,
        });
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut SensorChannel> {
        self.channels.iter_mut().flatten()
    }

    fn by_source(&mut self, source_id: SourceId) -> Option<&mut SensorChannel> {
        let channel = ChannelId::from_source_id(source_id)?;
        self.channels[channel.index()].as_mut()
    }

    /// Check every chip's identity register.
    pub fn identify(&mut self) -> Result<(), SensorError> {
        for ch in self.iter_mut() {
            ch.port.test_identity()?;
            if let Some((reg, value)) = ch.port.identity() {
                info!("{}: identity 0x{reg:02X} = 0x{value:02X}", ch.port.channel().name());
            }
        }
        Ok(())
    }

    /// Write every configuration block and latch per-channel settings.
    pub fn configure(&mut self, config: &SessionConfig) -> Result<(), SensorError> {
        for ch in self.iter_mut() {
            let id = ch.port.channel();
            ch.port.configure(config)?;
            ch.enabled = config.channel(id).enabled;
            ch.units_per_bit = ch.port.units_per_bit(config);
        }
        Ok(())
    }

    /// Enable every configured channel.  Failures are logged and the
    /// channel is skipped; returns how many channels are running.
    pub fn enable_all(&mut self) -> usize {
        let mut running = 0;
        for ch in self.iter_mut().filter(|c| c.enabled) {
            match ch.port.enable() {
                Ok(()) => running += 1,
                Err(e) => warn!("{}: enable failed: {e}", ch.port.channel().name()),
            }
        }
        running
    }

    /// Put every channel into standby.
    pub fn disable_all(&mut self) {
        for ch in self.iter_mut() {
            if let Err(e) = ch.port.disable() {
                warn!("{}: disable failed: {e}", ch.port.channel().name());
            }
        }
    }

    /// Bitmask of enabled channels (bit = [`ChannelId::index`]).
    pub fn enabled_mask(&self) -> u8 {
        self.channels
            .iter()
            .flatten()
            .filter(|c| c.enabled)
            .fold(0, |m, c| m | 1 << c.port.channel().index())
    }

    /// Phase-2 transfer for one captured edge.  `None` when the source is
    /// unknown or the burst failed.
    pub fn burst_read(&mut self, source_id: SourceId) -> Option<[u8; PAYLOAD_LEN]> {
        self.by_source(source_id)?.port.burst_read().ok()
    }

    /// Decode a payload captured from `source_id` into physical units.
    pub fn decode(&self, source_id: SourceId, payload: &[u8; PAYLOAD_LEN]) -> Option<[f32; 3]> {
        let channel = ChannelId::from_source_id(source_id)?;
        let ch = self.channels[channel.index()].as_ref()?;
        Some(ch.port.decode(payload, ch.units_per_bit))
    }
}

impl SampleDecoder for SensorBank {
    fn decode(&self, channel: ChannelId, payload: &[u8; PAYLOAD_LEN]) -> [f32; 3] {
        SensorBank::decode(self, channel.source_id(), payload).unwrap_or([0.0; 3])
    }
}

// ---------------------------------------------------------------------------
// SharedBank
// ---------------------------------------------------------------------------

/// The sensor bank as shared between the session (configure, enable,
/// decode) and the transfer task (phase 2).
///
/// Phase 2 only ever runs with the lock held, which keeps
/// [`CaptureRing::drain`] single-consumer whichever task calls it.
#[derive(Clone)]
pub struct SharedBank(Arc<Mutex<SensorBank>>);

impl SharedBank {
    pub fn new(bank: SensorBank) -> Self {
        Self(Arc::new(Mutex::new(bank)))
    }

    /// Lock the bank.  A panic in another holder leaves the table usable,
    /// so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, SensorBank> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Phase 2: burst-read every captured edge.  Returns the number of
    /// samples completed.
    pub fn transfer(&self, ring: &CaptureRing<'_>) -> usize {
        let mut bank = self.lock();
        ring.drain(|source_id| bank.burst_read(source_id))
    }
}

impl SampleDecoder for SharedBank {
    fn decode(&self, channel: ChannelId, payload: &[u8; PAYLOAD_LEN]) -> [f32; 3] {
        SampleDecoder::decode(&*self.lock(), channel, payload)
    }
}
