//! Saving-state conversion of a raw recording into per-channel CSV files.
//!
//! One record is converted per [`Exporter::step`] so the main loop keeps
//! its cadence (LED, button) while a long recording is processed.  The
//! output is a pure function of the raw file and the decoder, so running
//! the conversion twice yields identical files.

use std::io::{ErrorKind, Read, Write};

use log::{debug, info};

use crate::app::ports::StoragePort;
use crate::config::ChannelId;
use crate::error::{Result, StorageError};

use super::naming::csv_file_name;
use super::record::{PAYLOAD_LEN, RECORD_SIZE, RawSample};

/// Converts a raw payload into physical units for its channel.
pub trait SampleDecoder {
    fn decode(&self, channel: ChannelId, payload: &[u8; PAYLOAD_LEN]) -> [f32; 3];
}

/// Result of one conversion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStep {
    /// A row was appended to this channel's CSV.
    Record(ChannelId),
    /// The record's source is unknown and was skipped.
    Skipped,
    /// End of the raw file (a partial trailing record counts as the end).
    Finished,
}

pub struct Exporter<S: StoragePort> {
    reader: S::Reader,
    writers: [Option<S::Writer>; ChannelId::COUNT],
    trial: u32,
    records: u32,
}

impl<S: StoragePort> Exporter<S> {
    /// Start converting the raw recording of `trial`.
    pub fn open(reader: S::Reader, trial: u32) -> Self {
        Self {
            reader,
            writers: core::array::from_fn(|_| None),
            trial,
            records: 0,
        }
    }

    pub fn trial(&self) -> u32 {
        self.trial
    }

    /// Rows written so far.
    pub fn records(&self) -> u32 {
        self.records
    }

    /// Convert the next record.  A channel's CSV is created, with its
    /// header row, the first time one of its records is seen.
    pub fn step<D>(&mut self, storage: &mut S, decoder: &D) -> Result<ExportStep>
    where
        D: SampleDecoder + ?Sized,
    {
        let mut buf = [0u8; RECORD_SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(ExportStep::Finished),
            Err(e) => return Err(StorageError::from(e).into()),
        }

        let sample = RawSample::from_bytes(&buf);
        let Some(channel) = ChannelId::from_source_id(sample.source_id) else {
            debug!("skipping record with unknown source 0x{:04X}", sample.source_id);
            return Ok(ExportStep::Skipped);
        };

        let slot = &mut self.writers[channel.index()];
        let writer = match slot {
            Some(w) => w,
            None => {
                let name = csv_file_name(channel, self.trial)?;
                let mut w = storage.create(&name)?;
                writeln!(w, "{}", channel.csv_header()).map_err(StorageError::from)?;
                info!("export: created {name}");
                slot.insert(w)
            }
        };

        let [x, y, z] = decoder.decode(channel, &sample.payload);
        writeln!(writer, "{},{x:.6},{y:.6},{z:.6}", sample.capture_timestamp)
            .map_err(StorageError::from)?;

        self.records += 1;
        Ok(ExportStep::Record(channel))
    }

    /// Flush and close every CSV.  Returns the number of rows written.
    pub fn finish(self) -> Result<u32> {
        for mut w in self.writers.into_iter().flatten() {
            w.flush().map_err(StorageError::from)?;
        }
        Ok(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemStorage;
    use crate::pins;

    struct Scale(f32);

    impl SampleDecoder for Scale {
        fn decode(&self, _: ChannelId, payload: &[u8; PAYLOAD_LEN]) -> [f32; 3] {
            let axis = |i: usize| f32::from(i16::from_le_bytes([payload[i], payload[i + 1]])) * self.0;
            [axis(0), axis(2), axis(4)]
        }
    }

    fn raw(records: &[(u32, [u8; PAYLOAD_LEN], u16)]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|&(t, payload, source_id)| {
                RawSample {
                    capture_timestamp: t,
                    payload,
                    source_id,
                }
                .to_bytes()
            })
            .collect()
    }

    fn run(storage: &mut MemStorage, trial: u32) -> u32 {
        let reader = storage.open("DATA1.DAT").unwrap();
        let mut ex = Exporter::<MemStorage>::open(reader, trial);
        while ex.step(storage, &Scale(0.5)).unwrap() != ExportStep::Finished {}
        ex.finish().unwrap()
    }

    #[test]
    fn writes_header_and_rows_per_channel() {
        let mut storage = MemStorage::new();
        storage.mount().unwrap();
        storage.put(
            "DATA1.DAT",
            raw(&[
                (10, [2, 0, 4, 0, 0xFE, 0xFF], pins::SOURCE_LSM6DSX_ACCEL),
                (20, [1, 0, 0, 0, 0, 0], pins::SOURCE_LSM6DSX_GYRO),
                (30, [0, 0, 0, 0, 6, 0], pins::SOURCE_LSM6DSX_ACCEL),
            ]),
        );

        assert_eq!(run(&mut storage, 1), 3);

        assert_eq!(
            storage.text("LSM_ac1.csv").unwrap(),
            "Time (us),Accel_x (g),Accel_y (g),Accel_z (g)\n\
             10,1.000000,2.000000,-1.000000\n\
             30,0.000000,0.000000,3.000000\n"
        );
        assert_eq!(
            storage.text("LSM_gy1.csv").unwrap(),
            "Time (us),Rate_x (dps),Rate_y (dps),Rate_z (dps)\n\
             20,0.500000,0.000000,0.000000\n"
        );
        assert!(storage.text("IIS_ac1.csv").is_none());
    }

    #[test]
    fn unknown_source_is_skipped() {
        let mut storage = MemStorage::new();
        storage.mount().unwrap();
        storage.put("DATA1.DAT", raw(&[(1, [0; PAYLOAD_LEN], 0x0001)]));

        let reader = storage.open("DATA1.DAT").unwrap();
        let mut ex = Exporter::<MemStorage>::open(reader, 1);
        assert_eq!(ex.step(&mut storage, &Scale(1.0)).unwrap(), ExportStep::Skipped);
        assert_eq!(ex.step(&mut storage, &Scale(1.0)).unwrap(), ExportStep::Finished);
        assert_eq!(ex.finish().unwrap(), 0);
    }

    #[test]
    fn partial_trailing_record_ends_the_export() {
        let mut storage = MemStorage::new();
        storage.mount().unwrap();
        let mut bytes = raw(&[(5, [0; PAYLOAD_LEN], pins::SOURCE_IIS3DWB_ACCEL)]);
        bytes.extend_from_slice(&[1, 2, 3]);
        storage.put("DATA1.DAT", bytes);

        assert_eq!(run(&mut storage, 1), 1);
        assert!(storage.text("IIS_ac1.csv").unwrap().ends_with("5,0.000000,0.000000,0.000000\n"));
    }

    #[test]
    fn second_run_produces_identical_files() {
        let mut storage = MemStorage::new();
        storage.mount().unwrap();
        storage.put(
            "DATA1.DAT",
            raw(&[
                (1, [1, 2, 3, 4, 5, 6], pins::SOURCE_ADXL37X_ACCEL),
                (2, [9, 8, 7, 6, 5, 4], pins::SOURCE_IIS3DWB_ACCEL),
                (3, [0xFF; PAYLOAD_LEN], pins::SOURCE_ADXL37X_ACCEL),
            ]),
        );

        run(&mut storage, 1);
        let first = (storage.text("ADX_ac1.csv"), storage.text("IIS_ac1.csv"));
        run(&mut storage, 1);
        let second = (storage.text("ADX_ac1.csv"), storage.text("IIS_ac1.csv"));
        assert_eq!(first, second);
        assert!(first.0.is_some() && first.1.is_some());
    }

    #[test]
    fn csv_names_carry_the_trial_number() {
        let mut storage = MemStorage::new();
        storage.mount().unwrap();
        storage.put(
            "DATA1.DAT",
            raw(&[(1, [0; PAYLOAD_LEN], pins::SOURCE_ADXL37X_ACCEL)]),
        );
        run(&mut storage, 7);
        assert!(storage.text("ADX_ac7.csv").is_some());
    }
}
