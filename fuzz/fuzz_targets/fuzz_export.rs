//! Fuzz target: `Exporter::step`
//!
//! Treats arbitrary bytes as a raw recording and converts it to CSV.
//! The exporter must never panic, must stop at a partial trailing
//! record, and must write exactly one row per record with a known source.
//!
//! cargo fuzz run fuzz_export

#![no_main]

use impack::adapters::storage::MemStorage;
use impack::app::ports::StoragePort;
use impack::capture::{ExportStep, Exporter, PAYLOAD_LEN, RECORD_SIZE, RawSample, SampleDecoder};
use impack::config::ChannelId;
use libfuzzer_sys::fuzz_target;

struct Raw;

impl SampleDecoder for Raw {
    fn decode(&self, _: ChannelId, payload: &[u8; PAYLOAD_LEN]) -> [f32; 3] {
        let axis = |i: usize| f32::from(i16::from_le_bytes([payload[i], payload[i + 1]]));
        [axis(0), axis(2), axis(4)]
    }
}

fuzz_target!(|data: &[u8]| {
    let mut storage = MemStorage::new();
    if storage.mount().is_err() {
        return;
    }
    storage.put("DATA1.DAT", data.to_vec());

    let known = data
        .chunks_exact(RECORD_SIZE)
        .filter_map(|c| <&[u8; RECORD_SIZE]>::try_from(c).ok())
        .filter(|c| ChannelId::from_source_id(RawSample::from_bytes(c).source_id).is_some())
        .count() as u32;

    let Ok(reader) = storage.open("DATA1.DAT") else {
        return;
    };
    let mut exporter = Exporter::<MemStorage>::open(reader, 1);
    let mut steps = 0usize;
    loop {
        match exporter.step(&mut storage, &Raw) {
            Ok(ExportStep::Finished) => break,
            Ok(_) => steps += 1,
            Err(e) => panic!("in-memory export failed: {e}"),
        }
        assert!(steps <= data.len() / RECORD_SIZE, "exporter read past the end");
    }

    assert_eq!(exporter.finish().ok(), Some(known));
});
