//! End-to-end recorder sessions against the simulated board.

use impack::adapters::settings::SETTINGS_FILE;
use impack::adapters::storage::MemStorage;
use impack::app::events::SessionEvent;
use impack::app::ports::StoragePort;
use impack::app::service::RecorderService;
use impack::capture::{CaptureRing, RECORD_SIZE, RawSample};
use impack::config::SettingsOutcome;
use impack::error::{Error, SensorError};
use impack::fsm::StateId;
use impack::pins;

use super::mock_hw::{
    CollectingSink, IIS_WHO_AM_I, LSM_OUTX_L_G, LSM_OUTX_L_XL, RecordingGate, SimBoard, ring, slots,
};

type Recorder<'r> = RecorderService<'r, MemStorage, RecordingGate>;

/// Boot a recorder with `settings` (JSON) on the card.
fn boot<'r>(
    ring: &'r CaptureRing<'r>,
    board: &SimBoard,
    storage: &MemStorage,
    settings: &str,
    sink: &mut CollectingSink,
) -> Recorder<'r> {
    storage.put(SETTINGS_FILE, settings.as_bytes().to_vec());
    let mut rec = RecorderService::new(ring, board.bank(), storage.clone(), RecordingGate::default());
    assert_eq!(rec.setup(0, sink), Ok(SettingsOutcome::Loaded));
    rec.start(sink);
    rec
}

/// Capture and transfer one LSM accelerometer sample.
fn lsm_sample(rec: &mut Recorder<'_>, now_us: u32) {
    assert!(rec.data_ready(now_us, pins::SOURCE_LSM6DSX_ACCEL));
    assert_eq!(rec.service_transfers(), 1);
}

/// Poll until the recorder leaves Saving.
fn finish_saving(rec: &mut Recorder<'_>, now_us: u32, sink: &mut CollectingSink) {
    for _ in 0..64 {
        if rec.state() != StateId::Saving {
            return;
        }
        rec.poll(now_us, false, sink);
    }
    panic!("recorder stuck in Saving");
}

#[test]
fn button_without_delay_arms_in_one_poll() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(&ring, &board, &storage, r#"{ "delay_before_armed_ms": 0 }"#, &mut sink);

    rec.poll(1_000, true, &mut sink);

    assert_eq!(rec.state(), StateId::Armed);
    assert!(rec.interrupts().enabled);
    assert!(storage.is_mounted());
    assert!(sink.contains(&SessionEvent::RecordingOpened {
        trial: 1,
        channels: 0b1111,
    }));
}

#[test]
fn full_session_records_and_exports() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(&ring, &board, &storage, r#"{ "recording_length_ms": 10 }"#, &mut sink);

    rec.poll(1_000, true, &mut sink);
    rec.poll(2_000, false, &mut sink);
    assert_eq!(rec.state(), StateId::Recording);

    board.lsm.set_axes_le(LSM_OUTX_L_XL, [1024, 0, -1024]);
    for i in 1..=3 {
        lsm_sample(&mut rec, 2_000 + 100 * i);
    }

    rec.poll(5_000, false, &mut sink);
    assert_eq!(rec.state(), StateId::Recording);
    rec.poll(12_000, false, &mut sink);
    assert_eq!(rec.state(), StateId::Saving);
    assert!(!rec.interrupts().enabled);

    finish_saving(&mut rec, 13_000, &mut sink);
    assert_eq!(rec.state(), StateId::Idle);

    let raw = storage.file("DATA1.DAT").unwrap();
    assert_eq!(raw.len(), 3 * RECORD_SIZE);
    let first = RawSample::from_bytes(raw[..RECORD_SIZE].try_into().unwrap());
    assert_eq!(first.capture_timestamp, 100);
    assert_eq!(first.source_id, pins::SOURCE_LSM6DSX_ACCEL);

    assert_eq!(
        storage.text("LSM_ac1.csv").unwrap(),
        "Time (us),Accel_x (g),Accel_y (g),Accel_z (g)\n\
         100,1.000000,0.000000,-1.000000\n\
         200,1.000000,0.000000,-1.000000\n\
         300,1.000000,0.000000,-1.000000\n"
    );

    assert!(sink.contains(&SessionEvent::RecordingSaved {
        trial: 1,
        records: 3,
        overruns: 0,
    }));
    assert!(sink.contains(&SessionEvent::ExportFinished { trial: 1, records: 3 }));
    assert!(sink.contains(&SessionEvent::StateChanged {
        from: StateId::Saving,
        to: StateId::Idle,
    }));
    assert_eq!(sink.faults(), 0);
}

#[test]
fn button_stops_recording_early() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(
        &ring,
        &board,
        &storage,
        r#"{ "recording_length_ms": 60000, "data_formatting_enabled": false }"#,
        &mut sink,
    );

    rec.poll(1_000, true, &mut sink);
    rec.poll(2_000, false, &mut sink);
    lsm_sample(&mut rec, 2_050);
    rec.poll(3_000, true, &mut sink);
    assert_eq!(rec.state(), StateId::Saving);

    rec.poll(3_100, false, &mut sink);
    assert_eq!(rec.state(), StateId::Idle);
    assert_eq!(storage.file("DATA1.DAT").map(|f| f.len()), Some(RECORD_SIZE));
    assert!(storage.text("LSM_ac1.csv").is_none());
}

#[test]
fn trial_number_follows_highest_existing_file() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    storage.put("DATA1.DAT", Vec::new());
    storage.put("DATA7.DAT", Vec::new());
    storage.put("NOTES.TXT", Vec::new());
    let mut sink = CollectingSink::new();
    let mut rec = boot(&ring, &board, &storage, "{}", &mut sink);

    rec.poll(1_000, true, &mut sink);

    assert_eq!(rec.trial(), 8);
    assert_eq!(storage.file("DATA8.DAT"), Some(Vec::new()));
}

#[test]
fn staging_delay_and_cancel() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(&ring, &board, &storage, r#"{ "delay_before_armed_ms": 50 }"#, &mut sink);

    rec.poll(1_000, true, &mut sink);
    assert_eq!(rec.state(), StateId::Staging);
    rec.poll(20_000, true, &mut sink);
    assert_eq!(rec.state(), StateId::Idle);

    rec.poll(100_000, true, &mut sink);
    rec.poll(149_999, false, &mut sink);
    assert_eq!(rec.state(), StateId::Staging);
    rec.poll(150_000, false, &mut sink);
    assert_eq!(rec.state(), StateId::Armed);
}

#[test]
fn trigger_fires_only_on_accelerometer_over_threshold() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(
        &ring,
        &board,
        &storage,
        r#"{ "trigger": { "enabled": true, "any_axis": false, "axis": 2, "level_mg": 500, "rising_edge": true } }"#,
        &mut sink,
    );

    rec.poll(1_000, true, &mut sink);
    assert_eq!(rec.state(), StateId::Armed);

    // 0.1 g on z: below threshold.
    board.lsm.set_axes_le(LSM_OUTX_L_XL, [0, 0, 102]);
    lsm_sample(&mut rec, 1_100);
    rec.poll(1_200, false, &mut sink);
    assert_eq!(rec.state(), StateId::Armed);

    // Huge gyro reading: never a trigger source.
    board.lsm.set_axes_le(LSM_OUTX_L_G, [i16::MAX; 3]);
    assert!(rec.data_ready(1_300, pins::SOURCE_LSM6DSX_GYRO));
    rec.service_transfers();
    rec.poll(1_400, false, &mut sink);
    assert_eq!(rec.state(), StateId::Armed);

    // -1 g on z: magnitude over threshold.
    board.lsm.set_axes_le(LSM_OUTX_L_XL, [0, 0, -1024]);
    lsm_sample(&mut rec, 1_500);
    rec.poll(1_600, false, &mut sink);
    assert_eq!(rec.state(), StateId::Recording);
}

#[test]
fn identity_mismatch_halts_in_error() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    board.iis.set(IIS_WHO_AM_I, 0x00);
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();

    let mut rec = RecorderService::new(&ring, board.bank(), storage.clone(), RecordingGate::default());
    let err = rec.setup(0, &mut sink).unwrap_err();
    assert_eq!(
        err,
        Error::Sensor(SensorError::IdentityMismatch {
            register: 0x0F,
            expected: 0x7B,
            found: 0x00,
        })
    );

    rec.start(&mut sink);
    assert_eq!(rec.state(), StateId::Error);
    rec.poll(1_000, true, &mut sink);
    assert_eq!(rec.state(), StateId::Error);
    assert!(storage.names().is_empty());
}

#[test]
fn full_ring_drops_newest_and_reports_overruns() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(
        &ring,
        &board,
        &storage,
        r#"{ "recording_length_ms": 10, "data_formatting_enabled": false }"#,
        &mut sink,
    );

    rec.poll(1_000, true, &mut sink);
    rec.poll(2_000, false, &mut sink);

    let accepted = (1..=9)
        .filter(|i| rec.data_ready(2_000 + i, pins::SOURCE_IIS3DWB_ACCEL))
        .count();
    assert_eq!(accepted, 7);
    assert_eq!(rec.service_transfers(), 7);

    rec.poll(3_000, false, &mut sink);
    rec.poll(12_000, false, &mut sink);
    finish_saving(&mut rec, 12_500, &mut sink);

    assert_eq!(storage.file("DATA1.DAT").map(|f| f.len()), Some(7 * RECORD_SIZE));
    assert!(sink.contains(&SessionEvent::RecordingSaved {
        trial: 1,
        records: 7,
        overruns: 2,
    }));
}

#[test]
fn write_failure_during_recording_is_not_fatal() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(
        &ring,
        &board,
        &storage,
        r#"{ "recording_length_ms": 10, "data_formatting_enabled": false }"#,
        &mut sink,
    );

    rec.poll(1_000, true, &mut sink);
    rec.poll(2_000, false, &mut sink);
    storage.fail_writes(true);
    for i in 1..=4 {
        lsm_sample(&mut rec, 2_000 + i);
    }
    rec.poll(3_000, false, &mut sink);
    assert_eq!(rec.state(), StateId::Recording);

    rec.poll(12_000, false, &mut sink);
    finish_saving(&mut rec, 12_500, &mut sink);
    assert_eq!(rec.state(), StateId::Idle);

    // The next session works once the card accepts writes again.
    storage.fail_writes(false);
    rec.poll(20_000, true, &mut sink);
    assert_eq!(rec.state(), StateId::Armed);
    assert_eq!(rec.trial(), 2);
}

#[test]
fn sensors_are_enabled_only_while_capturing() {
    let slots = slots();
    let ring = ring(&slots);
    let board = SimBoard::new();
    let storage = MemStorage::new();
    let mut sink = CollectingSink::new();
    let mut rec = boot(&ring, &board, &storage, r#"{ "recording_length_ms": 10 }"#, &mut sink);
    const IIS_CTRL1_XL: u8 = 0x10;
    const ADXL_POWER_CTL: u8 = 0x3F;

    assert_eq!(board.iis.get(IIS_CTRL1_XL), 0);

    rec.poll(1_000, true, &mut sink);
    assert_ne!(board.iis.get(IIS_CTRL1_XL), 0);
    assert_eq!(board.adxl.get(ADXL_POWER_CTL) & 0x03, 0x03);

    rec.poll(2_000, false, &mut sink);
    rec.poll(12_000, false, &mut sink);
    assert_eq!(board.iis.get(IIS_CTRL1_XL), 0);
    assert_ne!(board.adxl.get(ADXL_POWER_CTL) & 0x03, 0x03);
    assert_eq!(rec.interrupts().history.last(), Some(&false));
}
