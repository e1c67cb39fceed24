//! IMpack Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  FsStorage (SD)   GpioInterruptGate   LogEventSink   uptime_us │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │          RecorderService (session logic)               │    │
//! │  │  FSM · SensorBank · StreamLogger · Exporter            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  data-ready ISRs ──▶ CaptureRing (phase 1)                     │
//! │  transfer task   ──▶ SensorBank burst reads (phase 2)          │
//! │  main loop       ──▶ poll + StreamLogger writes                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use log::{info, warn};

use impack::adapters::log_sink::LogEventSink;
use impack::adapters::storage::FsStorage;
use impack::adapters::time::uptime_us;
use impack::app::service::RecorderService;
use impack::capture::{CaptureRing, SlotArray};
use impack::drivers::button::{ButtonDriver, ButtonLatch};
use impack::drivers::hw_init::{self, GpioInterruptGate, SpiPeripherals};
use impack::fsm::StateId;
use impack::pins;

/// Capture ring capacity in samples.
const RING_SLOTS: usize = 8192;

static SLOTS: SlotArray<RING_SLOTS> = SlotArray::new();
static RING: CaptureRing<'static> = CaptureRing::new(&SLOTS);
static BUTTON: ButtonLatch = ButtonLatch::new();

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  IMpack v{}                          ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    hw_init::init_gpio()?;
    let sensors = hw_init::init_sensors(SpiPeripherals {
        spi: peripherals.spi2,
        sclk: peripherals.pins.gpio12,
        mosi: peripherals.pins.gpio11,
        miso: peripherals.pins.gpio13,
        cs_lsm: peripherals.pins.gpio10,
        cs_iis: peripherals.pins.gpio9,
        cs_adxl: peripherals.pins.gpio46,
    })?;
    hw_init::init_isr_service(&RING, &BUTTON)?;

    // ── 3. Recorder ───────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut recorder = RecorderService::new(
        &RING,
        sensors,
        FsStorage::new(pins::SD_MOUNT_POINT),
        GpioInterruptGate::new(),
    );
    if let Err(e) = recorder.setup(uptime_us(), &mut sink) {
        warn!("setup failed ({e}), holding in Error");
    }
    recorder.start(&mut sink);
    hw_init::spawn_transfer_task(&RING, recorder.sensors())?;

    let mut button = ButtonDriver::new(&BUTTON);

    // ── 4. Main loop ──────────────────────────────────────────
    loop {
        let pressed = button.tick();
        let now = uptime_us();
        recorder.poll(now, pressed, &mut sink);
        hw_init::set_status_led(recorder.led_level(now));
        recorder.report_overruns();

        // Capture states poll fast to flush halves promptly; phase 2 runs
        // in its own task either way.
        match recorder.state() {
            StateId::Armed | StateId::Recording | StateId::Saving => FreeRtos::delay_ms(1),
            StateId::Idle | StateId::Staging | StateId::Error => FreeRtos::delay_ms(5),
        }
    }
}
