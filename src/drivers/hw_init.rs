//! One-shot hardware peripheral initialization.
//!
//! Configures the shared SPI bus and the three sensor chip selects, the
//! data-ready and button GPIO interrupts, the phase-2 transfer task, the
//! status LED, and the SDMMC card mount.  Mixes `esp-idf-hal` (the SPI drivers implement
//! `embedded_hal::spi::SpiDevice`, which the sensor drivers consume) with
//! raw ESP-IDF sys calls for GPIO and the FAT volume.  Called once from
//! `main()` before the loop starts.
//!
//! Host builds get inert stand-ins so the library and its tests compile
//! off-target.

use crate::app::ports::InterruptPort;
use crate::error::{Error, StorageError};
use crate::pins;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    SpiInitFailed,
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SpiInitFailed => write!(f, "SPI bus/device init failed"),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

impl From<HwInitError> for Error {
    fn from(e: HwInitError) -> Self {
        match e {
            HwInitError::SpiInitFailed => Self::Init("SPI"),
            HwInitError::GpioConfigFailed(_) => Self::Init("GPIO"),
            HwInitError::IsrInstallFailed(_) => Self::Init("GPIO ISR service"),
        }
    }
}

// ── GPIO ──────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_gpio() -> Result<(), HwInitError> {
    let mut inputs = 1u64 << pins::BUTTON_GPIO;
    for &pin in &pins::DATA_READY_GPIOS {
        inputs |= 1u64 << pin;
    }

    // Data-ready lines and the button are active high; interrupts stay
    // masked until the recorder enables capture.
    let input_cfg = gpio_config_t {
        pin_bit_mask: inputs,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    // SAFETY: called once from main() before any ISR is registered.
    let ret = unsafe { gpio_config(&input_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    let led_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::STATUS_LED_GPIO,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: as above.
    let ret = unsafe { gpio_config(&led_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    set_status_led(false);

    info!("hw_init: GPIO configured (4 data-ready lines, button, LED)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_gpio() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): GPIO init skipped");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn set_status_led(on: bool) {
    // SAFETY: output pin configured in init_gpio(); main loop only.
    unsafe {
        gpio_set_level(pins::STATUS_LED_GPIO, u32::from(on));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn set_status_led(_on: bool) {}

// ── SPI sensors ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct SpiPeripherals {
    pub spi: esp_idf_svc::hal::spi::SPI2,
    pub sclk: esp_idf_svc::hal::gpio::Gpio12,
    pub mosi: esp_idf_svc::hal::gpio::Gpio11,
    pub miso: esp_idf_svc::hal::gpio::Gpio13,
    pub cs_lsm: esp_idf_svc::hal::gpio::Gpio10,
    pub cs_iis: esp_idf_svc::hal::gpio::Gpio9,
    pub cs_adxl: esp_idf_svc::hal::gpio::Gpio46,
}

/// Bring up SPI2 and build the sensor table: LSM6DSx accel + gyro share
/// one chip select, IIS3DWB and ADXL37x have their own.
#[cfg(target_os = "espidf")]
pub fn init_sensors(p: SpiPeripherals) -> Result<crate::sensors::SensorBank, HwInitError> {
    use std::sync::Arc;

    use esp_idf_svc::hal::gpio::AnyOutputPin;
    use esp_idf_svc::hal::prelude::*;
    use esp_idf_svc::hal::spi::config::{Config, MODE_3};
    use esp_idf_svc::hal::spi::{SpiDeviceDriver, SpiDriver, SpiDriverConfig};

    use crate::sensors::{Adxl37x, Iis3dwb, Lsm6dsx, LsmChannel, SensorBank, SharedSpi};

    let bus = SpiDriver::new(p.spi, p.sclk, p.mosi, Some(p.miso), &SpiDriverConfig::new())
        .map_err(|_| HwInitError::SpiInitFailed)?;
    let bus = Arc::new(bus);
    let config = Config::new().baudrate(pins::SPI_BAUD_HZ.Hz()).data_mode(MODE_3);

    let device = |cs: AnyOutputPin| {
        SpiDeviceDriver::new(Arc::clone(&bus), Some(cs), &config)
            .map_err(|_| HwInitError::SpiInitFailed)
    };
    let lsm = SharedSpi::new(device(p.cs_lsm.into())?);
    let iis = device(p.cs_iis.into())?;
    let adxl = device(p.cs_adxl.into())?;

    let mut bank = SensorBank::new();
    bank.insert(Box::new(Lsm6dsx::new(lsm.clone(), LsmChannel::Accel)));
    bank.insert(Box::new(Lsm6dsx::new(lsm, LsmChannel::Gyro)));
    bank.insert(Box::new(Iis3dwb::new(iis)));
    bank.insert(Box::new(Adxl37x::new(adxl)));

    info!("hw_init: SPI2 @ {} Hz, 4 sensor channels", pins::SPI_BAUD_HZ);
    Ok(bank)
}

// ── GPIO ISR service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod isr {
    use core::num::NonZeroU32;
    use core::sync::atomic::{AtomicPtr, Ordering};

    use esp_idf_svc::hal::task::notification::Notifier;

    use crate::capture::{CaptureRing, SourceId};
    use crate::drivers::button::ButtonLatch;

    pub(super) static RING: AtomicPtr<CaptureRing<'static>> = AtomicPtr::new(core::ptr::null_mut());
    pub(super) static BUTTON: AtomicPtr<ButtonLatch> = AtomicPtr::new(core::ptr::null_mut());
    /// Wakes the transfer task; null until it has started.
    pub(super) static TRANSFER: AtomicPtr<Notifier> = AtomicPtr::new(core::ptr::null_mut());

    fn now_us() -> u32 {
        // SAFETY: esp_timer_get_time is an RTC counter read; safe in ISR context.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u32
    }

    /// `arg` carries the line's source id.
    pub(super) unsafe extern "C" fn data_ready_isr(arg: *mut core::ffi::c_void) {
        let ring = RING.load(Ordering::Acquire);
        // SAFETY: the pointer comes from a `&'static CaptureRing` stored
        // before any handler was added.
        if let Some(ring) = unsafe { ring.as_ref() } {
            ring.capture_edge(now_us(), arg as usize as SourceId);
        }
        let transfer = TRANSFER.load(Ordering::Acquire);
        // SAFETY: the pointer comes from an `Arc<Notifier>` leaked by the
        // transfer task; notify_and_yield is ISR-safe.
        if let Some(transfer) = unsafe { transfer.as_ref() } {
            unsafe { transfer.notify_and_yield(NonZeroU32::MIN) };
        }
    }

    pub(super) unsafe extern "C" fn button_isr(_arg: *mut core::ffi::c_void) {
        let latch = BUTTON.load(Ordering::Acquire);
        // SAFETY: as above, from a `&'static ButtonLatch`.
        if let Some(latch) = unsafe { latch.as_ref() } {
            latch.record_edge(now_us());
        }
    }
}

/// Install the per-pin GPIO ISR service, route every data-ready line to
/// phase 1 of `ring` and the button to `button`.  Data-ready interrupts
/// stay disabled until [`GpioInterruptGate::enable_capture`].
#[cfg(target_os = "espidf")]
pub fn init_isr_service(
    ring: &'static crate::capture::CaptureRing<'static>,
    button: &'static crate::drivers::button::ButtonLatch,
) -> Result<(), HwInitError> {
    use core::sync::atomic::Ordering;

    isr::RING.store(core::ptr::from_ref(ring).cast_mut(), Ordering::Release);
    isr::BUTTON.store(core::ptr::from_ref(button).cast_mut(), Ordering::Release);

    let lines = [
        (pins::LSM6DSX_INT1_GPIO, pins::SOURCE_LSM6DSX_ACCEL),
        (pins::LSM6DSX_INT2_GPIO, pins::SOURCE_LSM6DSX_GYRO),
        (pins::IIS3DWB_INT1_GPIO, pins::SOURCE_IIS3DWB_ACCEL),
        (pins::ADXL37X_INT1_GPIO, pins::SOURCE_ADXL37X_ACCEL),
    ];

    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.  The handlers only touch lock-free
    // atomics.
    unsafe {
        let ret = gpio_install_isr_service(ESP_INTR_FLAG_IRAM as i32);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        for (pin, source_id) in lines {
            gpio_intr_disable(pin);
            let ret = gpio_isr_handler_add(
                pin,
                Some(isr::data_ready_isr),
                usize::from(source_id) as *mut core::ffi::c_void,
            );
            if ret != ESP_OK {
                return Err(HwInitError::IsrInstallFailed(ret));
            }
        }

        let ret = gpio_isr_handler_add(pins::BUTTON_GPIO, Some(isr::button_isr), core::ptr::null_mut());
        if ret != ESP_OK {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        gpio_intr_enable(pins::BUTTON_GPIO);
    }

    info!("hw_init: ISR service installed (4 data-ready lines, button)");
    Ok(())
}

// ── Phase-2 transfer task ─────────────────────────────────────

/// FreeRTOS priority of the transfer task; above the main task (1) so a
/// blocked card write never holds up a burst.
#[cfg(target_os = "espidf")]
const TRANSFER_PRIORITY: u8 = 20;

/// Upper bound on the wait between transfers, covering an edge whose
/// notification raced the previous drain.
#[cfg(target_os = "espidf")]
const TRANSFER_POLL_MS: u32 = 10;

/// Start the task that runs phase 2 for `ring`, woken by the data-ready
/// ISRs.  It lives for the rest of the program.
#[cfg(target_os = "espidf")]
pub fn spawn_transfer_task(
    ring: &'static crate::capture::CaptureRing<'static>,
    sensors: crate::sensors::SharedBank,
) -> Result<(), Error> {
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use esp_idf_svc::hal::delay::TickType;
    use esp_idf_svc::hal::task::notification::Notification;

    use super::task_pin::{Core, spawn_on_core};
    use crate::app::transfer::run_transfers;

    static RUNNING: AtomicBool = AtomicBool::new(true);

    spawn_on_core(Core::App, TRANSFER_PRIORITY, 8, "transfer\0", move || {
        // The notification is bound to the task that creates it.
        let notification = Notification::new();
        let notifier = Arc::into_raw(notification.notifier());
        isr::TRANSFER.store(notifier.cast_mut(), Ordering::Release);

        let ticks = TickType::new_millis(u64::from(TRANSFER_POLL_MS)).ticks();
        run_transfers(ring, &sensors, &RUNNING, || {
            notification.wait(ticks);
        });
    })
    .map_err(|e| {
        log::error!("hw_init: transfer task spawn failed: {e}");
        Error::Init("transfer task")
    })?;

    info!("hw_init: transfer task started");
    Ok(())
}

/// [`InterruptPort`] over the data-ready GPIO interrupts.
#[derive(Debug, Default)]
pub struct GpioInterruptGate {
    enabled: bool,
}

impl GpioInterruptGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl InterruptPort for GpioInterruptGate {
    fn enable_capture(&mut self) {
        #[cfg(target_os = "espidf")]
        for &pin in &pins::DATA_READY_GPIOS {
            // SAFETY: handlers were registered in init_isr_service().
            unsafe { gpio_intr_enable(pin) };
        }
        self.enabled = true;
    }

    fn disable_capture(&mut self) {
        #[cfg(target_os = "espidf")]
        for &pin in &pins::DATA_READY_GPIOS {
            // SAFETY: masking an interrupt is always sound.
            unsafe { gpio_intr_disable(pin) };
        }
        self.enabled = false;
    }
}

// ── SD card (SDMMC 4-bit, FAT) ───────────────────────────────

#[cfg(target_os = "espidf")]
static SD_CARD: core::sync::atomic::AtomicPtr<sdmmc_card_t> =
    core::sync::atomic::AtomicPtr::new(core::ptr::null_mut());

#[cfg(target_os = "espidf")]
const SD_MOUNT_POINT_C: &core::ffi::CStr = c"/sdcard";

/// Mount the card's FAT volume at [`pins::SD_MOUNT_POINT`].
#[cfg(target_os = "espidf")]
pub fn mount_sd_card() -> Result<(), StorageError> {
    use core::sync::atomic::Ordering;

    let host = sdmmc_host_t {
        flags: SDMMC_HOST_FLAG_4BIT | SDMMC_HOST_FLAG_1BIT | SDMMC_HOST_FLAG_DDR,
        slot: SDMMC_HOST_SLOT_1 as i32,
        max_freq_khz: SDMMC_FREQ_HIGHSPEED as i32,
        io_voltage: 3.3,
        init: Some(sdmmc_host_init),
        set_bus_width: Some(sdmmc_host_set_bus_width),
        get_bus_width: Some(sdmmc_host_get_slot_width),
        set_bus_ddr_mode: Some(sdmmc_host_set_bus_ddr_mode),
        set_card_clk: Some(sdmmc_host_set_card_clk),
        set_cclk_always_on: Some(sdmmc_host_set_cclk_always_on),
        do_transaction: Some(sdmmc_host_do_transaction),
        __bindgen_anon_1: sdmmc_host_t__bindgen_ty_1 {
            deinit: Some(sdmmc_host_deinit),
        },
        io_int_enable: Some(sdmmc_host_io_int_enable),
        io_int_wait: Some(sdmmc_host_io_int_wait),
        get_real_freq: Some(sdmmc_host_get_real_freq),
        ..Default::default()
    };

    let slot = sdmmc_slot_config_t {
        clk: pins::SD_CLK_GPIO,
        cmd: pins::SD_CMD_GPIO,
        d0: pins::SD_D0_GPIO,
        d1: pins::SD_D1_GPIO,
        d2: pins::SD_D2_GPIO,
        d3: pins::SD_D3_GPIO,
        d4: -1,
        d5: -1,
        d6: -1,
        d7: -1,
        __bindgen_anon_1: sdmmc_slot_config_t__bindgen_ty_1 { cd: -1 },
        __bindgen_anon_2: sdmmc_slot_config_t__bindgen_ty_2 { wp: -1 },
        width: 4,
        flags: SDMMC_SLOT_FLAG_INTERNAL_PULLUP,
        ..Default::default()
    };

    let mount = esp_vfs_fat_sdmmc_mount_config_t {
        format_if_mount_failed: false,
        max_files: 6,
        allocation_unit_size: 16 * 1024,
        ..Default::default()
    };

    let mut card: *mut sdmmc_card_t = core::ptr::null_mut();
    // SAFETY: all configs outlive the call; `card` receives an allocation
    // owned by the VFS layer until esp_vfs_fat_sdcard_unmount.
    let ret = unsafe {
        esp_vfs_fat_sdmmc_mount(
            SD_MOUNT_POINT_C.as_ptr(),
            &host,
            core::ptr::from_ref(&slot).cast(),
            &mount,
            &mut card,
        )
    };
    if ret != ESP_OK {
        log::warn!("hw_init: SD mount failed (rc={})", ret);
        return Err(StorageError::MountFailed);
    }

    SD_CARD.store(card, Ordering::Release);
    info!("hw_init: SD card mounted at {}", pins::SD_MOUNT_POINT);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn unmount_sd_card() {
    use core::sync::atomic::Ordering;

    let card = SD_CARD.swap(core::ptr::null_mut(), Ordering::AcqRel);
    if card.is_null() {
        return;
    }
    // SAFETY: `card` came from a successful mount and is released once.
    let ret = unsafe { esp_vfs_fat_sdcard_unmount(SD_MOUNT_POINT_C.as_ptr(), card) };
    if ret != ESP_OK {
        log::warn!("hw_init: SD unmount failed (rc={})", ret);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mount_sd_card() -> Result<(), StorageError> {
    log::info!("hw_init(sim): SD mount at {} skipped", pins::SD_MOUNT_POINT);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn unmount_sd_card() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_tracks_enable_state() {
        let mut gate = GpioInterruptGate::new();
        assert!(!gate.is_enabled());
        gate.enable_capture();
        assert!(gate.is_enabled());
        gate.disable_capture();
        assert!(!gate.is_enabled());
    }

    #[test]
    fn init_errors_map_to_init_faults() {
        assert_eq!(Error::from(HwInitError::SpiInitFailed), Error::Init("SPI"));
        assert_eq!(
            HwInitError::IsrInstallFailed(-1).to_string(),
            "GPIO ISR service install failed (rc=-1)"
        );
    }
}
