//! BME280 pressure/temperature/humidity driver (register protocol)
//!
//! Non-blocking driver for the Bosch BME280. All bus traffic goes through
//! an injected [`Transport`]; scheduling is driven by an external
//! [`tick`](Bme280::tick). The register protocol permits repeated-start
//! write+read transactions, so reads address a register and fetch in one
//! transport call.
//!
//! Acquisition modes follow the device:
//!
//! - **Forced**: one conversion per request, back to sleep afterwards.
//! - **Normal**: the device free-runs at `standby + conversion` intervals
//!   and the driver fetches the latest sample.
//! - **Sleep**: no sampling; measurement requests are rejected.
//!
//! Configuration writes always use the safe sequence — `ctrl_meas` to
//! SLEEP, then `config`, `ctrl_hum`, and finally `ctrl_meas` with the
//! target mode — because `config` and `ctrl_hum` only latch reliably while
//! the device sleeps.

pub mod calibration;
pub mod registers;

pub use self::calibration::Calibration;
pub use self::registers::CHIP_ID;

use crate::clock::{self, time_reached, Clock};
use crate::health::{DriverState, HealthMonitor};
use crate::schedule::{fetch_margin_ms, Scheduler};
use crate::status::{Error, ErrorKind, Result, Scheduled};
use crate::transport::Transport;

use self::registers::{
    build_config, build_ctrl_hum, build_ctrl_meas, CALIB_H_LEN, CALIB_TP_LEN, DATA_LEN,
    MASK_STATUS_IM_UPDATE, MASK_STATUS_MEASURING, REG_CALIB_H1, REG_CALIB_H_START,
    REG_CALIB_TP_START, REG_CHIP_ID, REG_CONFIG, REG_CTRL_HUM, REG_CTRL_MEAS, REG_DATA_START,
    REG_RESET, REG_STATUS, RESET_VALUE,
};

/// SDO pin low (GND).
pub const I2C_ADDR_LOW: u8 = 0x76;
/// SDO pin high (VDD).
pub const I2C_ADDR_HIGH: u8 = 0x77;

const GENERAL_CALL_ADDR: u8 = 0x00;
const GENERAL_CALL_RESET_BYTE: u8 = 0x06;

const MAX_WRITE_LEN: usize = 16;
const RESET_TIMEOUT_MS: u32 = 10;
const RESET_POLL_LIMIT: u32 = 100;
const RESET_DELAY_MS: u32 = 2;
const MEASUREMENT_MARGIN_US: u32 = 1000;

/// Oversampling setting per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oversampling {
    /// Channel disabled; its output reads as 0x80000/0x8000
    Skip,
    /// 1x
    X1,
    /// 2x
    X2,
    /// 4x
    X4,
    /// 8x
    X8,
    /// 16x
    X16,
}

impl Oversampling {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Skip => 0,
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 3,
            Self::X8 => 4,
            Self::X16 => 5,
        }
    }

    fn multiplier(self) -> u32 {
        match self {
            Self::Skip => 0,
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
        }
    }
}

/// Device power/measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// No measurements, lowest power
    Sleep,
    /// One measurement, then back to sleep
    Forced,
    /// Continuous measurements paced by [`Standby`]
    Normal,
}

impl Mode {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Sleep => 0,
            Self::Forced => 1,
            Self::Normal => 3,
        }
    }
}

/// IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    /// Filter off
    Off,
    /// Coefficient 2
    X2,
    /// Coefficient 4
    X4,
    /// Coefficient 8
    X8,
    /// Coefficient 16
    X16,
}

impl Filter {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::X2 => 1,
            Self::X4 => 2,
            Self::X8 => 3,
            Self::X16 => 4,
        }
    }
}

/// Standby interval between normal-mode measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Standby {
    /// 0.5 ms
    Ms0_5,
    /// 62.5 ms
    Ms62_5,
    /// 125 ms
    Ms125,
    /// 250 ms
    Ms250,
    /// 500 ms
    Ms500,
    /// 1000 ms
    Ms1000,
    /// 10 ms
    Ms10,
    /// 20 ms
    Ms20,
}

impl Standby {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::Ms0_5 => 0,
            Self::Ms62_5 => 1,
            Self::Ms125 => 2,
            Self::Ms250 => 3,
            Self::Ms500 => 4,
            Self::Ms1000 => 5,
            Self::Ms10 => 6,
            Self::Ms20 => 7,
        }
    }

    /// Interval in whole milliseconds, rounded up.
    fn interval_ms(self) -> u32 {
        match self {
            Self::Ms0_5 => 1,
            Self::Ms62_5 => 63,
            Self::Ms125 => 125,
            Self::Ms250 => 250,
            Self::Ms500 => 500,
            Self::Ms1000 => 1000,
            Self::Ms10 => 10,
            Self::Ms20 => 20,
        }
    }
}

/// Converted measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Temperature in degrees Celsius
    pub temperature_c: f32,
    /// Pressure in Pascal
    pub pressure_pa: f32,
    /// Relative humidity in percent
    pub humidity_pct: f32,
}

/// Raw ADC values from the 8-byte data burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// 20-bit temperature reading
    pub adc_temperature: i32,
    /// 20-bit pressure reading
    pub adc_pressure: i32,
    /// 16-bit humidity reading
    pub adc_humidity: i32,
}

/// Fixed-point compensated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompensatedSample {
    /// Temperature × 100 (2508 = 25.08 °C)
    pub temp_c_x100: i32,
    /// Pressure in Pascal
    pub pressure_pa: u32,
    /// Relative humidity × 1024 (Q22.10; 44802 = 43.75 %RH)
    pub humidity_pct_x1024: u32,
}

/// Raw images of the calibration register blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRaw {
    /// 26 bytes at 0x88 (T1..T3, P1..P9)
    pub tp: [u8; CALIB_TP_LEN],
    /// 1 byte at 0xA1 (H1)
    pub h1: u8,
    /// 7 bytes at 0xE1 (H2..H6)
    pub h: [u8; CALIB_H_LEN],
}

/// BME280 driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit device address: 0x76 (SDO low) or 0x77 (SDO high)
    pub address: u8,
    /// Upper bound for a single transport call, must be > 0
    pub i2c_timeout_ms: u32,
    /// Temperature oversampling
    pub osrs_t: Oversampling,
    /// Pressure oversampling
    pub osrs_p: Oversampling,
    /// Humidity oversampling
    pub osrs_h: Oversampling,
    /// IIR filter coefficient
    pub filter: Filter,
    /// Normal-mode standby interval
    pub standby: Standby,
    /// Initial mode
    pub mode: Mode,
    /// Consecutive failures before the driver reports OFFLINE, floored at 1
    pub offline_threshold: u8,
    /// First-fetch margin after entering normal mode; 0 selects
    /// `max(2 ms, period / 20)`
    pub periodic_fetch_margin_ms: u32,
    /// Minimum interval between `recover()` attempts
    pub recover_backoff_ms: u32,
    /// Let the recovery ladder try the transport's bus reset
    pub recover_use_bus_reset: bool,
    /// Let the recovery ladder try a device soft reset
    pub recover_use_soft_reset: bool,
    /// Let the recovery ladder try the transport's hard-reset line
    pub recover_use_hard_reset: bool,
    /// Permit the bus-wide general-call reset (affects every device on the
    /// bus; off unless explicitly opted in)
    pub allow_general_call_reset: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: I2C_ADDR_LOW,
            i2c_timeout_ms: 50,
            osrs_t: Oversampling::X1,
            osrs_p: Oversampling::X1,
            osrs_h: Oversampling::X1,
            filter: Filter::Off,
            standby: Standby::Ms125,
            mode: Mode::Forced,
            offline_threshold: 5,
            periodic_fetch_margin_ms: 0,
            recover_backoff_ms: 0,
            recover_use_bus_reset: true,
            recover_use_soft_reset: true,
            recover_use_hard_reset: true,
            allow_general_call_reset: false,
        }
    }
}

/// BME280 driver.
///
/// Owns its transport and clock; all methods must be called from a single
/// context. See the [module docs](self) for the acquisition model.
pub struct Bme280<T, C> {
    transport: T,
    clock: C,
    config: Config,
    initialized: bool,
    health: HealthMonitor,
    sched: Scheduler,
    calibration: Calibration,
    last_recover_ms: u32,
    raw_sample: RawSample,
    comp_sample: CompensatedSample,
}

impl<T: Transport, C: Clock> Bme280<T, C> {
    /// Create an uninitialized driver. Call [`init`](Self::init) before use.
    pub fn new(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            config: Config::default(),
            initialized: false,
            health: HealthMonitor::new(),
            sched: Scheduler::new(),
            calibration: Calibration::default(),
            last_recover_ms: 0,
            raw_sample: RawSample::default(),
            comp_sample: CompensatedSample::default(),
        }
    }

    /// Consume the driver and return the transport and clock.
    pub fn release(self) -> (T, C) {
        (self.transport, self.clock)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Validate `config`, identify the chip, read the factory calibration
    /// and apply the measurement settings.
    ///
    /// # Errors
    ///
    /// - `INVALID_CONFIG` for a bad address or zero timeout
    /// - `DEVICE_NOT_FOUND` when the chip-ID read fails on the bus
    /// - `CHIP_ID_MISMATCH` when another device answers at the address
    ///   (the detail code carries the ID that was read)
    /// - `CALIBRATION_INVALID` for blank reference coefficients
    pub fn init(&mut self, config: Config) -> Result<()> {
        self.initialized = false;
        self.sched.reset();
        self.last_recover_ms = 0;
        self.raw_sample = RawSample::default();
        self.comp_sample = CompensatedSample::default();

        if config.i2c_timeout_ms == 0 {
            return Err(Error::invalid_config("I2C timeout must be > 0"));
        }
        if config.address != I2C_ADDR_LOW && config.address != I2C_ADDR_HIGH {
            return Err(Error::invalid_config("invalid I2C address"));
        }

        self.config = config;
        self.config.offline_threshold = config.offline_threshold.max(1);
        self.health.reset(self.config.offline_threshold);

        let chip_id = match self.read_register_raw(REG_CHIP_ID) {
            Ok(id) => id,
            Err(err) => return Err(Error::device_not_found(err.detail())),
        };
        if chip_id != CHIP_ID {
            return Err(Error::with_detail(
                ErrorKind::ChipIdMismatch,
                "chip ID mismatch",
                i32::from(chip_id),
            ));
        }

        self.read_calibration()?;
        self.calibration.validate()?;
        self.apply_config()?;

        self.initialized = true;
        self.health.mark_ready();
        Ok(())
    }

    /// Drive the acquisition state machine. Never blocks; a no-op while the
    /// driver is uninitialized, idle, or asleep.
    pub fn tick(&mut self, now_ms: u32) {
        if !self.initialized || !self.sched.is_pending() {
            return;
        }
        if self.config.mode == Mode::Sleep || !self.sched.due(now_ms) {
            return;
        }

        match self.is_measuring() {
            Ok(false) => {}
            // still converting, or the status read failed: retry next tick
            _ => return,
        }

        let raw = match self.read_raw_data() {
            Ok(raw) => raw,
            Err(_) => return,
        };
        let comp = match self.calibration.compensate(&raw) {
            Ok(comp) => comp,
            Err(_) => return,
        };

        self.raw_sample = raw;
        self.comp_sample = comp;
        match self.config.mode {
            Mode::Normal => self.sched.complete_continuous(now_ms),
            _ => self.sched.complete_single_shot(now_ms),
        }
    }

    /// Drop to the uninitialized state. No bus traffic.
    pub fn shutdown(&mut self) {
        self.initialized = false;
        self.health.deinit();
    }

    // =========================================================================
    // Diagnostics & recovery
    // =========================================================================

    /// Check device presence with an untracked chip-ID read.
    ///
    /// Does not touch health counters; bring-up and recovery probing only.
    pub fn probe(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let chip_id = match self.read_register_raw(REG_CHIP_ID) {
            Ok(id) => id,
            Err(err) => return Err(Error::device_not_found(err.detail())),
        };
        if chip_id != CHIP_ID {
            return Err(Error::with_detail(
                ErrorKind::ChipIdMismatch,
                "chip ID mismatch",
                i32::from(chip_id),
            ));
        }
        Ok(())
    }

    /// Walk the recovery ladder until a tracked probe succeeds.
    ///
    /// Steps, in order and individually gated by config: transport bus
    /// reset, device soft reset (re-reads calibration and re-applies the
    /// configuration), transport hard reset, general-call reset. The two
    /// power-cycle steps also re-read calibration and re-apply the
    /// configuration, since the device wakes up with default settings. On
    /// success the driver drops to a forced-mode baseline. Calls within
    /// `recover_backoff_ms` of the previous attempt return `BUSY`.
    pub fn recover(&mut self) -> Result<()> {
        self.ensure_initialized()?;

        let now = self.clock.now_ms();
        if self.config.recover_backoff_ms > 0
            && !time_reached(
                now,
                self.last_recover_ms
                    .wrapping_add(self.config.recover_backoff_ms),
            )
        {
            return Err(Error::busy("recovery backoff active"));
        }
        self.last_recover_ms = now;

        let mut last = Error::new(ErrorKind::I2cError, "recovery failed");

        if self.config.recover_use_bus_reset {
            match self.transport.bus_reset() {
                Ok(()) => match self.probe_tracked() {
                    Ok(()) => {
                        self.set_safe_baseline();
                        return Ok(());
                    }
                    Err(err) => last = err,
                },
                Err(err) if err.kind() == ErrorKind::Unsupported => {}
                Err(err) => last = err,
            }
        }

        if self.config.recover_use_soft_reset {
            let st = self.soft_reset().and_then(|()| self.probe_tracked());
            match st {
                Ok(()) => {
                    self.set_safe_baseline();
                    return Ok(());
                }
                Err(err) => last = err,
            }
        }

        if self.config.recover_use_hard_reset {
            match self.transport.hard_reset() {
                Ok(()) => {
                    let st = clock::wait_ms(
                        &mut self.clock,
                        RESET_DELAY_MS,
                        self.config.i2c_timeout_ms,
                    )
                    .and_then(|()| self.probe_tracked())
                    .and_then(|()| self.reinit_device());
                    match st {
                        Ok(()) => {
                            self.set_safe_baseline();
                            return Ok(());
                        }
                        Err(err) => last = err,
                    }
                }
                Err(err) if err.kind() == ErrorKind::Unsupported => {}
                Err(err) => last = err,
            }
        }

        if self.config.allow_general_call_reset {
            let st = self.general_call_reset().and_then(|()| {
                self.probe_tracked()?;
                self.reinit_device()
            });
            match st {
                Ok(()) => {
                    self.set_safe_baseline();
                    return Ok(());
                }
                Err(err) => last = err,
            }
        }

        Err(last)
    }

    // =========================================================================
    // State & health
    // =========================================================================

    /// Coarse driver state.
    pub fn state(&self) -> DriverState {
        self.health.state()
    }

    /// Whether the driver accepts operations (READY or DEGRADED).
    pub fn is_online(&self) -> bool {
        self.health.is_online()
    }

    /// Health counters and timestamps.
    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Request a measurement without blocking.
    ///
    /// Forced mode triggers a conversion; normal mode schedules a fetch of
    /// the device's next free-running sample. Returns the expected ready
    /// time. `INVALID_PARAM` in sleep mode, `BUSY` while a request is
    /// outstanding or the device is still converting.
    pub fn request_measurement(&mut self) -> Result<Scheduled> {
        self.ensure_initialized()?;
        if self.config.mode == Mode::Sleep {
            return Err(Error::invalid_param("device is in sleep mode"));
        }
        if self.sched.is_pending() {
            return Err(Error::busy("measurement in progress"));
        }
        self.sched.clear_ready();

        match self.config.mode {
            Mode::Forced => {
                if self.is_measuring()? {
                    return Err(Error::busy("device is measuring"));
                }

                let ctrl_meas =
                    build_ctrl_meas(self.config.osrs_t, self.config.osrs_p, Mode::Forced);
                self.write_register(REG_CTRL_MEAS, ctrl_meas)?;

                let ready_at_ms = self
                    .clock
                    .now_ms()
                    .wrapping_add(self.estimate_measurement_time_ms());
                self.sched.schedule(ready_at_ms);
                Ok(Scheduled { ready_at_ms })
            }
            Mode::Normal => {
                let now = self.clock.now_ms();
                let margin =
                    fetch_margin_ms(self.config.periodic_fetch_margin_ms, self.sched.period_ms());
                let ready_at_ms = self.sched.continuous_ready_target(
                    now,
                    self.estimate_measurement_time_ms(),
                    margin,
                );
                self.sched.schedule(ready_at_ms);
                Ok(Scheduled { ready_at_ms })
            }
            Mode::Sleep => Err(Error::invalid_param("device is in sleep mode")),
        }
    }

    /// Whether a completed sample is waiting to be collected.
    pub fn measurement_ready(&self) -> bool {
        self.sched.is_ready()
    }

    /// Timestamp of the last completed sample (0 if none).
    pub fn sample_timestamp_ms(&self) -> u32 {
        self.sched.sample_timestamp_ms()
    }

    /// Age of the last sample relative to `now_ms` (0 if none).
    pub fn sample_age_ms(&self, now_ms: u32) -> u32 {
        let ts = self.sched.sample_timestamp_ms();
        if ts == 0 {
            0
        } else {
            now_ms.wrapping_sub(ts)
        }
    }

    /// Best-effort count of free-running samples the caller never fetched
    /// (normal mode).
    pub fn missed_samples_estimate(&self) -> u32 {
        self.sched.missed_samples()
    }

    /// Collect the completed sample as floats, clearing the ready flag.
    pub fn get_measurement(&mut self) -> Result<Measurement> {
        self.ensure_initialized()?;
        if !self.sched.is_ready() {
            return Err(Error::not_ready("measurement not ready"));
        }
        let out = Measurement {
            temperature_c: self.comp_sample.temp_c_x100 as f32 / 100.0,
            pressure_pa: self.comp_sample.pressure_pa as f32,
            humidity_pct: self.comp_sample.humidity_pct_x1024 as f32 / 1024.0,
        };
        self.sched.clear_ready();
        Ok(out)
    }

    /// The raw ADC values of the completed sample (ready flag untouched).
    pub fn raw_sample(&self) -> Result<RawSample> {
        self.ensure_initialized()?;
        if !self.sched.is_ready() {
            return Err(Error::not_ready("measurement not ready"));
        }
        Ok(self.raw_sample)
    }

    /// The fixed-point compensation of the completed sample (ready flag
    /// untouched).
    pub fn compensated_sample(&self) -> Result<CompensatedSample> {
        self.ensure_initialized()?;
        if !self.sched.is_ready() {
            return Err(Error::not_ready("measurement not ready"));
        }
        Ok(self.comp_sample)
    }

    /// Worst-case conversion time for the current oversampling settings,
    /// rounded up to whole milliseconds.
    pub fn estimate_measurement_time_ms(&self) -> u32 {
        conversion_time_ms(self.config.osrs_t, self.config.osrs_p, self.config.osrs_h)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Cached factory calibration.
    pub fn calibration(&self) -> Result<Calibration> {
        self.ensure_initialized()?;
        Ok(self.calibration)
    }

    /// Read the raw calibration register blocks (tracked).
    pub fn read_calibration_raw(&mut self) -> Result<CalibrationRaw> {
        self.ensure_initialized()?;

        let mut tp = [0u8; CALIB_TP_LEN];
        self.read_registers(REG_CALIB_TP_START, &mut tp)?;

        let mut h1 = [0u8; 1];
        self.read_registers(REG_CALIB_H1, &mut h1)?;

        let mut h = [0u8; CALIB_H_LEN];
        self.read_registers(REG_CALIB_H_START, &mut h)?;

        Ok(CalibrationRaw { tp, h1: h1[0], h })
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// Configured temperature oversampling.
    pub fn oversampling_t(&self) -> Oversampling {
        self.config.osrs_t
    }

    /// Configured pressure oversampling.
    pub fn oversampling_p(&self) -> Oversampling {
        self.config.osrs_p
    }

    /// Configured humidity oversampling.
    pub fn oversampling_h(&self) -> Oversampling {
        self.config.osrs_h
    }

    /// Configured IIR filter.
    pub fn filter(&self) -> Filter {
        self.config.filter
    }

    /// Configured standby interval.
    pub fn standby(&self) -> Standby {
        self.config.standby
    }

    /// Switch mode through the safe configuration sequence. Entering sleep
    /// cancels an outstanding request.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.ensure_initialized()?;

        if mode == Mode::Sleep {
            self.sched.cancel_in_flight();
        }
        self.config.mode = mode;
        self.apply_config()
    }

    /// Change temperature oversampling (safe sequence; affects the
    /// measurement-time estimate).
    pub fn set_oversampling_t(&mut self, osrs: Oversampling) -> Result<()> {
        self.ensure_initialized()?;
        self.config.osrs_t = osrs;
        self.apply_config()
    }

    /// Change pressure oversampling (safe sequence).
    pub fn set_oversampling_p(&mut self, osrs: Oversampling) -> Result<()> {
        self.ensure_initialized()?;
        self.config.osrs_p = osrs;
        self.apply_config()
    }

    /// Change humidity oversampling (safe sequence; `ctrl_hum` only latches
    /// on the following `ctrl_meas` write).
    pub fn set_oversampling_h(&mut self, osrs: Oversampling) -> Result<()> {
        self.ensure_initialized()?;
        self.config.osrs_h = osrs;
        self.apply_config()
    }

    /// Change the IIR filter coefficient (safe sequence).
    pub fn set_filter(&mut self, filter: Filter) -> Result<()> {
        self.ensure_initialized()?;
        self.config.filter = filter;
        self.apply_config()
    }

    /// Change the normal-mode standby interval (safe sequence; repaces the
    /// fetch schedule).
    pub fn set_standby(&mut self, standby: Standby) -> Result<()> {
        self.ensure_initialized()?;
        self.config.standby = standby;
        self.apply_config()
    }

    // =========================================================================
    // Device registers
    // =========================================================================

    /// Soft reset: write the reset code, wait for the NVM copy to finish,
    /// then re-read calibration and re-apply the configuration. Cancels any
    /// outstanding request.
    pub fn soft_reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;

        self.write_register(REG_RESET, RESET_VALUE)?;
        self.sched.cancel_in_flight();

        let deadline = self.clock.now_ms().wrapping_add(RESET_TIMEOUT_MS);
        let mut polls = 0;
        loop {
            let status = self.read_register(REG_STATUS)?;
            if status & MASK_STATUS_IM_UPDATE == 0 {
                break;
            }
            polls += 1;
            if polls >= RESET_POLL_LIMIT || time_reached(self.clock.now_ms(), deadline) {
                return Err(Error::timeout("reset timeout"));
            }
        }

        self.reinit_device()
    }

    /// Bus-wide general-call reset (address 0x00, byte 0x06). Resets every
    /// listening device on the bus; gated behind
    /// [`Config::allow_general_call_reset`]. The caller (or the recovery
    /// ladder) must re-apply configuration afterwards.
    pub fn general_call_reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if !self.config.allow_general_call_reset {
            return Err(Error::invalid_config("general call reset disabled"));
        }

        let st = self.transport.write(
            GENERAL_CALL_ADDR,
            &[GENERAL_CALL_RESET_BYTE],
            self.config.i2c_timeout_ms,
        );
        self.track(st)?;
        self.sched.cancel_in_flight();

        clock::wait_ms(&mut self.clock, RESET_DELAY_MS, self.config.i2c_timeout_ms)
    }

    /// Chip-ID register (tracked read).
    pub fn read_chip_id(&mut self) -> Result<u8> {
        self.ensure_initialized()?;
        self.read_register(REG_CHIP_ID)
    }

    /// Status register: bit 3 `measuring`, bit 0 `im_update`.
    pub fn read_status(&mut self) -> Result<u8> {
        self.ensure_initialized()?;
        self.read_register(REG_STATUS)
    }

    /// `ctrl_hum` register as the device holds it.
    pub fn read_ctrl_hum(&mut self) -> Result<u8> {
        self.ensure_initialized()?;
        self.read_register(REG_CTRL_HUM)
    }

    /// `ctrl_meas` register as the device holds it.
    pub fn read_ctrl_meas(&mut self) -> Result<u8> {
        self.ensure_initialized()?;
        self.read_register(REG_CTRL_MEAS)
    }

    /// `config` register as the device holds it.
    pub fn read_config(&mut self) -> Result<u8> {
        self.ensure_initialized()?;
        self.read_register(REG_CONFIG)
    }

    /// Whether a conversion is currently running.
    pub fn is_measuring(&mut self) -> Result<bool> {
        self.ensure_initialized()?;
        let status = self.read_register(REG_STATUS)?;
        Ok(status & MASK_STATUS_MEASURING != 0)
    }

    /// Tracked single-register read.
    pub fn read_register(&mut self, reg: u8) -> Result<u8> {
        let mut value = [0u8; 1];
        self.read_registers(reg, &mut value)?;
        Ok(value[0])
    }

    /// Tracked single-register write.
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        self.write_registers(reg, &[value])
    }

    /// Tracked burst read starting at `start_reg`.
    pub fn read_registers(&mut self, start_reg: u8, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Err(Error::invalid_param("empty read buffer"));
        }
        let st = self.transport.write_read(
            self.config.address,
            &[start_reg],
            buf,
            self.config.i2c_timeout_ms,
        );
        self.track(st)
    }

    /// Tracked burst write: register address byte followed by `bytes`.
    pub fn write_registers(&mut self, start_reg: u8, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::invalid_param("empty write buffer"));
        }
        if bytes.len() > MAX_WRITE_LEN {
            return Err(Error::invalid_param("write length too large"));
        }

        let mut payload = [0u8; MAX_WRITE_LEN + 1];
        payload[0] = start_reg;
        payload[1..=bytes.len()].copy_from_slice(bytes);

        let st = self.transport.write(
            self.config.address,
            &payload[..=bytes.len()],
            self.config.i2c_timeout_ms,
        );
        self.track(st)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::not_initialized())
        }
    }

    /// Route one transport outcome through the health monitor. Input errors
    /// indicate a programmer mistake and bypass tracking.
    fn track(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Err(err) if err.is_input_error() => Err(err),
            other => {
                let now = self.clock.now_ms();
                self.health.track(now, other)
            }
        }
    }

    /// Untracked single-register read (init/probe identification path).
    fn read_register_raw(&mut self, reg: u8) -> Result<u8> {
        let mut value = [0u8; 1];
        self.transport.write_read(
            self.config.address,
            &[reg],
            &mut value,
            self.config.i2c_timeout_ms,
        )?;
        Ok(value[0])
    }

    fn probe_tracked(&mut self) -> Result<()> {
        let chip_id = self.read_register(REG_CHIP_ID)?;
        if chip_id != CHIP_ID {
            return Err(Error::with_detail(
                ErrorKind::ChipIdMismatch,
                "chip ID mismatch",
                i32::from(chip_id),
            ));
        }
        Ok(())
    }

    fn set_safe_baseline(&mut self) {
        self.sched.reset();
        self.config.mode = Mode::Forced;
    }

    /// Post-reset bring-up: calibration re-read, validation, configuration.
    fn reinit_device(&mut self) -> Result<()> {
        self.read_calibration()?;
        self.calibration.validate()?;
        self.apply_config()
    }

    /// The safe four-write configuration sequence: `ctrl_meas` to SLEEP so
    /// `config`/`ctrl_hum` latch, then `ctrl_meas` with the target mode.
    fn apply_config(&mut self) -> Result<()> {
        let ctrl_hum = build_ctrl_hum(self.config.osrs_h);
        let ctrl_meas_sleep = build_ctrl_meas(self.config.osrs_t, self.config.osrs_p, Mode::Sleep);
        let ctrl_meas = build_ctrl_meas(self.config.osrs_t, self.config.osrs_p, self.config.mode);
        let config = build_config(self.config.standby, self.config.filter);

        self.write_register(REG_CTRL_MEAS, ctrl_meas_sleep)?;
        self.write_register(REG_CONFIG, config)?;
        self.write_register(REG_CTRL_HUM, ctrl_hum)?;
        self.write_register(REG_CTRL_MEAS, ctrl_meas)?;

        self.sync_normal_schedule();
        Ok(())
    }

    /// Keep the continuous-fetch pacing in step with the configured mode.
    fn sync_normal_schedule(&mut self) {
        if self.config.mode == Mode::Normal {
            let period = self.normal_period_ms();
            let now = self.clock.now_ms();
            self.sched.start_continuous(now, period);
        } else {
            self.sched.stop_continuous();
        }
    }

    /// Free-running sample interval in normal mode.
    fn normal_period_ms(&self) -> u32 {
        (self.config.standby.interval_ms() + self.estimate_measurement_time_ms()).max(1)
    }

    fn read_calibration(&mut self) -> Result<()> {
        let mut tp = [0u8; CALIB_TP_LEN];
        self.read_registers(REG_CALIB_TP_START, &mut tp)?;

        let mut h1 = [0u8; 1];
        self.read_registers(REG_CALIB_H1, &mut h1)?;

        let mut h = [0u8; CALIB_H_LEN];
        self.read_registers(REG_CALIB_H_START, &mut h)?;

        self.calibration = Calibration::unpack(&tp, h1[0], &h);
        Ok(())
    }

    /// Read and unpack the 8-byte data burst: two 20-bit values packed as
    /// `(MSB << 12) | (LSB << 4) | (XLSB >> 4)` and one 16-bit value.
    fn read_raw_data(&mut self) -> Result<RawSample> {
        let mut data = [0u8; DATA_LEN];
        self.read_registers(REG_DATA_START, &mut data)?;

        Ok(RawSample {
            adc_pressure: (i32::from(data[0]) << 12)
                | (i32::from(data[1]) << 4)
                | (i32::from(data[2]) >> 4),
            adc_temperature: (i32::from(data[3]) << 12)
                | (i32::from(data[4]) << 4)
                | (i32::from(data[5]) >> 4),
            adc_humidity: (i32::from(data[6]) << 8) | i32::from(data[7]),
        })
    }
}

/// Worst-case conversion time in whole milliseconds: 1.25 ms base, 2.3 ms
/// per oversampled conversion, 0.575 ms setup per active non-temperature
/// channel, plus a 1 ms margin.
fn conversion_time_ms(osrs_t: Oversampling, osrs_p: Oversampling, osrs_h: Oversampling) -> u32 {
    let t = osrs_t.multiplier();
    let p = osrs_p.multiplier();
    let h = osrs_h.multiplier();

    let mut time_us = 1250;
    if t > 0 {
        time_us += 2300 * t;
    }
    if p > 0 {
        time_us += 2300 * p + 575;
    }
    if h > 0 {
        time_us += 2300 * h + 575;
    }
    time_us += MEASUREMENT_MARGIN_US;

    (time_us + 999) / 1000
}
