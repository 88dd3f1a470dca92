//! SHT3x temperature/humidity driver (command + CRC protocol)
//!
//! Non-blocking driver for the Sensirion SHT30/SHT31/SHT35 family. All bus
//! traffic goes through an injected [`Transport`]; scheduling is driven by
//! an external [`tick`](Sht3x::tick). Three acquisition modes:
//!
//! - **Single-shot**: one conversion per request.
//! - **Periodic**: the device samples autonomously at 0.5–10 Hz and the
//!   driver fetches the latest value.
//! - **ART**: accelerated response time, a fixed 4 Hz periodic profile.
//!
//! In periodic mode the device NACKs the read header while no fresh sample
//! exists. When the transport declares
//! [`Capabilities::READ_HEADER_NACK`](crate::transport::Capabilities), that
//! NACK becomes [`ErrorKind::MeasurementNotReady`] and is *not* counted
//! against driver health; `not_ready_timeout_ms` bounds how long that
//! interpretation holds.
//!
//! The command+CRC protocol does not tolerate repeated-start transactions:
//! the driver only issues plain writes and bare reads, separated by the
//! configured command spacing (tIDLE, ≥ 1 ms).

pub mod commands;
mod crc;
mod convert;

pub use self::convert::{
    convert_humidity_pct, convert_humidity_pct_x100, convert_temperature_c,
    convert_temperature_c_x100, decode_alert_limit, encode_alert_limit,
};
pub use self::crc::crc8;

use crate::clock::{self, time_reached, Clock};
use crate::health::{DriverState, HealthMonitor};
use crate::schedule::{fetch_margin_ms, Scheduler};
use crate::status::{Error, ErrorKind, Result, Scheduled};
use crate::transport::{Capabilities, Transport};

use self::commands::{
    base_measurement_ms, command_for_alert_read, command_for_alert_write, command_for_periodic,
    command_for_single_shot, period_ms_for_rate, ALERT_DATA_LEN, CMD_ART, CMD_BREAK,
    CMD_CLEAR_STATUS, CMD_FETCH_DATA, CMD_HEATER_DISABLE, CMD_HEATER_ENABLE, CMD_READ_STATUS,
    CMD_SERIAL_NO_STRETCH, CMD_SERIAL_STRETCH, CMD_SOFT_RESET, GENERAL_CALL_ADDR,
    GENERAL_CALL_RESET_BYTE, I2C_ADDR_HIGH, I2C_ADDR_LOW, MEASUREMENT_DATA_LEN, SERIAL_DATA_LEN,
    STATUS_ALERT_PENDING, STATUS_COMMAND_ERROR, STATUS_DATA_LEN, STATUS_HEATER_ON,
    STATUS_RESET_DETECTED, STATUS_RH_ALERT, STATUS_T_ALERT, STATUS_WRITE_CRC_ERROR,
};

const RESET_DELAY_MS: u32 = 2;
const BREAK_DELAY_MS: u32 = 1;
const MIN_COMMAND_DELAY_MS: u16 = 1;
const MEASUREMENT_MARGIN_MS: u32 = 1;
const ART_PERIOD_MS: u32 = 250;

/// Measurement repeatability (conversion duration vs. noise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Repeatability {
    /// Shortest conversion, highest noise
    Low,
    /// Balanced
    Medium,
    /// Longest conversion, lowest noise
    High,
}

/// Clock stretching for single-shot and serial-number reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockStretching {
    /// The device NACKs reads until the conversion finishes
    Disabled,
    /// The device holds SCL low until data is available
    Enabled,
}

/// Periodic acquisition rate in measurements per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeriodicRate {
    /// 0.5 mps (one sample every 2 s)
    Mps0_5,
    /// 1 mps
    Mps1,
    /// 2 mps
    Mps2,
    /// 4 mps
    Mps4,
    /// 10 mps
    Mps10,
}

/// Driver operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// One conversion per request
    SingleShot,
    /// Autonomous sampling at [`PeriodicRate`]
    Periodic,
    /// Accelerated response time (4 Hz)
    Art,
}

/// Selector for one of the four alert-limit slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlertLimitKind {
    /// Alert asserts above this limit
    HighSet,
    /// Alert deasserts below this limit (high side)
    HighClear,
    /// Alert deasserts above this limit (low side)
    LowClear,
    /// Alert asserts below this limit
    LowSet,
}

impl AlertLimitKind {
    /// All four slots in restore order.
    pub const ALL: [Self; 4] = [Self::HighSet, Self::HighClear, Self::LowClear, Self::LowSet];

    const fn index(self) -> usize {
        match self {
            Self::HighSet => 0,
            Self::HighClear => 1,
            Self::LowClear => 2,
            Self::LowSet => 3,
        }
    }
}

/// Converted measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Temperature in degrees Celsius
    pub temperature_c: f32,
    /// Relative humidity in percent
    pub humidity_pct: f32,
}

/// Raw 16-bit ADC values as read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// Raw temperature ticks
    pub raw_temperature: u16,
    /// Raw humidity ticks
    pub raw_humidity: u16,
}

/// Fixed-point converted values (no float involved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompensatedSample {
    /// Temperature × 100 (2534 = 25.34 °C)
    pub temp_c_x100: i32,
    /// Relative humidity × 100 (4234 = 42.34 %RH)
    pub humidity_pct_x100: u32,
}

/// Parsed view of the 16-bit status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusRegister {
    /// Raw register word
    pub raw: u16,
    /// At least one alert is pending
    pub alert_pending: bool,
    /// Heater is on
    pub heater_on: bool,
    /// Humidity tracking alert
    pub rh_alert: bool,
    /// Temperature tracking alert
    pub t_alert: bool,
    /// A reset occurred since the last clear
    pub reset_detected: bool,
    /// The last command was not processed
    pub command_error: bool,
    /// The last write failed its checksum
    pub write_crc_error: bool,
}

impl StatusRegister {
    /// Decode the raw status word.
    pub fn from_raw(raw: u16) -> Self {
        Self {
            raw,
            alert_pending: raw & STATUS_ALERT_PENDING != 0,
            heater_on: raw & STATUS_HEATER_ON != 0,
            rh_alert: raw & STATUS_RH_ALERT != 0,
            t_alert: raw & STATUS_T_ALERT != 0,
            reset_detected: raw & STATUS_RESET_DETECTED != 0,
            command_error: raw & STATUS_COMMAND_ERROR != 0,
            write_crc_error: raw & STATUS_WRITE_CRC_ERROR != 0,
        }
    }
}

/// Decoded alert limit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlertLimit {
    /// Packed on-wire limit word
    pub raw: u16,
    /// Approximate temperature threshold (quantized to ~0.7 °C)
    pub temperature_c: f32,
    /// Approximate humidity threshold (quantized to ~1.5 %RH)
    pub humidity_pct: f32,
}

/// Snapshot of driver configuration and acquisition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettingsSnapshot {
    /// Current operating mode
    pub mode: Mode,
    /// Configured repeatability
    pub repeatability: Repeatability,
    /// Configured periodic rate
    pub periodic_rate: PeriodicRate,
    /// Configured clock stretching
    pub clock_stretching: ClockStretching,
    /// Whether periodic/ART acquisition is running
    pub periodic_active: bool,
    /// A request is outstanding
    pub measurement_pending: bool,
    /// A sample is ready to collect
    pub measurement_ready: bool,
    /// Ready target of the outstanding request
    pub ready_at_ms: u32,
    /// Timestamp of the last completed sample
    pub sample_timestamp_ms: u32,
    /// Missed-sample estimate (periodic/ART)
    pub missed_samples: u32,
    /// Status register, if it could be read
    pub status: StatusRegister,
    /// Whether `status` holds a fresh value
    pub status_valid: bool,
}

/// RAM snapshot of device settings, replayed by
/// [`reset_and_restore`](Sht3x::reset_and_restore).
///
/// Slots are only marked valid after the corresponding write succeeded, so a
/// restore never replays a value the device did not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CachedSettings {
    /// Operating mode to restore
    pub mode: Mode,
    /// Repeatability to restore
    pub repeatability: Repeatability,
    /// Periodic rate to restore
    pub periodic_rate: PeriodicRate,
    /// Clock stretching to restore
    pub clock_stretching: ClockStretching,
    /// Whether the heater was enabled
    pub heater_enabled: bool,
    /// Which alert slots hold written values
    pub alert_valid: [bool; 4],
    /// Raw alert words, indexed like [`AlertLimitKind::ALL`]
    pub alert_raw: [u16; 4],
}

impl Default for CachedSettings {
    fn default() -> Self {
        Self {
            mode: Mode::SingleShot,
            repeatability: Repeatability::High,
            periodic_rate: PeriodicRate::Mps1,
            clock_stretching: ClockStretching::Disabled,
            heater_enabled: false,
            alert_valid: [false; 4],
            alert_raw: [0; 4],
        }
    }
}

/// SHT3x driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// 7-bit device address: 0x44 (ADDR low) or 0x45 (ADDR high)
    pub address: u8,
    /// Upper bound for a single transport call, must be > 0
    pub i2c_timeout_ms: u32,
    /// Measurement repeatability
    pub repeatability: Repeatability,
    /// Clock stretching for single-shot/serial reads
    pub clock_stretching: ClockStretching,
    /// Rate used when entering periodic mode
    pub periodic_rate: PeriodicRate,
    /// Initial operating mode
    pub mode: Mode,
    /// Use the slower low-VDD conversion-time table
    pub low_vdd: bool,
    /// Minimum spacing between transactions (tIDLE), floored at 1 ms
    pub command_delay_ms: u16,
    /// Consecutive failures before the driver reports OFFLINE, floored at 1
    pub offline_threshold: u8,
    /// Continuous "not ready" budget in periodic mode; 0 disables escalation
    pub not_ready_timeout_ms: u32,
    /// First-fetch margin after a periodic start; 0 selects
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
            repeatability: Repeatability::High,
            clock_stretching: ClockStretching::Disabled,
            periodic_rate: PeriodicRate::Mps1,
            mode: Mode::SingleShot,
            low_vdd: false,
            command_delay_ms: 1,
            offline_threshold: 5,
            not_ready_timeout_ms: 0,
            periodic_fetch_margin_ms: 0,
            recover_backoff_ms: 0,
            recover_use_bus_reset: true,
            recover_use_soft_reset: true,
            recover_use_hard_reset: true,
            allow_general_call_reset: false,
        }
    }
}

/// SHT3x driver.
///
/// Owns its transport and clock; all methods must be called from a single
/// context. See the [module docs](self) for the acquisition model.
pub struct Sht3x<T, C> {
    transport: T,
    clock: C,
    config: Config,
    initialized: bool,
    health: HealthMonitor,
    sched: Scheduler,
    mode: Mode,
    periodic_active: bool,
    last_command_us: u32,
    last_recover_ms: u32,
    raw_sample: RawSample,
    comp_sample: CompensatedSample,
    cached: CachedSettings,
    has_cached: bool,
}

impl<T: Transport, C: Clock> Sht3x<T, C> {
    /// Create an uninitialized driver. Call [`init`](Self::init) before use.
    pub fn new(transport: T, clock: C) -> Self {
        Self {
            transport,
            clock,
            config: Config::default(),
            initialized: false,
            health: HealthMonitor::new(),
            sched: Scheduler::new(),
            mode: Mode::SingleShot,
            periodic_active: false,
            last_command_us: 0,
            last_recover_ms: 0,
            raw_sample: RawSample::default(),
            comp_sample: CompensatedSample::default(),
            cached: CachedSettings::default(),
            has_cached: false,
        }
    }

    /// Consume the driver and return the transport and clock.
    pub fn release(self) -> (T, C) {
        (self.transport, self.clock)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Validate `config`, contact the device and apply the initial mode.
    ///
    /// # Errors
    ///
    /// - `INVALID_CONFIG` for a bad address or zero timeout
    /// - `DEVICE_NOT_FOUND` when the identifying status read fails on the bus
    pub fn init(&mut self, config: Config) -> Result<()> {
        self.initialized = false;
        self.sched.reset();
        self.mode = Mode::SingleShot;
        self.periodic_active = false;
        self.last_command_us = 0;
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
        self.config.command_delay_ms = config.command_delay_ms.max(MIN_COMMAND_DELAY_MS);
        self.config.offline_threshold = config.offline_threshold.max(1);
        self.health.reset(self.config.offline_threshold);

        let st = self.read_status_word(true);
        match st {
            Ok(_) => {}
            Err(err) if err.is_i2c_failure() => {
                return Err(Error::device_not_found(err.detail()));
            }
            Err(err) => return Err(err),
        }

        self.mode = self.config.mode;
        match self.mode {
            Mode::Periodic => {
                self.enter_periodic(self.config.periodic_rate, self.config.repeatability, false)?
            }
            Mode::Art => {
                self.enter_periodic(self.config.periodic_rate, self.config.repeatability, true)?
            }
            Mode::SingleShot => {}
        }

        self.cached = CachedSettings {
            mode: self.mode,
            repeatability: self.config.repeatability,
            periodic_rate: self.config.periodic_rate,
            clock_stretching: self.config.clock_stretching,
            heater_enabled: false,
            alert_valid: [false; 4],
            alert_raw: [0; 4],
        };
        self.has_cached = true;

        self.initialized = true;
        self.health.mark_ready();
        Ok(())
    }

    /// Drive the acquisition state machine. Never blocks; a no-op while the
    /// driver is uninitialized or idle.
    pub fn tick(&mut self, now_ms: u32) {
        if !self.initialized || !self.sched.is_pending() || !self.sched.due(now_ms) {
            return;
        }

        match self.mode {
            Mode::SingleShot => {
                let raw = match self.read_measurement_raw(true, false) {
                    Ok(raw) => raw,
                    Err(_) => return,
                };
                self.store_sample(raw);
                self.sched.complete_single_shot(now_ms);
            }
            Mode::Periodic | Mode::Art => match self.fetch_periodic(now_ms) {
                Ok(()) => self.sched.complete_continuous(now_ms),
                Err(err) if err.kind() == ErrorKind::MeasurementNotReady => {
                    let retry = now_ms.wrapping_add(u32::from(self.config.command_delay_ms));
                    self.sched.defer(retry);
                }
                Err(_) => {}
            },
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

    /// Check device presence with an untracked status read.
    ///
    /// Does not touch health counters; bring-up and recovery probing only.
    pub fn probe(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        match self.read_status_word(false) {
            Ok(_) => Ok(()),
            Err(err) if err.is_i2c_failure() => Err(Error::device_not_found(err.detail())),
            Err(err) => Err(err),
        }
    }

    /// Walk the recovery ladder until a tracked probe succeeds.
    ///
    /// Steps, in order and individually gated by config: transport bus
    /// reset, device soft reset (preceded by a break when periodic mode is
    /// active), transport hard reset, general-call reset. On success the
    /// driver state drops to a single-shot baseline. Calls within
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
            match self.interface_reset() {
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
            let stopped = if self.periodic_active {
                self.stop_periodic_internal()
            } else {
                Ok(())
            };
            match stopped {
                Ok(()) => {
                    let st = self.soft_reset().and_then(|()| self.probe_tracked());
                    match st {
                        Ok(()) => {
                            self.set_safe_baseline();
                            return Ok(());
                        }
                        Err(err) => last = err,
                    }
                }
                Err(err) => last = err,
            }
        }

        if self.config.recover_use_hard_reset {
            match self.transport.hard_reset() {
                Ok(()) => {
                    clock::wait_ms(&mut self.clock, RESET_DELAY_MS, self.config.i2c_timeout_ms)?;
                    match self.probe_tracked() {
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
            match self.general_call_reset() {
                Ok(()) => match self.probe_tracked() {
                    Ok(()) => {
                        self.set_safe_baseline();
                        return Ok(());
                    }
                    Err(err) => last = err,
                },
                Err(err) => last = err,
            }
        }

        Err(last)
    }

    /// Soft reset, then reset the driver's settings and cache to defaults.
    pub fn reset_to_defaults(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.periodic_active {
            self.stop_periodic_internal()?;
        }
        self.soft_reset()?;

        self.config.repeatability = Repeatability::High;
        self.config.clock_stretching = ClockStretching::Disabled;
        self.config.periodic_rate = PeriodicRate::Mps1;
        self.config.mode = Mode::SingleShot;
        self.cached = CachedSettings::default();
        self.has_cached = true;
        Ok(())
    }

    /// Soft reset, then replay the cached settings: alert limits for the
    /// slots that were written successfully, heater state, then the cached
    /// acquisition mode.
    pub fn reset_and_restore(&mut self) -> Result<()> {
        self.ensure_initialized()?;

        // capture before the break/reset path rewrites the cached mode
        let cached = self.cached;
        if self.periodic_active {
            self.stop_periodic_internal()?;
        }
        self.soft_reset()?;
        for kind in AlertLimitKind::ALL {
            if cached.alert_valid[kind.index()] {
                self.write_alert_limit_raw(kind, cached.alert_raw[kind.index()])?;
            }
        }
        if cached.heater_enabled {
            self.set_heater(true)?;
        }

        self.config.repeatability = cached.repeatability;
        self.config.clock_stretching = cached.clock_stretching;
        match cached.mode {
            Mode::Periodic => self.start_periodic(cached.periodic_rate, cached.repeatability),
            Mode::Art => self.start_art(),
            Mode::SingleShot => Ok(()),
        }
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
    /// Single-shot mode issues the conversion command; periodic/ART mode
    /// schedules a fetch of the device's next autonomous sample. Returns the
    /// expected ready time; `BUSY` if a request is already outstanding.
    pub fn request_measurement(&mut self) -> Result<Scheduled> {
        self.ensure_initialized()?;
        if self.sched.is_pending() {
            return Err(Error::busy("measurement in progress"));
        }
        self.sched.clear_ready();

        match self.mode {
            Mode::SingleShot => {
                self.start_single_shot()?;
                let ready_at_ms = self
                    .clock
                    .now_ms()
                    .wrapping_add(self.estimate_measurement_time_ms());
                self.sched.schedule(ready_at_ms);
                Ok(Scheduled { ready_at_ms })
            }
            Mode::Periodic | Mode::Art => {
                if !self.periodic_active {
                    return Err(Error::invalid_param("periodic mode not active"));
                }
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

    /// Best-effort count of device samples the caller never fetched
    /// (periodic/ART mode).
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
            humidity_pct: self.comp_sample.humidity_pct_x100 as f32 / 100.0,
        };
        self.sched.clear_ready();
        Ok(out)
    }

    /// The raw ticks of the completed sample (ready flag untouched).
    pub fn raw_sample(&self) -> Result<RawSample> {
        self.ensure_initialized()?;
        if !self.sched.is_ready() {
            return Err(Error::not_ready("measurement not ready"));
        }
        Ok(self.raw_sample)
    }

    /// The fixed-point conversion of the completed sample (ready flag
    /// untouched).
    pub fn compensated_sample(&self) -> Result<CompensatedSample> {
        self.ensure_initialized()?;
        if !self.sched.is_ready() {
            return Err(Error::not_ready("measurement not ready"));
        }
        Ok(self.comp_sample)
    }

    /// Worst-case conversion time for the current repeatability setting.
    pub fn estimate_measurement_time_ms(&self) -> u32 {
        base_measurement_ms(self.config.repeatability, self.config.low_vdd) + MEASUREMENT_MARGIN_MS
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Configured repeatability.
    pub fn repeatability(&self) -> Repeatability {
        self.config.repeatability
    }

    /// Configured clock stretching.
    pub fn clock_stretching(&self) -> ClockStretching {
        self.config.clock_stretching
    }

    /// Configured periodic rate.
    pub fn periodic_rate(&self) -> PeriodicRate {
        self.config.periodic_rate
    }

    /// Whether periodic/ART acquisition is running on the device.
    pub fn periodic_active(&self) -> bool {
        self.periodic_active
    }

    /// Switch operating mode. Leaving periodic/ART sends the break command;
    /// entering them starts acquisition with the configured settings.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.ensure_initialized()?;
        if self.sched.is_pending() {
            return Err(Error::busy("measurement in progress"));
        }
        if mode == self.mode {
            return Ok(());
        }

        match mode {
            Mode::SingleShot => {
                self.stop_periodic_internal()?;
                Ok(())
            }
            Mode::Periodic => {
                self.start_periodic(self.config.periodic_rate, self.config.repeatability)
            }
            Mode::Art => self.start_art(),
        }
    }

    /// Change repeatability. Acquisition-affecting: an active periodic run
    /// is restarted with the new setting.
    pub fn set_repeatability(&mut self, rep: Repeatability) -> Result<()> {
        self.ensure_initialized()?;
        if self.sched.is_pending() {
            return Err(Error::busy("measurement in progress"));
        }

        self.config.repeatability = rep;
        if self.mode == Mode::Periodic {
            return self.start_periodic(self.config.periodic_rate, rep);
        }
        self.cached.repeatability = rep;
        Ok(())
    }

    /// Change clock stretching for single-shot and serial reads.
    pub fn set_clock_stretching(&mut self, stretch: ClockStretching) -> Result<()> {
        self.ensure_initialized()?;
        if self.sched.is_pending() {
            return Err(Error::busy("measurement in progress"));
        }
        self.config.clock_stretching = stretch;
        self.cached.clock_stretching = stretch;
        Ok(())
    }

    /// Change the periodic rate. Acquisition-affecting: an active periodic
    /// run is restarted with the new rate.
    pub fn set_periodic_rate(&mut self, rate: PeriodicRate) -> Result<()> {
        self.ensure_initialized()?;
        if self.sched.is_pending() {
            return Err(Error::busy("measurement in progress"));
        }

        self.config.periodic_rate = rate;
        if self.mode == Mode::Periodic {
            return self.start_periodic(rate, self.config.repeatability);
        }
        self.cached.periodic_rate = rate;
        Ok(())
    }

    /// Start periodic acquisition at the given rate and repeatability.
    pub fn start_periodic(&mut self, rate: PeriodicRate, rep: Repeatability) -> Result<()> {
        self.ensure_initialized()?;
        self.enter_periodic(rate, rep, false)
    }

    /// Start ART mode (4 Hz accelerated response time).
    pub fn start_art(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.enter_periodic(self.config.periodic_rate, self.config.repeatability, true)
    }

    /// Stop periodic/ART acquisition (break command) and return to
    /// single-shot mode.
    pub fn stop_periodic(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.stop_periodic_internal()
    }

    /// Settings and acquisition state without touching the bus.
    pub fn settings(&self) -> Result<SettingsSnapshot> {
        self.ensure_initialized()?;
        Ok(SettingsSnapshot {
            mode: self.mode,
            repeatability: self.config.repeatability,
            periodic_rate: self.config.periodic_rate,
            clock_stretching: self.config.clock_stretching,
            periodic_active: self.periodic_active,
            measurement_pending: self.sched.is_pending(),
            measurement_ready: self.sched.is_ready(),
            ready_at_ms: self.sched.ready_at_ms(),
            sample_timestamp_ms: self.sched.sample_timestamp_ms(),
            missed_samples: self.sched.missed_samples(),
            status: StatusRegister::default(),
            status_valid: false,
        })
    }

    /// Settings snapshot plus a status-register read. When periodic mode
    /// blocks the status read the snapshot is still returned with
    /// `status_valid == false`.
    pub fn read_settings(&mut self) -> Result<SettingsSnapshot> {
        let mut out = self.settings()?;
        match self.read_status() {
            Ok(status) => {
                out.status = status;
                out.status_valid = true;
                Ok(out)
            }
            Err(err) if err.kind() == ErrorKind::Busy => Ok(out),
            Err(err) => Err(err),
        }
    }

    /// Cached settings used by [`reset_and_restore`](Self::reset_and_restore).
    pub fn cached_settings(&self) -> CachedSettings {
        self.cached
    }

    /// Whether a settings cache exists (true from init onwards).
    pub fn has_cached_settings(&self) -> bool {
        self.has_cached
    }

    // =========================================================================
    // Status, heater, resets
    // =========================================================================

    /// Read the raw status word. `BUSY` while periodic mode is active.
    pub fn read_status_raw(&mut self) -> Result<u16> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before reading status"));
        }
        self.read_status_word(true)
    }

    /// Read and parse the status register. `BUSY` while periodic mode is
    /// active.
    pub fn read_status(&mut self) -> Result<StatusRegister> {
        let raw = self.read_status_raw()?;
        Ok(StatusRegister::from_raw(raw))
    }

    /// Clear the sticky status flags. `BUSY` while periodic mode is active.
    pub fn clear_status(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before clearing status"));
        }
        self.write_command(CMD_CLEAR_STATUS, true)
    }

    /// Switch the built-in heater. `BUSY` while periodic mode is active.
    pub fn set_heater(&mut self, enable: bool) -> Result<()> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before changing heater"));
        }
        let cmd = if enable {
            CMD_HEATER_ENABLE
        } else {
            CMD_HEATER_DISABLE
        };
        self.write_command(cmd, true)?;
        self.cached.heater_enabled = enable;
        Ok(())
    }

    /// Heater state as reported by the status register.
    pub fn read_heater_status(&mut self) -> Result<bool> {
        Ok(self.read_status()?.heater_on)
    }

    /// Device soft reset. Waits the mandatory settling delay and drops the
    /// acquisition state to the single-shot baseline. `BUSY` while periodic
    /// mode is active.
    pub fn soft_reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before reset"));
        }

        self.write_command(CMD_SOFT_RESET, true)?;
        clock::wait_ms(&mut self.clock, RESET_DELAY_MS, self.config.i2c_timeout_ms)?;

        self.sched.reset();
        self.mode = Mode::SingleShot;
        self.config.mode = Mode::SingleShot;
        self.periodic_active = false;
        Ok(())
    }

    /// Ask the transport to free the bus (e.g. SCL pulse sequence), then
    /// drop any in-flight acquisition. `UNSUPPORTED` when the transport has
    /// no bus-reset hook.
    pub fn interface_reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.transport.bus_reset()?;

        self.sched.cancel_in_flight();
        if self.periodic_active {
            let now = self.clock.now_ms();
            self.sched.rebase_continuous(now);
        }
        Ok(())
    }

    /// Bus-wide general-call reset (address 0x00, byte 0x06). Resets every
    /// listening device on the bus; gated behind
    /// [`Config::allow_general_call_reset`].
    pub fn general_call_reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if !self.config.allow_general_call_reset {
            return Err(Error::invalid_config("general call reset disabled"));
        }

        clock::ensure_command_delay(
            &mut self.clock,
            self.last_command_us,
            self.config.command_delay_ms,
            self.config.i2c_timeout_ms,
        )?;
        let st = self.transport.write(
            GENERAL_CALL_ADDR,
            &[GENERAL_CALL_RESET_BYTE],
            self.config.i2c_timeout_ms,
        );
        self.track(st)?;
        self.last_command_us = self.clock.now_us();

        clock::wait_ms(&mut self.clock, RESET_DELAY_MS, self.config.i2c_timeout_ms)?;

        self.sched.reset();
        self.mode = Mode::SingleShot;
        self.config.mode = Mode::SingleShot;
        self.periodic_active = false;
        Ok(())
    }

    // =========================================================================
    // Serial number & alert limits
    // =========================================================================

    /// Read the electronic identification code. `BUSY` while periodic mode
    /// is active.
    pub fn read_serial_number(&mut self, stretch: ClockStretching) -> Result<u32> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before reading serial"));
        }

        let cmd = match stretch {
            ClockStretching::Enabled => CMD_SERIAL_STRETCH,
            ClockStretching::Disabled => CMD_SERIAL_NO_STRETCH,
        };
        self.write_command(cmd, true)?;

        let mut buf = [0u8; SERIAL_DATA_LEN];
        self.read_after_command(&mut buf, true, false)?;

        let word1 = crc::check_word(&buf[0..3])
            .ok_or(Error::crc_mismatch("CRC mismatch (serial word 1)"))?;
        let word2 = crc::check_word(&buf[3..6])
            .ok_or(Error::crc_mismatch("CRC mismatch (serial word 2)"))?;
        Ok(u32::from(word1) << 16 | u32::from(word2))
    }

    /// Read the raw word of one alert-limit slot. `BUSY` while periodic
    /// mode is active.
    pub fn read_alert_limit_raw(&mut self, kind: AlertLimitKind) -> Result<u16> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before reading alert limits"));
        }

        self.write_command(command_for_alert_read(kind), true)?;

        let mut buf = [0u8; ALERT_DATA_LEN];
        self.read_after_command(&mut buf, true, false)?;
        crc::check_word(&buf).ok_or(Error::crc_mismatch("CRC mismatch (alert limit)"))
    }

    /// Read and decode one alert-limit slot.
    pub fn read_alert_limit(&mut self, kind: AlertLimitKind) -> Result<AlertLimit> {
        let raw = self.read_alert_limit_raw(kind)?;
        let (temperature_c, humidity_pct) = decode_alert_limit(raw);
        Ok(AlertLimit {
            raw,
            temperature_c,
            humidity_pct,
        })
    }

    /// Write the raw word of one alert-limit slot and verify it via the
    /// status register (`WRITE_CRC_ERROR` / `COMMAND_FAILED` when the
    /// device rejected it). The cache slot is updated only on full success.
    pub fn write_alert_limit_raw(&mut self, kind: AlertLimitKind, value: u16) -> Result<()> {
        self.ensure_initialized()?;
        if self.periodic_active {
            return Err(Error::busy("stop periodic mode before writing alert limits"));
        }

        self.write_command_with_data(command_for_alert_write(kind), value, true)?;

        let status = self.read_status_word(true)?;
        if status & STATUS_WRITE_CRC_ERROR != 0 {
            return Err(Error::new(ErrorKind::WriteCrcError, "write checksum error"));
        }
        if status & STATUS_COMMAND_ERROR != 0 {
            return Err(Error::new(ErrorKind::CommandFailed, "command rejected"));
        }

        self.cached.alert_raw[kind.index()] = value;
        self.cached.alert_valid[kind.index()] = true;
        Ok(())
    }

    /// Encode physical thresholds and write one alert-limit slot.
    pub fn write_alert_limit(
        &mut self,
        kind: AlertLimitKind,
        temperature_c: f32,
        humidity_pct: f32,
    ) -> Result<()> {
        self.write_alert_limit_raw(kind, encode_alert_limit(temperature_c, humidity_pct))
    }

    /// Park the alert thresholds so no alert can assert (LOW_SET above
    /// HIGH_SET).
    pub fn disable_alerts(&mut self) -> Result<()> {
        self.write_alert_limit_raw(AlertLimitKind::HighSet, 0x0000)?;
        self.write_alert_limit_raw(AlertLimitKind::LowSet, 0xFFFF)
    }

    // =========================================================================
    // Transport wrappers
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

    fn raw_write(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport
            .write(self.config.address, bytes, self.config.i2c_timeout_ms)
    }

    fn raw_read(&mut self, rx: &mut [u8]) -> Result<()> {
        self.transport
            .write_read(self.config.address, &[], rx, self.config.i2c_timeout_ms)
    }

    fn write_command(&mut self, cmd: u16, tracked: bool) -> Result<()> {
        clock::ensure_command_delay(
            &mut self.clock,
            self.last_command_us,
            self.config.command_delay_ms,
            self.config.i2c_timeout_ms,
        )?;

        let buf = cmd.to_be_bytes();
        let st = self.raw_write(&buf);
        if tracked {
            self.track(st)?;
        } else {
            st?;
        }

        self.last_command_us = self.clock.now_us();
        Ok(())
    }

    fn write_command_with_data(&mut self, cmd: u16, data: u16, tracked: bool) -> Result<()> {
        clock::ensure_command_delay(
            &mut self.clock,
            self.last_command_us,
            self.config.command_delay_ms,
            self.config.i2c_timeout_ms,
        )?;

        let cmd = cmd.to_be_bytes();
        let data = data.to_be_bytes();
        let payload = [cmd[0], cmd[1], data[0], data[1], crc8(&data)];
        let st = self.raw_write(&payload);
        if tracked {
            self.track(st)?;
        } else {
            st?;
        }

        self.last_command_us = self.clock.now_us();
        Ok(())
    }

    /// Bare read after an earlier command write, honoring command spacing.
    ///
    /// With `allow_no_data` and a transport that can distinguish the read
    /// header NACK, that NACK is reported as `MEASUREMENT_NOT_READY` and
    /// recorded as bus activity instead of a failure.
    fn read_after_command(&mut self, rx: &mut [u8], tracked: bool, allow_no_data: bool) -> Result<()> {
        clock::ensure_command_delay(
            &mut self.clock,
            self.last_command_us,
            self.config.command_delay_ms,
            self.config.i2c_timeout_ms,
        )?;

        let allow = allow_no_data
            && self
                .transport
                .capabilities()
                .contains(Capabilities::READ_HEADER_NACK);

        let st = self.raw_read(rx);
        if !tracked {
            return st;
        }
        match st {
            Err(err) if err.is_input_error() => Err(err),
            Err(err) if allow && err.kind() == ErrorKind::I2cNackRead => Err(Error::with_detail(
                ErrorKind::MeasurementNotReady,
                "no new sample yet",
                err.detail(),
            )),
            other => self.track(other),
        }
    }

    // =========================================================================
    // Protocol helpers
    // =========================================================================

    fn read_status_word(&mut self, tracked: bool) -> Result<u16> {
        self.write_command(CMD_READ_STATUS, tracked)?;

        let mut buf = [0u8; STATUS_DATA_LEN];
        self.read_after_command(&mut buf, tracked, false)?;
        crc::check_word(&buf).ok_or(Error::crc_mismatch("CRC mismatch (status)"))
    }

    fn read_measurement_raw(&mut self, tracked: bool, allow_no_data: bool) -> Result<RawSample> {
        let mut buf = [0u8; MEASUREMENT_DATA_LEN];
        self.read_after_command(&mut buf, tracked, allow_no_data)?;

        let raw_temperature = crc::check_word(&buf[0..3])
            .ok_or(Error::crc_mismatch("CRC mismatch (temperature)"))?;
        let raw_humidity =
            crc::check_word(&buf[3..6]).ok_or(Error::crc_mismatch("CRC mismatch (humidity)"))?;
        Ok(RawSample {
            raw_temperature,
            raw_humidity,
        })
    }

    fn store_sample(&mut self, raw: RawSample) {
        self.raw_sample = raw;
        self.comp_sample = CompensatedSample {
            temp_c_x100: convert_temperature_c_x100(raw.raw_temperature),
            humidity_pct_x100: convert_humidity_pct_x100(raw.raw_humidity),
        };
    }

    /// One periodic fetch: issue the fetch command, read the burst, and
    /// classify a read-header NACK as "not ready" until the configured
    /// budget runs out.
    fn fetch_periodic(&mut self, now_ms: u32) -> Result<()> {
        if !self.periodic_active {
            return Err(Error::invalid_param("periodic mode not active"));
        }

        self.write_command(CMD_FETCH_DATA, true)?;

        let allow_no_data = !self
            .sched
            .not_ready_timed_out(now_ms, self.config.not_ready_timeout_ms);

        match self.read_measurement_raw(true, allow_no_data) {
            Err(err) if err.kind() == ErrorKind::MeasurementNotReady => {
                // the device answered the write and NACKed the read header:
                // bus activity, but neither success nor failure
                self.health.record_bus_activity(now_ms);
                self.sched.note_not_ready(now_ms);
                Err(err)
            }
            Err(err) => {
                self.sched.clear_not_ready();
                Err(err)
            }
            Ok(raw) => {
                self.sched.clear_not_ready();
                self.store_sample(raw);
                Ok(())
            }
        }
    }

    fn probe_tracked(&mut self) -> Result<()> {
        self.read_status_word(true).map(|_| ())
    }

    fn set_safe_baseline(&mut self) {
        self.sched.reset();
        self.mode = Mode::SingleShot;
        self.config.mode = Mode::SingleShot;
        self.periodic_active = false;
    }

    fn start_single_shot(&mut self) -> Result<()> {
        if self.periodic_active {
            return Err(Error::busy("periodic mode active"));
        }
        let cmd = command_for_single_shot(self.config.repeatability, self.config.clock_stretching);
        self.write_command(cmd, true)
    }

    fn enter_periodic(&mut self, rate: PeriodicRate, rep: Repeatability, art: bool) -> Result<()> {
        if self.periodic_active {
            self.stop_periodic_internal()?;
        }

        let cmd = if art {
            CMD_ART
        } else {
            command_for_periodic(rep, rate)
        };
        self.write_command(cmd, true)?;

        let period_ms = if art {
            ART_PERIOD_MS
        } else {
            period_ms_for_rate(rate)
        };
        let now = self.clock.now_ms();
        self.sched.start_continuous(now, period_ms);
        self.periodic_active = true;
        self.mode = if art { Mode::Art } else { Mode::Periodic };
        self.config.mode = self.mode;
        if !art {
            self.config.periodic_rate = rate;
            self.config.repeatability = rep;
            self.cached.periodic_rate = rate;
            self.cached.repeatability = rep;
        }
        self.cached.mode = self.mode;
        Ok(())
    }

    fn stop_periodic_internal(&mut self) -> Result<()> {
        if !self.periodic_active {
            self.sched.stop_continuous();
            self.mode = Mode::SingleShot;
            self.config.mode = Mode::SingleShot;
            self.cached.mode = Mode::SingleShot;
            return Ok(());
        }

        self.write_command(CMD_BREAK, true)?;
        clock::wait_ms(&mut self.clock, BREAK_DELAY_MS, self.config.i2c_timeout_ms)?;

        self.sched.stop_continuous();
        self.periodic_active = false;
        self.mode = Mode::SingleShot;
        self.config.mode = Mode::SingleShot;
        self.cached.mode = Mode::SingleShot;
        Ok(())
    }
}
