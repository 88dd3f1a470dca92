//! Error taxonomy shared by both drivers
//!
//! Every fallible operation returns [`Result<T>`]. The error carries a
//! [`ErrorKind`] from a closed set, a transport-specific `detail` code and a
//! static diagnostic message. The set of kinds is part of the external
//! contract: callers dispatch on [`Error::kind`] to pick a propagation
//! policy (see [`Error::is_flow_signal`], [`Error::is_transport_failure`]
//! and [`Error::is_input_error`]).

/// Failure kinds reported by the drivers and their transports.
///
/// The transport-granular `I2c*` kinds are produced by [`Transport`]
/// implementations; everything else is produced by the drivers themselves.
///
/// [`Transport`]: crate::transport::Transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// `init()` has not completed (or `shutdown()` was called)
    NotInitialized,
    /// A configuration value was rejected at init time
    InvalidConfig,
    /// An argument to an operation was rejected
    InvalidParam,
    /// The device did not respond to an identifying read
    DeviceNotFound,
    /// The chip-ID register did not contain the expected value
    ChipIdMismatch,
    /// Factory calibration failed validation
    CalibrationInvalid,
    /// No sample is available yet
    MeasurementNotReady,
    /// Compensation arithmetic failed (divisor collapsed to zero)
    CompensationError,
    /// The driver or device is busy with a conflicting operation
    Busy,
    /// Work has been scheduled; not an error and not yet a result
    InProgress,
    /// An operation exceeded its deadline
    Timeout,
    /// A received data word did not match its CRC byte
    CrcMismatch,
    /// The device reported the last command as failed
    CommandFailed,
    /// The device reported a checksum error on a written data word
    WriteCrcError,
    /// The operation requires a capability this build does not provide
    Unsupported,
    /// Unclassified I2C failure
    I2cError,
    /// Address byte was not acknowledged during a write
    I2cNackAddr,
    /// A data byte was not acknowledged during a write
    I2cNackData,
    /// The read header (address + R) was not acknowledged
    I2cNackRead,
    /// The I2C transaction timed out
    I2cTimeout,
    /// Bus-level fault (arbitration loss, stuck line, ...)
    I2cBus,
}

/// Error value returned by every fallible driver operation.
///
/// `detail` is implementation specific: transports put their native error
/// code there, and choke-point translations (e.g. `DeviceNotFound`) carry
/// the detail of the transport failure they subsume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error {
    kind: ErrorKind,
    detail: i32,
    message: &'static str,
}

impl Error {
    /// Create an error with a zero detail code.
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            detail: 0,
            message,
        }
    }

    /// Create an error carrying a transport-specific detail code.
    pub const fn with_detail(kind: ErrorKind, message: &'static str, detail: i32) -> Self {
        Self {
            kind,
            detail,
            message,
        }
    }

    /// The failure kind.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Transport-specific detail code (0 when not applicable).
    pub const fn detail(&self) -> i32 {
        self.detail
    }

    /// Static diagnostic message.
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// Same error with the detail code replaced.
    pub const fn detailed(self, detail: i32) -> Self {
        Self { detail, ..self }
    }

    /// Flow signals are neither failures nor results: the caller is expected
    /// to keep driving the state machine (`Busy`, `InProgress`,
    /// `MeasurementNotReady`).
    pub const fn is_flow_signal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Busy | ErrorKind::InProgress | ErrorKind::MeasurementNotReady
        )
    }

    /// Transport failures are counted by the health monitor and surfaced
    /// as-is; `recover()` is the caller's tool.
    pub const fn is_transport_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::I2cError
                | ErrorKind::I2cNackAddr
                | ErrorKind::I2cNackData
                | ErrorKind::I2cNackRead
                | ErrorKind::I2cTimeout
                | ErrorKind::I2cBus
                | ErrorKind::Timeout
        )
    }

    /// Only the transport-granular `I2c*` kinds: the signal init and probe
    /// use to diagnose "no device at this address". A generic `Timeout`
    /// (e.g. from the command-spacing guard) is not bus evidence and must
    /// not be reinterpreted as an absent device.
    pub const fn is_i2c_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::I2cError
                | ErrorKind::I2cNackAddr
                | ErrorKind::I2cNackData
                | ErrorKind::I2cNackRead
                | ErrorKind::I2cTimeout
                | ErrorKind::I2cBus
        )
    }

    /// Input errors indicate a programmer mistake; they bypass the health
    /// monitor and are never retried.
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotInitialized
                | ErrorKind::InvalidConfig
                | ErrorKind::InvalidParam
                | ErrorKind::Unsupported
        )
    }

    pub(crate) const fn not_initialized() -> Self {
        Self::new(ErrorKind::NotInitialized, "init() not called")
    }

    pub(crate) const fn invalid_config(message: &'static str) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    pub(crate) const fn invalid_param(message: &'static str) -> Self {
        Self::new(ErrorKind::InvalidParam, message)
    }

    pub(crate) const fn busy(message: &'static str) -> Self {
        Self::new(ErrorKind::Busy, message)
    }

    pub(crate) const fn not_ready(message: &'static str) -> Self {
        Self::new(ErrorKind::MeasurementNotReady, message)
    }

    pub(crate) const fn timeout(message: &'static str) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub(crate) const fn unsupported(message: &'static str) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub(crate) const fn crc_mismatch(message: &'static str) -> Self {
        Self::new(ErrorKind::CrcMismatch, message)
    }

    pub(crate) const fn device_not_found(detail: i32) -> Self {
        Self::with_detail(ErrorKind::DeviceNotFound, "device not responding", detail)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.detail != 0 {
            write!(f, "{:?}: {} (detail {})", self.kind, self.message, self.detail)
        } else {
            write!(f, "{:?}: {}", self.kind, self.message)
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Returned by request operations once work has been scheduled.
///
/// The measurement is *in progress*: drive [`tick`] past `ready_at_ms`
/// (wraparound-safe) to complete it, then collect the sample.
///
/// [`tick`]: crate::sht3x::Sht3x::tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use]
pub struct Scheduled {
    /// Millisecond timestamp at which the sample is expected to be ready.
    pub ready_at_ms: u32,
}
