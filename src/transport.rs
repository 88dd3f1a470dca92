//! Injected I2C transport contract
//!
//! The drivers never own a bus peripheral. They consume a [`Transport`]
//! implementation that carries out two operations:
//!
//! - [`write`](Transport::write): a plain write to a 7-bit address.
//! - [`write_read`](Transport::write_read): an optional command write
//!   followed by a read. With an empty `tx` buffer this is a bare read at
//!   the device address, used to fetch data after an earlier command write.
//!   A non-empty `tx` requests a combined repeated-start transaction, which
//!   only the register-based (pressure) protocol uses; the command+CRC
//!   (humidity) driver always separates write and read.
//!
//! Transports report failures with the transport-granular `I2c*` kinds and
//! declare which of those they can reliably distinguish via
//! [`Capabilities`]. The drivers use [`Capabilities::READ_HEADER_NACK`] to
//! tell "sample not ready yet" apart from a genuine fault in periodic mode.

use crate::status::{Error, ErrorKind, Result};

/// Bitmask of failure kinds a transport can reliably distinguish.
///
/// A transport that cannot separate a NACKed read header from a generic
/// read failure must not advertise [`Capabilities::READ_HEADER_NACK`];
/// the humidity driver then treats every fetch failure as a health event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities(u8);

impl Capabilities {
    /// No distinguishing capability declared.
    pub const NONE: Self = Self(0);
    /// `I2cNackRead` reliably means "no ACK to the read header".
    pub const READ_HEADER_NACK: Self = Self(1 << 0);
    /// `I2cTimeout` is reported distinctly from `I2cError`.
    pub const TIMEOUT: Self = Self(1 << 1);
    /// `I2cBus` (arbitration loss, stuck lines) is reported distinctly.
    pub const BUS_ERROR: Self = Self(1 << 2);

    /// Whether all bits of `other` are present in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl core::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Platform-injected I2C operations.
///
/// Implementations own whatever context they need (bus handle, DMA state,
/// GPIO lines); the drivers treat the transport as opaque. Every call
/// carries the configured per-transaction timeout; transports must honor it
/// and report expiry as [`ErrorKind::I2cTimeout`]. Failures the transport
/// cannot classify map to [`ErrorKind::I2cError`].
pub trait Transport {
    /// Write `bytes` to the 7-bit `address`.
    fn write(&mut self, address: u8, bytes: &[u8], timeout_ms: u32) -> Result<()>;

    /// Optionally write `tx`, then read `rx.len()` bytes from `address`.
    ///
    /// An empty `tx` performs a bare read. Implementations that cannot do a
    /// combined repeated-start transaction must reject a non-empty `tx`
    /// with [`ErrorKind::InvalidParam`].
    fn write_read(&mut self, address: u8, tx: &[u8], rx: &mut [u8], timeout_ms: u32)
        -> Result<()>;

    /// Failure kinds this transport distinguishes.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Free a stuck bus, e.g. by clocking SCL pulses.
    ///
    /// Used by the recovery ladder when enabled; the default reports the
    /// capability as absent, which skips the ladder step.
    fn bus_reset(&mut self) -> Result<()> {
        Err(Error::unsupported("bus reset not available"))
    }

    /// Pulse the device's dedicated reset line.
    ///
    /// Used by the recovery ladder when enabled; the default reports the
    /// capability as absent, which skips the ladder step.
    fn hard_reset(&mut self) -> Result<()> {
        Err(Error::unsupported("hard reset not available"))
    }
}

/// Bridge from any [`embedded_hal::i2c::I2c`] bus to [`Transport`].
///
/// Error classification is mined from [`embedded_hal::i2c::ErrorKind`]:
/// `NoAcknowledge(Address)` on a bare read becomes
/// [`ErrorKind::I2cNackRead`], so the bridge advertises
/// [`Capabilities::READ_HEADER_NACK`] and [`Capabilities::BUS_ERROR`].
/// `embedded-hal` has no timeout notion, so the `timeout_ms` argument is
/// ignored and [`Capabilities::TIMEOUT`] is not declared.
pub struct I2cTransport<I2C> {
    i2c: I2C,
}

impl<I2C> I2cTransport<I2C> {
    /// Wrap an `embedded-hal` I2C bus.
    pub const fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Consume the bridge and return the bus peripheral.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

/// Transaction direction, used to disambiguate an address NACK.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Write,
    BareRead,
}

fn classify<E: embedded_hal::i2c::Error>(err: &E, phase: Phase) -> Error {
    use embedded_hal::i2c::{ErrorKind as HalKind, NoAcknowledgeSource};

    match err.kind() {
        HalKind::NoAcknowledge(NoAcknowledgeSource::Address) => match phase {
            // On a bare read the address byte *is* the read header.
            Phase::BareRead => Error::new(ErrorKind::I2cNackRead, "read header not acknowledged"),
            Phase::Write => Error::new(ErrorKind::I2cNackAddr, "address not acknowledged"),
        },
        HalKind::NoAcknowledge(NoAcknowledgeSource::Data) => {
            Error::new(ErrorKind::I2cNackData, "data byte not acknowledged")
        }
        HalKind::NoAcknowledge(NoAcknowledgeSource::Unknown) => {
            Error::new(ErrorKind::I2cError, "unacknowledged transfer")
        }
        HalKind::Bus | HalKind::ArbitrationLoss => Error::new(ErrorKind::I2cBus, "bus fault"),
        _ => Error::new(ErrorKind::I2cError, "I2C transfer failed"),
    }
}

impl<I2C, E> Transport for I2cTransport<I2C>
where
    I2C: embedded_hal::i2c::I2c<Error = E>,
    E: embedded_hal::i2c::Error,
{
    fn write(&mut self, address: u8, bytes: &[u8], _timeout_ms: u32) -> Result<()> {
        self.i2c
            .write(address, bytes)
            .map_err(|e| classify(&e, Phase::Write))
    }

    fn write_read(
        &mut self,
        address: u8,
        tx: &[u8],
        rx: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<()> {
        if tx.is_empty() {
            self.i2c
                .read(address, rx)
                .map_err(|e| classify(&e, Phase::BareRead))
        } else {
            self.i2c
                .write_read(address, tx, rx)
                .map_err(|e| classify(&e, Phase::Write))
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_HEADER_NACK | Capabilities::BUS_ERROR
    }
}
