#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod bme280;
pub mod clock;
pub mod health;
pub mod sht3x;
pub mod status;
pub mod transport;

mod schedule;

// Re-export main types
pub use bme280::Bme280;
pub use clock::{time_reached, Clock};
pub use health::{DriverState, HealthMonitor};
pub use sht3x::Sht3x;
pub use status::{Error, ErrorKind, Result, Scheduled};
pub use transport::{Capabilities, I2cTransport, Transport};

/// BME280 I2C address when the SDO pin is low (default: 0x76)
pub const BME280_ADDR_LOW: u8 = bme280::I2C_ADDR_LOW;

/// BME280 I2C address when the SDO pin is high (alternative: 0x77)
pub const BME280_ADDR_HIGH: u8 = bme280::I2C_ADDR_HIGH;

/// SHT3x I2C address when the ADDR pin is low (default: 0x44)
pub const SHT3X_ADDR_LOW: u8 = sht3x::commands::I2C_ADDR_LOW;

/// SHT3x I2C address when the ADDR pin is high (alternative: 0x45)
pub const SHT3X_ADDR_HIGH: u8 = sht3x::commands::I2C_ADDR_HIGH;
