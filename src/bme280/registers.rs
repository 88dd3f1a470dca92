//! BME280 register map and field packing
//!
//! Multi-byte register values are little-endian. The 20-bit ADC readings in
//! the data burst are big-endian `MSB | LSB | XLSB` with the XLSB's high
//! nibble carrying the four lowest bits.

use super::{Filter, Mode, Oversampling, Standby};

/// Chip-ID register.
pub(crate) const REG_CHIP_ID: u8 = 0xD0;
/// Expected chip-ID value.
pub const CHIP_ID: u8 = 0x60;

/// Reset register; writing [`RESET_VALUE`] triggers a power-on reset.
pub(crate) const REG_RESET: u8 = 0xE0;
pub(crate) const RESET_VALUE: u8 = 0xB6;

/// Humidity oversampling (effective after the next `ctrl_meas` write).
pub(crate) const REG_CTRL_HUM: u8 = 0xF2;
/// Measuring / NVM-copy status flags.
pub(crate) const REG_STATUS: u8 = 0xF3;
/// Temperature/pressure oversampling and mode.
pub(crate) const REG_CTRL_MEAS: u8 = 0xF4;
/// Standby time and IIR filter.
pub(crate) const REG_CONFIG: u8 = 0xF5;

/// Start of the 8-byte measurement burst (press, temp, hum).
pub(crate) const REG_DATA_START: u8 = 0xF7;
pub(crate) const DATA_LEN: usize = 8;

/// First calibration block: T1..T3, P1..P9.
pub(crate) const REG_CALIB_TP_START: u8 = 0x88;
pub(crate) const CALIB_TP_LEN: usize = 26;
/// H1 sits alone at the end of the first block's address range.
pub(crate) const REG_CALIB_H1: u8 = 0xA1;
/// Second calibration block: H2..H6.
pub(crate) const REG_CALIB_H_START: u8 = 0xE1;
pub(crate) const CALIB_H_LEN: usize = 7;

pub(crate) const MASK_STATUS_MEASURING: u8 = 0x08;
pub(crate) const MASK_STATUS_IM_UPDATE: u8 = 0x01;

const BIT_CTRL_MEAS_OSRS_T: u8 = 5;
const BIT_CTRL_MEAS_OSRS_P: u8 = 2;
const BIT_CONFIG_T_SB: u8 = 5;
const BIT_CONFIG_FILTER: u8 = 2;

pub(crate) fn build_ctrl_hum(osrs_h: Oversampling) -> u8 {
    osrs_h.bits()
}

pub(crate) fn build_ctrl_meas(osrs_t: Oversampling, osrs_p: Oversampling, mode: Mode) -> u8 {
    (osrs_t.bits() << BIT_CTRL_MEAS_OSRS_T)
        | (osrs_p.bits() << BIT_CTRL_MEAS_OSRS_P)
        | mode.bits()
}

pub(crate) fn build_config(standby: Standby, filter: Filter) -> u8 {
    (standby.bits() << BIT_CONFIG_T_SB) | (filter.bits() << BIT_CONFIG_FILTER)
}
