//! SHT3x command words, status masks and timing tables
//!
//! Every device interaction is a 16-bit command written MSB-first.
//! Parameterized writes append a big-endian data word plus a CRC-8 over the
//! data word; read bursts come back as `(msb, lsb, crc)` triplets.

use super::{AlertLimitKind, ClockStretching, PeriodicRate, Repeatability};

/// ADDR pin low (GND).
pub const I2C_ADDR_LOW: u8 = 0x44;
/// ADDR pin high (VDD).
pub const I2C_ADDR_HIGH: u8 = 0x45;

/// I2C general-call address, target of the bus-wide reset.
pub(crate) const GENERAL_CALL_ADDR: u8 = 0x00;
/// Second byte of the general-call reset sequence.
pub(crate) const GENERAL_CALL_RESET_BYTE: u8 = 0x06;

// Single-shot, clock stretching enabled / disabled, by repeatability.
pub(crate) const CMD_SINGLE_SHOT_STRETCH_HIGH: u16 = 0x2C06;
pub(crate) const CMD_SINGLE_SHOT_STRETCH_MED: u16 = 0x2C0D;
pub(crate) const CMD_SINGLE_SHOT_STRETCH_LOW: u16 = 0x2C10;
pub(crate) const CMD_SINGLE_SHOT_NO_STRETCH_HIGH: u16 = 0x2400;
pub(crate) const CMD_SINGLE_SHOT_NO_STRETCH_MED: u16 = 0x240B;
pub(crate) const CMD_SINGLE_SHOT_NO_STRETCH_LOW: u16 = 0x2416;

// Periodic acquisition, by rate and repeatability.
pub(crate) const CMD_PERIODIC_0_5_HIGH: u16 = 0x2032;
pub(crate) const CMD_PERIODIC_0_5_MED: u16 = 0x2024;
pub(crate) const CMD_PERIODIC_0_5_LOW: u16 = 0x202F;
pub(crate) const CMD_PERIODIC_1_HIGH: u16 = 0x2130;
pub(crate) const CMD_PERIODIC_1_MED: u16 = 0x2126;
pub(crate) const CMD_PERIODIC_1_LOW: u16 = 0x212D;
pub(crate) const CMD_PERIODIC_2_HIGH: u16 = 0x2236;
pub(crate) const CMD_PERIODIC_2_MED: u16 = 0x2220;
pub(crate) const CMD_PERIODIC_2_LOW: u16 = 0x222B;
pub(crate) const CMD_PERIODIC_4_HIGH: u16 = 0x2334;
pub(crate) const CMD_PERIODIC_4_MED: u16 = 0x2322;
pub(crate) const CMD_PERIODIC_4_LOW: u16 = 0x2329;
pub(crate) const CMD_PERIODIC_10_HIGH: u16 = 0x2737;
pub(crate) const CMD_PERIODIC_10_MED: u16 = 0x2721;
pub(crate) const CMD_PERIODIC_10_LOW: u16 = 0x272A;

/// Readout of the latest periodic sample.
pub(crate) const CMD_FETCH_DATA: u16 = 0xE000;
/// Accelerated response time: continuous acquisition at 4 Hz.
pub(crate) const CMD_ART: u16 = 0x2B32;
/// Stop periodic/ART acquisition.
pub(crate) const CMD_BREAK: u16 = 0x3093;

pub(crate) const CMD_READ_STATUS: u16 = 0xF32D;
pub(crate) const CMD_CLEAR_STATUS: u16 = 0x3041;
pub(crate) const CMD_SOFT_RESET: u16 = 0x30A2;
pub(crate) const CMD_HEATER_ENABLE: u16 = 0x306D;
pub(crate) const CMD_HEATER_DISABLE: u16 = 0x3066;
pub(crate) const CMD_SERIAL_STRETCH: u16 = 0x3780;
pub(crate) const CMD_SERIAL_NO_STRETCH: u16 = 0x3682;

pub(crate) const CMD_ALERT_READ_HIGH_SET: u16 = 0xE11F;
pub(crate) const CMD_ALERT_READ_HIGH_CLEAR: u16 = 0xE114;
pub(crate) const CMD_ALERT_READ_LOW_CLEAR: u16 = 0xE109;
pub(crate) const CMD_ALERT_READ_LOW_SET: u16 = 0xE102;
pub(crate) const CMD_ALERT_WRITE_HIGH_SET: u16 = 0x611D;
pub(crate) const CMD_ALERT_WRITE_HIGH_CLEAR: u16 = 0x6116;
pub(crate) const CMD_ALERT_WRITE_LOW_CLEAR: u16 = 0x610B;
pub(crate) const CMD_ALERT_WRITE_LOW_SET: u16 = 0x6100;

// Status register bit masks (16-bit word).
pub(crate) const STATUS_ALERT_PENDING: u16 = 0x8000;
pub(crate) const STATUS_HEATER_ON: u16 = 0x2000;
pub(crate) const STATUS_RH_ALERT: u16 = 0x0800;
pub(crate) const STATUS_T_ALERT: u16 = 0x0400;
pub(crate) const STATUS_RESET_DETECTED: u16 = 0x0010;
pub(crate) const STATUS_COMMAND_ERROR: u16 = 0x0002;
pub(crate) const STATUS_WRITE_CRC_ERROR: u16 = 0x0001;

/// Measurement burst: T word + CRC, RH word + CRC.
pub(crate) const MEASUREMENT_DATA_LEN: usize = 6;
/// Status burst: one word + CRC.
pub(crate) const STATUS_DATA_LEN: usize = 3;
/// Serial-number burst: two words, each with CRC.
pub(crate) const SERIAL_DATA_LEN: usize = 6;
/// Alert-limit burst: one word + CRC.
pub(crate) const ALERT_DATA_LEN: usize = 3;

pub(crate) fn command_for_single_shot(rep: Repeatability, stretch: ClockStretching) -> u16 {
    let stretch = stretch == ClockStretching::Enabled;
    match rep {
        Repeatability::High => {
            if stretch {
                CMD_SINGLE_SHOT_STRETCH_HIGH
            } else {
                CMD_SINGLE_SHOT_NO_STRETCH_HIGH
            }
        }
        Repeatability::Medium => {
            if stretch {
                CMD_SINGLE_SHOT_STRETCH_MED
            } else {
                CMD_SINGLE_SHOT_NO_STRETCH_MED
            }
        }
        Repeatability::Low => {
            if stretch {
                CMD_SINGLE_SHOT_STRETCH_LOW
            } else {
                CMD_SINGLE_SHOT_NO_STRETCH_LOW
            }
        }
    }
}

pub(crate) fn command_for_periodic(rep: Repeatability, rate: PeriodicRate) -> u16 {
    match rate {
        PeriodicRate::Mps0_5 => match rep {
            Repeatability::High => CMD_PERIODIC_0_5_HIGH,
            Repeatability::Medium => CMD_PERIODIC_0_5_MED,
            Repeatability::Low => CMD_PERIODIC_0_5_LOW,
        },
        PeriodicRate::Mps1 => match rep {
            Repeatability::High => CMD_PERIODIC_1_HIGH,
            Repeatability::Medium => CMD_PERIODIC_1_MED,
            Repeatability::Low => CMD_PERIODIC_1_LOW,
        },
        PeriodicRate::Mps2 => match rep {
            Repeatability::High => CMD_PERIODIC_2_HIGH,
            Repeatability::Medium => CMD_PERIODIC_2_MED,
            Repeatability::Low => CMD_PERIODIC_2_LOW,
        },
        PeriodicRate::Mps4 => match rep {
            Repeatability::High => CMD_PERIODIC_4_HIGH,
            Repeatability::Medium => CMD_PERIODIC_4_MED,
            Repeatability::Low => CMD_PERIODIC_4_LOW,
        },
        PeriodicRate::Mps10 => match rep {
            Repeatability::High => CMD_PERIODIC_10_HIGH,
            Repeatability::Medium => CMD_PERIODIC_10_MED,
            Repeatability::Low => CMD_PERIODIC_10_LOW,
        },
    }
}

pub(crate) fn command_for_alert_read(kind: AlertLimitKind) -> u16 {
    match kind {
        AlertLimitKind::HighSet => CMD_ALERT_READ_HIGH_SET,
        AlertLimitKind::HighClear => CMD_ALERT_READ_HIGH_CLEAR,
        AlertLimitKind::LowClear => CMD_ALERT_READ_LOW_CLEAR,
        AlertLimitKind::LowSet => CMD_ALERT_READ_LOW_SET,
    }
}

pub(crate) fn command_for_alert_write(kind: AlertLimitKind) -> u16 {
    match kind {
        AlertLimitKind::HighSet => CMD_ALERT_WRITE_HIGH_SET,
        AlertLimitKind::HighClear => CMD_ALERT_WRITE_HIGH_CLEAR,
        AlertLimitKind::LowClear => CMD_ALERT_WRITE_LOW_CLEAR,
        AlertLimitKind::LowSet => CMD_ALERT_WRITE_LOW_SET,
    }
}

/// Device sampling interval per periodic rate.
pub(crate) fn period_ms_for_rate(rate: PeriodicRate) -> u32 {
    match rate {
        PeriodicRate::Mps0_5 => 2000,
        PeriodicRate::Mps1 => 1000,
        PeriodicRate::Mps2 => 500,
        PeriodicRate::Mps4 => 250,
        PeriodicRate::Mps10 => 100,
    }
}

/// Worst-case conversion time by repeatability; the low-VDD column of the
/// datasheet is a little slower.
pub(crate) fn base_measurement_ms(rep: Repeatability, low_vdd: bool) -> u32 {
    if low_vdd {
        match rep {
            Repeatability::Low => 5,
            Repeatability::Medium => 7,
            Repeatability::High => 16,
        }
    } else {
        match rep {
            Repeatability::Low => 4,
            Repeatability::Medium => 6,
            Repeatability::High => 15,
        }
    }
}
