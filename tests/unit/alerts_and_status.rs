//! SHT3x status register, heater, serial number and alert limits

use enviro_drivers::sht3x::{
    crc8, encode_alert_limit, AlertLimitKind, ClockStretching, Config, Mode,
};
use enviro_drivers::status::ErrorKind;

use crate::common::test_utils::{
    create_sht3x, create_sht3x_default, serial_frame, status_frame, word_with_crc,
};

#[test]
fn test_status_register_parsing() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    // alert pending + heater on + RH alert + reset detected
    bus.push_read(status_frame(0x8000 | 0x2000 | 0x0800 | 0x0010));
    let status = driver.read_status().unwrap();
    assert!(status.alert_pending);
    assert!(status.heater_on);
    assert!(status.rh_alert);
    assert!(!status.t_alert);
    assert!(status.reset_detected);
    assert!(!status.command_error);
    assert!(!status.write_crc_error);
}

#[test]
fn test_clear_status_command() {
    let (mut driver, bus, _clock) = create_sht3x_default();
    driver.clear_status().unwrap();
    assert_eq!(bus.writes().last().unwrap(), &vec![0x30, 0x41]);
}

#[test]
fn test_heater_round_trip() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    driver.set_heater(true).unwrap();
    assert_eq!(bus.writes().last().unwrap(), &vec![0x30, 0x6D]);
    assert!(driver.cached_settings().heater_enabled);

    bus.push_read(status_frame(0x2000));
    assert!(driver.read_heater_status().unwrap());

    driver.set_heater(false).unwrap();
    assert_eq!(bus.writes().last().unwrap(), &vec![0x30, 0x66]);
    assert!(!driver.cached_settings().heater_enabled);
}

#[test]
fn test_serial_number_read() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    bus.push_read(serial_frame(0xDEAD_BEEF));
    let serial = driver
        .read_serial_number(ClockStretching::Disabled)
        .unwrap();
    assert_eq!(serial, 0xDEAD_BEEF);
    assert_eq!(bus.writes().last().unwrap(), &vec![0x36, 0x82]);

    bus.push_read(serial_frame(0x1234_5678));
    let serial = driver.read_serial_number(ClockStretching::Enabled).unwrap();
    assert_eq!(serial, 0x1234_5678);
    assert_eq!(bus.writes().last().unwrap(), &vec![0x37, 0x80]);
}

#[test]
fn test_serial_number_crc_failure() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    let mut frame = serial_frame(0xDEAD_BEEF);
    frame[2] ^= 0x01;
    bus.push_read(frame);
    let err = driver
        .read_serial_number(ClockStretching::Disabled)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CrcMismatch);
}

#[test]
fn test_alert_write_payload_and_cache() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    bus.push_read(status_frame(0x0000)); // post-write status verify
    driver
        .write_alert_limit(AlertLimitKind::HighSet, 30.0, 60.0)
        .unwrap();

    let writes = bus.writes();
    let payload = writes
        .iter()
        .find(|w| w.len() == 5)
        .expect("no parameterized write");
    // 0x611D command, packed limit 0x98DB, CRC over the data word
    assert_eq!(payload[..2], [0x61, 0x1D]);
    assert_eq!(payload[2..4], [0x98, 0xDB]);
    assert_eq!(payload[4], crc8(&[0x98, 0xDB]));

    let cached = driver.cached_settings();
    assert!(cached.alert_valid[0]);
    assert_eq!(cached.alert_raw[0], 0x98DB);
    assert!(!cached.alert_valid[1]);
}

#[test]
fn test_alert_write_rejected_by_device() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    // device reports a write checksum error
    bus.push_read(status_frame(0x0001));
    let err = driver
        .write_alert_limit_raw(AlertLimitKind::LowSet, 0x1234)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WriteCrcError);
    assert!(!driver.cached_settings().alert_valid[3]);

    // device reports a command error
    bus.push_read(status_frame(0x0002));
    let err = driver
        .write_alert_limit_raw(AlertLimitKind::LowSet, 0x1234)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommandFailed);
    assert!(!driver.cached_settings().alert_valid[3]);
}

#[test]
fn test_alert_read_decodes_within_tolerance() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    let word = encode_alert_limit(30.0, 60.0);
    bus.push_read(word_with_crc(word));
    let limit = driver.read_alert_limit(AlertLimitKind::HighSet).unwrap();
    assert_eq!(limit.raw, word);
    assert!((limit.temperature_c - 30.0).abs() <= 0.7);
    assert!((limit.humidity_pct - 60.0).abs() <= 1.5);
    assert_eq!(bus.writes().last().unwrap(), &vec![0xE1, 0x1F]);
}

#[test]
fn test_disable_alerts_parks_both_set_limits() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    bus.push_read(status_frame(0x0000));
    bus.push_read(status_frame(0x0000));
    driver.disable_alerts().unwrap();

    let cached = driver.cached_settings();
    assert_eq!(cached.alert_raw[AlertLimitKind::HighSet as usize], 0x0000);
    assert_eq!(cached.alert_raw[AlertLimitKind::LowSet as usize], 0xFFFF);
}

#[test]
fn test_side_operations_blocked_in_periodic_mode() {
    let (mut driver, _bus, _clock) = create_sht3x(Config {
        mode: Mode::Periodic,
        ..Default::default()
    });

    assert_eq!(driver.read_status().unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(driver.clear_status().unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(driver.set_heater(true).unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(driver.soft_reset().unwrap_err().kind(), ErrorKind::Busy);
    assert_eq!(
        driver
            .read_serial_number(ClockStretching::Disabled)
            .unwrap_err()
            .kind(),
        ErrorKind::Busy
    );
    assert_eq!(
        driver
            .read_alert_limit_raw(AlertLimitKind::HighSet)
            .unwrap_err()
            .kind(),
        ErrorKind::Busy
    );
    assert_eq!(
        driver
            .write_alert_limit_raw(AlertLimitKind::HighSet, 0)
            .unwrap_err()
            .kind(),
        ErrorKind::Busy
    );
}

#[test]
fn test_read_settings_tolerates_periodic_status_block() {
    let (mut driver, _bus, _clock) = create_sht3x(Config {
        mode: Mode::Periodic,
        ..Default::default()
    });

    // status read is BUSY in periodic mode; the snapshot still comes back
    let snapshot = driver.read_settings().unwrap();
    assert!(!snapshot.status_valid);
    assert!(snapshot.periodic_active);
    assert_eq!(snapshot.mode, Mode::Periodic);
}

#[test]
fn test_read_settings_includes_status_when_idle() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    bus.push_read(status_frame(0x0400)); // T-alert tracking
    let snapshot = driver.read_settings().unwrap();
    assert!(snapshot.status_valid);
    assert!(snapshot.status.t_alert);
    assert_eq!(snapshot.mode, Mode::SingleShot);
    assert!(!snapshot.measurement_pending);
}
