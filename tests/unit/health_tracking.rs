//! Health monitor behavior through the driver API

use enviro_drivers::status::{Error, ErrorKind};
use enviro_drivers::DriverState;

use crate::common::test_utils::{create_bme280, create_sht3x_default, status_frame};

fn bus_err() -> Error {
    Error::with_detail(ErrorKind::I2cBus, "bus fault", -42)
}

#[test]
fn test_sht3x_failures_degrade_then_offline() {
    let (mut driver, bus, _clock) = create_sht3x_default();
    assert_eq!(driver.state(), DriverState::Ready);

    // default offline threshold is 5
    for i in 1..=4u8 {
        bus.fail_next_write(bus_err());
        assert!(driver.set_heater(true).is_err());
        assert_eq!(driver.state(), DriverState::Degraded, "failure {i}");
        assert_eq!(driver.health().consecutive_failures(), i);
    }

    bus.fail_next_write(bus_err());
    assert!(driver.set_heater(true).is_err());
    assert_eq!(driver.state(), DriverState::Offline);
    assert!(!driver.is_online());
    assert_eq!(driver.health().consecutive_failures(), 5);
    assert_eq!(driver.health().total_failures(), 5);

    let last = driver.health().last_error().unwrap();
    assert_eq!(last.kind(), ErrorKind::I2cBus);
    assert_eq!(last.detail(), -42);
}

#[test]
fn test_sht3x_operations_keep_executing_while_offline() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    for _ in 0..5 {
        bus.fail_next_write(bus_err());
        let _ = driver.set_heater(true);
    }
    assert_eq!(driver.state(), DriverState::Offline);

    // no short-circuit: the next command still reaches the bus and its
    // success brings the driver straight back to READY
    let writes_before = bus.writes().len();
    driver.set_heater(false).unwrap();
    assert!(bus.writes().len() > writes_before);
    assert_eq!(driver.state(), DriverState::Ready);
    assert_eq!(driver.health().consecutive_failures(), 0);
}

#[test]
fn test_sht3x_probe_bypasses_health_counters() {
    let (mut driver, bus, _clock) = create_sht3x_default();

    bus.fail_next_write(bus_err());
    let err = driver.probe().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);

    // the failed probe is invisible to the tracked counters
    assert_eq!(driver.state(), DriverState::Ready);
    assert_eq!(driver.health().consecutive_failures(), 0);
    assert_eq!(driver.health().total_failures(), 0);
}

#[test]
fn test_sht3x_probe_success_path() {
    let (mut driver, bus, _clock) = create_sht3x_default();
    bus.push_read(status_frame(0x0000));
    driver.probe().unwrap();
    // untracked: the probe leaves the lifetime counters alone
    assert_eq!(driver.health().total_success(), 0);
}

#[test]
fn test_sht3x_custom_offline_threshold() {
    let (mut driver, bus, _clock) =
        crate::common::test_utils::create_sht3x(enviro_drivers::sht3x::Config {
            offline_threshold: 2,
            ..Default::default()
        });

    bus.fail_next_write(bus_err());
    let _ = driver.set_heater(true);
    assert_eq!(driver.state(), DriverState::Degraded);

    bus.fail_next_write(bus_err());
    let _ = driver.set_heater(true);
    assert_eq!(driver.state(), DriverState::Offline);
}

#[test]
fn test_bme280_read_failures_count() {
    let (mut driver, bus, _clock) = create_bme280();

    bus.fail_next_read(Error::with_detail(ErrorKind::I2cTimeout, "timeout", 1));
    let err = driver.read_chip_id().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::I2cTimeout);
    assert_eq!(driver.state(), DriverState::Degraded);
    assert_eq!(driver.health().total_failures(), 1);

    driver.read_chip_id().unwrap();
    assert_eq!(driver.state(), DriverState::Ready);
}

#[test]
fn test_bme280_input_errors_bypass_health() {
    let (mut driver, _bus, _clock) = create_bme280();
    let failures_before = driver.health().total_failures();

    let err = driver.write_registers(0xF4, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);

    let err = driver.write_registers(0xF4, &[0u8; 17]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParam);

    assert_eq!(driver.health().total_failures(), failures_before);
    assert_eq!(driver.state(), DriverState::Ready);
}

#[test]
fn test_health_timestamps_advance_with_clock() {
    let (mut driver, bus, clock) = create_sht3x_default();

    clock.set_ms(500);
    bus.fail_next_write(bus_err());
    let _ = driver.set_heater(true);
    let error_ms = driver.health().last_error_ms();
    assert!(error_ms >= 500);
    assert_eq!(driver.health().last_bus_activity_ms(), error_ms);

    clock.set_ms(900);
    driver.set_heater(false).unwrap();
    assert!(driver.health().last_ok_ms() >= 900);
}
