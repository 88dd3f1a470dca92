//! Recovery-ladder behavior for both drivers

use enviro_drivers::sht3x::{self, Mode as ShtMode};
use enviro_drivers::status::{Error, ErrorKind};
use enviro_drivers::{bme280, DriverState};

use crate::common::test_utils::{create_bme280_with, create_sht3x, status_frame};

fn timeout_err() -> Error {
    Error::with_detail(ErrorKind::I2cTimeout, "transaction timeout", 5)
}

#[test]
fn test_sht3x_recovery_succeeds_on_second_probe() {
    let (mut driver, bus, _clock) = create_sht3x(sht3x::Config {
        recover_backoff_ms: 0,
        ..Default::default()
    });
    bus.provide_bus_reset(Ok(()));

    // probe after the bus reset times out; the ladder escalates to a soft
    // reset whose probe succeeds
    bus.push_read_error(timeout_err());
    bus.push_read(status_frame(0x0000));

    driver.recover().unwrap();
    assert_eq!(bus.bus_reset_count(), 1);
    assert_eq!(driver.mode(), ShtMode::SingleShot);
    assert!(!driver.periodic_active());
    assert_eq!(driver.state(), DriverState::Ready);
    assert!(!driver.measurement_ready());
}

#[test]
fn test_sht3x_recovery_exhausts_the_ladder() {
    let (mut driver, bus, _clock) = create_sht3x(sht3x::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: true,
        recover_use_hard_reset: false,
        allow_general_call_reset: false,
        ..Default::default()
    });

    // soft reset goes out, but the probe read keeps timing out
    bus.push_read_error(timeout_err());

    let err = driver.recover().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::I2cTimeout);
    assert!(driver.health().consecutive_failures() > 0);
    assert_eq!(driver.state(), DriverState::Degraded);
}

#[test]
fn test_sht3x_recovery_backoff() {
    let (mut driver, bus, clock) = create_sht3x(sht3x::Config {
        recover_backoff_ms: 1000,
        ..Default::default()
    });
    bus.provide_bus_reset(Ok(()));

    bus.push_read(status_frame(0x0000));
    driver.recover().unwrap();

    let err = driver.recover().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);

    clock.advance_ms(1001);
    bus.push_read(status_frame(0x0000));
    driver.recover().unwrap();
    assert_eq!(bus.bus_reset_count(), 2);
}

#[test]
fn test_sht3x_missing_bus_reset_hook_is_skipped() {
    // no bus-reset hook provided: the step reports UNSUPPORTED and the
    // ladder moves on without recording a failure
    let (mut driver, bus, _clock) = create_sht3x(sht3x::Config::default());

    bus.push_read(status_frame(0x0000)); // soft-reset probe
    driver.recover().unwrap();
    assert_eq!(bus.bus_reset_count(), 0);
    assert_eq!(driver.health().consecutive_failures(), 0);
}

#[test]
fn test_sht3x_hard_reset_step() {
    let (mut driver, bus, _clock) = create_sht3x(sht3x::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: false,
        recover_use_hard_reset: true,
        ..Default::default()
    });
    bus.provide_hard_reset(Ok(()));

    bus.push_read(status_frame(0x0000));
    driver.recover().unwrap();
    assert_eq!(bus.hard_reset_count(), 1);
}

#[test]
fn test_sht3x_general_call_reset_step() {
    let (mut driver, bus, _clock) = create_sht3x(sht3x::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: false,
        recover_use_hard_reset: false,
        allow_general_call_reset: true,
        ..Default::default()
    });

    bus.push_read(status_frame(0x0000)); // probe after the reset
    driver.recover().unwrap();

    // the reset byte went to the general-call address
    let addresses = bus.write_addresses();
    let writes = bus.writes();
    let general = addresses
        .iter()
        .zip(&writes)
        .find(|(addr, _)| **addr == 0x00)
        .expect("no general-call write");
    assert_eq!(general.1, &vec![0x06]);
}

#[test]
fn test_sht3x_general_call_reset_requires_opt_in() {
    let (mut driver, _bus, _clock) = create_sht3x(sht3x::Config::default());
    let err = driver.general_call_reset().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn test_sht3x_recovery_stops_periodic_before_soft_reset() {
    let (mut driver, bus, _clock) = create_sht3x(sht3x::Config {
        mode: ShtMode::Periodic,
        recover_use_bus_reset: false,
        ..Default::default()
    });
    assert!(driver.periodic_active());

    bus.clear_operations();
    bus.push_read(status_frame(0x0000)); // soft-reset probe
    driver.recover().unwrap();

    let writes = bus.writes();
    let break_at = writes.iter().position(|w| w == &vec![0x30, 0x93]);
    let reset_at = writes.iter().position(|w| w == &vec![0x30, 0xA2]);
    assert!(break_at.unwrap() < reset_at.unwrap());
    assert!(!driver.periodic_active());
    assert_eq!(driver.mode(), ShtMode::SingleShot);
}

#[test]
fn test_bme280_recovery_bus_reset_then_soft_reset() {
    let (mut driver, bus, _clock) = create_bme280_with(bme280::Config::default());
    bus.provide_bus_reset(Ok(()));

    // probe after the bus reset times out; the soft-reset step re-reads
    // calibration, re-applies config, and its probe succeeds
    bus.fail_next_read(timeout_err());

    driver.recover().unwrap();
    assert_eq!(bus.bus_reset_count(), 1);
    assert_eq!(driver.mode(), bme280::Mode::Forced);
    assert_eq!(driver.state(), DriverState::Ready);
}

#[test]
fn test_bme280_recovery_exhausts_the_ladder() {
    let (mut driver, bus, _clock) = create_bme280_with(bme280::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: true,
        recover_use_hard_reset: false,
        ..Default::default()
    });

    // the status poll inside the soft reset never answers
    bus.fail_next_read(timeout_err());

    let err = driver.recover().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::I2cTimeout);
    assert!(driver.health().consecutive_failures() > 0);
}

#[test]
fn test_bme280_hard_reset_step() {
    let (mut driver, bus, _clock) = create_bme280_with(bme280::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: false,
        recover_use_hard_reset: true,
        ..Default::default()
    });
    bus.provide_hard_reset(Ok(()));

    driver.recover().unwrap();
    assert_eq!(bus.hard_reset_count(), 1);
    assert_eq!(driver.mode(), bme280::Mode::Forced);
    assert_eq!(driver.state(), DriverState::Ready);
}

#[test]
fn test_bme280_general_call_reset_step() {
    let (mut driver, bus, _clock) = create_bme280_with(bme280::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: false,
        recover_use_hard_reset: false,
        allow_general_call_reset: true,
        ..Default::default()
    });

    driver.recover().unwrap();
    assert_eq!(driver.mode(), bme280::Mode::Forced);

    // the reset byte went to the general-call address
    let addresses = bus.write_addresses();
    let writes = bus.writes();
    let general = addresses
        .iter()
        .zip(&writes)
        .find(|(addr, _)| **addr == 0x00)
        .expect("no general-call write");
    assert_eq!(general.1, &vec![0x06]);
}

#[test]
fn test_bme280_hard_reset_wait_timeout_still_reaches_general_call() {
    let (mut driver, bus, clock) = create_bme280_with(bme280::Config {
        recover_use_bus_reset: false,
        recover_use_soft_reset: false,
        recover_use_hard_reset: true,
        allow_general_call_reset: true,
        ..Default::default()
    });
    bus.provide_hard_reset(Ok(()));

    // freeze time: the settle wait after the hard reset times out, and the
    // ladder must still give the general-call step its turn
    clock.set_auto_advance_us(0);
    let err = driver.recover().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    assert_eq!(bus.hard_reset_count(), 1);
    assert!(
        bus.write_addresses().contains(&0x00),
        "general-call step was skipped after the hard-reset wait failed"
    );
}

#[test]
fn test_bme280_recovery_backoff() {
    let (mut driver, bus, clock) = create_bme280_with(bme280::Config {
        recover_backoff_ms: 500,
        ..Default::default()
    });
    bus.provide_bus_reset(Ok(()));

    driver.recover().unwrap();
    assert_eq!(driver.recover().unwrap_err().kind(), ErrorKind::Busy);

    clock.advance_ms(501);
    driver.recover().unwrap();
}
