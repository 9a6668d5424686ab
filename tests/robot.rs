//! Robot Integration Tests
//!
//! Drives the full `Robot` (arbiter, watchdog, kickstart timer) against the
//! mock bus. Sensor blocks are scripted on the mock and every test waits for
//! the cache to pick them up before issuing commands.
//!
//! Run with: `cargo test --test robot`

use rath_io::protocol::{MegaRaw, UnoRaw};
use rath_io::robot::Robot;
use rath_io::transport::TransactionKind;
use rath_io::{Config, MockBus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.bus.write_cooldown_ms = 1;
    config.bus.inter_device_delay_ms = 1;
    config.bus.loop_hz = 500;
    config.uno.read_period_ms = 20;
    config.mega.read_period_ms = 20;
    config.motion.watchdog_period_ms = 20;
    config.kickstart.duration_ms = 60;
    config
}

fn start(config: Config) -> (MockBus, Robot) {
    let bus = MockBus::new();
    let robot = Robot::new(config, Box::new(bus.clone()), None).unwrap();
    (bus, robot)
}

/// Script both boards' sensor blocks and wait until the cache reflects them
fn set_distances(bus: &MockBus, robot: &Robot, center_front: u16, sides: u16) {
    let config = robot.config();
    let uno = UnoRaw {
        center_front,
        right_rear: sides,
        pan: 90,
        tilt: 90,
        temperature_x10: 215,
        humidity_x10: 400,
    };
    let mega = MegaRaw {
        left_front: sides,
        right_front: sides,
        left_rear: sides,
    };
    bus.set_block(config.uno.address, config.uno.read_register, &uno.to_bytes());
    bus.set_block(config.mega.address, config.mega.read_register, &mega.to_bytes());

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let cache = robot.sensors();
        if cache.uno.center_front == Some(center_front) && cache.mega.left_front == Some(sides) {
            return;
        }
        assert!(Instant::now() < deadline, "sensor cache never updated");
        thread::sleep(Duration::from_millis(5));
    }
}

/// (speed, direction) of every successful drive frame
fn drive_frames(bus: &MockBus, robot: &Robot) -> Vec<(u16, u16)> {
    bus.writes_to(robot.config().uno.address)
        .iter()
        .filter(|f| f.len() == 9)
        .map(|f| {
            (
                u16::from_le_bytes([f[0], f[1]]),
                u16::from_le_bytes([f[2], f[3]]),
            )
        })
        .collect()
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn test_obstacle_refusal_then_clear_path() {
    let mut config = fast_config();
    config.safety.autostop_enabled = false;
    let (bus, robot) = start(config);

    set_distances(&bus, &robot, 10, 200);
    bus.clear_transactions();
    assert!(!robot.move_forward(Some(100)));
    assert!(drive_frames(&bus, &robot).is_empty());
    assert!(robot.get_status().obstacles.front);

    set_distances(&bus, &robot, 50, 200);
    bus.clear_transactions();
    assert!(robot.move_forward(Some(100)));
    assert_eq!(drive_frames(&bus, &robot), vec![(100, 1)]);

    let status = robot.get_status();
    assert!(status.is_moving);
    assert_eq!(status.distances.center_front, 50);
    assert!(!status.obstacles.front);
    let age = status.sensors.oldest_age_us.unwrap();
    assert!(age < 2_000_000, "cache age {} us", age);
}

#[test]
fn test_error_reading_does_not_block() {
    let (bus, robot) = start(fast_config());

    // 0 is outside the valid range and sanitizes to the error sentinel
    set_distances(&bus, &robot, 120, 200);
    let config = robot.config();
    let uno = UnoRaw {
        center_front: 0,
        right_rear: 200,
        pan: 90,
        tilt: 90,
        temperature_x10: 215,
        humidity_x10: 400,
    };
    bus.set_block(config.uno.address, config.uno.read_register, &uno.to_bytes());
    assert!(wait_until(Duration::from_secs(2), || robot
        .sensors()
        .uno
        .center_front
        .is_none()));

    assert_eq!(robot.get_status().distances.center_front, 999);
    assert!(robot.move_forward(Some(100)));
}

#[test]
fn test_update_speed_while_stopped_is_silent() {
    let (bus, robot) = start(fast_config());

    bus.clear_transactions();
    assert!(robot.update_speed(80));
    assert!(drive_frames(&bus, &robot).is_empty());
    assert_eq!(robot.get_status().speed, 80);

    assert!(robot.move_forward(None));
    assert_eq!(drive_frames(&bus, &robot), vec![(80, 1)]);
}

#[test]
fn test_watchdog_stops_on_new_obstacle() {
    let (bus, robot) = start(fast_config());
    set_distances(&bus, &robot, 150, 150);

    assert!(robot.move_forward(Some(120)));
    assert!(robot.get_status().is_moving);

    set_distances(&bus, &robot, 12, 150);
    assert!(wait_until(Duration::from_millis(500), || !robot
        .get_status()
        .is_moving));
    assert_eq!(drive_frames(&bus, &robot).last(), Some(&(0, 0)));
}

#[test]
fn test_second_low_speed_move_retargets_single_restore() {
    let (bus, robot) = start(fast_config());

    bus.clear_transactions();
    assert!(robot.move_forward(Some(30)));
    assert!(robot.move_forward(Some(35)));
    assert!(robot.get_status().kickstart_pending);

    assert!(wait_until(Duration::from_millis(500), || !robot
        .get_status()
        .kickstart_pending));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(drive_frames(&bus, &robot), vec![(150, 1), (35, 1)]);
    assert_eq!(robot.get_status().current_speed, 35);
}

#[test]
fn test_concurrent_commands_never_overlap_on_the_bus() {
    let (bus, robot) = start(fast_config());
    bus.set_latency(Duration::from_millis(1));
    let robot = Arc::new(robot);

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let robot = Arc::clone(&robot);
            thread::spawn(move || {
                for n in 0..15 {
                    match (i + n) % 4 {
                        0 => {
                            robot.set_rgb_color(n * 10, 0, 255);
                        }
                        1 => {
                            robot.set_pan_tilt(60 + n, 90);
                        }
                        2 => {
                            robot.move_forward(Some(120));
                        }
                        _ => {
                            robot.stop();
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let transactions = bus.transactions();
    assert!(!bus.overlap_detected());
    assert!(transactions
        .iter()
        .any(|t| matches!(t.kind, TransactionKind::Read { .. })));
    for pair in transactions.windows(2) {
        assert!(pair[0].finished <= pair[1].started);
    }
}

#[test]
fn test_arm_and_rgb_frames_reach_the_mega() {
    let (bus, robot) = start(fast_config());
    let mega = robot.config().mega.address;

    bus.clear_transactions();
    assert!(robot.set_servo_angle(1, 5));
    assert!(robot.set_rgb_color(255, 300, -4));
    assert!(!robot.set_servo_angle(9, 90));

    let writes = bus.writes_to(mega);
    assert_eq!(writes[0], vec![0x31, 90, 15, 90, 90, 45]);
    assert_eq!(writes[1], vec![0x10, 255, 255, 0]);
    assert_eq!(writes.len(), 2);
    assert_eq!(robot.get_status().rgb, [255, 255, 0]);
}

#[test]
fn test_camera_move_queued_before_stop_does_not_restart_motors() {
    let (bus, robot) = start(fast_config());
    let robot = Arc::new(robot);
    let uno = robot.config().uno.address;

    assert!(robot.move_forward(Some(100)));
    bus.set_latency(Duration::from_millis(60));

    let r = Arc::clone(&robot);
    let blocker = thread::spawn(move || r.set_rgb_color(0, 0, 255));
    thread::sleep(Duration::from_millis(15));
    let r = Arc::clone(&robot);
    let camera = thread::spawn(move || r.set_pan_tilt(30, 60));
    thread::sleep(Duration::from_millis(15));

    assert!(robot.stop());
    blocker.join().unwrap();
    camera.join().unwrap();
    thread::sleep(Duration::from_millis(100));

    let last = bus.writes_to(uno).pop().unwrap();
    assert_eq!(&last[..4], &[0, 0, 0, 0]);
    let status = robot.get_status();
    assert!(!status.is_moving);
    assert_eq!((status.camera.pan, status.camera.tilt), (30, 60));
}

#[test]
fn test_update_speed_during_tank_turn_is_silent() {
    let (bus, robot) = start(fast_config());

    assert!(robot.tank_turn_right(Some(120)));
    assert!(robot.update_speed(90));
    assert_eq!(drive_frames(&bus, &robot), vec![(120, 4)]);
    assert_eq!(robot.get_status().speed, 90);

    assert!(robot.move_backward(None));
    assert_eq!(drive_frames(&bus, &robot), vec![(120, 4), (90, 2)]);
}
