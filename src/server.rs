//! TCP command receiver
//!
//! # Wire Format
//!
//! Both directions use length-prefixed JSON:
//!
//! ```text
//! ┌──────────────────┬─────────────────────┐
//! │ Length (4 bytes) │ JSON body           │
//! │ Big-endian u32   │ (variable size)     │
//! └──────────────────┴─────────────────────┘
//! ```
//!
//! Requests are tagged objects, e.g. `{"type": "move_forward", "speed": 120}`.
//! Every request gets exactly one reply: `{"success": bool, "status": {...}}`,
//! plus `"error"` when the request could not be decoded.
//!
//! # Connection Lifecycle
//!
//! Each client runs on its own thread. A 500 ms read timeout lets the thread
//! notice daemon shutdown; bodies over 64 KiB close the connection. The timeout
//! is only idle time between frames: once the first length byte has arrived, a
//! stall before the frame completes closes the connection instead of leaving
//! the stream mid-frame.

use crate::error::{Error, Result};
use crate::protocol::constants::SERVO_COUNT;
use crate::robot::{Robot, RobotStatus};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest accepted request body
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Commands accepted over the wire
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotCommand {
    MoveForward {
        #[serde(default)]
        speed: Option<i32>,
    },
    MoveBackward {
        #[serde(default)]
        speed: Option<i32>,
    },
    TankTurnLeft {
        #[serde(default)]
        speed: Option<i32>,
    },
    TankTurnRight {
        #[serde(default)]
        speed: Option<i32>,
    },
    Stop,
    UpdateSpeed {
        speed: i32,
    },
    EnableHeadingHold {
        enabled: bool,
    },
    SetPanTilt {
        pan: i32,
        tilt: i32,
    },
    CenterCamera,
    SetServoAngle {
        id: usize,
        angle: i32,
    },
    SetServoAngles {
        angles: [i32; SERVO_COUNT],
    },
    HomeArm,
    SetRgbColor {
        r: i32,
        g: i32,
        b: i32,
    },
    RgbOff,
    GetStatus,
}

/// Reply to every request
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub success: bool,
    pub status: RobotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one command against the robot
pub fn execute(robot: &Robot, cmd: &RobotCommand) -> bool {
    match *cmd {
        RobotCommand::MoveForward { speed } => robot.move_forward(speed),
        RobotCommand::MoveBackward { speed } => robot.move_backward(speed),
        RobotCommand::TankTurnLeft { speed } => robot.tank_turn_left(speed),
        RobotCommand::TankTurnRight { speed } => robot.tank_turn_right(speed),
        RobotCommand::Stop => robot.stop(),
        RobotCommand::UpdateSpeed { speed } => robot.update_speed(speed),
        RobotCommand::EnableHeadingHold { enabled } => {
            robot.enable_heading_hold(enabled);
            true
        }
        RobotCommand::SetPanTilt { pan, tilt } => robot.set_pan_tilt(pan, tilt),
        RobotCommand::CenterCamera => robot.center_camera(),
        RobotCommand::SetServoAngle { id, angle } => robot.set_servo_angle(id, angle),
        RobotCommand::SetServoAngles { angles } => robot.set_servo_angles(angles),
        RobotCommand::HomeArm => robot.home_arm(),
        RobotCommand::SetRgbColor { r, g, b } => robot.set_rgb_color(r, g, b),
        RobotCommand::RgbOff => robot.rgb_off(),
        RobotCommand::GetStatus => true,
    }
}

/// Read one length-prefixed frame; `Ok(None)` if the timeout hits before any byte
pub fn read_frame<R: Read>(stream: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    loop {
        match stream.read(&mut len_buf[..1]) {
            Ok(0) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Ok(None)
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
    stream.read_exact(&mut len_buf[1..])?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::InvalidParameter(format!(
            "Frame too large: {} bytes",
            len
        )));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(Some(body))
}

pub fn write_frame<W: Write>(stream: &mut W, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| Error::InvalidParameter("Frame too large".to_string()))?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

/// Decode a request body, run it, and build the reply
pub fn handle_request(robot: &Robot, body: &[u8]) -> Reply {
    match serde_json::from_slice::<RobotCommand>(body) {
        Ok(cmd) => {
            log::debug!("Command: {:?}", cmd);
            let success = execute(robot, &cmd);
            Reply {
                success,
                status: robot.get_status(),
                error: None,
            }
        }
        Err(e) => {
            log::warn!("Rejected request: {}", e);
            Reply {
                success: false,
                status: robot.get_status(),
                error: Some(e.to_string()),
            }
        }
    }
}

/// Listener thread plus per-client threads
pub struct CommandServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CommandServer {
    pub fn start(robot: Arc<Robot>, bind_address: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)
            .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", bind_address, e)))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let worker = thread::Builder::new()
            .name("tcp-listener".to_string())
            .spawn(move || accept_loop(listener, robot, flag))
            .map_err(|e| Error::Other(format!("Failed to spawn listener thread: {}", e)))?;

        log::info!("Command server listening on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            worker: Some(worker),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            self.running.store(false, Ordering::Relaxed);
            worker.join().map_err(|_| Error::ThreadPanic)?;
            log::info!("Command server stopped");
        }
        Ok(())
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, robot: Arc<Robot>, running: Arc<AtomicBool>) {
    let mut clients: Vec<JoinHandle<()>> = Vec::new();

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    log::error!("Failed to set socket to blocking mode: {}", e);
                    continue;
                }
                log::info!("Client connected: {}", addr);

                let robot = Arc::clone(&robot);
                let running = Arc::clone(&running);
                match thread::Builder::new()
                    .name("tcp-client".to_string())
                    .spawn(move || {
                        if let Err(e) = client_loop(stream, &robot, &running) {
                            log::warn!("Client {} error: {}", addr, e);
                        }
                        log::info!("Client disconnected: {}", addr);
                    }) {
                    Ok(handle) => clients.push(handle),
                    Err(e) => log::error!("Failed to spawn client thread: {}", e),
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => log::error!("Accept error: {}", e),
        }
        clients.retain(|c| !c.is_finished());
    }

    for client in clients {
        let _ = client.join();
    }
}

fn client_loop(mut stream: TcpStream, robot: &Robot, running: &AtomicBool) -> Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    while running.load(Ordering::Relaxed) {
        let body = match read_frame(&mut stream) {
            Ok(Some(body)) => body,
            Ok(None) => continue,
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
                return Err(e);
            }
        };

        let reply = handle_request(robot, &body);
        let encoded = serde_json::to_vec(&reply)?;
        write_frame(&mut stream, &encoded)?;
    }
    Ok(())
}
