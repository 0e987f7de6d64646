//! **A**synchronous readout for **P**ower-**M**ate **PM10AHDS** power meters
//!
//! The meter sits on an RS232 line (9600 baud, 8N1) and answers two requests: a status query that
//! returns runtime, energy, power, voltage, current, power factor and apparent power, and an erase
//! that resets its accumulators. Frames are short delimited ASCII lines with a 16-bit checksum.
//!
//! ```no_run
//! use pm10ahds::{ config, Session };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut meter = Session::with(config::open_port("/dev/ttyUSB0")?);
//! let reading = meter.request_status(1).await?;
//!
//! println!("{} at {}, {:.3} kWh so far", reading.power, reading.voltage, reading.energy_kwh());
//! # Ok(())
//! # }
//! ```
//!
//! The modules map onto the layers of an exchange:
//!   - [`frame`] turns commands into bytes and bytes into frames, with no I/O
//!   - [`checksum`] holds the checksum algorithm behind a swappable trait
//!   - [`reading`] turns a status payload into typed, exactly scaled quantities from [`units`]
//!   - [`session`] owns the port and runs one request at a time

pub mod checksum;
pub mod config;
pub mod error;
pub mod frame;
pub mod reading;
pub mod session;
pub mod units;

pub use checksum::{ Checksum, Sum16 };
pub use config::SessionConfig;
pub use error::{ FrameError, SessionError };
pub use frame::{ Command, CommandCode, Frame, Marker };
pub use reading::{ EraseAck, PowerFactorPhase, StatusReading };
pub use session::Session;
