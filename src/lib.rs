//! serialmon library
//!
//! Interactive serial monitor: owns one serial session, mirrors device
//! output to a terminal and a session log, and forwards typed lines back
//! to the device.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;
pub mod tui;

pub use core::{ConnectionController, ConnectionState, DualSink, LineBufferedInputRouter};
pub use domain::config::SerialMonConfig;
pub use domain::error::{SerialMonError, SerialMonResult};
