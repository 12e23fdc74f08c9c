//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait, the driver-backed implementation and the
//! mock used by tests, so the connection manager never depends on hardware.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortOpener, MockSerialPort};
pub use sync_port::*;
pub use traits::*;
