pub mod wave_plus;

#[cfg(test)]
pub mod scripted;

use thiserror::Error;

use crate::acquisition::data::Snapshot;

pub use wave_plus::WavePlusGateway;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Gateway refused device {serial}: {reply}")]
    Refused { serial: u64, reply: String },

    #[error("Unsupported sensor version {0}")]
    UnsupportedVersion(u8),

    #[error("Device not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// A connection-oriented source of sensor snapshots.
///
/// `open` builds a fresh, unconnected handle without touching the device,
/// so a handle exists for cleanup even when `connect` fails. `disconnect`
/// consumes it, so a handle cannot be carried into the next attempt.
pub trait DeviceClient {
    type Handle;

    fn open(&mut self, serial: u64) -> Self::Handle;

    fn connect(&mut self, handle: &mut Self::Handle) -> Result<()>;

    /// Blocking read. An empty snapshot means the device answered with
    /// nothing usable.
    fn read(&mut self, handle: &mut Self::Handle) -> Result<Snapshot>;

    /// Release whatever `connect` set up, including a half-finished
    /// handshake. Must accept a handle that never connected.
    fn disconnect(&mut self, handle: Self::Handle) -> Result<()>;
}
