//! In-memory `DeviceClient` that replays a per-serial script of attempts.

use std::collections::{HashMap, VecDeque};
use std::io;

use super::{DeviceClient, DeviceError, Result};
use crate::acquisition::data::Snapshot;

/// What one connect/read cycle does.
#[derive(Debug, Clone)]
pub enum Step {
    Reading(Snapshot),
    Empty,
    ConnectFails,
    ReadFails,
}

pub struct ScriptedHandle {
    pub id: u32,
    step: Step,
}

#[derive(Default)]
pub struct ScriptedClient {
    scripts: HashMap<u64, VecDeque<Step>>,
    pub fail_disconnect: bool,
    pub connects: u32,
    pub reads: u32,
    pub disconnects: u32,
    pub closed_handles: Vec<u32>,
    next_handle: u32,
}

pub fn reading(co2: f64) -> Snapshot {
    [("humidity", Some(41.5)), ("co2", Some(co2)), ("radon_long_term_avg", None)]
        .into_iter()
        .collect()
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, serial: u64, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts.entry(serial).or_default().extend(steps);
        self
    }

    /// Unscripted serials behave like an unreachable device.
    fn next_step(&mut self, serial: u64) -> Step {
        self.scripts
            .get_mut(&serial)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::ConnectFails)
    }
}

impl DeviceClient for ScriptedClient {
    type Handle = ScriptedHandle;

    fn open(&mut self, serial: u64) -> ScriptedHandle {
        self.next_handle += 1;
        ScriptedHandle {
            id: self.next_handle,
            step: self.next_step(serial),
        }
    }

    fn connect(&mut self, handle: &mut ScriptedHandle) -> Result<()> {
        self.connects += 1;
        match handle.step {
            Step::ConnectFails => Err(DeviceError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "device out of range",
            ))),
            _ => Ok(()),
        }
    }

    fn read(&mut self, handle: &mut ScriptedHandle) -> Result<Snapshot> {
        self.reads += 1;
        match &handle.step {
            Step::Reading(snapshot) => Ok(snapshot.clone()),
            Step::ReadFails => Err(DeviceError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "read timed out",
            ))),
            Step::Empty | Step::ConnectFails => Ok(Snapshot::new()),
        }
    }

    fn disconnect(&mut self, handle: ScriptedHandle) -> Result<()> {
        self.disconnects += 1;
        self.closed_handles.push(handle.id);
        if self.fail_disconnect {
            return Err(DeviceError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link already dropped",
            )));
        }
        Ok(())
    }
}
