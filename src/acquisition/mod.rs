pub mod data;

use std::time::Duration;
use tracing::{error, info, warn};

use crate::devices::{DeviceClient, DeviceError};
use data::Snapshot;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Attempt budget and backoff for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Terminal result of `acquire`.
#[derive(Debug)]
pub enum Acquisition {
    Success(Snapshot),
    Exhausted { attempts: u32 },
}

/// Outcome of a single connect/read/disconnect cycle
#[derive(Debug)]
enum AttemptOutcome {
    Success(Snapshot),
    EmptyResult,
    ConnectionError(DeviceError),
}

/// Drives one device through connect, read and disconnect with bounded
/// retries. Backoff goes through `sleep`, which blocks the caller.
pub struct AcquisitionController<C, S = fn(Duration)> {
    client: C,
    policy: AcquisitionPolicy,
    sleep: S,
}

impl<C: DeviceClient> AcquisitionController<C> {
    pub fn new(client: C, policy: AcquisitionPolicy) -> Self {
        Self::with_sleep(client, policy, std::thread::sleep)
    }
}

impl<C, S> AcquisitionController<C, S>
where
    C: DeviceClient,
    S: FnMut(Duration),
{
    pub fn with_sleep(client: C, policy: AcquisitionPolicy, sleep: S) -> Self {
        AcquisitionController {
            client,
            policy,
            sleep,
        }
    }

    pub fn policy(&self) -> AcquisitionPolicy {
        self.policy
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Poll `serial` until it yields a non-empty snapshot or the attempt
    /// budget runs out. Returns on the first success.
    pub fn acquire(&mut self, serial: u64) -> Acquisition {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            match self.attempt(serial) {
                AttemptOutcome::Success(snapshot) => {
                    info!("Successfully queried device {} on attempt {}.", serial, attempt);
                    return Acquisition::Success(snapshot);
                }
                AttemptOutcome::EmptyResult => {
                    warn!(
                        "Device {} returned no data on attempt {}/{}.",
                        serial, attempt, max_attempts
                    );
                }
                AttemptOutcome::ConnectionError(e) => {
                    error!(
                        "Error querying device {} on attempt {}/{}: {}",
                        serial, attempt, max_attempts, e
                    );
                }
            }

            // No pause after the final attempt
            if attempt < max_attempts {
                info!(
                    "Trying device {} again in {} seconds.",
                    serial,
                    self.policy.retry_delay.as_secs_f64()
                );
                (self.sleep)(self.policy.retry_delay);
            }
        }

        Acquisition::Exhausted {
            attempts: max_attempts,
        }
    }

    fn attempt(&mut self, serial: u64) -> AttemptOutcome {
        let mut link: Option<C::Handle> = None;
        let handle = link.insert(self.client.open(serial));

        let outcome = match self.client.connect(handle) {
            Ok(()) => match self.client.read(handle) {
                Ok(snapshot) if snapshot.is_empty() => AttemptOutcome::EmptyResult,
                Ok(snapshot) => AttemptOutcome::Success(snapshot),
                Err(e) => AttemptOutcome::ConnectionError(e),
            },
            Err(e) => AttemptOutcome::ConnectionError(e),
        };

        // Cleanup runs whether connect or read failed
        if let Some(handle) = link.take() {
            if let Err(e) = self.client.disconnect(handle) {
                warn!("Ignoring failure to disconnect device {}: {}", serial, e);
            }
        }

        outcome
    }
}
