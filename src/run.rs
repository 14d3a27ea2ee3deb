use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::acquisition::{Acquisition, AcquisitionController};
use crate::config::DeviceDescriptor;
use crate::devices::DeviceClient;
use crate::output::{output_filename, write_snapshot};

/// What a run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub saved: Vec<PathBuf>,
    /// Serials that gave up or whose snapshot could not be written.
    pub skipped: Vec<u64>,
}

/// Poll every device in order and write each snapshot into `output_dir`.
///
/// One device failing never stops the rest.
pub fn run<C, S>(
    controller: &mut AcquisitionController<C, S>,
    devices: &[DeviceDescriptor],
    output_dir: &Path,
) -> RunSummary
where
    C: DeviceClient,
    S: FnMut(Duration),
{
    let mut summary = RunSummary::default();

    for device in devices {
        let serial = device.serial;
        info!("Querying Device {} (Serial: {})", device.display_name(), serial);

        let snapshot = match controller.acquire(serial) {
            Acquisition::Success(snapshot) => snapshot,
            Acquisition::Exhausted { attempts } => {
                warn!(
                    "Failed to query device {} after {} tries. Giving up!",
                    serial, attempts
                );
                summary.skipped.push(serial);
                continue;
            }
        };

        let path = output_dir.join(output_filename(serial, &Local::now()));
        match write_snapshot(&path, &snapshot) {
            Ok(()) => {
                info!(
                    "Data saved to {} ({} channels: {})",
                    path.display(),
                    snapshot.len(),
                    snapshot.channels().collect::<Vec<_>>().join(", ")
                );
                summary.saved.push(path);
            }
            Err(e) => {
                error!("Failed to save data for device {}: {}", serial, e);
                summary.skipped.push(serial);
            }
        }
    }

    summary
}
