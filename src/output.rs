use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::acquisition::data::Snapshot;

/// Prefix shared by data files and log files.
pub const FILE_PREFIX: &str = "WavePlusPlus";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot for {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// `WavePlusPlus-<serial>-<YYYY-MM-DD-HH-MM-SS>.json`
///
/// Two snapshots for the same serial within one second share a name and
/// the later write replaces the earlier one.
pub fn output_filename(serial: u64, at: &DateTime<Local>) -> String {
    format!(
        "{}-{}-{}.json",
        FILE_PREFIX,
        serial,
        at.format("%Y-%m-%d-%H-%M-%S")
    )
}

/// Write `snapshot` to `path` as an indented JSON document, replacing any
/// existing file.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    let mut serializer =
        serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
    snapshot
        .serialize(&mut serializer)
        .map_err(|source| OutputError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}
