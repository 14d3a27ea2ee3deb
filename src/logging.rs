use chrono::{Local, NaiveDate};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{Dispatch, Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::output::FILE_PREFIX;

/// `<timestamp> [<LEVEL>] <message>`
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} [{:<5}] ",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Appends to `<dir>/<prefix>-<YYYY-MM-DD>.log`, moving to a new file when
/// the local date changes.
pub struct DailyFile {
    dir: PathBuf,
    prefix: String,
    date: NaiveDate,
    file: File,
}

impl DailyFile {
    pub fn open(dir: &Path, prefix: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let date = Local::now().date_naive();
        let file = Self::open_for(dir, prefix, date)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            date,
            file,
        })
    }

    pub fn path_for(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
        dir.join(format!("{}-{}.log", prefix, date.format("%Y-%m-%d")))
    }

    fn open_for(dir: &Path, prefix: &str, date: NaiveDate) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::path_for(dir, prefix, date))
    }
}

impl Write for DailyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let today = Local::now().date_naive();
        if today != self.date {
            self.file = Self::open_for(&self.dir, &self.prefix, today)?;
            self.date = today;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Build the process log pipeline: stderr always, plus the daily file when
/// enabled. The returned guard must live until exit so the file sink drains.
pub fn init(config: &LoggingConfig) -> io::Result<(Dispatch, Option<WorkerGuard>)> {
    let console = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(io::stderr)
        .event_format(LineFormat);

    let (file_layer, guard) = match config.file_dir() {
        Some(dir) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(DailyFile::open(dir, FILE_PREFIX)?);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .event_format(LineFormat);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(console)
        .with(file_layer);

    Ok((Dispatch::new(subscriber), guard))
}

/// Console-only pipeline for reporting failures that happen before the
/// configured one exists.
pub fn console() -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(io::stderr)
        .event_format(LineFormat)
        .finish();
    Dispatch::new(subscriber)
}
