use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::SerialConfig;
use crate::error::ExportError;
use crate::source::serial::{open_port, parse_axis_line, read_lines};
use crate::types::ClimateReading;
use crate::utils::{compact_timestamp, now_millis};

/// What the board on the other end of the port prints per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `x,y,z`
    Motion,
    /// `temperature,humidity`
    Climate,
}

impl RecordKind {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Motion => &["Timestamp", "X", "Y", "Z"],
            RecordKind::Climate => &["Temperature (°C)", "Humidity (%)"],
        }
    }

    pub fn default_file_name(&self) -> &'static str {
        match self {
            RecordKind::Motion => "accelerometer_data.csv",
            RecordKind::Climate => "dht22_data.csv",
        }
    }

    /// Turn one serial line into a CSV row, or say why it was skipped.
    fn row(&self, line: &str, stamp: &mut dyn FnMut() -> String) -> Result<Vec<String>, String> {
        match self {
            RecordKind::Motion => {
                let sample = parse_axis_line(line, now_millis())
                    .and_then(|raw| raw.validate())
                    .map_err(|e| e.to_string())?;
                Ok(vec![
                    stamp(),
                    sample.x().to_string(),
                    sample.y().to_string(),
                    sample.z().to_string(),
                ])
            }
            RecordKind::Climate => {
                let reading = ClimateReading::parse_line(line).map_err(|e| e.to_string())?;
                Ok(vec![reading.temperature.to_string(), reading.humidity.to_string()])
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub rows_written: usize,
    pub lines_skipped: usize,
}

/// Copy lines from `reader` into `writer` until EOF, `shutdown`, or
/// `deadline`. Invalid lines are logged and skipped.
pub fn record_lines<R, W>(
    reader: R,
    writer: &mut csv::Writer<W>,
    kind: RecordKind,
    shutdown: &AtomicBool,
    deadline: Option<Instant>,
    mut stamp: impl FnMut() -> String,
) -> Result<RecordSummary, ExportError>
where
    R: BufRead,
    W: Write,
{
    writer.write_record(kind.header())?;

    let mut summary = RecordSummary::default();
    let mut write_error = None;

    read_lines(reader, shutdown, |line| {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        match kind.row(line, &mut stamp) {
            Ok(row) => {
                if let Err(e) = writer.write_record(&row) {
                    write_error = Some(e);
                    return false;
                }
                summary.rows_written += 1;
                log::debug!("Saved: {}", row.join(","));
            }
            Err(reason) => {
                warn!("Invalid data received: {:?} ({})", line, reason);
                summary.lines_skipped += 1;
            }
        }
        true
    })?;

    if let Some(e) = write_error {
        return Err(e.into());
    }
    writer.flush()?;
    Ok(summary)
}

/// Record the configured serial port into `output`, for `duration` or until
/// `shutdown` is set.
pub fn record_serial(
    config: &SerialConfig,
    kind: RecordKind,
    output: &Path,
    duration: Option<Duration>,
    shutdown: Arc<AtomicBool>,
) -> Result<(PathBuf, RecordSummary), Box<dyn std::error::Error>> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let reader = open_port(config)?;
    let mut writer = csv::Writer::from_path(output)?;

    // 空闲端口上回调不会被调用，到时由计时线程置位 shutdown
    let deadline = duration.map(|d| Instant::now() + d);
    if let Some(duration) = duration {
        let timer_shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("record-timer".to_string())
            .spawn(move || {
                thread::sleep(duration);
                timer_shutdown.store(true, Ordering::Relaxed);
            })?;
    }

    info!("Logging data to {}...", output.display());
    let summary = record_lines(reader, &mut writer, kind, &shutdown, deadline, compact_timestamp)?;
    info!(
        "Data logging stopped: {} rows written, {} lines skipped",
        summary.rows_written, summary.lines_skipped
    );

    Ok((output.to_path_buf(), summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(input: &str, kind: RecordKind) -> (String, RecordSummary) {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let shutdown = AtomicBool::new(false);
        let summary = record_lines(
            Cursor::new(input.to_string()),
            &mut writer,
            kind,
            &shutdown,
            None,
            || "20240102030405".to_string(),
        )
        .unwrap();
        let bytes = writer.into_inner().unwrap();
        (String::from_utf8(bytes).unwrap(), summary)
    }

    #[test]
    fn motion_lines_get_timestamp_column() {
        let (csv, summary) = record("X,Y,Z\n0.5,-1,2\n1,2\n3,4,5\n", RecordKind::Motion);
        assert_eq!(
            csv,
            "Timestamp,X,Y,Z\n20240102030405,0.5,-1,2\n20240102030405,3,4,5\n"
        );
        assert_eq!(summary, RecordSummary { rows_written: 2, lines_skipped: 2 });
    }

    #[test]
    fn climate_lines_skip_invalid() {
        let (csv, summary) = record("23.5,40.1\nerror\n24,41\n", RecordKind::Climate);
        assert_eq!(csv, "Temperature (°C),Humidity (%)\n23.5,40.1\n24,41\n");
        assert_eq!(summary.lines_skipped, 1);
    }

    #[test]
    fn elapsed_deadline_writes_header_only() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let shutdown = AtomicBool::new(false);
        let summary = record_lines(
            Cursor::new("1,2,3\n"),
            &mut writer,
            RecordKind::Motion,
            &shutdown,
            Some(Instant::now()),
            compact_timestamp,
        )
        .unwrap();
        assert_eq!(summary.rows_written, 0);
        assert_eq!(String::from_utf8(writer.into_inner().unwrap()).unwrap(), "Timestamp,X,Y,Z\n");
    }
}
