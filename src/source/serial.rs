use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{info, warn};
use serde_json::Value;

use super::SampleSource;
use crate::config::SerialConfig;
use crate::error::{SourceError, ValidationError};
use crate::types::{axis_token, RawSample};
use crate::utils::now_millis;

/// Reads `x,y,z` lines from a microcontroller.
pub struct SerialSource {
    config: SerialConfig,
}

impl SerialSource {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl SampleSource for SerialSource {
    fn name(&self) -> &str {
        "serial"
    }

    fn run(&mut self, sink: &Sender<RawSample>, shutdown: &AtomicBool) -> Result<(), SourceError> {
        let reader = open_port(&self.config)?;
        let mut disconnected = false;

        read_lines(reader, shutdown, |line| match parse_axis_line(line, now_millis()) {
            Ok(raw) => {
                if sink.send(raw).is_err() {
                    info!("Sample channel disconnected, serial source exiting");
                    disconnected = true;
                    return false;
                }
                true
            }
            Err(e) => {
                warn!("Invalid serial line {:?}: {}", line, e);
                true
            }
        })?;

        if !disconnected {
            info!("Serial port {} closed", self.config.port);
        }
        Ok(())
    }
}

/// Open the configured port wrapped in a line reader.
pub fn open_port(config: &SerialConfig) -> Result<BufReader<Box<dyn serialport::SerialPort>>, SourceError> {
    let port = serialport::new(config.port.as_str(), config.baud_rate)
        .timeout(Duration::from_millis(config.timeout_ms))
        .open()?;
    info!("Opened serial port {} at {} baud", config.port, config.baud_rate);
    Ok(BufReader::new(port))
}

/// Feed each non-empty, trimmed line to `on_line` until it returns `false`,
/// the reader reaches EOF, or `shutdown` is set.
///
/// Read timeouts are expected on an idle port and only re-check `shutdown`.
/// A partial line read before a timeout is kept and completed later.
pub fn read_lines<R, F>(mut reader: R, shutdown: &AtomicBool, mut on_line: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&str) -> bool,
{
    let mut line = String::new();
    while !shutdown.load(Ordering::Relaxed) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !on_line(trimmed) {
                    break;
                }
                line.clear();
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => continue,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Discarding undecodable serial data: {}", e);
                line.clear();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Split one `x,y,z` line. Tokens that are not numbers are kept as text so
/// the buffer reports them; a wrong field count is rejected here.
pub fn parse_axis_line(line: &str, arrival_ms: i64) -> Result<RawSample, ValidationError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(ValidationError::FieldCount {
            expected: 3,
            actual: fields.len(),
        });
    }

    let token = |field: &str| match field.parse::<f64>() {
        Ok(value) => axis_token(value),
        Err(_) => Value::String(field.to_string()),
    };

    Ok(RawSample {
        x: Some(token(fields[0])),
        y: Some(token(fields[1])),
        z: Some(token(fields[2])),
        timestamp: Some(Value::from(arrival_ms)),
    })
}
