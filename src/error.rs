use thiserror::Error;

/// A raw sample that cannot become a [`crate::types::Sample`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing value for axis {0}")]
    MissingAxis(char),
    #[error("axis {axis} is not numeric: {value}")]
    NonNumericAxis { axis: char, value: String },
    #[error("axis {axis} is not finite: {value}")]
    NonFiniteAxis { axis: char, value: f64 },
    #[error("missing capture timestamp")]
    MissingTimestamp,
    #[error("timestamp is not numeric: {0}")]
    NonNumericTimestamp(String),
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(String),
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),
    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid source settings: {0}")]
    Settings(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("no data to export")]
    NoData,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("need at least {needed} points, got {actual}")]
    TooFewPoints { needed: usize, actual: usize },
    #[error("all x values are identical, slope is undefined")]
    ZeroVariance,
    #[error("quantile bounds must satisfy 0 <= lower < upper <= 1 (got {lower}, {upper})")]
    InvalidQuantiles { lower: f64, upper: f64 },
}
