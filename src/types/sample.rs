use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::ValidationError;

/// One accepted motion reading. Only constructed through validation, so every
/// field is finite and the capture time is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    x: f64,
    y: f64,
    z: f64,
    captured_at: i64, // Unix 毫秒
}

impl Sample {
    pub fn new(x: f64, y: f64, z: f64, captured_at: i64) -> Result<Self, ValidationError> {
        Ok(Self {
            x: finite('x', x)?,
            y: finite('y', y)?,
            z: finite('z', z)?,
            captured_at,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn captured_at(&self) -> i64 {
        self.captured_at
    }
}

/// A reading as a source delivered it, before validation.
///
/// Axis values and the timestamp stay as JSON values so that a malformed
/// field survives decoding and is rejected by the buffer instead of the
/// transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default)]
    pub x: Option<Value>,
    #[serde(default)]
    pub y: Option<Value>,
    #[serde(default)]
    pub z: Option<Value>,
    #[serde(default, alias = "captured_at")]
    pub timestamp: Option<Value>,
}

/// 浮点时间戳小于该值时按秒处理（`time.time()` 风格）
const FLOAT_SECONDS_LIMIT: f64 = 1e11;

impl RawSample {
    pub fn from_values(x: f64, y: f64, z: f64, timestamp: i64) -> Self {
        Self {
            x: Some(axis_token(x)),
            y: Some(axis_token(y)),
            z: Some(axis_token(z)),
            timestamp: Some(Value::from(timestamp)),
        }
    }

    /// Pick the sample fields out of a received document. Never fails: a
    /// non-object document yields a sample with every field missing.
    pub fn from_document(document: &Value) -> Self {
        let field = |name: &str| document.get(name).filter(|value| !value.is_null()).cloned();
        Self {
            x: field("x"),
            y: field("y"),
            z: field("z"),
            timestamp: field("timestamp").or_else(|| field("captured_at")),
        }
    }

    /// Stamp the arrival time when the producer did not send one.
    pub fn stamped(mut self, arrival_ms: i64) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Value::from(arrival_ms));
        }
        self
    }

    pub fn validate(&self) -> Result<Sample, ValidationError> {
        let x = axis_value('x', self.x.as_ref())?;
        let y = axis_value('y', self.y.as_ref())?;
        let z = axis_value('z', self.z.as_ref())?;
        let captured_at = capture_time(self.timestamp.as_ref())?;
        Sample::new(x, y, z, captured_at)
    }
}

/// JSON has no NaN or infinity, so those readings are kept as text.
pub fn axis_token(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

fn axis_value(axis: char, value: Option<&Value>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingAxis(axis))?;
    let non_numeric = || ValidationError::NonNumericAxis {
        axis,
        value: value.to_string(),
    };
    let number = match value {
        Value::String(text) => match text.trim().parse::<f64>() {
            Ok(parsed) if !parsed.is_finite() => parsed,
            _ => return Err(non_numeric()),
        },
        other => other.as_f64().ok_or_else(non_numeric)?,
    };
    finite(axis, number)
}

/// Integers are Unix milliseconds. Floats below [`FLOAT_SECONDS_LIMIT`] are
/// Unix seconds, larger floats are milliseconds.
fn capture_time(value: Option<&Value>) -> Result<i64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingTimestamp)?;
    if let Some(ms) = value.as_i64() {
        return Ok(ms);
    }
    let number = value
        .as_f64()
        .ok_or_else(|| ValidationError::NonNumericTimestamp(value.to_string()))?;

    let ms = if number.abs() < FLOAT_SECONDS_LIMIT { number * 1000.0 } else { number };
    if ms.is_finite() && ms.abs() < i64::MAX as f64 {
        Ok(ms.round() as i64)
    } else {
        Err(ValidationError::TimestampOutOfRange(value.to_string()))
    }
}

fn finite(axis: char, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NonFiniteAxis { axis, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_and_validates_complete_payload() {
        let raw: RawSample =
            serde_json::from_value(json!({"x": 1.5, "y": -2, "z": 0.25, "timestamp": 1000})).unwrap();
        let sample = raw.validate().unwrap();
        assert_eq!((sample.x(), sample.y(), sample.z()), (1.5, -2.0, 0.25));
        assert_eq!(sample.captured_at(), 1000);
    }

    #[test]
    fn missing_axis_is_rejected_not_defaulted() {
        let raw: RawSample = serde_json::from_value(json!({"x": 1.0, "z": 3.0, "timestamp": 5})).unwrap();
        assert_eq!(raw.validate(), Err(ValidationError::MissingAxis('y')));

        let null_axis: RawSample =
            serde_json::from_value(json!({"x": null, "y": 1.0, "z": 3.0, "timestamp": 5})).unwrap();
        assert_eq!(null_axis.validate(), Err(ValidationError::MissingAxis('x')));
    }

    #[test]
    fn non_numeric_axis_is_rejected() {
        let raw: RawSample =
            serde_json::from_value(json!({"x": 1.0, "y": "abc", "z": 3.0, "timestamp": 5})).unwrap();
        assert!(matches!(
            raw.validate(),
            Err(ValidationError::NonNumericAxis { axis: 'y', .. })
        ));
    }

    #[test]
    fn missing_timestamp_is_rejected_until_stamped() {
        let raw: RawSample = serde_json::from_value(json!({"x": 1.0, "y": 2.0, "z": 3.0})).unwrap();
        assert_eq!(raw.validate(), Err(ValidationError::MissingTimestamp));

        let sample = raw.stamped(42).validate().unwrap();
        assert_eq!(sample.captured_at(), 42);
    }

    #[test]
    fn stamping_keeps_producer_timestamp() {
        let raw = RawSample::from_values(0.0, 0.0, 0.0, 7).stamped(99);
        assert_eq!(raw.timestamp, Some(json!(7)));
    }

    #[test]
    fn float_timestamp_is_read_as_seconds() {
        let raw: RawSample =
            serde_json::from_value(json!({"x": 1.0, "y": 2.0, "z": 3.0, "timestamp": 1718000000.25})).unwrap();
        assert_eq!(raw.validate().unwrap().captured_at(), 1_718_000_000_250);

        let millis: RawSample =
            serde_json::from_value(json!({"x": 1.0, "y": 2.0, "z": 3.0, "timestamp": 1718000000250.0})).unwrap();
        assert_eq!(millis.validate().unwrap().captured_at(), 1_718_000_000_250);
    }

    #[test]
    fn text_timestamp_is_rejected() {
        let raw: RawSample =
            serde_json::from_value(json!({"x": 1.0, "y": 2.0, "z": 3.0, "timestamp": "2024-06-10T12:00:00"})).unwrap();
        assert!(matches!(raw.validate(), Err(ValidationError::NonNumericTimestamp(_))));

        // 已有时间戳（即使无效）不会被到达时间覆盖
        assert!(raw.stamped(5).validate().is_err());
    }

    #[test]
    fn huge_timestamp_is_out_of_range() {
        let raw = RawSample {
            timestamp: Some(json!(1e300)),
            ..RawSample::from_values(0.0, 0.0, 0.0, 0)
        };
        assert!(matches!(raw.validate(), Err(ValidationError::TimestampOutOfRange(_))));
    }

    #[test]
    fn from_document_ignores_field_types() {
        let document = json!({"x": 1, "y": [2], "z": null, "captured_at": "soon", "unit": "dps"});
        let raw = RawSample::from_document(&document);
        assert_eq!(raw.x, Some(json!(1)));
        assert_eq!(raw.y, Some(json!([2])));
        assert_eq!(raw.z, None);
        assert_eq!(raw.timestamp, Some(json!("soon")));

        assert_eq!(RawSample::from_document(&json!([1, 2, 3])), RawSample::default());
    }

    #[test]
    fn non_finite_readings_are_reported_as_non_finite() {
        let raw = RawSample::from_values(f64::NAN, 0.0, 0.0, 1);
        assert_eq!(raw.x, Some(json!("NaN")));
        assert!(matches!(raw.validate(), Err(ValidationError::NonFiniteAxis { axis: 'x', .. })));

        let raw = RawSample::from_values(0.0, 0.0, f64::NEG_INFINITY, 1);
        assert!(matches!(
            raw.validate(),
            Err(ValidationError::NonFiniteAxis { axis: 'z', value }) if value == f64::NEG_INFINITY
        ));

        let text: RawSample = serde_json::from_value(json!({"x": "1.5", "y": 0, "z": 0, "timestamp": 1})).unwrap();
        assert!(matches!(text.validate(), Err(ValidationError::NonNumericAxis { axis: 'x', .. })));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        assert!(matches!(
            Sample::new(f64::NAN, 0.0, 0.0, 1),
            Err(ValidationError::NonFiniteAxis { axis: 'x', .. })
        ));
        assert!(Sample::new(0.0, 0.0, f64::INFINITY, 1).is_err());
    }
}
