use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Temperature/humidity pair reported by the DHT22 sketch as `temp,humid`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateReading {
    pub temperature: f64,
    pub humidity: f64,
}

impl ClimateReading {
    pub fn parse_line(line: &str) -> Result<Self, ValidationError> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 2 {
            return Err(ValidationError::FieldCount {
                expected: 2,
                actual: fields.len(),
            });
        }

        let parse = |axis: char, field: &str| {
            field
                .parse::<f64>()
                .map_err(|_| ValidationError::NonNumericAxis {
                    axis,
                    value: field.to_string(),
                })
        };

        Ok(Self {
            temperature: parse('t', fields[0])?,
            humidity: parse('h', fields[1])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_field_line() {
        let reading = ClimateReading::parse_line(" 23.4, 51.0\r\n").unwrap();
        assert_eq!(reading.temperature, 23.4);
        assert_eq!(reading.humidity, 51.0);
    }

    #[test]
    fn rejects_wrong_shape_and_text() {
        assert_eq!(
            ClimateReading::parse_line("1,2,3"),
            Err(ValidationError::FieldCount { expected: 2, actual: 3 })
        );
        assert!(ClimateReading::parse_line("Temperature,Humidity").is_err());
    }
}
