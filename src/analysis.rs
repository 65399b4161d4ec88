use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::AnalysisError;
use crate::types::ClimateReading;

pub const DEFAULT_LOWER_QUANTILE: f64 = 0.10;
pub const DEFAULT_UPPER_QUANTILE: f64 = 0.90;
pub const PREDICTION_POINTS: usize = 100;

/// `"Temperature (°C)"` -> `"Temperature"`
pub fn strip_unit(header: &str) -> &str {
    match header.find(" (") {
        Some(idx) => header[..idx].trim(),
        None => header.trim(),
    }
}

/// Read a recorder CSV. Rows whose temperature or humidity does not parse are
/// skipped with a warning.
pub fn load_climate_csv(path: &Path) -> Result<Vec<ClimateReading>, AnalysisError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|header| strip_unit(header) == name)
            .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))
    };
    let temperature_idx = column("Temperature")?;
    let humidity_idx = column("Humidity")?;

    let mut readings = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let parsed = (
            record.get(temperature_idx).and_then(|v| v.trim().parse::<f64>().ok()),
            record.get(humidity_idx).and_then(|v| v.trim().parse::<f64>().ok()),
        );
        match parsed {
            (Some(temperature), Some(humidity)) => readings.push(ClimateReading { temperature, humidity }),
            _ => warn!("Skipping row {} of {}: not numeric", row + 1, path.display()),
        }
    }

    info!("Loaded {} climate readings from {}", readings.len(), path.display());
    Ok(readings)
}

/// Quantile with linear interpolation between closest ranks. `sorted` must be
/// ascending.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn check_bounds(lower: f64, upper: f64) -> Result<(), AnalysisError> {
    if (0.0..=1.0).contains(&lower) && (0.0..=1.0).contains(&upper) && lower < upper {
        Ok(())
    } else {
        Err(AnalysisError::InvalidQuantiles { lower, upper })
    }
}

/// Keep readings whose temperature lies within the `[lower, upper]` quantile
/// band, inclusive.
pub fn filter_by_temperature(
    readings: &[ClimateReading],
    lower: f64,
    upper: f64,
) -> Result<Vec<ClimateReading>, AnalysisError> {
    check_bounds(lower, upper)?;

    let mut temperatures: Vec<f64> = readings.iter().map(|r| r.temperature).collect();
    temperatures.sort_by(f64::total_cmp);

    let (Some(low), Some(high)) = (quantile(&temperatures, lower), quantile(&temperatures, upper)) else {
        return Ok(Vec::new());
    };

    Ok(readings
        .iter()
        .filter(|r| r.temperature >= low && r.temperature <= high)
        .copied()
        .collect())
}

/// `humidity = slope * temperature + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Root mean square of the residuals.
    pub std_error: f64,
}

impl LinearModel {
    pub fn fit(readings: &[ClimateReading]) -> Result<Self, AnalysisError> {
        let points: Vec<[f64; 2]> = readings.iter().map(|r| [r.temperature, r.humidity]).collect();
        Self::fit_points(&points)
    }

    /// Ordinary least squares of `y` on `x` over `[x, y]` pairs.
    pub fn fit_points(points: &[[f64; 2]]) -> Result<Self, AnalysisError> {
        if points.len() < 2 {
            return Err(AnalysisError::TooFewPoints {
                needed: 2,
                actual: points.len(),
            });
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p[0]).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p[1]).sum::<f64>() / n;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for [x, y] in points {
            let dx = x - mean_x;
            let dy = y - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        if sxx == 0.0 {
            return Err(AnalysisError::ZeroVariance);
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let ss_res: f64 = points
            .iter()
            .map(|[x, y]| {
                let residual = y - (slope * x + intercept);
                residual * residual
            })
            .sum();
        // 湿度恒定时拟合是完美的
        let r_squared = if syy == 0.0 { 1.0 } else { 1.0 - ss_res / syy };

        Ok(Self {
            slope,
            intercept,
            r_squared,
            std_error: (ss_res / n).sqrt(),
        })
    }

    pub fn predict(&self, temperature: f64) -> f64 {
        self.slope * temperature + self.intercept
    }
}

/// Unfiltered vs quantile-filtered fit over the same readings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelComparison {
    pub original: LinearModel,
    pub filtered: LinearModel,
    pub kept: usize,
    pub removed: usize,
}

impl ModelComparison {
    pub fn slope_change(&self) -> f64 {
        self.filtered.slope - self.original.slope
    }

    pub fn r_squared_change(&self) -> f64 {
        self.filtered.r_squared - self.original.r_squared
    }
}

pub fn compare_models(
    readings: &[ClimateReading],
    lower: f64,
    upper: f64,
) -> Result<ModelComparison, AnalysisError> {
    let filtered = filter_by_temperature(readings, lower, upper)?;
    let comparison = ModelComparison {
        original: LinearModel::fit(readings)?,
        filtered: LinearModel::fit(&filtered)?,
        kept: filtered.len(),
        removed: readings.len() - filtered.len(),
    };

    info!(
        "Quantile filter {:.0}%-{:.0}% kept {} readings, removed {}",
        lower * 100.0,
        upper * 100.0,
        comparison.kept,
        comparison.removed
    );
    Ok(comparison)
}

/// `count` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            let mut values: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
            // 避免累积误差，末尾精确落在 end
            values[count - 1] = end;
            values
        }
    }
}

/// Predict humidity over the observed temperature range and write
/// `Test_Temperature,Predicted_Humidity`.
pub fn write_predictions(
    model: &LinearModel,
    readings: &[ClimateReading],
    path: &Path,
) -> Result<usize, AnalysisError> {
    let (min, max) = readings.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), r| {
        (min.min(r.temperature), max.max(r.temperature))
    });
    if readings.is_empty() {
        return Err(AnalysisError::TooFewPoints { needed: 1, actual: 0 });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Test_Temperature", "Predicted_Humidity"])?;
    let temperatures = linspace(min, max, PREDICTION_POINTS);
    for &temperature in &temperatures {
        writer.write_record(&[temperature.to_string(), model.predict(temperature).to_string()])?;
    }
    writer.flush()?;

    info!("Predictions saved to {}", path.display());
    Ok(temperatures.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(points: &[(f64, f64)]) -> Vec<ClimateReading> {
        points
            .iter()
            .map(|&(temperature, humidity)| ClimateReading { temperature, humidity })
            .collect()
    }

    #[test]
    fn strips_unit_suffix() {
        assert_eq!(strip_unit("Temperature (°C)"), "Temperature");
        assert_eq!(strip_unit("Humidity (%) "), "Humidity");
        assert_eq!(strip_unit(" Timestamp "), "Timestamp");
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert_eq!(quantile(&values, 1.0), Some(5.0));
        assert!((quantile(&values, 0.1).unwrap() - 1.4).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&values, 1.5), None);
    }

    #[test]
    fn fits_exact_line() {
        let data = readings(&[(10.0, 25.0), (20.0, 45.0), (30.0, 65.0)]);
        let model = LinearModel::fit(&data).unwrap();
        assert!((model.slope - 2.0).abs() < 1e-9);
        assert!((model.intercept - 5.0).abs() < 1e-9);
        assert!((model.r_squared - 1.0).abs() < 1e-9);
        assert!(model.std_error < 1e-9);
        assert!((model.predict(15.0) - 35.0).abs() < 1e-9);
    }

    #[test]
    fn fit_rejects_degenerate_input() {
        assert!(matches!(
            LinearModel::fit(&readings(&[(1.0, 2.0)])),
            Err(AnalysisError::TooFewPoints { needed: 2, actual: 1 })
        ));
        assert!(matches!(
            LinearModel::fit(&readings(&[(1.0, 2.0), (1.0, 3.0)])),
            Err(AnalysisError::ZeroVariance)
        ));
    }

    #[test]
    fn filter_drops_temperature_outliers() {
        let mut points: Vec<(f64, f64)> = (0..9).map(|i| (20.0 + i as f64, 50.0 + i as f64)).collect();
        points.push((-40.0, 99.0));
        points.push((80.0, 1.0));
        let data = readings(&points);

        let filtered = filter_by_temperature(&data, 0.1, 0.9).unwrap();
        assert_eq!(filtered.len(), 9);
        assert!(filtered.iter().all(|r| (20.0..=28.0).contains(&r.temperature)));

        let comparison = compare_models(&data, 0.1, 0.9).unwrap();
        assert_eq!((comparison.kept, comparison.removed), (9, 2));
        assert!((comparison.filtered.slope - 1.0).abs() < 1e-9);
        assert!(comparison.r_squared_change() > 0.0);
        assert!(comparison.slope_change() > 0.0);

        assert!(matches!(
            filter_by_temperature(&data, 0.9, 0.1),
            Err(AnalysisError::InvalidQuantiles { .. })
        ));
    }

    #[test]
    fn loads_recorder_csv_and_writes_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dht22_data.csv");
        fs::write(
            &input,
            "Temperature (°C),Humidity (%)\n20.0,40.0\n22.0,44.0\nnan?,1\n24.0,48.0\n",
        )
        .unwrap();

        let data = load_climate_csv(&input).unwrap();
        assert_eq!(data.len(), 3);

        let model = LinearModel::fit(&data).unwrap();
        let output = dir.path().join("out/predictions.csv");
        assert_eq!(write_predictions(&model, &data, &output).unwrap(), PREDICTION_POINTS);

        let written = fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("Test_Temperature,Predicted_Humidity"));
        assert_eq!(lines.next(), Some("20,40"));
        assert_eq!(lines.last(), Some("24,48"));
        assert_eq!(written.lines().count(), PREDICTION_POINTS + 1);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.csv");
        fs::write(&input, "Timestamp,X,Y,Z\n1,2,3,4\n").unwrap();
        assert!(matches!(
            load_climate_csv(&input),
            Err(AnalysisError::MissingColumn(name)) if name == "Temperature"
        ));
    }

    #[test]
    fn linspace_includes_both_ends() {
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
        assert_eq!(linspace(2.0, 5.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
