use std::io;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::Path;

use log::{debug, info};

use crate::analysis::{quantile, strip_unit};
use crate::error::AnalysisError;

pub const DEFAULT_WINDOW_SIZE: usize = 100;
pub const HISTOGRAM_BINS: usize = 20;

/// One numeric column of a recorded CSV. Empty cells are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// The numeric columns of a recorder or export CSV. Text columns (the
/// recorder's formatted `Timestamp`) are left out; the row index is the x axis.
#[derive(Debug, Clone, Default)]
pub struct HistoryTable {
    columns: Vec<HistoryColumn>,
    rows: usize,
}

impl HistoryTable {
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let table = Self::from_reader(reader)?;
        info!(
            "Loaded {} rows x {} numeric columns from {}",
            table.rows,
            table.columns.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self, AnalysisError> {
        let headers = reader.headers()?.clone();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        let mut rows = 0;

        for record in reader.records() {
            let record = record?;
            for (idx, column) in cells.iter_mut().enumerate() {
                column.push(record.get(idx).unwrap_or("").trim().to_string());
            }
            rows += 1;
        }

        let mut columns = Vec::new();
        for (name, column) in headers.iter().zip(cells) {
            match numeric_values(&column) {
                Some(values) => columns.push(HistoryColumn {
                    name: name.trim().to_string(),
                    values,
                }),
                None => debug!("Column {} is not numeric, skipping", name),
            }
        }

        if columns.is_empty() {
            return Err(AnalysisError::MissingColumn("any numeric column".to_string()));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[HistoryColumn] {
        &self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Every column except the time ones starts selected.
    pub fn default_selection(&self) -> Vec<bool> {
        self.columns.iter().map(|column| !is_time_column(&column.name)).collect()
    }
}

/// A column is numeric when it has a value and every non-empty cell parses.
fn numeric_values(cells: &[String]) -> Option<Vec<f64>> {
    if cells.iter().all(|cell| cell.is_empty()) {
        return None;
    }
    cells
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                Some(f64::NAN)
            } else {
                cell.parse::<f64>().ok()
            }
        })
        .collect()
}

fn is_time_column(name: &str) -> bool {
    let name = strip_unit(name).to_ascii_lowercase();
    name.starts_with("time") || name.starts_with("captured_at")
}

/// Fixed-size page over the rows, moved with Previous / Next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    size: NonZeroUsize,
    page: usize,
}

impl SampleWindow {
    pub fn new(size: NonZeroUsize) -> Self {
        Self { size, page: 0 }
    }

    pub fn size(&self) -> usize {
        self.size.get()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// At least one page, even for an empty table.
    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.size.get()).max(1)
    }

    pub fn range(&self, total: usize) -> Range<usize> {
        let start = (self.page * self.size.get()).min(total);
        start..(start + self.size.get()).min(total)
    }

    pub fn next(&mut self, total: usize) -> bool {
        if self.page + 1 < self.page_count(total) {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Change the page size, keeping the first visible row on screen.
    pub fn resize(&mut self, size: NonZeroUsize) {
        let first_row = self.page * self.size.get();
        self.size = size;
        self.page = first_row / size.get();
    }
}

/// count / mean / std / min / quartiles / max of the finite values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation, undefined below two values.
    pub std: Option<f64>,
    pub min: f64,
    pub lower_quartile: f64,
    pub median: f64,
    pub upper_quartile: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub const LABELS: [&'static str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

    /// Values in [`ColumnSummary::LABELS`] order.
    pub fn values(&self) -> [Option<f64>; 8] {
        [
            Some(self.count as f64),
            Some(self.mean),
            self.std,
            Some(self.min),
            Some(self.lower_quartile),
            Some(self.median),
            Some(self.upper_quartile),
            Some(self.max),
        ]
    }
}

pub fn describe(values: &[f64]) -> Option<ColumnSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });

    Some(ColumnSummary {
        count,
        mean,
        std,
        min: sorted[0],
        lower_quartile: quantile(&sorted, 0.25)?,
        median: quantile(&sorted, 0.5)?,
        upper_quartile: quantile(&sorted, 0.75)?,
        max: sorted[count - 1],
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub center: f64,
    pub width: f64,
    pub count: usize,
}

/// Equal-width bins over the finite values. A constant column is one bin.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max == min {
        return vec![HistogramBin {
            center: min,
            width: 1.0,
            count: finite.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in finite {
        // 最大值归入最后一个区间
        let idx = (((value - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| HistogramBin {
            center: min + width * (idx as f64 + 0.5),
            width,
            count,
        })
        .collect()
}

/// `[x, y]` pairs where both values are present.
pub fn paired(x: &[f64], y: &[f64]) -> Vec<[f64; 2]> {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| [a, b])
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Line,
    Scatter,
    Bar,
    Histogram,
    /// First two selected variables against each other, with the fitted line.
    Trend,
}

impl GraphKind {
    pub const ALL: [GraphKind; 5] = [
        GraphKind::Line,
        GraphKind::Scatter,
        GraphKind::Bar,
        GraphKind::Histogram,
        GraphKind::Trend,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GraphKind::Line => "Line Chart",
            GraphKind::Scatter => "Scatter Plot",
            GraphKind::Bar => "Bar Chart",
            GraphKind::Histogram => "Distribution",
            GraphKind::Trend => "Regression Trend",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(csv: &str) -> Result<HistoryTable, AnalysisError> {
        HistoryTable::from_reader(csv::ReaderBuilder::new().flexible(true).from_reader(csv.as_bytes()))
    }

    fn window(size: usize) -> SampleWindow {
        SampleWindow::new(NonZeroUsize::new(size).unwrap())
    }

    #[test]
    fn text_columns_are_skipped() {
        let table = table("Timestamp,X,Y,Z\n2024-06-10 12:00:00,1,2,3\n2024-06-10 12:00:01,4,,6\n").unwrap();
        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y", "Z"]);
        assert_eq!(table.rows(), 2);
        assert!(table.columns()[1].values[1].is_nan());
    }

    #[test]
    fn time_columns_start_unselected() {
        let table = table("timestamp_ms,x,y,z\n10,1,2,3\n").unwrap();
        assert_eq!(table.default_selection(), vec![false, true, true, true]);
    }

    #[test]
    fn table_without_numbers_is_an_error() {
        assert!(matches!(table("name\nabc\n"), Err(AnalysisError::MissingColumn(_))));
    }

    #[test]
    fn loads_recorded_climate_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Temperature (°C),Humidity (%)\n21.5,40\n22.0,41.5\n").unwrap();

        let table = HistoryTable::load(file.path()).unwrap();
        assert_eq!(table.columns()[0].name, "Temperature (°C)");
        assert_eq!(table.columns()[1].values, vec![40.0, 41.5]);
        assert_eq!(table.default_selection(), vec![true, true]);
    }

    #[test]
    fn window_pages_through_rows() {
        let mut w = window(4);
        assert_eq!(w.page_count(10), 3);
        assert_eq!(w.range(10), 0..4);

        assert!(w.next(10));
        assert!(w.next(10));
        assert_eq!(w.range(10), 8..10);
        assert!(!w.next(10));
        assert_eq!(w.page(), 2);

        assert!(w.previous());
        assert_eq!(w.range(10), 4..8);
        assert!(w.previous());
        assert!(!w.previous());
    }

    #[test]
    fn empty_table_has_one_empty_page() {
        let mut w = window(100);
        assert_eq!(w.page_count(0), 1);
        assert_eq!(w.range(0), 0..0);
        assert!(!w.next(0));
    }

    #[test]
    fn resize_keeps_first_visible_row() {
        let mut w = window(10);
        w.next(100);
        w.next(100);
        assert_eq!(w.range(100).start, 20);

        w.resize(NonZeroUsize::new(25).unwrap());
        assert_eq!(w.page(), 0);
        assert_eq!(w.range(100), 0..25);

        w.resize(NonZeroUsize::new(5).unwrap());
        assert_eq!(w.range(100), 0..5);
    }

    #[test]
    fn describe_matches_sample_statistics() {
        let summary = describe(&[4.0, 1.0, 3.0, 2.0, f64::NAN]).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, 2.5);
        assert!((summary.std.unwrap() - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert_eq!((summary.min, summary.max), (1.0, 4.0));
        assert_eq!(summary.lower_quartile, 1.75);
        assert_eq!(summary.median, 2.5);
        assert_eq!(summary.upper_quartile, 3.25);
    }

    #[test]
    fn describe_single_value_has_no_std() {
        let summary = describe(&[7.0]).unwrap();
        assert_eq!(summary.std, None);
        assert_eq!(summary.values()[0], Some(1.0));
        assert_eq!(summary.values()[2], None);
        assert!(describe(&[]).is_none());
        assert!(describe(&[f64::NAN]).is_none());
    }

    #[test]
    fn histogram_counts_every_value_once() {
        let bins = histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![1, 1, 1, 2]);
        assert_eq!(bins[0].center, 0.5);
        assert_eq!(bins[0].width, 1.0);

        let constant = histogram(&[2.0, 2.0], 10);
        assert_eq!(constant, vec![HistogramBin { center: 2.0, width: 1.0, count: 2 }]);
        assert!(histogram(&[], 10).is_empty());
    }

    #[test]
    fn pairs_skip_missing_values() {
        let pairs = paired(&[1.0, f64::NAN, 3.0], &[10.0, 20.0, 30.0]);
        assert_eq!(pairs, vec![[1.0, 10.0], [3.0, 30.0]]);
    }
}
