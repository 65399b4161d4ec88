pub mod sample;
pub mod climate;
pub mod results;
pub mod tasks;

pub use sample::{axis_token, RawSample, Sample};
pub use climate::ClimateReading;
pub use results::{SaveResult, ExportResult};
pub use tasks::{DatabaseTask, ExportType};
