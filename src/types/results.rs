/// Result of a database save operation
#[derive(Debug)]
pub struct SaveResult {
    pub samples_saved: usize,
    pub documents_saved: usize,
    pub error: Option<String>,
}

impl SaveResult {
    pub fn samples(count: usize) -> Self {
        Self {
            samples_saved: count,
            documents_saved: 0,
            error: None,
        }
    }

    pub fn document() -> Self {
        Self {
            samples_saved: 0,
            documents_saved: 1,
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            samples_saved: 0,
            documents_saved: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of an export operation
#[derive(Debug)]
pub struct ExportResult {
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub message: String,
}

impl ExportResult {
    pub fn new(rows_written: usize, rows_dropped: usize, message: String) -> Self {
        Self {
            rows_written,
            rows_dropped,
            message,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            rows_written: 0,
            rows_dropped: 0,
            message,
        }
    }

    pub fn no_data() -> Self {
        Self {
            rows_written: 0,
            rows_dropped: 0,
            message: "No data to export".to_string(),
        }
    }
}
