use super::{ExportResult, Sample};

/// Work items for the persistence thread
pub enum DatabaseTask {
    SaveSamples {
        samples: Vec<Sample>,
        session_id: String,
    },
    StoreDocument {
        document: serde_json::Value,
        topic: String,
        session_id: String,
        received_at_ms: i64,
    },
    Export {
        export_type: ExportType,
        response_sender: crossbeam_channel::Sender<ExportResult>,
    },
    GetSessions {
        response_sender: crossbeam_channel::Sender<Result<Vec<String>, String>>,
    },
    DeleteSession {
        session_id: String,
        response_sender: crossbeam_channel::Sender<Result<usize, String>>,
    },
}

/// What an export request covers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportType {
    /// Motion samples of one session to `<dir>/<session>.csv`.
    Session(String),
    /// Every stored document, flattened, followed by a cleaned copy.
    Documents,
}
