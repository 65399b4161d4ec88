use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{info, warn};

use crate::buffer::LiveSampleBuffer;
use crate::error::ValidationError;
use crate::types::{DatabaseTask, RawSample, Sample};

/// Counters shared with the renderers' status line.
#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    last_rejection: Mutex<Option<String>>,
}

impl IngestStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn last_rejection(&self) -> Option<String> {
        self.last_rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self, error: &ValidationError) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        *self.last_rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }
}

/// Batched hand-off of accepted samples to the database thread.
pub struct Persistence {
    pub sender: Sender<DatabaseTask>,
    pub session_id: String,
    pub batch_size: usize,
}

impl Persistence {
    fn flush(&self, batch: &mut Vec<Sample>) {
        if batch.is_empty() {
            return;
        }
        let task = DatabaseTask::SaveSamples {
            samples: std::mem::take(batch),
            session_id: self.session_id.clone(),
        };
        if let Err(e) = self.sender.send(task) {
            warn!("Persistence thread gone, dropping {} samples", samples_in(&e.0));
        }
    }
}

fn samples_in(task: &DatabaseTask) -> usize {
    match task {
        DatabaseTask::SaveSamples { samples, .. } => samples.len(),
        _ => 0,
    }
}

fn ingest_one(
    raw: &RawSample,
    buffer: &LiveSampleBuffer,
    stats: &IngestStats,
    persistence: Option<&Persistence>,
    batch: &mut Vec<Sample>,
) {
    match buffer.append(raw) {
        Ok(sample) => {
            stats.record_accepted();
            if let Some(persistence) = persistence {
                batch.push(sample);
                if batch.len() >= persistence.batch_size {
                    persistence.flush(batch);
                }
            }
        }
        Err(e) => {
            warn!("Rejected sample: {}", e);
            stats.record_rejected(&e);
        }
    }
}

/// The buffer's single producer: moves raw readings from the source channel
/// into the buffer until shutdown or until every source has hung up.
pub fn run_ingest(
    receiver: Receiver<RawSample>,
    buffer: Arc<LiveSampleBuffer>,
    stats: Arc<IngestStats>,
    persistence: Option<Persistence>,
    shutdown: Arc<AtomicBool>,
) {
    let mut batch: Vec<Sample> = Vec::new();

    info!("Ingest thread started (buffer capacity {})", buffer.capacity());

    while !shutdown.load(Ordering::Relaxed) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(raw) => ingest_one(&raw, &buffer, &stats, persistence.as_ref(), &mut batch),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Ingest: sample channel disconnected, exiting");
                break;
            }
        }
    }

    // 退出前处理通道中已排队的样本，只取当前长度，避免源仍在写入时无法退出
    let queued = receiver.len();
    if queued > 0 {
        info!("Ingest: draining {} queued samples", queued);
        for raw in receiver.try_iter().take(queued) {
            ingest_one(&raw, &buffer, &stats, persistence.as_ref(), &mut batch);
        }
    }

    if let Some(persistence) = &persistence {
        persistence.flush(&mut batch);
    }

    info!(
        "Ingest thread exiting ({} accepted, {} rejected)",
        stats.accepted(),
        stats.rejected()
    );
}
