use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ValidationError;
use crate::types::{RawSample, Sample};

/// Fewest points a line chart can draw.
pub const MIN_READY_SAMPLES: usize = 2;

/// Parallel per-axis series. Every series always has the same length.
#[derive(Debug)]
struct Series {
    x: VecDeque<f64>,
    y: VecDeque<f64>,
    z: VecDeque<f64>,
    t: VecDeque<i64>,
}

impl Series {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            x: VecDeque::with_capacity(capacity),
            y: VecDeque::with_capacity(capacity),
            z: VecDeque::with_capacity(capacity),
            t: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, sample: &Sample, capacity: usize) {
        self.x.push_back(sample.x());
        self.y.push_back(sample.y());
        self.z.push_back(sample.z());
        self.t.push_back(sample.captured_at());

        // drop-oldest
        while self.t.len() > capacity {
            self.x.pop_front();
            self.y.pop_front();
            self.z.pop_front();
            self.t.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.t.len()
    }
}

/// Fixed-capacity rolling window of the most recent samples, shared between
/// one producer (the ingest pump) and one renderer.
///
/// All access goes through `append`/`push`, `snapshot` and `is_ready`. Each of
/// them holds the internal lock only for the duration of a single mutation or
/// copy, so a reader never sees a half-applied sample.
#[derive(Debug)]
pub struct LiveSampleBuffer {
    series: Mutex<Series>,
    capacity: NonZeroUsize,
}

impl LiveSampleBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            series: Mutex::new(Series::with_capacity(capacity.get())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Validate `raw` and insert it as the newest sample.
    ///
    /// On error the buffer is untouched.
    pub fn append(&self, raw: &RawSample) -> Result<Sample, ValidationError> {
        let sample = raw.validate()?;
        self.push(sample);
        Ok(sample)
    }

    /// Insert an already validated sample.
    pub fn push(&self, sample: Sample) {
        self.lock().push(&sample, self.capacity.get());
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        let series = self.lock();
        BufferSnapshot {
            x: series.x.iter().copied().collect(),
            y: series.y.iter().copied().collect(),
            z: series.z.iter().copied().collect(),
            t: series.t.iter().copied().collect(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.len() >= MIN_READY_SAMPLES
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Mutation only happens after validation, so a poisoned lock still guards
    // equal-length series.
    fn lock(&self) -> MutexGuard<'_, Series> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owned copy of the buffer contents, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSnapshot {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub t: Vec<i64>,
}

impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Same readiness rule as [`LiveSampleBuffer::is_ready`], evaluated on
    /// the copy the renderer is about to draw.
    pub fn is_ready(&self) -> bool {
        self.len() >= MIN_READY_SAMPLES
    }

    /// `(x, y, z, captured_at)` at `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<(f64, f64, f64, i64)> {
        Some((
            *self.x.get(index)?,
            *self.y.get(index)?,
            *self.z.get(index)?,
            *self.t.get(index)?,
        ))
    }

    pub fn latest(&self) -> Option<(f64, f64, f64, i64)> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn first(&self) -> Option<(f64, f64, f64, i64)> {
        self.get(0)
    }
}
