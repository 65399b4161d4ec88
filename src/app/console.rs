use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use super::status::StatusSummary;
use crate::buffer::LiveSampleBuffer;
use crate::ingest::IngestStats;

/// Headless consumer: logs one status line per refresh interval until
/// `shutdown` is set or `duration` elapses. Returns the number of polls.
pub fn run_console_monitor(
    buffer: &LiveSampleBuffer,
    stats: &IngestStats,
    interval: Duration,
    shutdown: &AtomicBool,
    duration: Option<Duration>,
) -> usize {
    let stop_at = duration.map(|d| Instant::now() + d);
    let mut polls = 0;

    info!("Console monitor started (refresh {} ms)", interval.as_millis());

    while !shutdown.load(Ordering::Relaxed) && !stop_at.is_some_and(|at| Instant::now() >= at) {
        let snapshot = buffer.snapshot();
        let summary = StatusSummary::collect(&snapshot, buffer.capacity(), stats);
        info!("{}", summary.console_line());
        polls += 1;

        thread::sleep(interval);
    }

    info!("Console monitor stopped after {} polls", polls);
    polls
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn buffer() -> LiveSampleBuffer {
        LiveSampleBuffer::new(NonZeroUsize::new(8).unwrap())
    }

    #[test]
    fn returns_immediately_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let polls = run_console_monitor(&buffer(), &IngestStats::default(), Duration::from_millis(5), &shutdown, None);
        assert_eq!(polls, 0);
    }

    #[test]
    fn polls_until_duration_elapses() {
        let shutdown = AtomicBool::new(false);
        let polls = run_console_monitor(
            &buffer(),
            &IngestStats::default(),
            Duration::from_millis(10),
            &shutdown,
            Some(Duration::from_millis(55)),
        );
        assert!(polls >= 1);
        assert!(!shutdown.load(Ordering::Relaxed));
    }
}
