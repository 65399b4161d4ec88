use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::info;
use rand::Rng;

use super::SampleSource;
use crate::error::SourceError;
use crate::types::RawSample;
use crate::utils::now_millis;

/// Synthetic gyroscope for running the dashboard without hardware.
///
/// Each axis is a sine wave at a different frequency plus uniform noise.
/// With a non-zero `dropout_probability` some readings lose their `z` value,
/// the way a flaky link drops fields.
pub struct SimulatedSource {
    rate_hz: f64,
    noise: f64,
    dropout_probability: f64,
    limit: Option<usize>,
}

impl SimulatedSource {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz: rate_hz.max(1.0),
            noise: 0.05,
            dropout_probability: 0.0,
            limit: None,
        }
    }

    pub fn with_dropouts(mut self, probability: f64) -> Self {
        self.dropout_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Stop after `count` readings.
    pub fn with_limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn run(&mut self, sink: &Sender<RawSample>, shutdown: &AtomicBool) -> Result<(), SourceError> {
        let mut rng = rand::rng();
        let period = Duration::from_secs_f64(1.0 / self.rate_hz);
        let mut produced = 0usize;

        while !shutdown.load(Ordering::Relaxed) {
            if self.limit.is_some_and(|limit| produced >= limit) {
                break;
            }

            let t = produced as f64 / self.rate_hz;
            let mut jitter = || rng.random_range(-self.noise..=self.noise);
            let mut raw = RawSample::from_values(
                (t * 1.3).sin() + jitter(),
                (t * 0.7).cos() * 0.5 + jitter(),
                1.0 + (t * 2.1).sin() * 0.2 + jitter(),
                now_millis(),
            );
            if self.dropout_probability > 0.0 && rng.random_bool(self.dropout_probability) {
                raw.z = None;
            }

            if sink.send(raw).is_err() {
                info!("Sample channel disconnected, simulated source exiting");
                break;
            }
            produced += 1;
            thread::sleep(period);
        }

        Ok(())
    }
}
