pub mod mqtt;
pub mod serial;
pub mod simulated;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{error, info};

use crate::error::SourceError;
use crate::types::RawSample;

pub use mqtt::{DocumentSink, MqttSource};
pub use serial::SerialSource;
pub use simulated::SimulatedSource;

/// Something that produces raw readings until told to stop.
///
/// Implementations push every decoded reading into `sink` and return when
/// `shutdown` is set, when the sink disconnects, or on a transport error.
pub trait SampleSource: Send {
    fn name(&self) -> &str;

    fn run(&mut self, sink: &Sender<RawSample>, shutdown: &AtomicBool) -> Result<(), SourceError>;
}

/// Run `source` on its own named thread.
pub fn spawn_source(
    mut source: Box<dyn SampleSource>,
    sink: Sender<RawSample>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let name = source.name().to_string();
    thread::Builder::new()
        .name(format!("{}-source", name))
        .spawn(move || {
            info!("{} source started", name);
            match source.run(&sink, &shutdown) {
                Ok(()) => info!("{} source stopped", name),
                Err(e) => error!("{} source failed: {}", name, e),
            }
        })
}
