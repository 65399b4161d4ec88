mod analysis;
mod app;
mod buffer;
mod cli;
mod config;
mod database;
mod error;
mod history;
mod ingest;
mod logger;
mod plotter;
mod recorder;
mod source;
mod types;
mod utils;

use std::error::Error;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use eframe::egui;
use log::{error, info, warn};

use app::{HistoryViewer, LiveDashboard, PersistenceLink};
use buffer::LiveSampleBuffer;
use cli::{Cli, Commands, SourceKind};
use config::{AppConfig, ConfigManager};
use database::run_database_handler;
use history::HistoryTable;
use ingest::{run_ingest, IngestStats, Persistence};
use recorder::RecordKind;
use source::{spawn_source, DocumentSink, MqttSource, SampleSource, SerialSource, SimulatedSource};
use types::{DatabaseTask, ExportType, SaveResult};
use utils::generate_session_id;

fn main() {
    let cli = Cli::parse();

    logger::init_logger(cli.log_level.as_deref());
    info!("Application starting");

    let config = match ConfigManager::load_or_default(cli.config.as_deref()) {
        Ok(manager) => manager.get_config().clone(),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Live { source, persist, headless, duration_secs, rate_hz, dropouts } => {
            let options = LiveOptions {
                source,
                persist,
                headless,
                duration: duration_secs.map(Duration::from_secs),
                rate_hz,
                dropouts,
            };
            run_live(&config, options)
        }
        Commands::Record { climate, output, duration_secs } => {
            run_record(&config, climate, output, duration_secs.map(Duration::from_secs))
        }
        Commands::Ingest { duration_secs } => run_ingest_documents(&config, Duration::from_secs(duration_secs)),
        Commands::Export { session, list } => run_export(&config, session, list),
        Commands::Delete { session } => run_delete(&config, &session),
        Commands::View { input, window } => run_view(&config, &input, window),
        Commands::Analyze { input, lower, upper, predictions } => {
            run_analyze(&input, lower, upper, predictions.as_deref())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Application exiting");
}

struct LiveOptions {
    source: SourceKind,
    persist: bool,
    headless: bool,
    duration: Option<Duration>,
    rate_hz: f64,
    dropouts: f64,
}

/// The DuckDB worker thread and the channels that talk to it.
struct DatabaseWorker {
    task_sender: Sender<DatabaseTask>,
    save_result_receiver: Receiver<SaveResult>,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl DatabaseWorker {
    fn spawn(config: &AppConfig) -> std::io::Result<Self> {
        let (task_sender, task_receiver) = bounded(config.channels.db_task_channel_capacity);
        let (save_result_sender, save_result_receiver) = bounded(config.channels.save_result_channel_capacity);
        // 独立的关闭信号：生产者全部退出后再停数据库线程，保证最后一批写入
        let shutdown = Arc::new(AtomicBool::new(false));

        let database = config.database.clone();
        let export = config.export.clone();
        let db_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new().name("database".to_string()).spawn(move || {
            if let Err(e) = run_database_handler(database, export, task_receiver, save_result_sender, db_shutdown) {
                error!("Database handler thread failed: {}", e);
            }
        })?;

        Ok(Self {
            task_sender,
            save_result_receiver,
            shutdown,
            handle,
        })
    }

    /// Send a task that carries a response channel and wait for the answer.
    fn request<T>(&self, task: impl FnOnce(Sender<T>) -> DatabaseTask) -> Result<T, Box<dyn Error>> {
        let (response_sender, response_receiver) = bounded(1);
        self.task_sender.send(task(response_sender))?;
        response_receiver
            .recv()
            .map_err(|_| "Database thread exited before answering".into())
    }

    fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.task_sender);
        join_thread("Database", self.handle);
    }
}

fn join_thread(name: &str, handle: JoinHandle<()>) {
    match handle.join() {
        Ok(()) => info!("{} thread shut down gracefully", name),
        Err(e) => error!("{} thread panicked: {:?}", name, e),
    }
}

fn run_live(config: &AppConfig, options: LiveOptions) -> Result<(), Box<dyn Error>> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let buffer = Arc::new(LiveSampleBuffer::new(config.buffer_capacity()?));
    let stats = Arc::new(IngestStats::default());
    let session_id = generate_session_id();

    let (sample_sender, sample_receiver) = bounded(config.channels.sample_channel_capacity);

    let database = if options.persist {
        info!("Persisting to {} as {}", config.database.path, session_id);
        Some(DatabaseWorker::spawn(config)?)
    } else {
        None
    };

    let source: Box<dyn SampleSource> = match options.source {
        SourceKind::Mqtt => {
            let mut mqtt = MqttSource::new(config.mqtt.clone());
            if let Some(db) = &database {
                mqtt = mqtt.with_documents(DocumentSink {
                    sender: db.task_sender.clone(),
                    session_id: session_id.clone(),
                });
            }
            Box::new(mqtt)
        }
        SourceKind::Serial => Box::new(SerialSource::new(config.serial.clone())),
        SourceKind::Simulated => Box::new(SimulatedSource::new(options.rate_hz).with_dropouts(options.dropouts)),
    };
    let source_handle = spawn_source(source, sample_sender, Arc::clone(&shutdown_signal))?;

    let persistence = database.as_ref().map(|db| Persistence {
        sender: db.task_sender.clone(),
        session_id: session_id.clone(),
        batch_size: config.database.batch_size,
    });
    let ingest_buffer = Arc::clone(&buffer);
    let ingest_stats = Arc::clone(&stats);
    let ingest_shutdown = Arc::clone(&shutdown_signal);
    let ingest_handle = thread::Builder::new().name("ingest".to_string()).spawn(move || {
        run_ingest(sample_receiver, ingest_buffer, ingest_stats, persistence, ingest_shutdown)
    })?;

    let render_result = if options.headless {
        app::run_console_monitor(
            &buffer,
            &stats,
            config.refresh_interval(),
            &shutdown_signal,
            options.duration,
        );
        Ok(())
    } else {
        let mut dashboard = LiveDashboard::new(
            Arc::clone(&buffer),
            Arc::clone(&stats),
            config.plot.clone(),
            config.refresh_interval(),
        )
        .with_duration(options.duration);

        if let Some(db) = &database {
            dashboard = dashboard.with_persistence(PersistenceLink {
                db_task_sender: db.task_sender.clone(),
                save_result_receiver: db.save_result_receiver.clone(),
                session_id: session_id.clone(),
            });
        }
        run_window(config, &config.window.title, dashboard)
    };

    // 渲染结束后，发送关闭信号给各线程
    info!("Renderer closed, signaling worker threads to shutdown");
    shutdown_signal.store(true, Ordering::Relaxed);

    join_thread("Source", source_handle);
    join_thread("Ingest", ingest_handle);
    if let Some(db) = database {
        db.stop();
    }

    info!(
        "Session {}: {} samples accepted, {} rejected",
        session_id,
        stats.accepted(),
        stats.rejected()
    );
    render_result
}

fn run_window<A: eframe::App + 'static>(config: &AppConfig, title: &str, app: A) -> Result<(), Box<dyn Error>> {
    let options = eframe::NativeOptions {
        vsync: config.window.vsync,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred, // 硬件加速优先模式
        renderer: eframe::Renderer::Glow,
        viewport: egui::ViewportBuilder::default()
            .with_title(title)
            .with_inner_size([config.window.width, config.window.height])
            .with_resizable(config.window.resizable),
        ..Default::default()
    };

    eframe::run_native(
        title,
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| format!("GUI failed: {}", e).into())
}

fn run_record(
    config: &AppConfig,
    climate: bool,
    output: Option<PathBuf>,
    duration: Option<Duration>,
) -> Result<(), Box<dyn Error>> {
    let kind = if climate { RecordKind::Climate } else { RecordKind::Motion };
    let output = output.unwrap_or_else(|| config.get_export_directory().join(kind.default_file_name()));
    let shutdown_signal = Arc::new(AtomicBool::new(false));

    let (path, summary) = recorder::record_serial(&config.serial, kind, &output, duration, shutdown_signal)?;
    info!("Recorded {} rows to {}", summary.rows_written, path.display());
    Ok(())
}

fn run_ingest_documents(config: &AppConfig, duration: Duration) -> Result<(), Box<dyn Error>> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let session_id = generate_session_id();
    let database = DatabaseWorker::spawn(config)?;

    // 只存文档，样本通道保持打开但不使用
    let (sample_sender, _sample_receiver) = bounded(1);
    let source = MqttSource::new(config.mqtt.clone())
        .with_documents(DocumentSink {
            sender: database.task_sender.clone(),
            session_id: session_id.clone(),
        })
        .documents_only();
    let source_handle = spawn_source(Box::new(source), sample_sender, Arc::clone(&shutdown_signal))?;

    info!("Collecting documents for {} seconds into {}", duration.as_secs(), session_id);
    thread::sleep(duration);
    shutdown_signal.store(true, Ordering::Relaxed);
    join_thread("Source", source_handle);

    let exported = database.request(|response_sender| DatabaseTask::Export {
        export_type: ExportType::Documents,
        response_sender,
    });
    match exported {
        Ok(result) => info!("{} ({} rows dropped while cleaning)", result.message, result.rows_dropped),
        Err(e) => warn!("{}", e),
    }

    database.stop();
    Ok(())
}

fn run_export(config: &AppConfig, session: Option<String>, list: bool) -> Result<(), Box<dyn Error>> {
    let database = DatabaseWorker::spawn(config)?;

    let outcome = if list {
        database
            .request(|response_sender| DatabaseTask::GetSessions { response_sender })
            .and_then(|sessions| {
                let sessions = sessions?;
                info!("{} stored sessions", sessions.len());
                for session in sessions {
                    println!("{}", session);
                }
                Ok(())
            })
    } else {
        let export_type = match session {
            Some(session) => ExportType::Session(session),
            None => ExportType::Documents,
        };
        database
            .request(|response_sender| DatabaseTask::Export { export_type, response_sender })
            .map(|result| info!("{}", result.message))
    };

    database.stop();
    outcome
}

fn run_delete(config: &AppConfig, session: &str) -> Result<(), Box<dyn Error>> {
    let database = DatabaseWorker::spawn(config)?;
    let deleted = database.request(|response_sender| DatabaseTask::DeleteSession {
        session_id: session.to_string(),
        response_sender,
    });
    database.stop();

    match deleted?? {
        0 => warn!("Session {} not found", session),
        rows => info!("Deleted {} rows of session {}", rows, session),
    }
    Ok(())
}

fn run_view(config: &AppConfig, input: &Path, window: usize) -> Result<(), Box<dyn Error>> {
    let window = NonZeroUsize::new(window).ok_or("--window must be at least 1")?;
    let table = HistoryTable::load(input)?;

    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let title = format!("{} - {}", config.window.title, file_name);
    let viewer = HistoryViewer::new(file_name, table, window, config.plot.plot_height);

    run_window(config, &title, viewer)
}

fn run_analyze(input: &Path, lower: f64, upper: f64, predictions: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let readings = analysis::load_climate_csv(input)?;
    let comparison = analysis::compare_models(&readings, lower, upper)?;

    for (label, model) in [("Original", &comparison.original), ("Filtered", &comparison.filtered)] {
        info!(
            "{} model: humidity = {:.4} * temperature + {:.4} (R² {:.4}, std error {:.4})",
            label, model.slope, model.intercept, model.r_squared, model.std_error
        );
    }
    info!(
        "Filtering changed slope by {:+.4} and R² by {:+.4}",
        comparison.slope_change(),
        comparison.r_squared_change()
    );

    if let Some(path) = predictions {
        analysis::write_predictions(&comparison.original, &readings, path)?;
    }
    Ok(())
}
