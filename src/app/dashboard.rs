use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use eframe::{egui, Frame};
use log::{info, warn};

use super::status::StatusSummary;
use super::ui;
use crate::buffer::LiveSampleBuffer;
use crate::config::PlotConfig;
use crate::ingest::IngestStats;
use crate::types::{DatabaseTask, ExportResult, ExportType, SaveResult};

/// Handles to the database thread when `--persist` is on.
pub struct PersistenceLink {
    pub db_task_sender: Sender<DatabaseTask>,
    pub save_result_receiver: Receiver<SaveResult>,
    pub session_id: String,
}

/// GUI consumer of the live buffer. Only ever reads it.
pub struct LiveDashboard {
    buffer: Arc<LiveSampleBuffer>,
    stats: Arc<IngestStats>,
    plot: PlotConfig,
    refresh_interval: Duration,
    persistence: Option<PersistenceLink>,
    close_at: Option<Instant>,

    save_status: String,
    samples_saved: usize,
    export_status: String,
    export_result_receiver: Option<Receiver<ExportResult>>,
}

impl LiveDashboard {
    pub fn new(
        buffer: Arc<LiveSampleBuffer>,
        stats: Arc<IngestStats>,
        plot: PlotConfig,
        refresh_interval: Duration,
    ) -> Self {
        info!("Dashboard started, waiting for data...");
        Self {
            buffer,
            stats,
            plot,
            refresh_interval,
            persistence: None,
            close_at: None,
            save_status: String::new(),
            samples_saved: 0,
            export_status: String::new(),
            export_result_receiver: None,
        }
    }

    pub fn with_persistence(mut self, link: PersistenceLink) -> Self {
        self.persistence = Some(link);
        self
    }

    /// Close the window after `duration`.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.close_at = duration.map(|d| Instant::now() + d);
        self
    }

    pub fn plot_config(&self) -> &PlotConfig {
        &self.plot
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.persistence.as_ref().map(|p| p.session_id.as_str())
    }

    pub fn save_status(&self) -> &str {
        &self.save_status
    }

    pub fn export_status(&self) -> &str {
        &self.export_status
    }

    pub fn export_in_progress(&self) -> bool {
        self.export_result_receiver.is_some()
    }

    pub fn request_session_export(&mut self) {
        let Some(link) = &self.persistence else {
            return;
        };

        let (response_sender, response_receiver) = bounded(1);
        let task = DatabaseTask::Export {
            export_type: ExportType::Session(link.session_id.clone()),
            response_sender,
        };
        match link.db_task_sender.try_send(task) {
            Ok(()) => {
                self.export_status = "Exporting...".to_string();
                self.export_result_receiver = Some(response_receiver);
            }
            Err(e) => {
                warn!("Failed to queue export: {}", e);
                self.export_status = "Export failed: database busy".to_string();
            }
        }
    }

    fn handle_save_results(&mut self) {
        let Some(link) = &self.persistence else {
            return;
        };
        while let Ok(result) = link.save_result_receiver.try_recv() {
            if !result.is_success() {
                self.save_status = result.error.unwrap_or_default();
            } else if result.samples_saved > 0 {
                self.samples_saved += result.samples_saved;
                self.save_status = format!("Saved: {} samples", self.samples_saved);
            }
        }
    }

    fn handle_export_results(&mut self) {
        if let Some(receiver) = &self.export_result_receiver {
            if let Ok(result) = receiver.try_recv() {
                info!("Export completed: {} rows", result.rows_written);
                self.export_status = result.message;
                self.export_result_receiver = None; // 清除接收器
            }
        }
    }
}

impl eframe::App for LiveDashboard {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // 设置明亮模式主题
        ctx.set_visuals(egui::Visuals::light());

        // 每帧只取一次快照，状态栏和图表用同一份数据
        let snapshot = self.buffer.snapshot();
        let summary = StatusSummary::collect(&snapshot, self.buffer.capacity(), &self.stats);

        ui::render_status_bar(self, ctx, &summary);
        ui::render_bottom_status_bar(self, ctx);
        ui::render_main_panel(self, ctx, &snapshot);

        self.handle_save_results();
        self.handle_export_results();

        if self.close_at.is_some_and(|at| Instant::now() >= at) {
            info!("Run duration elapsed, closing dashboard");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        ctx.request_repaint_after(self.refresh_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::num::NonZeroUsize;

    fn dashboard() -> LiveDashboard {
        LiveDashboard::new(
            Arc::new(LiveSampleBuffer::new(NonZeroUsize::new(4).unwrap())),
            Arc::new(IngestStats::default()),
            PlotConfig::default(),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn export_request_goes_to_database_thread() {
        let (task_tx, task_rx) = unbounded();
        let (_result_tx, result_rx) = unbounded();
        let mut app = dashboard().with_persistence(PersistenceLink {
            db_task_sender: task_tx,
            save_result_receiver: result_rx,
            session_id: "session_gui".to_string(),
        });

        app.request_session_export();
        assert!(app.export_in_progress());

        match task_rx.try_recv().unwrap() {
            DatabaseTask::Export { export_type, response_sender } => {
                assert_eq!(export_type, ExportType::Session("session_gui".to_string()));
                response_sender
                    .send(ExportResult::new(3, 0, "Exported".to_string()))
                    .unwrap();
            }
            _ => panic!("unexpected task"),
        }

        app.handle_export_results();
        assert!(!app.export_in_progress());
        assert_eq!(app.export_status(), "Exported");
    }

    #[test]
    fn save_results_accumulate() {
        let (task_tx, _task_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let mut app = dashboard().with_persistence(PersistenceLink {
            db_task_sender: task_tx,
            save_result_receiver: result_rx,
            session_id: "s".to_string(),
        });

        result_tx.send(SaveResult::samples(50)).unwrap();
        result_tx.send(SaveResult::samples(25)).unwrap();
        app.handle_save_results();
        assert_eq!(app.save_status(), "Saved: 75 samples");

        result_tx.send(SaveResult::error("disk full".to_string())).unwrap();
        app.handle_save_results();
        assert_eq!(app.save_status(), "disk full");
    }

    #[test]
    fn export_without_persistence_is_ignored() {
        let mut app = dashboard();
        app.request_session_export();
        assert!(!app.export_in_progress());
        assert_eq!(app.session_id(), None);
    }
}
