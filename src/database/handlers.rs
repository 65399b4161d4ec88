use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};

use super::export::{export_documents, export_session_samples};
use super::manager::DatabaseManager;
use crate::config::{DatabaseConfig, ExportConfig};
use crate::types::{DatabaseTask, ExportResult, ExportType, SaveResult};

pub fn run_database_handler(
    database: DatabaseConfig,
    export: ExportConfig,
    task_receiver: Receiver<DatabaseTask>,
    result_sender: Sender<SaveResult>,
    shutdown_signal: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    // 在保存线程中创建数据库连接
    let db_manager = match DatabaseManager::open(&database) {
        Ok(db) => {
            info!("Database handler thread: DuckDB initialized successfully");
            db
        }
        Err(e) => {
            error!("Database handler thread: Failed to initialize DuckDB: {}", e);
            return Err(e.into());
        }
    };

    match db_manager.get_stats() {
        Ok((documents, samples)) => info!("Database holds {} documents and {} motion samples", documents, samples),
        Err(e) => warn!("Database handler thread: Failed to read stats: {}", e),
    }

    serve_tasks(&db_manager, &export, &task_receiver, &result_sender, &shutdown_signal);

    info!("Database handler thread exiting gracefully");
    Ok(())
}

/// Process tasks until shutdown or until every sender is gone. Tasks already
/// queued when shutdown is signalled are still written.
pub fn serve_tasks(
    db_manager: &DatabaseManager,
    export: &ExportConfig,
    task_receiver: &Receiver<DatabaseTask>,
    result_sender: &Sender<SaveResult>,
    shutdown_signal: &AtomicBool,
) {
    info!("Database handler thread started");

    loop {
        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => handle_task(db_manager, export, result_sender, task),
            Err(RecvTimeoutError::Timeout) => {
                if shutdown_signal.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Database handler: Task channel disconnected, exiting");
                break;
            }
        }
    }
}

fn handle_task(
    db_manager: &DatabaseManager,
    export: &ExportConfig,
    result_sender: &Sender<SaveResult>,
    task: DatabaseTask,
) {
    match task {
        DatabaseTask::SaveSamples { samples, session_id } => {
            let result = match db_manager.save_samples(&samples, &session_id) {
                Ok(count) => SaveResult::samples(count),
                Err(e) => {
                    error!("Failed to save {} samples: {}", samples.len(), e);
                    SaveResult::error(e.to_string())
                }
            };
            report(result_sender, result);
        }
        DatabaseTask::StoreDocument { document, topic, session_id, received_at_ms } => {
            let result = match db_manager.insert_document(&session_id, &topic, &document, received_at_ms) {
                Ok(_) => SaveResult::document(),
                Err(e) => {
                    error!("Failed to insert document: {}", e);
                    SaveResult::error(e.to_string())
                }
            };
            report(result_sender, result);
        }
        DatabaseTask::Export { export_type, response_sender } => {
            let result = handle_export_request(db_manager, export, export_type);
            if let Err(e) = response_sender.try_send(result) {
                warn!("Database handler: Failed to send export result: {}", e);
            }
        }
        DatabaseTask::GetSessions { response_sender } => {
            let sessions = db_manager.get_all_sessions().map_err(|e| e.to_string());
            if let Err(e) = response_sender.try_send(sessions) {
                warn!("Database handler: Failed to send sessions: {}", e);
            }
        }
        DatabaseTask::DeleteSession { session_id, response_sender } => {
            let result = db_manager.delete_session(&session_id).map_err(|e| e.to_string());
            if let Err(e) = response_sender.try_send(result) {
                warn!("Database handler: Failed to send delete result: {}", e);
            }
        }
    }
}

// The result channel is advisory; a full or closed one only loses the report.
fn report(result_sender: &Sender<SaveResult>, result: SaveResult) {
    if let Err(e) = result_sender.try_send(result) {
        log::debug!("Save result not delivered: {}", e);
    }
}

pub fn handle_export_request(
    db_manager: &DatabaseManager,
    export: &ExportConfig,
    export_type: ExportType,
) -> ExportResult {
    match export_type {
        ExportType::Session(session_id) => {
            match export_session_samples(db_manager, &session_id, Path::new(&export.directory)) {
                Ok((path, rows)) => ExportResult::new(rows, 0, format!("Exported {} to {}", session_id, path.display())),
                Err(e) => {
                    warn!("Export of session {} failed: {}", session_id, e);
                    ExportResult::failed(e.to_string())
                }
            }
        }
        ExportType::Documents => match export_documents(db_manager, export) {
            Ok(result) => result,
            Err(e) => {
                warn!("Document export failed: {}", e);
                ExportResult::failed(e.to_string())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;
    use crossbeam_channel::{bounded, unbounded};
    use serde_json::json;

    #[test]
    fn serves_queued_tasks_then_exits_on_disconnect() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let (task_tx, task_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let (sessions_tx, sessions_rx) = bounded(1);

        task_tx
            .send(DatabaseTask::SaveSamples {
                samples: vec![Sample::new(1.0, 2.0, 3.0, 4).unwrap()],
                session_id: "session_1".to_string(),
            })
            .unwrap();
        task_tx
            .send(DatabaseTask::StoreDocument {
                document: json!({"x": 1}),
                topic: "sensor/gyro".to_string(),
                session_id: "session_2".to_string(),
                received_at_ms: 5,
            })
            .unwrap();
        task_tx
            .send(DatabaseTask::GetSessions { response_sender: sessions_tx })
            .unwrap();
        drop(task_tx);

        let shutdown = AtomicBool::new(false);
        serve_tasks(&db, &ExportConfig::default(), &task_rx, &result_tx, &shutdown);

        let results: Vec<SaveResult> = result_rx.try_iter().collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(SaveResult::is_success));
        assert_eq!(results[0].samples_saved, 1);
        assert_eq!(results[1].documents_saved, 1);
        assert_eq!(sessions_rx.recv().unwrap().unwrap(), vec!["session_2", "session_1"]);
    }

    #[test]
    fn delete_and_export_report_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::open_in_memory().unwrap();
        db.save_samples(&[Sample::new(0.0, 0.0, 1.0, 1).unwrap()], "s").unwrap();
        let export = ExportConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            ..ExportConfig::default()
        };

        let result = handle_export_request(&db, &export, ExportType::Session("s".to_string()));
        assert_eq!(result.rows_written, 1);
        assert!(dir.path().join("s.csv").exists());

        let (tx, rx) = bounded(1);
        let (result_tx, _result_rx) = unbounded();
        handle_task(
            &db,
            &export,
            &result_tx,
            DatabaseTask::DeleteSession { session_id: "s".to_string(), response_sender: tx },
        );
        assert_eq!(rx.recv().unwrap(), Ok(1));
    }
}
