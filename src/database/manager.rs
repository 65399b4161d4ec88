use duckdb::types::Type;
use duckdb::{Connection, Result as DuckResult};
use log::{error, info, warn};
use serde_json::Value;
use std::fs;

use super::schema::DatabaseSchema;
use crate::config::DatabaseConfig;
use crate::types::Sample;

/// A stored message as it was received.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub session_id: String,
    pub topic: String,
    pub payload: Value,
    pub received_at_ms: i64,
}

pub struct DatabaseManager {
    conn: Connection,
}

impl DatabaseManager {
    pub fn open(config: &DatabaseConfig) -> DuckResult<Self> {
        let db_path = std::path::Path::new(&config.path);

        // 确保data目录存在
        if config.auto_create_dir {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("Failed to create data directory: {}", e);
                }
            }
        }

        let conn = Connection::open(db_path)?;
        info!("Database connection established at: {}", config.path);

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> DuckResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> DuckResult<Self> {
        DatabaseSchema::create_tables_and_migrate(&conn)?;
        Ok(DatabaseManager { conn })
    }

    /// Blind insert of one received message.
    pub fn insert_document(
        &self,
        session_id: &str,
        topic: &str,
        document: &Value,
        received_at_ms: i64,
    ) -> DuckResult<usize> {
        self.conn.execute(
            "INSERT INTO sensor_documents (session_id, topic, payload, received_at_ms) VALUES (?, ?, ?, ?)",
            duckdb::params![session_id, topic, document.to_string(), received_at_ms],
        )
    }

    pub fn save_samples(&self, samples: &[Sample], session_id: &str) -> DuckResult<usize> {
        if samples.is_empty() {
            warn!("No motion samples to save");
            return Ok(0);
        }

        let mut stmt = self.conn.prepare(
            "INSERT INTO motion_samples (session_id, timestamp_ms, x, y, z) VALUES (?, ?, ?, ?, ?)",
        )?;

        let mut count = 0;
        for sample in samples {
            stmt.execute(duckdb::params![
                session_id,
                sample.captured_at(),
                sample.x(),
                sample.y(),
                sample.z()
            ])?;
            count += 1;
        }

        info!("Saved {} motion samples for session {}", count, session_id);
        Ok(count)
    }

    /// Every stored document, oldest first.
    pub fn get_documents(&self) -> DuckResult<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, topic, payload, received_at_ms FROM sensor_documents ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            let payload: String = row.get(2)?;
            let payload = serde_json::from_str(&payload)
                .map_err(|e| duckdb::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
            Ok(StoredDocument {
                session_id: row.get(0)?,
                topic: row.get(1)?,
                payload,
                received_at_ms: row.get(3)?,
            })
        })?;

        rows.collect()
    }

    pub fn get_samples_by_session(&self, session_id: &str) -> DuckResult<Vec<Sample>> {
        let mut stmt = self.conn.prepare(
            "SELECT x, y, z, timestamp_ms FROM motion_samples WHERE session_id = ? ORDER BY id",
        )?;

        let rows = stmt.query_map([session_id], |row| {
            Sample::new(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)
                .map_err(|e| duckdb::Error::FromSqlConversionFailure(0, Type::Double, Box::new(e)))
        })?;

        rows.collect()
    }

    // 获取所有session ID列表
    pub fn get_all_sessions(&self) -> DuckResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT session_id FROM motion_samples
             UNION
             SELECT DISTINCT session_id FROM sensor_documents
             ORDER BY session_id DESC",
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    /// `(documents, samples)` row counts.
    pub fn get_stats(&self) -> DuckResult<(usize, usize)> {
        let document_count: usize = self.conn.query_row("SELECT COUNT(*) FROM sensor_documents", [], |row| {
            Ok(row.get::<_, i64>(0)? as usize)
        })?;

        let sample_count: usize = self.conn.query_row("SELECT COUNT(*) FROM motion_samples", [], |row| {
            Ok(row.get::<_, i64>(0)? as usize)
        })?;

        Ok((document_count, sample_count))
    }

    // 删除指定session的所有数据
    pub fn delete_session(&self, session_id: &str) -> DuckResult<usize> {
        let samples_deleted = self
            .conn
            .execute("DELETE FROM motion_samples WHERE session_id = ?", [session_id])?;

        let documents_deleted = self
            .conn
            .execute("DELETE FROM sensor_documents WHERE session_id = ?", [session_id])?;

        info!(
            "Deleted session {}: {} motion samples, {} documents",
            session_id, samples_deleted, documents_deleted
        );

        Ok(samples_deleted + documents_deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(i: i64) -> Sample {
        Sample::new(i as f64, 0.5, -0.5, 1_000 + i).unwrap()
    }

    #[test]
    fn stores_and_reads_back_samples_in_order() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let samples: Vec<Sample> = (0..4).map(sample).collect();

        assert_eq!(db.save_samples(&samples, "session_a").unwrap(), 4);
        assert_eq!(db.save_samples(&[], "session_a").unwrap(), 0);

        assert_eq!(db.get_samples_by_session("session_a").unwrap(), samples);
        assert!(db.get_samples_by_session("session_b").unwrap().is_empty());
    }

    #[test]
    fn documents_round_trip_verbatim() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let doc = json!({"x": 1.0, "y": "bad", "note": "kept as sent"});
        db.insert_document("session_a", "sensor/gyro", &doc, 42).unwrap();

        let docs = db.get_documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].payload, doc);
        assert_eq!(docs[0].topic, "sensor/gyro");
        assert_eq!(docs[0].received_at_ms, 42);
    }

    #[test]
    fn sessions_stats_and_delete() {
        let db = DatabaseManager::open_in_memory().unwrap();
        db.save_samples(&[sample(1)], "session_1").unwrap();
        db.insert_document("session_2", "t", &json!({}), 0).unwrap();
        db.insert_document("session_1", "t", &json!({}), 0).unwrap();

        assert_eq!(db.get_all_sessions().unwrap(), vec!["session_2", "session_1"]);
        assert_eq!(db.get_stats().unwrap(), (2, 1));

        assert_eq!(db.delete_session("session_1").unwrap(), 2);
        assert_eq!(db.get_stats().unwrap(), (1, 0));
    }

    #[test]
    fn reopening_file_database_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested/sensor.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };

        {
            let db = DatabaseManager::open(&config).unwrap();
            db.save_samples(&[sample(7)], "s").unwrap();
        }

        let db = DatabaseManager::open(&config).unwrap();
        assert_eq!(db.get_samples_by_session("s").unwrap(), vec![sample(7)]);
    }
}
