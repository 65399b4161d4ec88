use duckdb::{Connection, Result as DuckResult};
use log::info;

pub struct DatabaseSchema;

impl DatabaseSchema {
    pub fn create_tables_and_migrate(conn: &Connection) -> DuckResult<()> {
        Self::create_basic_tables(conn)?;
        info!("Basic database tables created successfully");

        Self::migrate_topic_column(conn)?;

        info!("Database migration completed successfully");
        Ok(())
    }

    fn create_basic_tables(conn: &Connection) -> DuckResult<()> {
        conn.execute("CREATE SEQUENCE IF NOT EXISTS sensor_documents_seq", [])?;

        // one row per received message, payload kept verbatim
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sensor_documents (
                id INTEGER PRIMARY KEY DEFAULT nextval('sensor_documents_seq'),
                session_id VARCHAR,
                payload VARCHAR,
                received_at_ms BIGINT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute("CREATE SEQUENCE IF NOT EXISTS motion_samples_seq", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS motion_samples (
                id INTEGER PRIMARY KEY DEFAULT nextval('motion_samples_seq'),
                session_id VARCHAR,
                timestamp_ms BIGINT,
                x DOUBLE,
                y DOUBLE,
                z DOUBLE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(())
    }

    // Databases created before documents were tagged with their topic.
    fn migrate_topic_column(conn: &Connection) -> DuckResult<()> {
        if Self::column_exists(conn, "sensor_documents", "topic")? {
            info!("Topic column already exists in sensor_documents table");
            return Ok(());
        }

        info!("Adding topic column to sensor_documents table");
        conn.execute("ALTER TABLE sensor_documents ADD COLUMN topic VARCHAR DEFAULT ''", [])?;
        Ok(())
    }

    fn column_exists(conn: &Connection, table_name: &str, column_name: &str) -> DuckResult<bool> {
        conn.query_row(
            "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = ? AND column_name = ?",
            [table_name, column_name],
            |row| Ok(row.get::<_, i64>(0)? > 0),
        )
    }
}
