use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde_json::Value;

use super::manager::{DatabaseManager, StoredDocument};
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::types::ExportResult;

/// Flatten documents into one CSV. Columns are the sorted union of the
/// top-level keys; a key missing from a document is an empty cell.
pub fn write_documents_csv(documents: &[StoredDocument], path: &Path) -> Result<usize, ExportError> {
    let columns: BTreeSet<&str> = documents
        .iter()
        .filter_map(|doc| doc.payload.as_object())
        .flat_map(|object| object.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;

    let mut rows = 0;
    for doc in documents {
        let Some(object) = doc.payload.as_object() else {
            continue;
        };
        let record: Vec<String> = columns
            .iter()
            .map(|column| object.get(*column).map(cell).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Copy `input` to `output`, keeping only rows where every cell is present
/// and numeric. Returns `(kept, dropped)`.
pub fn clean_csv(input: &Path, output: &Path) -> Result<(usize, usize), ExportError> {
    let mut reader = csv::Reader::from_path(input)?;
    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(reader.headers()?)?;

    let (mut kept, mut dropped) = (0, 0);
    for record in reader.records() {
        let record = record?;
        let numeric = record
            .iter()
            .all(|field| !field.trim().is_empty() && field.trim().parse::<f64>().is_ok());
        if numeric {
            writer.write_record(&record)?;
            kept += 1;
        } else {
            dropped += 1;
        }
    }

    writer.flush()?;
    Ok((kept, dropped))
}

/// Write one session's motion samples to `<directory>/<session_id>.csv`.
pub fn export_session_samples(
    db: &DatabaseManager,
    session_id: &str,
    directory: &Path,
) -> Result<(PathBuf, usize), ExportError> {
    let samples = db.get_samples_by_session(session_id)?;
    if samples.is_empty() {
        return Err(ExportError::NoData);
    }

    fs::create_dir_all(directory)?;
    let path = directory.join(format!("{}.csv", session_id));

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["timestamp_ms", "x", "y", "z"])?;
    for sample in &samples {
        writer.write_record(&[
            sample.captured_at().to_string(),
            sample.x().to_string(),
            sample.y().to_string(),
            sample.z().to_string(),
        ])?;
    }
    writer.flush()?;

    info!("Exported session {} to {} ({} rows)", session_id, path.display(), samples.len());
    Ok((path, samples.len()))
}

/// Dump every stored document, then write the cleaned copy next to it.
pub fn export_documents(db: &DatabaseManager, config: &ExportConfig) -> Result<ExportResult, ExportError> {
    let documents = db.get_documents()?;
    if documents.is_empty() {
        return Ok(ExportResult::no_data());
    }

    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let raw_path = directory.join(&config.documents_file);
    let cleaned_path = directory.join(&config.cleaned_file);

    let rows = write_documents_csv(&documents, &raw_path)?;
    info!("Data saved to {} ({} rows)", raw_path.display(), rows);

    let (kept, dropped) = clean_csv(&raw_path, &cleaned_path)?;
    info!(
        "Data cleaned and saved to {} ({} kept, {} dropped)",
        cleaned_path.display(),
        kept,
        dropped
    );

    Ok(ExportResult::new(
        kept,
        dropped,
        format!("Exported {} documents, {} clean rows", rows, kept),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;
    use serde_json::json;

    fn doc(payload: Value) -> StoredDocument {
        StoredDocument {
            session_id: "s".to_string(),
            topic: "sensor/gyro".to_string(),
            payload,
            received_at_ms: 0,
        }
    }

    #[test]
    fn documents_are_flattened_over_key_union() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.csv");
        let docs = vec![
            doc(json!({"x": 1.5, "y": 2, "z": 3})),
            doc(json!({"x": 4, "z": "n/a"})),
            doc(json!("not an object")),
        ];

        assert_eq!(write_documents_csv(&docs, &path).unwrap(), 2);
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "x,y,z\n1.5,2,3\n4,,n/a\n");
    }

    #[test]
    fn cleaning_drops_missing_and_non_numeric_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("clean.csv");
        fs::write(&input, "x,y,z\n1,2,3\n4,,6\n7,abc,9\n-1.5,0,2e3\n").unwrap();

        assert_eq!(clean_csv(&input, &output).unwrap(), (2, 2));
        assert_eq!(fs::read_to_string(&output).unwrap(), "x,y,z\n1,2,3\n-1.5,0,2e3\n");
    }

    #[test]
    fn session_export_writes_samples() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::open_in_memory().unwrap();
        let samples = vec![
            Sample::new(1.0, 2.0, 3.0, 10).unwrap(),
            Sample::new(4.0, 5.0, 6.0, 20).unwrap(),
        ];
        db.save_samples(&samples, "session_x").unwrap();

        let (path, rows) = export_session_samples(&db, "session_x", dir.path()).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "timestamp_ms,x,y,z\n10,1,2,3\n20,4,5,6\n"
        );

        assert!(matches!(
            export_session_samples(&db, "missing", dir.path()),
            Err(ExportError::NoData)
        ));
    }

    #[test]
    fn document_export_produces_raw_and_clean_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::open_in_memory().unwrap();
        db.insert_document("s", "t", &json!({"x": 1, "y": 2, "z": 3}), 1).unwrap();
        db.insert_document("s", "t", &json!({"x": 1, "y": 2}), 2).unwrap();

        let config = ExportConfig {
            directory: dir.path().to_string_lossy().into_owned(),
            ..ExportConfig::default()
        };
        let result = export_documents(&db, &config).unwrap();
        assert_eq!((result.rows_written, result.rows_dropped), (1, 1));
        assert!(dir.path().join(&config.documents_file).exists());
        assert!(dir.path().join(&config.cleaned_file).exists());
    }

    #[test]
    fn empty_store_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseManager::open_in_memory().unwrap();
        let config = ExportConfig {
            directory: dir.path().join("out").to_string_lossy().into_owned(),
            ..ExportConfig::default()
        };
        let result = export_documents(&db, &config).unwrap();
        assert_eq!(result.rows_written, 0);
        assert!(!dir.path().join("out").exists());
    }
}
