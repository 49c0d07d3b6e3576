use crate::error::{RepostatsError, Result};
use crate::model::{RecordsOutput, RepositoryRecord, SCHEMA_VERSION};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Save records as pretty-printed JSON, replacing `path`.
pub fn write_json(records: &[RepositoryRecord], path: &Path) -> Result<()> {
    let output = RecordsOutput {
        version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        records: records.to_vec(),
    };
    let mut bytes = serde_json::to_vec_pretty(&output)?;
    bytes.push(b'\n');
    std::fs::write(path, bytes)?;
    info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

pub fn read_json(path: &Path) -> Result<Vec<RepositoryRecord>> {
    let contents = std::fs::read_to_string(path)?;

    let header: VersionHeader = serde_json::from_str(&contents)?;
    if header.version != SCHEMA_VERSION {
        return Err(RepostatsError::Schema {
            expected: SCHEMA_VERSION,
            found: header.version,
        });
    }

    let output: RecordsOutput = serde_json::from_str(&contents)?;
    Ok(output.records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample_record;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn records_survive_a_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut first = sample_record("widgets");
        first.statistics.average_issue_days = 1.0 / 3.0;
        let mut second = sample_record("gadgets");
        second.latest_release = None;
        second.info.extra.insert("topics".into(), serde_json::json!(["a", "b"]));
        let records = vec![first, second];

        write_json(&records, &path).unwrap();
        let loaded = read_json(&path).unwrap();

        assert_eq!(loaded, records);
    }

    #[test]
    fn file_carries_schema_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        write_json(&[sample_record("widgets")], &path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], SCHEMA_VERSION);
        assert!(raw["generated_at"].is_string());
        assert_eq!(raw["records"][0]["info"]["watchers"], 17);
    }

    #[test]
    fn empty_list_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");

        write_json(&[], &path).unwrap();

        assert!(read_json(&path).unwrap().is_empty());
    }

    #[test]
    fn other_schema_versions_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(&path, r#"{"version": 99, "records": [{"shape": "unknown"}]}"#).unwrap();

        let err = read_json(&path).unwrap_err();

        assert!(matches!(err, RepostatsError::Schema { expected: 1, found: 99 }));
    }

    #[test]
    fn garbage_is_a_serde_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(read_json(&path).unwrap_err(), RepostatsError::Serde(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();

        let err = read_json(&dir.path().join("absent.json")).unwrap_err();

        assert!(matches!(err, RepostatsError::Io(_)));
    }
}
