use crate::error::{IngestError, Result};
use crate::schedule::loader::count_records;
use crate::schedule::tables::required_tables;
use std::path::Path;

/// Checks every required file is present in `dir` and holds at least one
/// data row below its header.
///
/// Stops at the first failure, in table order. Optional files are not
/// checked.
pub fn validate_bundle_dir(dir: &Path) -> Result<()> {
    for table in required_tables() {
        let path = dir.join(table.file_name);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::MissingRequiredFile(table.file_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.len() == 0 || count_records(&path)? == 0 {
            return Err(IngestError::EmptyTable(table.file_name.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::tables::GTFS_TABLES;

    fn populate(dir: &Path, skip: &[&str]) {
        for table in GTFS_TABLES.iter().filter(|t| t.required) {
            if !skip.contains(&table.file_name) {
                std::fs::write(dir.join(table.file_name), "id\n1\n").unwrap();
            }
        }
    }

    #[test]
    fn test_complete_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &[]);
        assert!(validate_bundle_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_missing_stops_is_named() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &["stops.txt"]);

        let err = validate_bundle_dir(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::MissingRequiredFile(ref f) if f == "stops.txt"));
    }

    #[test]
    fn test_optional_files_not_required() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &[]);
        assert!(!dir.path().join("shapes.txt").exists());
        assert!(validate_bundle_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_empty_required_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &[]);
        std::fs::write(dir.path().join("calendar.txt"), "").unwrap();

        let err = validate_bundle_dir(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyTable(ref f) if f == "calendar.txt"));
    }

    #[test]
    fn test_header_only_required_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &[]);
        std::fs::write(dir.path().join("agency.txt"), "agency_id,agency_name\n").unwrap();

        let err = validate_bundle_dir(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyTable(ref f) if f == "agency.txt"));
    }

    #[test]
    fn test_first_missing_file_in_table_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &["routes.txt", "stops.txt"]);

        let err = validate_bundle_dir(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::MissingRequiredFile(ref f) if f == "routes.txt"));
    }
}
