//! Bundle extraction.

use crate::error::{IngestError, Result};
use crate::schedule::tables::table_for_file;
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Extracts the recognized members of the zip at `zip_path` into a new
/// `gtfs-ingest-*` directory, flattening any folders inside the archive.
///
/// Unrecognized members are skipped with a warning. A directory member, or
/// two members that flatten to the same name, make the whole bundle malformed.
/// The directory is removed when the returned [`TempDir`] is dropped.
pub fn extract_bundle(zip_path: &Path) -> Result<TempDir> {
    let dir = tempfile::Builder::new().prefix("gtfs-ingest-").tempdir()?;
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = HashSet::new();

    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        let name = member.name().to_string();

        if member.is_dir() {
            return Err(IngestError::DirectoryEntry(name));
        }

        let file_name = name.rsplit('/').next().unwrap_or(&name);
        if table_for_file(file_name).is_none() {
            warn!(member = %name, "Unrecognized archive member, skipping");
            continue;
        }
        if !extracted.insert(file_name.to_string()) {
            return Err(IngestError::DuplicateMember(file_name.to_string()));
        }

        let dst_path = dir.path().join(file_name);
        let mut dst = File::create(&dst_path)?;
        let bytes = io::copy(&mut member, &mut dst)?;
        debug!(member = %name, dst = %dst_path.display(), bytes, "Extracted");
    }

    info!(zip = %zip_path.display(), dir = %dir.path().display(), "Extracted bundle");
    Ok(dir)
}
