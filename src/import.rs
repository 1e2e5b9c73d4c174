//! Import of TOML dataset files
//!
//! Every `*.toml` file below a directory holds part of a [`Dataset`]; the
//! parts are merged in path order and stored in one transaction.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::models::{Dataset, DatasetCounts};

/// Find all dataset files below `dir`, sorted by path
pub fn find_dataset_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Parse a single dataset file
pub fn parse_dataset_file(path: &Path) -> Result<Dataset> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let data: Dataset =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(data)
}

/// Parse every dataset file below `dir` and store the merged records
pub fn import_directory(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let files = find_dataset_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no dataset files found");
    }

    let mut merged = Dataset::default();
    for path in &files {
        let data = parse_dataset_file(path)?;
        debug!(file = %path.display(), counts = %data.counts(), "parsed dataset file");
        merged.merge(data);
    }

    let counts = db::insert_dataset(conn, &merged)?;
    let stats = ImportStats {
        files: files.len(),
        counts,
    };
    info!(%stats, "import finished");
    Ok(stats)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub counts: DatasetCounts,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Imported {} files: {}", self.files, self.counts)
    }
}
