//! Plain-text extraction for ingestion.
//!
//! Accepts `.txt`, `.md` and `.csv` files, or directories containing them.
//! Markdown is kept verbatim. CSV rows become one line each, with the values
//! joined by spaces and the header row skipped.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::SourceDocument;

const SUPPORTED: [&str; 3] = ["txt", "md", "csv"];

#[derive(Debug, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self { Self }

    /// Load every supported file under `paths`. Directories are walked
    /// recursively; results are ordered by path.
    pub fn load_paths(&self, paths: &[PathBuf]) -> Result<Vec<SourceDocument>> {
        let files = self.list_files(paths);
        if files.is_empty() {
            warn!(inputs = paths.len(), "no supported files found");
            return Ok(vec![]);
        }
        let mut docs = Vec::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            debug!("loading file {}/{}: {}", i + 1, files.len(), path.display());
            docs.push(self.load_file(path)?);
        }
        Ok(docs)
    }

    pub fn load_file(&self, path: &Path) -> Result<SourceDocument> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let text = match extension_of(path).as_deref() {
            Some("csv") => flatten_csv(&read_text(path)?).with_context(|| format!("parsing {}", path.display()))?,
            _ => read_text(path)?,
        };
        Ok(SourceDocument { file_name, text })
    }

    fn list_files(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in paths {
            for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
                let path = entry.path();
                match extension_of(path) {
                    Some(ext) if SUPPORTED.contains(&ext.as_str()) => files.push(path.to_path_buf()),
                    _ => warn!("skipping unsupported file {}", path.display()),
                }
            }
        }
        files.sort();
        files.dedup();
        files
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase)
}

fn read_text(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(String::from_utf8_lossy(&bytes).to_string())
        }
    }
}

/// One line per record, fields joined by a single space.
pub fn flatten_csv(content: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(content.as_bytes());
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        lines.push(record.iter().collect::<Vec<_>>().join(" "));
    }
    Ok(lines.join("\n"))
}
