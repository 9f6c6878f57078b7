//! Scans the maps directory for topology documents.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ConfigError, DataSourceConfig, RawDataSource};

/// The part of a topology document the poller reads.
#[derive(Debug, Default, Deserialize)]
struct TopologyDocument {
    #[serde(default)]
    datasources: Vec<RawDataSource>,
}

/// Load every data source declared in the `*.yaml` documents of `dir`.
///
/// Documents are read in file-name order. A document that cannot be read or
/// parsed is skipped with a warning, as is any data source that fails
/// validation; only a missing or unreadable directory is an error.
pub fn load_data_sources(dir: &Path) -> Result<Vec<DataSourceConfig>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    paths.sort();

    let mut sources = Vec::new();
    for path in paths {
        match load_document(&path) {
            Ok(mut found) => {
                tracing::debug!("Loaded {} data sources from {}", found.len(), path.display());
                sources.append(&mut found);
            }
            Err(e) => tracing::warn!("Skipping topology document: {}", e),
        }
    }

    tracing::info!("Loaded {} data sources from {}", sources.len(), dir.display());
    Ok(sources)
}

/// Load the data sources of a single document.
pub fn load_document(path: &Path) -> Result<Vec<DataSourceConfig>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_document(&text).map_err(|e| ConfigError::Yaml {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse document text, dropping (and logging) invalid data sources.
pub fn parse_document(text: &str) -> Result<Vec<DataSourceConfig>, serde_yaml::Error> {
    // An empty file deserializes to unit, not a mapping.
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let doc: TopologyDocument = serde_yaml::from_str(text)?;
    let mut sources = Vec::with_capacity(doc.datasources.len());
    for raw in doc.datasources {
        match DataSourceConfig::try_from(raw) {
            Ok(ds) => sources.push(ds),
            Err(e) => tracing::warn!("Skipping data source: {}", e),
        }
    }
    Ok(sources)
}
