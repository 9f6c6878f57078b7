//! Topology documents and the data sources declared in them.
//!
//! Only the `datasources` section matters to the poller; nodes, links and the
//! rest of a map document are handled elsewhere.

mod loader;
mod models;

pub use loader::*;
pub use models::*;

use std::path::PathBuf;
use thiserror::Error;

use crate::snmp::InvalidOid;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("data source {data_source:?}: unknown backend type {kind:?}")]
    UnknownBackend { data_source: String, kind: String },
    #[error("{context}: missing field {field:?}")]
    MissingField {
        context: String,
        field: &'static str,
    },
    #[error("{context}: field {field:?} {reason}")]
    InvalidField {
        context: String,
        field: &'static str,
        reason: String,
    },
    #[error("{context}: {source}")]
    InvalidOid {
        context: String,
        #[source]
        source: InvalidOid,
    },
}
