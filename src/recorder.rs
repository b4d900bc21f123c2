//! AIR (AI Incident Record) files — portable, tamper-evident audit records,
//! one per LLM interaction, written as `<run_id>.air.json`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema version stamped into every record on write.
pub const AIR_VERSION: &str = "1.0.0";

/// Outcome of a proxied call. `Success` iff the upstream returned a status
/// below 400 with no transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, RunStatus::Error)
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

/// The AIR file format. Immutable after write; raw content lives in the
/// vault, the record carries only references and checksums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub version: String,
    pub run_id: String,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub endpoint: String,
    pub request_vault_ref: String,
    pub response_vault_ref: String,
    pub request_checksum: String,
    pub response_checksum: String,
    pub tokens: Tokens,
    pub duration_ms: u64,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("recorder: create dir {dir}: {source}")]
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("recorder: write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("recorder: read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file exists but is not a valid AIR record.
    #[error("recorder: corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Writes AIR records into a directory.
#[derive(Debug)]
pub struct Writer {
    dir: PathBuf,
}

impl Writer {
    /// Create a writer, creating the output directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| RecorderError::CreateDir {
            dir: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Persist a record as `<run_id>.air.json`, pretty-printed.
    ///
    /// The version field is stamped here; whatever the caller set is
    /// overwritten. The write goes through a temp file and rename so a
    /// crash mid-write never leaves a truncated record behind.
    pub fn write(&self, mut record: Record) -> Result<PathBuf, RecorderError> {
        record.version = AIR_VERSION.to_string();

        let path = self.dir.join(format!("{}.air.json", record.run_id));
        let data = serde_json::to_vec_pretty(&record).map_err(|source| RecorderError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let tmp = self.dir.join(format!(".{}.air.json.tmp", record.run_id));
        fs::write(&tmp, &data).map_err(|source| RecorderError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| RecorderError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

/// Load an AIR record from a file path.
pub fn load(path: impl AsRef<Path>) -> Result<Record, RecorderError> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|source| RecorderError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&data).map_err(|source| RecorderError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}
