//! Request-info record files
//!
//! Add runs leave one JSON line per successful write so a later get run can
//! read the same entries back:
//!
//! ```text
//! {"kind":"nym","data":{"target_did":"V4SGRU86Z58d6TV7PBUe6f"}}
//! {"kind":"schema","data":{"name":"testQ2X...","version":"1.0","dest":"Th7MpTaRZVRYnPiabds81Y"}}
//! ```

use crate::ledger::Did;
use crate::requests::RequestKind;
use crate::util::{random_string, UPPERCASE_AND_DIGITS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What a get run needs to look up one earlier write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum RequestInfo {
    Nym {
        target_did: Did,
    },
    Schema {
        name: String,
        version: String,
        dest: Did,
    },
    Attribute {
        target_did: Did,
        raw_name: String,
    },
    Claim {
        issuer_did: Did,
        seq_no: u64,
        signature_type: String,
    },
}

impl RequestInfo {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestInfo::Nym { .. } => RequestKind::Nym,
            RequestInfo::Schema { .. } => RequestKind::Schema,
            RequestInfo::Attribute { .. } => RequestKind::Attribute,
            RequestInfo::Claim { .. } => RequestKind::Claim,
        }
    }
}

/// Directory holding the info files of one request kind
pub fn kind_dir(info_dir: &Path, kind: RequestKind) -> PathBuf {
    info_dir.join(kind.as_str())
}

/// `<info_dir>/<kind>/<kind>_<threads>_<dd-mm-YYYY_HH-MM-SS>_<tag>.txt`
///
/// The random tag keeps concurrent clients started in the same second apart.
pub fn info_file_path(info_dir: &Path, kind: RequestKind, threads: usize) -> PathBuf {
    let stamp = chrono::Local::now().format("%d-%m-%Y_%H-%M-%S");
    let tag = random_string("", "", 6, UPPERCASE_AND_DIGITS);
    kind_dir(info_dir, kind).join(format!("{}_{}_{}_{}.txt", kind.as_str(), threads, stamp, tag))
}

/// Write one JSON line per record, creating parent directories as needed
pub fn write_records(path: &Path, records: &[RequestInfo]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    debug!(path = %path.display(), records = records.len(), "Wrote request info");
    Ok(())
}

/// All `.txt` info files for `kind`, sorted by name
pub fn collect_info_files(info_dir: &Path, kind: RequestKind) -> Result<Vec<PathBuf>> {
    let dir = kind_dir(info_dir, kind);
    let mut files = Vec::new();

    if dir.is_dir() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "txt") {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        bail!("Cannot find any request info in {}", dir.display());
    }

    files.sort();
    Ok(files)
}

/// Read every record from `files`.
///
/// Blank lines are skipped; lines that do not parse are logged and skipped.
pub fn read_records(files: &[PathBuf]) -> Result<Vec<RequestInfo>> {
    let mut records = Vec::new();

    for path in files {
        let file =
            fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RequestInfo>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "Skipping malformed request info"
                ),
            }
        }
    }

    Ok(records)
}
