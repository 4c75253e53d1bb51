use crate::classification::Classification;
use crate::config::CoreConfig;
use crate::crypto;
use crate::error::{CHMError, Result};
use crate::proof::Proof;
use crate::signing::ascii_json_string;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const LOG_FILE: &str = "public_timestamp_log.jsonl";
const SECRET_FILE: &str = ".log_secret";

/// Unsigned context stored alongside an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogContext {
    pub session_id: String,
    pub classification: Classification,
}

impl LogContext {
    pub fn from_proof(proof: &Proof) -> Self {
        Self {
            session_id: proof.session_id.clone(),
            classification: proof.classification,
        }
    }
}

/// One line of the log. `signature` covers index, proof_hash and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub proof_hash: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<LogContext>,
    pub signature: String,
}

/// Append-only JSONL ledger of proof hashes, one HMAC per entry
#[derive(Debug)]
pub struct TransparencyLog {
    path: PathBuf,
    secret: String,
}

impl TransparencyLog {
    /// Open the log in `dir`, generating the secret on first use
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_at(dir.join(LOG_FILE), dir.join(SECRET_FILE))
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        Self::open_at(config.transparency_log_path(), config.log_secret_path())
    }

    fn open_at(path: PathBuf, secret_path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let secret = load_or_create_secret(&secret_path)?;
        log::debug!("Opened transparency log at {}", path.display());
        Ok(Self { path, secret })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of well-formed entries; the next index is this plus one.
    ///
    /// Blank lines and lines torn by an interrupted append are not counted.
    pub fn len(&self) -> Result<u64> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if serde_json::from_str::<LogEntry>(&line).is_ok() {
                count += 1;
            } else if !line.trim().is_empty() {
                log::warn!("Ignoring unreadable transparency log line");
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append a signed entry for `proof_hash`
    pub fn submit(&self, proof_hash: &str, context: Option<LogContext>) -> Result<LogEntry> {
        let index = self.len()? + 1;
        let timestamp = format_timestamp(Utc::now());
        let signature = sign_entry(&self.secret, index, proof_hash, &timestamp)?;

        let entry = LogEntry {
            index,
            proof_hash: proof_hash.to_string(),
            timestamp,
            context,
            signature,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        if ends_mid_line(&mut file)? {
            // never glue an entry onto a partial line
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())?;
        file.sync_all()?;

        log::info!("Transparency log entry #{} appended", index);
        Ok(entry)
    }

    /// Submit the hash of `proof` with its session context
    pub fn submit_proof(&self, proof: &Proof) -> Result<LogEntry> {
        let proof_hash = proof.proof_hash()?;
        self.submit(&proof_hash, Some(LogContext::from_proof(proof)))
    }

    /// All entries in file order
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(&line)
                .map_err(|e| CHMError::schema(format!("log line {}: {}", n + 1, e)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Recompute the entry's HMAC and compare in constant time
    pub fn verify_entry(&self, entry: &LogEntry) -> bool {
        let Ok(expected) = sign_entry(&self.secret, entry.index, &entry.proof_hash, &entry.timestamp)
        else {
            return false;
        };
        let (Ok(expected), Ok(actual)) = (hex::decode(expected), hex::decode(&entry.signature))
        else {
            return false;
        };
        if expected.len() != actual.len() {
            return false;
        }
        expected.ct_eq(actual.as_slice()).into()
    }

    /// Indices run 1, 2, 3, ... and every entry verifies
    pub fn verify_all(&self) -> Result<bool> {
        let entries = self.entries()?;
        for (i, entry) in entries.iter().enumerate() {
            if entry.index != i as u64 + 1 {
                log::warn!(
                    "Transparency log gap: expected index {}, found {}",
                    i + 1,
                    entry.index
                );
                return Ok(false);
            }
            if !self.verify_entry(entry) {
                log::warn!("Transparency log entry #{} failed verification", entry.index);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// True when the file is non-empty and its last byte is not a newline
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// `{"index": 1, "proof_hash": "...", "timestamp": "..."}`: sorted keys and
/// spaced separators
fn canonical_entry(index: u64, proof_hash: &str, timestamp: &str) -> Result<String> {
    Ok(format!(
        "{{\"index\": {}, \"proof_hash\": {}, \"timestamp\": {}}}",
        index,
        ascii_json_string(proof_hash)?,
        ascii_json_string(timestamp)?
    ))
}

fn sign_entry(secret: &str, index: u64, proof_hash: &str, timestamp: &str) -> Result<String> {
    let canonical = canonical_entry(index, proof_hash, timestamp)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CHMError::crypto(format!("Invalid log secret: {}", e)))?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn load_or_create_secret(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let secret = text.trim().to_string();
            if secret.is_empty() {
                return Err(CHMError::config(format!("{} is empty", path.display())));
            }
            Ok(secret)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            let secret = hex::encode(bytes);
            crypto::write_secret_file(path, &secret)?;
            log::info!("Generated transparency log secret at {}", path.display());
            Ok(secret)
        }
        Err(e) => Err(e.into()),
    }
}
