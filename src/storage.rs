use crate::config::CoreConfig;
use crate::crypto::{self, EncryptedBlob, EncryptionKey};
use crate::document::DocumentHandle;
use crate::error::{CHMError, Result};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// On-disk form of a stored session
#[derive(Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
enum Envelope {
    Plain { session: Box<Session> },
    Encrypted { blob: EncryptedBlob },
}

/// Persists live sessions so they survive a host restart.
///
/// Each session is `<key>.json` under the sessions directory, AES-256-GCM
/// encrypted when the store has a key.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    key: Option<EncryptionKey>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, key: Option<EncryptionKey>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, key })
    }

    /// Store under `config.sessions_dir()`; the key is used only if
    /// `encrypt_sessions` is set
    pub fn from_config(config: &CoreConfig, key: Option<EncryptionKey>) -> Result<Self> {
        let key = if config.encrypt_sessions { key } else { None };
        Self::new(config.sessions_dir(), key)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !Self::is_valid_key(key) {
            return Err(CHMError::config(format!("Invalid session storage key {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    pub fn save(&self, key: &str, session: &Session) -> Result<()> {
        let path = self.path_for(key)?;
        let envelope = match &self.key {
            Some(enc_key) => {
                let plain = serde_json::to_vec(session)?;
                Envelope::Encrypted {
                    blob: crypto::encrypt_data(&plain, enc_key)?,
                }
            }
            None => Envelope::Plain {
                session: Box::new(session.clone()),
            },
        };

        // write then rename so a crash never leaves a torn file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        std::fs::rename(&tmp, &path)?;

        log::debug!(
            "Saved session {} ({} events) as {}",
            session.id(),
            session.event_count(),
            key
        );
        Ok(())
    }

    /// `Ok(None)` when nothing is stored under `key`
    pub fn load(&self, key: &str) -> Result<Option<Session>> {
        let path = self.path_for(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session = match serde_json::from_slice::<Envelope>(&bytes)? {
            Envelope::Plain { session } => *session,
            Envelope::Encrypted { blob } => {
                let enc_key = self.key.as_ref().ok_or_else(|| {
                    CHMError::crypto(format!("Session {} is encrypted but no key was given", key))
                })?;
                let plain = crypto::decrypt_data(&blob, enc_key)?;
                serde_json::from_slice(&plain)?
            }
        };

        log::debug!("Loaded session {} from {}", session.id(), key);
        Ok(Some(session))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Returns whether a file was removed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored keys, sorted. Files whose stem is not a valid key are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if Self::is_valid_key(stem) => keys.push(stem.to_string()),
                _ => log::debug!("Skipping foreign file in session store: {}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Delete sessions not modified for `max_age_days`; returns how many
    pub fn cleanup_older_than(&self, max_age_days: u64) -> Result<usize> {
        let max_age = Duration::from_secs(max_age_days.saturating_mul(86_400));
        let now = SystemTime::now();
        let mut removed = 0;

        for key in self.list()? {
            let path = self.path_for(&key)?;
            let modified = std::fs::metadata(&path)?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                std::fs::remove_file(&path)?;
                log::info!(
                    "Deleted old session: {} ({:.1} days old)",
                    key,
                    age.as_secs_f64() / 86_400.0
                );
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Stable storage key for a saved document: SHA-256 of `path:inode`.
///
/// The inode keeps the key stable across saves that rewrite the file.
pub fn storage_key_for_file(path: &Path) -> Result<String> {
    let metadata = std::fs::metadata(path)?;
    #[cfg(unix)]
    let inode = {
        use std::os::unix::fs::MetadataExt;
        metadata.ino()
    };
    #[cfg(not(unix))]
    let inode = {
        let _ = &metadata;
        0u64
    };

    Ok(crypto::sha256_hash(
        format!("{}:{}", path.display(), inode).as_bytes(),
    ))
}

/// Storage key for any document; unsaved documents use their id
pub fn storage_key_for_document(document: &DocumentHandle) -> Result<String> {
    match document {
        DocumentHandle::Persistent(path) => storage_key_for_file(path),
        DocumentHandle::Ephemeral(id) => Ok(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_strokes(n: usize) -> Session {
        let mut session = Session::new(DocumentHandle::new_ephemeral());
        for _ in 0..n {
            session.record_stroke(0.5, None).unwrap();
        }
        session
    }

    #[test]
    fn test_plain_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), None).unwrap();
        let session = session_with_strokes(3);

        store.save("doc-1", &session).unwrap();
        assert!(store.exists("doc-1"));

        let loaded = store.load("doc-1").unwrap().unwrap();
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.events(), session.events());
        assert!(store.load("doc-2").unwrap().is_none());
    }

    #[test]
    fn test_encrypted_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let key = EncryptionKey::generate();
        let store = SessionStore::new(dir.path(), Some(key.clone())).unwrap();
        let session = session_with_strokes(2);
        store.save("doc-1", &session).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("doc-1.json")).unwrap();
        assert!(raw.contains("\"format\":\"encrypted\""));
        assert!(!raw.contains(&session.id().to_string()));

        let loaded = store.load("doc-1").unwrap().unwrap();
        assert_eq!(loaded.event_count(), 2);

        let keyless = SessionStore::new(dir.path(), None).unwrap();
        assert!(keyless.load("doc-1").is_err());

        let wrong = SessionStore::new(dir.path(), Some(EncryptionKey::generate())).unwrap();
        assert!(wrong.load("doc-1").is_err());
    }

    #[test]
    fn test_list_delete_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), None).unwrap();
        store.save("b", &session_with_strokes(1)).unwrap();
        store.save("a", &session_with_strokes(1)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());

        assert_eq!(store.cleanup_older_than(30).unwrap(), 0);
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(store.cleanup_older_than(0).unwrap(), 1);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_files_do_not_block_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), None).unwrap();
        store.save("doc-1", &session_with_strokes(1)).unwrap();
        std::fs::write(dir.path().join("my file.json"), "{}").unwrap();
        std::fs::write(dir.path().join(".json"), "{}").unwrap();

        assert_eq!(store.list().unwrap(), vec!["doc-1".to_string()]);
        assert_eq!(store.cleanup_older_than(u64::MAX).unwrap(), 0);

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(store.cleanup_older_than(0).unwrap(), 1);
        assert!(dir.path().join("my file.json").is_file());
    }

    #[test]
    fn test_rejected_stroke_never_reaches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), None).unwrap();
        let mut session = session_with_strokes(2);
        assert!(session.record_stroke(f64::NAN, None).is_err());

        store.save("doc-1", &session).unwrap();
        let loaded = store.load("doc-1").unwrap().unwrap();
        assert_eq!(loaded.event_count(), 2);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), None).unwrap();
        assert!(store.save("../escape", &session_with_strokes(0)).is_err());
        assert!(!store.exists(""));
    }

    #[test]
    fn test_storage_key_for_file_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.kra");
        std::fs::write(&path, b"v1").unwrap();
        let first = storage_key_for_file(&path).unwrap();

        std::fs::write(&path, b"v2, rewritten in place").unwrap();
        assert_eq!(storage_key_for_file(&path).unwrap(), first);
        assert_eq!(first.len(), 64);

        assert!(storage_key_for_file(&dir.path().join("missing.kra")).is_err());
        assert_eq!(
            storage_key_for_document(&DocumentHandle::persistent(&path)).unwrap(),
            first
        );
    }
}
