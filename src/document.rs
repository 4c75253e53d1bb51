use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stable identity of a host document.
///
/// An unsaved document gets a random id; once saved it is known by its path.
/// Moving a session between the two is an explicit `SessionRegistry::migrate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DocumentHandle {
    Ephemeral(Uuid),
    Persistent(PathBuf),
}

impl DocumentHandle {
    pub fn new_ephemeral() -> Self {
        DocumentHandle::Ephemeral(Uuid::new_v4())
    }

    pub fn persistent(path: impl AsRef<Path>) -> Self {
        DocumentHandle::Persistent(path.as_ref().to_path_buf())
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, DocumentHandle::Persistent(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            DocumentHandle::Persistent(path) => Some(path),
            DocumentHandle::Ephemeral(_) => None,
        }
    }

    /// The `document_id` written into proofs
    pub fn document_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentHandle::Ephemeral(id) => write!(f, "unsaved_{}", id),
            DocumentHandle::Persistent(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_ids() {
        let id = Uuid::new_v4();
        let unsaved = DocumentHandle::Ephemeral(id);
        assert_eq!(unsaved.document_id(), format!("unsaved_{}", id));
        assert!(!unsaved.is_persistent());
        assert!(unsaved.path().is_none());

        let saved = DocumentHandle::persistent("/art/cat.kra");
        assert_eq!(saved.document_id(), "/art/cat.kra");
        assert_eq!(saved.path(), Some(Path::new("/art/cat.kra")));
    }

    #[test]
    fn test_ephemeral_handles_are_distinct() {
        assert_ne!(DocumentHandle::new_ephemeral(), DocumentHandle::new_ephemeral());
        assert_eq!(
            DocumentHandle::persistent("/a.kra"),
            DocumentHandle::persistent(PathBuf::from("/a.kra"))
        );
    }

    #[test]
    fn test_handle_serialization() {
        let saved = DocumentHandle::persistent("/art/cat.kra");
        let json = serde_json::to_string(&saved).unwrap();
        assert_eq!(json, r#"{"kind":"persistent","id":"/art/cat.kra"}"#);
        let parsed: DocumentHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, saved);
    }
}
