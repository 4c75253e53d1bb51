use crate::config::CoreConfig;
use crate::document::DocumentHandle;
use crate::error::{CHMError, Result};
use crate::session::Session;
use std::collections::HashMap;

/// Owns the live session of every open document
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<DocumentHandle, Session>,
    config: CoreConfig,
}

impl SessionRegistry {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    /// Session for `document`, created on first use
    pub fn open(&mut self, document: &DocumentHandle) -> &mut Session {
        let config = &self.config;
        self.sessions.entry(document.clone()).or_insert_with(|| {
            log::info!("Starting session for document {}", document);
            Session::with_config(document.clone(), config)
        })
    }

    /// Adopt a session restored from storage; fails if the document already has one
    pub fn insert(&mut self, session: Session) -> Result<()> {
        let document = session.document().clone();
        if self.sessions.contains_key(&document) {
            return Err(CHMError::DocumentExists(document.to_string()));
        }
        self.sessions.insert(document, session);
        Ok(())
    }

    pub fn get(&self, document: &DocumentHandle) -> Option<&Session> {
        self.sessions.get(document)
    }

    pub fn get_mut(&mut self, document: &DocumentHandle) -> Option<&mut Session> {
        self.sessions.get_mut(document)
    }

    pub fn contains(&self, document: &DocumentHandle) -> bool {
        self.sessions.contains_key(document)
    }

    pub fn remove(&mut self, document: &DocumentHandle) -> Option<Session> {
        self.sessions.remove(document)
    }

    /// Re-key a session, e.g. when an unsaved document is saved.
    ///
    /// Either the session moves and answers only to `new`, or nothing changes.
    pub fn migrate(&mut self, old: &DocumentHandle, new: &DocumentHandle) -> Result<()> {
        if old == new {
            return if self.contains(old) {
                Ok(())
            } else {
                Err(CHMError::unknown_document(old))
            };
        }
        if self.sessions.contains_key(new) {
            return Err(CHMError::DocumentExists(new.to_string()));
        }
        let mut session = self
            .sessions
            .remove(old)
            .ok_or_else(|| CHMError::unknown_document(old))?;

        session.set_document(new.clone());
        self.sessions.insert(new.clone(), session);
        log::info!("Migrated session from {} to {}", old, new);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentHandle> {
        self.sessions.keys()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}
