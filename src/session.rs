use crate::classification::{Classification, ClassificationEngine, ImportVisibility};
use crate::config::CoreConfig;
use crate::crypto;
use crate::document::DocumentHandle;
use crate::error::{CHMError, Result};
use crate::events::{Event, PluginKind};
use crate::proof::EventSummary;
use crate::tracing_detector::{LayerSource, Thumbnail, TracingDetector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Per-session limits, taken from `CoreConfig` at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_events: usize,
    pub mixed_media_stroke_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

impl From<&CoreConfig> for SessionConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            max_events: config.max_events,
            mixed_media_stroke_threshold: config.mixed_media_stroke_threshold,
        }
    }
}

/// Metadata about the art creation session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub document_name: Option<String>,
    pub canvas_width: Option<u32>,
    pub canvas_height: Option<u32>,
    pub host_version: Option<String>,
    pub os_info: Option<String>,
    /// Free-form host data; copied into the proof's unsigned metadata
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

/// Record of one work in progress.
///
/// Events are append-only and the finalized flag is write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    document: DocumentHandle,
    created_at: DateTime<Utc>,
    events: Vec<Event>,
    pub metadata: SessionMetadata,
    finalized: bool,
    /// Starts at 1 for the default layer
    layer_count: usize,
    /// Active drawing time (excludes AFK periods), reported by the host
    drawing_time_secs: u64,
    import_layers: BTreeSet<String>,
    classifier: ClassificationEngine,
    tracing: TracingDetector,
    config: SessionConfig,
}

impl Session {
    /// Create a new session with default configuration
    pub fn new(document: DocumentHandle) -> Self {
        Self::with_config(document, &CoreConfig::default())
    }

    pub fn with_config(document: DocumentHandle, config: &CoreConfig) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            document,
            created_at: Utc::now(),
            events: Vec::new(),
            metadata: SessionMetadata::default(),
            finalized: false,
            layer_count: 1,
            drawing_time_secs: 0,
            import_layers: BTreeSet::new(),
            classifier: ClassificationEngine::new(),
            tracing: TracingDetector::new(config.tracing.clone()),
            config: SessionConfig::from(config),
        };

        log::info!("Created new CHM session: {} ({})", session.id, session.document);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    pub(crate) fn set_document(&mut self, document: DocumentHandle) {
        self.document = document;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn classifier(&self) -> &ClassificationEngine {
        &self.classifier
    }

    pub fn tracing(&self) -> &TracingDetector {
        &self.tracing
    }

    /// Milliseconds since session creation, for event offsets
    fn offset_now(&self) -> u64 {
        (Utc::now() - self.created_at).num_milliseconds().max(0) as u64
    }

    /// Append an event
    pub fn record(&mut self, event: Event) -> Result<()> {
        self.check_not_finalized()?;
        if let Event::Stroke { pressure, .. } = &event {
            if !pressure.is_finite() {
                return Err(CHMError::invalid_event(format!(
                    "stroke pressure must be finite, got {}",
                    pressure
                )));
            }
        }
        self.check_event_limit()?;

        match &event {
            Event::Stroke { .. } => {
                if self.tracing.note_stroke() {
                    log::debug!("Tracing check due for session {}", self.id);
                }
            }
            Event::LayerAdded { .. } => self.layer_count += 1,
            Event::Import { kind, .. } => {
                log::info!("Import event recorded: {}", kind);
                self.classifier.note_import();
            }
            Event::PluginUsed { name, kind } if kind.is_ai() => {
                self.classifier.note_ai_tool(name);
            }
            Event::PluginUsed { name, .. } => log::info!("Plugin used: {}", name),
            Event::UndoRedo { .. } => {}
        }

        self.events.push(event);
        Ok(())
    }

    /// Record a stroke event
    pub fn record_stroke(&mut self, pressure: f64, brush: Option<String>) -> Result<()> {
        let t = self.offset_now();
        self.record(Event::Stroke { pressure, brush, t })
    }

    /// Record a layer event
    pub fn record_layer_added(&mut self, id: impl Into<String>, kind: impl Into<String>) -> Result<()> {
        let t = self.offset_now();
        self.record(Event::LayerAdded {
            id: id.into(),
            kind: kind.into(),
            t,
        })
    }

    /// Record an import event
    pub fn record_import(&mut self, kind: impl Into<String>) -> Result<()> {
        let t = self.offset_now();
        self.record(Event::Import { kind: kind.into(), t })
    }

    /// Record an undo/redo event (indicates human behavior)
    pub fn record_undo_redo(&mut self, action: impl Into<String>) -> Result<()> {
        let t = self.offset_now();
        self.record(Event::UndoRedo {
            action: action.into(),
            t,
        })
    }

    /// Record a plugin usage event
    pub fn record_plugin_used(&mut self, name: impl Into<String>, kind: PluginKind) -> Result<()> {
        self.record(Event::PluginUsed {
            name: name.into(),
            kind,
        })
    }

    /// Record an import that produced a layer.
    ///
    /// The layer is tracked for visibility checks and, given a thumbnail,
    /// for tracing checks. Registration outlives the layer.
    pub fn register_import(
        &mut self,
        layer_id: impl Into<String>,
        label: impl Into<String>,
        kind: impl Into<String>,
        thumbnail: Option<&Thumbnail>,
    ) -> Result<()> {
        self.record_import(kind)?;

        let layer_id = layer_id.into();
        if let Some(thumbnail) = thumbnail {
            self.tracing.register(layer_id.clone(), label, thumbnail);
        }
        self.import_layers.insert(layer_id);
        Ok(())
    }

    /// Mark AI use detected outside the event stream (e.g. a plugin scan)
    pub fn mark_ai_assisted(&mut self, tool: &str) -> Result<()> {
        self.check_not_finalized()?;
        self.classifier.note_ai_tool(tool);
        Ok(())
    }

    /// Periodic tracing check, driven by a host timer.
    ///
    /// Cheap unless `check_interval` strokes have passed since the last
    /// comparison. Returns the similarity once tracing is declared.
    pub fn check_tracing(&mut self, layers: &dyn LayerSource) -> Option<f64> {
        if self.finalized {
            return self.tracing.traced_similarity();
        }
        let similarity = self.tracing.poll(layers)?;
        self.classifier.mark_traced(similarity);
        Some(similarity)
    }

    /// Whether any import-derived layer reaches the composited output
    pub fn import_visibility(&self, layers: Option<&dyn LayerSource>) -> ImportVisibility {
        let Some(layers) = layers else {
            return ImportVisibility::Unknown;
        };
        if self.import_layers.is_empty() {
            return ImportVisibility::Unknown;
        }
        let any_visible = self
            .import_layers
            .iter()
            .any(|id| layers.layer_visible(id) == Some(true));
        if any_visible {
            ImportVisibility::Visible
        } else {
            ImportVisibility::Hidden
        }
    }

    /// Classify with current signals; visibility is re-checked on every call
    pub fn classify(&mut self, layers: Option<&dyn LayerSource>) -> Classification {
        let visibility = self.import_visibility(layers);
        let strokes = self.stroke_count();
        self.classifier
            .classify(visibility, strokes, self.config.mixed_media_stroke_threshold)
    }

    /// Irreversibly close the session
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(CHMError::AlreadyFinalized);
        }
        self.finalized = true;
        log::info!(
            "Finalized session {} with {} events",
            self.id,
            self.events.len()
        );
        Ok(())
    }

    /// Independent deep copy; the original keeps accepting events
    pub fn snapshot(&self) -> Session {
        self.clone()
    }

    pub fn stroke_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_stroke()).count()
    }

    pub fn undo_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::UndoRedo { .. }))
            .count()
    }

    /// Create aggregated event summary (not raw events for privacy)
    pub fn summary(&self) -> EventSummary {
        let import_count = self
            .events
            .iter()
            .filter(|e| matches!(e, Event::Import { .. }))
            .count();

        let mut plugins_used: Vec<String> = Vec::new();
        for event in &self.events {
            if let Event::PluginUsed { name, .. } = event {
                if !plugins_used.contains(name) {
                    plugins_used.push(name.clone());
                }
            }
        }

        EventSummary {
            total: self.events.len(),
            stroke_count: self.stroke_count(),
            layer_count: self.layer_count,
            import_count,
            undo_redo_count: self.undo_count(),
            session_duration_secs: self.duration_secs(),
            drawing_time_secs: self.drawing_time_secs,
            plugins_used,
        }
    }

    /// Hex SHA-256 of the compact JSON event sequence
    pub fn events_hash(&self) -> Result<String> {
        let events_json = serde_json::to_vec(&self.events)?;
        Ok(crypto::sha256_hash(&events_json))
    }

    /// Span from first to last event, or time since creation with no events
    pub fn duration_secs(&self) -> u64 {
        let mut offsets = self.events.iter().filter_map(Event::offset_ms);
        match offsets.next() {
            Some(first) => {
                let last = offsets.last().unwrap_or(first);
                last.saturating_sub(first) / 1000
            }
            None => (Utc::now() - self.created_at).num_seconds().max(0) as u64,
        }
    }

    /// Drawing time in seconds (excludes AFK periods)
    pub fn drawing_time_secs(&self) -> u64 {
        self.drawing_time_secs
    }

    /// Increment drawing time (called by the host while the user is drawing)
    pub fn add_drawing_time(&mut self, seconds: u64) {
        self.drawing_time_secs = self.drawing_time_secs.saturating_add(seconds);
    }

    /// Set drawing time directly (for session restoration)
    pub fn set_drawing_time(&mut self, seconds: u64) {
        self.drawing_time_secs = seconds;
    }

    fn check_not_finalized(&self) -> Result<()> {
        if self.finalized {
            Err(CHMError::SessionFinalized)
        } else {
            Ok(())
        }
    }

    fn check_event_limit(&self) -> Result<()> {
        if self.events.len() >= self.config.max_events {
            Err(CHMError::EventLimit(self.config.max_events))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing_detector::tests::{split_image, FakeLayers};

    fn session() -> Session {
        Session::new(DocumentHandle::new_ephemeral())
    }

    #[test]
    fn test_session_creation() {
        let session = session();
        assert_eq!(session.event_count(), 0);
        assert_eq!(session.layer_count(), 1);
        assert!(!session.is_finalized());
    }

    #[test]
    fn test_record_stroke() {
        let mut session = session();
        session
            .record_stroke(0.8, Some("Test Brush".to_string()))
            .unwrap();
        assert_eq!(session.event_count(), 1);
        assert_eq!(session.stroke_count(), 1);
    }

    #[test]
    fn test_non_finite_pressure_rejected() {
        let mut session = session();
        session.record_stroke(0.3, None).unwrap();

        for pressure in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = session.record_stroke(pressure, None);
            assert!(matches!(result, Err(CHMError::InvalidEvent(_))));
        }
        assert_eq!(session.event_count(), 1);
        assert_eq!(session.stroke_count(), 1);

        let restored: Session =
            serde_json::from_str(&serde_json::to_string(&session).unwrap()).unwrap();
        assert_eq!(restored.event_count(), 1);
    }

    #[test]
    fn test_event_limit() {
        let config = CoreConfig {
            max_events: 5,
            ..CoreConfig::default()
        };
        let mut session = Session::with_config(DocumentHandle::new_ephemeral(), &config);

        for _ in 0..5 {
            session.record_stroke(1.0, None).unwrap();
        }

        let result = session.record_stroke(1.0, None);
        assert!(matches!(result, Err(CHMError::EventLimit(5))));
    }

    #[test]
    fn test_finalized_session_rejects_events() {
        let mut session = session();
        session.record_stroke(0.5, None).unwrap();
        session.finalize().unwrap();

        assert!(matches!(
            session.record_stroke(0.5, None),
            Err(CHMError::SessionFinalized)
        ));
        assert!(matches!(
            session.record_plugin_used("x", PluginKind::Filter),
            Err(CHMError::SessionFinalized)
        ));
        assert!(session.mark_ai_assisted("x").is_err());
        assert!(matches!(session.finalize(), Err(CHMError::AlreadyFinalized)));
        assert_eq!(session.event_count(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut session = session();
        session.record_stroke(0.5, None).unwrap();

        let snapshot = session.snapshot();
        session.record_stroke(0.6, None).unwrap();
        session.record_layer_added("layer-2", "paintlayer").unwrap();

        assert_eq!(snapshot.event_count(), 1);
        assert_eq!(snapshot.layer_count(), 1);
        assert_eq!(session.event_count(), 3);
        assert_eq!(snapshot.id(), session.id());
    }

    #[test]
    fn test_summary_counts() {
        let mut session = session();
        for _ in 0..3 {
            session.record_stroke(0.5, None).unwrap();
        }
        session.record_layer_added("layer-2", "paintlayer").unwrap();
        session.record_undo_redo("undo").unwrap();
        session.record_plugin_used("Blur", PluginKind::Filter).unwrap();
        session.record_plugin_used("Blur", PluginKind::Filter).unwrap();
        session.add_drawing_time(30);
        session.add_drawing_time(12);

        let summary = session.summary();
        assert_eq!(summary.total, 7);
        assert_eq!(summary.stroke_count, 3);
        assert_eq!(summary.layer_count, 2);
        assert_eq!(summary.import_count, 0);
        assert_eq!(summary.undo_redo_count, 1);
        assert_eq!(summary.drawing_time_secs, 42);
        assert_eq!(summary.plugins_used, vec!["Blur".to_string()]);
    }

    #[test]
    fn test_ai_plugin_classifies_ai_assisted() {
        let mut session = session();
        session
            .record_plugin_used("Diffusion", PluginKind::AiGeneration)
            .unwrap();
        assert_eq!(session.classify(None), Classification::AIAssisted);
        assert!(session.classifier().ai_tools_used());
    }

    #[test]
    fn test_mark_ai_assisted() {
        let mut session = session();
        session.mark_ai_assisted("Scanner found: upscaler").unwrap();
        assert_eq!(session.classify(None), Classification::AIAssisted);
        // no event is recorded for host-side detection
        assert_eq!(session.event_count(), 0);
    }

    #[test]
    fn test_import_visibility_decides_mixed_media() {
        let mut session = session();
        session
            .register_import("ref-layer", "reference.png", "file_layer", None)
            .unwrap();
        for _ in 0..20 {
            session.record_stroke(0.5, None).unwrap();
        }

        let visible = FakeLayers {
            paint: vec![],
            visible: vec![("ref-layer".to_string(), true)],
        };
        let hidden = FakeLayers {
            paint: vec![],
            visible: vec![("ref-layer".to_string(), false)],
        };
        let deleted = FakeLayers {
            paint: vec![],
            visible: vec![],
        };

        assert_eq!(session.classify(Some(&visible)), Classification::MixedMedia);
        assert_eq!(session.classify(Some(&hidden)), Classification::HumanMade);
        assert_eq!(session.import_visibility(Some(&deleted)), ImportVisibility::Hidden);
        assert_eq!(session.classify(None), Classification::HumanMade);
    }

    #[test]
    fn test_tracing_check_is_sticky() {
        let mut session = session();
        session
            .register_import("ref-layer", "reference.png", "reference_image", Some(&split_image(false)))
            .unwrap();

        let traced = FakeLayers {
            paint: vec![split_image(false)],
            visible: vec![("ref-layer".to_string(), false)],
        };
        for _ in 0..9 {
            session.record_stroke(0.5, None).unwrap();
        }
        assert_eq!(session.check_tracing(&traced), None);

        session.record_stroke(0.5, None).unwrap();
        assert_eq!(session.check_tracing(&traced), Some(1.0));

        // import deleted and painting continues
        let gone = FakeLayers {
            paint: vec![split_image(true)],
            visible: vec![],
        };
        for _ in 0..10 {
            session.record_stroke(0.5, None).unwrap();
        }
        session.check_tracing(&gone);
        assert_eq!(session.classify(Some(&gone)), Classification::Traced);
    }

    #[test]
    fn test_events_hash_tracks_events() {
        let mut session = session();
        session.record_stroke(0.5, None).unwrap();
        let first = session.events_hash().unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, session.snapshot().events_hash().unwrap());

        session.record_stroke(0.5, None).unwrap();
        assert_ne!(first, session.events_hash().unwrap());
    }

    #[test]
    fn test_duration_spans_events() {
        let mut session = session();
        session
            .record(Event::Stroke {
                pressure: 0.5,
                brush: None,
                t: 1_000,
            })
            .unwrap();
        session
            .record(Event::PluginUsed {
                name: "Blur".to_string(),
                kind: PluginKind::Filter,
            })
            .unwrap();
        session
            .record(Event::UndoRedo {
                action: "undo".to_string(),
                t: 91_500,
            })
            .unwrap();
        assert_eq!(session.duration_secs(), 90);
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let mut session = session();
        session.record_stroke(0.5, None).unwrap();
        session.mark_ai_assisted("Diffusion").unwrap();
        session.metadata.document_name = Some("cat".to_string());

        let json = serde_json::to_string(&session).unwrap();
        let mut restored: Session = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id(), session.id());
        assert_eq!(restored.events(), session.events());
        assert_eq!(restored.classify(None), Classification::AIAssisted);
        assert_eq!(restored.metadata, session.metadata);
    }
}
