use serde::{Deserialize, Serialize};

/// Authorship classification of an artwork.
///
/// Variants are declared from most to least pure, so `Ord` ranks a
/// classification by how much it departs from pure hand work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Drawn by hand with no visible imports, tracing or AI tools
    HumanMade,

    /// Imported imagery is visible in the composited output
    MixedMedia,

    /// High overlap with an imported image was observed
    Traced,

    /// AI generation or editing tools were used
    AIAssisted,
}

impl Classification {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Classification::HumanMade => {
                "This artwork was created entirely by human hand with no AI assistance or tracing"
            }
            Classification::MixedMedia => {
                "This artwork combines hand drawing with visible imported imagery"
            }
            Classification::Traced => {
                "This artwork shows high overlap with imported images (likely traced)"
            }
            Classification::AIAssisted => {
                "This artwork was created with AI assistance (generation or editing tools)"
            }
        }
    }

    /// Get confidence modifier based on classification
    pub fn base_confidence(&self) -> f64 {
        match self {
            Classification::HumanMade => 0.95,
            Classification::MixedMedia => 0.90,
            Classification::Traced => 0.85, // Depends on fingerprint threshold
            Classification::AIAssisted => 0.98, // Easy to detect AI plugins
        }
    }

    /// Whether this state can never be left once reached
    pub fn is_sticky(&self) -> bool {
        matches!(self, Classification::Traced | Classification::AIAssisted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::HumanMade => "HumanMade",
            Classification::MixedMedia => "MixedMedia",
            Classification::Traced => "Traced",
            Classification::AIAssisted => "AIAssisted",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking whether import-derived layers reach the composited output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportVisibility {
    /// At least one import-derived layer is visible
    Visible,
    /// All known import-derived layers are hidden or gone
    Hidden,
    /// The host could not answer
    Unknown,
}

/// Per-session classification state.
///
/// Import registration and the AI and tracing signals only accumulate.
/// Visibility is supplied fresh on every `classify` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEngine {
    ai_tools: Vec<String>,
    tracing_similarity: Option<f64>,
    imports_registered: bool,
    floor: Option<Classification>,
}

impl ClassificationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an AI tool; returns true the first time a given name is seen
    pub fn note_ai_tool(&mut self, name: &str) -> bool {
        self.raise_floor(Classification::AIAssisted);
        if self.ai_tools.iter().any(|t| t == name) {
            return false;
        }
        log::warn!("AI tool detected: {} (session is now AIAssisted)", name);
        self.ai_tools.push(name.to_string());
        true
    }

    /// Latch the tracing flag; later calls keep the first similarity
    pub fn mark_traced(&mut self, similarity: f64) {
        if self.tracing_similarity.is_none() {
            log::warn!("Tracing detected (similarity {:.2})", similarity);
            self.tracing_similarity = Some(similarity);
        }
        self.raise_floor(Classification::Traced);
    }

    pub fn note_import(&mut self) {
        self.imports_registered = true;
    }

    pub fn ai_tools(&self) -> &[String] {
        &self.ai_tools
    }

    pub fn ai_tools_used(&self) -> bool {
        !self.ai_tools.is_empty()
    }

    pub fn tracing_similarity(&self) -> Option<f64> {
        self.tracing_similarity
    }

    pub fn has_imports(&self) -> bool {
        self.imports_registered
    }

    fn raise_floor(&mut self, to: Classification) {
        if self.floor.map_or(true, |f| f < to) {
            self.floor = Some(to);
        }
    }

    /// Classify the session from its current signals.
    ///
    /// Visibility is the source of truth for `MixedMedia`; the stroke-count
    /// heuristic applies only when visibility is `Unknown`.
    pub fn classify(
        &mut self,
        visibility: ImportVisibility,
        stroke_count: usize,
        stroke_threshold: usize,
    ) -> Classification {
        let derived = if !self.ai_tools.is_empty() {
            Classification::AIAssisted
        } else if self.tracing_similarity.is_some() {
            Classification::Traced
        } else if self.imports_registered {
            match visibility {
                ImportVisibility::Visible => Classification::MixedMedia,
                ImportVisibility::Unknown if stroke_count < stroke_threshold => {
                    Classification::MixedMedia
                }
                _ => Classification::HumanMade,
            }
        } else {
            Classification::HumanMade
        };

        let result = match self.floor {
            Some(floor) if floor > derived => floor,
            _ => derived,
        };
        if result.is_sticky() {
            self.raise_floor(result);
        }
        result
    }
}

/// Confidence score in [0, 1] for a classification given session activity
pub fn confidence(
    classification: Classification,
    total_events: usize,
    undo_count: usize,
    duration_secs: u64,
) -> f64 {
    let mut confidence = classification.base_confidence();

    // Adjust based on event count
    if total_events < 10 {
        confidence *= 0.5;
    } else if total_events < 50 {
        confidence *= 0.8;
    }

    if duration_secs < 60 {
        confidence *= 0.7;
    }

    // Healthy undo rate (5-20%) indicates human behavior
    if undo_count > 0 && total_events > 0 {
        let undo_rate = undo_count as f64 / total_events as f64;
        if undo_rate > 0.05 && undo_rate < 0.20 {
            confidence *= 1.1;
        }
    }

    confidence.clamp(0.0, 1.0)
}
