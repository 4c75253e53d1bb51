use serde::{Deserialize, Serialize};

/// Category of a plugin or tool reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginKind {
    /// Generates image content (diffusion, inpainting, ...)
    AiGeneration,
    /// Edits existing content with a model (upscaling, style transfer, ...)
    AiEditing,
    Filter,
    Utility,
    Other,
}

impl PluginKind {
    /// Whether using this kind of tool makes the artwork AI-assisted
    pub fn is_ai(&self) -> bool {
        matches!(self, PluginKind::AiGeneration | PluginKind::AiEditing)
    }

    /// Parse the free-form plugin type strings hosts report, e.g. "AI_GENERATION"
    pub fn from_label(label: &str) -> Self {
        let upper = label.to_ascii_uppercase();
        // whole-word match, "PAINT" is not an AI tool
        let has_ai_word = upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "AI");
        if upper.contains("GENERATION") {
            PluginKind::AiGeneration
        } else if has_ai_word {
            PluginKind::AiEditing
        } else if upper.contains("FILTER") {
            PluginKind::Filter
        } else if upper.contains("UTILITY") {
            PluginKind::Utility
        } else {
            PluginKind::Other
        }
    }
}

/// A creative action recorded during a session.
///
/// Events carry no coordinates, layer names or wall-clock times: `t` is the
/// offset from session creation in milliseconds. Field order is part of the
/// `events_hash` input and must not be rearranged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A brush stroke
    Stroke {
        pressure: f64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        brush: Option<String>,
        t: u64,
    },

    /// Layer added to the document
    LayerAdded {
        id: String,
        #[serde(rename = "layer_type")]
        kind: String,
        t: u64,
    },

    /// Image or resource imported into the document
    Import {
        kind: String, // "reference_image", "paste", "file_layer", ...
        t: u64,
    },

    /// Undo/Redo action
    UndoRedo {
        action: String, // "undo", "redo"
        t: u64,
    },

    /// Plugin used during session
    PluginUsed { name: String, kind: PluginKind },
}

impl Event {
    /// Offset from session start in milliseconds, when the event carries one
    pub fn offset_ms(&self) -> Option<u64> {
        match self {
            Event::Stroke { t, .. }
            | Event::LayerAdded { t, .. }
            | Event::Import { t, .. }
            | Event::UndoRedo { t, .. } => Some(*t),
            Event::PluginUsed { .. } => None,
        }
    }

    pub fn is_stroke(&self) -> bool {
        matches!(self, Event::Stroke { .. })
    }

    /// True for a `PluginUsed` event whose tool is AI-driven
    pub fn is_ai_tool(&self) -> bool {
        matches!(self, Event::PluginUsed { kind, .. } if kind.is_ai())
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            Event::Stroke { .. } => "Brush stroke".to_string(),
            Event::LayerAdded { kind, .. } => format!("Layer added ({})", kind),
            Event::Import { kind, .. } => format!("Import ({})", kind),
            Event::UndoRedo { action, .. } => action.clone(),
            Event::PluginUsed { name, .. } => format!("Plugin used: {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::Stroke {
            pressure: 0.8,
            brush: Some("Basic Brush".to_string()),
            t: 1500,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"Stroke","pressure":0.8,"brush":"Basic Brush","t":1500}"#
        );

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn test_stroke_without_brush_omits_field() {
        let event = Event::Stroke {
            pressure: 1.0,
            brush: None,
            t: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("brush"));
    }

    #[test]
    fn test_event_description() {
        let event = Event::PluginUsed {
            name: "AI Diffusion".to_string(),
            kind: PluginKind::AiGeneration,
        };

        assert!(event.description().contains("AI Diffusion"));
        assert!(event.is_ai_tool());
        assert_eq!(event.offset_ms(), None);
    }

    #[test]
    fn test_plugin_kind_from_label() {
        assert_eq!(PluginKind::from_label("AI_GENERATION"), PluginKind::AiGeneration);
        assert_eq!(PluginKind::from_label("ai-upscaler"), PluginKind::AiEditing);
        assert_eq!(PluginKind::from_label("FILTER"), PluginKind::Filter);
        assert_eq!(PluginKind::from_label("UTILITY"), PluginKind::Utility);
        assert_eq!(PluginKind::from_label("brushes"), PluginKind::Other);
        assert_eq!(PluginKind::from_label("PAINT_TOOLS"), PluginKind::Other);
        assert!(!PluginKind::Filter.is_ai());
    }

    #[test]
    fn test_plugin_kind_wire_names() {
        let json = serde_json::to_string(&PluginKind::AiGeneration).unwrap();
        assert_eq!(json, "\"AI_GENERATION\"");
    }
}
