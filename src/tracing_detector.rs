use crate::config::TracingConfig;
use crate::error::{CHMError, Result};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Side of the downsampled grid; 8x8 gives a 64-bit fingerprint
pub const GRID_SIZE: u32 = 8;

/// RGBA raster handed over by the host (layer thumbnail or import pixels)
#[derive(Debug, Clone)]
pub struct Thumbnail(RgbaImage);

impl Thumbnail {
    /// Wrap raw RGBA8 pixel data, row-major
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CHMError::image("Thumbnail has zero size"));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(CHMError::image(format!(
                "Thumbnail buffer is {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            )));
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(Thumbnail)
            .ok_or_else(|| CHMError::image("Invalid thumbnail buffer"))
    }

    /// Decode an encoded image (PNG, JPEG, ...)
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| CHMError::image(format!("Failed to decode thumbnail: {}", e)))?;
        let rgba = img.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(CHMError::image("Thumbnail has zero size"));
        }
        Ok(Thumbnail(rgba))
    }

    /// Build a thumbnail pixel by pixel
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self>
    where
        F: FnMut(u32, u32) -> [u8; 4],
    {
        if width == 0 || height == 0 {
            return Err(CHMError::image("Thumbnail has zero size"));
        }
        Ok(Thumbnail(RgbaImage::from_fn(width, height, |x, y| {
            Rgba(f(x, y))
        })))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Average hash: bit i (row-major, MSB first) is set iff pixel i of the
    /// 8x8 luminance grid is brighter than the grid mean
    pub fn fingerprint(&self) -> Fingerprint {
        let small = imageops::resize(&self.0, GRID_SIZE, GRID_SIZE, FilterType::Nearest);

        let luma: Vec<u32> = small
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u32
            })
            .collect();

        let sum: u32 = luma.iter().sum();
        let count = luma.len() as u32;

        // pixel > sum / count, kept in integers
        let bits = luma.iter().fold(0u64, |acc, &v| {
            (acc << 1) | u64::from(v * count > sum)
        });
        Fingerprint(bits)
    }
}

/// 64-bit perceptual fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// `1 - hamming(a, b) / 64`
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        let distance = (self.0 ^ other.0).count_ones();
        1.0 - distance as f64 / 64.0
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

/// Fingerprint of one imported layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingRegistration {
    pub fingerprint: Fingerprint,
    pub label: String,
}

/// Host view of the document's layers
pub trait LayerSource {
    /// Thumbnails of the layers the artist paints on
    fn paint_layers(&self) -> Vec<Thumbnail>;

    /// Visibility of a layer by id; `None` once the layer no longer exists
    fn layer_visible(&self, layer_id: &str) -> Option<bool>;
}

/// Layer state captured by the host at one moment, for hosts that cannot
/// be queried through a callback (e.g. the Python bindings)
#[derive(Debug, Clone, Default)]
pub struct LayerSnapshot {
    paint: Vec<Thumbnail>,
    visibility: BTreeMap<String, bool>,
}

impl LayerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paint_layer(mut self, thumbnail: Thumbnail) -> Self {
        self.paint.push(thumbnail);
        self
    }

    pub fn with_layer(mut self, layer_id: impl Into<String>, visible: bool) -> Self {
        self.set_visible(layer_id, visible);
        self
    }

    /// Build from raw host data: `(rgba, width, height)` per paint layer
    /// and a visibility flag per layer id
    pub fn from_raw<I>(paint_layers: Vec<(Vec<u8>, u32, u32)>, visibility: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let paint = paint_layers
            .into_iter()
            .map(|(pixels, width, height)| Thumbnail::from_rgba(width, height, pixels))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            paint,
            visibility: visibility.into_iter().collect(),
        })
    }

    pub fn add_paint_layer(&mut self, thumbnail: Thumbnail) {
        self.paint.push(thumbnail);
    }

    /// Layers never set here report as deleted
    pub fn set_visible(&mut self, layer_id: impl Into<String>, visible: bool) {
        self.visibility.insert(layer_id.into(), visible);
    }
}

impl LayerSource for LayerSnapshot {
    fn paint_layers(&self) -> Vec<Thumbnail> {
        self.paint.clone()
    }

    fn layer_visible(&self, layer_id: &str) -> Option<bool> {
        self.visibility.get(layer_id).copied()
    }
}

/// Compares painted layers against registered imports every
/// `check_interval` strokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingDetector {
    registrations: BTreeMap<String, TracingRegistration>,
    strokes_since_check: usize,
    traced: Option<f64>,
    config: TracingConfig,
}

impl Default for TracingDetector {
    fn default() -> Self {
        Self::new(TracingConfig::default())
    }
}

impl TracingDetector {
    pub fn new(config: TracingConfig) -> Self {
        Self {
            registrations: BTreeMap::new(),
            strokes_since_check: 0,
            traced: None,
            config,
        }
    }

    /// Register an import; survives later deletion of the layer
    pub fn register(&mut self, layer_id: impl Into<String>, label: impl Into<String>, thumbnail: &Thumbnail) {
        let layer_id = layer_id.into();
        let registration = TracingRegistration {
            fingerprint: thumbnail.fingerprint(),
            label: label.into(),
        };
        log::debug!(
            "Registered import {} for tracing checks (fingerprint {})",
            layer_id,
            registration.fingerprint.to_hex()
        );
        self.registrations.insert(layer_id, registration);
    }

    pub fn registrations(&self) -> &BTreeMap<String, TracingRegistration> {
        &self.registrations
    }

    pub fn is_traced(&self) -> bool {
        self.traced.is_some()
    }

    pub fn traced_similarity(&self) -> Option<f64> {
        self.traced
    }

    /// Count a stroke; returns true when a comparison is due
    pub fn note_stroke(&mut self) -> bool {
        if self.registrations.is_empty() || self.traced.is_some() {
            return false;
        }
        self.strokes_since_check += 1;
        self.check_due()
    }

    pub fn check_due(&self) -> bool {
        self.traced.is_none()
            && !self.registrations.is_empty()
            && self.strokes_since_check >= self.config.check_interval
    }

    /// Run the periodic check if due.
    ///
    /// Returns the similarity that declared tracing, now or earlier.
    pub fn poll(&mut self, layers: &dyn LayerSource) -> Option<f64> {
        if self.traced.is_some() {
            return self.traced;
        }
        if !self.check_due() {
            return None;
        }
        self.strokes_since_check = 0;
        self.compare(layers)
    }

    /// Compare every paint layer against every registration immediately
    pub fn compare(&mut self, layers: &dyn LayerSource) -> Option<f64> {
        if self.traced.is_some() {
            return self.traced;
        }

        let mut best: Option<(f64, &str)> = None;
        for layer in layers.paint_layers() {
            let painted = layer.fingerprint();
            for registration in self.registrations.values() {
                let similarity = painted.similarity(&registration.fingerprint);
                if best.map_or(true, |(s, _)| similarity > s) {
                    best = Some((similarity, registration.label.as_str()));
                }
            }
        }

        match best {
            Some((similarity, label)) if similarity >= self.config.similarity_threshold => {
                log::info!(
                    "Tracing detected against import '{}' (similarity {:.2})",
                    label,
                    similarity
                );
                self.traced = Some(similarity);
                self.traced
            }
            Some((similarity, _)) => {
                log::debug!("Tracing check below threshold (max similarity {:.2})", similarity);
                None
            }
            None => None,
        }
    }
}
