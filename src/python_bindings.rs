// Python surface for the host plugin: sessions, notarizing and verifying.
// Proofs cross the boundary as JSON text.

use crate::config::CoreConfig;
use crate::document::DocumentHandle;
use crate::error::CHMError;
use crate::events::PluginKind;
use crate::session::Session;
use crate::signing::{KeyPair, PublicKey};
use crate::tracing_detector::{LayerSnapshot, LayerSource, Thumbnail};
use crate::verify::Verifier;
use crate::Notary;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::HashMap;
use std::path::Path;

/// Raw RGBA8 pixels of one layer: `(pixels, width, height)`
type RawLayer = (Vec<u8>, u32, u32);

impl From<CHMError> for PyErr {
    fn from(err: CHMError) -> PyErr {
        match err {
            CHMError::SchemaError(_)
            | CHMError::ConfigError(_)
            | CHMError::InvalidEvent(_)
            | CHMError::ImageError(_) => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// Python-wrapped CHM Session
///
/// This is the main interface that the plugin uses to record
/// drawing events.
#[pyclass(name = "Session")]
pub struct PySession {
    inner: Session,
}

#[pymethods]
impl PySession {
    /// Create a session for a saved document path, or an unsaved document
    #[new]
    #[pyo3(signature = (document_path=None))]
    fn new(document_path: Option<String>) -> Self {
        let document = match document_path {
            Some(path) => DocumentHandle::persistent(path),
            None => DocumentHandle::new_ephemeral(),
        };
        PySession {
            inner: Session::new(document),
        }
    }

    #[getter]
    fn id(&self) -> String {
        self.inner.id().to_string()
    }

    #[getter]
    fn document_id(&self) -> String {
        self.inner.document().document_id()
    }

    /// Session start time (ISO 8601)
    #[getter]
    fn start_time(&self) -> String {
        self.inner.created_at().to_rfc3339()
    }

    #[getter]
    fn is_finalized(&self) -> bool {
        self.inner.is_finalized()
    }

    #[getter]
    fn event_count(&self) -> usize {
        self.inner.event_count()
    }

    /// Record a brush stroke event
    ///
    /// Args:
    ///     pressure (float): Brush pressure (0.0 to 1.0)
    ///     brush_name (str, optional): Name of the brush used
    #[pyo3(signature = (pressure, brush_name=None))]
    fn record_stroke(&mut self, pressure: f64, brush_name: Option<String>) -> PyResult<()> {
        Ok(self.inner.record_stroke(pressure, brush_name)?)
    }

    fn record_layer_added(&mut self, layer_id: String, layer_type: String) -> PyResult<()> {
        Ok(self.inner.record_layer_added(layer_id, layer_type)?)
    }

    /// Record an import event
    ///
    /// Args:
    ///     import_type (str): e.g. "reference_image", "paste", "file_layer"
    fn record_import(&mut self, import_type: String) -> PyResult<()> {
        Ok(self.inner.record_import(import_type)?)
    }

    /// Record an import that produced a layer
    ///
    /// Args:
    ///     layer_id (str): Host id of the new layer, used for visibility checks
    ///     label (str): Human-readable name, e.g. the imported file name
    ///     import_type (str): e.g. "reference_image", "paste", "file_layer"
    ///     pixels (bytes, optional): RGBA8 thumbnail of the import, enables tracing checks
    ///     width, height (int): Thumbnail size; required with `pixels`
    #[pyo3(signature = (layer_id, label, import_type, pixels=None, width=0, height=0))]
    fn register_import(
        &mut self,
        layer_id: String,
        label: String,
        import_type: String,
        pixels: Option<Vec<u8>>,
        width: u32,
        height: u32,
    ) -> PyResult<()> {
        let thumbnail = pixels
            .map(|pixels| Thumbnail::from_rgba(width, height, pixels))
            .transpose()?;
        Ok(self
            .inner
            .register_import(layer_id, label, import_type, thumbnail.as_ref())?)
    }

    /// Periodic tracing check; call from a host timer
    ///
    /// Args:
    ///     paint_layers (list): `(pixels, width, height)` RGBA8 thumbnails of paint layers
    ///
    /// Returns:
    ///     float or None: similarity once the session is declared traced
    fn check_tracing(&mut self, paint_layers: Vec<RawLayer>) -> PyResult<Option<f64>> {
        let snapshot = LayerSnapshot::from_raw(paint_layers, Vec::new())?;
        Ok(self.inner.check_tracing(&snapshot))
    }

    /// Record a plugin usage event
    ///
    /// Args:
    ///     plugin_name (str): Name of the plugin used
    ///     plugin_type (str): Type of plugin (e.g., "AI_GENERATION", "FILTER")
    fn record_plugin_used(&mut self, plugin_name: String, plugin_type: String) -> PyResult<()> {
        let kind = PluginKind::from_label(&plugin_type);
        Ok(self.inner.record_plugin_used(plugin_name, kind)?)
    }

    fn record_undo_redo(&mut self, action: String) -> PyResult<()> {
        Ok(self.inner.record_undo_redo(action)?)
    }

    /// Mark the session AI-assisted from a host-side plugin scan
    fn mark_ai_assisted(&mut self, tool_name: String) -> PyResult<()> {
        Ok(self.inner.mark_ai_assisted(&tool_name)?)
    }

    #[pyo3(signature = (document_name=None, canvas_width=None, canvas_height=None, host_version=None, os_info=None))]
    fn set_metadata(
        &mut self,
        document_name: Option<String>,
        canvas_width: Option<u32>,
        canvas_height: Option<u32>,
        host_version: Option<String>,
        os_info: Option<String>,
    ) {
        let metadata = &mut self.inner.metadata;
        metadata.document_name = document_name;
        metadata.canvas_width = canvas_width;
        metadata.canvas_height = canvas_height;
        metadata.host_version = host_version;
        metadata.os_info = os_info;
    }

    fn get_metadata(&self, py: Python<'_>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        let metadata = &self.inner.metadata;
        if let Some(ref doc_name) = metadata.document_name {
            dict.set_item("document_name", doc_name)?;
        }
        if let Some(width) = metadata.canvas_width {
            dict.set_item("canvas_width", width)?;
        }
        if let Some(height) = metadata.canvas_height {
            dict.set_item("canvas_height", height)?;
        }
        if let Some(ref host_version) = metadata.host_version {
            dict.set_item("host_version", host_version)?;
        }
        Ok(dict.into())
    }

    /// Current classification
    ///
    /// Args:
    ///     visibility (dict, optional): layer id -> visible, for registered imports.
    ///         Without it the stroke-count fallback decides MixedMedia.
    #[pyo3(signature = (visibility=None))]
    fn classify(&mut self, visibility: Option<HashMap<String, bool>>) -> PyResult<String> {
        let layers = host_layers(visibility, None)?;
        let classification = self
            .inner
            .classify(layers.as_ref().map(|l| l as &dyn LayerSource));
        Ok(classification.to_string())
    }

    #[getter]
    fn duration_secs(&self) -> u64 {
        self.inner.duration_secs()
    }

    #[getter]
    fn drawing_time_secs(&self) -> u64 {
        self.inner.drawing_time_secs()
    }

    /// Add drawing time (called when user is actively drawing)
    fn add_drawing_time(&mut self, seconds: u64) {
        self.inner.add_drawing_time(seconds);
    }

    /// Set drawing time (for session restoration)
    fn set_drawing_time(&mut self, seconds: u64) {
        self.inner.set_drawing_time(seconds);
    }

    /// Serialize the whole session for persistence
    fn to_json(&self) -> PyResult<String> {
        Ok(serde_json::to_string(&self.inner).map_err(CHMError::from)?)
    }

    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let inner: Session = serde_json::from_str(json)
            .map_err(|e| CHMError::schema(e.to_string()))?;
        Ok(PySession { inner })
    }
}

/// Builds and verifies proofs with a key fixed at creation
#[pyclass(name = "Notary")]
pub struct PyNotary {
    inner: Notary,
}

#[pymethods]
impl PyNotary {
    /// Args:
    ///     signing_key (str, optional): base64 32-byte seed; omitted gives unsigned proofs
    #[new]
    #[pyo3(signature = (signing_key=None))]
    fn new(signing_key: Option<String>) -> PyResult<Self> {
        let keypair = signing_key
            .map(|key| KeyPair::from_base64(&key))
            .transpose()?;
        Ok(PyNotary {
            inner: Notary::new(keypair),
        })
    }

    /// Load configuration (file, then CHM_* environment) and its signing key
    #[staticmethod]
    #[pyo3(signature = (config_path=None))]
    fn from_config(config_path: Option<String>) -> PyResult<Self> {
        let config = CoreConfig::load(config_path.as_deref().map(Path::new))?;
        Ok(PyNotary {
            inner: Notary::with_config(&config)?,
        })
    }

    #[getter]
    fn public_key(&self) -> Option<String> {
        self.inner.public_key().map(|k| k.to_base64())
    }

    /// Finalize the session and return the proof as JSON
    ///
    /// Args:
    ///     artwork (bytes, optional): exported artwork for dual hashing
    ///     visibility (dict, optional): layer id -> visible, for registered imports
    ///     paint_layers (list, optional): `(pixels, width, height)` RGBA8 paint layers
    #[pyo3(signature = (session, artwork=None, visibility=None, paint_layers=None))]
    fn build_and_sign(
        &self,
        mut session: PyRefMut<'_, PySession>,
        artwork: Option<Vec<u8>>,
        visibility: Option<HashMap<String, bool>>,
        paint_layers: Option<Vec<RawLayer>>,
    ) -> PyResult<String> {
        let proof = match host_layers(visibility, paint_layers)? {
            Some(layers) => {
                self.inner
                    .build_and_sign_with(&mut session.inner, artwork.as_deref(), &layers)?
            }
            None => self
                .inner
                .build_and_sign(&mut session.inner, artwork.as_deref())?,
        };
        Ok(proof.to_json()?)
    }

    /// As `build_and_sign`, hashing an exported file
    #[pyo3(signature = (session, artwork_path, visibility=None))]
    fn build_and_sign_file(
        &self,
        mut session: PyRefMut<'_, PySession>,
        artwork_path: String,
        visibility: Option<HashMap<String, bool>>,
    ) -> PyResult<String> {
        let layers = host_layers(visibility, None)?;
        let proof = self.inner.build_and_sign_file(
            &mut session.inner,
            Path::new(&artwork_path),
            layers.as_ref().map(|l| l as &dyn LayerSource),
        )?;
        Ok(proof.to_json()?)
    }

    /// True only for a well-formed proof signed by this notary's key
    fn verify(&self, proof_json: &str) -> bool {
        match crate::proof::Proof::from_json(proof_json) {
            Ok(proof) => self.inner.verify(&proof),
            Err(_) => false,
        }
    }
}

/// Layer state sent by the host, if it sent any
fn host_layers(
    visibility: Option<HashMap<String, bool>>,
    paint_layers: Option<Vec<RawLayer>>,
) -> PyResult<Option<LayerSnapshot>> {
    if visibility.is_none() && paint_layers.is_none() {
        return Ok(None);
    }
    let snapshot = LayerSnapshot::from_raw(
        paint_layers.unwrap_or_default(),
        visibility.unwrap_or_default(),
    )?;
    Ok(Some(snapshot))
}

/// Verify a proof against a base64 public key
///
/// Raises ValueError for a malformed proof; returns False for a tampered one.
#[pyfunction]
fn verify_proof_json(proof_json: &str, public_key: &str) -> PyResult<bool> {
    let verifier = Verifier::new(PublicKey::from_base64(public_key)?);
    match verifier.check_json(proof_json) {
        Ok(_) => Ok(true),
        Err(CHMError::VerificationFailure) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Get the version of the CHM library
#[pyfunction]
fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Compute SHA-256 hash of data, hex encoded
#[pyfunction]
fn sha256(data: &[u8]) -> String {
    crate::crypto::sha256_hash(data)
}

/// Compute SHA-256 hash of a file, hex encoded
#[pyfunction]
fn sha256_file(path: String) -> PyResult<String> {
    Ok(crate::crypto::sha256_file(Path::new(&path))?)
}

/// Python module definition
///
/// `from chm import Session, Notary, verify_proof_json`
#[pymodule]
fn chm(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PySession>()?;
    m.add_class::<PyNotary>()?;

    m.add_function(wrap_pyfunction!(verify_proof_json, m)?)?;
    m.add_function(wrap_pyfunction!(get_version, m)?)?;
    m.add_function(wrap_pyfunction!(sha256, m)?)?;
    m.add_function(wrap_pyfunction!(sha256_file, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Signed authorship proofs for digital artwork")?;

    Ok(())
}
