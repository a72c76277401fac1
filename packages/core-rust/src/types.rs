//! Collaborator types that appear in factory signatures.
//!
//! The registry never interprets pixels. These types only carry enough
//! structure for factories to receive their inputs and hand back handles to
//! whatever they produced; the image pipeline proper lives elsewhere.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::key::CaselessKey;

/// Generic parameter / property value.
///
/// Covers the scalar and array shapes operation parameters take in practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    /// Absent / null value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point value.
    Double(f64),
    /// Text value (interpolation names, color space ids, ...).
    String(String),
    /// Integer array (band selectors, kernel sizes, ...).
    Ints(Vec<i64>),
    /// Floating-point array (kernels, matrices, ...).
    Doubles(Vec<f64>),
    /// Opaque binary payload.
    Bytes(Vec<u8>),
    /// Nested map with deterministic ordering.
    Map(BTreeMap<String, ParameterValue>),
}

impl ParameterValue {
    /// Returns the integer payload if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the floating-point payload, widening `Int`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the string payload if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Property values share the parameter representation.
pub type PropertyValue = ParameterValue;

/// Anything that exposes named properties.
pub trait PropertySource: Send + Sync {
    /// Names of every property this source can answer for.
    fn property_names(&self) -> Vec<String>;

    /// Value of the named property, or `None` if undefined.
    fn property(&self, name: &str) -> Option<PropertyValue>;
}

/// Handle to a pixel-producing image. Implemented by the image pipeline.
pub trait RenderedImage: PropertySource + fmt::Debug {
    /// Width in pixels.
    fn width(&self) -> u32;
    /// Height in pixels.
    fn height(&self) -> u32;
    /// Number of bands per pixel.
    fn num_bands(&self) -> u32;
}

/// Resolution-independent image that can produce renderings on demand.
pub trait RenderableImage: PropertySource + fmt::Debug {
    /// Width in user space.
    fn width(&self) -> f32;
    /// Height in user space.
    fn height(&self) -> f32;
    /// Produces a rendering for the given context, or `None` if it cannot.
    fn create_rendering(&self, context: &RenderContext) -> Option<Arc<dyn RenderedImage>>;
}

/// Sources and parameters handed to an operation factory.
#[derive(Debug, Clone, Default)]
pub struct ParameterBlock {
    /// Source images, in operation order.
    pub sources: Vec<Arc<dyn RenderedImage>>,
    /// Positional parameters.
    pub parameters: Vec<ParameterValue>,
}

impl ParameterBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source image (builder style).
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn RenderedImage>) -> Self {
        self.sources.push(source);
        self
    }

    /// Appends a positional parameter (builder style).
    #[must_use]
    pub fn with_parameter(mut self, value: ParameterValue) -> Self {
        self.parameters.push(value);
        self
    }

    /// Positional parameter at `index`.
    #[must_use]
    pub fn parameter(&self, index: usize) -> Option<&ParameterValue> {
        self.parameters.get(index)
    }

    /// Source at `index` viewed as a property source.
    #[must_use]
    pub fn source(&self, index: usize) -> Option<&Arc<dyn RenderedImage>> {
        self.sources.get(index)
    }
}

/// Rendering hints keyed by caseless name.
#[derive(Debug, Clone, Default)]
pub struct RenderingHints {
    hints: BTreeMap<CaselessKey, ParameterValue>,
}

impl RenderingHints {
    /// Creates an empty hint set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a hint, returning the previous value.
    pub fn insert(&mut self, key: &str, value: ParameterValue) -> Option<ParameterValue> {
        self.hints.insert(CaselessKey::new(key), value)
    }

    /// Looks up a hint.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.hints.get(&CaselessKey::new(key))
    }

    /// Number of hints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hints.len()
    }

    /// Returns `true` if no hints are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

/// Device-space context for renderable-mode factories.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Row-major 2x3 affine transform from user to device space.
    pub transform: [f64; 6],
    /// Optional area of interest `(x, y, width, height)` in user space.
    pub area_of_interest: Option<(f64, f64, f64, f64)>,
    /// Hints forwarded to the rendering.
    pub hints: RenderingHints,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            transform: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            area_of_interest: None,
            hints: RenderingHints::default(),
        }
    }
}

/// Ordered group of rendered images produced by collection factories.
#[derive(Debug, Clone, Default)]
pub struct CollectionImage {
    /// Member images.
    pub elements: Vec<Arc<dyn RenderedImage>>,
}

/// Ordered group of renderable images produced by renderable-collection factories.
#[derive(Debug, Clone, Default)]
pub struct RenderableCollection {
    /// Member images.
    pub elements: Vec<Arc<dyn RenderableImage>>,
}

/// Named parameters for a tile codec of a given format.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCodecParameterList {
    /// Codec format name, e.g. `"jpeg"` or `"raw"`.
    pub format_name: String,
    /// `"tileDecoder"` or `"tileEncoder"`.
    pub mode_name: String,
    /// Codec-specific parameter values.
    pub values: BTreeMap<String, ParameterValue>,
}

impl TileCodecParameterList {
    /// Creates an empty parameter list for the given format and mode.
    #[must_use]
    pub fn new(format_name: impl Into<String>, mode_name: impl Into<String>) -> Self {
        Self {
            format_name: format_name.into(),
            mode_name: mode_name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Sets a parameter (builder style).
    #[must_use]
    pub fn with(mut self, name: &str, value: ParameterValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }
}

/// Sample layout an encoder must honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
    /// Bands per pixel.
    pub num_bands: u32,
    /// Bits per sample (all bands).
    pub bits_per_sample: u8,
}

/// A decoded tile: raw interleaved samples plus their placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// Tile origin in image coordinates.
    pub origin: (i32, i32),
    /// Sample layout of `samples`.
    pub layout: SampleLayout,
    /// Interleaved sample data.
    pub samples: Bytes,
}

/// Produced by tile-decoder factories.
pub trait TileDecoder: Send {
    /// Codec format this decoder handles.
    fn format_name(&self) -> &str;

    /// Decodes one tile placed at `origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream is malformed.
    fn decode(&mut self, origin: (i32, i32)) -> anyhow::Result<Raster>;
}

/// Produced by tile-encoder factories.
pub trait TileEncoder: Send {
    /// Codec format this encoder handles.
    fn format_name(&self) -> &str;

    /// Encodes one tile into the encoder's output sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the raster does not fit the encoder's layout or
    /// the sink rejects the write.
    fn encode(&mut self, raster: &Raster) -> anyhow::Result<()>;
}
