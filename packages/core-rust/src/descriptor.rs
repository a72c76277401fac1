//! Element descriptors: the declarations that make an operation name valid
//! for one or more registry modes.

use std::fmt;
use std::sync::Arc;

use crate::key::CaselessKey;
use crate::mode::DescriptorKind;
use crate::types::{ParameterBlock, PropertyValue};

/// Computes properties for the result of an operation.
///
/// Registered per `(mode, operation)`; consulted when a caller asks the
/// registry for a property source.
pub trait PropertyGenerator: Send + Sync {
    /// Names of the properties this generator produces.
    fn property_names(&self) -> Vec<String>;

    /// Whether this generator applies to the given invocation.
    fn can_generate(&self, _params: &ParameterBlock) -> bool {
        true
    }

    /// Computes the named property for an invocation.
    fn property(&self, name: &str, params: &ParameterBlock) -> Option<PropertyValue>;
}

/// Declares an operation, remote protocol or codec format and the modes in
/// which factories may be registered for it.
#[derive(Clone)]
pub struct Descriptor {
    name: CaselessKey,
    kind: DescriptorKind,
    vendor: Option<String>,
    supported_modes: Vec<CaselessKey>,
    supports_properties: bool,
    property_generators: Vec<Arc<dyn PropertyGenerator>>,
}

impl Descriptor {
    /// Creates a descriptor with no supported modes.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self {
            name: CaselessKey::new(name),
            kind,
            vendor: None,
            supported_modes: Vec::new(),
            supports_properties: false,
            property_generators: Vec::new(),
        }
    }

    /// Adds a supported mode (builder style). Duplicates are ignored.
    #[must_use]
    pub fn with_mode(mut self, mode: &str) -> Self {
        let key = CaselessKey::new(mode);
        if !self.supported_modes.contains(&key) {
            self.supported_modes.push(key);
        }
        self
    }

    /// Sets the vendor string (builder style).
    #[must_use]
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Attaches a property generator and enables property support.
    #[must_use]
    pub fn with_property_generator(mut self, generator: Arc<dyn PropertyGenerator>) -> Self {
        self.supports_properties = true;
        self.property_generators.push(generator);
        self
    }

    /// Enables property support without attaching a generator.
    #[must_use]
    pub fn with_properties(mut self) -> Self {
        self.supports_properties = true;
        self
    }

    /// Descriptor name.
    #[must_use]
    pub fn name(&self) -> &CaselessKey {
        &self.name
    }

    /// Descriptor kind.
    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Vendor string, if any.
    #[must_use]
    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    /// Modes this descriptor declares the name valid for.
    #[must_use]
    pub fn supported_modes(&self) -> &[CaselessKey] {
        &self.supported_modes
    }

    /// Returns `true` if `mode` is among the supported modes.
    #[must_use]
    pub fn supports_mode(&self, mode: &CaselessKey) -> bool {
        self.supported_modes.contains(mode)
    }

    /// Whether the descriptor participates in property environments.
    #[must_use]
    pub fn supports_properties(&self) -> bool {
        self.supports_properties
    }

    /// Generators seeded into every supporting mode's property environment.
    #[must_use]
    pub fn property_generators(&self) -> &[Arc<dyn PropertyGenerator>] {
        &self.property_generators
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("vendor", &self.vendor)
            .field("supported_modes", &self.supported_modes)
            .field("supports_properties", &self.supports_properties)
            .field("property_generators", &self.property_generators.len())
            .finish()
    }
}
