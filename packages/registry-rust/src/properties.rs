//! Per-operation property environment.
//!
//! Each `(mode, operation)` whose mode and descriptor both support
//! properties carries a [`PropertyState`]: the generators attached to it,
//! the names it suppresses, and explicit "copy from source N" directives.
//! [`PropertyState::resolve`] combines that state with an invocation's
//! sources into a [`ResolvedProperties`] view.
//!
//! Resolution precedence, lowest to highest:
//! 1. properties inherited from sources (the lowest source index wins),
//! 2. generators (later registrations win),
//! 3. copy-from-source directives.
//!
//! Suppressed names are hidden at every level.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use opreg_core::{CaselessKey, Descriptor, ParameterBlock, PropertyGenerator, PropertySource, PropertyValue};

// ---------------------------------------------------------------------------
// PropertyState
// ---------------------------------------------------------------------------

/// Mutable property configuration for one operation in one mode.
#[derive(Clone, Default)]
pub struct PropertyState {
    generators: Vec<Arc<dyn PropertyGenerator>>,
    suppressed: HashSet<CaselessKey>,
    copy_from_source: IndexMap<CaselessKey, usize>,
}

impl PropertyState {
    /// Seeds the state with the descriptor's own generators.
    #[must_use]
    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        Self {
            generators: descriptor.property_generators().to_vec(),
            ..Self::default()
        }
    }

    /// Attaches a generator. Its names stop being suppressed and any copy
    /// directive for them is dropped.
    pub fn add_generator(&mut self, generator: Arc<dyn PropertyGenerator>) {
        for name in generator.property_names() {
            let key = CaselessKey::new(name);
            self.suppressed.remove(&key);
            self.copy_from_source.shift_remove(&key);
        }
        self.generators.push(generator);
    }

    /// Detaches a generator by identity. Returns `false` if it was not attached.
    pub fn remove_generator(&mut self, generator: &Arc<dyn PropertyGenerator>) -> bool {
        let before = self.generators.len();
        self.generators.retain(|g| !Arc::ptr_eq(g, generator));
        self.generators.len() != before
    }

    /// Hides `name` and drops any copy directive for it.
    pub fn suppress(&mut self, name: &str) {
        let key = CaselessKey::new(name);
        self.copy_from_source.shift_remove(&key);
        self.suppressed.insert(key);
    }

    /// Hides every name produced by the attached generators.
    pub fn suppress_all(&mut self) {
        let names: Vec<String> = self
            .generators
            .iter()
            .flat_map(|g| g.property_names())
            .collect();
        for name in names {
            self.suppress(&name);
        }
    }

    /// Copies `name` from source `source_index` and stops suppressing it.
    pub fn copy_from_source(&mut self, name: &str, source_index: usize) {
        let key = CaselessKey::new(name);
        self.suppressed.remove(&key);
        self.copy_from_source.insert(key, source_index);
    }

    /// Names produced by generators or copy directives, minus suppressed ones.
    ///
    /// Each name appears once, spelled as first declared.
    #[must_use]
    pub fn generated_names(&self) -> Vec<String> {
        let mut names: IndexMap<CaselessKey, ()> = IndexMap::new();
        for generator in &self.generators {
            for name in generator.property_names() {
                let key = CaselessKey::new(name);
                if !self.suppressed.contains(&key) {
                    names.entry(key).or_insert(());
                }
            }
        }
        for key in self.copy_from_source.keys() {
            names.entry(key.clone()).or_insert(());
        }
        names.into_keys().map(|k| k.name().to_string()).collect()
    }

    /// Returns `true` if `name` is currently suppressed.
    #[must_use]
    pub fn is_suppressed(&self, name: &str) -> bool {
        self.suppressed.contains(&CaselessKey::new(name))
    }

    /// Number of attached generators.
    #[must_use]
    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// Builds the property view for one invocation.
    #[must_use]
    pub fn resolve(&self, params: &ParameterBlock) -> ResolvedProperties {
        let mut providers: IndexMap<CaselessKey, Provider> = IndexMap::new();

        // Highest index first so lower indices overwrite.
        for (index, source) in params.sources.iter().enumerate().rev() {
            for name in source.property_names() {
                let key = CaselessKey::new(name.as_str());
                if !self.suppressed.contains(&key) {
                    providers.insert(key, Provider::Source(index, name));
                }
            }
        }

        for generator in &self.generators {
            if !generator.can_generate(params) {
                continue;
            }
            for name in generator.property_names() {
                let key = CaselessKey::new(name.as_str());
                if !self.suppressed.contains(&key) {
                    providers.insert(key, Provider::Generator(Arc::clone(generator), name));
                }
            }
        }

        for (key, &index) in &self.copy_from_source {
            let Some(source) = params.source(index) else {
                continue;
            };
            if self.suppressed.contains(key) {
                continue;
            }
            // Ask the source under the spelling it declares.
            let declared = source
                .property_names()
                .into_iter()
                .find(|n| key.matches(n))
                .unwrap_or_else(|| key.name().to_string());
            providers.insert(key.clone(), Provider::Source(index, declared));
        }

        ResolvedProperties {
            params: params.clone(),
            providers,
        }
    }
}

impl fmt::Debug for PropertyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyState")
            .field("generators", &self.generators.len())
            .field("suppressed", &self.suppressed)
            .field("copy_from_source", &self.copy_from_source)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ResolvedProperties
// ---------------------------------------------------------------------------

/// Where a visible name comes from, with the spelling that provider declared.
#[derive(Clone)]
enum Provider {
    Source(usize, String),
    Generator(Arc<dyn PropertyGenerator>, String),
}

/// Property view for a single invocation.
///
/// Values are computed lazily on each [`PropertySource::property`] call.
#[derive(Clone)]
pub struct ResolvedProperties {
    params: ParameterBlock,
    providers: IndexMap<CaselessKey, Provider>,
}

impl ResolvedProperties {
    /// Number of visible property names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no property is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl PropertySource for ResolvedProperties {
    fn property_names(&self) -> Vec<String> {
        self.providers.keys().map(|k| k.name().to_string()).collect()
    }

    fn property(&self, name: &str) -> Option<PropertyValue> {
        match self.providers.get(&CaselessKey::new(name))? {
            Provider::Source(index, declared) => self.params.source(*index)?.property(declared),
            Provider::Generator(generator, declared) => generator.property(declared, &self.params),
        }
    }
}

impl fmt::Debug for ResolvedProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
