//! Per-mode registration table.
//!
//! A [`RegistrationTable`] owns everything the registry knows about one
//! mode: the descriptors that declare operation names, the factories
//! registered per `(operation, namespace)`, the factory preference graph of
//! each namespace, the namespace (product) preference graph of each
//! operation, and the property state of each operation.
//!
//! The table is a plain data structure; the registry wraps it in a lock and
//! only ever copies [`ProductView`] / [`OperationView`] snapshots out before
//! sorting or invoking anything.

use std::sync::Arc;

use indexmap::IndexMap;
use opreg_core::{
    resolve_order, CaselessKey, Descriptor, FactoryRef, ModeDescriptor, PreferenceGraph,
    RegistryError, RegistryResult,
};

use crate::properties::PropertyState;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ProductEntry {
    factories: Vec<FactoryRef>,
    preferences: PreferenceGraph<FactoryRef>,
}

#[derive(Debug)]
struct OperationEntry {
    descriptor: Arc<Descriptor>,
    /// Keyed by namespace; `None` is the only key for modes without preferences.
    products: IndexMap<Option<CaselessKey>, ProductEntry>,
    product_preferences: PreferenceGraph<CaselessKey>,
    /// Present only when both the mode and the descriptor support properties.
    properties: Option<PropertyState>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Copy of one namespace's factories and preference edges.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub namespace: Option<CaselessKey>,
    pub factories: Vec<FactoryRef>,
    pub edges: Vec<(FactoryRef, FactoryRef)>,
}

impl ProductView {
    /// Factories ordered by preference, or `None` if the edges are cyclic.
    #[must_use]
    pub fn resolve(&self) -> Option<Vec<FactoryRef>> {
        resolve_order(&self.factories, &self.edges)
    }

    /// Namespace as a plain string, if any.
    #[must_use]
    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace.as_ref().map(CaselessKey::name)
    }
}

/// Copy of every namespace under one operation plus the product edges.
#[derive(Debug, Clone)]
pub struct OperationView {
    pub products: Vec<ProductView>,
    pub product_edges: Vec<(CaselessKey, CaselessKey)>,
}

impl OperationView {
    /// Products ordered by product preference.
    ///
    /// Returns `None` if the product edges are cyclic; products without a
    /// namespace always come first, in insertion order.
    #[must_use]
    pub fn ordered_products(&self) -> Option<Vec<&ProductView>> {
        if self.product_edges.is_empty() {
            return Some(self.products.iter().collect());
        }
        let named: Vec<CaselessKey> = self
            .products
            .iter()
            .filter_map(|p| p.namespace.clone())
            .collect();
        let order = resolve_order(&named, &self.product_edges)?;

        let mut ordered: Vec<&ProductView> = self
            .products
            .iter()
            .filter(|p| p.namespace.is_none())
            .collect();
        for name in &order {
            if let Some(product) = self
                .products
                .iter()
                .find(|p| p.namespace.as_ref() == Some(name))
            {
                ordered.push(product);
            }
        }
        Some(ordered)
    }
}

// ---------------------------------------------------------------------------
// RegistrationTable
// ---------------------------------------------------------------------------

/// Catalog of one mode.
#[derive(Debug)]
pub struct RegistrationTable {
    mode: ModeDescriptor,
    operations: IndexMap<CaselessKey, OperationEntry>,
}

impl RegistrationTable {
    /// Creates an empty table for `mode`.
    #[must_use]
    pub fn new(mode: ModeDescriptor) -> Self {
        Self {
            mode,
            operations: IndexMap::new(),
        }
    }

    /// The mode this table belongs to.
    #[must_use]
    pub fn mode(&self) -> &ModeDescriptor {
        &self.mode
    }

    // -- descriptors -------------------------------------------------------

    /// Checks that `descriptor` could be added without modifying anything.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Configuration`] if the descriptor kind does
    /// not match the mode, or the name is already declared in this mode.
    pub fn check_descriptor(&self, descriptor: &Descriptor) -> RegistryResult<()> {
        if descriptor.name().is_blank() {
            return Err(RegistryError::invalid_argument("descriptor name must not be empty"));
        }
        if descriptor.kind() != self.mode.descriptor_kind() {
            return Err(RegistryError::Configuration(format!(
                "descriptor \"{}\" is a {} descriptor but mode \"{}\" expects {}",
                descriptor.name(),
                descriptor.kind(),
                self.mode.name(),
                self.mode.descriptor_kind()
            )));
        }
        if self.operations.contains_key(descriptor.name()) {
            return Err(RegistryError::Configuration(format!(
                "descriptor \"{}\" is already registered for mode \"{}\"",
                descriptor.name(),
                self.mode.name()
            )));
        }
        Ok(())
    }

    /// Declares an operation name.
    ///
    /// # Errors
    ///
    /// See [`RegistrationTable::check_descriptor`].
    pub fn add_descriptor(&mut self, descriptor: Arc<Descriptor>) -> RegistryResult<()> {
        self.check_descriptor(&descriptor)?;
        let properties = (self.mode.supports_properties() && descriptor.supports_properties())
            .then(|| PropertyState::from_descriptor(&descriptor));
        self.operations.insert(
            descriptor.name().clone(),
            OperationEntry {
                descriptor,
                products: IndexMap::new(),
                product_preferences: PreferenceGraph::new(),
                properties,
            },
        );
        Ok(())
    }

    /// Removes an operation name together with its factories, preferences
    /// and property state. Returns the removed descriptor and the number of
    /// factories that were dropped with it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] if the name is not declared.
    pub fn remove_descriptor(&mut self, name: &str) -> RegistryResult<(Arc<Descriptor>, usize)> {
        let entry = self
            .operations
            .shift_remove(&CaselessKey::new(name))
            .ok_or_else(|| not_registered(&self.mode, "descriptor".to_string(), name, None))?;
        let dropped = entry.products.values().map(|p| p.factories.len()).sum();
        Ok((entry.descriptor, dropped))
    }

    /// Descriptor declaring `name`, if any.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&Arc<Descriptor>> {
        self.operations
            .get(&CaselessKey::new(name))
            .map(|e| &e.descriptor)
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<Descriptor>> {
        self.operations.values().map(|e| &e.descriptor)
    }

    // -- factories ---------------------------------------------------------

    /// Registers `factory` under `(operation, namespace)`. Returns `false`
    /// if it was already registered there.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownOperation`] if no descriptor declares `operation`.
    /// - [`RegistryError::InvalidArgument`] if the factory has the wrong
    ///   contract, the namespace is missing for a preference mode, or a
    ///   mode without preferences already holds a different factory.
    pub fn register(
        &mut self,
        operation: &str,
        namespace: Option<&str>,
        factory: FactoryRef,
    ) -> RegistryResult<bool> {
        if !self.mode.accepts_factory(&factory) {
            return Err(RegistryError::invalid_argument(format!(
                "{} is not a {} factory (expected {})",
                factory.type_name(),
                self.mode.name(),
                self.mode.factory_type_name()
            )));
        }
        let ns = self.namespace_key(namespace)?;
        let single = !self.mode.supports_preferences();
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;

        if single {
            if let Some(existing) = entry.products.get(&None) {
                if existing.factories.contains(&factory) {
                    return Ok(false);
                }
                return Err(RegistryError::invalid_argument(format!(
                    "mode \"{}\" holds a single factory per operation and \"{}\" already has one",
                    self.mode.name(),
                    operation
                )));
            }
        }

        let product = entry.products.entry(ns).or_default();
        if product.factories.contains(&factory) {
            return Ok(false);
        }
        product.factories.push(factory);
        Ok(true)
    }

    /// Removes `factory` from `(operation, namespace)` along with every
    /// preference edge that mentions it. Returns the number of edges removed.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if the factory is not registered
    /// under that exact key, plus the lookup errors of [`RegistrationTable::register`].
    pub fn unregister(
        &mut self,
        operation: &str,
        namespace: Option<&str>,
        factory: &FactoryRef,
    ) -> RegistryResult<usize> {
        let ns = self.namespace_key(namespace)?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        let missing = || {
            not_registered(
                &self.mode,
                format!("factory {}", factory.type_name()),
                operation,
                ns.as_ref(),
            )
        };

        let product = entry.products.get_mut(&ns).ok_or_else(missing)?;
        let position = product
            .factories
            .iter()
            .position(|f| f == factory)
            .ok_or_else(missing)?;
        product.factories.remove(position);
        let mut removed = product.preferences.remove_node(factory);

        if product.factories.is_empty() {
            entry.products.shift_remove(&ns);
            if let Some(name) = &ns {
                removed += entry.product_preferences.remove_node(name);
            }
        }
        Ok(removed)
    }

    /// Factories under `(operation, namespace)` in registration order.
    ///
    /// # Errors
    ///
    /// Lookup errors only; an unknown namespace yields an empty list.
    pub fn factories_for(
        &self,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<Vec<FactoryRef>> {
        let ns = self.namespace_key(namespace)?;
        let entry = self.lookup(operation)?;
        Ok(entry
            .products
            .get(&ns)
            .map(|p| p.factories.clone())
            .unwrap_or_default())
    }

    /// Namespaces that currently hold factories, in insertion order.
    ///
    /// # Errors
    ///
    /// Lookup errors only.
    pub fn namespaces_for(&self, operation: &str) -> RegistryResult<Vec<String>> {
        let entry = self.lookup(operation)?;
        Ok(entry
            .products
            .keys()
            .flatten()
            .map(|k| k.name().to_string())
            .collect())
    }

    // -- factory preferences -----------------------------------------------

    /// Records `preferred -> other`. Returns `false` if already recorded.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences,
    /// either factory is not registered under the key, or both are the same.
    pub fn set_preference(
        &mut self,
        operation: &str,
        namespace: Option<&str>,
        preferred: &FactoryRef,
        other: &FactoryRef,
    ) -> RegistryResult<bool> {
        self.require_preferences()?;
        let ns = self.namespace_key(namespace)?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        let product = entry.products.get_mut(&ns);
        let registered = |f: &FactoryRef| product.as_ref().is_some_and(|p| p.factories.contains(f));
        for factory in [preferred, other] {
            if !registered(factory) {
                return Err(RegistryError::invalid_preference(format!(
                    "{} is not registered under \"{}\"{}",
                    factory.type_name(),
                    operation,
                    product_suffix(ns.as_ref())
                )));
            }
        }
        match product {
            Some(product) => product.preferences.add_edge(preferred.clone(), other.clone()),
            None => Ok(false),
        }
    }

    /// Removes `preferred -> other`. Returns `false` if there was no such edge.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences;
    /// [`RegistryError::NotRegistered`] if either factory is not registered.
    pub fn unset_preference(
        &mut self,
        operation: &str,
        namespace: Option<&str>,
        preferred: &FactoryRef,
        other: &FactoryRef,
    ) -> RegistryResult<bool> {
        self.require_preferences()?;
        let ns = self.namespace_key(namespace)?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        let product = entry.products.get_mut(&ns);
        for factory in [preferred, other] {
            if !product.as_ref().is_some_and(|p| p.factories.contains(factory)) {
                return Err(not_registered(
                    &self.mode,
                    format!("factory {}", factory.type_name()),
                    operation,
                    ns.as_ref(),
                ));
            }
        }
        Ok(product.is_some_and(|p| p.preferences.remove_edge(preferred, other)))
    }

    /// Drops every edge under `(operation, namespace)`. Returns how many.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn clear_preferences(
        &mut self,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<usize> {
        self.require_preferences()?;
        let ns = self.namespace_key(namespace)?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        Ok(entry.products.get_mut(&ns).map_or(0, |p| {
            let n = p.preferences.len();
            p.preferences.clear();
            n
        }))
    }

    /// Edges under `(operation, namespace)` in insertion order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn preferences(
        &self,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<Vec<(FactoryRef, FactoryRef)>> {
        self.require_preferences()?;
        let ns = self.namespace_key(namespace)?;
        let entry = self.lookup(operation)?;
        Ok(entry
            .products
            .get(&ns)
            .map(|p| p.preferences.edges().to_vec())
            .unwrap_or_default())
    }

    // -- product preferences -----------------------------------------------

    /// Records that products `preferred` come before `other`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences,
    /// either product holds no factories, or both are the same product.
    pub fn set_product_preference(
        &mut self,
        operation: &str,
        preferred: &str,
        other: &str,
    ) -> RegistryResult<bool> {
        self.require_preferences()?;
        let preferred = self.product_key(preferred)?;
        let other = self.product_key(other)?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        for product in [&preferred, &other] {
            if !entry.products.contains_key(&Some(product.clone())) {
                return Err(RegistryError::invalid_preference(format!(
                    "product \"{product}\" has no factories under \"{operation}\""
                )));
            }
        }
        entry.product_preferences.add_edge(preferred, other)
    }

    /// Removes a product preference. Returns `false` if there was no such edge.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn unset_product_preference(
        &mut self,
        operation: &str,
        preferred: &str,
        other: &str,
    ) -> RegistryResult<bool> {
        self.require_preferences()?;
        let preferred = self.product_key(preferred)?;
        let other = self.product_key(other)?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        Ok(entry.product_preferences.remove_edge(&preferred, &other))
    }

    /// Drops every product preference under `operation`. Returns how many.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn clear_product_preferences(&mut self, operation: &str) -> RegistryResult<usize> {
        self.require_preferences()?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        let n = entry.product_preferences.len();
        entry.product_preferences.clear();
        Ok(n)
    }

    /// Product edges under `operation` in insertion order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn product_preferences(&self, operation: &str) -> RegistryResult<Vec<(String, String)>> {
        self.require_preferences()?;
        let entry = self.lookup(operation)?;
        Ok(entry
            .product_preferences
            .edges()
            .iter()
            .map(|(p, o)| (p.name().to_string(), o.name().to_string()))
            .collect())
    }

    // -- views -------------------------------------------------------------

    /// Copies out one namespace.
    ///
    /// # Errors
    ///
    /// Lookup errors only; an unknown namespace yields an empty view.
    pub fn product_view(
        &self,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<ProductView> {
        let ns = self.namespace_key(namespace)?;
        let entry = self.lookup(operation)?;
        Ok(match entry.products.get(&ns) {
            Some(product) => view_of(ns, product),
            None => ProductView {
                namespace: ns,
                factories: Vec::new(),
                edges: Vec::new(),
            },
        })
    }

    /// Copies out every namespace of one operation.
    ///
    /// # Errors
    ///
    /// Lookup errors only.
    pub fn operation_view(&self, operation: &str) -> RegistryResult<OperationView> {
        let entry = self.lookup(operation)?;
        Ok(OperationView {
            products: entry
                .products
                .iter()
                .map(|(ns, p)| view_of(ns.clone(), p))
                .collect(),
            product_edges: entry.product_preferences.edges().to_vec(),
        })
    }

    // -- properties --------------------------------------------------------

    /// Property state of `operation`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] if the mode or the descriptor does
    /// not support properties, plus lookup errors.
    pub fn properties(&self, operation: &str) -> RegistryResult<&PropertyState> {
        self.require_properties()?;
        let entry = self.lookup(operation)?;
        entry
            .properties
            .as_ref()
            .ok_or_else(|| no_properties(entry.descriptor.name()))
    }

    /// Mutable property state of `operation`.
    ///
    /// # Errors
    ///
    /// Same as [`RegistrationTable::properties`].
    pub fn properties_mut(&mut self, operation: &str) -> RegistryResult<&mut PropertyState> {
        self.require_properties()?;
        let entry = lookup_mut(&self.mode, &mut self.operations, operation)?;
        let name = entry.descriptor.name().clone();
        entry
            .properties
            .as_mut()
            .ok_or_else(|| no_properties(&name))
    }

    /// Resets every operation's property state to its descriptor's defaults.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] if the mode does not support properties.
    pub fn reset_properties(&mut self) -> RegistryResult<()> {
        self.require_properties()?;
        for entry in self.operations.values_mut() {
            if entry.properties.is_some() {
                entry.properties = Some(PropertyState::from_descriptor(&entry.descriptor));
            }
        }
        Ok(())
    }

    // -- helpers -----------------------------------------------------------

    fn lookup(&self, operation: &str) -> RegistryResult<&OperationEntry> {
        check_operation_name(operation)?;
        self.operations
            .get(&CaselessKey::new(operation))
            .ok_or_else(|| unknown_operation(&self.mode, operation))
    }

    fn namespace_key(&self, namespace: Option<&str>) -> RegistryResult<Option<CaselessKey>> {
        if !self.mode.supports_preferences() {
            return Ok(None);
        }
        match namespace {
            Some(ns) if !ns.trim().is_empty() => Ok(Some(CaselessKey::new(ns))),
            _ => Err(RegistryError::invalid_argument(format!(
                "a product name is required in mode \"{}\"",
                self.mode.name()
            ))),
        }
    }

    fn product_key(&self, product: &str) -> RegistryResult<CaselessKey> {
        self.namespace_key(Some(product))?
            .ok_or_else(|| RegistryError::invalid_argument("product name must not be empty"))
    }

    fn require_preferences(&self) -> RegistryResult<()> {
        if self.mode.supports_preferences() {
            Ok(())
        } else {
            Err(RegistryError::invalid_preference(format!(
                "mode \"{}\" does not support preferences",
                self.mode.name()
            )))
        }
    }

    fn require_properties(&self) -> RegistryResult<()> {
        if self.mode.supports_properties() {
            Ok(())
        } else {
            Err(RegistryError::invalid_argument(format!(
                "mode \"{}\" does not support properties",
                self.mode.name()
            )))
        }
    }
}

fn lookup_mut<'a>(
    mode: &ModeDescriptor,
    operations: &'a mut IndexMap<CaselessKey, OperationEntry>,
    operation: &str,
) -> RegistryResult<&'a mut OperationEntry> {
    check_operation_name(operation)?;
    operations
        .get_mut(&CaselessKey::new(operation))
        .ok_or_else(|| unknown_operation(mode, operation))
}

fn check_operation_name(operation: &str) -> RegistryResult<()> {
    if operation.trim().is_empty() {
        Err(RegistryError::invalid_argument("operation name must not be empty"))
    } else {
        Ok(())
    }
}

fn view_of(namespace: Option<CaselessKey>, product: &ProductEntry) -> ProductView {
    ProductView {
        namespace,
        factories: product.factories.clone(),
        edges: product.preferences.edges().to_vec(),
    }
}

fn unknown_operation(mode: &ModeDescriptor, operation: &str) -> RegistryError {
    RegistryError::UnknownOperation {
        mode: mode.name().to_string(),
        operation: operation.to_string(),
    }
}

fn not_registered(
    mode: &ModeDescriptor,
    what: String,
    operation: &str,
    namespace: Option<&CaselessKey>,
) -> RegistryError {
    RegistryError::NotRegistered {
        what,
        mode: mode.name().to_string(),
        operation: operation.to_string(),
        namespace: namespace.map(ToString::to_string),
    }
}

fn no_properties(descriptor: &CaselessKey) -> RegistryError {
    RegistryError::invalid_argument(format!(
        "descriptor \"{descriptor}\" does not support properties"
    ))
}

fn product_suffix(namespace: Option<&CaselessKey>) -> String {
    namespace.map_or_else(String::new, |ns| format!(" in product \"{ns}\""))
}
