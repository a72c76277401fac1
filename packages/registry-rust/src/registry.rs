//! The dispatch registry façade.
//!
//! [`OperationRegistry`] is the catalog callers talk to. It holds one
//! [`RegistrationTable`] per mode and layers on top of it:
//!
//! - mode and descriptor management,
//! - validated factory registration and preference edits with observer
//!   notification,
//! - ordered lookup (`get_ordered_list`, `get_factory_iterator`,
//!   `get_factory`) and fallback invocation (`invoke_factory`, `invoke`),
//! - property environments for modes that support them.
//!
//! Lookups copy what they need out of the table under a read lock and only
//! then sort and invoke, so factories never run while a lock is held.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use opreg_core::{
    CaselessKey, Descriptor, DescriptorKind, ErasedOutput, FactoryRef, ModeDescriptor,
    ParameterBlock, PropertyGenerator, RegistryError, RegistryMode, RegistryResult,
};
use parking_lot::RwLock;

use crate::config::RegistryConfig;
use crate::observer::{
    CompositeDispatchObserver, DispatchObserver, EntryKey, FactoryFailure, FailureReason,
    TracingObserver,
};
use crate::properties::ResolvedProperties;
use crate::snapshot::{ModeSnapshot, RegistrySnapshot};
use crate::table::RegistrationTable;

/// Finite, cloneable sequence of factories in dispatch order.
///
/// Cloning the iterator restarts it from the clone point.
pub type FactoryIter = std::vec::IntoIter<FactoryRef>;

// ---------------------------------------------------------------------------
// ModeSlot
// ---------------------------------------------------------------------------

/// One mode: its immutable descriptor plus the lock-protected catalog.
struct ModeSlot {
    descriptor: ModeDescriptor,
    table: RwLock<RegistrationTable>,
}

impl ModeSlot {
    fn new(descriptor: ModeDescriptor) -> Self {
        let table = RegistrationTable::new(descriptor.clone());
        Self {
            descriptor,
            table: RwLock::new(table),
        }
    }

    fn name(&self) -> &str {
        self.descriptor.name().name()
    }

    /// Observer key; the namespace is dropped for modes that ignore it.
    fn entry_key<'a>(&'a self, operation: &'a str, namespace: Option<&'a str>) -> EntryKey<'a> {
        EntryKey {
            mode: self.name(),
            operation,
            namespace: namespace.filter(|_| self.descriptor.supports_preferences()),
        }
    }
}

/// A factory together with the namespace it was found under.
struct Candidate {
    namespace: Option<CaselessKey>,
    factory: FactoryRef,
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Process-wide (or explicitly owned) catalog of modes, descriptors,
/// factories and preferences.
///
/// All methods take `&self`; the registry is meant to be shared behind an
/// `Arc`. Operations on different modes never contend.
pub struct OperationRegistry {
    config: RegistryConfig,
    /// Mode name -> slot.
    modes: DashMap<CaselessKey, Arc<ModeSlot>>,
    /// Definition order, for deterministic listing. Also serializes `define_mode`.
    mode_order: RwLock<Vec<CaselessKey>>,
    observer: ArcSwap<CompositeDispatchObserver>,
}

impl OperationRegistry {
    /// Creates a registry with the default configuration (built-in modes,
    /// panic isolation, event logging).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates a registry from an explicit configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        let mut observer = CompositeDispatchObserver::default();
        if config.log_events {
            observer.add(Arc::new(TracingObserver));
        }
        let registry = Self {
            config,
            modes: DashMap::new(),
            mode_order: RwLock::new(Vec::new()),
            observer: ArcSwap::from_pointee(observer),
        };
        if registry.config.builtin_modes {
            if let Err(err) = crate::frontend::define_builtin_modes(&registry) {
                tracing::error!(error = %err, "failed to define built-in modes");
            }
        }
        registry
    }

    /// The configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attaches an observer. Observers cannot be detached.
    pub fn add_observer(&self, observer: Arc<dyn DispatchObserver>) {
        self.observer.rcu(|current| {
            let mut next = CompositeDispatchObserver::clone(current);
            next.add(Arc::clone(&observer));
            next
        });
    }

    // -- modes -------------------------------------------------------------

    /// Defines a mode. Returns `false` if an identical mode already exists.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidArgument`] if the mode name is empty.
    /// - [`RegistryError::Configuration`] if a mode with the same name but a
    ///   different shape is already defined.
    pub fn define_mode(&self, descriptor: ModeDescriptor) -> RegistryResult<bool> {
        if descriptor.name().is_blank() {
            return Err(RegistryError::invalid_argument("mode name must not be empty"));
        }
        let mut order = self.mode_order.write();
        if let Some(existing) = self.modes.get(descriptor.name()) {
            return if existing.descriptor.same_shape(&descriptor) {
                Ok(false)
            } else {
                Err(RegistryError::Configuration(format!(
                    "mode \"{}\" is already defined with a different shape",
                    descriptor.name()
                )))
            };
        }
        let key = descriptor.name().clone();
        tracing::debug!(mode = %key, kind = %descriptor.descriptor_kind(), "mode defined");
        order.push(key.clone());
        self.modes.insert(key, Arc::new(ModeSlot::new(descriptor)));
        Ok(true)
    }

    /// Defines mode `M`. See [`OperationRegistry::define_mode`].
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::define_mode`].
    pub fn define<M: RegistryMode>(&self) -> RegistryResult<bool> {
        self.define_mode(ModeDescriptor::of::<M>())
    }

    /// Names of all defined modes, in definition order.
    #[must_use]
    pub fn registry_modes(&self) -> Vec<String> {
        self.mode_order
            .read()
            .iter()
            .map(|k| k.name().to_string())
            .collect()
    }

    /// Descriptor of the named mode.
    #[must_use]
    pub fn mode_descriptor(&self, mode: &str) -> Option<ModeDescriptor> {
        self.modes
            .get(&CaselessKey::new(mode))
            .map(|slot| slot.descriptor.clone())
    }

    // -- descriptors -------------------------------------------------------

    /// Declares an operation (or protocol, or codec format) in every mode
    /// the descriptor lists. Either all modes accept it or none is changed.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidArgument`] if the descriptor lists no modes.
    /// - [`RegistryError::UnknownMode`] if a listed mode is not defined.
    /// - [`RegistryError::Configuration`] if a mode expects another
    ///   descriptor kind or already declares the name.
    pub fn register_descriptor(&self, descriptor: Descriptor) -> RegistryResult<()> {
        if descriptor.supported_modes().is_empty() {
            return Err(RegistryError::invalid_argument(format!(
                "descriptor \"{}\" supports no modes",
                descriptor.name()
            )));
        }
        let mut slots = descriptor
            .supported_modes()
            .iter()
            .map(|mode| self.slot(mode.name()))
            .collect::<RegistryResult<Vec<_>>>()?;
        // Global lock order: by folded mode name.
        slots.sort_by(|a, b| a.descriptor.name().cmp(b.descriptor.name()));

        let mut tables: Vec<_> = slots.iter().map(|s| s.table.write()).collect();
        for table in &tables {
            table.check_descriptor(&descriptor)?;
        }
        let descriptor = Arc::new(descriptor);
        for table in &mut tables {
            table.add_descriptor(Arc::clone(&descriptor))?;
        }
        drop(tables);

        tracing::debug!(
            descriptor = %descriptor.name(),
            kind = %descriptor.kind(),
            modes = ?descriptor.supported_modes(),
            "descriptor registered"
        );
        Ok(())
    }

    /// Removes a descriptor from every mode of `kind` that declares it,
    /// dropping the factories and preferences registered under it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if no mode of that kind declares the name.
    pub fn unregister_descriptor(&self, kind: DescriptorKind, name: &str) -> RegistryResult<()> {
        let mut removed_from = Vec::new();
        for slot in self.slots_of_kind(kind) {
            let removed = {
                let mut table = slot.table.write();
                if table.descriptor(name).is_some() {
                    Some(table.remove_descriptor(name)?)
                } else {
                    None
                }
            };
            if let Some((_, dropped)) = removed {
                tracing::debug!(mode = slot.name(), descriptor = name, dropped, "descriptor unregistered");
                removed_from.push(slot.name().to_string());
            }
        }
        if removed_from.is_empty() {
            return Err(RegistryError::NotRegistered {
                what: format!("{kind} descriptor"),
                mode: format!("any {kind} mode"),
                operation: name.to_string(),
                namespace: None,
            });
        }
        Ok(())
    }

    /// Looks up a descriptor by kind and name.
    #[must_use]
    pub fn get_descriptor(&self, kind: DescriptorKind, name: &str) -> Option<Arc<Descriptor>> {
        self.slots_of_kind(kind)
            .into_iter()
            .find_map(|slot| slot.table.read().descriptor(name).cloned())
    }

    /// Names of every descriptor of `kind`, each once, in first-seen order.
    #[must_use]
    pub fn descriptor_names(&self, kind: DescriptorKind) -> Vec<String> {
        let mut names: Vec<CaselessKey> = Vec::new();
        for slot in self.slots_of_kind(kind) {
            for descriptor in slot.table.read().descriptors() {
                if !names.contains(descriptor.name()) {
                    names.push(descriptor.name().clone());
                }
            }
        }
        names.into_iter().map(|k| k.name().to_string()).collect()
    }

    // -- factories ---------------------------------------------------------

    /// Registers `factory` for `operation` under product `namespace`.
    ///
    /// Re-registering the same factory under the same key is a no-op.
    ///
    /// # Errors
    ///
    /// See [`RegistrationTable::register`]; additionally
    /// [`RegistryError::UnknownMode`].
    pub fn register_factory(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
        factory: FactoryRef,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        let added = slot
            .table
            .write()
            .register(operation, namespace, factory.clone())?;
        if added {
            self.observer
                .load()
                .on_register(slot.entry_key(operation, namespace), &factory);
        }
        Ok(())
    }

    /// Unregisters `factory` and every preference that mentions it.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if the factory is not registered
    /// under that exact key.
    pub fn unregister_factory(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
        factory: &FactoryRef,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        slot.table.write().unregister(operation, namespace, factory)?;
        self.observer
            .load()
            .on_unregister(slot.entry_key(operation, namespace), factory);
        Ok(())
    }

    /// Requires `preferred` to be tried before `other`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences,
    /// either factory is not registered under the key, or both are the same.
    pub fn set_preference(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
        preferred: &FactoryRef,
        other: &FactoryRef,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        let added = slot
            .table
            .write()
            .set_preference(operation, namespace, preferred, other)?;
        if added {
            self.observer
                .load()
                .on_preference_set(slot.entry_key(operation, namespace), preferred, other);
        }
        Ok(())
    }

    /// Removes a preference. A missing edge between registered factories is a no-op.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences;
    /// [`RegistryError::NotRegistered`] if either factory is not registered.
    pub fn unset_preference(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
        preferred: &FactoryRef,
        other: &FactoryRef,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        let removed = slot
            .table
            .write()
            .unset_preference(operation, namespace, preferred, other)?;
        if removed {
            self.observer
                .load()
                .on_preference_unset(slot.entry_key(operation, namespace), preferred, other);
        }
        Ok(())
    }

    /// Drops every preference under `(mode, operation, namespace)`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn clear_preferences(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        let removed = slot.table.write().clear_preferences(operation, namespace)?;
        self.observer
            .load()
            .on_preferences_cleared(slot.entry_key(operation, namespace), removed);
        Ok(())
    }

    /// Current preferences as `(preferred, other)` pairs in insertion order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn get_preferences(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<Vec<(FactoryRef, FactoryRef)>> {
        self.slot(mode)?.table.read().preferences(operation, namespace)
    }

    /// Factories of one namespace in preference order.
    ///
    /// `Ok(Some(vec![]))` if the namespace holds no factories, `Ok(None)` if
    /// its preferences are cyclic.
    ///
    /// # Errors
    ///
    /// Lookup errors ([`RegistryError::UnknownMode`],
    /// [`RegistryError::UnknownOperation`], missing namespace).
    pub fn get_ordered_list(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<Option<Vec<FactoryRef>>> {
        let view = self.slot(mode)?.table.read().product_view(operation, namespace)?;
        Ok(view.resolve())
    }

    /// Factories under `(mode, operation, namespace)` in registration order.
    ///
    /// # Errors
    ///
    /// Lookup errors only.
    pub fn factories_for(
        &self,
        mode: &str,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<Vec<FactoryRef>> {
        self.slot(mode)?.table.read().factories_for(operation, namespace)
    }

    /// Namespaces holding factories for `operation`, in insertion order.
    ///
    /// # Errors
    ///
    /// Lookup errors only.
    pub fn namespaces_for(&self, mode: &str, operation: &str) -> RegistryResult<Vec<String>> {
        self.slot(mode)?.table.read().namespaces_for(operation)
    }

    // -- product preferences -----------------------------------------------

    /// Requires every factory of product `preferred` to be tried before any
    /// factory of product `other`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences,
    /// either product has no factories, or both are the same product.
    pub fn set_product_preference(
        &self,
        mode: &str,
        operation: &str,
        preferred: &str,
        other: &str,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        let added = slot
            .table
            .write()
            .set_product_preference(operation, preferred, other)?;
        if added {
            tracing::debug!(mode = slot.name(), operation, preferred, other, "product preference set");
        }
        Ok(())
    }

    /// Removes a product preference; a missing edge is a no-op.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn unset_product_preference(
        &self,
        mode: &str,
        operation: &str,
        preferred: &str,
        other: &str,
    ) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        if slot
            .table
            .write()
            .unset_product_preference(operation, preferred, other)?
        {
            tracing::debug!(mode = slot.name(), operation, preferred, other, "product preference unset");
        }
        Ok(())
    }

    /// Drops every product preference under `operation`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn clear_product_preferences(&self, mode: &str, operation: &str) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        let removed = slot.table.write().clear_product_preferences(operation)?;
        tracing::debug!(mode = slot.name(), operation, removed, "product preferences cleared");
        Ok(())
    }

    /// Product preferences as `(preferred, other)` pairs.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences.
    pub fn get_product_preferences(
        &self,
        mode: &str,
        operation: &str,
    ) -> RegistryResult<Vec<(String, String)>> {
        self.slot(mode)?.table.read().product_preferences(operation)
    }

    /// Products of `operation` in product-preference order, or `Ok(None)`
    /// if the product preferences are cyclic.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidPreference`] if the mode has no preferences,
    /// plus lookup errors.
    pub fn get_ordered_product_list(
        &self,
        mode: &str,
        operation: &str,
    ) -> RegistryResult<Option<Vec<String>>> {
        let slot = self.slot(mode)?;
        if !slot.descriptor.supports_preferences() {
            return Err(RegistryError::invalid_preference(format!(
                "mode \"{}\" does not support preferences",
                slot.name()
            )));
        }
        let view = slot.table.read().operation_view(operation)?;
        Ok(view.ordered_products().map(|products| {
            products
                .iter()
                .filter_map(|p| p.namespace_name().map(str::to_string))
                .collect()
        }))
    }

    // -- lookup and invocation ---------------------------------------------

    /// Every factory for `operation` in dispatch order: products in product
    /// order, each product's factories in preference order. Products whose
    /// preferences are cyclic are skipped; cyclic product preferences yield
    /// no factories at all.
    ///
    /// # Errors
    ///
    /// Lookup errors only.
    pub fn get_factory_iterator(&self, mode: &str, operation: &str) -> RegistryResult<FactoryIter> {
        let slot = self.slot(mode)?;
        let candidates = self.ordered_candidates(&slot, operation)?;
        Ok(candidates
            .into_iter()
            .map(|c| c.factory)
            .collect::<Vec<_>>()
            .into_iter())
    }

    /// The first factory of [`OperationRegistry::get_factory_iterator`].
    ///
    /// # Errors
    ///
    /// Lookup errors only; no factories yields `Ok(None)`.
    pub fn get_factory(&self, mode: &str, operation: &str) -> RegistryResult<Option<FactoryRef>> {
        Ok(self.get_factory_iterator(mode, operation)?.next())
    }

    /// Calls each factory in dispatch order with `args` and returns the
    /// first value produced.
    ///
    /// Factories that return `Ok(None)` are skipped. Factories that error
    /// or panic are reported to the observers and skipped. `Ok(None)` means
    /// every factory declined or failed, or there were none.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] if `args` is not the mode's
    /// argument type, plus lookup errors.
    pub fn invoke_factory(
        &self,
        mode: &str,
        operation: &str,
        args: &dyn Any,
    ) -> RegistryResult<Option<ErasedOutput>> {
        let slot = self.slot(mode)?;
        if !slot.descriptor.accepts_args(args) {
            return Err(RegistryError::invalid_argument(format!(
                "mode \"{}\" expects arguments of type {}",
                slot.name(),
                slot.descriptor.args_type_name()
            )));
        }
        let candidates = self.ordered_candidates(&slot, operation)?;
        Ok(self.first_success(&slot, operation, &candidates, |factory| {
            slot.descriptor.invoke(factory, args)
        }))
    }

    /// Statically typed [`OperationRegistry::invoke_factory`].
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownMode`] if `M` is not defined here,
    /// [`RegistryError::Configuration`] if a mode named `M::NAME` has a
    /// different shape, plus lookup errors.
    pub fn invoke<M: RegistryMode>(
        &self,
        operation: &str,
        args: &M::Args,
    ) -> RegistryResult<Option<M::Output>> {
        let slot = self.typed_slot::<M>()?;
        let candidates = self.ordered_candidates(&slot, operation)?;
        Ok(self.first_success(&slot, operation, &candidates, |factory| {
            let typed = factory.downcast::<M::Factory>().ok_or_else(|| {
                anyhow::anyhow!("{} is not a {} factory", factory.type_name(), M::NAME)
            })?;
            M::invoke(&typed, args)
        }))
    }

    /// Typed factories for `operation` in dispatch order.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::invoke`].
    pub fn factories<M: RegistryMode>(&self, operation: &str) -> RegistryResult<Vec<Arc<M::Factory>>> {
        let slot = self.typed_slot::<M>()?;
        Ok(self
            .ordered_candidates(&slot, operation)?
            .iter()
            .filter_map(|c| c.factory.downcast::<M::Factory>())
            .collect())
    }

    /// The first typed factory for `operation`.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::invoke`].
    pub fn factory<M: RegistryMode>(&self, operation: &str) -> RegistryResult<Option<Arc<M::Factory>>> {
        Ok(self.factories::<M>(operation)?.into_iter().next())
    }

    /// Typed [`OperationRegistry::get_ordered_list`].
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::invoke`].
    pub fn ordered_list<M: RegistryMode>(
        &self,
        operation: &str,
        namespace: Option<&str>,
    ) -> RegistryResult<Option<Vec<Arc<M::Factory>>>> {
        let slot = self.typed_slot::<M>()?;
        let view = slot.table.read().product_view(operation, namespace)?;
        Ok(view.resolve().map(|order| {
            order
                .iter()
                .filter_map(FactoryRef::downcast::<M::Factory>)
                .collect()
        }))
    }

    // -- properties --------------------------------------------------------

    /// Attaches a property generator to `(mode, operation)`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] if the mode or the descriptor does
    /// not support properties, plus lookup errors.
    pub fn add_property_generator(
        &self,
        mode: &str,
        operation: &str,
        generator: Arc<dyn PropertyGenerator>,
    ) -> RegistryResult<()> {
        self.slot(mode)?
            .table
            .write()
            .properties_mut(operation)?
            .add_generator(generator);
        Ok(())
    }

    /// Detaches a property generator. Returns `false` if it was not attached.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::add_property_generator`].
    pub fn remove_property_generator(
        &self,
        mode: &str,
        operation: &str,
        generator: &Arc<dyn PropertyGenerator>,
    ) -> RegistryResult<bool> {
        Ok(self
            .slot(mode)?
            .table
            .write()
            .properties_mut(operation)?
            .remove_generator(generator))
    }

    /// Hides a property from results of `(mode, operation)`.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::add_property_generator`].
    pub fn suppress_property(&self, mode: &str, operation: &str, name: &str) -> RegistryResult<()> {
        if name.trim().is_empty() {
            return Err(RegistryError::invalid_argument("property name must not be empty"));
        }
        self.slot(mode)?
            .table
            .write()
            .properties_mut(operation)?
            .suppress(name);
        Ok(())
    }

    /// Hides every generated property of `(mode, operation)`.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::add_property_generator`].
    pub fn suppress_all_properties(&self, mode: &str, operation: &str) -> RegistryResult<()> {
        self.slot(mode)?
            .table
            .write()
            .properties_mut(operation)?
            .suppress_all();
        Ok(())
    }

    /// Copies property `name` from source `source_index` of each invocation.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::add_property_generator`].
    pub fn copy_property_from_source(
        &self,
        mode: &str,
        operation: &str,
        name: &str,
        source_index: usize,
    ) -> RegistryResult<()> {
        if name.trim().is_empty() {
            return Err(RegistryError::invalid_argument("property name must not be empty"));
        }
        self.slot(mode)?
            .table
            .write()
            .properties_mut(operation)?
            .copy_from_source(name, source_index);
        Ok(())
    }

    /// Resets the property state of every operation in `mode` to the
    /// generators declared by its descriptor.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidArgument`] if the mode does not support properties.
    pub fn clear_property_state(&self, mode: &str) -> RegistryResult<()> {
        let slot = self.slot(mode)?;
        slot.table.write().reset_properties()?;
        tracing::debug!(mode = slot.name(), "property state cleared");
        Ok(())
    }

    /// Names produced by generators or copy directives, minus suppressed ones.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::add_property_generator`].
    pub fn generated_property_names(&self, mode: &str, operation: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .slot(mode)?
            .table
            .read()
            .properties(operation)?
            .generated_names())
    }

    /// Resolves the property environment for one invocation.
    ///
    /// # Errors
    ///
    /// Same as [`OperationRegistry::add_property_generator`].
    pub fn property_source(
        &self,
        mode: &str,
        operation: &str,
        params: &ParameterBlock,
    ) -> RegistryResult<ResolvedProperties> {
        Ok(self
            .slot(mode)?
            .table
            .read()
            .properties(operation)?
            .resolve(params))
    }

    // -- snapshot ----------------------------------------------------------

    /// Serializable view of the whole catalog.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let order = self.mode_order.read().clone();
        let modes = order
            .iter()
            .filter_map(|key| self.modes.get(key).map(|slot| Arc::clone(slot.value())))
            .map(|slot| ModeSnapshot::from_table(&slot.table.read()))
            .collect();
        RegistrySnapshot { modes }
    }

    // -- internals ---------------------------------------------------------

    fn slot(&self, mode: &str) -> RegistryResult<Arc<ModeSlot>> {
        self.modes
            .get(&CaselessKey::new(mode))
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| RegistryError::UnknownMode {
                mode: mode.to_string(),
            })
    }

    fn typed_slot<M: RegistryMode>(&self) -> RegistryResult<Arc<ModeSlot>> {
        let slot = self.slot(M::NAME)?;
        if slot.descriptor.is_mode::<M>() {
            Ok(slot)
        } else {
            Err(RegistryError::Configuration(format!(
                "mode \"{}\" is defined with a different shape than {}",
                M::NAME,
                std::any::type_name::<M>()
            )))
        }
    }

    fn slots_of_kind(&self, kind: DescriptorKind) -> Vec<Arc<ModeSlot>> {
        let order = self.mode_order.read().clone();
        order
            .iter()
            .filter_map(|key| self.modes.get(key).map(|slot| Arc::clone(slot.value())))
            .filter(|slot| slot.descriptor.descriptor_kind() == kind)
            .collect()
    }

    /// Copies the operation out under a read lock, then orders it.
    fn ordered_candidates(&self, slot: &ModeSlot, operation: &str) -> RegistryResult<Vec<Candidate>> {
        let view = slot.table.read().operation_view(operation)?;
        let observer = self.observer.load();

        let Some(products) = view.ordered_products() else {
            observer.on_product_cycle(slot.entry_key(operation, None));
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        for product in products {
            match product.resolve() {
                Some(order) => candidates.extend(order.into_iter().map(|factory| Candidate {
                    namespace: product.namespace.clone(),
                    factory,
                })),
                None => observer.on_cycle(slot.entry_key(operation, product.namespace_name())),
            }
        }
        Ok(candidates)
    }

    /// Runs `call` on each candidate until one produces a value.
    fn first_success<T>(
        &self,
        slot: &ModeSlot,
        operation: &str,
        candidates: &[Candidate],
        mut call: impl FnMut(&FactoryRef) -> anyhow::Result<Option<T>>,
    ) -> Option<T> {
        for candidate in candidates {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| call(&candidate.factory))) {
                Ok(result) => result.map_err(FailureReason::Error),
                Err(payload) => Err(FailureReason::Panic(panic_message(payload.as_ref()))),
            };

            match outcome {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {
                    tracing::trace!(
                        mode = slot.name(),
                        operation,
                        factory = candidate.factory.type_name(),
                        "factory declined"
                    );
                }
                Err(reason) => {
                    let namespace = candidate.namespace.as_ref().map(CaselessKey::name);
                    self.observer.load().on_factory_failed(&FactoryFailure {
                        key: slot.entry_key(operation, namespace),
                        factory: &candidate.factory,
                        reason,
                    });
                }
            }
        }
        None
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("config", &self.config)
            .field("modes", &self.registry_modes())
            .field("observers", &self.observer.load().len())
            .finish()
    }
}

/// Pretty-printed JSON of [`OperationRegistry::snapshot`].
impl fmt::Display for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.snapshot()).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use opreg_core::{PropertySource, PropertyValue};

    use super::*;

    trait Stub: Send + Sync {
        fn run(&self, input: &i32) -> anyhow::Result<Option<i32>>;
    }

    struct Value(i32);
    impl Stub for Value {
        fn run(&self, input: &i32) -> anyhow::Result<Option<i32>> {
            Ok(Some(self.0 + input))
        }
    }

    struct Decline;
    impl Stub for Decline {
        fn run(&self, _input: &i32) -> anyhow::Result<Option<i32>> {
            Ok(None)
        }
    }

    struct Fail;
    impl Stub for Fail {
        fn run(&self, _input: &i32) -> anyhow::Result<Option<i32>> {
            anyhow::bail!("unsupported input")
        }
    }

    struct Panic;
    impl Stub for Panic {
        fn run(&self, _input: &i32) -> anyhow::Result<Option<i32>> {
            panic!("factory bug")
        }
    }

    struct StubMode;
    impl RegistryMode for StubMode {
        const NAME: &'static str = "stub";
        const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Operation;
        const SUPPORTS_PREFERENCES: bool = true;
        const SUPPORTS_PROPERTIES: bool = true;
        type Factory = dyn Stub;
        type Args = i32;
        type Output = i32;

        fn invoke(factory: &Self::Factory, args: &Self::Args) -> anyhow::Result<Option<i32>> {
            factory.run(args)
        }
    }

    struct SoloMode;
    impl RegistryMode for SoloMode {
        const NAME: &'static str = "solo";
        const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Operation;
        const SUPPORTS_PREFERENCES: bool = false;
        const SUPPORTS_PROPERTIES: bool = false;
        type Factory = dyn Stub;
        type Args = i32;
        type Output = i32;

        fn invoke(factory: &Self::Factory, args: &Self::Args) -> anyhow::Result<Option<i32>> {
            factory.run(args)
        }
    }

    #[derive(Default)]
    struct Counting {
        registered: AtomicUsize,
        unregistered: AtomicUsize,
        failures: AtomicUsize,
        cycles: AtomicUsize,
        product_cycles: AtomicUsize,
    }

    impl DispatchObserver for Counting {
        fn on_register(&self, _: EntryKey<'_>, _: &FactoryRef) {
            self.registered.fetch_add(1, Ordering::Relaxed);
        }
        fn on_unregister(&self, _: EntryKey<'_>, _: &FactoryRef) {
            self.unregistered.fetch_add(1, Ordering::Relaxed);
        }
        fn on_cycle(&self, _: EntryKey<'_>) {
            self.cycles.fetch_add(1, Ordering::Relaxed);
        }
        fn on_product_cycle(&self, _: EntryKey<'_>) {
            self.product_cycles.fetch_add(1, Ordering::Relaxed);
        }
        fn on_factory_failed(&self, _: &FactoryFailure<'_>) {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stub(p: impl Stub + 'static) -> FactoryRef {
        FactoryRef::new(Arc::new(p) as Arc<dyn Stub>)
    }

    fn registry() -> (OperationRegistry, Arc<Counting>) {
        let registry = OperationRegistry::with_config(RegistryConfig::bare());
        registry.define::<StubMode>().unwrap();
        registry.define::<SoloMode>().unwrap();
        registry
            .register_descriptor(
                Descriptor::new("Blur", DescriptorKind::Operation)
                    .with_mode("stub")
                    .with_mode("solo")
                    .with_properties(),
            )
            .unwrap();
        let counting = Arc::new(Counting::default());
        registry.add_observer(Arc::clone(&counting) as Arc<dyn DispatchObserver>);
        (registry, counting)
    }

    #[test]
    fn define_mode_is_idempotent_but_rejects_reshaping() {
        let registry = OperationRegistry::with_config(RegistryConfig::bare());
        assert!(registry.define::<StubMode>().unwrap());
        assert!(!registry.define::<StubMode>().unwrap());

        struct Impostor;
        impl RegistryMode for Impostor {
            const NAME: &'static str = "STUB";
            const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Codec;
            const SUPPORTS_PREFERENCES: bool = true;
            const SUPPORTS_PROPERTIES: bool = false;
            type Factory = dyn Stub;
            type Args = i32;
            type Output = i32;
            fn invoke(factory: &Self::Factory, args: &Self::Args) -> anyhow::Result<Option<i32>> {
                factory.run(args)
            }
        }
        assert!(matches!(
            registry.define::<Impostor>(),
            Err(RegistryError::Configuration(_))
        ));
        assert!(matches!(
            registry.invoke::<Impostor>("Blur", &1),
            Err(RegistryError::Configuration(_))
        ));
        assert_eq!(registry.registry_modes(), vec!["stub"]);
    }

    #[test]
    fn default_registry_has_builtin_modes() {
        let registry = OperationRegistry::new();
        assert_eq!(
            registry.registry_modes(),
            vec![
                "rendered",
                "renderable",
                "collection",
                "renderableCollection",
                "remoteRenderable",
                "tileDecoder",
                "tileEncoder",
            ]
        );
        assert!(registry.mode_descriptor("TILEDECODER").is_some());
    }

    #[test]
    fn unknown_mode_and_operation() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.register_factory("nope", "Blur", Some("acme"), stub(Value(1))),
            Err(RegistryError::UnknownMode { .. })
        ));
        assert!(matches!(
            registry.get_factory("stub", "Sharpen"),
            Err(RegistryError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn blur_scenario_orders_by_preference_then_registration() {
        let (registry, _) = registry();
        let (f1, f2, f3) = (stub(Value(1)), stub(Value(2)), stub(Value(3)));
        for f in [&f1, &f2, &f3] {
            registry
                .register_factory("stub", "Blur", Some("acme"), f.clone())
                .unwrap();
        }
        registry
            .set_preference("stub", "Blur", Some("acme"), &f2, &f1)
            .unwrap();
        registry
            .set_preference("stub", "Blur", Some("acme"), &f2, &f3)
            .unwrap();

        let order = registry
            .get_ordered_list("stub", "Blur", Some("acme"))
            .unwrap()
            .unwrap();
        assert_eq!(order, vec![f2.clone(), f1, f3]);
        assert_eq!(registry.get_factory("stub", "Blur").unwrap(), Some(f2));
        assert_eq!(registry.invoke::<StubMode>("Blur", &10).unwrap(), Some(12));
    }

    #[test]
    fn cyclic_preferences_yield_none_and_are_skipped() {
        let (registry, counting) = registry();
        let (a, b, c) = (stub(Value(1)), stub(Value(2)), stub(Value(3)));
        for f in [&a, &b, &c] {
            registry
                .register_factory("stub", "Blur", Some("acme"), f.clone())
                .unwrap();
        }
        let other = stub(Value(100));
        registry
            .register_factory("stub", "Blur", Some("zeta"), other.clone())
            .unwrap();
        registry.set_preference("stub", "Blur", Some("acme"), &a, &b).unwrap();
        registry.set_preference("stub", "Blur", Some("acme"), &b, &c).unwrap();
        registry.set_preference("stub", "Blur", Some("acme"), &c, &a).unwrap();

        assert_eq!(
            registry.get_ordered_list("stub", "Blur", Some("acme")).unwrap(),
            None
        );
        let all: Vec<_> = registry.get_factory_iterator("stub", "Blur").unwrap().collect();
        assert_eq!(all, vec![other]);
        assert_eq!(counting.cycles.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn ordered_list_of_empty_namespace_is_empty() {
        let (registry, _) = registry();
        assert_eq!(
            registry.get_ordered_list("stub", "Blur", Some("acme")).unwrap(),
            Some(vec![])
        );
        assert_eq!(registry.get_factory("stub", "Blur").unwrap(), None);
        assert_eq!(registry.invoke::<StubMode>("Blur", &0).unwrap(), None);
    }

    #[test]
    fn fallback_invocation_skips_failures_and_declines() {
        let (registry, counting) = registry();
        for f in [stub(Fail), stub(Decline), stub(Panic), stub(Value(7))] {
            registry
                .register_factory("stub", "Blur", Some("acme"), f)
                .unwrap();
        }
        assert_eq!(registry.invoke::<StubMode>("Blur", &1).unwrap(), Some(8));
        assert_eq!(counting.failures.load(Ordering::Relaxed), 2);

        let erased = registry
            .invoke_factory("stub", "Blur", &1_i32)
            .unwrap()
            .unwrap();
        assert_eq!(*erased.downcast::<i32>().unwrap(), 8);
    }

    #[test]
    fn every_factory_failing_yields_none() {
        let (registry, counting) = registry();
        for f in [stub(Fail), stub(Decline)] {
            registry
                .register_factory("stub", "Blur", Some("acme"), f)
                .unwrap();
        }
        assert_eq!(registry.invoke::<StubMode>("Blur", &1).unwrap(), None);
        assert_eq!(counting.failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn invoke_factory_checks_argument_type() {
        let (registry, _) = registry();
        let err = registry
            .invoke_factory("stub", "Blur", &"not an i32")
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }

    #[test]
    fn unregister_cleans_preferences_and_notifies() {
        let (registry, counting) = registry();
        let (a, b) = (stub(Value(1)), stub(Value(2)));
        registry.register_factory("stub", "Blur", Some("acme"), a.clone()).unwrap();
        registry.register_factory("stub", "Blur", Some("acme"), a.clone()).unwrap();
        registry.register_factory("stub", "Blur", Some("acme"), b.clone()).unwrap();
        registry.set_preference("stub", "Blur", Some("acme"), &b, &a).unwrap();

        registry.unregister_factory("stub", "Blur", Some("acme"), &b).unwrap();
        assert!(registry
            .get_preferences("stub", "Blur", Some("acme"))
            .unwrap()
            .is_empty());
        assert_eq!(counting.registered.load(Ordering::Relaxed), 2);
        assert_eq!(counting.unregistered.load(Ordering::Relaxed), 1);

        // Re-registering b starts with no preferences.
        registry.register_factory("stub", "Blur", Some("acme"), b.clone()).unwrap();
        assert_eq!(
            registry.get_ordered_list("stub", "Blur", Some("acme")).unwrap(),
            Some(vec![a, b])
        );
    }

    #[test]
    fn unset_preference_on_unregistered_factory_fails() {
        let (registry, _) = registry();
        let (a, b) = (stub(Value(1)), stub(Value(2)));
        registry.register_factory("stub", "Blur", Some("acme"), a.clone()).unwrap();
        assert!(matches!(
            registry.unset_preference("stub", "Blur", Some("acme"), &a, &b),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn solo_mode_has_no_preferences() {
        let (registry, _) = registry();
        let f = stub(Value(5));
        registry.register_factory("solo", "Blur", None, f.clone()).unwrap();
        assert!(matches!(
            registry.set_preference("solo", "Blur", None, &f, &f),
            Err(RegistryError::InvalidPreference(_))
        ));
        assert!(matches!(
            registry.get_ordered_product_list("solo", "Blur"),
            Err(RegistryError::InvalidPreference(_))
        ));
        assert_eq!(registry.invoke::<SoloMode>("Blur", &1).unwrap(), Some(6));
        let solo = registry.factory::<SoloMode>("Blur").unwrap().unwrap();
        assert_eq!(solo.run(&0).unwrap(), Some(5));
    }

    #[test]
    fn product_preferences_reorder_namespaces() {
        let (registry, counting) = registry();
        let (a, z) = (stub(Value(1)), stub(Value(2)));
        registry.register_factory("stub", "Blur", Some("acme"), a.clone()).unwrap();
        registry.register_factory("stub", "Blur", Some("zeta"), z.clone()).unwrap();
        assert_eq!(registry.get_factory("stub", "Blur").unwrap(), Some(a.clone()));

        registry
            .set_product_preference("stub", "Blur", "zeta", "acme")
            .unwrap();
        assert_eq!(
            registry.get_ordered_product_list("stub", "Blur").unwrap(),
            Some(vec!["zeta".to_string(), "acme".to_string()])
        );
        assert_eq!(registry.get_factory("stub", "Blur").unwrap(), Some(z.clone()));

        registry
            .set_product_preference("stub", "Blur", "acme", "zeta")
            .unwrap();
        assert_eq!(registry.get_ordered_product_list("stub", "Blur").unwrap(), None);
        assert_eq!(registry.get_factory_iterator("stub", "Blur").unwrap().count(), 0);
        assert_eq!(registry.get_factory("stub", "Blur").unwrap(), None);
        assert_eq!(registry.invoke::<StubMode>("Blur", &0).unwrap(), None);
        assert_eq!(counting.product_cycles.load(Ordering::Relaxed), 3);

        registry.clear_product_preferences("stub", "Blur").unwrap();
        assert!(registry.get_product_preferences("stub", "Blur").unwrap().is_empty());
        assert_eq!(registry.get_factory("stub", "Blur").unwrap(), Some(a));
    }

    #[test]
    fn iterator_is_restartable() {
        let (registry, _) = registry();
        for v in 0..3 {
            registry
                .register_factory("stub", "Blur", Some("acme"), stub(Value(v)))
                .unwrap();
        }
        let mut iter = registry.get_factory_iterator("stub", "Blur").unwrap();
        let restart = iter.clone();
        assert!(iter.next().is_some());
        assert_eq!(iter.count(), 2);
        assert_eq!(restart.count(), 3);
    }

    #[test]
    fn typed_lookup_returns_factories_in_order() {
        let (registry, _) = registry();
        let (a, b) = (stub(Value(1)), stub(Value(2)));
        registry.register_factory("stub", "Blur", Some("acme"), a.clone()).unwrap();
        registry.register_factory("stub", "Blur", Some("acme"), b.clone()).unwrap();
        registry.set_preference("stub", "Blur", Some("acme"), &b, &a).unwrap();
        let outputs: Vec<_> = registry
            .factories::<StubMode>("Blur")
            .unwrap()
            .iter()
            .map(|f| f.run(&0).unwrap().unwrap())
            .collect();
        assert_eq!(outputs, vec![2, 1]);
        let listed = registry
            .ordered_list::<StubMode>("Blur", Some("acme"))
            .unwrap()
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn descriptors_register_atomically() {
        let (registry, _) = registry();
        let err = registry
            .register_descriptor(
                Descriptor::new("Sharpen", DescriptorKind::Operation)
                    .with_mode("stub")
                    .with_mode("missing"),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMode { .. }));
        assert!(registry.get_descriptor(DescriptorKind::Operation, "Sharpen").is_none());

        let err = registry
            .register_descriptor(Descriptor::new("blur", DescriptorKind::Operation).with_mode("stub"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
        assert_eq!(registry.descriptor_names(DescriptorKind::Operation), vec!["Blur"]);
    }

    #[test]
    fn unregister_descriptor_drops_its_factories() {
        let (registry, _) = registry();
        registry
            .register_factory("stub", "Blur", Some("acme"), stub(Value(1)))
            .unwrap();
        registry
            .unregister_descriptor(DescriptorKind::Operation, "BLUR")
            .unwrap();
        assert!(matches!(
            registry.get_factory("stub", "Blur"),
            Err(RegistryError::UnknownOperation { .. })
        ));
        assert!(matches!(
            registry.unregister_descriptor(DescriptorKind::Operation, "Blur"),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    struct Radius;
    impl PropertyGenerator for Radius {
        fn property_names(&self) -> Vec<String> {
            vec!["radius".to_string()]
        }
        fn property(&self, _name: &str, params: &ParameterBlock) -> Option<PropertyValue> {
            params.parameter(0).cloned()
        }
    }

    #[test]
    fn property_environment_round_trip() {
        let (registry, _) = registry();
        let generator: Arc<dyn PropertyGenerator> = Arc::new(Radius);
        registry
            .add_property_generator("stub", "Blur", Arc::clone(&generator))
            .unwrap();
        assert_eq!(
            registry.generated_property_names("stub", "Blur").unwrap(),
            vec!["radius"]
        );
        let params = ParameterBlock::new().with_parameter(PropertyValue::Double(2.5));
        let props = registry.property_source("stub", "Blur", &params).unwrap();
        assert_eq!(props.property("Radius"), Some(PropertyValue::Double(2.5)));

        registry.suppress_property("stub", "Blur", "radius").unwrap();
        assert!(registry.generated_property_names("stub", "Blur").unwrap().is_empty());

        registry.clear_property_state("stub").unwrap();
        assert!(registry.generated_property_names("stub", "Blur").unwrap().is_empty());
        assert!(!registry.remove_property_generator("stub", "Blur", &generator).unwrap());

        assert!(matches!(
            registry.suppress_property("solo", "Blur", "radius"),
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn panics_never_reach_the_caller() {
        // No observers at all: containment does not depend on reporting.
        let registry = OperationRegistry::with_config(RegistryConfig {
            builtin_modes: false,
            log_events: false,
        });
        registry.define::<StubMode>().unwrap();
        registry
            .register_descriptor(Descriptor::new("Blur", DescriptorKind::Operation).with_mode("stub"))
            .unwrap();
        registry
            .register_factory("stub", "Blur", Some("acme"), stub(Panic))
            .unwrap();
        assert_eq!(registry.invoke::<StubMode>("Blur", &1).unwrap(), None);
        assert!(registry.invoke_factory("stub", "Blur", &1_i32).unwrap().is_none());

        registry
            .register_factory("stub", "Blur", Some("acme"), stub(Value(2)))
            .unwrap();
        assert_eq!(registry.invoke::<StubMode>("Blur", &1).unwrap(), Some(3));
    }

    /// Registers another factory from inside its own invocation.
    struct Reentrant(std::sync::Weak<OperationRegistry>);
    impl Stub for Reentrant {
        fn run(&self, input: &i32) -> anyhow::Result<Option<i32>> {
            let registry = self
                .0
                .upgrade()
                .ok_or_else(|| anyhow::anyhow!("registry dropped"))?;
            registry.register_factory("stub", "Blur", Some("late"), stub(Value(0)))?;
            let listed = registry
                .get_ordered_list("stub", "Blur", Some("acme"))?
                .map_or(0, |order| order.len());
            Ok(Some(input + i32::try_from(listed)?))
        }
    }

    #[test]
    fn factories_may_call_back_into_the_registry() {
        let (registry, counting) = registry();
        let registry = Arc::new(registry);
        registry
            .register_factory(
                "stub",
                "Blur",
                Some("acme"),
                stub(Reentrant(Arc::downgrade(&registry))),
            )
            .unwrap();

        assert_eq!(registry.invoke::<StubMode>("Blur", &10).unwrap(), Some(11));
        assert_eq!(counting.failures.load(Ordering::Relaxed), 0);
        assert_eq!(
            registry.namespaces_for("stub", "Blur").unwrap(),
            vec!["acme".to_string(), "late".to_string()]
        );
        assert_eq!(
            registry.factories_for("stub", "Blur", Some("late")).unwrap().len(),
            1
        );
        assert_eq!(registry.get_factory_iterator("stub", "Blur").unwrap().count(), 2);
    }

    #[test]
    fn readers_never_observe_a_half_applied_edit() {
        let (registry, _) = registry();
        let (a, b) = (stub(Value(1)), stub(Value(2)));
        registry
            .register_factory("stub", "Blur", Some("acme"), a.clone())
            .unwrap();

        let valid = [vec![a.clone()], vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]];
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    registry
                        .register_factory("stub", "Blur", Some("acme"), b.clone())
                        .unwrap();
                    registry
                        .set_preference("stub", "Blur", Some("acme"), &b, &a)
                        .unwrap();
                    registry
                        .unregister_factory("stub", "Blur", Some("acme"), &b)
                        .unwrap();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let listed = registry
                            .get_ordered_list("stub", "Blur", Some("acme"))
                            .unwrap()
                            .unwrap();
                        assert!(valid.contains(&listed), "unexpected order {listed:?}");
                        let first = registry.get_factory("stub", "Blur").unwrap();
                        assert!(first == Some(a.clone()) || first == Some(b.clone()));
                    }
                });
            }
        });

        assert_eq!(
            registry.get_ordered_list("stub", "Blur", Some("acme")).unwrap(),
            Some(vec![a])
        );
        assert!(registry.get_preferences("stub", "Blur", Some("acme")).unwrap().is_empty());
    }

    proptest::proptest! {
        #[test]
        fn ordered_list_honours_every_edge(
            n in 1_usize..7,
            raw_edges in proptest::collection::vec((0_usize..7, 0_usize..7), 0..12),
        ) {
            let (registry, _) = registry();
            let factories: Vec<FactoryRef> =
                (0..n).map(|v| stub(Value(i32::try_from(v).unwrap()))).collect();
            for f in &factories {
                registry.register_factory("stub", "Blur", Some("acme"), f.clone()).unwrap();
            }
            let edges: Vec<(usize, usize)> = raw_edges
                .into_iter()
                .filter(|&(a, b)| a < n && b < n && a != b)
                .collect();
            for &(a, b) in &edges {
                registry
                    .set_preference("stub", "Blur", Some("acme"), &factories[a], &factories[b])
                    .unwrap();
            }

            let listed = registry.get_ordered_list("stub", "Blur", Some("acme")).unwrap();
            let iterated: Vec<_> = registry.get_factory_iterator("stub", "Blur").unwrap().collect();
            match listed {
                Some(order) => {
                    proptest::prop_assert_eq!(order.len(), n);
                    let position = |f: &FactoryRef| order.iter().position(|o| o == f).unwrap();
                    for &(a, b) in &edges {
                        proptest::prop_assert!(position(&factories[a]) < position(&factories[b]));
                    }
                    proptest::prop_assert_eq!(iterated, order);
                }
                None => proptest::prop_assert!(iterated.is_empty()),
            }
        }
    }

    #[test]
    fn display_renders_json_snapshot() {
        let (registry, _) = registry();
        registry
            .register_factory("stub", "Blur", Some("acme"), stub(Value(1)))
            .unwrap();
        let rendered = registry.to_string();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["modes"][0]["name"], "stub");
        assert_eq!(parsed["modes"][0]["operations"][0]["name"], "Blur");
    }
}
