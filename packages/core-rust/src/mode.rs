//! Registry modes: the contract each family of pluggable factories follows.
//!
//! A mode is described once by a [`RegistryMode`] implementation. From it a
//! [`ModeDescriptor`] is built that carries the mode's name, flags, and a
//! monomorphized invocation function, so the registry can call factories of
//! any mode through a single type-erased path without runtime method lookup.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key::CaselessKey;

// ---------------------------------------------------------------------------
// DescriptorKind
// ---------------------------------------------------------------------------

/// The kind of element descriptor that declares operation names for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DescriptorKind {
    /// Image operations (rendered, renderable, collection modes).
    Operation,
    /// Remote imaging protocols.
    Remote,
    /// Tile codec formats.
    Codec,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Operation => "operation",
            Self::Remote => "remote",
            Self::Codec => "codec",
        })
    }
}

// ---------------------------------------------------------------------------
// FactoryRef
// ---------------------------------------------------------------------------

/// Identity of a registered factory: the address of its shared allocation.
///
/// Stable for as long as any `Arc` to the factory is alive, which the
/// registry guarantees while the factory is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactoryId(usize);

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Type-erased, cheaply cloneable reference to a factory instance.
///
/// Wraps an `Arc<F>` where `F` is usually a factory trait object such as
/// `dyn RenderedImageFactory`. Two `FactoryRef`s are equal when they wrap
/// the same allocation.
#[derive(Clone)]
pub struct FactoryRef {
    id: FactoryId,
    type_id: TypeId,
    type_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
}

impl FactoryRef {
    /// Wraps a shared factory.
    #[must_use]
    pub fn new<F>(factory: Arc<F>) -> Self
    where
        F: ?Sized + Send + Sync + 'static,
    {
        let id = FactoryId(Arc::as_ptr(&factory).cast::<()>() as usize);
        Self {
            id,
            type_id: TypeId::of::<F>(),
            type_name: type_name::<F>(),
            instance: Arc::new(factory),
        }
    }

    /// Allocation identity.
    #[must_use]
    pub fn id(&self) -> FactoryId {
        self.id
    }

    /// Name of the wrapped factory type (diagnostics only).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the wrapped factory is an `Arc<F>`.
    #[must_use]
    pub fn is<F: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<F>()
    }

    /// Recovers the typed factory.
    #[must_use]
    pub fn downcast<F>(&self) -> Option<Arc<F>>
    where
        F: ?Sized + Send + Sync + 'static,
    {
        self.instance.downcast_ref::<Arc<F>>().cloned()
    }
}

impl PartialEq for FactoryRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FactoryRef {}

impl std::hash::Hash for FactoryRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for FactoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRef")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RegistryMode
// ---------------------------------------------------------------------------

/// Compile-time description of a mode.
///
/// Implemented on a zero-sized marker type per mode. The registry uses it to
/// type-check registrations and to invoke factories without reflection.
pub trait RegistryMode: Send + Sync + 'static {
    /// Unique (caseless) mode name.
    const NAME: &'static str;
    /// Kind of descriptor that declares operation names for this mode.
    const DESCRIPTOR_KIND: DescriptorKind;
    /// Whether factories under one operation may be grouped in products and ordered.
    const SUPPORTS_PREFERENCES: bool;
    /// Whether the mode maintains a property environment per operation.
    const SUPPORTS_PROPERTIES: bool;

    /// Factory contract, usually a trait object.
    type Factory: ?Sized + Send + Sync + 'static;
    /// Arguments passed to every candidate factory.
    type Args: 'static;
    /// Value a successful factory produces.
    type Output: Send + 'static;

    /// Calls one factory. `Ok(None)` means the factory declined.
    ///
    /// # Errors
    ///
    /// Any error is treated by the registry as "this candidate declined".
    fn invoke(factory: &Self::Factory, args: &Self::Args) -> anyhow::Result<Option<Self::Output>>;
}

/// Type-erased output of a factory invocation.
pub type ErasedOutput = Box<dyn Any + Send>;

/// Monomorphized invocation entry point stored in a [`ModeDescriptor`].
pub type InvokeFn = fn(&FactoryRef, &dyn Any) -> anyhow::Result<Option<ErasedOutput>>;

fn invoke_erased<M: RegistryMode>(
    factory: &FactoryRef,
    args: &dyn Any,
) -> anyhow::Result<Option<ErasedOutput>> {
    let typed = factory.downcast::<M::Factory>().ok_or_else(|| {
        anyhow::anyhow!(
            "factory {} is not a {} factory",
            factory.type_name(),
            M::NAME
        )
    })?;
    let args = args.downcast_ref::<M::Args>().ok_or_else(|| {
        anyhow::anyhow!("arguments are not {}", type_name::<M::Args>())
    })?;
    Ok(M::invoke(&typed, args)?.map(|out| Box::new(out) as ErasedOutput))
}

fn accepts_args<M: RegistryMode>(args: &dyn Any) -> bool {
    args.is::<M::Args>()
}

// ---------------------------------------------------------------------------
// ModeDescriptor
// ---------------------------------------------------------------------------

/// Immutable runtime description of a mode.
#[derive(Clone)]
pub struct ModeDescriptor {
    name: CaselessKey,
    descriptor_kind: DescriptorKind,
    supports_preferences: bool,
    supports_properties: bool,
    factory_type: TypeId,
    factory_type_name: &'static str,
    args_type: TypeId,
    args_type_name: &'static str,
    output_type: TypeId,
    output_type_name: &'static str,
    invoke: InvokeFn,
    accepts_args: fn(&dyn Any) -> bool,
}

impl ModeDescriptor {
    /// Builds the descriptor for mode `M`.
    #[must_use]
    pub fn of<M: RegistryMode>() -> Self {
        Self {
            name: CaselessKey::new(M::NAME),
            descriptor_kind: M::DESCRIPTOR_KIND,
            supports_preferences: M::SUPPORTS_PREFERENCES,
            supports_properties: M::SUPPORTS_PROPERTIES,
            factory_type: TypeId::of::<M::Factory>(),
            factory_type_name: type_name::<M::Factory>(),
            args_type: TypeId::of::<M::Args>(),
            args_type_name: type_name::<M::Args>(),
            output_type: TypeId::of::<M::Output>(),
            output_type_name: type_name::<M::Output>(),
            invoke: invoke_erased::<M>,
            accepts_args: accepts_args::<M>,
        }
    }

    /// Mode name.
    #[must_use]
    pub fn name(&self) -> &CaselessKey {
        &self.name
    }

    /// Descriptor kind that declares operations for this mode.
    #[must_use]
    pub fn descriptor_kind(&self) -> DescriptorKind {
        self.descriptor_kind
    }

    /// Whether factory and product preferences are supported.
    #[must_use]
    pub fn supports_preferences(&self) -> bool {
        self.supports_preferences
    }

    /// Whether property environments are supported.
    #[must_use]
    pub fn supports_properties(&self) -> bool {
        self.supports_properties
    }

    /// Factory contract type name.
    #[must_use]
    pub fn factory_type_name(&self) -> &'static str {
        self.factory_type_name
    }

    /// Argument type name.
    #[must_use]
    pub fn args_type_name(&self) -> &'static str {
        self.args_type_name
    }

    /// Output type name.
    #[must_use]
    pub fn output_type_name(&self) -> &'static str {
        self.output_type_name
    }

    /// Returns `true` if `factory` implements this mode's factory contract.
    #[must_use]
    pub fn accepts_factory(&self, factory: &FactoryRef) -> bool {
        factory.type_id == self.factory_type
    }

    /// Returns `true` if `args` has this mode's argument type.
    #[must_use]
    pub fn accepts_args(&self, args: &dyn Any) -> bool {
        (self.accepts_args)(args)
    }

    /// Returns `true` if this descriptor was built from mode `M`.
    #[must_use]
    pub fn is_mode<M: RegistryMode>(&self) -> bool {
        self.same_shape(&Self::of::<M>())
    }

    /// Two descriptors have the same shape when every declared property matches.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.name == other.name
            && self.descriptor_kind == other.descriptor_kind
            && self.supports_preferences == other.supports_preferences
            && self.supports_properties == other.supports_properties
            && self.factory_type == other.factory_type
            && self.args_type == other.args_type
            && self.output_type == other.output_type
    }

    /// Invokes one factory through the erased entry point.
    ///
    /// # Errors
    ///
    /// Propagates whatever the factory returned, plus a type mismatch error if
    /// the factory or arguments do not belong to this mode.
    pub fn invoke(
        &self,
        factory: &FactoryRef,
        args: &dyn Any,
    ) -> anyhow::Result<Option<ErasedOutput>> {
        (self.invoke)(factory, args)
    }
}

impl fmt::Debug for ModeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeDescriptor")
            .field("name", &self.name)
            .field("descriptor_kind", &self.descriptor_kind)
            .field("supports_preferences", &self.supports_preferences)
            .field("supports_properties", &self.supports_properties)
            .field("factory", &self.factory_type_name)
            .field("args", &self.args_type_name)
            .field("output", &self.output_type_name)
            .finish_non_exhaustive()
    }
}
