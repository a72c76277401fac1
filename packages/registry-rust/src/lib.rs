//! `opreg` — operation registry with per-mode factory catalogs, vendor
//! preferences, and typed front-ends for the built-in modes.

pub mod config;
pub mod default_registry;
pub mod frontend;
pub mod observer;
pub mod properties;
pub mod registry;
pub mod snapshot;
pub mod table;

pub use config::RegistryConfig;
pub use default_registry::{default_registry, reset_default_registry, set_default_registry};
pub use observer::{
    CompositeDispatchObserver, DispatchObserver, EntryKey, FactoryFailure, FailureReason,
    TracingObserver,
};
pub use properties::{PropertyState, ResolvedProperties};
pub use registry::{FactoryIter, OperationRegistry};
pub use snapshot::{
    FactorySnapshot, ModeSnapshot, OperationSnapshot, PreferenceSnapshot, ProductSnapshot,
    RegistrySnapshot,
};

pub use opreg_core::{
    CaselessKey, Descriptor, DescriptorKind, FactoryRef, ModeDescriptor, ParameterBlock,
    ParameterValue, PropertyGenerator, PropertySource, RegistryError, RegistryMode,
    RegistryResult,
};
