//! `opreg` core — registry modes, element descriptors, the preference graph,
//! and the collaborator types that appear in factory signatures.

pub mod descriptor;
pub mod error;
pub mod graph;
pub mod key;
pub mod mode;
pub mod types;

pub use descriptor::{Descriptor, PropertyGenerator};
pub use error::{RegistryError, RegistryResult};
pub use graph::{resolve_order, PreferenceGraph};
pub use key::CaselessKey;
pub use mode::{
    DescriptorKind, ErasedOutput, FactoryId, FactoryRef, InvokeFn, ModeDescriptor, RegistryMode,
};
pub use types::{
    CollectionImage, ParameterBlock, ParameterValue, PropertySource, PropertyValue, Raster,
    RenderContext, RenderableCollection, RenderableImage, RenderedImage, RenderingHints,
    SampleLayout, TileCodecParameterList, TileDecoder, TileEncoder,
};
