//! `collection` mode: factories that produce an ordered group of rendered
//! images.

use std::sync::Arc;

use opreg_core::{
    CollectionImage, DescriptorKind, FactoryRef, ParameterBlock, RegistryMode, RegistryResult,
    RenderingHints,
};

use crate::default_registry::resolve;
use crate::registry::OperationRegistry;

/// Produces image collections for one operation.
pub trait CollectionImageFactory: Send + Sync {
    /// Creates the collection, or `Ok(None)` to decline.
    ///
    /// # Errors
    ///
    /// Any error is treated as "this factory declined".
    fn create(
        &self,
        params: &ParameterBlock,
        hints: &RenderingHints,
    ) -> anyhow::Result<Option<CollectionImage>>;
}

/// Arguments handed to every candidate factory.
#[derive(Debug, Clone, Default)]
pub struct CollectionArgs {
    pub params: ParameterBlock,
    pub hints: RenderingHints,
}

/// Marker for the `collection` mode.
#[derive(Debug, Clone, Copy)]
pub struct CollectionMode;

impl RegistryMode for CollectionMode {
    const NAME: &'static str = "collection";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Operation;
    const SUPPORTS_PREFERENCES: bool = true;
    const SUPPORTS_PROPERTIES: bool = true;

    type Factory = dyn CollectionImageFactory;
    type Args = CollectionArgs;
    type Output = CollectionImage;

    fn invoke(factory: &Self::Factory, args: &Self::Args) -> anyhow::Result<Option<CollectionImage>> {
        factory.create(&args.params, &args.hints)
    }
}

frontend!(preferences: CollectionMode);

/// Creates a collection with the best available factory for `operation`.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    operation: &str,
    params: ParameterBlock,
    hints: RenderingHints,
) -> RegistryResult<Option<CollectionImage>> {
    resolve(registry).invoke::<CollectionMode>(operation, &CollectionArgs { params, hints })
}
