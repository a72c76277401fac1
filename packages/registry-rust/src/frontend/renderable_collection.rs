//! `renderableCollection` mode: factories that produce a group of
//! renderable images from a parameter block.

use std::sync::Arc;

use opreg_core::{
    DescriptorKind, FactoryRef, ParameterBlock, RegistryMode, RegistryResult, RenderableCollection,
};

use crate::default_registry::resolve;
use crate::registry::OperationRegistry;

/// Produces renderable collections for one operation.
pub trait RenderableCollectionFactory: Send + Sync {
    /// Creates the collection, or `Ok(None)` to decline.
    ///
    /// # Errors
    ///
    /// Any error is treated as "this factory declined".
    fn create(&self, params: &ParameterBlock) -> anyhow::Result<Option<RenderableCollection>>;
}

/// Marker for the `renderableCollection` mode.
#[derive(Debug, Clone, Copy)]
pub struct RenderableCollectionMode;

impl RegistryMode for RenderableCollectionMode {
    const NAME: &'static str = "renderableCollection";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Operation;
    const SUPPORTS_PREFERENCES: bool = false;
    const SUPPORTS_PROPERTIES: bool = true;

    type Factory = dyn RenderableCollectionFactory;
    type Args = ParameterBlock;
    type Output = RenderableCollection;

    fn invoke(
        factory: &Self::Factory,
        args: &Self::Args,
    ) -> anyhow::Result<Option<RenderableCollection>> {
        factory.create(args)
    }
}

frontend!(single: RenderableCollectionMode);

/// Creates a renderable collection for `operation`.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    operation: &str,
    params: &ParameterBlock,
) -> RegistryResult<Option<RenderableCollection>> {
    resolve(registry).invoke::<RenderableCollectionMode>(operation, params)
}
