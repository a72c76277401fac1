//! `rendered` mode: factories that produce a rendered image from a
//! parameter block and rendering hints.

use std::sync::Arc;

use opreg_core::{
    DescriptorKind, FactoryRef, ParameterBlock, RegistryMode, RegistryResult, RenderedImage,
    RenderingHints,
};

use crate::default_registry::resolve;
use crate::properties::ResolvedProperties;
use crate::registry::OperationRegistry;

/// Produces rendered images for one operation.
pub trait RenderedImageFactory: Send + Sync {
    /// Creates the rendering, or `Ok(None)` if this factory cannot handle
    /// the given sources and parameters.
    ///
    /// # Errors
    ///
    /// Any error makes the registry move on to the next factory.
    fn create(
        &self,
        params: &ParameterBlock,
        hints: &RenderingHints,
    ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>>;
}

/// Arguments handed to every candidate factory.
#[derive(Debug, Clone, Default)]
pub struct RenderedArgs {
    pub params: ParameterBlock,
    pub hints: RenderingHints,
}

/// Marker for the `rendered` mode.
#[derive(Debug, Clone, Copy)]
pub struct RenderedMode;

impl RegistryMode for RenderedMode {
    const NAME: &'static str = "rendered";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Operation;
    const SUPPORTS_PREFERENCES: bool = true;
    const SUPPORTS_PROPERTIES: bool = true;

    type Factory = dyn RenderedImageFactory;
    type Args = RenderedArgs;
    type Output = Arc<dyn RenderedImage>;

    fn invoke(
        factory: &Self::Factory,
        args: &Self::Args,
    ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>> {
        factory.create(&args.params, &args.hints)
    }
}

frontend!(preferences: RenderedMode);

/// Creates a rendering with the best available factory for `operation`.
///
/// `Ok(None)` if every factory declined or failed.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    operation: &str,
    params: ParameterBlock,
    hints: RenderingHints,
) -> RegistryResult<Option<Arc<dyn RenderedImage>>> {
    resolve(registry).invoke::<RenderedMode>(operation, &RenderedArgs { params, hints })
}

/// Property environment of `operation` for the given sources and parameters.
///
/// # Errors
///
/// See [`OperationRegistry::property_source`].
pub fn property_source(
    registry: Option<&OperationRegistry>,
    operation: &str,
    params: &ParameterBlock,
) -> RegistryResult<ResolvedProperties> {
    resolve(registry).property_source(RenderedMode::NAME, operation, params)
}
