//! `renderable` mode: context-aware factories that render a
//! resolution-independent operation for a specific render context.

use std::sync::Arc;

use opreg_core::{
    DescriptorKind, FactoryRef, ParameterBlock, RegistryMode, RegistryResult, RenderContext,
    RenderedImage,
};

use crate::default_registry::resolve;
use crate::registry::OperationRegistry;

/// Renders an operation for a given device-space context.
pub trait ContextualRenderedImageFactory: Send + Sync {
    /// Creates the rendering for `context`.
    ///
    /// # Errors
    ///
    /// Any error is treated as "this factory declined".
    fn create(
        &self,
        context: &RenderContext,
        params: &ParameterBlock,
    ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>>;

    /// User-space bounds `(x, y, width, height)` of the result, if known
    /// without rendering.
    fn bounds(&self, _params: &ParameterBlock) -> Option<(f64, f64, f64, f64)> {
        None
    }
}

/// Arguments handed to the factory.
#[derive(Debug, Clone, Default)]
pub struct RenderableArgs {
    pub context: RenderContext,
    pub params: ParameterBlock,
}

/// Marker for the `renderable` mode.
#[derive(Debug, Clone, Copy)]
pub struct RenderableMode;

impl RegistryMode for RenderableMode {
    const NAME: &'static str = "renderable";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Operation;
    const SUPPORTS_PREFERENCES: bool = false;
    const SUPPORTS_PROPERTIES: bool = true;

    type Factory = dyn ContextualRenderedImageFactory;
    type Args = RenderableArgs;
    type Output = Arc<dyn RenderedImage>;

    fn invoke(
        factory: &Self::Factory,
        args: &Self::Args,
    ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>> {
        factory.create(&args.context, &args.params)
    }
}

frontend!(single: RenderableMode);

/// Renders `operation` for `context`.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    operation: &str,
    context: RenderContext,
    params: ParameterBlock,
) -> RegistryResult<Option<Arc<dyn RenderedImage>>> {
    resolve(registry).invoke::<RenderableMode>(operation, &RenderableArgs { context, params })
}
