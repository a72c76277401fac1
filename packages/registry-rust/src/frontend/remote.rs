//! `remoteRenderable` mode: factories that run an operation on a remote
//! imaging server. Operations in this mode are keyed by protocol name.

use std::sync::Arc;

use opreg_core::{
    DescriptorKind, FactoryRef, ParameterBlock, RegistryMode, RegistryResult, RenderContext,
    RenderedImage,
};

use crate::default_registry::resolve;
use crate::registry::OperationRegistry;

/// Performs an operation on a remote server over one protocol.
pub trait RemoteRenderedImageFactory: Send + Sync {
    /// Asks `server` to run `operation` and returns a handle to the result.
    ///
    /// # Errors
    ///
    /// Connection or protocol failures; the registry treats them as a decline.
    fn create(
        &self,
        server: &str,
        operation: &str,
        context: &RenderContext,
        params: &ParameterBlock,
    ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>>;
}

/// Arguments handed to the protocol's factory.
#[derive(Debug, Clone, Default)]
pub struct RemoteArgs {
    pub server: String,
    pub operation: String,
    pub context: RenderContext,
    pub params: ParameterBlock,
}

/// Marker for the `remoteRenderable` mode.
#[derive(Debug, Clone, Copy)]
pub struct RemoteMode;

impl RegistryMode for RemoteMode {
    const NAME: &'static str = "remoteRenderable";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Remote;
    const SUPPORTS_PREFERENCES: bool = false;
    const SUPPORTS_PROPERTIES: bool = false;

    type Factory = dyn RemoteRenderedImageFactory;
    type Args = RemoteArgs;
    type Output = Arc<dyn RenderedImage>;

    fn invoke(
        factory: &Self::Factory,
        args: &Self::Args,
    ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>> {
        factory.create(&args.server, &args.operation, &args.context, &args.params)
    }
}

frontend!(single: RemoteMode);

/// Runs `operation` on `server` through `protocol`.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    protocol: &str,
    server: &str,
    operation: &str,
    context: RenderContext,
    params: ParameterBlock,
) -> RegistryResult<Option<Arc<dyn RenderedImage>>> {
    let args = RemoteArgs {
        server: server.to_string(),
        operation: operation.to_string(),
        context,
        params,
    };
    resolve(registry).invoke::<RemoteMode>(protocol, &args)
}

#[cfg(test)]
mod tests {
    use opreg_core::{Descriptor, RegistryError};

    use super::*;
    use crate::frontend::test_support::{image, tag_of};

    struct Loopback;
    impl RemoteRenderedImageFactory for Loopback {
        fn create(
            &self,
            server: &str,
            _operation: &str,
            _context: &RenderContext,
            _params: &ParameterBlock,
        ) -> anyhow::Result<Option<Arc<dyn RenderedImage>>> {
            if server != "localhost" {
                anyhow::bail!("cannot reach {server}");
            }
            Ok(Some(image("remote")))
        }
    }

    fn registry() -> OperationRegistry {
        let registry = OperationRegistry::new();
        registry
            .register_descriptor(Descriptor::new("jairmi", DescriptorKind::Remote).with_mode("remoteRenderable"))
            .unwrap();
        registry
    }

    #[test]
    fn invokes_protocol_factory() {
        let registry = registry();
        register(Some(&registry), "jairmi", Arc::new(Loopback)).unwrap();

        let out = create(
            Some(&registry),
            "JAIRMI",
            "localhost",
            "Blur",
            RenderContext::default(),
            ParameterBlock::new(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(tag_of(out.as_ref()).as_deref(), Some("remote"));

        let unreachable = create(
            Some(&registry),
            "jairmi",
            "example.org",
            "Blur",
            RenderContext::default(),
            ParameterBlock::new(),
        )
        .unwrap();
        assert!(unreachable.is_none());
    }

    #[test]
    fn operation_descriptor_is_rejected_for_remote_mode() {
        let registry = registry();
        let err = registry
            .register_descriptor(Descriptor::new("Blur", DescriptorKind::Operation).with_mode("remoteRenderable"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));
    }
}
