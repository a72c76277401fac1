//! Typed front-ends, one per built-in mode.
//!
//! Each submodule declares the mode's factory trait, its argument bundle,
//! the [`RegistryMode`](opreg_core::RegistryMode) marker, and free functions
//! that forward to an [`OperationRegistry`] with the mode fixed. Every
//! function takes `Option<&OperationRegistry>`; `None` selects the
//! process-wide default registry.

use opreg_core::RegistryResult;

use crate::registry::OperationRegistry;

// ---------------------------------------------------------------------------
// Macro for the functions every front-end shares
// ---------------------------------------------------------------------------

/// Generate the register / preference / lookup functions for a mode.
///
/// `preferences` modes group factories by product and accept ordering;
/// `single` modes hold one factory per operation. Callers must have
/// `Arc`, `FactoryRef`, `RegistryMode`, `RegistryResult`,
/// `OperationRegistry` and `resolve` in scope.
macro_rules! frontend {
    (preferences: $mode:ty) => {
        /// Registers `factory` for `operation` under `product`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::register_factory`].
        pub fn register(
            registry: Option<&OperationRegistry>,
            operation: &str,
            product: &str,
            factory: Arc<<$mode as RegistryMode>::Factory>,
        ) -> RegistryResult<()> {
            resolve(registry).register_factory(
                <$mode as RegistryMode>::NAME,
                operation,
                Some(product),
                FactoryRef::new(factory),
            )
        }

        /// Unregisters `factory` from `operation` under `product`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::unregister_factory`].
        pub fn unregister(
            registry: Option<&OperationRegistry>,
            operation: &str,
            product: &str,
            factory: &Arc<<$mode as RegistryMode>::Factory>,
        ) -> RegistryResult<()> {
            resolve(registry).unregister_factory(
                <$mode as RegistryMode>::NAME,
                operation,
                Some(product),
                &FactoryRef::new(Arc::clone(factory)),
            )
        }

        /// Requires `preferred` to be tried before `other`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::set_preference`].
        pub fn set_preference(
            registry: Option<&OperationRegistry>,
            operation: &str,
            product: &str,
            preferred: &Arc<<$mode as RegistryMode>::Factory>,
            other: &Arc<<$mode as RegistryMode>::Factory>,
        ) -> RegistryResult<()> {
            resolve(registry).set_preference(
                <$mode as RegistryMode>::NAME,
                operation,
                Some(product),
                &FactoryRef::new(Arc::clone(preferred)),
                &FactoryRef::new(Arc::clone(other)),
            )
        }

        /// Removes a preference set by [`set_preference`].
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::unset_preference`].
        pub fn unset_preference(
            registry: Option<&OperationRegistry>,
            operation: &str,
            product: &str,
            preferred: &Arc<<$mode as RegistryMode>::Factory>,
            other: &Arc<<$mode as RegistryMode>::Factory>,
        ) -> RegistryResult<()> {
            resolve(registry).unset_preference(
                <$mode as RegistryMode>::NAME,
                operation,
                Some(product),
                &FactoryRef::new(Arc::clone(preferred)),
                &FactoryRef::new(Arc::clone(other)),
            )
        }

        /// Drops every preference among `product`'s factories for `operation`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::clear_preferences`].
        pub fn clear_preferences(
            registry: Option<&OperationRegistry>,
            operation: &str,
            product: &str,
        ) -> RegistryResult<()> {
            resolve(registry).clear_preferences(
                <$mode as RegistryMode>::NAME,
                operation,
                Some(product),
            )
        }

        /// `product`'s factories for `operation` in preference order;
        /// `None` if the preferences are cyclic.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::get_ordered_list`].
        pub fn get_ordered_list(
            registry: Option<&OperationRegistry>,
            operation: &str,
            product: &str,
        ) -> RegistryResult<Option<Vec<Arc<<$mode as RegistryMode>::Factory>>>> {
            resolve(registry).ordered_list::<$mode>(operation, Some(product))
        }

        frontend!(@lookup $mode);
    };

    (single: $mode:ty) => {
        /// Registers the factory for `operation`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::register_factory`]. A second, different
        /// factory for the same operation is rejected.
        pub fn register(
            registry: Option<&OperationRegistry>,
            operation: &str,
            factory: Arc<<$mode as RegistryMode>::Factory>,
        ) -> RegistryResult<()> {
            resolve(registry).register_factory(
                <$mode as RegistryMode>::NAME,
                operation,
                None,
                FactoryRef::new(factory),
            )
        }

        /// Unregisters the factory for `operation`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::unregister_factory`].
        pub fn unregister(
            registry: Option<&OperationRegistry>,
            operation: &str,
            factory: &Arc<<$mode as RegistryMode>::Factory>,
        ) -> RegistryResult<()> {
            resolve(registry).unregister_factory(
                <$mode as RegistryMode>::NAME,
                operation,
                None,
                &FactoryRef::new(Arc::clone(factory)),
            )
        }

        frontend!(@lookup $mode);
    };

    (@lookup $mode:ty) => {
        /// Every factory for `operation` in dispatch order.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::get_factory_iterator`].
        pub fn get_iterator(
            registry: Option<&OperationRegistry>,
            operation: &str,
        ) -> RegistryResult<std::vec::IntoIter<Arc<<$mode as RegistryMode>::Factory>>> {
            Ok(resolve(registry).factories::<$mode>(operation)?.into_iter())
        }

        /// The factory that would be tried first for `operation`.
        ///
        /// # Errors
        ///
        /// See [`OperationRegistry::get_factory`].
        pub fn get(
            registry: Option<&OperationRegistry>,
            operation: &str,
        ) -> RegistryResult<Option<Arc<<$mode as RegistryMode>::Factory>>> {
            resolve(registry).factory::<$mode>(operation)
        }
    };
}

pub mod collection;
pub mod remote;
pub mod renderable;
pub mod renderable_collection;
pub mod rendered;
pub mod tile_decoder;
pub mod tile_encoder;

pub use collection::{CollectionImageFactory, CollectionMode};
pub use remote::{RemoteMode, RemoteRenderedImageFactory};
pub use renderable::{ContextualRenderedImageFactory, RenderableMode};
pub use renderable_collection::{RenderableCollectionFactory, RenderableCollectionMode};
pub use rendered::{RenderedImageFactory, RenderedMode};
pub use tile_decoder::{TileDecoderFactory, TileDecoderMode};
pub use tile_encoder::{TileEncoderFactory, TileEncoderMode, TileSink};

/// Defines the seven built-in modes in their canonical order.
///
/// # Errors
///
/// [`RegistryError::Configuration`](opreg_core::RegistryError::Configuration)
/// if a mode of the same name was already defined with another shape.
pub fn define_builtin_modes(registry: &OperationRegistry) -> RegistryResult<()> {
    registry.define::<RenderedMode>()?;
    registry.define::<RenderableMode>()?;
    registry.define::<CollectionMode>()?;
    registry.define::<RenderableCollectionMode>()?;
    registry.define::<RemoteMode>()?;
    registry.define::<TileDecoderMode>()?;
    registry.define::<TileEncoderMode>()?;
    Ok(())
}
