//! The process-wide default registry.
//!
//! Built lazily on first use with [`RegistryConfig::default`](crate::RegistryConfig)
//! and swappable through `ArcSwap`, so readers never block and tests can
//! install a registry of their own.

use std::ops::Deref;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;

use crate::registry::OperationRegistry;

static DEFAULT: LazyLock<ArcSwap<OperationRegistry>> =
    LazyLock::new(|| ArcSwap::from_pointee(OperationRegistry::new()));

/// The current default registry.
#[must_use]
pub fn default_registry() -> Arc<OperationRegistry> {
    DEFAULT.load_full()
}

/// Installs `registry` as the default and returns the previous one.
pub fn set_default_registry(registry: Arc<OperationRegistry>) -> Arc<OperationRegistry> {
    tracing::debug!("default registry replaced");
    DEFAULT.swap(registry)
}

/// Replaces the default with a fresh registry and returns the previous one.
pub fn reset_default_registry() -> Arc<OperationRegistry> {
    set_default_registry(Arc::new(OperationRegistry::new()))
}

/// Either a caller-supplied registry or a handle to the default.
pub(crate) enum RegistryHandle<'a> {
    Borrowed(&'a OperationRegistry),
    Default(Arc<OperationRegistry>),
}

impl Deref for RegistryHandle<'_> {
    type Target = OperationRegistry;

    fn deref(&self) -> &OperationRegistry {
        match self {
            Self::Borrowed(registry) => registry,
            Self::Default(registry) => registry,
        }
    }
}

/// `None` selects the default registry.
pub(crate) fn resolve(registry: Option<&OperationRegistry>) -> RegistryHandle<'_> {
    registry.map_or_else(
        || RegistryHandle::Default(default_registry()),
        RegistryHandle::Borrowed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;

    // The only test in the crate that touches the global.
    #[test]
    fn default_registry_can_be_replaced_and_reset() {
        let original = default_registry();
        assert!(Arc::ptr_eq(&original, &default_registry()));
        assert_eq!(original.registry_modes().len(), 7);

        let custom = Arc::new(OperationRegistry::with_config(RegistryConfig::bare()));
        let previous = set_default_registry(Arc::clone(&custom));
        assert!(Arc::ptr_eq(&previous, &original));
        assert!(Arc::ptr_eq(&default_registry(), &custom));
        assert!(resolve(None).registry_modes().is_empty());

        let replaced = reset_default_registry();
        assert!(Arc::ptr_eq(&replaced, &custom));
        assert_eq!(default_registry().registry_modes().len(), 7);
        assert!(!Arc::ptr_eq(&default_registry(), &original));
    }

    #[test]
    fn explicit_registry_is_borrowed() {
        let local = OperationRegistry::with_config(RegistryConfig::bare());
        let handle = resolve(Some(&local));
        assert!(matches!(handle, RegistryHandle::Borrowed(_)));
        assert!(std::ptr::eq(&*handle, &local));
    }
}
