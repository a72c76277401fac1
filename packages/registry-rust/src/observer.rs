//! Dispatch observer trait and composite implementation.
//!
//! Defines [`DispatchObserver`] for reacting to catalog changes and factory
//! failures inside an [`OperationRegistry`](crate::OperationRegistry),
//! [`CompositeDispatchObserver`] which fans out to several observers, and
//! [`TracingObserver`] which logs every event through `tracing`.

use std::fmt;
use std::sync::Arc;

use opreg_core::FactoryRef;

/// Address of a registry entry: `(mode, operation, namespace)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryKey<'a> {
    pub mode: &'a str,
    pub operation: &'a str,
    pub namespace: Option<&'a str>,
}

impl fmt::Display for EntryKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.mode, self.operation, ns),
            None => write!(f, "{}/{}", self.mode, self.operation),
        }
    }
}

/// Why a factory did not produce a result.
#[derive(Debug)]
pub enum FailureReason {
    /// The factory returned an error.
    Error(anyhow::Error),
    /// The factory panicked; the payload message is kept when it was a string.
    Panic(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{err:#}"),
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// A factory failure absorbed at the invocation boundary.
#[derive(Debug)]
pub struct FactoryFailure<'a> {
    pub key: EntryKey<'a>,
    pub factory: &'a FactoryRef,
    pub reason: FailureReason,
}

/// Observer for registry activity.
///
/// Every method has an empty default so implementations only override what
/// they care about. Observers are called after the registry has released its
/// internal locks, so they may query the registry.
///
/// Used as `Arc<dyn DispatchObserver>`.
pub trait DispatchObserver: Send + Sync {
    /// Called after a factory is added to the table.
    fn on_register(&self, _key: EntryKey<'_>, _factory: &FactoryRef) {}

    /// Called after a factory is removed from the table.
    fn on_unregister(&self, _key: EntryKey<'_>, _factory: &FactoryRef) {}

    /// Called after a new preference edge is recorded.
    fn on_preference_set(&self, _key: EntryKey<'_>, _preferred: &FactoryRef, _other: &FactoryRef) {}

    /// Called after a preference edge is removed.
    fn on_preference_unset(&self, _key: EntryKey<'_>, _preferred: &FactoryRef, _other: &FactoryRef) {}

    /// Called after all preferences under a key are dropped.
    fn on_preferences_cleared(&self, _key: EntryKey<'_>, _removed: usize) {}

    /// Called when a lookup finds cyclic preferences and skips the namespace.
    fn on_cycle(&self, _key: EntryKey<'_>) {}

    /// Called when product preferences are cyclic and insertion order is used instead.
    fn on_product_cycle(&self, _key: EntryKey<'_>) {}

    /// Called when a factory errors or panics during invocation.
    fn on_factory_failed(&self, _failure: &FactoryFailure<'_>) {}
}

/// Composite observer that fans out to multiple observers.
#[derive(Default, Clone)]
pub struct CompositeDispatchObserver {
    observers: Vec<Arc<dyn DispatchObserver>>,
}

impl CompositeDispatchObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn DispatchObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn DispatchObserver>) {
        self.observers.push(observer);
    }

    /// Number of attached observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns `true` if no observers are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl DispatchObserver for CompositeDispatchObserver {
    fn on_register(&self, key: EntryKey<'_>, factory: &FactoryRef) {
        for observer in &self.observers {
            observer.on_register(key, factory);
        }
    }

    fn on_unregister(&self, key: EntryKey<'_>, factory: &FactoryRef) {
        for observer in &self.observers {
            observer.on_unregister(key, factory);
        }
    }

    fn on_preference_set(&self, key: EntryKey<'_>, preferred: &FactoryRef, other: &FactoryRef) {
        for observer in &self.observers {
            observer.on_preference_set(key, preferred, other);
        }
    }

    fn on_preference_unset(&self, key: EntryKey<'_>, preferred: &FactoryRef, other: &FactoryRef) {
        for observer in &self.observers {
            observer.on_preference_unset(key, preferred, other);
        }
    }

    fn on_preferences_cleared(&self, key: EntryKey<'_>, removed: usize) {
        for observer in &self.observers {
            observer.on_preferences_cleared(key, removed);
        }
    }

    fn on_cycle(&self, key: EntryKey<'_>) {
        for observer in &self.observers {
            observer.on_cycle(key);
        }
    }

    fn on_product_cycle(&self, key: EntryKey<'_>) {
        for observer in &self.observers {
            observer.on_product_cycle(key);
        }
    }

    fn on_factory_failed(&self, failure: &FactoryFailure<'_>) {
        for observer in &self.observers {
            observer.on_factory_failed(failure);
        }
    }
}

/// Logs registry activity: catalog changes at `debug`, cycles and factory
/// failures at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_register(&self, key: EntryKey<'_>, factory: &FactoryRef) {
        tracing::debug!(entry = %key, factory = factory.type_name(), "factory registered");
    }

    fn on_unregister(&self, key: EntryKey<'_>, factory: &FactoryRef) {
        tracing::debug!(entry = %key, factory = factory.type_name(), "factory unregistered");
    }

    fn on_preference_set(&self, key: EntryKey<'_>, preferred: &FactoryRef, other: &FactoryRef) {
        tracing::debug!(
            entry = %key,
            preferred = %preferred.id(),
            other = %other.id(),
            "preference set"
        );
    }

    fn on_preference_unset(&self, key: EntryKey<'_>, preferred: &FactoryRef, other: &FactoryRef) {
        tracing::debug!(
            entry = %key,
            preferred = %preferred.id(),
            other = %other.id(),
            "preference unset"
        );
    }

    fn on_preferences_cleared(&self, key: EntryKey<'_>, removed: usize) {
        tracing::debug!(entry = %key, removed, "preferences cleared");
    }

    fn on_cycle(&self, key: EntryKey<'_>) {
        tracing::warn!(entry = %key, "cyclic preferences; namespace skipped");
    }

    fn on_product_cycle(&self, key: EntryKey<'_>) {
        tracing::warn!(entry = %key, "cyclic product preferences; using insertion order");
    }

    fn on_factory_failed(&self, failure: &FactoryFailure<'_>) {
        tracing::warn!(
            entry = %failure.key,
            factory = failure.factory.type_name(),
            reason = %failure.reason,
            "factory failed; trying next candidate"
        );
    }
}
