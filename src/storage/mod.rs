//! Storage provider registry.
//!
//! Extensions resolve their storage through the server runtime context at
//! call time: a string provider key maps to a type-erased instance that is
//! recovered behind its interface type. Registration happens at bootstrap;
//! absence of a required provider for an active extension is a fatal
//! configuration error at first use, not at startup — callers surface it
//! through their own error type rather than silently skipping.

pub mod accounts;

pub use accounts::{AccountError, AccountStore, MemoryAccountStore};

use dashmap::DashMap;
use std::any::Any;

/// Registry mapping provider keys to type-erased provider instances.
///
/// Providers are registered and retrieved behind their interface type,
/// usually an `Arc<dyn Trait>`:
///
/// ```ignore
/// let archives: Arc<dyn MessageArchives> = Arc::new(MemoryMessageArchives::new());
/// registry.register(MESSAGE_ARCHIVES_KEY, archives);
/// let archives: Arc<dyn MessageArchives> =
///     registry.retrieve(MESSAGE_ARCHIVES_KEY).expect("registered above");
/// ```
///
/// The retrieval type must match the registration type exactly; registering
/// a concrete `Arc<MemoryMessageArchives>` and retrieving an
/// `Arc<dyn MessageArchives>` will not resolve.
#[derive(Default)]
pub struct StorageProviderRegistry {
    providers: DashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl StorageProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `key`, replacing any earlier registration.
    pub fn register<P>(&self, key: &'static str, provider: P)
    where
        P: Any + Send + Sync,
    {
        self.providers.insert(key, Box::new(provider));
    }

    /// Retrieve the provider registered under `key`, if its type matches.
    pub fn retrieve<P>(&self, key: &str) -> Option<P>
    where
        P: Any + Send + Sync + Clone,
    {
        self.providers
            .get(key)
            .and_then(|entry| entry.downcast_ref::<P>().cloned())
    }

    /// Whether a provider is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }
}
