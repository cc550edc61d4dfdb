//! Instance resolution for channel types.
//!
//! The dispatcher does not construct channel instances itself. For every
//! invocation it asks an [`InstanceResolver`] supplied by the host for a
//! fresh value of the channel type, so the host decides whether instances
//! are shared, pooled, or built per call.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Produces instances of registered types, scoped to one dispatch.
pub trait InstanceResolver: Send + Sync {
    /// Returns a boxed instance for `type_id`, or `None` when the type is
    /// unknown to this resolver.
    fn resolve_any(&self, type_id: TypeId) -> Option<Box<dyn Any + Send>>;
}

impl<'a> dyn InstanceResolver + 'a {
    /// Typed convenience over [`InstanceResolver::resolve_any`].
    pub fn resolve<T: Any + Send>(&self) -> Option<T> {
        self.resolve_any(TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// A factory map keyed by type.
///
/// This is the resolver most hosts need: register a constructor (or a
/// cloneable singleton) for every channel and service type up front.
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard_events::{InstanceResolver, ServiceRegistry};
///
/// #[derive(Clone)]
/// struct Greeter { greeting: &'static str }
///
/// let mut services = ServiceRegistry::new();
/// services.singleton(Greeter { greeting: "hello" });
///
/// let resolver: Arc<dyn InstanceResolver> = Arc::new(services);
/// assert_eq!(resolver.resolve::<Greeter>().map(|g| g.greeting), Some("hello"));
/// ```
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    factories: HashMap<TypeId, (&'static str, Factory)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor invoked once per resolution.
    pub fn register<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn Any + Send>);
        self.factories
            .insert(TypeId::of::<T>(), (type_name::<T>(), factory));
        self
    }

    /// Registers a value that is cloned for every resolution.
    pub fn singleton<T>(&mut self, value: T) -> &mut Self
    where
        T: Any + Clone + Send + Sync,
    {
        self.register(move || value.clone())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<T>())
    }

    /// Names of all registered types, for diagnostics.
    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names
    }
}

impl InstanceResolver for ServiceRegistry {
    fn resolve_any(&self, type_id: TypeId) -> Option<Box<dyn Any + Send>> {
        self.factories.get(&type_id).map(|(_, factory)| factory())
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(usize);

    #[test]
    fn factory_runs_per_resolution() {
        let built = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceRegistry::new();
        let seen = built.clone();
        services.register(move || Counter(seen.fetch_add(1, Ordering::SeqCst)));

        let resolver: Arc<dyn InstanceResolver> = Arc::new(services);
        assert_eq!(resolver.resolve::<Counter>(), Some(Counter(0)));
        assert_eq!(resolver.resolve::<Counter>(), Some(Counter(1)));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_type_resolves_to_none() {
        let resolver: Arc<dyn InstanceResolver> = Arc::new(ServiceRegistry::new());
        assert!(resolver.resolve::<Counter>().is_none());
    }

    #[test]
    fn singleton_is_cloned() {
        let mut services = ServiceRegistry::new();
        services.singleton(Counter(42));
        assert!(services.contains::<Counter>());

        let resolver: &dyn InstanceResolver = &services;
        assert_eq!(resolver.resolve::<Counter>(), Some(Counter(42)));
        assert_eq!(resolver.resolve::<Counter>(), Some(Counter(42)));
    }
}
