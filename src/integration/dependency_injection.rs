// Copyright 2025 Cowboy AI, LLC.

//! Dependency injection for handler construction
//!
//! Constructors are provided to a [`DependencyContainer`] and run lazily the
//! first time their capability is resolved. A constructor receives a
//! [`Resolver`] through which it pulls its own dependencies, so an object
//! graph is built on demand without any reflection:
//!
//! ```rust
//! use std::sync::Arc;
//! use cim_cqrs_di::{Constructor, DependencyContainer};
//!
//! struct Database { url: String }
//! struct UserService { db: Arc<Database> }
//!
//! let container = DependencyContainer::new();
//! container.provide_instance(Arc::new(Database { url: "postgres://localhost".into() })).unwrap();
//! container.provide(Constructor::new(|r| {
//!     Ok(Arc::new(UserService { db: r.resolve::<Database>()? }))
//! })).unwrap();
//!
//! let users = container.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::service_registry::{
    ErasedFactory, ServiceDescriptor, ServiceKey, ServiceLifetime, ServiceRegistry,
};
use crate::errors::{RegistrationError, RegistrationResult};

type Factory<T> = Arc<dyn Fn(&Resolver<'_>) -> RegistrationResult<Arc<T>> + Send + Sync>;

/// A constructor for capability `T`
///
/// An empty constructor ([`Constructor::missing`]) stands for a constructor
/// that was never supplied; the container rejects it on provision.
pub struct Constructor<T: ?Sized> {
    factory: Option<Factory<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Constructor<T> {
    /// Wrap a factory function
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&Resolver<'_>) -> RegistrationResult<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Arc::new(factory)),
        }
    }

    /// Constructor with no factory behind it
    pub fn missing() -> Self {
        Self { factory: None }
    }

    /// Whether this constructor has no factory
    pub fn is_missing(&self) -> bool {
        self.factory.is_none()
    }

    fn into_erased(self) -> Option<ErasedFactory> {
        let factory = self.factory?;
        Some(Arc::new(move |resolver: &Resolver<'_>| {
            factory(resolver).map(|instance| Box::new(instance) as Box<dyn Any + Send + Sync>)
        }))
    }
}

impl<T: ?Sized> Default for Constructor<T> {
    fn default() -> Self {
        Self { factory: None }
    }
}

impl<T: ?Sized> Clone for Constructor<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("capability", &std::any::type_name::<T>())
            .field("missing", &self.factory.is_none())
            .finish()
    }
}

/// Resolution context handed to constructors
///
/// Tracks the chain of capabilities currently being built so a constructor
/// that (transitively) depends on itself fails with
/// [`RegistrationError::CyclicDependency`] instead of recursing forever.
pub struct Resolver<'a> {
    registry: &'a ServiceRegistry,
    path: RefCell<Vec<ServiceKey>>,
}

impl<'a> Resolver<'a> {
    fn new(registry: &'a ServiceRegistry) -> Self {
        Self {
            registry,
            path: RefCell::new(Vec::new()),
        }
    }

    /// Resolve the ungrouped provider of `T`
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> RegistrationResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let descriptor = self
            .registry
            .get(TypeId::of::<T>())
            .ok_or_else(|| RegistrationError::NotProvided {
                capability: key.to_string(),
            })?;

        self.enter(key, || descriptor.instantiate::<T>(self))
    }

    /// Resolve every provider of `T` in `group`, in provision order
    ///
    /// A group nothing was provided to resolves to an empty collection.
    pub fn resolve_group<T: ?Sized + Send + Sync + 'static>(
        &self,
        group: &str,
    ) -> RegistrationResult<Vec<Arc<T>>> {
        let key = ServiceKey::grouped::<T>(group);
        let descriptors = self.registry.get_group(TypeId::of::<T>(), group);

        self.enter(key, || {
            descriptors
                .iter()
                .map(|descriptor| descriptor.instantiate::<T>(self))
                .collect()
        })
    }

    fn enter<R>(
        &self,
        key: ServiceKey,
        build: impl FnOnce() -> RegistrationResult<R>,
    ) -> RegistrationResult<R> {
        {
            let mut path = self.path.borrow_mut();
            if path.contains(&key) {
                let mut cycle: Vec<String> = path.iter().map(ToString::to_string).collect();
                cycle.push(key.to_string());
                return Err(RegistrationError::CyclicDependency {
                    path: cycle.join(" -> "),
                });
            }
            path.push(key);
        }

        let result = build();
        self.path.borrow_mut().pop();
        result
    }
}

/// Dependency injection container
#[derive(Default)]
pub struct DependencyContainer {
    registry: ServiceRegistry,
}

impl DependencyContainer {
    /// Create a new container
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a singleton constructor for `T`
    pub fn provide<T: ?Sized + Send + Sync + 'static>(
        &self,
        constructor: Constructor<T>,
    ) -> RegistrationResult<()> {
        self.provide_with_lifetime(constructor, ServiceLifetime::Singleton)
    }

    /// Provide a constructor for `T` that runs on every resolution
    pub fn provide_transient<T: ?Sized + Send + Sync + 'static>(
        &self,
        constructor: Constructor<T>,
    ) -> RegistrationResult<()> {
        self.provide_with_lifetime(constructor, ServiceLifetime::Transient)
    }

    /// Provide a constructor for `T` with an explicit lifetime
    pub fn provide_with_lifetime<T: ?Sized + Send + Sync + 'static>(
        &self,
        constructor: Constructor<T>,
        lifetime: ServiceLifetime,
    ) -> RegistrationResult<()> {
        let key = ServiceKey::of::<T>();
        let factory = accept(&key, constructor)?;

        self.registry
            .insert(ServiceDescriptor::new(key.clone(), lifetime, factory))
            .inspect_err(|e| warn!(capability = %key, error = %e, "provider rejected"))?;

        debug!(capability = %key, ?lifetime, "provider registered");
        Ok(())
    }

    /// Provide a singleton constructor contributing to the `group` collection of `T`
    pub fn provide_grouped<T: ?Sized + Send + Sync + 'static>(
        &self,
        group: &str,
        constructor: Constructor<T>,
    ) -> RegistrationResult<()> {
        let key = ServiceKey::grouped::<T>(group);
        if group.is_empty() {
            warn!(capability = %key, "grouped provider rejected: empty group tag");
            return Err(RegistrationError::ConstructorRejected {
                capability: key.to_string(),
                reason: "group tag is empty".to_string(),
            });
        }

        let factory = accept(&key, constructor)?;
        self.registry.insert_grouped(ServiceDescriptor::new(
            key.clone(),
            ServiceLifetime::Singleton,
            factory,
        ))?;

        debug!(capability = %key, "grouped provider registered");
        Ok(())
    }

    /// Provide an already constructed instance of `T`
    pub fn provide_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
        instance: Arc<T>,
    ) -> RegistrationResult<()> {
        let key = ServiceKey::of::<T>();
        self.registry
            .insert(ServiceDescriptor::with_instance(key.clone(), instance))
            .inspect_err(|e| warn!(capability = %key, error = %e, "instance rejected"))?;

        debug!(capability = %key, "instance registered");
        Ok(())
    }

    /// Resolve the ungrouped provider of `T`
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> RegistrationResult<Arc<T>> {
        Resolver::new(&self.registry).resolve::<T>()
    }

    /// Resolve every provider of `T` in `group`, in provision order
    pub fn resolve_group<T: ?Sized + Send + Sync + 'static>(
        &self,
        group: &str,
    ) -> RegistrationResult<Vec<Arc<T>>> {
        Resolver::new(&self.registry).resolve_group::<T>(group)
    }

    /// Whether an ungrouped provider of `T` exists
    pub fn is_provided<T: ?Sized + 'static>(&self) -> bool {
        self.registry.get(TypeId::of::<T>()).is_some()
    }

    /// Number of providers of `T` in `group`
    pub fn group_len<T: ?Sized + 'static>(&self, group: &str) -> usize {
        self.registry.get_group(TypeId::of::<T>(), group).len()
    }
}

fn accept<T: ?Sized + Send + Sync + 'static>(
    key: &ServiceKey,
    constructor: Constructor<T>,
) -> RegistrationResult<ErasedFactory> {
    constructor.into_erased().ok_or_else(|| {
        warn!(capability = %key, "provider rejected: constructor is missing");
        RegistrationError::ConstructorRejected {
            capability: key.to_string(),
            reason: "constructor is missing".to_string(),
        }
    })
}

/// Builder for configuring dependency injection
#[derive(Default)]
pub struct ContainerBuilder {
    container: DependencyContainer,
}

impl ContainerBuilder {
    /// Start from an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-built instance
    pub fn add_instance<T: ?Sized + Send + Sync + 'static>(
        self,
        instance: Arc<T>,
    ) -> RegistrationResult<Self> {
        self.container.provide_instance(instance)?;
        Ok(self)
    }

    /// Add a singleton constructor
    pub fn add_singleton<T: ?Sized + Send + Sync + 'static>(
        self,
        constructor: Constructor<T>,
    ) -> RegistrationResult<Self> {
        self.container.provide(constructor)?;
        Ok(self)
    }

    /// Add a transient constructor
    pub fn add_transient<T: ?Sized + Send + Sync + 'static>(
        self,
        constructor: Constructor<T>,
    ) -> RegistrationResult<Self> {
        self.container.provide_transient(constructor)?;
        Ok(self)
    }

    /// Finish building
    pub fn build(self) -> DependencyContainer {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: String,
    }

    #[derive(Debug)]
    struct DependentService {
        test_service: Arc<TestService>,
        id: u32,
    }

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct French;

    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    fn english(_: &Resolver<'_>) -> RegistrationResult<Arc<dyn Greeter>> {
        Ok(Arc::new(English))
    }

    fn french(_: &Resolver<'_>) -> RegistrationResult<Arc<dyn Greeter>> {
        Ok(Arc::new(French))
    }

    #[test]
    fn test_register_and_resolve_instance() {
        let container = DependencyContainer::new();
        container
            .provide_instance(Arc::new(TestService {
                value: "test".to_string(),
            }))
            .unwrap();

        let resolved = container.resolve::<TestService>().unwrap();
        assert_eq!(resolved.value, "test");
    }

    #[test]
    fn test_singleton_constructs_once() {
        let container = DependencyContainer::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        container
            .provide(Constructor::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(TestService {
                    value: "singleton".to_string(),
                }))
            }))
            .unwrap();

        let resolved1 = container.resolve::<TestService>().unwrap();
        let resolved2 = container.resolve::<TestService>().unwrap();

        assert!(Arc::ptr_eq(&resolved1, &resolved2));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_singleton_constructs_once_across_threads() {
        let container = DependencyContainer::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        container
            .provide(Constructor::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(Arc::new(TestService {
                    value: "slow".to_string(),
                }))
            }))
            .unwrap();

        let resolved: Vec<Arc<TestService>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| container.resolve::<TestService>().unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));
    }

    #[test]
    fn test_failed_singleton_is_retried() {
        let container = DependencyContainer::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        container
            .provide(Constructor::new(move |_| {
                if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(RegistrationError::factory("not ready"));
                }
                Ok(Arc::new(TestService {
                    value: "ready".to_string(),
                }))
            }))
            .unwrap();

        assert!(container.resolve::<TestService>().is_err());
        assert_eq!(container.resolve::<TestService>().unwrap().value, "ready");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_constructs_every_time() {
        let container = DependencyContainer::new();
        container
            .provide_transient(Constructor::new(|_| {
                Ok(Arc::new(TestService {
                    value: "transient".to_string(),
                }))
            }))
            .unwrap();

        let resolved1 = container.resolve::<TestService>().unwrap();
        let resolved2 = container.resolve::<TestService>().unwrap();

        assert_eq!(resolved1.value, "transient");
        assert!(!Arc::ptr_eq(&resolved1, &resolved2));
    }

    #[test]
    fn test_dependency_resolution_shares_singleton() {
        let container = DependencyContainer::new();
        container
            .provide(Constructor::new(|_| {
                Ok(Arc::new(TestService {
                    value: "injected".to_string(),
                }))
            }))
            .unwrap();
        container
            .provide(Constructor::new(|r| {
                Ok(Arc::new(DependentService {
                    test_service: r.resolve::<TestService>()?,
                    id: 123,
                }))
            }))
            .unwrap();

        let dependent = container.resolve::<DependentService>().unwrap();
        let service = container.resolve::<TestService>().unwrap();

        assert_eq!(dependent.id, 123);
        assert_eq!(dependent.test_service.value, "injected");
        assert!(Arc::ptr_eq(&dependent.test_service, &service));
    }

    #[test]
    fn test_missing_constructor_is_rejected() {
        let container = DependencyContainer::new();

        let err = container
            .provide(Constructor::<TestService>::missing())
            .unwrap_err();
        assert!(err.is_constructor_error());

        let err = container.resolve::<TestService>().unwrap_err();
        assert!(err.is_resolution_error());
    }

    #[test]
    fn test_second_provider_is_rejected() {
        let container = DependencyContainer::new();
        container.provide(Constructor::new(english)).unwrap();

        let err = container.provide(Constructor::new(french)).unwrap_err();
        assert!(err.is_constructor_error());
        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_missing_dependency_fails_resolution() {
        let container = DependencyContainer::new();
        container
            .provide(Constructor::new(|r| {
                Ok(Arc::new(DependentService {
                    test_service: r.resolve::<TestService>()?,
                    id: 1,
                }))
            }))
            .unwrap();

        let err = container.resolve::<DependentService>().unwrap_err();
        assert!(err.is_resolution_error());
        match err {
            RegistrationError::ConstructionFailed { source, .. } => {
                assert!(matches!(*source, RegistrationError::NotProvided { .. }));
            }
            other => panic!("Expected ConstructionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        #[derive(Debug)]
        struct A(#[allow(dead_code)] Arc<B>);
        #[derive(Debug)]
        struct B(#[allow(dead_code)] Arc<A>);

        let container = DependencyContainer::new();
        container
            .provide(Constructor::new(|r| Ok(Arc::new(A(r.resolve::<B>()?)))))
            .unwrap();
        container
            .provide(Constructor::new(|r| Ok(Arc::new(B(r.resolve::<A>()?)))))
            .unwrap();

        let err = container.resolve::<A>().unwrap_err();
        assert!(err.is_resolution_error());

        let mut current = &err;
        while let RegistrationError::ConstructionFailed { source, .. } = current {
            current = &**source;
        }
        match current {
            RegistrationError::CyclicDependency { path } => {
                assert_eq!(path.matches(" -> ").count(), 2);
            }
            other => panic!("Expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_grouped_providers_resolve_in_order() {
        let container = DependencyContainer::new();
        container.provide_grouped("greeters", Constructor::new(english)).unwrap();
        container.provide_grouped("greeters", Constructor::new(french)).unwrap();

        let greeters = container.resolve_group::<dyn Greeter>("greeters").unwrap();
        let words: Vec<String> = greeters.iter().map(|g| g.greet()).collect();

        assert_eq!(words, vec!["hello", "bonjour"]);
        assert_eq!(container.group_len::<dyn Greeter>("greeters"), 2);
        assert!(!container.is_provided::<dyn Greeter>());
    }

    #[test]
    fn test_unknown_group_is_empty() {
        let container = DependencyContainer::new();
        let greeters = container.resolve_group::<dyn Greeter>("nobody").unwrap();
        assert!(greeters.is_empty());
    }

    #[test]
    fn test_empty_group_tag_is_rejected() {
        let container = DependencyContainer::new();
        let err = container
            .provide_grouped("", Constructor::new(english))
            .unwrap_err();
        assert!(err.is_constructor_error());
    }

    #[test]
    fn test_container_builder() {
        let container = ContainerBuilder::new()
            .add_instance(Arc::new(TestService {
                value: "builder".to_string(),
            }))
            .unwrap()
            .add_singleton(Constructor::new(|r| {
                Ok(Arc::new(DependentService {
                    test_service: r.resolve::<TestService>()?,
                    id: 999,
                }))
            }))
            .unwrap()
            .build();

        let dependent = container.resolve::<DependentService>().unwrap();
        assert_eq!(dependent.id, 999);
        assert_eq!(dependent.test_service.value, "builder");
    }
}
