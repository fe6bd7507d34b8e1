// Copyright 2025 Cowboy AI, LLC.

//! Service registry backing the dependency container
//!
//! Holds one descriptor per ungrouped capability and an ordered list of
//! descriptors per `(capability, group)` key. Descriptors are shared out of
//! the registry before their factories run, so no registry lock is held
//! while a constructor resolves its own dependencies. A singleton's factory
//! runs under its descriptor's once-guard: concurrent resolvers wait for the
//! first construction instead of running the constructor again.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::dependency_injection::Resolver;
use crate::errors::{RegistrationError, RegistrationResult};

/// Service lifetime management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceLifetime {
    /// New instance for each resolution
    Transient,

    /// Single instance for the container's lifetime
    #[default]
    Singleton,
}

/// Type-erased factory producing a boxed `Arc<T>`
pub(crate) type ErasedFactory =
    Arc<dyn Fn(&Resolver<'_>) -> RegistrationResult<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Key identifying a capability, optionally inside a named group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    group: Option<String>,
}

impl ServiceKey {
    /// Key for an ungrouped capability
    pub(crate) fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            group: None,
        }
    }

    /// Key for a capability collected under `group`
    pub(crate) fn grouped<T: ?Sized + 'static>(group: &str) -> Self {
        Self {
            group: Some(group.to_string()),
            ..Self::of::<T>()
        }
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}[{}]", self.type_name, group),
            None => f.write_str(self.type_name),
        }
    }
}

/// Service descriptor
pub(crate) struct ServiceDescriptor {
    /// Capability this descriptor provides
    pub(crate) key: ServiceKey,

    /// Service lifetime
    pub(crate) lifetime: ServiceLifetime,

    factory: ErasedFactory,
    instance: OnceCell<Box<dyn Any + Send + Sync>>,
}

impl ServiceDescriptor {
    pub(crate) fn new(key: ServiceKey, lifetime: ServiceLifetime, factory: ErasedFactory) -> Self {
        Self {
            key,
            lifetime,
            factory,
            instance: OnceCell::new(),
        }
    }

    /// Descriptor around an already constructed `Arc<T>`
    pub(crate) fn with_instance<T: ?Sized + Send + Sync + 'static>(
        key: ServiceKey,
        instance: Arc<T>,
    ) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Box::new(instance.clone()) as Box<dyn Any + Send + Sync>);
        Self {
            key,
            lifetime: ServiceLifetime::Singleton,
            factory: Arc::new(move |_: &Resolver<'_>| {
                Ok(Box::new(instance.clone()) as Box<dyn Any + Send + Sync>)
            }),
            instance: cell,
        }
    }

    /// Whether a singleton instance has already been built
    pub(crate) fn is_constructed(&self) -> bool {
        self.instance.get().is_some()
    }

    /// Produce the instance, running the factory if the lifetime requires it
    pub(crate) fn instantiate<T: ?Sized + Send + Sync + 'static>(
        &self,
        resolver: &Resolver<'_>,
    ) -> RegistrationResult<Arc<T>> {
        match self.lifetime {
            ServiceLifetime::Transient => {
                let built = self.build(resolver)?;
                self.downcast(built.as_ref())
            }
            // A failed construction leaves the cell empty for the next caller.
            ServiceLifetime::Singleton => {
                let stored = self.instance.get_or_try_init(|| self.build(resolver))?;
                self.downcast(stored.as_ref())
            }
        }
    }

    fn build(&self, resolver: &Resolver<'_>) -> RegistrationResult<Box<dyn Any + Send + Sync>> {
        (self.factory)(resolver).map_err(|source| RegistrationError::ConstructionFailed {
            capability: self.key.to_string(),
            source: Box::new(source),
        })
    }

    fn downcast<T: ?Sized + Send + Sync + 'static>(
        &self,
        value: &(dyn Any + Send + Sync),
    ) -> RegistrationResult<Arc<T>> {
        value
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| RegistrationError::TypeMismatch {
                capability: self.key.to_string(),
            })
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("constructed", &self.is_constructed())
            .finish()
    }
}

/// Service registry
#[derive(Default)]
pub(crate) struct ServiceRegistry {
    /// Ungrouped capabilities
    services: RwLock<HashMap<TypeId, Arc<ServiceDescriptor>>>,

    /// Grouped capabilities, in provision order
    groups: RwLock<HashMap<(TypeId, String), Vec<Arc<ServiceDescriptor>>>>,
}

impl ServiceRegistry {
    /// Insert an ungrouped descriptor, refusing a second one for the same capability
    pub(crate) fn insert(&self, descriptor: ServiceDescriptor) -> RegistrationResult<()> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        let type_id = descriptor.key.type_id;

        if services.contains_key(&type_id) {
            return Err(RegistrationError::ConstructorRejected {
                capability: descriptor.key.to_string(),
                reason: "already provided".to_string(),
            });
        }

        services.insert(type_id, Arc::new(descriptor));
        Ok(())
    }

    /// Append a descriptor to its group
    pub(crate) fn insert_grouped(&self, descriptor: ServiceDescriptor) -> RegistrationResult<()> {
        let group = descriptor.key.group.clone().ok_or_else(|| {
            RegistrationError::ConstructorRejected {
                capability: descriptor.key.to_string(),
                reason: "grouped provider without a group tag".to_string(),
            }
        })?;

        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups
            .entry((descriptor.key.type_id, group))
            .or_default()
            .push(Arc::new(descriptor));
        Ok(())
    }

    /// Look up the ungrouped descriptor for a capability
    pub(crate) fn get(&self, type_id: TypeId) -> Option<Arc<ServiceDescriptor>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }

    /// Snapshot of the descriptors in a group, in provision order
    pub(crate) fn get_group(&self, type_id: TypeId, group: &str) -> Vec<Arc<ServiceDescriptor>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(type_id, group.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}
