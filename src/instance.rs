//! Resolved instances and their decoration chain.
//!
//! An [`Instance`] is a stack of layers. The innermost layer is the backing
//! instance built by a constructor; every decoration (a `create_proxy` hook or
//! the stateful injector wrapper) pushes a new layer holding a back-reference
//! to the layer it wraps. [`Instance::backing`] follows those back-references
//! and is the identity used to key dependent singletons, so decorating a
//! dependency never fragments the singletons built on top of it.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::context::Injector;
use crate::service::{Object, ServiceType};

/// Shared handle to a (possibly decorated) service instance.
#[derive(Clone)]
pub struct Instance(Arc<Layer>);

struct Layer {
    service: ServiceType,
    object: Object,
    decorates: Option<Instance>,
    injector: Option<Injector>,
}

impl Instance {
    /// Wrap a plain value as an undecorated instance of `service`.
    pub fn new<T: Any + Send + Sync>(service: &ServiceType, value: T) -> Self {
        Self::from_object(service, Arc::new(value))
    }

    pub fn from_object(service: &ServiceType, object: Object) -> Self {
        Self(Arc::new(Layer {
            service: service.clone(),
            object,
            decorates: None,
            injector: None,
        }))
    }

    /// Wrapper produced by default stateful construction.
    ///
    /// Shares the backing object and adds the injector of the constructing
    /// context.
    pub(crate) fn with_injector(backing: Instance, injector: Injector) -> Self {
        Self(Arc::new(Layer {
            service: backing.0.service.clone(),
            object: backing.0.object.clone(),
            decorates: Some(backing),
            injector: Some(injector),
        }))
    }

    /// Decorate this instance with a new outer value.
    ///
    /// Typed reads hit `value` first and fall through to inner layers for
    /// any other type.
    pub fn decorate<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.decorate_object(Arc::new(value))
    }

    pub fn decorate_object(&self, object: Object) -> Self {
        Self(Arc::new(Layer {
            service: self.0.service.clone(),
            object,
            decorates: Some(self.clone()),
            injector: None,
        }))
    }

    /// Service type this instance was built as.
    pub fn service_type(&self) -> &ServiceType {
        &self.0.service
    }

    /// Object held by the outermost layer.
    pub fn object(&self) -> &Object {
        &self.0.object
    }

    /// Typed view of the outermost layer holding a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.layers().find_map(|layer| layer.0.object.downcast_ref::<T>())
    }

    /// Layer directly wrapped by this one, if decorated.
    pub fn decorates(&self) -> Option<&Instance> {
        self.0.decorates.as_ref()
    }

    /// This layer followed by every wrapped layer, outermost first.
    pub fn layers(&self) -> impl Iterator<Item = &Instance> {
        std::iter::successors(Some(self), |instance| instance.decorates())
    }

    /// Innermost, undecorated instance.
    pub fn backing(&self) -> &Instance {
        let mut current = self;
        while let Some(inner) = current.decorates() {
            current = inner;
        }
        current
    }

    /// Injector attached by stateful construction, searched outermost first.
    pub fn injector(&self) -> Option<&Injector> {
        self.layers().find_map(|layer| layer.0.injector.as_ref())
    }

    /// "Is instance of" check against the service type hierarchy.
    pub fn is_instance_of(&self, service: &ServiceType) -> bool {
        self.0.service.descends_from(service)
    }

    /// Identity comparison of the outermost layers.
    pub fn ptr_eq(a: &Instance, b: &Instance) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Identity comparison of the backing instances.
    pub fn same_backing(a: &Instance, b: &Instance) -> bool {
        Self::ptr_eq(a.backing(), b.backing())
    }

    pub(crate) fn downgrade(&self) -> WeakInstance {
        WeakInstance(Arc::downgrade(&self.0))
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("service", &self.0.service.name())
            .field("layers", &self.layers().count())
            .field("injector", &self.0.injector.is_some())
            .finish()
    }
}

/// Non-owning handle to an instance layer.
///
/// Holding it keeps the allocation (and thus its address) reserved, so an
/// address match against a live instance always means the same layer.
#[derive(Clone)]
pub(crate) struct WeakInstance(Weak<Layer>);

impl WeakInstance {
    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    #[cfg(test)]
    pub(crate) fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(Instance)
    }
}
