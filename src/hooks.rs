//! Resolution hooks and the providers that layer them.
//!
//! A [`HookChain`] is the three-function interface every context resolves
//! through:
//!
//! - `map_class`: abstract type to concrete type
//! - `get_instance`: provided singleton lookup
//! - `create_proxy`: decoration of every instance handed out
//!
//! Each [`Provider`] folds one layer onto the previous chain. Later layers
//! win for the requests they match and delegate everything else, so the most
//! recent and most specific mapping takes precedence while broader, earlier
//! ones stay reachable.

use std::fmt;
use std::sync::Arc;

use crate::error::{DiError, Result};
use crate::instance::Instance;
use crate::service::ServiceType;

pub type MapClassFn = Arc<dyn Fn(&ServiceType) -> ServiceType + Send + Sync>;
pub type GetInstanceFn = Arc<dyn Fn(&ServiceType) -> Option<Instance> + Send + Sync>;
pub type CreateProxyFn = Arc<dyn Fn(&ServiceType, Instance) -> Instance + Send + Sync>;
pub type MiddlewareFn = Arc<dyn Fn(&HookChain) -> PartialHooks + Send + Sync>;

/// The three resolution hooks of a context.
#[derive(Clone)]
pub struct HookChain {
    map_class: MapClassFn,
    get_instance: GetInstanceFn,
    create_proxy: CreateProxyFn,
}

impl Default for HookChain {
    fn default() -> Self {
        Self::base()
    }
}

impl HookChain {
    /// Identity mapping, no provided instances, no decoration.
    pub fn base() -> Self {
        Self {
            map_class: Arc::new(|service: &ServiceType| service.clone()),
            get_instance: Arc::new(|_: &ServiceType| -> Option<Instance> { None }),
            create_proxy: Arc::new(|_: &ServiceType, instance: Instance| instance),
        }
    }

    pub fn map_class(&self, service: &ServiceType) -> ServiceType {
        (self.map_class)(service)
    }

    pub fn get_instance(&self, service: &ServiceType) -> Option<Instance> {
        (self.get_instance)(service)
    }

    pub fn create_proxy(&self, service: &ServiceType, instance: Instance) -> Instance {
        (self.create_proxy)(service, instance)
    }

    /// Fold one provider onto this chain.
    pub(crate) fn layer(&self, provider: &Provider) -> Result<HookChain> {
        match provider {
            Provider::Subclass(provided) => self.layer_subclass(provided),
            Provider::Instance(instance) => Ok(self.layer_instance(instance)),
            Provider::Middleware(middleware) => Ok(self.clone().merge(middleware(self))),
        }
    }

    fn layer_subclass(&self, provided: &ServiceType) -> Result<HookChain> {
        if provided.is_abstract() {
            return Err(DiError::Configuration(format!(
                "subclass provider '{}' has no constructor or construct function",
                provided.name()
            )));
        }

        let provided = provided.clone();
        let previous = self.map_class.clone();
        Ok(Self {
            map_class: Arc::new(move |requested: &ServiceType| {
                if provided.descends_from(requested) {
                    provided.clone()
                } else {
                    previous(requested)
                }
            }),
            ..self.clone()
        })
    }

    fn layer_instance(&self, instance: &Instance) -> HookChain {
        let instance = instance.clone();
        let previous = self.get_instance.clone();
        Self {
            get_instance: Arc::new(move |requested: &ServiceType| {
                if instance.is_instance_of(requested) {
                    Some(instance.clone())
                } else {
                    previous(requested)
                }
            }),
            ..self.clone()
        }
    }

    fn merge(self, partial: PartialHooks) -> HookChain {
        Self {
            map_class: partial.map_class.unwrap_or(self.map_class),
            get_instance: partial.get_instance.unwrap_or(self.get_instance),
            create_proxy: partial.create_proxy.unwrap_or(self.create_proxy),
        }
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain").finish_non_exhaustive()
    }
}

/// Replacement hooks returned by a middleware; unset hooks are inherited.
#[derive(Clone, Default)]
#[must_use]
pub struct PartialHooks {
    map_class: Option<MapClassFn>,
    get_instance: Option<GetInstanceFn>,
    create_proxy: Option<CreateProxyFn>,
}

impl PartialHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_class<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ServiceType) -> ServiceType + Send + Sync + 'static,
    {
        self.map_class = Some(Arc::new(hook));
        self
    }

    pub fn get_instance<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ServiceType) -> Option<Instance> + Send + Sync + 'static,
    {
        self.get_instance = Some(Arc::new(hook));
        self
    }

    pub fn create_proxy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ServiceType, Instance) -> Instance + Send + Sync + 'static,
    {
        self.create_proxy = Some(Arc::new(hook));
        self
    }
}

/// One configuration layer supplied to `provide`.
#[derive(Clone)]
pub enum Provider {
    /// Concrete type answering requests for itself and its ancestors.
    Subclass(ServiceType),
    /// Ready-made singleton answering injection requests it is an instance of.
    ///
    /// Explicit construction never sees it.
    Instance(Instance),
    /// Function rewriting any subset of the previous chain.
    Middleware(MiddlewareFn),
}

impl Provider {
    pub fn subclass(service: &ServiceType) -> Self {
        Self::Subclass(service.clone())
    }

    pub fn instance(instance: Instance) -> Self {
        Self::Instance(instance)
    }

    pub fn middleware<F>(middleware: F) -> Self
    where
        F: Fn(&HookChain) -> PartialHooks + Send + Sync + 'static,
    {
        Self::Middleware(Arc::new(middleware))
    }

    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Subclass(service) => format!("subclass {}", service.name()),
            Self::Instance(instance) => format!("instance of {}", instance.service_type().name()),
            Self::Middleware(_) => "middleware".to_string(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
