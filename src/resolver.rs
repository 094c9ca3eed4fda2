//! The resolution algorithm.
//!
//! [`Scope::invoke`] returns the shared instance of a service:
//!
//! 1. follow `resolve_as` redirections
//! 2. return the context's memoised instance if present
//! 3. take a provided instance from `get_instance` if one matches
//! 4. stateless: construct the mapped concrete type
//! 5. stateful: with the type marked active, resolve each dependency in
//!    declaration order, key the dependent-singleton cache by their backing
//!    instances and construct only on a miss
//!
//! Every result passes through `create_proxy` and is memoised in the context.
//! A type is marked active while it is being built, stateless or not. The
//! active set lives in the scope, so a cycle is reported as
//! [`DiError::CircularDependency`] instead of recursing forever, and
//! unrelated call chains never observe each other.
//!
//! A shared singleton's injector gains every context it is handed out to, so
//! it keeps resolving while any of them is alive.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::construction;
use crate::context::{Context, Injector};
use crate::error::{DiError, Result};
use crate::hooks::Provider;
use crate::instance::Instance;
use crate::service::{Args, ServiceId, ServiceType};

/// Receiver bound for the duration of [`Context::run`].
///
/// Resolution started from the same scope shares one resolution path.
pub struct Scope {
    context: Context,
    path: RefCell<ResolutionPath>,
}

#[derive(Default)]
struct ResolutionPath {
    active: HashSet<ServiceId>,
    stack: Vec<ServiceType>,
}

impl ResolutionPath {
    fn describe(&self, reentered: &ServiceType) -> String {
        self.stack
            .iter()
            .skip_while(|service| *service != reentered)
            .chain(std::iter::once(reentered))
            .map(ServiceType::name)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Marks a service active until dropped.
struct ActiveGuard<'a> {
    path: &'a RefCell<ResolutionPath>,
    service: ServiceId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut path = self.path.borrow_mut();
        path.active.remove(&self.service);
        if let Some(position) = path.stack.iter().rposition(|ty| ty.id() == self.service) {
            path.stack.remove(position);
        }
    }
}

impl Scope {
    pub(crate) fn new(context: Context) -> Self {
        Self {
            context,
            path: RefCell::new(ResolutionPath::default()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Derive a nested context from this scope's context.
    pub fn provide<I>(&self, providers: I) -> Result<Context>
    where
        I: IntoIterator<Item = Provider>,
    {
        self.context.provide(providers)
    }

    pub fn injector(&self) -> Injector {
        self.context.injector()
    }

    /// Shared instance of `service` in this scope's context.
    pub fn invoke(&self, service: &ServiceType) -> Result<Instance> {
        let service = service.canonical();

        if let Some(instance) = self.context.memoized(&service) {
            tracing::trace!(service = %service, "Memoized instance");
            return Ok(instance);
        }

        let hooks = self.context.hooks();
        if let Some(provided) = hooks.get_instance(&service) {
            tracing::debug!(service = %service, "Using provided instance");
            let instance = hooks.create_proxy(&service, provided);
            return Ok(self.context.memoize(&service, instance));
        }

        let instance = match service.deps() {
            None => {
                let _active = self.enter(&service)?;
                let concrete = self.context.map_class(&service);
                construction::build(self, &concrete, Args::new())?
            }
            Some(deps) => self.resolve_stateful(&service, deps)?,
        };

        let instance = hooks.create_proxy(&service, instance);
        Ok(self.context.memoize(&service, instance))
    }

    /// Fresh instance of the concrete type mapped for `service`.
    ///
    /// Bypasses every cache and never consults provided instances.
    pub fn construct(&self, service: &ServiceType, args: Args) -> Result<Instance> {
        let service = service.canonical();
        let instance = {
            let _active = self.enter(&service)?;
            let concrete = self.context.map_class(&service);
            construction::build(self, &concrete, args)?
        };
        Ok(self.context.hooks().create_proxy(&service, instance))
    }

    pub fn new_instance(&self, service: &ServiceType) -> Result<Instance> {
        self.construct(service, Args::new())
    }

    fn resolve_stateful(&self, service: &ServiceType, deps: &[ServiceType]) -> Result<Instance> {
        let _active = self.enter(service)?;

        let key = deps
            .iter()
            .map(|dep| self.invoke(dep).map(|instance| instance.backing().clone()))
            .collect::<Result<Vec<_>>>()?;

        let singletons = self.context.singletons();
        let shared = match singletons.get(service, &key)? {
            Some(shared) => {
                tracing::debug!(service = %service, deps = key.len(), "Reusing dependent singleton");
                shared
            }
            None => {
                let concrete = self.context.map_class(service);
                let built = construction::build(self, &concrete, Args::new())?;
                tracing::debug!(
                    service = %service,
                    concrete = %concrete,
                    deps = key.len(),
                    "Constructed dependent singleton"
                );
                singletons.get_or_insert(service, &key, built)?
            }
        };

        if let Some(injector) = shared.injector() {
            injector.attach(&self.context);
        }
        Ok(shared)
    }

    fn enter(&self, service: &ServiceType) -> Result<ActiveGuard<'_>> {
        let mut path = self.path.borrow_mut();
        if !path.active.insert(service.id()) {
            let cycle = path.describe(service);
            tracing::debug!(service = %service, cycle = %cycle, "Circular dependency");
            return Err(DiError::CircularDependency {
                service: service.name().to_string(),
                path: cycle,
            });
        }
        path.stack.push(service.clone());
        Ok(ActiveGuard {
            path: &self.path,
            service: service.id(),
        })
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("context", &self.context)
            .field("active", &self.path.borrow().stack.len())
            .finish()
    }
}
