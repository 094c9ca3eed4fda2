//! Resolution contexts.
//!
//! A [`Context`] bundles a [`HookChain`] with two caches that are private to
//! it: resolved instances (memoised per requested type) and `map_class`
//! results. Contexts are immutable; [`Context::provide`] derives a new one
//! with fresh caches, sharing only the dependent-singleton cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::{DiError, Result};
use crate::hooks::{HookChain, Provider};
use crate::instance::Instance;
use crate::resolver::Scope;
use crate::service::{Args, ServiceId, ServiceType};
use crate::singletons::DependentSingletons;

/// Immutable, composable resolution configuration.
///
/// Cloning shares the same context (and its caches).
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    hooks: HookChain,
    singletons: Arc<DependentSingletons>,
    instances: Mutex<HashMap<ServiceId, Instance>>,
    classes: Mutex<HashMap<ServiceId, ServiceType>>,
    depth: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self::root()
    }
}

impl Context {
    /// Empty context backed by the process-wide singleton cache.
    pub fn root() -> Self {
        Self::with_singletons(DependentSingletons::global())
    }

    /// Empty context backed by a caller-owned singleton cache.
    pub fn with_singletons(singletons: Arc<DependentSingletons>) -> Self {
        Self::from_parts(HookChain::base(), singletons, 0)
    }

    fn from_parts(hooks: HookChain, singletons: Arc<DependentSingletons>, depth: usize) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                hooks,
                singletons,
                instances: Mutex::new(HashMap::new()),
                classes: Mutex::new(HashMap::new()),
                depth,
            }),
        }
    }

    /// Derive a context layering `providers` left to right.
    ///
    /// The result always has empty caches, even with no providers. Fails with
    /// [`DiError::Configuration`] on the first invalid provider; `self` is
    /// never modified.
    pub fn provide<I>(&self, providers: I) -> Result<Context>
    where
        I: IntoIterator<Item = Provider>,
    {
        let mut hooks = self.inner.hooks.clone();
        let mut depth = self.inner.depth;
        for provider in providers {
            hooks = hooks.layer(&provider)?;
            depth += 1;
            tracing::debug!(provider = %provider.describe(), depth, "Layered provider");
        }
        Ok(Self::from_parts(hooks, self.inner.singletons.clone(), depth))
    }

    pub fn hooks(&self) -> &HookChain {
        &self.inner.hooks
    }

    pub fn singletons(&self) -> &Arc<DependentSingletons> {
        &self.inner.singletons
    }

    /// Number of providers layered since the root.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Concrete type for `service`, stable for the lifetime of this context.
    pub fn map_class(&self, service: &ServiceType) -> ServiceType {
        if let Some(mapped) = lock(&self.inner.classes).get(&service.id()) {
            return mapped.clone();
        }
        let mapped = self.inner.hooks.map_class(service);
        lock(&self.inner.classes)
            .entry(service.id())
            .or_insert(mapped)
            .clone()
    }

    /// Shared instance of `service` in this context.
    pub fn invoke(&self, service: &ServiceType) -> Result<Instance> {
        self.run(|scope| scope.invoke(service))
    }

    /// Fresh, uncached instance of `service` built with `args`.
    pub fn construct(&self, service: &ServiceType, args: Args) -> Result<Instance> {
        self.run(|scope| scope.construct(service, args))
    }

    /// Fresh, uncached instance of `service` built without arguments.
    pub fn new_instance(&self, service: &ServiceType) -> Result<Instance> {
        self.construct(service, Args::new())
    }

    /// Run `f` with this context bound as its resolution scope.
    pub fn run<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        let scope = Scope::new(self.clone());
        f(&scope)
    }

    /// Non-owning handle resolving through this context.
    pub fn injector(&self) -> Injector {
        Injector {
            contexts: Arc::new(Mutex::new(vec![Arc::downgrade(&self.inner)])),
        }
    }

    pub(crate) fn memoized(&self, service: &ServiceType) -> Option<Instance> {
        lock(&self.inner.instances).get(&service.id()).cloned()
    }

    /// Memoise `instance`, keeping an earlier entry if one raced in.
    pub(crate) fn memoize(&self, service: &ServiceType, instance: Instance) -> Instance {
        lock(&self.inner.instances)
            .entry(service.id())
            .or_insert(instance)
            .clone()
    }

    /// Identity comparison of two contexts.
    pub fn ptr_eq(a: &Context, b: &Context) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.inner.depth)
            .field("memoized", &lock(&self.inner.instances).len())
            .finish()
    }
}

/// Injection handle handed to stateful services at construction.
///
/// It holds every context the service was handed out to, weakly, and resolves
/// through the first one still alive. A dependent singleton is shared by all
/// contexts whose dependencies resolve to the same backing instances, so any
/// of them answers for it. Clones share the same set. Resolving once every
/// such context is gone fails with [`DiError::ContextReleased`].
#[derive(Clone)]
pub struct Injector {
    contexts: Arc<Mutex<Vec<Weak<ContextInner>>>>,
}

impl Injector {
    /// First live context this injector resolves through.
    pub fn context(&self) -> Option<Context> {
        let mut contexts = lock(&self.contexts);
        contexts.retain(|context| context.strong_count() > 0);
        contexts
            .iter()
            .find_map(Weak::upgrade)
            .map(|inner| Context { inner })
    }

    pub fn invoke(&self, service: &ServiceType) -> Result<Instance> {
        self.live_context(service)?.invoke(service)
    }

    pub fn construct(&self, service: &ServiceType, args: Args) -> Result<Instance> {
        self.live_context(service)?.construct(service, args)
    }

    /// Let `context` answer for this injector once earlier contexts are gone.
    pub(crate) fn attach(&self, context: &Context) {
        let target = Arc::downgrade(&context.inner);
        let mut contexts = lock(&self.contexts);
        contexts.retain(|known| known.strong_count() > 0);
        if !contexts.iter().any(|known| Weak::ptr_eq(known, &target)) {
            contexts.push(target);
        }
    }

    fn live_context(&self, service: &ServiceType) -> Result<Context> {
        self.context().ok_or_else(|| DiError::ContextReleased {
            service: service.name().to_string(),
        })
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contexts = lock(&self.contexts);
        let alive = contexts
            .iter()
            .filter(|context| context.strong_count() > 0)
            .count();
        f.debug_struct("Injector").field("alive", &alive).finish()
    }
}

/// Caches only ever gain complete entries, so a poisoned lock is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
