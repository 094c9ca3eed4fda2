//! Service type descriptors.
//!
//! A [`ServiceType`] is the runtime identity of a requestable service. It
//! carries the metadata the resolver consults:
//!
//! - `extends`: single parent link used for "descends from" checks
//! - `deps`: ordered dependency list; its presence marks the type stateful.
//!   `deps_with` defers the list to first use so types can depend on each
//!   other (typically `Lazy` statics)
//! - a default constructor producing the service object
//! - an optional custom `construct` function overriding default construction
//! - an optional `resolve_as` redirection to another type
//!
//! `deps` and `construct` are inherited from the parent chain; the default
//! constructor is not, since a subtype builds its own object.
//!
//! # Example
//!
//! ```ignore
//! let storage = ServiceType::builder("Storage").build();
//! let memory = ServiceType::builder("MemoryStorage")
//!     .extends(&storage)
//!     .constructor(|_| Ok(MemoryStorage::default()))
//!     .build();
//! let friends = ServiceType::builder("FriendStorage")
//!     .deps([&storage])
//!     .constructor(|c| Ok(FriendStorage::new(c.injector())))
//!     .build();
//! ```

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::construction::Construction;
use crate::error::Result;
use crate::instance::Instance;

/// Type-erased service object produced by a constructor.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Default constructor: builds the service object.
pub type Constructor = Arc<dyn Fn(&Construction<'_>) -> Result<Object> + Send + Sync>;

/// Custom construct function: builds the whole instance, used verbatim.
pub type ConstructFn = Arc<dyn Fn(&Construction<'_>) -> Result<Instance> + Send + Sync>;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`ServiceType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u64);

impl ServiceId {
    fn next() -> Self {
        Self(NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable descriptor of a requestable service.
///
/// Cloning is cheap; clones share identity.
#[derive(Clone)]
pub struct ServiceType(Arc<Descriptor>);

struct Descriptor {
    id: ServiceId,
    name: String,
    parent: Option<ServiceType>,
    deps: Option<Deps>,
    constructor: Option<Constructor>,
    construct: Option<ConstructFn>,
    resolve_as: Option<ServiceType>,
}

type DepsFn = Box<dyn Fn() -> Vec<ServiceType> + Send + Sync>;

enum Deps {
    Declared(Vec<ServiceType>),
    Deferred {
        init: DepsFn,
        resolved: OnceCell<Vec<ServiceType>>,
    },
}

impl Deps {
    fn get(&self) -> &[ServiceType] {
        match self {
            Self::Declared(deps) => deps,
            Self::Deferred { init, resolved } => resolved.get_or_init(|| init()),
        }
    }
}

impl ServiceType {
    /// Start declaring a new service type.
    pub fn builder(name: impl Into<String>) -> ServiceTypeBuilder {
        ServiceTypeBuilder {
            name: name.into(),
            parent: None,
            deps: None,
            constructor: None,
            construct: None,
            resolve_as: None,
        }
    }

    pub fn id(&self) -> ServiceId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&ServiceType> {
        self.0.parent.as_ref()
    }

    /// This type followed by each ancestor, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &ServiceType> {
        std::iter::successors(Some(self), |ty| ty.parent())
    }

    /// True if `base` is this type or one of its ancestors.
    pub fn descends_from(&self, base: &ServiceType) -> bool {
        self.ancestors().any(|ty| ty == base)
    }

    /// Declared dependencies, inherited from the nearest ancestor declaring them.
    ///
    /// `None` means stateless.
    pub fn deps(&self) -> Option<&[ServiceType]> {
        self.ancestors()
            .find_map(|ty| ty.0.deps.as_ref())
            .map(Deps::get)
    }

    pub fn is_stateful(&self) -> bool {
        self.deps().is_some()
    }

    pub(crate) fn constructor(&self) -> Option<&Constructor> {
        self.0.constructor.as_ref()
    }

    pub(crate) fn construct_fn(&self) -> Option<&ConstructFn> {
        self.ancestors().find_map(|ty| ty.0.construct.as_ref())
    }

    /// True if nothing can be built from this type directly.
    pub fn is_abstract(&self) -> bool {
        self.constructor().is_none() && self.construct_fn().is_none()
    }

    /// Follow `resolve_as` redirections to the type actually resolved.
    pub fn canonical(&self) -> ServiceType {
        let mut current = self;
        while let Some(target) = &current.0.resolve_as {
            current = target;
        }
        current.clone()
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceType")
            .field("name", &self.0.name)
            .field("id", &self.0.id)
            .field("stateful", &self.is_stateful())
            .field("abstract", &self.is_abstract())
            .finish()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Builder for [`ServiceType`].
#[must_use]
pub struct ServiceTypeBuilder {
    name: String,
    parent: Option<ServiceType>,
    deps: Option<Deps>,
    constructor: Option<Constructor>,
    construct: Option<ConstructFn>,
    resolve_as: Option<ServiceType>,
}

impl ServiceTypeBuilder {
    /// Declare `parent` as the type this one descends from.
    pub fn extends(mut self, parent: &ServiceType) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare the ordered dependency list, marking the type stateful.
    pub fn deps<'a>(mut self, deps: impl IntoIterator<Item = &'a ServiceType>) -> Self {
        self.deps = Some(Deps::Declared(deps.into_iter().cloned().collect()));
        self
    }

    /// Declare the dependency list lazily; `deps` runs once, on first use.
    pub fn deps_with<F>(mut self, deps: F) -> Self
    where
        F: Fn() -> Vec<ServiceType> + Send + Sync + 'static,
    {
        self.deps = Some(Deps::Deferred {
            init: Box::new(deps),
            resolved: OnceCell::new(),
        });
        self
    }

    /// Mark the type stateful without dependencies (one process-wide singleton).
    pub fn stateful(mut self) -> Self {
        self.deps.get_or_insert_with(|| Deps::Declared(Vec::new()));
        self
    }

    /// Default constructor producing the service object.
    pub fn constructor<T, F>(mut self, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Construction<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(move |construction: &Construction<'_>| {
            constructor(construction).map(|value| Arc::new(value) as Object)
        }));
        self
    }

    /// Custom construct function; its instance is used verbatim.
    pub fn construct<F>(mut self, construct: F) -> Self
    where
        F: Fn(&Construction<'_>) -> Result<Instance> + Send + Sync + 'static,
    {
        self.construct = Some(Arc::new(construct));
        self
    }

    /// Resolve requests for this type as `target` instead.
    pub fn resolve_as(mut self, target: &ServiceType) -> Self {
        self.resolve_as = Some(target.clone());
        self
    }

    pub fn build(self) -> ServiceType {
        ServiceType(Arc::new(Descriptor {
            id: ServiceId::next(),
            name: self.name,
            parent: self.parent,
            deps: self.deps,
            constructor: self.constructor,
            construct: self.construct,
            resolve_as: self.resolve_as,
        }))
    }
}

/// Ordered constructor arguments.
#[derive(Clone, Default)]
pub struct Args(Vec<Object>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.0.push(Arc::new(value));
        self
    }

    pub fn push_object(&mut self, object: Object) {
        self.0.push(object);
    }

    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.0.get(index)?.downcast_ref::<T>()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.0.len()).finish()
    }
}
