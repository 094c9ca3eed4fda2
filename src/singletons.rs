//! Dependent-singleton cache.
//!
//! Stateful services are shared per (service type, dependency identities):
//! one trie per service, one level per declared dependency, each edge keyed by
//! the backing instance the dependency resolved to. Any two contexts that
//! resolve the same dependencies to the same backing instances see the same
//! singleton, whatever providers they were derived with.
//!
//! Edges hold their key weakly and singletons strongly, so an entry lives as
//! long as every instance on its path does. An edge's weak key keeps its
//! address reserved, so a dead edge is never reached by address again.
//! Instead every lookup and insertion drops the dead edges among the children
//! of each node it passes through, which releases a dead singleton on the
//! next access to its service. [`DependentSingletons::purge`] sweeps the whole
//! cache; [`evict`] and [`clear`] release entries explicitly. A singleton that
//! itself owns one of its keys keeps that path alive until evicted.
//!
//! [`evict`]: DependentSingletons::evict
//! [`clear`]: DependentSingletons::clear

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::context::lock;
use crate::error::{DiError, Result};
use crate::instance::{Instance, WeakInstance};
use crate::service::{ServiceId, ServiceType};

static GLOBAL: Lazy<Arc<DependentSingletons>> = Lazy::new(|| Arc::new(DependentSingletons::new()));

/// Cache of stateful singletons keyed by their dependencies' backing instances.
#[derive(Default)]
pub struct DependentSingletons {
    roots: Mutex<HashMap<ServiceId, Root>>,
}

struct Root {
    name: String,
    arity: usize,
    node: Node,
}

#[derive(Default)]
struct Node {
    value: Option<Instance>,
    children: HashMap<usize, Edge>,
}

struct Edge {
    key: WeakInstance,
    node: Node,
}

impl DependentSingletons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache shared by every [`Context::root`](crate::Context::root).
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Singleton for `service` keyed by `deps` (backing instances), if cached.
    pub fn get(&self, service: &ServiceType, deps: &[Instance]) -> Result<Option<Instance>> {
        let mut roots = lock(&self.roots);
        let Some(root) = roots.get_mut(&service.id()) else {
            return Ok(None);
        };
        root.check_arity(deps.len())?;
        Ok(root.node.find(deps))
    }

    /// Cache `instance` unless an entry already exists; returns the cached one.
    pub fn get_or_insert(
        &self,
        service: &ServiceType,
        deps: &[Instance],
        instance: Instance,
    ) -> Result<Instance> {
        let mut roots = lock(&self.roots);
        let root = roots.entry(service.id()).or_insert_with(|| Root {
            name: service.name().to_string(),
            arity: deps.len(),
            node: Node::default(),
        });
        root.check_arity(deps.len())?;

        let node = root.node.descend(deps);
        match &node.value {
            Some(existing) => {
                tracing::debug!(service = %service, "Singleton inserted concurrently, keeping first");
                Ok(existing.clone())
            }
            None => {
                node.value = Some(instance.clone());
                Ok(instance)
            }
        }
    }

    /// Drop every cached singleton of `service`. Returns true if any existed.
    pub fn evict(&self, service: &ServiceType) -> bool {
        lock(&self.roots).remove(&service.id()).is_some()
    }

    pub fn clear(&self) {
        lock(&self.roots).clear();
    }

    /// Remove entries reachable only through dropped dependencies.
    ///
    /// Returns the number of singletons released.
    pub fn purge(&self) -> usize {
        let mut roots = lock(&self.roots);
        let mut released = 0;
        roots.retain(|_, root| {
            released += root.node.purge();
            !root.node.is_empty()
        });
        if released > 0 {
            tracing::debug!(released, "Purged dependent singletons");
        }
        released
    }

    /// Number of singletons whose whole dependency path is still alive.
    pub fn len(&self) -> usize {
        lock(&self.roots).values().map(|root| root.node.live()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DependentSingletons {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let roots = lock(&self.roots);
        f.debug_map()
            .entries(roots.values().map(|root| (&root.name, root.node.live())))
            .finish()
    }
}

impl Root {
    fn check_arity(&self, actual: usize) -> Result<()> {
        if self.arity == actual {
            Ok(())
        } else {
            Err(DiError::InternalConsistency {
                service: self.name.clone(),
                expected: self.arity,
                actual,
            })
        }
    }
}

impl Node {
    fn find(&mut self, deps: &[Instance]) -> Option<Instance> {
        let Some((first, rest)) = deps.split_first() else {
            return self.value.clone();
        };
        self.prune();
        self.children.get_mut(&first.addr())?.node.find(rest)
    }

    fn descend(&mut self, deps: &[Instance]) -> &mut Node {
        let mut node = self;
        for dep in deps {
            node.prune();
            node = &mut node
                .children
                .entry(dep.addr())
                .or_insert_with(|| Edge {
                    key: dep.downgrade(),
                    node: Node::default(),
                })
                .node;
        }
        node
    }

    /// Drop dead edges directly below this node.
    fn prune(&mut self) -> usize {
        let mut released = 0;
        self.children.retain(|_, edge| {
            let alive = edge.key.is_alive();
            if !alive {
                released += edge.node.count();
            }
            alive
        });
        if released > 0 {
            tracing::trace!(released, "Pruned dead singleton paths");
        }
        released
    }

    fn purge(&mut self) -> usize {
        let mut released = 0;
        self.children.retain(|_, edge| {
            if edge.key.is_alive() {
                released += edge.node.purge();
                !edge.node.is_empty()
            } else {
                released += edge.node.count();
                false
            }
        });
        released
    }

    fn count(&self) -> usize {
        usize::from(self.value.is_some())
            + self
                .children
                .values()
                .map(|edge| edge.node.count())
                .sum::<usize>()
    }

    fn live(&self) -> usize {
        usize::from(self.value.is_some())
            + self
                .children
                .values()
                .filter(|edge| edge.key.is_alive())
                .map(|edge| edge.node.live())
                .sum::<usize>()
    }

    fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> ServiceType {
        ServiceType::builder(name)
            .constructor(|_| Ok(()))
            .build()
    }

    fn instance(ty: &ServiceType) -> Instance {
        Instance::new(ty, ())
    }

    #[test]
    fn test_lookup_by_dependency_identity() {
        let cache = DependentSingletons::new();
        let storage = service("Storage");
        let friends = service("Friends");
        let first = instance(&storage);
        let second = instance(&storage);

        assert!(cache.get(&friends, &[first.clone()]).unwrap().is_none());

        let cached = instance(&friends);
        let stored = cache
            .get_or_insert(&friends, &[first.clone()], cached.clone())
            .unwrap();
        assert!(Instance::ptr_eq(&stored, &cached));

        let hit = cache.get(&friends, &[first.clone()]).unwrap().unwrap();
        assert!(Instance::ptr_eq(&hit, &cached));
        assert!(cache.get(&friends, &[second]).unwrap().is_none());
    }

    #[test]
    fn test_key_order_matters() {
        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let pair = service("Pair");
        let a = instance(&dep);
        let b = instance(&dep);

        let ab = instance(&pair);
        cache
            .get_or_insert(&pair, &[a.clone(), b.clone()], ab.clone())
            .unwrap();
        assert!(cache.get(&pair, &[b, a]).unwrap().is_none());
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = DependentSingletons::new();
        let counter = service("Counter");
        let first = instance(&counter);
        let second = instance(&counter);

        cache.get_or_insert(&counter, &[], first.clone()).unwrap();
        let kept = cache.get_or_insert(&counter, &[], second).unwrap();
        assert!(Instance::ptr_eq(&kept, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_arity_mismatch_is_internal_error() {
        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let owner = service("Owner");
        let d = instance(&dep);

        cache
            .get_or_insert(&owner, &[d.clone()], instance(&owner))
            .unwrap();
        let err = cache.get(&owner, &[d.clone(), d]).unwrap_err();
        assert!(matches!(
            err,
            DiError::InternalConsistency {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_dead_dependency_releases_singleton() {
        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let owner = service("Owner");
        let kept = instance(&dep);
        let dropped = instance(&dep);

        cache
            .get_or_insert(&owner, &[kept.clone()], instance(&owner))
            .unwrap();
        cache
            .get_or_insert(&owner, &[dropped.clone()], instance(&owner))
            .unwrap();
        assert_eq!(cache.len(), 2);

        drop(dropped);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge(), 1);
        assert_eq!(cache.purge(), 0);
        assert!(cache.get(&owner, &[kept]).unwrap().is_some());
    }

    #[test]
    fn test_lookup_releases_dead_siblings() {
        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let owner = service("Owner");
        let kept = instance(&dep);
        let dropped = instance(&dep);

        let orphan = instance(&owner);
        let watch = orphan.downgrade();
        cache.get_or_insert(&owner, &[dropped.clone()], orphan).unwrap();
        drop(dropped);
        assert!(watch.is_alive());

        assert!(cache.get(&owner, &[kept.clone()]).unwrap().is_none());
        assert!(!watch.is_alive());
        assert_eq!(cache.purge(), 0);
    }

    #[test]
    fn test_insert_releases_dead_siblings() {
        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let owner = service("Owner");

        let mut watches = Vec::new();
        for _ in 0..10 {
            let key = instance(&dep);
            let value = instance(&owner);
            watches.push(value.downgrade());
            cache.get_or_insert(&owner, &[key], value).unwrap();
        }

        let retained = watches.iter().filter(|watch| watch.is_alive()).count();
        assert_eq!(retained, 1);
        assert_eq!(cache.purge(), 1);
    }

    #[test]
    fn test_concurrent_first_insert_wins() {
        use std::sync::Barrier;

        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let owner = service("Owner");
        let key = instance(&dep);
        let barrier = Barrier::new(8);

        let results: Vec<Instance> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let candidate = instance(&owner);
                        barrier.wait();
                        cache
                            .get_or_insert(&owner, &[key.clone()], candidate)
                            .unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let first = &results[0];
        assert!(results.iter().all(|result| Instance::ptr_eq(result, first)));
        let stored = cache.get(&owner, &[key]).unwrap().unwrap();
        assert!(Instance::ptr_eq(&stored, first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_removes_empty_roots() {
        let cache = DependentSingletons::new();
        let dep = service("Dep");
        let owner = service("Owner");
        let d = instance(&dep);

        cache
            .get_or_insert(&owner, &[d.clone()], instance(&owner))
            .unwrap();
        drop(d);
        assert_eq!(cache.purge(), 1);
        assert!(cache.is_empty());
        assert!(lock(&cache.roots).is_empty());
    }

    #[test]
    fn test_evict_and_clear() {
        let cache = DependentSingletons::new();
        let a = service("A");
        let b = service("B");
        cache.get_or_insert(&a, &[], instance(&a)).unwrap();
        cache.get_or_insert(&b, &[], instance(&b)).unwrap();

        assert!(cache.evict(&a));
        assert!(!cache.evict(&a));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
