//! Entity and component seams.
//!
//! The resource core does not own an ECS. It allocates entity ids through an
//! [`EntityManager`] and hands batches of (entity, record) pairs to the
//! [`ComponentSpawner`] registered for each component type.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
};

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::{id::ComponentTypeId, params::ParamRecord};

/// Opaque entity id, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Opaque handle of the world entities are spawned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Source of fresh entity ids.
pub trait EntityManager: Send + Sync {
    fn create(&self) -> EntityId;
}

/// Monotonic entity allocator.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next_id: AtomicU64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids handed out so far.
    pub fn created(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

impl EntityManager for EntityAllocator {
    fn create(&self) -> EntityId {
        EntityId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Creates components of one type for a batch of entities.
///
/// `entities` and `records` always have the same length; `records[i]`
/// belongs to `entities[i]`.
pub trait ComponentSpawner: Send + Sync {
    fn spawn(&self, world: WorldId, entities: &[EntityId], records: &[ParamRecord]) -> anyhow::Result<()>;
}

/// Component spawners keyed by component type.
#[derive(Default)]
pub struct ComponentSystem {
    spawners: FnvHashMap<ComponentTypeId, Arc<dyn ComponentSpawner>>,
}

impl ComponentSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the spawner for `name` and returns its id.
    pub fn register(&mut self, name: &str, spawner: Arc<dyn ComponentSpawner>) -> ComponentTypeId {
        let id = ComponentTypeId::from_name(name);
        self.spawners.insert(id, spawner);
        id
    }

    pub fn spawner(&self, component: ComponentTypeId) -> Option<&Arc<dyn ComponentSpawner>> {
        self.spawners.get(&component)
    }

    pub fn contains(&self, component: ComponentTypeId) -> bool {
        self.spawners.contains_key(&component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_hands_out_distinct_ids() {
        let alloc = EntityAllocator::new();
        let a = alloc.create();
        let b = alloc.create();
        assert_ne!(a, b);
        assert_eq!(alloc.created(), 2);
    }

    struct Nop;

    impl ComponentSpawner for Nop {
        fn spawn(&self, _world: WorldId, _entities: &[EntityId], _records: &[ParamRecord]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn component_system_looks_up_by_name_hash() {
        let mut components = ComponentSystem::new();
        let id = components.register("transform", Arc::new(Nop));
        assert_eq!(id, ComponentTypeId::from_name("transform"));
        assert!(components.contains(id));
        assert!(components.spawner(ComponentTypeId::from_name("light")).is_none());
    }
}
