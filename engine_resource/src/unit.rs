//! Unit resources and instantiation.
//!
//! A unit is a template of entities and the components attached to them.
//! Entities are addressed by local index inside the unit; spawning allocates
//! fresh global ids and remaps every group onto them, issuing one batched
//! component spawn per group.
//!
//! Compiled unit data is JSON:
//!
//! ```json
//! {
//!   "entity_count": 3,
//!   "groups": [
//!     { "component": "transform", "entities": [0, 2],
//!       "records": [{ "position": [0, 0, 0] }, { "scale": 2.0 }] }
//!   ]
//! }
//! ```

use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::{
    cache::ResourceCache,
    ecs::{ComponentSystem, EntityId, EntityManager, WorldId},
    error::{shared, ResourceError, Result},
    id::{ComponentTypeId, ResourceHandle, ResourceInstanceId, ResourceTypeId},
    params::ParamRecord,
    registry::{Representation, ResourceType},
};

pub const UNIT_TYPE_NAME: &str = "unit";

pub fn unit_type() -> ResourceTypeId {
    ResourceTypeId::from_name(UNIT_TYPE_NAME)
}

/// Components of one type attached to a set of local entities.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentGroup {
    pub component: ComponentTypeId,
    /// Local entity indices; `entities[i]` receives `records[i]`.
    pub entities: Vec<u32>,
    pub records: Vec<ParamRecord>,
}

/// Loaded form of a unit resource. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDescription {
    /// Number of local entity slots; index 0 is the root.
    pub entity_count: u32,
    pub groups: Vec<ComponentGroup>,
}

#[derive(Deserialize)]
struct UnitFile {
    entity_count: u32,
    #[serde(default)]
    groups: Vec<GroupFile>,
}

#[derive(Deserialize)]
struct GroupFile {
    component: String,
    entities: Vec<u32>,
    records: Vec<ParamRecord>,
}

impl UnitDescription {
    /// Parses compiled unit JSON and validates it.
    pub fn from_json(data: &[u8]) -> anyhow::Result<Self> {
        let file: UnitFile = serde_json::from_slice(data).context("parse unit json")?;
        let desc = UnitDescription {
            entity_count: file.entity_count,
            groups: file
                .groups
                .into_iter()
                .map(|g| ComponentGroup {
                    component: ComponentTypeId::from_name(&g.component),
                    entities: g.entities,
                    records: g.records,
                })
                .collect(),
        };
        desc.validate()?;
        Ok(desc)
    }

    /// Checks group lengths and local index bounds.
    pub fn validate(&self) -> Result<()> {
        if self.entity_count == 0 {
            return Err(ResourceError::FormatError(
                "unit declares no entities".to_string(),
            ));
        }
        for (i, group) in self.groups.iter().enumerate() {
            if group.entities.len() != group.records.len() {
                return Err(ResourceError::FormatError(format!(
                    "group {i}: {} entities but {} records",
                    group.entities.len(),
                    group.records.len()
                )));
            }
            if let Some(&bad) = group.entities.iter().find(|&&e| e >= self.entity_count) {
                return Err(ResourceError::FormatError(format!(
                    "group {i}: local index {bad} out of range 0..{}",
                    self.entity_count
                )));
            }
        }
        Ok(())
    }
}

/// Resource type for units.
#[derive(Debug, Default)]
pub struct UnitResourceType;

impl ResourceType for UnitResourceType {
    fn load(&self, _handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation> {
        Ok(Arc::new(UnitDescription::from_json(&bytes)?))
    }
}

/// Instantiates a description into `world`.
///
/// Validation happens before any entity is created. Once groups are being
/// processed a failure leaves the already-created entities in place.
pub fn spawn_description(
    desc: &UnitDescription,
    world: WorldId,
    entities: &dyn EntityManager,
    components: &ComponentSystem,
) -> Result<EntityId> {
    desc.validate()?;

    let locals: Vec<EntityId> = (0..desc.entity_count).map(|_| entities.create()).collect();

    for group in &desc.groups {
        let spawner = components
            .spawner(group.component)
            .ok_or(ResourceError::UnknownComponentType(group.component))?;
        let ids: Vec<EntityId> = group.entities.iter().map(|&i| locals[i as usize]).collect();
        spawner
            .spawn(world, &ids, &group.records)
            .map_err(|e| ResourceError::ComponentSpawnFailure {
                component: group.component,
                source: shared(e),
            })?;
    }

    Ok(locals[0])
}

/// Spawns units fetched from the resource cache.
pub struct UnitSpawner {
    cache: Arc<ResourceCache>,
    entities: Arc<dyn EntityManager>,
    components: Arc<ComponentSystem>,
    unit_type: ResourceTypeId,
}

impl UnitSpawner {
    pub fn new(
        cache: Arc<ResourceCache>,
        entities: Arc<dyn EntityManager>,
        components: Arc<ComponentSystem>,
    ) -> Self {
        Self {
            cache,
            entities,
            components,
            unit_type: unit_type(),
        }
    }

    /// Spawns the online unit `unit` into `world` and returns its root entity.
    pub fn spawn(&self, world: WorldId, unit: ResourceInstanceId) -> Result<EntityId> {
        let desc = self.cache.get_as::<UnitDescription>(self.unit_type, unit)?;
        let root = spawn_description(&desc, world, self.entities.as_ref(), &self.components)?;
        debug!(unit = %unit, world = world.0, root = root.0, entities = desc.entity_count, "spawned unit");
        Ok(root)
    }
}
