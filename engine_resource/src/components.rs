//! Built-in component systems.

use std::sync::{PoisonError, RwLock};

use anyhow::Context;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    ecs::{ComponentSpawner, EntityId, WorldId},
    math::Vec3,
    params::ParamRecord,
};

/// Placement of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl Transform {
    /// Reads `position` (`[x, y, z]`) and `scale` (number); missing keys keep defaults.
    pub fn from_record(record: &ParamRecord) -> anyhow::Result<Self> {
        let mut transform = Transform::default();
        if let Some(value) = record.get("position") {
            transform.position = Vec3::from_param(value).context("position must be [x, y, z]")?;
        }
        if let Some(value) = record.get("scale") {
            transform.scale = value.as_float().context("scale must be a number")? as f32;
        }
        Ok(transform)
    }
}

/// Stores transforms per (world, entity).
#[derive(Default)]
pub struct TransformSystem {
    transforms: RwLock<FnvHashMap<(WorldId, EntityId), Transform>>,
}

impl TransformSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, world: WorldId, entity: EntityId) -> Option<Transform> {
        self.transforms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(world, entity))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.transforms.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ComponentSpawner for TransformSystem {
    fn spawn(&self, world: WorldId, entities: &[EntityId], records: &[ParamRecord]) -> anyhow::Result<()> {
        // Parse the whole batch before touching storage.
        let parsed = records
            .iter()
            .map(Transform::from_record)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut transforms = self.transforms.write().unwrap_or_else(PoisonError::into_inner);
        transforms.reserve(entities.len());
        for (&entity, transform) in entities.iter().zip(parsed) {
            transforms.insert((world, entity), transform);
        }
        Ok(())
    }
}
