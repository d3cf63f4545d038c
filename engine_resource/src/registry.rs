//! Resource type registry.
//!
//! A resource kind plugs into the cache by implementing [`ResourceType`] and
//! registering it once under its [`ResourceTypeId`]. Types live for the
//! lifetime of the registry; there is no unregister.

use std::{
    any::Any,
    sync::{Arc, PoisonError, RwLock},
};

use bytes::Bytes;
use fnv::FnvHashMap;
use tracing::debug;

use crate::{
    error::{ResourceError, Result},
    id::{ResourceHandle, ResourceTypeId},
};

/// In-memory form of a loaded resource, shared by every reader.
pub type Representation = Arc<dyn Any + Send + Sync>;

/// Lifecycle callbacks of one resource kind.
///
/// The cache calls these under the per-handle lock, so two callbacks never run
/// concurrently for the same handle.
pub trait ResourceType: Send + Sync + 'static {
    /// Parses raw bytes into a representation.
    fn load(&self, handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation>;

    /// Releases a representation that is leaving the cache.
    fn unload(&self, handle: ResourceHandle, repr: Representation) {
        let _ = (handle, repr);
    }

    /// Derives runtime-only state. Called once per transition into `Online`.
    fn online(&self, handle: ResourceHandle, repr: &Representation) {
        let _ = (handle, repr);
    }

    /// Tears down what `online` derived. Called once per transition out of `Online`.
    fn offline(&self, handle: ResourceHandle, repr: &Representation) {
        let _ = (handle, repr);
    }

    /// Builds a replacement from new bytes. `old` stays valid for readers that
    /// still hold it.
    fn reload(
        &self,
        handle: ResourceHandle,
        old: &Representation,
        bytes: Bytes,
    ) -> anyhow::Result<Representation> {
        let _ = old;
        self.load(handle, bytes)
    }
}

/// Maps resource type ids to their lifecycle callbacks.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<FnvHashMap<ResourceTypeId, Arc<dyn ResourceType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers callbacks for `type_id`. Fails if the type is already known.
    pub fn register_type(&self, type_id: ResourceTypeId, vtable: Arc<dyn ResourceType>) -> Result<()> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(&type_id) {
            return Err(ResourceError::DuplicateTypeRegistration(type_id));
        }
        debug!(type_id = %type_id, "registered resource type");
        types.insert(type_id, vtable);
        Ok(())
    }

    /// Registers `vtable` under the hash of `name`.
    pub fn register<T: ResourceType>(&self, name: &str, vtable: T) -> Result<ResourceTypeId> {
        let type_id = ResourceTypeId::from_name(name);
        self.register_type(type_id, Arc::new(vtable))?;
        Ok(type_id)
    }

    pub fn get(&self, type_id: ResourceTypeId) -> Result<Arc<dyn ResourceType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
            .ok_or(ResourceError::UnknownResourceType(type_id))
    }

    pub fn contains(&self, type_id: ResourceTypeId) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&type_id)
    }
}
