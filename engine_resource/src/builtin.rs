//! Built-in resource kinds.
//!
//! Only kinds the core itself consumes are parsed here (packages, units and
//! JSON configs). Kinds whose formats belong to other subsystems keep their
//! compiled bytes untouched.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Context;
use bytes::Bytes;

use crate::{
    cache::ResourceCache,
    error::Result,
    id::ResourceHandle,
    package::{PackageResourceType, PACKAGE_TYPE_NAME},
    registry::{Representation, ResourceType},
    unit::{UnitResourceType, UNIT_TYPE_NAME},
};

pub const CONFIG_TYPE_NAME: &str = "config";

/// Kinds stored as raw bytes.
pub const RAW_TYPE_NAMES: [&str; 5] = ["script", "shader", "material", "texture", "level"];

/// JSON configuration documents.
#[derive(Debug, Default)]
pub struct ConfigResourceType;

impl ResourceType for ConfigResourceType {
    fn load(&self, handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation> {
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).with_context(|| format!("parse config {handle}"))?;
        Ok(Arc::new(value))
    }
}

/// Keeps compiled bytes as the representation and counts online transitions.
#[derive(Debug, Default)]
pub struct RawResourceType {
    online: AtomicUsize,
}

impl RawResourceType {
    /// Number of resources of this kind currently online.
    pub fn online_count(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }
}

impl ResourceType for RawResourceType {
    fn load(&self, _handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation> {
        Ok(Arc::new(bytes))
    }

    fn online(&self, _handle: ResourceHandle, _repr: &Representation) {
        self.online.fetch_add(1, Ordering::Relaxed);
    }

    fn offline(&self, _handle: ResourceHandle, _repr: &Representation) {
        self.online.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Registers package, unit, config and the raw kinds.
pub fn register_builtin_types(cache: &ResourceCache) -> Result<()> {
    cache.register(PACKAGE_TYPE_NAME, PackageResourceType)?;
    cache.register(UNIT_TYPE_NAME, UnitResourceType)?;
    cache.register(CONFIG_TYPE_NAME, ConfigResourceType)?;
    for name in RAW_TYPE_NAMES {
        cache.register(name, RawResourceType::default())?;
    }
    Ok(())
}
