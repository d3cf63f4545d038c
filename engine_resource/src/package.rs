//! Packages.
//!
//! A package is a resource listing other resources by type. Loading a package
//! schedules one background task that bulk-loads each listed group in order;
//! `flush` is the join point that waits for it.
//!
//! Compiled package data is JSON mapping type names to instance names:
//!
//! ```json
//! { "config": ["global"], "unit": ["level1", "player"] }
//! ```

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;
use bytes::Bytes;
use fnv::FnvHashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    cache::ResourceCache,
    error::Result,
    id::{ResourceHandle, ResourceInstanceId, ResourceTypeId},
    registry::{Representation, ResourceType},
};

pub const PACKAGE_TYPE_NAME: &str = "package";

pub fn package_type() -> ResourceTypeId {
    ResourceTypeId::from_name(PACKAGE_TYPE_NAME)
}

/// Resources of one type listed by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageGroup {
    pub type_id: ResourceTypeId,
    pub names: Vec<ResourceInstanceId>,
}

/// Loaded form of a package resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    pub groups: Vec<PackageGroup>,
}

impl PackageManifest {
    pub fn from_json(data: &[u8]) -> anyhow::Result<Self> {
        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_slice(data).context("parse package json")?;
        Ok(Self {
            groups: raw
                .into_iter()
                .map(|(type_name, names)| PackageGroup {
                    type_id: ResourceTypeId::from_name(&type_name),
                    names: names.iter().map(|n| ResourceInstanceId::from_name(n)).collect(),
                })
                .collect(),
        })
    }

    /// Number of resources listed across all groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct PackageResourceType;

impl ResourceType for PackageResourceType {
    fn load(&self, _handle: ResourceHandle, bytes: Bytes) -> anyhow::Result<Representation> {
        Ok(Arc::new(PackageManifest::from_json(&bytes)?))
    }
}

/// Loads and unloads the contents of packages.
pub struct PackageManager {
    cache: Arc<ResourceCache>,
    pending: Mutex<FnvHashMap<ResourceInstanceId, Vec<JoinHandle<Result<()>>>>>,
}

impl PackageManager {
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self {
            cache,
            pending: Mutex::new(FnvHashMap::default()),
        }
    }

    fn manifest(&self, package: ResourceInstanceId) -> Result<Arc<PackageManifest>> {
        self.cache.get_as::<PackageManifest>(package_type(), package)
    }

    /// Schedules loading of everything `package` lists.
    ///
    /// The package resource itself must already be online. Must be called from
    /// within a tokio runtime.
    pub fn load(&self, package: ResourceInstanceId) -> Result<()> {
        let manifest = self.manifest(package)?;
        let cache = Arc::clone(&self.cache);
        info!(package = %package, resources = manifest.len(), "scheduling package load");

        let task = tokio::task::spawn_blocking(move || -> Result<()> {
            for group in &manifest.groups {
                cache.load_now(group.type_id, &group.names)?;
            }
            Ok(())
        });

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(package)
            .or_default()
            .push(task);
        Ok(())
    }

    /// Waits for every scheduled load of `package` and reports the first failure.
    pub async fn flush(&self, package: ResourceInstanceId) -> anyhow::Result<()> {
        let tasks = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&package)
            .unwrap_or_default();

        let mut first_err = None;
        for task in tasks {
            let outcome = task
                .await
                .with_context(|| format!("package {package} load task"))
                .and_then(|r| r.with_context(|| format!("load package {package}")));
            if let Err(e) = outcome {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                debug!(package = %package, "package flushed");
                Ok(())
            }
        }
    }

    /// True once every listed resource is online.
    pub fn is_loaded(&self, package: ResourceInstanceId) -> bool {
        match self.manifest(package) {
            Ok(manifest) => manifest
                .groups
                .iter()
                .all(|g| self.cache.can_get_all(g.type_id, &g.names)),
            Err(_) => false,
        }
    }

    /// Drops the package's reference on each listed resource and unloads those
    /// nobody else holds.
    pub fn unload(&self, package: ResourceInstanceId) -> Result<()> {
        let manifest = self.manifest(package)?;
        for group in &manifest.groups {
            let unused: Vec<ResourceInstanceId> = group
                .names
                .iter()
                .copied()
                .filter(|&name| self.cache.release(group.type_id, name).unwrap_or(0) == 0)
                .collect();
            self.cache.unload_all(group.type_id, &unused)?;
        }
        info!(package = %package, "package unloaded");
        Ok(())
    }
}
