//! Byte sources.
//!
//! The cache never touches storage directly; it asks a [`ByteSource`] for the
//! raw bytes of a handle and hands them to the resource type's loader.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use bytes::Bytes;
use fnv::FnvHashMap;
use tracing::debug;

use crate::{error::SourceError, id::ResourceHandle};

/// Backing store for compiled resource data.
pub trait ByteSource: Send + Sync {
    fn read_bytes(&self, handle: ResourceHandle) -> Result<Bytes, SourceError>;
}

/// In-memory store, useful for tests and for embedding data in a binary.
#[derive(Default)]
pub struct MemorySource {
    data: RwLock<FnvHashMap<ResourceHandle, Bytes>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) the bytes for a handle.
    pub fn insert(&self, handle: ResourceHandle, bytes: impl Into<Bytes>) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, bytes.into());
    }

    pub fn remove(&self, handle: ResourceHandle) -> Option<Bytes> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }
}

impl ByteSource for MemorySource {
    fn read_bytes(&self, handle: ResourceHandle) -> Result<Bytes, SourceError> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or(SourceError::NotFound(handle))
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn read_bytes(&self, handle: ResourceHandle) -> Result<Bytes, SourceError> {
        (**self).read_bytes(handle)
    }
}

/// Reads compiled resources from `<root>/<platform>/<build name>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(build_dir: impl AsRef<Path>, platform: &str) -> Self {
        Self {
            dir: build_dir.as_ref().join(platform),
        }
    }

    /// Directory the build names are resolved against.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, handle: ResourceHandle) -> PathBuf {
        self.dir.join(handle.build_name())
    }
}

impl ByteSource for DirectorySource {
    fn read_bytes(&self, handle: ResourceHandle) -> Result<Bytes, SourceError> {
        let path = self.path_of(handle);
        debug!(path = %path.display(), "reading resource");
        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(handle))
            }
            Err(e) => Err(SourceError::Io {
                path,
                source: Arc::new(e),
            }),
        }
    }
}
