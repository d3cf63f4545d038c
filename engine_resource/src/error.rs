//! Error types for the resource cache and unit instantiation.
//!
//! Callbacks supplied by resource kinds and component systems return
//! `anyhow::Result`; the cache wraps those failures into [`ResourceError`]
//! together with the handle or component type they belong to. Errors are
//! `Clone` so a failed load can be reported to every caller that was waiting
//! on it.

use std::{error::Error as StdError, path::PathBuf, sync::Arc};

use thiserror::Error;

use crate::id::{ComponentTypeId, ResourceHandle, ResourceTypeId};

/// Underlying error shared between everyone who observes a failure.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

pub type Result<T, E = ResourceError> = std::result::Result<T, E>;

pub(crate) fn shared(err: anyhow::Error) -> SharedError {
    Arc::from(Box::<dyn StdError + Send + Sync + 'static>::from(err))
}

/// Failure reported by a [`ByteSource`](crate::source::ByteSource).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("no data for {0}")]
    NotFound(ResourceHandle),
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },
}

#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("resource type {0:?} is already registered")]
    DuplicateTypeRegistration(ResourceTypeId),
    #[error("resource type {0:?} is not registered")]
    UnknownResourceType(ResourceTypeId),
    #[error("byte source failed for {handle}")]
    Source {
        handle: ResourceHandle,
        source: SourceError,
    },
    #[error("loader failed for {handle}")]
    LoaderFailure {
        handle: ResourceHandle,
        source: SharedError,
    },
    #[error("resource {0} is not loaded")]
    NotLoaded(ResourceHandle),
    #[error("resource {0} is already loaded")]
    AlreadyLoaded(ResourceHandle),
    #[error("resource {handle} is not a {expected}")]
    TypeMismatch {
        handle: ResourceHandle,
        expected: &'static str,
    },
    #[error("reload failed for {handle}, previous data kept")]
    ReloadFailure {
        handle: ResourceHandle,
        source: SharedError,
    },
    #[error("malformed unit description: {0}")]
    FormatError(String),
    #[error("component type {0:?} is not registered")]
    UnknownComponentType(ComponentTypeId),
    #[error("component spawn failed for {component:?}")]
    ComponentSpawnFailure {
        component: ComponentTypeId,
        source: SharedError,
    },
}

impl ResourceError {
    /// Handle the error refers to, if it is tied to one cache entry.
    pub fn handle(&self) -> Option<ResourceHandle> {
        match self {
            ResourceError::Source { handle, .. }
            | ResourceError::LoaderFailure { handle, .. }
            | ResourceError::TypeMismatch { handle, .. }
            | ResourceError::ReloadFailure { handle, .. } => Some(*handle),
            ResourceError::NotLoaded(handle) | ResourceError::AlreadyLoaded(handle) => {
                Some(*handle)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_failure_keeps_source_chain() {
        let handle = ResourceHandle::from_names("config", "global");
        let err = ResourceError::LoaderFailure {
            handle,
            source: shared(anyhow::anyhow!("unexpected token")),
        };
        assert_eq!(err.handle(), Some(handle));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("unexpected token"));
    }
}
