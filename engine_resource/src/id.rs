//! Hash-based identifiers.
//!
//! Every id is the 64-bit FNV-1a hash of a human-readable name, so the same
//! name maps to the same id on every run and platform. Ids are plain values
//! and carry no registry state.

use std::{fmt, hash::Hasher};

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

/// Hashes a name into a stable 64-bit id.
pub fn hash_name(name: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    hasher.finish()
}

macro_rules! hashed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub fn from_name(name: &str) -> Self {
                Self(hash_name(name))
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self::from_name(name)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:016X})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016X}", self.0)
            }
        }
    };
}

hashed_id!(
    /// Identifies a resource kind ("unit", "config", "package", ...).
    ResourceTypeId
);

hashed_id!(
    /// Identifies one resource instance within its type ("boot", "global", ...).
    ResourceInstanceId
);

hashed_id!(
    /// Identifies a component type referenced by unit descriptions.
    ComponentTypeId
);

/// Key of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub type_id: ResourceTypeId,
    pub name: ResourceInstanceId,
}

impl ResourceHandle {
    pub const fn new(type_id: ResourceTypeId, name: ResourceInstanceId) -> Self {
        Self { type_id, name }
    }

    /// Builds a handle from the human-readable type and instance names.
    pub fn from_names(type_name: &str, name: &str) -> Self {
        Self::new(
            ResourceTypeId::from_name(type_name),
            ResourceInstanceId::from_name(name),
        )
    }

    /// File name of the compiled resource: type and name as 32 hex digits.
    pub fn build_name(&self) -> String {
        format!("{:016X}{:016X}", self.type_id.0, self.name.0)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_name())
    }
}
