//! `engine_resource`
//!
//! Resource management core of the runtime.
//!
//! Design goals:
//! - Resource kinds plug in through one trait ([`registry::ResourceType`]).
//! - A handle is loaded at most once at a time, no matter how many callers ask.
//! - Online/offline separates raw data from derived runtime state so reloads
//!   never invalidate what readers already hold.
//! - The cache is an explicit context object; there are no globals.
//! - No `unsafe`.

pub mod builtin;
pub mod cache;
pub mod components;
pub mod config;
pub mod console;
pub mod ecs;
pub mod error;
pub mod id;
pub mod math;
pub mod package;
pub mod params;
pub mod registry;
pub mod source;
pub mod unit;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::builtin::register_builtin_types;
    pub use crate::cache::{ResourceCache, ResourceState};
    pub use crate::ecs::*;
    pub use crate::error::ResourceError;
    pub use crate::id::*;
    pub use crate::package::{package_type, PackageManager};
    pub use crate::params::{ParamRecord, ParamValue};
    pub use crate::registry::{Representation, ResourceType};
    pub use crate::source::{ByteSource, DirectorySource, MemorySource};
    pub use crate::unit::{unit_type, UnitDescription, UnitSpawner};
}
