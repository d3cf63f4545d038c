//! `engine_runtime`
//!
//! Host around the resource core:
//! - Builds the cache over a directory byte source
//! - Registers built-in resource kinds and component systems
//! - Boots the configured package and unit
//! - Exposes cache and package operations as console commands

pub mod runtime;

pub use runtime::{Runtime, RuntimeState};
