//! Math types.
//!
//! Kept small and deterministic; only what component records need.

use serde::{Deserialize, Serialize};

use crate::params::ParamValue;

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Reads a `[x, y, z]` sequence of numbers.
    pub fn from_param(value: &ParamValue) -> Option<Self> {
        match value.as_seq()? {
            [x, y, z] => Some(Self::new(
                x.as_float()? as f32,
                y.as_float()? as f32,
                z.as_float()? as f32,
            )),
            _ => None,
        }
    }
}
