//! Umbra engine crate.
//!
//! Deferred shading with screen-space ambient occlusion, a light registry and
//! keyframe morph animation, written against a backend-neutral graphics device.
//! A wgpu backend drives real hardware; the null backend records commands for
//! tests and tooling.

pub mod animation;
pub mod backend;
pub mod bounds;
pub mod camera;
pub mod error;
pub mod gfx;
pub mod logging;
pub mod renderer;

pub use error::{AnimationError, RenderError};
