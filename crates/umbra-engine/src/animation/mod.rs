//! Keyframe morph animation.

mod keyframes;
mod morph;

pub use keyframes::KeyframeCursor;
pub use morph::{AnimationVertex, MORPH_EFFECT, MORPH_INPUT_LAYOUT, MorphAnimation, MorphMaterial};
