//! Graphics device implementations.

pub mod null;
pub mod wgpu;
