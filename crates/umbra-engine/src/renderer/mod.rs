//! Deferred renderer.
//!
//! Geometry is rasterized into a seven-channel g-buffer, SSAO resolves an
//! occlusion term from it, and a fullscreen lighting pass shades the result
//! into the back buffer.

mod config;
mod deferred;
mod gbuffer;
mod lights;
mod phase;
mod quad;
mod ssao;
mod target;

pub use config::{MAX_SSAO_KERNEL_SIZE, RendererConfig, SsaoConfig};
pub use deferred::{BUFFER_VIEW_EFFECT, DeferredRenderer, GBufferClear, LIGHTING_EFFECT};
pub use gbuffer::{GBuffer, GBufferSet, GBufferView};
pub use lights::{DirectionalLight, GpuPointLight, LightRegistry, MAX_POINT_LIGHTS, PointLight};
pub use phase::Phase;
pub use quad::{FullscreenQuad, QUAD_INPUT_LAYOUT, QUAD_VERTICES, QuadVertex};
pub use ssao::{SSAO_EFFECT, SsaoStage, hemisphere_kernel};
pub use target::{RenderTexture, TargetView};
