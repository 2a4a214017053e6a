//! wgpu backend.
//!
//! [`Gpu`] owns the window surface and the wgpu device; [`WgpuDevice`]
//! implements [`GraphicsDevice`](crate::gfx::GraphicsDevice) on a clone of
//! that device and queue.
//!
//! Frame flow:
//! 1. `Gpu::acquire` the swap chain image
//! 2. `WgpuDevice::begin_frame(&frame.view)`, render
//! 3. `WgpuDevice::end_frame` to submit, then `Gpu::present`

mod convert;
mod device;
mod effect;
mod gpu;

pub use device::{WgpuDevice, WgpuShaderView, WgpuTargetView, WgpuTexture, WgpuVertexBuffer};
pub use effect::WgpuEffect;
pub use gpu::{Gpu, GpuInit, SurfaceErrorAction, SurfaceFrame};
