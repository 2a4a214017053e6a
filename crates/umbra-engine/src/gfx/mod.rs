//! Backend-neutral graphics interfaces.
//!
//! The renderer never names a concrete GPU API. It talks to a
//! [`GraphicsDevice`] for resources, bindings and draws, and to an [`Effect`]
//! for named techniques and typed shader variables.

mod device;
mod effect;
mod types;

pub use device::{DeviceError, GraphicsDevice, ViewInfo, ViewSource};
pub use effect::{
    BlendMode, BoundValue, DepthMode, Effect, EffectDesc, EffectState, InputElement, PassDesc,
    PassRef, TechniqueDesc, TechniqueRef, TextureSample, UniformLayout, Variable, VariableDesc,
    VariableKind, FIRST_RESOURCE_BINDING, SAMPLER_BINDING, UNIFORM_BINDING,
};
pub use types::{BindFlags, Format, TextureDesc, Topology, VertexFormat};
