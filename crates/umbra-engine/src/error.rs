//! Error types surfaced by the renderer and the animation system.
//!
//! Recoverable failures (allocation, bad input data, bad indices) are values.
//! Calling a render phase out of order is a programming error and panics
//! instead; see `renderer::phase`.

use thiserror::Error;

use crate::gfx::DeviceError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid render resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("failed to allocate {resource}")]
    Allocation {
        resource: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("g-buffer index {index} out of range (channel count is {count})")]
    GBufferIndexOutOfRange { index: u32, count: u32 },

    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Animation(#[from] AnimationError),
}

impl RenderError {
    /// Wraps a device failure for `resource`, for use with `map_err`.
    pub fn allocation(resource: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| RenderError::Allocation { resource, source }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AnimationError {
    #[error("morph animation needs at least two key frames, got {0}")]
    TooFewKeyFrames(usize),

    #[error("key frame count ({frames}) does not match time span count ({spans})")]
    SpanCountMismatch { frames: usize, spans: usize },

    #[error("time span {index} must be finite and positive, got {value}")]
    InvalidTimeSpan { index: usize, value: f32 },

    #[error("key frame {index} has no vertices")]
    EmptyKeyFrame { index: usize },

    #[error("key frame {index} has {found} vertices, expected {expected}")]
    VertexCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
}
