use glam::Vec3;

use crate::error::RenderError;

/// Largest SSAO sample kernel the occlusion shader accepts.
pub const MAX_SSAO_KERNEL_SIZE: u32 = 64;

/// Screen-space ambient occlusion parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaoConfig {
    /// Hemisphere samples per pixel.
    pub kernel_size: u32,
    /// Sampling radius in world units.
    pub radius: f32,
    /// Depth bias that suppresses self-occlusion acne.
    pub bias: f32,
    /// Exponent applied to the raw occlusion term.
    pub intensity: f32,
    /// Box blur half-width in pixels.
    pub blur_radius: u32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            kernel_size: 16,
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
            blur_radius: 2,
        }
    }
}

/// Renderer construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    /// Initial state of the SSAO toggle.
    pub ssao_enabled: bool,
    pub ssao: SsaoConfig,
    pub ambient_light: Vec3,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            ssao_enabled: true,
            ssao: SsaoConfig::default(),
            ambient_light: Vec3::splat(0.1),
        }
    }
}

impl RendererConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidResolution {
                width: self.width,
                height: self.height,
            });
        }

        let ssao = &self.ssao;
        if ssao.kernel_size == 0 || ssao.kernel_size > MAX_SSAO_KERNEL_SIZE {
            return Err(RenderError::InvalidConfig(format!(
                "ssao kernel size must be in 1..={MAX_SSAO_KERNEL_SIZE}, got {}",
                ssao.kernel_size
            )));
        }
        if !(ssao.radius.is_finite() && ssao.radius > 0.0) {
            return Err(RenderError::InvalidConfig(format!(
                "ssao radius must be positive, got {}",
                ssao.radius
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_height_is_invalid_resolution() {
        let config = RendererConfig::default().with_size(800, 0);
        assert!(matches!(
            config.validate(),
            Err(RenderError::InvalidResolution {
                width: 800,
                height: 0
            })
        ));
    }

    #[test]
    fn oversized_kernel_is_rejected() {
        let mut config = RendererConfig::default();
        config.ssao.kernel_size = MAX_SSAO_KERNEL_SIZE + 1;
        assert!(matches!(config.validate(), Err(RenderError::InvalidConfig(_))));
    }
}
