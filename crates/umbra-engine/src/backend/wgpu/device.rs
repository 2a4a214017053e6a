use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use wgpu::util::DeviceExt;

use crate::gfx::{
    BindFlags, BoundValue, DeviceError, Effect, EffectDesc, Format, GraphicsDevice, PassRef,
    SAMPLER_BINDING, TextureDesc, TextureSample, Topology, UNIFORM_BINDING, VariableKind, ViewInfo,
    ViewSource,
};

use super::convert;
use super::effect::{PipelineKey, WgpuEffect};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

fn next_view_id() -> u64 {
    NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed)
}

const MAIN_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

// ── handles ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct WgpuTexture {
    texture: wgpu::Texture,
    desc: TextureDesc,
}

impl WgpuTexture {
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

/// Render-target or depth-stencil view.
#[derive(Debug, Clone)]
pub struct WgpuTargetView {
    id: u64,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

impl WgpuTargetView {
    fn new(view: wgpu::TextureView, format: wgpu::TextureFormat) -> Self {
        Self {
            id: next_view_id(),
            view,
            format,
        }
    }

    pub fn raw(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

impl PartialEq for WgpuTargetView {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone)]
pub struct WgpuShaderView {
    id: u64,
    view: wgpu::TextureView,
    format: Format,
    size: (u32, u32),
}

impl WgpuShaderView {
    pub fn raw(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl PartialEq for WgpuShaderView {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl ViewInfo for WgpuShaderView {
    fn format(&self) -> Format {
        self.format
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl ViewSource<WgpuShaderView> for WgpuShaderView {
    fn view(&self) -> &WgpuShaderView {
        self
    }
}

#[derive(Debug)]
pub struct WgpuVertexBuffer {
    buffer: wgpu::Buffer,
}

// ── device ────────────────────────────────────────────────────────────────

/// Views bound when an effect texture variable is unset.
struct Fallbacks {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
}

/// `GraphicsDevice` on wgpu.
///
/// Commands go into one encoder per frame: call [`begin_frame`] with the
/// swap chain view, render, then [`end_frame`] to submit. Every draw and
/// clear opens its own render pass over the bound targets.
///
/// [`begin_frame`]: WgpuDevice::begin_frame
/// [`end_frame`]: WgpuDevice::end_frame
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    size: (u32, u32),
    main_depth: WgpuTargetView,
    back_buffer: Option<WgpuTargetView>,
    encoder: Option<wgpu::CommandEncoder>,
    bound_colors: Vec<WgpuTargetView>,
    bound_depth: Option<WgpuTargetView>,
    sampler: wgpu::Sampler,
    fallbacks: Fallbacks,
}

impl WgpuDevice {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let main_depth = create_main_depth(&device, size);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("umbra linear sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let fallbacks = create_fallbacks(&device, &queue);

        Self {
            device,
            queue,
            surface_format,
            size,
            main_depth,
            back_buffer: None,
            encoder: None,
            bound_colors: Vec::new(),
            bound_depth: None,
            sampler,
            fallbacks,
        }
    }

    pub fn raw_device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn raw_queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Recreates the main depth buffer. Bindings are dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        self.main_depth = create_main_depth(&self.device, self.size);
        self.bound_colors.clear();
        self.bound_depth = None;
    }

    /// Starts a frame that renders into `view` and binds it with the main depth buffer.
    pub fn begin_frame(&mut self, view: &wgpu::TextureView) {
        if self.encoder.is_some() {
            log::warn!("begin_frame called twice; previous commands are submitted first");
            self.end_frame();
        }
        self.back_buffer = Some(WgpuTargetView::new(view.clone(), self.surface_format));
        self.reset_render_target();
    }

    /// Submits everything recorded since `begin_frame`.
    pub fn end_frame(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.back_buffer = None;
        self.bound_colors.clear();
        self.bound_depth = None;
    }

    fn check_size(&self, desc: &TextureDesc) -> Result<(), DeviceError> {
        desc.validate()?;
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(DeviceError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        Ok(())
    }

    fn raw_texture(&self, desc: &TextureDesc) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage: convert::texture_usage(desc.bind),
            view_formats: &[],
        })
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("umbra frame encoder"),
            })
        })
    }

    fn bind_group(&self, effect: &WgpuEffect) -> wgpu::BindGroup {
        let state = effect.state();
        let desc = state.desc();

        let uniforms = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: &state.uniform_bytes(),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        // Storage buffers are created first so the entries can borrow them.
        // TODO: pool per-draw uniform and storage buffers across frames.
        let storage: Vec<(u32, wgpu::Buffer)> = desc
            .resource_bindings()
            .filter_map(|(binding, index)| {
                let VariableKind::Buffer { element_size, .. } = desc.variables[index].kind else {
                    return None;
                };
                let mut contents = match state.value_at(index) {
                    BoundValue::Raw { bytes, .. } => bytes.clone(),
                    _ => Vec::new(),
                };
                if contents.len() < element_size as usize {
                    contents.resize(element_size as usize, 0);
                }
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(desc.variables[index].name),
                        contents: &contents,
                        usage: wgpu::BufferUsages::STORAGE,
                    });
                Some((binding, buffer))
            })
            .collect();

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (binding, index) in desc.resource_bindings() {
            let resource = match desc.variables[index].kind {
                VariableKind::Texture(sample) => {
                    let view = match state.value_at(index).as_texture() {
                        Some(view) => &view.view,
                        None if sample == TextureSample::Depth => &self.fallbacks.depth,
                        None => &self.fallbacks.color,
                    };
                    wgpu::BindingResource::TextureView(view)
                }
                _ => match storage.iter().find(|(b, _)| *b == binding) {
                    Some((_, buffer)) => buffer.as_entire_binding(),
                    None => continue,
                },
            };
            entries.push(wgpu::BindGroupEntry { binding, resource });
        }

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(desc.label),
            layout: effect.bind_group_layout(),
            entries: &entries,
        })
    }
}

impl GraphicsDevice for WgpuDevice {
    type Texture = WgpuTexture;
    type RenderTargetView = WgpuTargetView;
    type DepthStencilView = WgpuTargetView;
    type ShaderResourceView = WgpuShaderView;
    type VertexBuffer = WgpuVertexBuffer;
    type Effect = WgpuEffect;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<WgpuTexture, DeviceError> {
        self.check_size(desc)?;
        Ok(WgpuTexture {
            texture: self.raw_texture(desc),
            desc: *desc,
        })
    }

    fn create_texture_with_data(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<WgpuTexture, DeviceError> {
        self.check_size(desc)?;
        if desc.format.is_depth() {
            return Err(DeviceError::UnsupportedBinding {
                format: desc.format,
                bind: desc.bind,
            });
        }
        if data.len() != desc.byte_len() {
            return Err(DeviceError::DataSizeMismatch {
                label: desc.label,
                expected: desc.byte_len(),
                found: data.len(),
            });
        }

        let texture = self.raw_texture(desc);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(WgpuTexture {
            texture,
            desc: *desc,
        })
    }

    fn create_render_target_view(
        &mut self,
        texture: &WgpuTexture,
    ) -> Result<WgpuTargetView, DeviceError> {
        require(texture, BindFlags::RENDER_TARGET)?;
        Ok(WgpuTargetView::new(
            texture.texture.create_view(&wgpu::TextureViewDescriptor::default()),
            convert::texture_format(texture.desc.format),
        ))
    }

    fn create_depth_stencil_view(
        &mut self,
        texture: &WgpuTexture,
    ) -> Result<WgpuTargetView, DeviceError> {
        require(texture, BindFlags::DEPTH_STENCIL)?;
        Ok(WgpuTargetView::new(
            texture.texture.create_view(&wgpu::TextureViewDescriptor::default()),
            convert::texture_format(texture.desc.format),
        ))
    }

    fn create_shader_resource_view(
        &mut self,
        texture: &WgpuTexture,
    ) -> Result<WgpuShaderView, DeviceError> {
        require(texture, BindFlags::SHADER_RESOURCE)?;
        Ok(WgpuShaderView {
            id: next_view_id(),
            view: texture.texture.create_view(&wgpu::TextureViewDescriptor::default()),
            format: texture.desc.format,
            size: (texture.desc.width, texture.desc.height),
        })
    }

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        data: &[u8],
        _stride: u32,
    ) -> Result<WgpuVertexBuffer, DeviceError> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::VERTEX,
            });
        Ok(WgpuVertexBuffer { buffer })
    }

    fn create_effect(&mut self, desc: &EffectDesc) -> Result<WgpuEffect, DeviceError> {
        desc.validate()?;
        Ok(WgpuEffect::new(&self.device, desc))
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.size
    }

    fn back_buffer_view(&self) -> Option<WgpuTargetView> {
        self.back_buffer.clone()
    }

    fn depth_stencil_view(&self) -> Option<WgpuTargetView> {
        Some(self.main_depth.clone())
    }

    fn set_render_targets(&mut self, colors: &[&WgpuTargetView], depth: Option<&WgpuTargetView>) {
        self.bound_colors = colors.iter().map(|&v| v.clone()).collect();
        self.bound_depth = depth.cloned();
    }

    fn unbind_render_targets(&mut self) {
        self.bound_colors.clear();
        self.bound_depth = None;
    }

    fn reset_render_target(&mut self) {
        self.bound_colors = self.back_buffer.iter().cloned().collect();
        self.bound_depth = Some(self.main_depth.clone());
    }

    fn clear_render_target(&mut self, view: &WgpuTargetView, color: [f32; 4]) {
        let [r, g, b, a] = color.map(f64::from);
        let encoder = self.encoder();
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("umbra clear color"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }

    fn clear_depth_stencil(&mut self, view: &WgpuTargetView, depth: f32) {
        let encoder = self.encoder();
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("umbra clear depth"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &view.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }

    fn draw(
        &mut self,
        effect: &mut WgpuEffect,
        pass: PassRef,
        vertex_buffers: &[&WgpuVertexBuffer],
        topology: Topology,
        vertices: Range<u32>,
    ) {
        let label = effect.desc().label;
        let slots = effect.desc().slot_count() as usize;
        assert!(
            vertex_buffers.len() == slots,
            "effect `{label}` expects {slots} vertex buffers, got {}",
            vertex_buffers.len()
        );
        if self.bound_colors.is_empty() && self.bound_depth.is_none() {
            log::warn!("draw with `{label}` skipped: no render targets bound");
            return;
        }

        let bind_group = self.bind_group(effect);
        let key = PipelineKey {
            pass,
            colors: self.bound_colors.iter().map(|v| v.format).collect(),
            depth: self.bound_depth.as_ref().map(|v| v.format),
            topology,
        };
        let pipeline = effect.pipeline(&self.device, key);

        let color_attachments: Vec<_> = self
            .bound_colors
            .iter()
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            self.bound_depth
                .as_ref()
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("umbra frame encoder"),
            })
        });
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        for (slot, vb) in vertex_buffers.iter().enumerate() {
            rpass.set_vertex_buffer(slot as u32, vb.buffer.slice(..));
        }
        rpass.draw(vertices, 0..1);
    }
}

fn require(texture: &WgpuTexture, flag: BindFlags) -> Result<(), DeviceError> {
    if texture.desc.bind.contains(flag) {
        Ok(())
    } else {
        Err(DeviceError::MissingBindFlag {
            label: texture.desc.label,
            required: flag,
        })
    }
}

fn create_main_depth(device: &wgpu::Device, (width, height): (u32, u32)) -> WgpuTargetView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("umbra main depth"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: MAIN_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    WgpuTargetView::new(
        texture.create_view(&wgpu::TextureViewDescriptor::default()),
        MAIN_DEPTH_FORMAT,
    )
}

fn create_fallbacks(device: &wgpu::Device, queue: &wgpu::Queue) -> Fallbacks {
    let extent = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: 1,
    };

    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("umbra fallback color"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &color,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255; 4],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        extent,
    );

    // Depth textures cannot be written from the host; clear through a pass.
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("umbra fallback depth"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("umbra fallback init"),
    });
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("umbra fallback depth clear"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    queue.submit(std::iter::once(encoder.finish()));

    Fallbacks {
        color: color.create_view(&wgpu::TextureViewDescriptor::default()),
        depth: depth_view,
    }
}
