use std::collections::HashMap;

use crate::gfx::{
    Effect, EffectDesc, EffectState, PassRef, SAMPLER_BINDING, Topology, UNIFORM_BINDING,
    Variable, VariableKind,
};

use super::convert;
use super::device::WgpuShaderView;

/// Everything a render pipeline depends on besides the effect itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub pass: PassRef,
    pub colors: Vec<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
    pub topology: Topology,
}

/// wgpu effect: one shader module, one bind group layout and a pipeline per
/// pass and target configuration, built on first use.
pub struct WgpuEffect {
    state: EffectState<WgpuShaderView>,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl WgpuEffect {
    pub(super) fn new(device: &wgpu::Device, desc: &EffectDesc) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BINDING,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: SAMPLER_BINDING,
                visibility,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for (binding, index) in desc.resource_bindings() {
            let ty = match desc.variables[index].kind {
                VariableKind::Texture(sample) => wgpu::BindingType::Texture {
                    sample_type: convert::sample_type(sample),
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                _ => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty,
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        log::debug!("effect `{}` compiled", desc.label);

        Self {
            state: EffectState::new(desc),
            module,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
        }
    }

    pub(super) fn state(&self) -> &EffectState<WgpuShaderView> {
        &self.state
    }

    pub(super) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Returns the pipeline for `key`, building it the first time.
    pub(super) fn pipeline(&mut self, device: &wgpu::Device, key: PipelineKey) -> &wgpu::RenderPipeline {
        let desc = self.state.desc();
        let module = &self.module;
        let layout = &self.pipeline_layout;
        self.pipelines
            .entry(key)
            .or_insert_with_key(|key| build_pipeline(device, desc, module, layout, key))
    }

    /// Number of pipelines built so far.
    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }
}

impl Effect for WgpuEffect {
    type ShaderResourceView = WgpuShaderView;

    fn desc(&self) -> &EffectDesc {
        self.state.desc()
    }

    #[track_caller]
    fn set(&mut self, name: &str, value: Variable<'_, WgpuShaderView>) {
        self.state.set(name, value);
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    desc: &EffectDesc,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let pass = &desc.techniques[key.pass.technique].passes[key.pass.pass];
    log::debug!(
        "building pipeline {}::{} for {} color target(s)",
        desc.label,
        pass.name,
        key.colors.len()
    );

    // Shader locations follow declaration order across all slots.
    let mut attributes: Vec<Vec<wgpu::VertexAttribute>> = vec![Vec::new(); desc.slot_count() as usize];
    let mut offsets = vec![0u64; attributes.len()];
    for (location, element) in desc.input_layout.iter().enumerate() {
        let slot = element.slot as usize;
        attributes[slot].push(wgpu::VertexAttribute {
            format: convert::vertex_format(element.format),
            offset: offsets[slot],
            shader_location: location as u32,
        });
        offsets[slot] += u64::from(element.format.size());
    }
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
        .iter()
        .zip(&offsets)
        .map(|(attributes, stride)| wgpu::VertexBufferLayout {
            array_stride: *stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        })
        .collect();

    let blend = convert::blend_state(pass.blend);
    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .colors
        .iter()
        .map(|&format| {
            Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    let depth_stencil = key.depth.map(|format| {
        let (depth_write_enabled, depth_compare) = convert::depth_state(pass.depth);
        wgpu::DepthStencilState {
            format,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(pass.name),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(pass.vertex_entry),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(pass.fragment_entry),
            compilation_options: Default::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: convert::topology(key.topology),
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
