//! Effects: named techniques, passes and typed shader variables.
//!
//! An effect is described by a static [`EffectDesc`] (WGSL source plus tables)
//! and instantiated by a backend. Backends share [`EffectState`] for variable
//! validation and uniform packing, so binding rules are identical everywhere.
//!
//! Binding convention for effect shaders (bind group 0):
//! - binding 0: uniform block holding every scalar, vector and matrix variable
//!   in declaration order (WGSL uniform layout, bools as `u32`)
//! - binding 1: linear clamp sampler
//! - binding 2..: textures and raw buffers in declaration order

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::{DeviceError, VertexFormat};

// ── static description ────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendMode {
    Replace,
    Additive,
    Alpha,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DepthMode {
    /// Depth attachment (if any) is ignored.
    Disabled,
    /// Depth test against the bound depth buffer, no writes.
    Test,
    TestWrite,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PassDesc {
    pub name: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub blend: BlendMode,
    pub depth: DepthMode,
}

impl PassDesc {
    pub const fn new(
        name: &'static str,
        vertex_entry: &'static str,
        fragment_entry: &'static str,
    ) -> Self {
        Self {
            name,
            vertex_entry,
            fragment_entry,
            blend: BlendMode::Replace,
            depth: DepthMode::Disabled,
        }
    }

    pub const fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub const fn with_depth(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TechniqueDesc {
    pub name: &'static str,
    pub passes: &'static [PassDesc],
}

/// How a texture variable is read by the shader.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureSample {
    /// `texture_2d<f32>` sampled with the effect sampler.
    Float,
    /// `texture_2d<f32>` read with `textureLoad` only.
    UnfilterableFloat,
    /// `texture_depth_2d`.
    Depth,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VariableKind {
    Int,
    Bool,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Texture(TextureSample),
    /// Read-only storage array of `max_elements` items of `element_size` bytes.
    Buffer { element_size: u32, max_elements: u32 },
}

impl VariableKind {
    /// `(align, size)` inside the uniform block, `None` for bound resources.
    pub fn uniform_layout(self) -> Option<(u32, u32)> {
        match self {
            VariableKind::Int | VariableKind::Bool | VariableKind::Float => Some((4, 4)),
            VariableKind::Vec2 => Some((8, 8)),
            VariableKind::Vec3 => Some((16, 12)),
            VariableKind::Vec4 => Some((16, 16)),
            VariableKind::Mat4 => Some((16, 64)),
            VariableKind::Texture(_) | VariableKind::Buffer { .. } => None,
        }
    }

    pub fn is_resource(self) -> bool {
        self.uniform_layout().is_none()
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VariableDesc {
    pub name: &'static str,
    pub kind: VariableKind,
}

impl VariableDesc {
    pub const fn new(name: &'static str, kind: VariableKind) -> Self {
        Self { name, kind }
    }
}

/// One vertex attribute; shader locations follow declaration order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InputElement {
    pub semantic: &'static str,
    pub format: VertexFormat,
    pub slot: u32,
}

impl InputElement {
    pub const fn new(semantic: &'static str, format: VertexFormat, slot: u32) -> Self {
        Self {
            semantic,
            format,
            slot,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EffectDesc {
    pub label: &'static str,
    /// WGSL source.
    pub source: &'static str,
    pub input_layout: &'static [InputElement],
    pub techniques: &'static [TechniqueDesc],
    pub variables: &'static [VariableDesc],
}

impl EffectDesc {
    /// Structural checks shared by all backends.
    pub fn validate(&self) -> Result<(), DeviceError> {
        let fail = |reason: String| DeviceError::Effect {
            effect: self.label,
            reason,
        };

        if self.techniques.is_empty() {
            return Err(fail("no techniques defined".to_string()));
        }
        if let Some(t) = self.techniques.iter().find(|t| t.passes.is_empty()) {
            return Err(fail(format!("technique `{}` has no passes", t.name)));
        }
        for (i, v) in self.variables.iter().enumerate() {
            if self.variables[..i].iter().any(|other| other.name == v.name) {
                return Err(fail(format!("variable `{}` declared twice", v.name)));
            }
        }
        for slot in 0..self.slot_count() {
            if !self.input_layout.iter().any(|e| e.slot == slot) {
                return Err(fail(format!("vertex input slot {slot} has no elements")));
            }
        }

        Ok(())
    }

    /// Number of vertex buffer slots consumed by the input layout.
    pub fn slot_count(&self) -> u32 {
        self.input_layout
            .iter()
            .map(|e| e.slot + 1)
            .max()
            .unwrap_or(0)
    }

    /// Byte stride of one vertex in `slot`.
    pub fn slot_stride(&self, slot: u32) -> u32 {
        self.input_layout
            .iter()
            .filter(|e| e.slot == slot)
            .map(|e| e.format.size())
            .sum()
    }

    /// `(binding, variable index)` for every texture and buffer variable.
    pub fn resource_bindings(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind.is_resource())
            .enumerate()
            .map(|(slot, (index, _))| (FIRST_RESOURCE_BINDING + slot as u32, index))
    }
}

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;
pub const FIRST_RESOURCE_BINDING: u32 = 2;

// ── handles ───────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TechniqueRef {
    index: usize,
}

impl TechniqueRef {
    pub fn index(self) -> usize {
        self.index
    }

    pub fn pass(self, pass: usize) -> PassRef {
        PassRef {
            technique: self.index,
            pass,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PassRef {
    pub technique: usize,
    pub pass: usize,
}

// ── values ────────────────────────────────────────────────────────────────

/// A value handed to `Effect::set_variable`.
#[derive(Debug, Clone, Copy)]
pub enum Variable<'a, V> {
    Int(i32),
    Bool(bool),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// `None` unbinds the texture; the backend substitutes a neutral fallback.
    Texture(Option<&'a V>),
    Raw {
        element_size: u32,
        count: u32,
        bytes: &'a [u8],
    },
}

impl<'a, V> Variable<'a, V> {
    /// Raw array payload for a `VariableKind::Buffer` variable.
    pub fn raw<T: Pod>(items: &'a [T]) -> Self {
        Variable::Raw {
            element_size: std::mem::size_of::<T>() as u32,
            count: items.len() as u32,
            bytes: bytemuck::cast_slice(items),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Variable::Int(_) => "int",
            Variable::Bool(_) => "bool",
            Variable::Float(_) => "float",
            Variable::Vec2(_) => "vec2",
            Variable::Vec3(_) => "vec3",
            Variable::Vec4(_) => "vec4",
            Variable::Mat4(_) => "mat4",
            Variable::Texture(_) => "texture",
            Variable::Raw { .. } => "raw buffer",
        }
    }
}

impl<V> From<i32> for Variable<'_, V> {
    fn from(v: i32) -> Self {
        Variable::Int(v)
    }
}

impl<V> From<bool> for Variable<'_, V> {
    fn from(v: bool) -> Self {
        Variable::Bool(v)
    }
}

impl<V> From<f32> for Variable<'_, V> {
    fn from(v: f32) -> Self {
        Variable::Float(v)
    }
}

impl<V> From<Vec2> for Variable<'_, V> {
    fn from(v: Vec2) -> Self {
        Variable::Vec2(v)
    }
}

impl<V> From<Vec3> for Variable<'_, V> {
    fn from(v: Vec3) -> Self {
        Variable::Vec3(v)
    }
}

impl<V> From<Vec4> for Variable<'_, V> {
    fn from(v: Vec4) -> Self {
        Variable::Vec4(v)
    }
}

impl<V> From<Mat4> for Variable<'_, V> {
    fn from(v: Mat4) -> Self {
        Variable::Mat4(v)
    }
}

impl<'a, V> From<&'a V> for Variable<'a, V> {
    fn from(v: &'a V) -> Self {
        Variable::Texture(Some(v))
    }
}

impl<'a, V> From<Option<&'a V>> for Variable<'a, V> {
    fn from(v: Option<&'a V>) -> Self {
        Variable::Texture(v)
    }
}

/// Host-side copy of a variable's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue<V> {
    Unset,
    Int(i32),
    Bool(bool),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Texture(Option<V>),
    Raw { count: u32, bytes: Vec<u8> },
}

impl<V> BoundValue<V> {
    pub fn as_texture(&self) -> Option<&V> {
        match self {
            BoundValue::Texture(Some(v)) => Some(v),
            _ => None,
        }
    }

    /// Copies the value, converting a bound texture with `f`.
    pub fn map_texture<U>(&self, f: impl FnOnce(&V) -> U) -> BoundValue<U> {
        match self {
            BoundValue::Unset => BoundValue::Unset,
            BoundValue::Int(v) => BoundValue::Int(*v),
            BoundValue::Bool(v) => BoundValue::Bool(*v),
            BoundValue::Float(v) => BoundValue::Float(*v),
            BoundValue::Vec2(v) => BoundValue::Vec2(*v),
            BoundValue::Vec3(v) => BoundValue::Vec3(*v),
            BoundValue::Vec4(v) => BoundValue::Vec4(*v),
            BoundValue::Mat4(v) => BoundValue::Mat4(*v),
            BoundValue::Texture(v) => BoundValue::Texture(v.as_ref().map(f)),
            BoundValue::Raw { count, bytes } => BoundValue::Raw {
                count: *count,
                bytes: bytes.clone(),
            },
        }
    }
}

// ── uniform packing ───────────────────────────────────────────────────────

/// Byte offsets of uniform variables inside the binding-0 block.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    offsets: Vec<Option<u32>>,
    size: u32,
}

impl UniformLayout {
    pub fn new(variables: &[VariableDesc]) -> Self {
        let mut cursor = 0u32;
        let offsets = variables
            .iter()
            .map(|v| {
                let (align, size) = v.kind.uniform_layout()?;
                let offset = cursor.next_multiple_of(align);
                cursor = offset + size;
                Some(offset)
            })
            .collect();

        Self {
            offsets,
            size: cursor.next_multiple_of(16).max(16),
        }
    }

    pub fn offset(&self, variable: usize) -> Option<u32> {
        self.offsets.get(variable).copied().flatten()
    }

    /// Block size, rounded to 16 bytes.
    pub fn size(&self) -> u32 {
        self.size
    }
}

// ── shared state ──────────────────────────────────────────────────────────

/// Validated variable storage shared by effect backends.
#[derive(Debug, Clone)]
pub struct EffectState<V> {
    desc: EffectDesc,
    layout: UniformLayout,
    values: Vec<BoundValue<V>>,
}

impl<V: Clone> EffectState<V> {
    pub fn new(desc: &EffectDesc) -> Self {
        Self {
            desc: *desc,
            layout: UniformLayout::new(desc.variables),
            values: vec![BoundValue::Unset; desc.variables.len()],
        }
    }

    pub fn desc(&self) -> &EffectDesc {
        &self.desc
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Stores `value` for `name`.
    ///
    /// Panics on unknown names, kind mismatches and oversized raw payloads.
    #[track_caller]
    pub fn set(&mut self, name: &str, value: Variable<'_, V>) {
        let label = self.desc.label;
        let Some(index) = self.desc.variables.iter().position(|v| v.name == name) else {
            panic!("effect `{label}` has no variable named `{name}`");
        };
        let kind = self.desc.variables[index].kind;

        let bound = match (kind, value) {
            (VariableKind::Int, Variable::Int(v)) => BoundValue::Int(v),
            (VariableKind::Bool, Variable::Bool(v)) => BoundValue::Bool(v),
            (VariableKind::Float, Variable::Float(v)) => BoundValue::Float(v),
            (VariableKind::Vec2, Variable::Vec2(v)) => BoundValue::Vec2(v),
            (VariableKind::Vec3, Variable::Vec3(v)) => BoundValue::Vec3(v),
            (VariableKind::Vec4, Variable::Vec4(v)) => BoundValue::Vec4(v),
            (VariableKind::Mat4, Variable::Mat4(v)) => BoundValue::Mat4(v),
            (VariableKind::Texture(_), Variable::Texture(v)) => BoundValue::Texture(v.cloned()),
            (
                VariableKind::Buffer {
                    element_size,
                    max_elements,
                },
                Variable::Raw {
                    element_size: given,
                    count,
                    bytes,
                },
            ) => {
                assert!(
                    given == element_size,
                    "effect `{label}` variable `{name}` expects {element_size}-byte elements, got {given}"
                );
                assert!(
                    count <= max_elements,
                    "effect `{label}` variable `{name}` holds at most {max_elements} elements, got {count}"
                );
                assert!(
                    bytes.len() == (element_size * count) as usize,
                    "effect `{label}` variable `{name}` payload is {} bytes for {count} elements",
                    bytes.len()
                );
                BoundValue::Raw {
                    count,
                    bytes: bytes.to_vec(),
                }
            }
            (kind, value) => panic!(
                "effect `{label}` variable `{name}` is {kind:?}, got a {} value",
                value.kind_name()
            ),
        };

        self.values[index] = bound;
    }

    pub fn value(&self, name: &str) -> Option<&BoundValue<V>> {
        let index = self.desc.variables.iter().position(|v| v.name == name)?;
        self.values.get(index)
    }

    pub fn value_at(&self, index: usize) -> &BoundValue<V> {
        &self.values[index]
    }

    pub fn values(&self) -> impl Iterator<Item = (&VariableDesc, &BoundValue<V>)> + '_ {
        self.desc.variables.iter().zip(self.values.iter())
    }

    /// Packs every uniform variable into a binding-0 block.
    ///
    /// Unset variables are zero.
    pub fn uniform_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.layout.size() as usize];
        for (index, value) in self.values.iter().enumerate() {
            let Some(offset) = self.layout.offset(index) else { continue };
            let offset = offset as usize;
            let mut put = |bytes: &[u8]| out[offset..offset + bytes.len()].copy_from_slice(bytes);
            match value {
                BoundValue::Int(v) => put(bytemuck::bytes_of(v)),
                BoundValue::Bool(v) => put(bytemuck::bytes_of(&u32::from(*v))),
                BoundValue::Float(v) => put(bytemuck::bytes_of(v)),
                BoundValue::Vec2(v) => put(bytemuck::bytes_of(v)),
                BoundValue::Vec3(v) => put(bytemuck::bytes_of(v)),
                BoundValue::Vec4(v) => put(bytemuck::bytes_of(v)),
                BoundValue::Mat4(v) => put(bytemuck::bytes_of(&v.to_cols_array())),
                BoundValue::Unset | BoundValue::Texture(_) | BoundValue::Raw { .. } => {}
            }
        }
        out
    }
}

// ── effect trait ──────────────────────────────────────────────────────────

/// Effect collaborator: technique/pass lookup and typed variable upload.
pub trait Effect {
    type ShaderResourceView: Clone;

    fn desc(&self) -> &EffectDesc;

    fn set(&mut self, name: &str, value: Variable<'_, Self::ShaderResourceView>);

    #[track_caller]
    fn set_variable<'a>(
        &mut self,
        name: &str,
        value: impl Into<Variable<'a, Self::ShaderResourceView>>,
    ) where
        Self::ShaderResourceView: 'a,
    {
        self.set(name, value.into());
    }

    /// Unbinds every texture variable so the effect holds no views.
    fn unbind_textures(&mut self) {
        let variables = self.desc().variables;
        for var in variables {
            if let VariableKind::Texture(_) = var.kind {
                self.set(var.name, Variable::Texture(None));
            }
        }
    }

    fn technique_count(&self) -> usize {
        self.desc().techniques.len()
    }

    #[track_caller]
    fn technique_by_index(&self, index: usize) -> TechniqueRef {
        let desc = self.desc();
        assert!(
            index < desc.techniques.len(),
            "effect `{}` has no technique #{index} ({} defined)",
            desc.label,
            desc.techniques.len()
        );
        TechniqueRef { index }
    }

    #[track_caller]
    fn technique_by_name(&self, name: &str) -> TechniqueRef {
        let desc = self.desc();
        match desc.techniques.iter().position(|t| t.name == name) {
            Some(index) => TechniqueRef { index },
            None => panic!("effect `{}` has no technique named `{name}`", desc.label),
        }
    }

    fn technique_name(&self, technique: TechniqueRef) -> &'static str {
        self.desc().techniques[technique.index].name
    }

    fn pass_count(&self, technique: TechniqueRef) -> usize {
        self.desc().techniques[technique.index].passes.len()
    }

    fn pass_desc(&self, pass: PassRef) -> &PassDesc {
        &self.desc().techniques[pass.technique].passes[pass.pass]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[VariableDesc] = &[
        VariableDesc::new("gView", VariableKind::Mat4),
        VariableDesc::new("gEye", VariableKind::Vec3),
        VariableDesc::new("gIntensity", VariableKind::Float),
        VariableDesc::new("gAlbedo", VariableKind::Texture(TextureSample::Float)),
        VariableDesc::new("gEnabled", VariableKind::Bool),
        VariableDesc::new("gUv", VariableKind::Vec2),
        VariableDesc::new(
            "gItems",
            VariableKind::Buffer {
                element_size: 16,
                max_elements: 2,
            },
        ),
        VariableDesc::new("gCount", VariableKind::Int),
    ];

    const PASSES: &[PassDesc] = &[PassDesc::new("P0", "vs_main", "fs_main")];

    const DESC: EffectDesc = EffectDesc {
        label: "test",
        source: "",
        input_layout: &[],
        techniques: &[TechniqueDesc {
            name: "Main",
            passes: PASSES,
        }],
        variables: VARS,
    };

    fn state() -> EffectState<u32> {
        EffectState::new(&DESC)
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn uniform_offsets_follow_wgsl_rules() {
        let layout = UniformLayout::new(VARS);
        assert_eq!(layout.offset(0), Some(0)); // mat4
        assert_eq!(layout.offset(1), Some(64)); // vec3
        assert_eq!(layout.offset(2), Some(76)); // f32 packs after vec3
        assert_eq!(layout.offset(3), None); // texture
        assert_eq!(layout.offset(4), Some(80)); // bool
        assert_eq!(layout.offset(5), Some(88)); // vec2 aligned to 8
        assert_eq!(layout.offset(6), None); // buffer
        assert_eq!(layout.offset(7), Some(96));
        assert_eq!(layout.size(), 112);
    }

    #[test]
    fn empty_layout_still_has_one_block() {
        assert_eq!(UniformLayout::new(&[]).size(), 16);
    }

    #[test]
    fn resource_bindings_start_after_sampler() {
        let bindings: Vec<_> = DESC.resource_bindings().collect();
        assert_eq!(bindings, vec![(2, 3), (3, 6)]);
    }

    // ── variables ─────────────────────────────────────────────────────────

    #[test]
    fn uniform_bytes_contain_set_values() {
        let mut s = state();
        s.set("gIntensity", Variable::Float(2.5));
        s.set("gEnabled", Variable::Bool(true));
        s.set("gCount", Variable::Int(7));

        let bytes = s.uniform_bytes();
        assert_eq!(bytes.len(), 112);
        assert_eq!(&bytes[76..80], &2.5f32.to_le_bytes());
        assert_eq!(&bytes[80..84], &1u32.to_le_bytes());
        assert_eq!(&bytes[96..100], &7i32.to_le_bytes());
    }

    #[test]
    fn texture_binding_is_stored_and_cleared() {
        let mut s = state();
        let view = 42u32;
        s.set("gAlbedo", Variable::from(&view));
        assert_eq!(s.value("gAlbedo").and_then(BoundValue::as_texture), Some(&42));

        s.set("gAlbedo", Variable::Texture(None));
        assert_eq!(s.value("gAlbedo"), Some(&BoundValue::Texture(None)));
    }

    #[test]
    fn raw_payload_is_copied() {
        let mut s = state();
        let items = [[1.0f32, 2.0, 3.0, 4.0]];
        s.set("gItems", Variable::raw(&items));
        match s.value("gItems") {
            Some(BoundValue::Raw { count, bytes }) => {
                assert_eq!(*count, 1);
                assert_eq!(bytes.len(), 16);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "no variable named `gMissing`")]
    fn unknown_variable_panics() {
        state().set("gMissing", Variable::Float(1.0));
    }

    #[test]
    #[should_panic(expected = "is Mat4")]
    fn kind_mismatch_panics() {
        state().set("gView", Variable::Float(1.0));
    }

    #[test]
    #[should_panic(expected = "at most 2 elements")]
    fn oversized_raw_payload_panics() {
        let items = [[0.0f32; 4]; 3];
        state().set("gItems", Variable::raw(&items));
    }

    // ── description ───────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_missing_techniques() {
        let desc = EffectDesc {
            techniques: &[],
            ..DESC
        };
        assert!(desc.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_variables() {
        const DUP: &[VariableDesc] = &[
            VariableDesc::new("a", VariableKind::Float),
            VariableDesc::new("a", VariableKind::Int),
        ];
        let desc = EffectDesc {
            variables: DUP,
            ..DESC
        };
        assert!(desc.validate().is_err());
    }

    #[test]
    fn slot_strides_sum_element_sizes() {
        const LAYOUT: &[InputElement] = &[
            InputElement::new("POSITION", VertexFormat::Float32x3, 0),
            InputElement::new("TEXCOORD", VertexFormat::Float32x2, 0),
            InputElement::new("POSITION", VertexFormat::Float32x3, 1),
        ];
        let desc = EffectDesc {
            input_layout: LAYOUT,
            ..DESC
        };
        assert!(desc.validate().is_ok());
        assert_eq!(desc.slot_count(), 2);
        assert_eq!(desc.slot_stride(0), 20);
        assert_eq!(desc.slot_stride(1), 12);
    }
}
