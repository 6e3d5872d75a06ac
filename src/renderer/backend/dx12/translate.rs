use crate::renderer::backend::dx12::formats::format_to_dxgi;
use crate::renderer::common::{
    Blend, ComparisonFunc, CullMode, DepthWrite, DescriptorClass, FillMode, FilterMode,
    FilterReduction, Format, PrimitiveTopology, ShaderStage, StaticBorderColor, TextureAddress, TextureFilter,
    content_hash,
};
use crate::renderer::resources::pipeline_state::{
    BlendStateDesc, ComputePipelineDesc, DepthStencilStateDesc, GraphicsPipelineDesc, MeshletPipelineDesc,
    RasterizerStateDesc, RenderTargetState, StencilOpDesc,
};
use crate::renderer::resources::root_signature::{RootParameter, RootSignatureDesc, resolve_registers};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::PipelineShaders;
use color_eyre::eyre::bail;
use color_eyre::Result;

pub const MAX_RENDER_TARGETS: usize = 8;
/// Root signatures are limited to 64 DWORDs
pub const MAX_ROOT_SIGNATURE_DWORDS: u32 = 64;

pub mod visibility {
    pub const ALL: u32 = 0;
    pub const VERTEX: u32 = 1;
    pub const HULL: u32 = 2;
    pub const DOMAIN: u32 = 3;
    pub const GEOMETRY: u32 = 4;
    pub const PIXEL: u32 = 5;
    pub const AMPLIFICATION: u32 = 6;
    pub const MESH: u32 = 7;
}

pub mod range_type {
    pub const SRV: u32 = 0;
    pub const UAV: u32 = 1;
    pub const CBV: u32 = 2;
    pub const SAMPLER: u32 = 3;
}

/// `D3D12_SHADER_VISIBILITY`; anything but a single graphics stage is visible everywhere
pub fn shader_visibility(stages: ShaderStage) -> u32 {
    match stages {
        ShaderStage::VERTEX => visibility::VERTEX,
        ShaderStage::HULL => visibility::HULL,
        ShaderStage::DOMAIN => visibility::DOMAIN,
        ShaderStage::GEOMETRY => visibility::GEOMETRY,
        ShaderStage::PIXEL => visibility::PIXEL,
        ShaderStage::AMPLIFICATION => visibility::AMPLIFICATION,
        ShaderStage::MESH => visibility::MESH,
        _ => visibility::ALL,
    }
}

pub fn descriptor_range_type(class: DescriptorClass) -> u32 {
    match class {
        DescriptorClass::ShaderResource => range_type::SRV,
        DescriptorClass::UnorderedAccess => range_type::UAV,
        DescriptorClass::ConstantBuffer => range_type::CBV,
        DescriptorClass::Sampler => range_type::SAMPLER,
    }
}

pub fn blend_to_d3d12(blend: Blend) -> u32 {
    match blend {
        Blend::Zero => 1,
        Blend::One => 2,
        Blend::SrcColor => 3,
        Blend::InvSrcColor => 4,
        Blend::SrcAlpha => 5,
        Blend::InvSrcAlpha => 6,
        Blend::DstAlpha => 7,
        Blend::InvDstAlpha => 8,
        Blend::DstColor => 9,
        Blend::InvDstColor => 10,
        Blend::SrcAlphaSat => 11,
        Blend::BlendFactor => 14,
        Blend::InvBlendFactor => 15,
        Blend::Src1Color => 16,
        Blend::InvSrc1Color => 17,
        Blend::Src1Alpha => 18,
        Blend::InvSrc1Alpha => 19,
        Blend::AlphaFactor => 20,
        Blend::InvAlphaFactor => 21,
    }
}

pub fn comparison_func_to_d3d12(func: ComparisonFunc) -> u32 {
    match func {
        ComparisonFunc::None | ComparisonFunc::Always => 8,
        ComparisonFunc::Never => 1,
        ComparisonFunc::Less => 2,
        ComparisonFunc::Equal => 3,
        ComparisonFunc::LessEqual => 4,
        ComparisonFunc::Greater => 5,
        ComparisonFunc::NotEqual => 6,
        ComparisonFunc::GreaterEqual => 7,
    }
}

pub fn texture_address_to_d3d12(address: TextureAddress) -> u32 {
    match address {
        TextureAddress::Wrap => 1,
        TextureAddress::Mirror => 2,
        TextureAddress::Clamp => 3,
        TextureAddress::Border => 4,
        TextureAddress::MirrorOnce => 5,
    }
}

pub fn static_border_color_to_d3d12(color: StaticBorderColor) -> u32 {
    match color {
        StaticBorderColor::TransparentBlack => 0,
        StaticBorderColor::OpaqueBlack => 1,
        StaticBorderColor::OpaqueWhite => 2,
    }
}

/// `D3D12_FILTER` built the way `D3D12_ENCODE_BASIC_FILTER` does
pub fn filter_to_d3d12(filter: TextureFilter) -> u32 {
    let (min, mag, mip, anisotropic, reduction) = filter.decompose();
    let mode = |m: FilterMode| match m {
        FilterMode::Point => 0,
        FilterMode::Linear => 1,
    };
    let reduction = match reduction {
        FilterReduction::Standard => 0,
        FilterReduction::Comparison => 1,
        FilterReduction::Minimum => 2,
        FilterReduction::Maximum => 3,
    };
    let basic = (mode(min) << 4) | (mode(mag) << 2) | mode(mip) | (reduction << 7);
    if anisotropic { basic | 0x40 } else { basic }
}

/// `D3D_PRIMITIVE_TOPOLOGY` for the input assembler
pub fn primitive_topology_to_d3d(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::PointList => 1,
        PrimitiveTopology::LineList => 2,
        PrimitiveTopology::LineStrip => 3,
        PrimitiveTopology::TriangleList => 4,
        PrimitiveTopology::TriangleStrip => 5,
        PrimitiveTopology::LineListWithAdjacency => 10,
        PrimitiveTopology::LineStripWithAdjacency => 11,
        PrimitiveTopology::TriangleListWithAdjacency => 12,
        PrimitiveTopology::TriangleStripWithAdjacency => 13,
        PrimitiveTopology::PatchList(n) => 32 + n as u32,
    }
}

/// `D3D12_PRIMITIVE_TOPOLOGY_TYPE` the pipeline is compiled for
pub fn primitive_topology_type(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::PointList => 1,
        PrimitiveTopology::LineList
        | PrimitiveTopology::LineStrip
        | PrimitiveTopology::LineListWithAdjacency
        | PrimitiveTopology::LineStripWithAdjacency => 2,
        PrimitiveTopology::TriangleList
        | PrimitiveTopology::TriangleStrip
        | PrimitiveTopology::TriangleListWithAdjacency
        | PrimitiveTopology::TriangleStripWithAdjacency => 3,
        PrimitiveTopology::PatchList(_) => 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRangeKey {
    pub range_type: u32,
    pub num_descriptors: u32,
    pub base_register: u32,
    pub register_space: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootParameterKey {
    Constants {
        register: u32,
        register_space: u32,
        num_values: u32,
        visibility: u32,
    },
    /// Root CBV (2), SRV (3) or UAV (4)
    Descriptor {
        parameter_type: u32,
        register: u32,
        register_space: u32,
        visibility: u32,
    },
    Table {
        ranges: Vec<DescriptorRangeKey>,
        visibility: u32,
    },
}

impl RootParameterKey {
    fn dwords(&self) -> u32 {
        match self {
            Self::Constants { num_values, .. } => *num_values,
            Self::Descriptor { .. } => 2,
            Self::Table { .. } => 1,
        }
    }
}

/// `D3D12_SAMPLER_DESC` fields with floats stored as bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub filter: u32,
    pub address_u: u32,
    pub address_v: u32,
    pub address_w: u32,
    pub mip_lod_bias: u32,
    pub max_anisotropy: u32,
    pub comparison_func: u32,
    pub border_color: [u32; 4],
    pub static_border_color: u32,
    pub min_lod: u32,
    pub max_lod: u32,
}

impl SamplerKey {
    pub fn new(desc: &SamplerDesc) -> Self {
        Self {
            filter: filter_to_d3d12(desc.filter),
            address_u: texture_address_to_d3d12(desc.address_u),
            address_v: texture_address_to_d3d12(desc.address_v),
            address_w: texture_address_to_d3d12(desc.address_w),
            mip_lod_bias: desc.mip_lod_bias.to_bits(),
            max_anisotropy: desc.max_anisotropy.clamp(1, 16),
            comparison_func: comparison_func_to_d3d12(desc.comparison_func),
            border_color: desc.border_color.to_array().map(f32::to_bits),
            static_border_color: static_border_color_to_d3d12(desc.static_border_color),
            min_lod: desc.min_lod.to_bits(),
            max_lod: desc.max_lod.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSamplerKey {
    pub sampler: SamplerKey,
    pub register: u32,
    pub register_space: u32,
    pub visibility: u32,
}

/// Everything `D3D12SerializeRootSignature` needs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootSignatureKey {
    pub name: String,
    pub flags: u32,
    pub parameters: Vec<RootParameterKey>,
    pub static_samplers: Vec<StaticSamplerKey>,
}

pub fn translate_root_signature(desc: &RootSignatureDesc) -> Result<RootSignatureKey> {
    desc.validate()?;

    let mut parameters = Vec::with_capacity(desc.root_parameters.len());
    for parameter in &desc.root_parameters {
        let visibility = shader_visibility(parameter.visibility());
        let key = match parameter {
            RootParameter::RootConstants { register, register_space, num_32bit_constants, .. } => {
                RootParameterKey::Constants {
                    register: *register,
                    register_space: *register_space,
                    num_values: *num_32bit_constants,
                    visibility,
                }
            }
            RootParameter::RootCbv { register, register_space, .. } => RootParameterKey::Descriptor {
                parameter_type: 2,
                register: *register,
                register_space: *register_space,
                visibility,
            },
            RootParameter::RootSrv { register, register_space, .. } => RootParameterKey::Descriptor {
                parameter_type: 3,
                register: *register,
                register_space: *register_space,
                visibility,
            },
            RootParameter::RootUav { register, register_space, .. } => RootParameterKey::Descriptor {
                parameter_type: 4,
                register: *register,
                register_space: *register_space,
                visibility,
            },
            RootParameter::Table { ranges, .. } => {
                let mut keys = Vec::with_capacity(ranges.len());
                let mut offset = 0;
                for (range, base_register) in ranges.iter().zip(resolve_registers(ranges)?) {
                    keys.push(DescriptorRangeKey {
                        range_type: descriptor_range_type(range.descriptor_type.class()),
                        num_descriptors: range.num_descriptors,
                        base_register,
                        register_space: range.register_space,
                        offset,
                    });
                    offset += range.num_descriptors;
                }
                RootParameterKey::Table { ranges: keys, visibility }
            }
        };
        parameters.push(key);
    }

    let dwords: u32 = parameters.iter().map(RootParameterKey::dwords).sum();
    if dwords > MAX_ROOT_SIGNATURE_DWORDS {
        bail!(
            "root signature {} takes {dwords} DWORDs, the limit is {MAX_ROOT_SIGNATURE_DWORDS}",
            desc.name
        );
    }

    let static_samplers = desc
        .static_samplers
        .iter()
        .map(|s| StaticSamplerKey {
            sampler: SamplerKey::new(&s.sampler),
            register: s.shader_register,
            register_space: s.register_space,
            visibility: shader_visibility(s.shader_visibility),
        })
        .collect();

    Ok(RootSignatureKey {
        name: desc.name.clone(),
        flags: desc.flags.bits(),
        parameters,
        static_samplers,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElementKey {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub format: u32,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    /// 0 per vertex, 1 per instance
    pub input_slot_class: u32,
    pub instance_data_step_rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendKey {
    pub blend_enable: bool,
    pub logic_op_enable: bool,
    pub src_blend: u32,
    pub dst_blend: u32,
    pub blend_op: u32,
    pub src_blend_alpha: u32,
    pub dst_blend_alpha: u32,
    pub blend_op_alpha: u32,
    pub logic_op: u32,
    pub write_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerKey {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: u32,
    pub slope_scaled_depth_bias: u32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub forced_sample_count: u32,
    pub conservative: bool,
}

impl RasterizerKey {
    fn new(desc: &RasterizerStateDesc) -> Self {
        Self {
            fill_mode: match desc.fill_mode {
                FillMode::Wireframe => 2,
                FillMode::Solid => 3,
            },
            cull_mode: match desc.cull_mode {
                CullMode::None => 1,
                CullMode::Front => 2,
                CullMode::Back => 3,
            },
            front_counter_clockwise: desc.front_counter_clockwise,
            depth_bias: desc.depth_bias,
            depth_bias_clamp: desc.depth_bias_clamp.to_bits(),
            slope_scaled_depth_bias: desc.slope_scaled_depth_bias.to_bits(),
            depth_clip_enable: desc.depth_clip_enable,
            multisample_enable: desc.multisample_enable,
            antialiased_line_enable: desc.antialiased_line_enable,
            forced_sample_count: desc.forced_sample_count,
            conservative: desc.conservative_rasterization_enable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpKey {
    pub fail_op: u32,
    pub depth_fail_op: u32,
    pub pass_op: u32,
    pub func: u32,
}

impl StencilOpKey {
    fn new(desc: &StencilOpDesc) -> Self {
        // D3D12_STENCIL_OP starts at KEEP = 1, in the same order
        Self {
            fail_op: desc.stencil_fail_op as u32 + 1,
            depth_fail_op: desc.stencil_depth_fail_op as u32 + 1,
            pass_op: desc.stencil_pass_op as u32 + 1,
            func: comparison_func_to_d3d12(desc.stencil_func),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilKey {
    pub depth_enable: bool,
    pub depth_write_all: bool,
    pub depth_func: u32,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilOpKey,
    pub back: StencilOpKey,
}

impl DepthStencilKey {
    fn new(desc: &DepthStencilStateDesc) -> Self {
        Self {
            depth_enable: desc.depth_enable,
            depth_write_all: desc.depth_write_mask == DepthWrite::All,
            depth_func: comparison_func_to_d3d12(desc.depth_func),
            stencil_enable: desc.stencil_enable,
            stencil_read_mask: desc.stencil_read_mask,
            stencil_write_mask: desc.stencil_write_mask,
            front: StencilOpKey::new(&desc.front_face),
            back: StencilOpKey::new(&desc.back_face),
        }
    }
}

/// Translated pipeline state; shaders are identified by stage and content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub name: String,
    pub root_signature_hash: u64,
    pub mesh: bool,
    pub compute: bool,
    pub stages: Vec<(ShaderStage, u64)>,
    pub input_elements: Vec<InputElementKey>,
    /// (input slot, stride) used when binding vertex buffers
    pub vertex_strides: Vec<(u32, u32)>,
    pub alpha_to_coverage: bool,
    pub independent_blend: bool,
    pub blend: [RenderTargetBlendKey; MAX_RENDER_TARGETS],
    pub sample_mask: u32,
    pub rasterizer: RasterizerKey,
    pub depth_stencil: DepthStencilKey,
    pub strip_cut: u32,
    pub topology_type: u32,
    pub topology: u32,
    pub rtv_formats: Vec<u32>,
    pub dsv_format: u32,
    pub sample_count: u32,
    pub sample_quality: u32,
}

#[allow(clippy::too_many_arguments)]
fn fixed_function_key(
    name: &str,
    root_signature: &RootSignatureKey,
    blend: &BlendStateDesc,
    depth_stencil: &DepthStencilStateDesc,
    rasterizer: &RasterizerStateDesc,
    targets: &RenderTargetState,
    topology: PrimitiveTopology,
    shaders: &PipelineShaders,
) -> Result<PipelineKey> {
    if targets.rtv_formats.len() > MAX_RENDER_TARGETS {
        bail!("pipeline {name} has {} render targets, the limit is {MAX_RENDER_TARGETS}", targets.rtv_formats.len());
    }
    if let Some(format) = targets.rtv_formats.iter().find(|format| !format.is_color()) {
        bail!("pipeline {name} uses {format:?} as a colour target");
    }
    if targets.dsv_format != Format::Unknown && !targets.dsv_format.is_depth() {
        bail!("pipeline {name} uses {:?} as a depth target", targets.dsv_format);
    }
    if let Some(n @ (0 | 33..)) = topology.control_points() {
        bail!("pipeline {name} has a patch list with {n} control points");
    }

    let mut blend_keys = [RenderTargetBlendKey::default(); MAX_RENDER_TARGETS];
    for (i, key) in blend_keys.iter_mut().enumerate() {
        let rt = blend.target(i);
        *key = RenderTargetBlendKey {
            blend_enable: rt.blend_enable,
            logic_op_enable: rt.logic_op_enable,
            src_blend: blend_to_d3d12(rt.src_blend),
            dst_blend: blend_to_d3d12(rt.dst_blend),
            blend_op: rt.blend_op as u32 + 1,
            src_blend_alpha: blend_to_d3d12(rt.src_blend_alpha),
            dst_blend_alpha: blend_to_d3d12(rt.dst_blend_alpha),
            blend_op_alpha: rt.blend_op_alpha as u32 + 1,
            logic_op: rt.logic_op as u32,
            write_mask: rt.write_mask.bits(),
        };
    }

    Ok(PipelineKey {
        name: name.to_string(),
        root_signature_hash: content_hash(root_signature),
        mesh: false,
        compute: false,
        stages: shaders.stages().map(|(stage, binding)| (stage, binding.shader.hash)).collect(),
        input_elements: Vec::new(),
        vertex_strides: Vec::new(),
        alpha_to_coverage: blend.alpha_to_coverage_enable,
        independent_blend: blend.independent_blend_enable,
        blend: blend_keys,
        sample_mask: targets.sample_mask,
        rasterizer: RasterizerKey::new(rasterizer),
        depth_stencil: DepthStencilKey::new(depth_stencil),
        strip_cut: 0,
        topology_type: primitive_topology_type(topology),
        topology: primitive_topology_to_d3d(topology),
        rtv_formats: targets.rtv_formats.iter().map(|f| format_to_dxgi(*f)).collect(),
        dsv_format: format_to_dxgi(targets.dsv_format),
        sample_count: targets.msaa_count.max(1),
        sample_quality: targets.msaa_quality,
    })
}

pub fn translate_graphics_pipeline(
    desc: &GraphicsPipelineDesc,
    shaders: &PipelineShaders,
    root_signature: &RootSignatureKey,
) -> Result<PipelineKey> {
    let mut key = fixed_function_key(
        &desc.name,
        root_signature,
        &desc.blend_state,
        &desc.depth_stencil_state,
        &desc.rasterizer_state,
        &desc.render_targets,
        desc.primitive_topology,
        shaders,
    )?;

    for element in &desc.vertex_elements {
        if !desc.vertex_streams.iter().any(|s| s.input_slot == element.input_slot) {
            bail!(
                "vertex element {}{} of {} reads undeclared stream {}",
                element.semantic_name,
                element.semantic_index,
                desc.name,
                element.input_slot
            );
        }
        key.input_elements.push(InputElementKey {
            semantic_name: element.semantic_name.clone(),
            semantic_index: element.semantic_index,
            format: format_to_dxgi(element.format),
            input_slot: element.input_slot,
            aligned_byte_offset: element.aligned_byte_offset,
            input_slot_class: element.input_classification as u32,
            instance_data_step_rate: element.instance_data_step_rate,
        });
    }
    key.vertex_strides = desc.vertex_streams.iter().map(|s| (s.input_slot, s.stride)).collect();
    key.strip_cut = desc.index_buffer_strip_cut as u32;
    Ok(key)
}

pub fn translate_meshlet_pipeline(
    desc: &MeshletPipelineDesc,
    shaders: &PipelineShaders,
    root_signature: &RootSignatureKey,
) -> Result<PipelineKey> {
    let mut key = fixed_function_key(
        &desc.name,
        root_signature,
        &desc.blend_state,
        &desc.depth_stencil_state,
        &desc.rasterizer_state,
        &desc.render_targets,
        desc.primitive_topology,
        shaders,
    )?;
    key.mesh = true;
    Ok(key)
}

/// Fixed function state stays at its defaults so only the root signature and shader vary the key
pub fn translate_compute_pipeline(
    desc: &ComputePipelineDesc,
    shaders: &PipelineShaders,
    root_signature: &RootSignatureKey,
) -> Result<PipelineKey> {
    if shaders.has_graphics_stages() {
        bail!("compute pipeline {} has graphics stages", desc.name);
    }
    let mut key = fixed_function_key(
        &desc.name,
        root_signature,
        &BlendStateDesc::default(),
        &DepthStencilStateDesc::default(),
        &RasterizerStateDesc::default(),
        &RenderTargetState::default(),
        PrimitiveTopology::default(),
        shaders,
    )?;
    key.compute = true;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::dx12::formats::dxgi;
    use crate::renderer::common::{APPEND_REGISTER, DescriptorType};
    use crate::renderer::resources::pipeline_state::{VertexElementDesc, VertexStreamDesc};
    use crate::renderer::resources::root_signature::DescriptorRange;
    use crate::renderer::resources::sampler::StaticSamplerDesc;

    #[test]
    fn every_descriptor_type_has_a_range_type() {
        for descriptor_type in DescriptorType::ALL {
            let range = descriptor_range_type(descriptor_type.class());
            assert_eq!(range, descriptor_range_type(descriptor_type.class()));
            assert!(range <= range_type::SAMPLER);
        }
        assert_eq!(descriptor_range_type(DescriptorType::Sampler.class()), range_type::SAMPLER);
        assert_eq!(descriptor_range_type(DescriptorType::DynamicConstantBuffer.class()), range_type::CBV);
    }

    #[test]
    fn filters_encode_like_d3d12() {
        assert_eq!(filter_to_d3d12(TextureFilter::MinMagMipPoint), 0x00);
        assert_eq!(filter_to_d3d12(TextureFilter::MinMagMipLinear), 0x15);
        assert_eq!(filter_to_d3d12(TextureFilter::Anisotropic), 0x55);
        assert_eq!(filter_to_d3d12(TextureFilter::ComparisonMinMagMipLinear), 0x95);
        assert_eq!(filter_to_d3d12(TextureFilter::MaximumAnisotropic), 0x1d5);
    }

    #[test]
    fn visibility_collapses_to_all_for_stage_sets() {
        assert_eq!(shader_visibility(ShaderStage::PIXEL), visibility::PIXEL);
        assert_eq!(shader_visibility(ShaderStage::MESH), visibility::MESH);
        assert_eq!(shader_visibility(ShaderStage::VERTEX | ShaderStage::PIXEL), visibility::ALL);
        assert_eq!(shader_visibility(ShaderStage::ALL), visibility::ALL);
    }

    #[test]
    fn tables_use_contiguous_offsets_and_appended_registers() {
        let desc = RootSignatureDesc::new("tables")
            .with_parameter(RootParameter::root_cbv(0, ShaderStage::VERTEX))
            .with_parameter(RootParameter::table(
                vec![DescriptorRange::texture_srv(2, 3), DescriptorRange::structured_buffer_srv(APPEND_REGISTER, 2)],
                ShaderStage::PIXEL,
            ))
            .with_static_sampler(StaticSamplerDesc::new(1, SamplerDesc::default(), ShaderStage::PIXEL));

        let key = translate_root_signature(&desc).unwrap();
        assert_eq!(
            key.parameters[0],
            RootParameterKey::Descriptor { parameter_type: 2, register: 0, register_space: 0, visibility: visibility::VERTEX }
        );
        let RootParameterKey::Table { ranges, visibility: table_visibility } = &key.parameters[1] else {
            panic!("expected a table");
        };
        assert_eq!(*table_visibility, visibility::PIXEL);
        assert_eq!((ranges[0].base_register, ranges[0].offset), (2, 0));
        assert_eq!((ranges[1].base_register, ranges[1].offset), (5, 3));
        assert_eq!(key.static_samplers.len(), 1);
        assert_eq!(key.static_samplers[0].register, 1);
    }

    #[test]
    fn oversized_root_signatures_are_rejected() {
        let desc = RootSignatureDesc::new("big")
            .with_parameter(RootParameter::root_constants(0, 63, ShaderStage::ALL))
            .with_parameter(RootParameter::root_cbv(1, ShaderStage::ALL));
        assert!(translate_root_signature(&desc).is_err());
    }

    #[test]
    fn graphics_pipeline_fields() {
        let root = translate_root_signature(&RootSignatureDesc::new("empty")).unwrap();
        let desc = GraphicsPipelineDesc::new("opaque")
            .with_render_targets(&[Format::RGBA8_UNorm], Format::D32)
            .with_input_layout(
                &[VertexStreamDesc { input_slot: 0, stride: 20, ..Default::default() }],
                &[
                    VertexElementDesc::per_vertex("POSITION", Format::RGB32_Float, 0, 0),
                    VertexElementDesc::per_vertex("TEXCOORD", Format::RG32_Float, 0, 12),
                ],
            );

        let key = translate_graphics_pipeline(&desc, &PipelineShaders::default(), &root).unwrap();
        assert_eq!(key.rtv_formats, vec![dxgi::R8G8B8A8_UNORM]);
        assert_eq!(key.dsv_format, dxgi::D32_FLOAT);
        assert_eq!(key.topology_type, 3);
        assert_eq!(key.input_elements[1].format, dxgi::R32G32_FLOAT);
        assert_eq!(key.vertex_strides, vec![(0, 20)]);
        assert_eq!(key.rasterizer.cull_mode, 3);
        assert!(!key.mesh);

        let same = translate_graphics_pipeline(&desc, &PipelineShaders::default(), &root).unwrap();
        assert_eq!(content_hash(&key), content_hash(&same));
    }

    #[test]
    fn compute_pipelines_key_on_root_signature() {
        let root = translate_root_signature(&RootSignatureDesc::new("empty")).unwrap();
        let other = translate_root_signature(
            &RootSignatureDesc::new("cbv").with_parameter(RootParameter::root_cbv(0, ShaderStage::COMPUTE)),
        )
        .unwrap();
        let desc = ComputePipelineDesc::new("cull");

        let key = translate_compute_pipeline(&desc, &PipelineShaders::default(), &root).unwrap();
        assert!(key.compute && !key.mesh);
        assert!(key.rtv_formats.is_empty());
        let moved = translate_compute_pipeline(&desc, &PipelineShaders::default(), &other).unwrap();
        assert_ne!(content_hash(&key), content_hash(&moved));
    }

    #[test]
    fn depth_format_as_colour_target_fails() {
        let root = translate_root_signature(&RootSignatureDesc::new("empty")).unwrap();
        let desc = MeshletPipelineDesc::new("bad").with_render_targets(&[Format::D32], Format::Unknown);
        assert!(translate_meshlet_pipeline(&desc, &PipelineShaders::default(), &root).is_err());
    }
}
