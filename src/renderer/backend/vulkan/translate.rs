use crate::renderer::backend::vulkan::formats::format_to_vulkan;
use crate::renderer::common::{
    Blend, BlendOp, ColorWrite, ComparisonFunc, CullMode, DepthWrite, DescriptorType, FillMode, FilterMode,
    FilterReduction, Format, IndexBufferStripCutValue, InputClassification, LogicOp, PrimitiveTopology,
    ShaderStage, StaticBorderColor, StencilOp, TextureAddress, TextureFilter, content_hash,
};
use crate::renderer::resources::pipeline_state::{
    BlendStateDesc, ComputePipelineDesc, DepthStencilStateDesc, GraphicsPipelineDesc, MeshletPipelineDesc,
    RasterizerStateDesc, RenderTargetState, StencilOpDesc,
};
use crate::renderer::resources::root_signature::{DescriptorSetLayout, RootParameter, RootSignatureDesc};
use crate::renderer::resources::sampler::SamplerDesc;
use crate::renderer::resources::shader::PipelineShaders;
use ash::vk;
use color_eyre::eyre::bail;
use color_eyre::Result;

pub const MAX_RENDER_TARGETS: usize = 8;

pub fn blend_to_vulkan(blend: Blend) -> vk::BlendFactor {
    match blend {
        Blend::Zero => vk::BlendFactor::ZERO,
        Blend::One => vk::BlendFactor::ONE,
        Blend::SrcColor => vk::BlendFactor::SRC_COLOR,
        Blend::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        Blend::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        Blend::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        Blend::DstAlpha => vk::BlendFactor::DST_ALPHA,
        Blend::InvDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        Blend::DstColor => vk::BlendFactor::DST_COLOR,
        Blend::InvDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        Blend::SrcAlphaSat => vk::BlendFactor::SRC_ALPHA_SATURATE,
        Blend::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
        Blend::InvBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        Blend::AlphaFactor => vk::BlendFactor::CONSTANT_ALPHA,
        Blend::InvAlphaFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
        Blend::Src1Color => vk::BlendFactor::SRC1_COLOR,
        Blend::InvSrc1Color => vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
        Blend::Src1Alpha => vk::BlendFactor::SRC1_ALPHA,
        Blend::InvSrc1Alpha => vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
    }
}

pub fn blend_op_to_vulkan(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::RevSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn logic_op_to_vulkan(op: LogicOp) -> vk::LogicOp {
    match op {
        LogicOp::Clear => vk::LogicOp::CLEAR,
        LogicOp::Set => vk::LogicOp::SET,
        LogicOp::Copy => vk::LogicOp::COPY,
        LogicOp::CopyInverted => vk::LogicOp::COPY_INVERTED,
        LogicOp::Noop => vk::LogicOp::NO_OP,
        LogicOp::Invert => vk::LogicOp::INVERT,
        LogicOp::And => vk::LogicOp::AND,
        LogicOp::Nand => vk::LogicOp::NAND,
        LogicOp::Or => vk::LogicOp::OR,
        LogicOp::Nor => vk::LogicOp::NOR,
        LogicOp::Xor => vk::LogicOp::XOR,
        LogicOp::Equiv => vk::LogicOp::EQUIVALENT,
        LogicOp::AndReverse => vk::LogicOp::AND_REVERSE,
        LogicOp::AndInverted => vk::LogicOp::AND_INVERTED,
        LogicOp::OrReverse => vk::LogicOp::OR_REVERSE,
        LogicOp::OrInverted => vk::LogicOp::OR_INVERTED,
    }
}

pub fn color_write_to_vulkan(mask: ColorWrite) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWrite::RED) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorWrite::GREEN) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorWrite::BLUE) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorWrite::ALPHA) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub fn cull_mode_to_vulkan(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn fill_mode_to_vulkan(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Wireframe => vk::PolygonMode::LINE,
        FillMode::Solid => vk::PolygonMode::FILL,
    }
}

/// `None` only disables sampler comparison, anywhere else it passes everything
pub fn comparison_func_to_vulkan(func: ComparisonFunc) -> vk::CompareOp {
    match func {
        ComparisonFunc::Never => vk::CompareOp::NEVER,
        ComparisonFunc::Less => vk::CompareOp::LESS,
        ComparisonFunc::Equal => vk::CompareOp::EQUAL,
        ComparisonFunc::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        ComparisonFunc::Greater => vk::CompareOp::GREATER,
        ComparisonFunc::NotEqual => vk::CompareOp::NOT_EQUAL,
        ComparisonFunc::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        ComparisonFunc::Always | ComparisonFunc::None => vk::CompareOp::ALWAYS,
    }
}

pub fn stencil_op_to_vulkan(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrSat => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrSat => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::Incr => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::Decr => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn primitive_topology_to_vulkan(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineListWithAdjacency => vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY,
        PrimitiveTopology::LineStripWithAdjacency => vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY,
        PrimitiveTopology::TriangleListWithAdjacency => vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY,
        PrimitiveTopology::TriangleStripWithAdjacency => vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY,
        PrimitiveTopology::PatchList(_) => vk::PrimitiveTopology::PATCH_LIST,
    }
}

pub fn input_classification_to_vulkan(classification: InputClassification) -> vk::VertexInputRate {
    match classification {
        InputClassification::PerVertexData => vk::VertexInputRate::VERTEX,
        InputClassification::PerInstanceData => vk::VertexInputRate::INSTANCE,
    }
}

pub fn shader_stage_to_vulkan(stage: ShaderStage) -> vk::ShaderStageFlags {
    if stage == ShaderStage::ALL {
        return vk::ShaderStageFlags::ALL;
    }
    if stage == ShaderStage::ALL_GRAPHICS {
        return vk::ShaderStageFlags::ALL_GRAPHICS;
    }

    const STAGES: [(ShaderStage, vk::ShaderStageFlags); 14] = [
        (ShaderStage::COMPUTE, vk::ShaderStageFlags::COMPUTE),
        (ShaderStage::VERTEX, vk::ShaderStageFlags::VERTEX),
        (ShaderStage::HULL, vk::ShaderStageFlags::TESSELLATION_CONTROL),
        (ShaderStage::DOMAIN, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
        (ShaderStage::GEOMETRY, vk::ShaderStageFlags::GEOMETRY),
        (ShaderStage::PIXEL, vk::ShaderStageFlags::FRAGMENT),
        (ShaderStage::AMPLIFICATION, vk::ShaderStageFlags::TASK_EXT),
        (ShaderStage::MESH, vk::ShaderStageFlags::MESH_EXT),
        (ShaderStage::RAY_GENERATION, vk::ShaderStageFlags::RAYGEN_KHR),
        (ShaderStage::MISS, vk::ShaderStageFlags::MISS_KHR),
        (ShaderStage::CLOSEST_HIT, vk::ShaderStageFlags::CLOSEST_HIT_KHR),
        (ShaderStage::ANY_HIT, vk::ShaderStageFlags::ANY_HIT_KHR),
        (ShaderStage::INTERSECTION, vk::ShaderStageFlags::INTERSECTION_KHR),
        (ShaderStage::CALLABLE, vk::ShaderStageFlags::CALLABLE_KHR),
    ];
    STAGES
        .iter()
        .filter(|(engine, _)| stage.contains(*engine))
        .fold(vk::ShaderStageFlags::empty(), |flags, (_, vk_stage)| flags | *vk_stage)
}

pub fn descriptor_type_to_vulkan(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::DynamicConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::TextureSRV => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::TextureUAV => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::StructuredBufferSRV
        | DescriptorType::StructuredBufferUAV
        | DescriptorType::RawBufferSRV
        | DescriptorType::RawBufferUAV => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::TypedBufferSRV => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        DescriptorType::TypedBufferUAV => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        DescriptorType::RayTracingAccelStruct => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        DescriptorType::SamplerFeedbackTextureUAV => vk::DescriptorType::STORAGE_IMAGE,
    }
}

/// Root buffers become dynamic descriptors, the closest thing Vulkan has to root descriptors
pub fn to_dynamic(descriptor_type: vk::DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        vk::DescriptorType::UNIFORM_BUFFER => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::DescriptorType::STORAGE_BUFFER => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        other => other,
    }
}

pub fn sample_count_to_vulkan(count: u32) -> Result<vk::SampleCountFlags> {
    Ok(match count {
        0 | 1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        _ => bail!("unsupported sample count {count}"),
    })
}

pub fn texture_address_to_vulkan(address: TextureAddress) -> vk::SamplerAddressMode {
    match address {
        TextureAddress::Wrap => vk::SamplerAddressMode::REPEAT,
        TextureAddress::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        TextureAddress::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        TextureAddress::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        TextureAddress::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

pub fn border_color_to_vulkan(color: StaticBorderColor) -> vk::BorderColor {
    match color {
        StaticBorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        StaticBorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        StaticBorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

/// Native filtering state of a texture filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterKey {
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub anisotropy: bool,
    pub compare: bool,
    pub reduction: Option<vk::SamplerReductionMode>,
}

pub fn filter_to_vulkan(filter: TextureFilter) -> FilterKey {
    let to_filter = |mode| match mode {
        FilterMode::Point => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    };
    let (min, mag, mip, anisotropy, reduction) = filter.decompose();
    FilterKey {
        min_filter: to_filter(min),
        mag_filter: to_filter(mag),
        mipmap_mode: match mip {
            FilterMode::Point => vk::SamplerMipmapMode::NEAREST,
            FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
        },
        anisotropy,
        compare: reduction == FilterReduction::Comparison,
        reduction: match reduction {
            FilterReduction::Minimum => Some(vk::SamplerReductionMode::MIN),
            FilterReduction::Maximum => Some(vk::SamplerReductionMode::MAX),
            FilterReduction::Standard | FilterReduction::Comparison => None,
        },
    }
}

/// Everything of a `vk::SamplerCreateInfo` except the reduction mode chain
pub fn sampler_create_info(desc: &SamplerDesc) -> (vk::SamplerCreateInfo<'static>, Option<vk::SamplerReductionMode>) {
    let filter = filter_to_vulkan(desc.filter);
    let compare = filter.compare && desc.comparison_func != ComparisonFunc::None;
    let info = vk::SamplerCreateInfo::default()
        .min_filter(filter.min_filter)
        .mag_filter(filter.mag_filter)
        .mipmap_mode(filter.mipmap_mode)
        .address_mode_u(texture_address_to_vulkan(desc.address_u))
        .address_mode_v(texture_address_to_vulkan(desc.address_v))
        .address_mode_w(texture_address_to_vulkan(desc.address_w))
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(filter.anisotropy)
        .max_anisotropy(desc.max_anisotropy as f32)
        .compare_enable(compare)
        .compare_op(comparison_func_to_vulkan(desc.comparison_func))
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
        .border_color(border_color_to_vulkan(desc.static_border_color));
    (info, filter.reduction)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetLayoutBindingKey {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
    pub immutable_sampler: Option<SamplerDesc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SetLayoutKey {
    pub bindings: Vec<SetLayoutBindingKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantKey {
    pub stages: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// How one root parameter lands in the pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    DescriptorSet(u32),
    PushConstants(PushConstantKey),
}

/// Fully translated pipeline layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    pub set_layouts: Vec<SetLayoutKey>,
    pub parameters: Vec<ParameterKey>,
    /// Trailing set holding the immutable samplers, if any
    pub static_sampler_set: Option<u32>,
}

impl PipelineLayoutKey {
    pub fn push_constant_ranges(&self) -> Vec<PushConstantKey> {
        self.parameters
            .iter()
            .filter_map(|parameter| match parameter {
                ParameterKey::PushConstants(range) => Some(*range),
                ParameterKey::DescriptorSet(_) => None,
            })
            .collect()
    }

    pub fn set_index(&self, root_parameter: u32) -> Option<u32> {
        match self.parameters.get(root_parameter as usize)? {
            ParameterKey::DescriptorSet(set) => Some(*set),
            ParameterKey::PushConstants(_) => None,
        }
    }
}

pub fn set_layout_key(layout: &DescriptorSetLayout) -> SetLayoutKey {
    let stages = shader_stage_to_vulkan(layout.visibility);
    let bindings = layout
        .native_bindings()
        .into_iter()
        .map(|(binding, descriptor_type, count)| {
            let mut descriptor_type = descriptor_type_to_vulkan(descriptor_type);
            if layout.is_root_buffer {
                descriptor_type = to_dynamic(descriptor_type);
            }
            SetLayoutBindingKey {
                binding,
                descriptor_type,
                count,
                stages,
                immutable_sampler: None,
            }
        })
        .collect();
    SetLayoutKey { bindings }
}

pub fn translate_root_signature(desc: &RootSignatureDesc, max_push_constants_size: u32) -> Result<PipelineLayoutKey> {
    let mut key = PipelineLayoutKey::default();
    let mut push_constant_offset = 0;

    for (i, layout) in desc.descriptor_set_layouts().into_iter().enumerate() {
        let parameter = match layout {
            Some(layout) => {
                key.set_layouts.push(set_layout_key(&layout));
                ParameterKey::DescriptorSet(key.set_layouts.len() as u32 - 1)
            }
            None => {
                let RootParameter::RootConstants {
                    num_32bit_constants,
                    visibility,
                    ..
                } = &desc.root_parameters[i]
                else {
                    bail!("root parameter {i} of {} has no descriptor set layout", desc.name);
                };
                let range = PushConstantKey {
                    stages: shader_stage_to_vulkan(*visibility),
                    offset: push_constant_offset,
                    size: num_32bit_constants * 4,
                };
                push_constant_offset += range.size;
                ParameterKey::PushConstants(range)
            }
        };
        key.parameters.push(parameter);
    }

    if push_constant_offset > max_push_constants_size {
        bail!(
            "root signature {} needs {push_constant_offset} bytes of push constants, the device allows {max_push_constants_size}",
            desc.name
        );
    }

    if !desc.static_samplers.is_empty() {
        let mut bindings: Vec<SetLayoutBindingKey> = desc
            .static_samplers
            .iter()
            .map(|sampler| SetLayoutBindingKey {
                binding: desc.binding_offsets.sampler + sampler.shader_register,
                descriptor_type: vk::DescriptorType::SAMPLER,
                count: 1,
                stages: shader_stage_to_vulkan(sampler.shader_visibility),
                immutable_sampler: Some(sampler.sampler),
            })
            .collect();
        bindings.sort_by_key(|binding| binding.binding);
        if bindings.windows(2).any(|pair| pair[0].binding == pair[1].binding) {
            bail!("root signature {} declares two static samplers on one register", desc.name);
        }
        key.set_layouts.push(SetLayoutKey { bindings });
        key.static_sampler_set = Some(key.set_layouts.len() as u32 - 1);
    }

    Ok(key)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStageKey {
    pub stage: vk::ShaderStageFlags,
    pub shader_hash: u64,
    pub entry: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBindingKey {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeKey {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Rasterizer state with floats kept as bit patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationKey {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_clamp_enable: bool,
    pub depth_bias_enable: bool,
    pub depth_bias_constant: i32,
    pub depth_bias_clamp: u32,
    pub depth_bias_slope: u32,
}

impl RasterizationKey {
    fn new(desc: &RasterizerStateDesc) -> Self {
        Self {
            polygon_mode: fill_mode_to_vulkan(desc.fill_mode),
            cull_mode: cull_mode_to_vulkan(desc.cull_mode),
            front_face: if desc.front_counter_clockwise {
                vk::FrontFace::COUNTER_CLOCKWISE
            } else {
                vk::FrontFace::CLOCKWISE
            },
            depth_clamp_enable: !desc.depth_clip_enable,
            depth_bias_enable: desc.depth_bias != 0 || desc.slope_scaled_depth_bias != 0.0,
            depth_bias_constant: desc.depth_bias,
            depth_bias_clamp: desc.depth_bias_clamp.to_bits(),
            depth_bias_slope: desc.slope_scaled_depth_bias.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilKey {
    pub fail_op: vk::StencilOp,
    pub pass_op: vk::StencilOp,
    pub depth_fail_op: vk::StencilOp,
    pub compare_op: vk::CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
}

impl StencilKey {
    fn new(face: &StencilOpDesc, read_mask: u8, write_mask: u8) -> Self {
        Self {
            fail_op: stencil_op_to_vulkan(face.stencil_fail_op),
            pass_op: stencil_op_to_vulkan(face.stencil_pass_op),
            depth_fail_op: stencil_op_to_vulkan(face.stencil_depth_fail_op),
            compare_op: comparison_func_to_vulkan(face.stencil_func),
            compare_mask: read_mask as u32,
            write_mask: write_mask as u32,
        }
    }

    pub fn to_vulkan(self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.fail_op,
            pass_op: self.pass_op,
            depth_fail_op: self.depth_fail_op,
            compare_op: self.compare_op,
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilKey {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub stencil_test_enable: bool,
    pub front: StencilKey,
    pub back: StencilKey,
}

impl DepthStencilKey {
    fn new(desc: &DepthStencilStateDesc) -> Self {
        Self {
            depth_test_enable: desc.depth_enable,
            depth_write_enable: desc.depth_write_mask == DepthWrite::All,
            depth_compare_op: comparison_func_to_vulkan(desc.depth_func),
            stencil_test_enable: desc.stencil_enable,
            front: StencilKey::new(&desc.front_face, desc.stencil_read_mask, desc.stencil_write_mask),
            back: StencilKey::new(&desc.back_face, desc.stencil_read_mask, desc.stencil_write_mask),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendAttachmentKey {
    pub blend_enable: bool,
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
}

impl BlendAttachmentKey {
    pub fn to_vulkan(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color)
            .dst_color_blend_factor(self.dst_color)
            .color_blend_op(self.color_op)
            .src_alpha_blend_factor(self.src_alpha)
            .dst_alpha_blend_factor(self.dst_alpha)
            .alpha_blend_op(self.alpha_op)
            .color_write_mask(self.write_mask)
    }
}

/// Fully translated graphics or mesh pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub name: String,
    pub layout_hash: u64,
    pub mesh: bool,
    pub compute: bool,
    pub stages: Vec<ShaderStageKey>,
    pub vertex_bindings: Vec<VertexBindingKey>,
    pub vertex_attributes: Vec<VertexAttributeKey>,
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub patch_control_points: u32,
    pub rasterization: RasterizationKey,
    pub samples: vk::SampleCountFlags,
    pub sample_mask: u32,
    pub alpha_to_coverage: bool,
    pub depth_stencil: DepthStencilKey,
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub attachments: Vec<BlendAttachmentKey>,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: vk::Format,
    pub stencil_format: vk::Format,
}

fn shader_stage_keys(shaders: &PipelineShaders) -> Vec<ShaderStageKey> {
    shaders
        .stages()
        .map(|(stage, binding)| ShaderStageKey {
            stage: shader_stage_to_vulkan(stage),
            shader_hash: binding.shader.hash,
            entry: binding.entry.clone(),
        })
        .collect()
}

fn fixed_function_key(
    name: &str,
    layout: &PipelineLayoutKey,
    blend: &BlendStateDesc,
    depth_stencil: &DepthStencilStateDesc,
    rasterizer: &RasterizerStateDesc,
    targets: &RenderTargetState,
    topology: PrimitiveTopology,
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
    let patch_control_points = match topology.control_points() {
        Some(n @ 1..=32) => n,
        Some(n) => bail!("pipeline {name} has a patch list with {n} control points"),
        None => 0,
    };

    let attachments = (0..targets.rtv_formats.len())
        .map(|i| {
            let rt = blend.target(i);
            BlendAttachmentKey {
                blend_enable: rt.blend_enable,
                src_color: blend_to_vulkan(rt.src_blend),
                dst_color: blend_to_vulkan(rt.dst_blend),
                color_op: blend_op_to_vulkan(rt.blend_op),
                src_alpha: blend_to_vulkan(rt.src_blend_alpha),
                dst_alpha: blend_to_vulkan(rt.dst_blend_alpha),
                alpha_op: blend_op_to_vulkan(rt.blend_op_alpha),
                write_mask: color_write_to_vulkan(rt.write_mask),
            }
        })
        .collect();

    // First target with a logic op decides it for the whole pipeline
    let logic_op = blend.render_target_blend.iter().find(|rt| rt.logic_op_enable);

    Ok(PipelineKey {
        name: name.to_string(),
        layout_hash: content_hash(layout),
        mesh: false,
        compute: false,
        stages: Vec::new(),
        vertex_bindings: Vec::new(),
        vertex_attributes: Vec::new(),
        topology: primitive_topology_to_vulkan(topology),
        primitive_restart: false,
        patch_control_points,
        rasterization: RasterizationKey::new(rasterizer),
        samples: sample_count_to_vulkan(targets.msaa_count)?,
        sample_mask: targets.sample_mask,
        alpha_to_coverage: blend.alpha_to_coverage_enable,
        depth_stencil: DepthStencilKey::new(depth_stencil),
        logic_op_enable: logic_op.is_some(),
        logic_op: logic_op.map_or(vk::LogicOp::NO_OP, |rt| logic_op_to_vulkan(rt.logic_op)),
        attachments,
        color_formats: targets.rtv_formats.iter().map(|f| format_to_vulkan(*f)).collect(),
        depth_format: format_to_vulkan(targets.dsv_format),
        stencil_format: if targets.dsv_format.is_stencil() {
            format_to_vulkan(targets.dsv_format)
        } else {
            vk::Format::UNDEFINED
        },
    })
}

pub fn translate_graphics_pipeline(
    desc: &GraphicsPipelineDesc,
    shaders: &PipelineShaders,
    layout: &PipelineLayoutKey,
) -> Result<PipelineKey> {
    let mut key = fixed_function_key(
        &desc.name,
        layout,
        &desc.blend_state,
        &desc.depth_stencil_state,
        &desc.rasterizer_state,
        &desc.render_targets,
        desc.primitive_topology,
    )?;

    for (location, element) in desc.vertex_elements.iter().enumerate() {
        if !desc.vertex_streams.iter().any(|s| s.input_slot == element.input_slot) {
            bail!(
                "vertex element {}{} of {} reads undeclared stream {}",
                element.semantic_name,
                element.semantic_index,
                desc.name,
                element.input_slot
            );
        }
        key.vertex_attributes.push(VertexAttributeKey {
            location: location as u32,
            binding: element.input_slot,
            format: format_to_vulkan(element.format),
            offset: element.aligned_byte_offset,
        });
    }
    key.vertex_bindings = desc
        .vertex_streams
        .iter()
        .map(|stream| VertexBindingKey {
            binding: stream.input_slot,
            stride: stream.stride,
            input_rate: input_classification_to_vulkan(stream.input_classification),
        })
        .collect();

    key.primitive_restart = desc.index_buffer_strip_cut != IndexBufferStripCutValue::Disabled;
    key.stages = shader_stage_keys(shaders);
    Ok(key)
}

pub fn translate_meshlet_pipeline(
    desc: &MeshletPipelineDesc,
    shaders: &PipelineShaders,
    layout: &PipelineLayoutKey,
) -> Result<PipelineKey> {
    let mut key = fixed_function_key(
        &desc.name,
        layout,
        &desc.blend_state,
        &desc.depth_stencil_state,
        &desc.rasterizer_state,
        &desc.render_targets,
        desc.primitive_topology,
    )?;
    key.mesh = true;
    key.stages = shader_stage_keys(shaders);
    Ok(key)
}

/// Fixed function state stays at its defaults so only the layout and shader vary the key
pub fn translate_compute_pipeline(
    desc: &ComputePipelineDesc,
    shaders: &PipelineShaders,
    layout: &PipelineLayoutKey,
) -> Result<PipelineKey> {
    if shaders.has_graphics_stages() {
        bail!("compute pipeline {} has graphics stages", desc.name);
    }
    let mut key = fixed_function_key(
        &desc.name,
        layout,
        &BlendStateDesc::default(),
        &DepthStencilStateDesc::default(),
        &RasterizerStateDesc::default(),
        &RenderTargetState::default(),
        PrimitiveTopology::default(),
    )?;
    key.compute = true;
    key.stages = shader_stage_keys(shaders);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::common::APPEND_REGISTER;
    use crate::renderer::resources::pipeline_state::{VertexElementDesc, VertexStreamDesc};
    use crate::renderer::resources::root_signature::DescriptorRange;
    use crate::renderer::resources::sampler::StaticSamplerDesc;

    #[test]
    fn descriptor_type_translation_is_total_and_deterministic() {
        for descriptor_type in DescriptorType::ALL {
            let first = descriptor_type_to_vulkan(descriptor_type);
            assert_eq!(first, descriptor_type_to_vulkan(descriptor_type));
            assert_ne!(first, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        }
        assert_eq!(
            to_dynamic(descriptor_type_to_vulkan(DescriptorType::ConstantBuffer)),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
    }

    #[test]
    fn shader_stage_masks() {
        assert_eq!(shader_stage_to_vulkan(ShaderStage::ALL), vk::ShaderStageFlags::ALL);
        assert_eq!(
            shader_stage_to_vulkan(ShaderStage::VERTEX | ShaderStage::PIXEL),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(shader_stage_to_vulkan(ShaderStage::AMPLIFICATION), vk::ShaderStageFlags::TASK_EXT);
    }

    #[test]
    fn root_signature_layout() {
        let desc = RootSignatureDesc::new("layout")
            .with_parameter(RootParameter::root_cbv(0, ShaderStage::VERTEX))
            .with_parameter(RootParameter::root_constants(1, 4, ShaderStage::ALL))
            .with_parameter(RootParameter::table(
                vec![DescriptorRange::texture_srv(0, 2), DescriptorRange::structured_buffer_srv(APPEND_REGISTER, 1)],
                ShaderStage::PIXEL,
            ))
            .with_parameter(RootParameter::root_constants(2, 2, ShaderStage::PIXEL))
            .with_static_sampler(StaticSamplerDesc::new(3, SamplerDesc::default(), ShaderStage::PIXEL));

        let key = translate_root_signature(&desc, 256).unwrap();
        assert_eq!(key.set_layouts.len(), 3);
        assert_eq!(key.set_index(0), Some(0));
        assert_eq!(key.set_index(1), None);
        assert_eq!(key.set_index(2), Some(1));
        assert_eq!(key.static_sampler_set, Some(2));

        let root_cbv = &key.set_layouts[0].bindings[0];
        assert_eq!(root_cbv.binding, 256);
        assert_eq!(root_cbv.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);

        let table = &key.set_layouts[1].bindings;
        assert_eq!((table[0].binding, table[0].count), (0, 2));
        assert_eq!((table[1].binding, table[1].descriptor_type), (2, vk::DescriptorType::STORAGE_BUFFER));

        let ranges = key.push_constant_ranges();
        assert_eq!((ranges[0].offset, ranges[0].size), (0, 16));
        assert_eq!((ranges[1].offset, ranges[1].size), (16, 8));

        let sampler = &key.set_layouts[2].bindings[0];
        assert_eq!(sampler.binding, 131);
        assert!(sampler.immutable_sampler.is_some());

        assert!(translate_root_signature(&desc, 16).is_err());
    }

    #[test]
    fn equal_descs_translate_to_equal_keys() {
        let build = || {
            RootSignatureDesc::new("a")
                .with_parameter(RootParameter::range(DescriptorType::TextureSRV, 0, 4, ShaderStage::PIXEL))
        };
        let a = translate_root_signature(&build(), 256).unwrap();
        let b = translate_root_signature(&build(), 256).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));

        let c = translate_root_signature(
            &RootSignatureDesc::new("a")
                .with_parameter(RootParameter::range(DescriptorType::TextureSRV, 0, 5, ShaderStage::PIXEL)),
            256,
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn graphics_pipeline_fixed_function_state() {
        let layout = PipelineLayoutKey::default();
        let mut desc = GraphicsPipelineDesc::new("opaque")
            .with_render_targets(&[Format::RGBA8_UNorm, Format::RG16_Float], Format::D24S8)
            .with_input_layout(
                &[VertexStreamDesc { input_slot: 0, stride: 24, ..Default::default() }],
                &[
                    VertexElementDesc::per_vertex("POSITION", Format::RGB32_Float, 0, 0),
                    VertexElementDesc::per_vertex("NORMAL", Format::RGB32_Float, 0, 12),
                ],
            );
        desc.rasterizer_state.front_counter_clockwise = true;
        desc.blend_state.render_target_blend[0].blend_enable = true;
        desc.blend_state.render_target_blend[1].logic_op_enable = true;
        desc.blend_state.render_target_blend[1].logic_op = LogicOp::Xor;

        let key = translate_graphics_pipeline(&desc, &PipelineShaders::default(), &layout).unwrap();
        assert_eq!(key.rasterization.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(key.vertex_attributes[1].location, 1);
        assert_eq!(key.vertex_attributes[1].offset, 12);
        assert_eq!(key.stencil_format, vk::Format::D24_UNORM_S8_UINT);
        // without independent blending every target follows target zero
        assert!(key.attachments.iter().all(|a| a.blend_enable));
        assert!(key.logic_op_enable);
        assert_eq!(key.logic_op, vk::LogicOp::XOR);

        desc.vertex_elements[1].input_slot = 3;
        assert!(translate_graphics_pipeline(&desc, &PipelineShaders::default(), &layout).is_err());
    }

    #[test]
    fn invalid_patch_lists_and_sample_counts_fail() {
        let layout = PipelineLayoutKey::default();
        let mut desc = GraphicsPipelineDesc::new("tess");
        desc.primitive_topology = PrimitiveTopology::PatchList(3);
        let key = translate_graphics_pipeline(&desc, &PipelineShaders::default(), &layout).unwrap();
        assert_eq!(key.patch_control_points, 3);

        desc.primitive_topology = PrimitiveTopology::PatchList(33);
        assert!(translate_graphics_pipeline(&desc, &PipelineShaders::default(), &layout).is_err());

        desc.primitive_topology = PrimitiveTopology::TriangleList;
        desc.render_targets.msaa_count = 3;
        assert!(translate_graphics_pipeline(&desc, &PipelineShaders::default(), &layout).is_err());
    }

    #[test]
    fn comparison_filters_enable_compare() {
        let desc = SamplerDesc::default()
            .with_filter(TextureFilter::ComparisonMinMagLinearMipPoint)
            .with_comparison(ComparisonFunc::LessEqual);
        let (info, reduction) = sampler_create_info(&desc);
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert!(reduction.is_none());

        let (_, reduction) = sampler_create_info(&SamplerDesc::default().with_filter(TextureFilter::MaximumMinMagMipPoint));
        assert_eq!(reduction, Some(vk::SamplerReductionMode::MAX));
    }
}
