use crate::renderer::common::{
    Blend, BlendOp, ColorWrite, ComparisonFunc, CullMode, DepthWrite, FillMode, Format,
    IndexBufferStripCutValue, InputClassification, LogicOp, PrimitiveTopology, StencilOp,
};
use crate::renderer::handle::ResourceHandle;
use crate::renderer::resources::root_signature::RootSignature;
use crate::renderer::GraphicsContext;
use color_eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub logic_op_enable: bool,
    pub src_blend: Blend,
    pub dst_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dst_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    pub logic_op: LogicOp,
    pub write_mask: ColorWrite,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            logic_op_enable: false,
            src_blend: Blend::One,
            dst_blend: Blend::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dst_blend_alpha: Blend::Zero,
            blend_op_alpha: BlendOp::Add,
            logic_op: LogicOp::Noop,
            write_mask: ColorWrite::ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlendStateDesc {
    pub alpha_to_coverage_enable: bool,
    pub independent_blend_enable: bool,
    pub render_target_blend: [RenderTargetBlendDesc; 8],
}

impl BlendStateDesc {
    /// Blend desc of render target `index`, honoring independent blending
    pub fn target(&self, index: usize) -> &RenderTargetBlendDesc {
        if self.independent_blend_enable {
            &self.render_target_blend[index]
        } else {
            &self.render_target_blend[0]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerStateDesc {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_bias_clamp: f32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub forced_sample_count: u32,
    pub conservative_rasterization_enable: bool,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            front_counter_clockwise: false,
            depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            depth_bias_clamp: 0.0,
            depth_clip_enable: true,
            multisample_enable: false,
            antialiased_line_enable: false,
            forced_sample_count: 0,
            conservative_rasterization_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpDesc {
    pub stencil_fail_op: StencilOp,
    pub stencil_depth_fail_op: StencilOp,
    pub stencil_pass_op: StencilOp,
    pub stencil_func: ComparisonFunc,
}

impl Default for StencilOpDesc {
    fn default() -> Self {
        Self {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_func: ComparisonFunc::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDesc {
    pub depth_enable: bool,
    pub depth_write_mask: DepthWrite,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: DepthWrite::All,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: StencilOpDesc::default(),
            back_face: StencilOpDesc::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VertexStreamDesc {
    pub input_slot: u32,
    pub stride: u32,
    pub input_classification: InputClassification,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexElementDesc {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub input_classification: InputClassification,
    pub instance_data_step_rate: u32,
}

impl VertexElementDesc {
    pub fn per_vertex(semantic_name: &str, format: Format, input_slot: u32, aligned_byte_offset: u32) -> Self {
        Self {
            semantic_name: semantic_name.to_string(),
            format,
            input_slot,
            aligned_byte_offset,
            ..Default::default()
        }
    }
}

/// Compiled shader file plus the entry point to use
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderNameAndEntry {
    pub file: String,
    pub entry: String,
}

impl ShaderNameAndEntry {
    pub fn new(file: &str, entry: &str) -> Self {
        Self {
            file: file.to_string(),
            entry: entry.to_string(),
        }
    }
}

impl From<&str> for ShaderNameAndEntry {
    fn from(file: &str) -> Self {
        Self::new(file, "main")
    }
}

/// Output merger and multisample state shared by graphics and meshlet pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetState {
    pub rtv_formats: Vec<Format>,
    pub dsv_format: Format,
    pub msaa_count: u32,
    pub msaa_quality: u32,
    pub sample_mask: u32,
}

impl Default for RenderTargetState {
    fn default() -> Self {
        Self {
            rtv_formats: Vec::new(),
            dsv_format: Format::Unknown,
            msaa_count: 1,
            msaa_quality: 0,
            sample_mask: u32::MAX,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphicsPipelineDesc {
    pub name: String,

    pub blend_state: BlendStateDesc,
    pub depth_stencil_state: DepthStencilStateDesc,
    pub rasterizer_state: RasterizerStateDesc,
    pub render_targets: RenderTargetState,
    pub primitive_topology: PrimitiveTopology,
    pub index_buffer_strip_cut: IndexBufferStripCutValue,

    pub vertex_streams: Vec<VertexStreamDesc>,
    pub vertex_elements: Vec<VertexElementDesc>,

    pub vertex_shader: Option<ShaderNameAndEntry>,
    pub hull_shader: Option<ShaderNameAndEntry>,
    pub domain_shader: Option<ShaderNameAndEntry>,
    pub geometry_shader: Option<ShaderNameAndEntry>,
    pub pixel_shader: Option<ShaderNameAndEntry>,

    pub root_signature: Option<RootSignature>,
}

impl GraphicsPipelineDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_render_targets(mut self, rtv_formats: &[Format], dsv_format: Format) -> Self {
        self.render_targets.rtv_formats = rtv_formats.to_vec();
        self.render_targets.dsv_format = dsv_format;
        self
    }

    pub fn with_vertex_shader(mut self, shader: impl Into<ShaderNameAndEntry>) -> Self {
        self.vertex_shader = Some(shader.into());
        self
    }

    pub fn with_pixel_shader(mut self, shader: impl Into<ShaderNameAndEntry>) -> Self {
        self.pixel_shader = Some(shader.into());
        self
    }

    pub fn with_input_layout(mut self, streams: &[VertexStreamDesc], elements: &[VertexElementDesc]) -> Self {
        self.vertex_streams = streams.to_vec();
        self.vertex_elements = elements.to_vec();
        self
    }

    pub fn with_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.clone());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshletPipelineDesc {
    pub name: String,

    pub blend_state: BlendStateDesc,
    pub depth_stencil_state: DepthStencilStateDesc,
    pub rasterizer_state: RasterizerStateDesc,
    pub render_targets: RenderTargetState,
    pub primitive_topology: PrimitiveTopology,

    pub amplification_shader: Option<ShaderNameAndEntry>,
    pub mesh_shader: Option<ShaderNameAndEntry>,
    pub pixel_shader: Option<ShaderNameAndEntry>,

    pub root_signature: Option<RootSignature>,
}

impl MeshletPipelineDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_render_targets(mut self, rtv_formats: &[Format], dsv_format: Format) -> Self {
        self.render_targets.rtv_formats = rtv_formats.to_vec();
        self.render_targets.dsv_format = dsv_format;
        self
    }

    pub fn with_mesh_shader(mut self, shader: impl Into<ShaderNameAndEntry>) -> Self {
        self.mesh_shader = Some(shader.into());
        self
    }

    pub fn with_amplification_shader(mut self, shader: impl Into<ShaderNameAndEntry>) -> Self {
        self.amplification_shader = Some(shader.into());
        self
    }

    pub fn with_pixel_shader(mut self, shader: impl Into<ShaderNameAndEntry>) -> Self {
        self.pixel_shader = Some(shader.into());
        self
    }

    pub fn with_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.clone());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComputePipelineDesc {
    pub name: String,
    pub compute_shader: Option<ShaderNameAndEntry>,
    pub root_signature: Option<RootSignature>,
}

impl ComputePipelineDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_compute_shader(mut self, shader: impl Into<ShaderNameAndEntry>) -> Self {
        self.compute_shader = Some(shader.into());
        self
    }

    pub fn with_root_signature(mut self, root_signature: &RootSignature) -> Self {
        self.root_signature = Some(root_signature.clone());
        self
    }
}

/// Creation parameters kept in a pipeline slot
#[derive(Debug, Clone)]
pub enum PipelineDesc {
    Graphics(GraphicsPipelineDesc),
    Meshlet(MeshletPipelineDesc),
    Compute(ComputePipelineDesc),
}

impl PipelineDesc {
    pub fn name(&self) -> &str {
        match self {
            Self::Graphics(desc) => &desc.name,
            Self::Meshlet(desc) => &desc.name,
            Self::Compute(desc) => &desc.name,
        }
    }
}

#[derive(Clone)]
pub struct GraphicsPipelineState {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl GraphicsPipelineState {
    pub fn new(ctx: &GraphicsContext, desc: &GraphicsPipelineDesc) -> Result<Self> {
        let handle = ctx.manager().create_graphics_pipeline(desc)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn new_meshlet(ctx: &GraphicsContext, desc: &MeshletPipelineDesc) -> Result<Self> {
        let handle = ctx.manager().create_meshlet_pipeline(desc)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn name(&self) -> String {
        self.ctx.manager().name(&self.handle).unwrap_or_default()
    }

    /// Content hash of the translated native pipeline
    pub fn content_hash(&self) -> Option<u64> {
        self.ctx.manager().content_hash(&self.handle)
    }
}

#[derive(Clone)]
pub struct ComputePipelineState {
    ctx: GraphicsContext,
    handle: ResourceHandle,
}

impl ComputePipelineState {
    pub fn new(ctx: &GraphicsContext, desc: &ComputePipelineDesc) -> Result<Self> {
        let handle = ctx.manager().create_compute_pipeline(desc)?;
        Ok(Self { ctx: ctx.clone(), handle })
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    pub fn name(&self) -> String {
        self.ctx.manager().name(&self.handle).unwrap_or_default()
    }

    pub fn content_hash(&self) -> Option<u64> {
        self.ctx.manager().content_hash(&self.handle)
    }
}
